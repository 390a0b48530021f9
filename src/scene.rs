//! Initial-condition generators: spiral clusters, multi-galaxy layouts and
//! uniformly random boxes.

use std::f32::consts::TAU;

use glam::Vec2;
use rand::Rng;

use crate::particle::{Particle, GRAVITY};

/// Minimal number of spirals in a cluster or galaxy.
const MIN_SPIRALS: u32 = 2;
/// Maximum number of spirals in a cluster or galaxy.
const MAX_SPIRALS: u32 = 4;

/// Radius range of cluster centers and galaxy cores.
const CORE_MIN_R: f32 = 200.0;
const CORE_MAX_R: f32 = 600.0;
/// Density of cluster centers and galaxy cores.
const CORE_DENSITY: f32 = 30.0;

/// Radius range of normal particles.
const PARTICLE_MIN_R: f32 = 1.5;
const PARTICLE_MAX_R: f32 = 9.5;
/// Density of normal particles.
const PARTICLE_DENSITY: f32 = 10.0;

/// Radius of a massless tracer.
const TRACER_RADIUS: f32 = 0.5;

/// Minimal number of particles per cluster.
pub const MIN_PARTICLES_PER_CLUSTER: u32 = 100;
/// Minimal number of particles per galaxy.
pub const MIN_PARTICLES_PER_GALAXY: u32 = 100;

/// Galaxy particle placement, relative to core radius R and size N:
///     min_dist = R * MIN_PARTICLE_DIST_CR_F
///     max_dist = R * MAX_PARTICLE_DIST_CR_F + sqrt(N) * MAX_PARTICLE_DIST_PC_F
const MIN_PARTICLE_DIST_CR_F: f32 = 5.0;
const MAX_PARTICLE_DIST_CR_F: f32 = 10.0;
const MAX_PARTICLE_DIST_PC_F: f32 = 300.0;

/// Galaxy separation, as a factor of the two galaxies' summed max_dist.
const MIN_GALAXY_SEPARATION: f32 = 1.4;
const MAX_GALAXY_SEPARATION: f32 = 2.0;

/// Convert a radius to a mass through a cubic density law.
fn radius_to_mass(radius: f32, density: f32) -> f32 {
    (4.0 * std::f32::consts::PI * density / 3.0) * radius * radius * radius
}

/// `count` particles at rest, uniformly distributed inside `[min, max]`
/// with positions inset by each particle's radius.
pub fn uniform_box<R: Rng>(count: u32, min: Vec2, max: Vec2, rng: &mut R) -> Vec<Particle> {
    (0..count)
        .map(|_| {
            let radius = rng.gen_range(PARTICLE_MIN_R..=PARTICLE_MAX_R);
            let mass = radius_to_mass(radius, PARTICLE_DENSITY);
            let x = rng.gen_range(min.x + radius..max.x - radius);
            let y = rng.gen_range(min.y + radius..max.y - radius);
            Particle::new(Vec2::new(x, y), mass, radius)
        })
        .collect()
}

/// Angular offsets of a random number of evenly spaced spiral arms.
fn spiral_offsets<R: Rng>(rng: &mut R) -> Vec<f32> {
    let initial_offset = rng.gen_range(0.0..TAU);
    let count = rng.gen_range(MIN_SPIRALS..=MAX_SPIRALS);
    let angle_dist = TAU / count as f32;

    (0..count)
        .map(|i| initial_offset + i as f32 * angle_dist)
        .collect()
}

/// Place one non-core particle on a spiral arm around `core`.
///
/// The spiral is `r(t) = b * t` in polar coordinates, ending at angle 2*PI
/// at `max_dist` and starting at `min_dist`. Angle and distance both get a
/// non-uniform random offset so arms keep their shape but look natural.
/// The farther from the core, the higher the chance of a massless tracer.
fn spiral_particle<R: Rng>(
    core: &Particle,
    min_dist: f32,
    max_dist: f32,
    arms: &[f32],
    rng: &mut R,
) -> Particle {
    let b = max_dist / TAU;
    let t0 = min_dist / b;
    let arm_angle_dist = TAU / arms.len() as f32;

    let t = rng.gen_range(t0..TAU);
    let r = b * t;

    let t_offset = rng.gen_range(0.0..0.6 * arm_angle_dist.sqrt());
    let r_offset = rng.gen_range(0.0..0.6 * b.min(r - min_dist).sqrt().max(f32::MIN_POSITIVE));

    let sign = |rng: &mut R| if rng.gen_bool(0.5) { 1.0 } else { -1.0 };
    let dist = r + sign(rng) * r_offset * r_offset;
    let ang = t + sign(rng) * t_offset * t_offset;

    let arm = arms[rng.gen_range(0..arms.len())];
    let dx = dist * (ang + arm).cos();
    let dy = dist * (ang + arm).sin();

    let (mass, radius) = if rng.gen_range(0.0..1.0) < (dist - min_dist) / (max_dist - min_dist) {
        (0.0, TRACER_RADIUS)
    } else {
        let radius = rng.gen_range(PARTICLE_MIN_R..=PARTICLE_MAX_R);
        (radius_to_mass(radius, PARTICLE_DENSITY), radius)
    };

    // orbital velocity, tangential to the radial vector
    let speed = (GRAVITY * core.mass / dist).sqrt();
    let vel = core.vel + Vec2::new(dy, -dx) * (speed / dist);

    Particle {
        pos: core.pos + Vec2::new(dx, dy),
        vel,
        acc: Vec2::ZERO,
        mass,
        radius,
    }
}

/// Create `count` particles grouped into two spiral clusters on a collision
/// course, with perpendicular bulk velocities so they do not hit head-on.
///
/// Panics when `count < 2 * MIN_PARTICLES_PER_CLUSTER`.
pub fn two_clusters<R: Rng>(count: u32, rng: &mut R) -> Vec<Particle> {
    assert!(
        count >= 2 * MIN_PARTICLES_PER_CLUSTER,
        "need at least {} particles to make two clusters, called with {}",
        2 * MIN_PARTICLES_PER_CLUSTER,
        count
    );

    let spare = count - 2 * MIN_PARTICLES_PER_CLUSTER;
    let first_size = MIN_PARTICLES_PER_CLUSTER + rng.gen_range(0..spare + 1);
    let sizes = [first_size, count - first_size];

    let mut particles = Vec::with_capacity(count as usize);
    let mut cluster_radius = [0.0f32; 2];
    let mut centers = [Vec2::ZERO; 2];
    let mut ranges = [(0usize, 0usize); 2];

    for i in 0..2 {
        let center_radius = rng.gen_range(CORE_MIN_R..=CORE_MAX_R);
        let mass = radius_to_mass(center_radius, CORE_DENSITY);

        let min_particle_dist = 4.0 * center_radius;
        cluster_radius[i] = 4.0 * min_particle_dist + 200.0 * (sizes[i] as f32).sqrt();

        // first cluster sits at the origin
        if i != 0 {
            let min_r = 1.2 * (cluster_radius[0] + cluster_radius[1]);
            let max_r = 1.4 * min_r;

            let angle = rng.gen_range(0.0..TAU);
            let dist = rng.gen_range(min_r * min_r..max_r * max_r).sqrt();
            centers[i] = centers[0] + Vec2::new(angle.cos(), angle.sin()) * dist;
        }

        let start = particles.len();
        let core = Particle::new(centers[i], mass, center_radius);
        particles.push(core);

        let arms = spiral_offsets(rng);
        for _ in 1..sizes[i] {
            particles.push(spiral_particle(
                &core,
                min_particle_dist,
                cluster_radius[i],
                &arms,
                rng,
            ));
        }
        ranges[i] = (start, particles.len());
    }

    // bulk velocities perpendicular to the inter-cluster vector, opposite
    // signs, so the clusters sideswipe instead of colliding head-on
    let radv = centers[0] - centers[1];
    let unit = radv / radv.length();
    let tangents = [Vec2::new(-unit.y, unit.x), Vec2::new(unit.y, -unit.x)];

    for i in 0..2 {
        let vel = tangents[i] * rng.gen_range(100.0..200.0);
        for p in &mut particles[ranges[i].0..ranges[i].1] {
            p.vel += vel;
        }
    }

    particles
}

struct GalaxyLayout {
    size: u32,
    core: Particle,
    min_dist: f32,
    max_dist: f32,
}

/// Create `count` particles spread over `galaxy_count` spiral galaxies.
///
/// Galaxy 0 sits at the origin; each later galaxy is rejection-sampled on a
/// circle around a random earlier galaxy until it collides with none of the
/// others. Panics when `count < galaxy_count * MIN_PARTICLES_PER_GALAXY`.
pub fn galaxies<R: Rng>(count: u32, galaxy_count: u32, rng: &mut R) -> Vec<Particle> {
    assert!(
        count >= galaxy_count * MIN_PARTICLES_PER_GALAXY,
        "need at least {} particles to make {} galaxies, called with {}",
        galaxy_count * MIN_PARTICLES_PER_GALAXY,
        galaxy_count,
        count
    );

    // distribute the spare particles randomly; the last galaxy absorbs the
    // remainder
    let mut spare = count - galaxy_count * MIN_PARTICLES_PER_GALAXY;
    let mut layouts: Vec<GalaxyLayout> = (0..galaxy_count)
        .map(|i| {
            let extra = if i == galaxy_count - 1 {
                spare
            } else {
                let extra = rng.gen_range(0..spare + 1);
                spare -= extra;
                extra
            };
            let size = MIN_PARTICLES_PER_GALAXY + extra;

            let core_radius = rng.gen_range(CORE_MIN_R..=CORE_MAX_R);
            GalaxyLayout {
                size,
                core: Particle::new(Vec2::ZERO, radius_to_mass(core_radius, CORE_DENSITY), core_radius),
                min_dist: core_radius * MIN_PARTICLE_DIST_CR_F,
                max_dist: core_radius * MAX_PARTICLE_DIST_CR_F
                    + (size as f32).sqrt() * MAX_PARTICLE_DIST_PC_F,
            }
        })
        .collect();

    // position cores; galaxy 0 stays at the origin
    for i in 1..layouts.len() {
        loop {
            let parent_idx = rng.gen_range(0..i);

            let span = layouts[i].max_dist + layouts[parent_idx].max_dist;
            let min_sep = MIN_GALAXY_SEPARATION * span;
            let max_sep = MAX_GALAXY_SEPARATION * span;

            let dist = rng.gen_range(min_sep * min_sep..max_sep * max_sep).sqrt();
            let angle = rng.gen_range(0.0..TAU);
            let pos = layouts[parent_idx].core.pos + Vec2::new(angle.cos(), angle.sin()) * dist;

            let collision = (0..i).filter(|&j| j != parent_idx).any(|j| {
                let sep = MIN_GALAXY_SEPARATION * (layouts[i].max_dist + layouts[j].max_dist);
                pos.distance_squared(layouts[j].core.pos) < sep * sep
            });

            if !collision {
                layouts[i].core.pos = pos;
                break;
            }
        }
    }

    // pairwise fractional "orbital" velocities, tangential to the
    // inter-core axis with opposite signs, to avoid head-on collapse
    for i in 1..layouts.len() {
        for j in 0..i {
            let a_to_b = layouts[j].core.pos - layouts[i].core.pos;
            let dist = a_to_b.length();
            let unit = a_to_b / dist;

            let speed_a = 0.3 * (GRAVITY * layouts[j].core.mass / dist).sqrt();
            let speed_b = 0.3 * (GRAVITY * layouts[i].core.mass / dist).sqrt();

            layouts[i].core.vel += Vec2::new(unit.y, -unit.x) * speed_a;
            layouts[j].core.vel += Vec2::new(-unit.y, unit.x) * speed_b;
        }
    }

    let mut particles = Vec::with_capacity(count as usize);
    for layout in &layouts {
        particles.push(layout.core);

        let arms = spiral_offsets(rng);
        for _ in 1..layout.size {
            particles.push(spiral_particle(
                &layout.core,
                layout.min_dist,
                layout.max_dist,
                &arms,
                rng,
            ));
        }
    }

    log::info!(
        "generated {} particles across {} galaxies",
        particles.len(),
        galaxy_count
    );
    particles
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rng() -> StdRng {
        StdRng::seed_from_u64(11037)
    }

    #[test]
    fn uniform_box_stays_inside_bounds() {
        let min = Vec2::ZERO;
        let max = Vec2::new(1000.0, 1000.0);
        let particles = uniform_box(500, min, max, &mut rng());

        assert_eq!(particles.len(), 500);
        for p in &particles {
            assert!(p.pos.x >= min.x + p.radius && p.pos.x <= max.x - p.radius);
            assert!(p.pos.y >= min.y + p.radius && p.pos.y <= max.y - p.radius);
            assert!(p.mass > 0.0);
            assert!(p.radius > 0.0);
            assert_eq!(p.vel, Vec2::ZERO);
        }
    }

    #[test]
    fn two_clusters_returns_exact_count() {
        let particles = two_clusters(500, &mut rng());
        assert_eq!(particles.len(), 500);
    }

    #[test]
    #[should_panic(expected = "need at least 200 particles")]
    fn two_clusters_rejects_small_counts() {
        two_clusters(199, &mut rng());
    }

    #[test]
    fn two_clusters_mixes_massive_and_tracers() {
        let particles = two_clusters(2000, &mut rng());
        let massive = particles.iter().filter(|p| p.is_massive()).count();
        let tracers = particles.len() - massive;

        assert!(massive > 0);
        assert!(tracers > 0);
        for p in &particles {
            assert!(p.radius > 0.0);
            assert!(p.mass >= 0.0);
            assert!(p.pos.is_finite() && p.vel.is_finite());
        }
    }

    #[test]
    fn galaxies_returns_exact_count() {
        let particles = galaxies(1000, 3, &mut rng());
        assert_eq!(particles.len(), 1000);
    }

    #[test]
    #[should_panic(expected = "need at least 300 particles")]
    fn galaxies_rejects_small_counts() {
        galaxies(250, 3, &mut rng());
    }

    #[test]
    fn galaxy_cores_respect_minimum_separation() {
        let particles = galaxies(800, 4, &mut rng());

        // Cores are the heaviest particles by construction; collect the 4
        // heaviest and make sure no two are suspiciously close.
        let mut sorted = particles.clone();
        sorted.sort_by(|a, b| b.mass.partial_cmp(&a.mass).unwrap());
        let cores = &sorted[..4];

        for i in 0..4 {
            for j in 0..i {
                let d = cores[i].pos.distance(cores[j].pos);
                assert!(d > CORE_MIN_R * MIN_PARTICLE_DIST_CR_F);
            }
        }
    }

    #[test]
    fn spiral_particles_orbit_their_core() {
        let particles = two_clusters(400, &mut rng());

        // Non-core particles must not sit on top of the core.
        let core = particles[0];
        let mut near = 0;
        for p in particles.iter().skip(1).take(50) {
            let d = p.pos.distance(core.pos);
            if d < core.radius {
                near += 1;
            }
        }
        assert_eq!(near, 0);
    }
}
