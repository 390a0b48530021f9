//! Exact O(N^2) CPU kernel, vectorized over packed particle lanes.

use glam::Vec2;
use rayon::prelude::*;

use crate::particle::{Particle, FRICTION, GRAVITY, REPULSION};
use crate::simd::{Lanes, LANE_COUNT};

/// `LANE_COUNT` force sources merged for lane-parallel evaluation.
#[derive(Copy, Clone, Debug)]
pub struct ParticlePack {
    x: Lanes, // position x
    y: Lanes, // position y
    m: Lanes, // mass
}

impl ParticlePack {
    /// Merge up to `LANE_COUNT` particles into a single pack. Missing tail
    /// lanes are padded with mass 0, so they contribute no force.
    fn new(particles: &[Particle]) -> Self {
        let mut x = Lanes::ZERO;
        let mut y = Lanes::ZERO;
        let mut m = Lanes::ZERO;

        for (i, p) in particles.iter().take(LANE_COUNT).enumerate() {
            x.0[i] = p.pos.x;
            y.0[i] = p.pos.y;
            m.0[i] = p.mass;
        }
        Self { x, y, m }
    }
}

/// Pack the force-exerting prefix of the particle array.
///
/// Only the first `mass_len` particles carry mass (see
/// [`crate::particle::partition_massive`]); everything past them would
/// contribute zero to every lane anyway.
pub fn pack(particles: &[Particle], mass_len: usize) -> Vec<ParticlePack> {
    particles[..mass_len]
        .par_chunks(LANE_COUNT)
        .map(ParticlePack::new)
        .collect()
}

/// Lane-parallel force accumulation for one target particle.
fn accumulate(p: &Particle, packs: &[ParticlePack]) -> Vec2 {
    let g = Lanes::splat(GRAVITY);
    let n = Lanes::splat(REPULSION);
    let x = Lanes::splat(p.pos.x);
    let y = Lanes::splat(p.pos.y);
    let r = Lanes::splat(p.radius);

    let mut ax = Lanes::ZERO;
    let mut ay = Lanes::ZERO;

    for pack in packs {
        let dx = pack.x - x;
        let dy = pack.y - y;

        // distance squared, softened by the target's radius
        let r2 = dx * dx + dy * dy + r;
        let r1 = r2.sqrt();

        // acceleration == normalize(radv) * (Gm / dist^2 + Nm / dist^3)
        //              == radv * m * (G * dist + N) / dist^4
        let f = pack.m * (g * r1 + n) / (r2 * r2);

        ax = ax + dx * f;
        ay = ay + dy * f;
    }

    Vec2::new(ax.sum(), ay.sum())
}

/// Advance the whole particle array by one fixed time step.
///
/// Force accumulation completes globally before integration begins: the two
/// phases are separate parallel regions, and the packs are a snapshot, so no
/// work item observes a partially updated neighbour.
pub fn step(particles: &mut [Particle], mass_len: usize, dt: f32) {
    if particles.is_empty() {
        return;
    }

    let packs = pack(particles, mass_len);

    particles.par_iter_mut().for_each(|p| {
        p.acc = accumulate(p, &packs);
    });

    particles.par_iter_mut().for_each(|p| {
        p.vel += p.acc * dt;
        p.vel += p.vel * FRICTION;
        p.pos += p.vel * dt;
    });
}
