//! The simulated world: owns the particle array, selects between the CPU
//! and GPU kernels, and keeps track of which side holds the latest data.

use glam::Vec2;
use rayon::prelude::*;

use crate::compute::SimPipeline;
use crate::gpu::GpuContext;
use crate::packed;
use crate::particle::{partition_massive, Particle};
use crate::quadtree::Quadtree;

/// A fixed population of mutually attracting particles.
///
/// After construction the particle count never changes. Massive particles
/// are kept ahead of massless tracers so both kernels can iterate force
/// sources as a prefix.
///
/// At least one of `host_fresh` / `gpu_fresh` holds after every operation;
/// when both hold, the host array and the GPU front buffer agree.
pub struct World {
    particles: Vec<Particle>,
    mass_len: usize,
    sim: Option<SimPipeline>,
    tree: Option<Quadtree>,
    host_fresh: bool,
    gpu_fresh: bool,
}

impl World {
    /// Take ownership of a generated particle array.
    pub fn new(mut particles: Vec<Particle>) -> Self {
        let mass_len = partition_massive(&mut particles);
        log::info!(
            "world created: {} particles, {} massive",
            particles.len(),
            mass_len
        );

        Self {
            particles,
            mass_len,
            sim: None,
            tree: None,
            host_fresh: true,
            gpu_fresh: true,
        }
    }

    pub fn len(&self) -> usize {
        self.particles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.particles.is_empty()
    }

    /// Number of force-exerting particles (the massive prefix).
    pub fn mass_len(&self) -> usize {
        self.mass_len
    }

    /// The latest particle data, downloading from the GPU when the host
    /// array is stale.
    pub fn particles(&mut self) -> &[Particle] {
        self.sync_to_host();
        &self.particles
    }

    /// The GPU pipeline, once initialized.
    pub fn sim(&self) -> Option<&SimPipeline> {
        self.sim.as_ref()
    }

    /// The cached Barnes-Hut tree, once a tree step has built it.
    pub fn quadtree(&self) -> Option<&Quadtree> {
        self.tree.as_ref()
    }

    fn sync_to_host(&mut self) {
        if !self.host_fresh {
            // host_fresh can only be cleared by a GPU step
            let sim = self.sim.as_ref().unwrap();
            sim.read_latest(&mut self.particles);
            self.host_fresh = true;
            self.gpu_fresh = true;
        }
    }

    fn sync_to_gpu(&mut self) {
        if !self.gpu_fresh {
            let sim = self.sim.as_mut().unwrap();
            sim.set_particles(&self.particles);
            self.gpu_fresh = true;
            self.host_fresh = true;
        }
    }

    /// Perform `n` updates with the exact packed CPU kernel.
    pub fn cpu_step(&mut self, dt: f32, n: u32) {
        self.sync_to_host();

        for _ in 0..n {
            packed::step(&mut self.particles, self.mass_len, dt);
        }

        self.host_fresh = true;
        self.gpu_fresh = false;
    }

    /// Perform `n` updates with the Barnes-Hut tree kernel.
    pub fn cpu_step_approx(&mut self, dt: f32, n: u32) {
        self.sync_to_host();
        if self.particles.is_empty() {
            return;
        }

        for _ in 0..n {
            self.rebuild_tree();
            let tree = self.tree.as_ref().unwrap();

            self.particles
                .par_iter_mut()
                .for_each(|p| tree.apply_gravity(p));
            self.particles.par_iter_mut().for_each(|p| p.advance(dt));
        }

        self.host_fresh = true;
        self.gpu_fresh = false;
    }

    /// Rebuild the cached quadtree, recreating it over a doubled bounding
    /// box whenever a particle has escaped the current one.
    fn rebuild_tree(&mut self) {
        if self.particles.is_empty() {
            return;
        }

        let escaped = match &self.tree {
            None => true,
            Some(tree) => self.particles.iter().any(|p| !tree.contains(p.pos)),
        };

        if escaped {
            let mut min = Vec2::splat(f32::MAX);
            let mut max = Vec2::splat(f32::MIN);
            for p in &self.particles {
                min = min.min(p.pos);
                max = max.max(p.pos);
            }

            // double the tight extent so small drifts do not force a
            // rebuild every step
            let center = (min + max) * 0.5;
            let half = ((max - min) * 0.5).max(Vec2::splat(1.0)) * 2.0;
            self.tree = Some(Quadtree::new(center - half, center + half));
        }

        self.tree.as_mut().unwrap().update(&self.particles);
    }

    /// Set up the GPU pipeline and upload the current particle array. Does
    /// nothing when the pipeline already exists.
    pub fn init_gpu(&mut self, gpu: &GpuContext) {
        if self.sim.is_some() {
            return;
        }
        assert!(
            !self.particles.is_empty(),
            "cannot initialize the GPU pipeline for an empty world"
        );

        let mut sim = SimPipeline::new(gpu, self.particles.len() as u32, self.mass_len as u32);
        sim.set_particles(&self.particles);
        self.sim = Some(sim);

        self.host_fresh = true;
        self.gpu_fresh = true;
    }

    /// Perform `n` updates with the GPU kernel.
    ///
    /// Panics when [`World::init_gpu`] has not been called; that is a
    /// programmer error, not a runtime condition.
    pub fn gpu_step(&mut self, dt: f32, n: u32) {
        assert!(
            self.sim.is_some(),
            "gpu_step called before init_gpu set up the pipeline"
        );

        self.sync_to_gpu();
        self.sim.as_mut().unwrap().perform_update(n, dt);

        self.gpu_fresh = true;
        self.host_fresh = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn particle(x: f32, y: f32, mass: f32) -> Particle {
        Particle::new(Vec2::new(x, y), mass, 1.0)
    }

    #[test]
    fn construction_partitions_massive_first() {
        let mut world = World::new(vec![
            particle(0.0, 0.0, 0.0),
            particle(1.0, 0.0, 5.0),
            particle(2.0, 0.0, 0.0),
            particle(3.0, 0.0, 2.0),
        ]);

        assert_eq!(world.len(), 4);
        assert_eq!(world.mass_len(), 2);
        let ps = world.particles();
        assert!(ps[..2].iter().all(|p| p.is_massive()));
        assert!(ps[2..].iter().all(|p| !p.is_massive()));
    }

    #[test]
    fn empty_world_steps_are_noops() {
        let mut world = World::new(Vec::new());
        world.cpu_step(0.01, 3);
        world.cpu_step_approx(0.01, 3);
        assert!(world.is_empty());
    }

    #[test]
    fn single_particle_stays_at_rest() {
        let mut world = World::new(vec![particle(5.0, 5.0, 1.0)]);
        world.cpu_step(0.01, 10);

        let p = world.particles()[0];
        assert_eq!(p.pos, Vec2::new(5.0, 5.0));
        assert_eq!(p.vel, Vec2::ZERO);
    }

    #[test]
    #[should_panic(expected = "gpu_step called before init_gpu")]
    fn gpu_step_without_init_panics() {
        let mut world = World::new(vec![particle(0.0, 0.0, 1.0)]);
        world.gpu_step(0.01, 1);
    }

    #[test]
    fn cpu_kernels_agree_on_direction() {
        // The exact and tree kernels run the same scene; with only two
        // particles the tree degenerates to the direct sum, so velocities
        // point the same way.
        let scene = vec![particle(-10.0, 0.0, 50.0), particle(10.0, 0.0, 50.0)];

        let mut exact = World::new(scene.clone());
        let mut tree = World::new(scene);
        exact.cpu_step(0.01, 1);
        tree.cpu_step_approx(0.01, 1);

        let e = exact.particles().to_vec();
        let t = tree.particles().to_vec();
        assert!(e[0].vel.x > 0.0 && t[0].vel.x > 0.0);
        assert!(e[1].vel.x < 0.0 && t[1].vel.x < 0.0);
    }

    #[test]
    fn tree_step_over_many_bodies_stays_finite() {
        let particles: Vec<Particle> = (0..200)
            .map(|i| particle((i % 20) as f32 * 10.0, (i / 20) as f32 * 10.0, 3.0))
            .collect();

        let mut world = World::new(particles);
        world.cpu_step_approx(0.01, 5);

        for p in world.particles() {
            assert!(p.pos.is_finite() && p.vel.is_finite());
        }
    }
}
