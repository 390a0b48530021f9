//! Benchmark: median per-step time of the CPU and GPU kernels over a sweep
//! of particle counts.

use std::time::Instant;

use glam::Vec2;
use rand::rngs::StdRng;
use rand::SeedableRng;

use gravity_simulator::{scene, utils, GpuContext, World};

const WORLD_WIDTH: f32 = 1000.0;
const WORLD_HEIGHT: f32 = 1000.0;

const UPDATE_STEP: f32 = 0.01;
const WARMUP_ITER: usize = 100;
const BENCH_ITER: usize = 1000;

const SEED: u64 = 11037;

const WORLD_SIZES: [u32; 7] = [10, 100, 250, 500, 800, 1200, 2000];

/// Median microseconds per update, measured after a warmup.
fn bench(world: &mut World, mut update: impl FnMut(&mut World)) -> u64 {
    for _ in 0..WARMUP_ITER {
        update(world);
    }

    let mut samples = [0u64; BENCH_ITER];
    for sample in samples.iter_mut() {
        let start = Instant::now();
        update(world);
        *sample = start.elapsed().as_micros() as u64;
    }

    samples.sort_unstable();
    let middle = BENCH_ITER / 2;
    if BENCH_ITER % 2 == 0 {
        (samples[middle - 1] + samples[middle]) / 2
    } else {
        samples[middle]
    }
}

fn main() {
    utils::init();

    let gpu = pollster::block_on(GpuContext::headless())
        .expect("benchmark requires a GPU adapter");

    println!("\t   N\t  CPU\t  GPU");

    for &n in WORLD_SIZES.iter() {
        let mut rng = StdRng::seed_from_u64(SEED);
        let particles = scene::uniform_box(
            n,
            Vec2::ZERO,
            Vec2::new(WORLD_WIDTH, WORLD_HEIGHT),
            &mut rng,
        );

        let mut cpu_world = World::new(particles.clone());
        let mut gpu_world = World::new(particles);
        gpu_world.init_gpu(&gpu);

        let cpu = bench(&mut cpu_world, |w| w.cpu_step(UPDATE_STEP, 1));
        let gpu_us = bench(&mut gpu_world, |w| w.gpu_step(UPDATE_STEP, 1));

        println!("\t{:4}\t{:5}\t{:5}", n, cpu, gpu_us);
    }
}
