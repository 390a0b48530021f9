//! Real-time 2D N-body gravitational simulator.
//!
//! A fixed population of point-like particles mutually attract under
//! Newtonian gravity. Three interchangeable kernels advance the state by a
//! fixed time step: an exact O(N^2) CPU kernel vectorized over packed
//! lanes, a Barnes-Hut quadtree approximation, and a GPU compute pipeline
//! running the same math over double-buffered storage. [`world::World`]
//! owns the particle array and tracks which side holds the freshest data.

pub mod camera;
pub mod compute;
pub mod gpu;
pub mod input;
pub mod memory;
pub mod packed;
pub mod particle;
pub mod presets;
pub mod quadtree;
pub mod renderer;
pub mod scene;
pub mod simd;
pub mod utils;
pub mod world;

pub use gpu::GpuContext;
pub use particle::Particle;
pub use quadtree::Quadtree;
pub use world::World;
