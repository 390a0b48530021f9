use bytemuck::{Pod, Zeroable};
use glam::Vec2;

/// Gravitational constant; gravity is proportional to the inverse square of distance.
///     g = GRAVITY * mass / dist^2
pub const GRAVITY: f32 = 10.0;

/// Repulsion constant; repulsion is proportional to the inverse cube of distance.
///     n = REPULSION * mass / dist^3
pub const REPULSION: f32 = 0.0;

/// A fraction of velocity that becomes deceleration each step. Must be in (-1, 0].
pub const FRICTION: f32 = 0.0;

/// A single simulated particle - must match the WGSL struct layout exactly.
/// The GPU kernels read this array as raw bytes, so the layout is load-bearing:
/// 8 contiguous f32 fields, 32 bytes total, 16-byte aligned.
#[repr(C, align(16))]
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Particle {
    pub pos: Vec2,    // offset 0
    pub vel: Vec2,    // offset 8
    pub acc: Vec2,    // offset 16
    pub mass: f32,    // offset 24; mass == 0 marks a massless tracer
    pub radius: f32,  // offset 28; display size and softening bias
}

const _: () = assert!(std::mem::size_of::<Particle>() == 32);
const _: () = assert!(std::mem::align_of::<Particle>() == 16);

// SAFETY: 8 tightly packed f32 fields; the size assertion above proves the
// align attribute introduces no trailing padding.
unsafe impl Zeroable for Particle {}
unsafe impl Pod for Particle {}

impl Particle {
    /// Particle at rest at the given position.
    pub fn new(pos: Vec2, mass: f32, radius: f32) -> Self {
        Self {
            pos,
            vel: Vec2::ZERO,
            acc: Vec2::ZERO,
            mass,
            radius,
        }
    }

    /// Whether this particle exerts force on others.
    pub fn is_massive(&self) -> bool {
        self.mass > 0.0
    }

    /// Accumulate the gravitational pull of a point mass into `self.acc`.
    ///
    /// No force is applied within the contact radius, which also keeps the
    /// denominator away from zero.
    pub fn apply_gravity(&mut self, pos: Vec2, mass: f32, radius: f32) {
        let radv = pos - self.pos;
        let dist = radv.length();

        if dist > self.radius + radius {
            let g = GRAVITY * mass / (dist * dist);
            // normalize(radv) * g  ==  (radv / dist) * g  ==  radv * (g / dist)
            self.acc += radv * (g / dist);
        }
    }

    /// Apply `dt` seconds of accumulated acceleration and velocity, then
    /// reset the accumulator. Symplectic Euler: velocity first, position
    /// from the updated velocity.
    pub fn advance(&mut self, dt: f32) {
        self.vel += self.acc * dt;
        self.vel += self.vel * FRICTION;
        self.pos += self.vel * dt;
        self.acc = Vec2::ZERO;
    }
}

/// Reorder `particles` so that every massive particle precedes every
/// massless tracer. Returns the number of massive particles.
///
/// Two-pointer swap pass; neither side keeps its relative order.
pub fn partition_massive(particles: &mut [Particle]) -> usize {
    let mut i = 0;
    let mut j = particles.len();
    loop {
        while i < j && particles[i].is_massive() {
            i += 1;
        }
        while i < j && {
            j -= 1;
            !particles[j].is_massive()
        } {}

        if i == j {
            return j;
        }
        particles.swap(i, j);
    }
}
