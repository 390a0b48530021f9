//! GPU compute pipeline: the same force-and-integrate math as the packed
//! CPU kernel, dispatched over double-buffered particle storage.

use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use wgpu::*;

use crate::gpu::GpuContext;
use crate::memory::{align_up, enqueue_copy, MemoryRegion, RegionKind, SubBuffer};
use crate::particle::{Particle, FRICTION, GRAVITY, REPULSION};

/// Workgroup size for the particle compute shader (must match
/// @workgroup_size in shader).
pub const WORKGROUP_SIZE_X: u32 = 256;

/// Step constants handed to the shader in a uniform buffer - must match the
/// WGSL struct layout, padded to a 16-byte multiple.
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Pod, Zeroable)]
pub struct SimUniform {
    pub total_len: u32, // total number of particles
    pub mass_len: u32,  // number of particles with mass
    pub dt: f32,        // time delta
    pub _pad: u32,
}

impl SimUniform {
    pub fn new(total_len: u32, mass_len: u32) -> Self {
        Self {
            total_len,
            mass_len,
            dt: 0.0,
            _pad: 0,
        }
    }
}

/// Number of workgroups needed to cover `count` particles.
pub fn workgroup_count(count: u32) -> u32 {
    count.div_ceil(WORKGROUP_SIZE_X)
}

/// The simulation pipeline and all GPU state backing it.
///
/// `storage_old` is read by every invocation; `storage_new` receives each
/// invocation's own slot. Between iterations of a multi-step update the new
/// buffer is copied back over the old one, which is cheaper than swapping
/// bindings. The two live in separate regions because wgpu rejects copies
/// within a single buffer.
pub struct SimPipeline {
    device: std::sync::Arc<Device>,
    queue: std::sync::Arc<Queue>,
    uniform_data: SimUniform,

    uniform: SubBuffer,
    storage_old: SubBuffer,
    storage_new: SubBuffer,
    transfer_uniform: SubBuffer,
    transfer_in: SubBuffer,
    transfer_out: SubBuffer,
    /// Whether `transfer_out` holds the same data as `storage_new` and the
    /// host has not re-staged anything since.
    staging_synced: bool,

    // regions outlive the sub-buffers carved from them
    _dev_mem: MemoryRegion,
    _front_mem: MemoryRegion,
    _upload_mem: MemoryRegion,
    _readback_mem: MemoryRegion,

    pipeline: ComputePipeline,
    bind_group: BindGroup,
}

impl SimPipeline {
    /// Set up the pipeline for a fixed particle count. `dt` starts at zero
    /// so the first update always refreshes the uniform buffer.
    pub fn new(gpu: &GpuContext, total_len: u32, mass_len: u32) -> Self {
        assert!(total_len > 0, "cannot create a GPU pipeline for zero particles");
        assert!(mass_len <= total_len);

        let device = gpu.device.clone();
        let queue = gpu.queue.clone();
        let uniform_data = SimUniform::new(total_len, mass_len);

        let uniform_size = std::mem::size_of::<SimUniform>() as u64;
        let storage_size = total_len as u64 * std::mem::size_of::<Particle>() as u64;

        /*
         * Memory.
         */

        let mut dev_mem = MemoryRegion::new(
            &device,
            "sim uniform + old storage",
            align_up(uniform_size) + storage_size,
            RegionKind::DeviceLocal,
        );
        let mut front_mem = MemoryRegion::new(
            &device,
            "sim new storage",
            storage_size,
            RegionKind::DeviceLocal,
        );
        let mut upload_mem = MemoryRegion::new(
            &device,
            "sim upload staging",
            align_up(uniform_size) + storage_size,
            RegionKind::Upload,
        );
        let mut readback_mem = MemoryRegion::new(
            &device,
            "sim readback staging",
            storage_size,
            RegionKind::Readback,
        );

        let uniform = dev_mem.carve(uniform_size);
        let storage_old = dev_mem.carve(storage_size);
        let storage_new = front_mem.carve(storage_size);
        let transfer_uniform = upload_mem.carve(uniform_size);
        let transfer_in = upload_mem.carve(storage_size);
        let transfer_out = readback_mem.carve(storage_size);

        // the uniform starts valid even if the first update keeps dt == 0
        uniform.copy_into(&queue, bytemuck::bytes_of(&uniform_data));

        /*
         * Shader and pipeline.
         */

        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Particle Compute Shader"),
            source: ShaderSource::Wgsl(include_str!("../shaders/particle_cs.wgsl").into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Sim Bind Group Layout"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::COMPUTE,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::COMPUTE,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 2,
                    visibility: ShaderStages::COMPUTE,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Storage { read_only: false },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("Sim Bind Group"),
            layout: &bind_group_layout,
            entries: &[
                BindGroupEntry {
                    binding: 0,
                    resource: uniform.binding(),
                },
                BindGroupEntry {
                    binding: 1,
                    resource: storage_old.binding(),
                },
                BindGroupEntry {
                    binding: 2,
                    resource: storage_new.binding(),
                },
            ],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Sim Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        // physics constants are baked in as pipeline overrides, the wgpu
        // form of specialization constants
        let constants = HashMap::from([
            (String::from("GRAVITY"), GRAVITY as f64),
            (String::from("REPULSION"), REPULSION as f64),
            (String::from("FRICTION"), FRICTION as f64),
        ]);

        let pipeline = device.create_compute_pipeline(&ComputePipelineDescriptor {
            label: Some("Sim Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: PipelineCompilationOptions {
                constants: &constants,
                ..Default::default()
            },
            cache: None,
        });

        Self {
            device,
            queue,
            uniform_data,
            uniform,
            storage_old,
            storage_new,
            transfer_uniform,
            transfer_in,
            transfer_out,
            staging_synced: false,
            _dev_mem: dev_mem,
            _front_mem: front_mem,
            _upload_mem: upload_mem,
            _readback_mem: readback_mem,
            pipeline,
            bind_group,
        }
    }

    pub fn uniform_data(&self) -> SimUniform {
        self.uniform_data
    }

    /// The buffer holding the latest dispatched results; the renderer binds
    /// this read-only in its vertex stage.
    pub fn front_buffer(&self) -> &SubBuffer {
        &self.storage_new
    }

    /// Stage a new particle array for the next update.
    ///
    /// Panics when the slice length differs from the pipeline's fixed count.
    pub fn set_particles(&mut self, particles: &[Particle]) {
        assert_eq!(
            particles.len() as u32,
            self.uniform_data.total_len,
            "particle count is fixed at pipeline creation"
        );
        self.transfer_in
            .copy_into(&self.queue, bytemuck::cast_slice(particles));
        self.staging_synced = false;
    }

    /// Read the latest results back into `out`.
    ///
    /// Valid after at least one update; blocks until the map completes.
    pub fn read_latest(&self, out: &mut [Particle]) {
        assert_eq!(out.len() as u32, self.uniform_data.total_len);
        self.transfer_out
            .read_back(&self.device, bytemuck::cast_slice_mut(out));
    }

    /// Run the kernel `n >= 1` times in sequence with time delta `dt`,
    /// recording the whole sequence into a single command buffer and
    /// blocking until it completes.
    pub fn perform_update(&mut self, n: u32, dt: f32) {
        assert!(n > 0, "performing 0 GPU simulation updates is not allowed");

        let mut encoder = self
            .device
            .create_command_encoder(&CommandEncoderDescriptor {
                label: Some("Sim Update Encoder"),
            });

        // refresh the uniform buffer if dt has changed
        if self.uniform_data.dt != dt {
            self.uniform_data.dt = dt;
            self.transfer_uniform
                .copy_into(&self.queue, bytemuck::bytes_of(&self.uniform_data));
            enqueue_copy(&mut encoder, &self.transfer_uniform, &self.uniform);
        }

        // populate storage_old with the latest data
        if self.staging_synced {
            // staging mirrors storage_new exactly
            enqueue_copy(&mut encoder, &self.storage_new, &self.storage_old);
        } else {
            // the host staged new data externally
            enqueue_copy(&mut encoder, &self.transfer_in, &self.storage_old);
        }

        let groups = workgroup_count(self.uniform_data.total_len);

        for i in 0..n {
            // the first dispatch already has fresh data in storage_old
            if i != 0 {
                enqueue_copy(&mut encoder, &self.storage_new, &self.storage_old);
            }

            let mut pass = encoder.begin_compute_pass(&ComputePassDescriptor {
                label: Some("Sim Compute Pass"),
                timestamp_writes: None,
            });
            pass.set_pipeline(&self.pipeline);
            pass.set_bind_group(0, &self.bind_group, &[]);
            pass.dispatch_workgroups(groups, 1, 1);
        }

        // expose the results to the host
        enqueue_copy(&mut encoder, &self.storage_new, &self.transfer_out);

        self.queue.submit(std::iter::once(encoder.finish()));
        self.device.poll(Maintain::Wait).panic_on_timeout();

        // storage_new was copied to the readback staging
        self.staging_synced = true;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn uniform_layout_is_16_bytes() {
        assert_eq!(std::mem::size_of::<SimUniform>(), 16);
    }

    #[test]
    fn workgroup_count_rounds_up() {
        assert_eq!(workgroup_count(1), 1);
        assert_eq!(workgroup_count(WORKGROUP_SIZE_X), 1);
        assert_eq!(workgroup_count(WORKGROUP_SIZE_X + 1), 2);
        assert_eq!(workgroup_count(2000), 8);
    }
}
