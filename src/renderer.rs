//! Particle renderer: draws one billboard quad per particle straight out of
//! a storage buffer bound in the vertex stage.

use wgpu::*;

use crate::camera::CameraUniform;
use crate::compute::SimPipeline;
use crate::particle::Particle;
use crate::quadtree::{Node, Quadtree};

/// Cap on quadtree outline segments uploaded per frame.
const MAX_OVERLAY_SEGMENTS: usize = 16384;

/// Which particle data the renderer reads this frame.
pub enum RenderSource<'a> {
    /// The compute pipeline's front buffer. Compute and render commands are
    /// submitted on the same queue, so the dispatch's writes are ordered
    /// before the vertex reads.
    GpuFront,
    /// A host-side array, re-uploaded into the renderer's own buffer. Used
    /// when the CPU kernels drive the simulation.
    Host(&'a [Particle]),
}

pub struct ParticleRenderer {
    render_pipeline: RenderPipeline,
    camera_buffer: Buffer,
    /// Bind groups for the two sources: [front buffer, host upload].
    bind_groups: [BindGroup; 2],
    host_buffer: Buffer,
    particle_count: u32,
}

impl ParticleRenderer {
    pub fn new(
        device: &Device,
        surface_format: TextureFormat,
        sim: &SimPipeline,
        particle_count: u32,
    ) -> Self {
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Particle Draw Shader"),
            source: ShaderSource::Wgsl(include_str!("../shaders/particle_draw.wgsl").into()),
        });

        let camera_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("Camera Buffer"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        // destination for host-driven frames
        let host_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("Host Particle Buffer"),
            size: particle_count as u64 * std::mem::size_of::<Particle>() as u64,
            usage: BufferUsages::STORAGE | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Particle Render Bind Group Layout"),
            entries: &[
                BindGroupLayoutEntry {
                    binding: 0,
                    visibility: ShaderStages::VERTEX,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Uniform,
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
                BindGroupLayoutEntry {
                    binding: 1,
                    visibility: ShaderStages::VERTEX,
                    ty: BindingType::Buffer {
                        ty: BufferBindingType::Storage { read_only: true },
                        has_dynamic_offset: false,
                        min_binding_size: None,
                    },
                    count: None,
                },
            ],
        });

        let bind_groups = [
            device.create_bind_group(&BindGroupDescriptor {
                label: Some("Particle Render Bind Group (front)"),
                layout: &bind_group_layout,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: camera_buffer.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: sim.front_buffer().binding(),
                    },
                ],
            }),
            device.create_bind_group(&BindGroupDescriptor {
                label: Some("Particle Render Bind Group (host)"),
                layout: &bind_group_layout,
                entries: &[
                    BindGroupEntry {
                        binding: 0,
                        resource: camera_buffer.as_entire_binding(),
                    },
                    BindGroupEntry {
                        binding: 1,
                        resource: host_buffer.as_entire_binding(),
                    },
                ],
            }),
        ];

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Particle Render Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let render_pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Particle Render Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_particle"),
                buffers: &[],
                compilation_options: Default::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_particle"),
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    blend: Some(BlendState {
                        color: BlendComponent {
                            src_factor: BlendFactor::SrcAlpha,
                            dst_factor: BlendFactor::One,
                            operation: BlendOperation::Add,
                        },
                        alpha: BlendComponent {
                            src_factor: BlendFactor::One,
                            dst_factor: BlendFactor::OneMinusSrcAlpha,
                            operation: BlendOperation::Add,
                        },
                    }),
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: PrimitiveState {
                topology: PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: FrontFace::Ccw,
                cull_mode: None,
                polygon_mode: PolygonMode::Fill,
                unclipped_depth: false,
                conservative: false,
            },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            render_pipeline,
            camera_buffer,
            bind_groups,
            host_buffer,
            particle_count,
        }
    }

    /// Record a full-frame render pass over `view`.
    pub fn render(
        &self,
        encoder: &mut CommandEncoder,
        view: &TextureView,
        queue: &Queue,
        camera: CameraUniform,
        source: RenderSource,
    ) {
        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&camera));

        let bind_group = match source {
            RenderSource::GpuFront => &self.bind_groups[0],
            RenderSource::Host(particles) => {
                assert_eq!(particles.len() as u32, self.particle_count);
                queue.write_buffer(&self.host_buffer, 0, bytemuck::cast_slice(particles));
                &self.bind_groups[1]
            }
        };

        let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("Particle Render Pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Clear(Color {
                        r: 0.004,
                        g: 0.004,
                        b: 0.012,
                        a: 1.0,
                    }),
                    store: StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.render_pipeline);
        render_pass.set_bind_group(0, bind_group, &[]);

        // 6 vertices per particle: two triangles forming a billboard quad
        render_pass.draw(0..6, 0..self.particle_count);
    }
}

/// Debug overlay drawing the bounding boxes of every occupied quadtree
/// node as a line list.
pub struct QuadtreeOverlay {
    pipeline: RenderPipeline,
    bind_group: BindGroup,
    camera_buffer: Buffer,
    vertex_buffer: Buffer,
    vertices: Vec<[f32; 2]>,
}

impl QuadtreeOverlay {
    pub fn new(device: &Device, surface_format: TextureFormat) -> Self {
        let shader = device.create_shader_module(ShaderModuleDescriptor {
            label: Some("Quadtree Overlay Shader"),
            source: ShaderSource::Wgsl(include_str!("../shaders/quadtree_overlay.wgsl").into()),
        });

        let camera_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("Overlay Camera Buffer"),
            size: std::mem::size_of::<CameraUniform>() as u64,
            usage: BufferUsages::UNIFORM | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let vertex_buffer = device.create_buffer(&BufferDescriptor {
            label: Some("Overlay Vertex Buffer"),
            size: (MAX_OVERLAY_SEGMENTS * 2 * std::mem::size_of::<[f32; 2]>()) as u64,
            usage: BufferUsages::VERTEX | BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let bind_group_layout = device.create_bind_group_layout(&BindGroupLayoutDescriptor {
            label: Some("Overlay Bind Group Layout"),
            entries: &[BindGroupLayoutEntry {
                binding: 0,
                visibility: ShaderStages::VERTEX,
                ty: BindingType::Buffer {
                    ty: BufferBindingType::Uniform,
                    has_dynamic_offset: false,
                    min_binding_size: None,
                },
                count: None,
            }],
        });

        let bind_group = device.create_bind_group(&BindGroupDescriptor {
            label: Some("Overlay Bind Group"),
            layout: &bind_group_layout,
            entries: &[BindGroupEntry {
                binding: 0,
                resource: camera_buffer.as_entire_binding(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&PipelineLayoutDescriptor {
            label: Some("Overlay Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&RenderPipelineDescriptor {
            label: Some("Overlay Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: VertexState {
                module: &shader,
                entry_point: Some("vs_line"),
                buffers: &[VertexBufferLayout {
                    array_stride: std::mem::size_of::<[f32; 2]>() as u64,
                    step_mode: VertexStepMode::Vertex,
                    attributes: &vertex_attr_array![0 => Float32x2],
                }],
                compilation_options: Default::default(),
            },
            fragment: Some(FragmentState {
                module: &shader,
                entry_point: Some("fs_line"),
                targets: &[Some(ColorTargetState {
                    format: surface_format,
                    blend: Some(BlendState::ALPHA_BLENDING),
                    write_mask: ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: PrimitiveState {
                topology: PrimitiveTopology::LineList,
                ..Default::default()
            },
            depth_stencil: None,
            multisample: MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            pipeline,
            bind_group,
            camera_buffer,
            vertex_buffer,
            vertices: Vec::new(),
        }
    }

    fn collect_node(node: &Node, out: &mut Vec<[f32; 2]>) {
        if node.is_empty() || out.len() + 8 > MAX_OVERLAY_SEGMENTS * 2 {
            return;
        }

        let (from, to) = node.bounds();
        let corners = [
            [from.x, from.y],
            [to.x, from.y],
            [to.x, to.y],
            [from.x, to.y],
        ];
        for i in 0..4 {
            out.push(corners[i]);
            out.push(corners[(i + 1) % 4]);
        }

        if let Some(children) = node.children() {
            for child in children {
                Self::collect_node(child, out);
            }
        }
    }

    /// Record a pass drawing the occupied node boxes of `tree` on top of
    /// the already rendered frame.
    pub fn render(
        &mut self,
        encoder: &mut CommandEncoder,
        view: &TextureView,
        queue: &Queue,
        camera: CameraUniform,
        tree: &Quadtree,
    ) {
        self.vertices.clear();
        for node in tree.quadrants() {
            Self::collect_node(node, &mut self.vertices);
        }
        if self.vertices.is_empty() {
            return;
        }

        queue.write_buffer(&self.camera_buffer, 0, bytemuck::bytes_of(&camera));
        queue.write_buffer(&self.vertex_buffer, 0, bytemuck::cast_slice(&self.vertices));

        let mut render_pass = encoder.begin_render_pass(&RenderPassDescriptor {
            label: Some("Quadtree Overlay Pass"),
            color_attachments: &[Some(RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: Operations {
                    load: LoadOp::Load,
                    store: StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.vertex_buffer.slice(..));
        render_pass.draw(0..self.vertices.len() as u32, 0..1);
    }
}
