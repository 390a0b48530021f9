use std::sync::Arc;
use std::time::Instant;

use glam::Vec2;
use pollster::FutureExt;
use winit::application::ApplicationHandler;
use winit::event::WindowEvent;
use winit::event_loop::{ActiveEventLoop, ControlFlow, EventLoop};
use winit::keyboard::KeyCode;
use winit::window::{Window, WindowId};

use gravity_simulator::camera::Camera;
use gravity_simulator::gpu::WindowGpu;
use gravity_simulator::input::InputState;
use gravity_simulator::presets;
use gravity_simulator::renderer::{ParticleRenderer, QuadtreeOverlay, RenderSource};
use gravity_simulator::{utils, World};

/// Fixed physics time step in seconds.
const PHYS_STEP: f32 = 0.01;

/// Cap on catch-up physics steps folded into one frame.
const MAX_STEPS_PER_FRAME: u32 = 8;

/// Which kernel advances the simulation.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
enum Kernel {
    Gpu,
    CpuExact,
    CpuTree,
}

struct Viewer {
    window: Arc<Window>,
    gpu: WindowGpu,
    world: World,
    renderer: ParticleRenderer,
    overlay: QuadtreeOverlay,
    camera: Camera,
    input: InputState,
    kernel: Kernel,
    speed: f32,
    paused: bool,
    show_tree: bool,
    phys_time: f32,
    last_frame: Instant,
}

impl Viewer {
    fn new(window: Arc<Window>, preset_id: &str) -> Self {
        let gpu = WindowGpu::new(window.clone())
            .block_on()
            .unwrap_or_else(|e| {
                log::error!("GPU initialization failed: {}", e);
                std::process::exit(1);
            });

        let preset = presets::get_preset(preset_id).unwrap_or_else(|| {
            let known: Vec<String> = presets::get_preset_list().into_iter().map(|p| p.id).collect();
            log::error!("Unknown preset '{}'; known: {}", preset_id, known.join(", "));
            std::process::exit(1);
        });
        log::info!("Loading scene preset: {}", preset.name);

        let mut world = World::new(preset.scene.generate());
        world.init_gpu(&gpu.gpu);
        // prime the front buffer so the first frame has data to draw
        world.gpu_step(0.0, 1);

        let renderer = ParticleRenderer::new(
            &gpu.gpu.device,
            gpu.surface_format,
            world.sim().unwrap(),
            world.len() as u32,
        );
        let overlay = QuadtreeOverlay::new(&gpu.gpu.device, gpu.surface_format);

        let size = window.inner_size();
        let mut camera = Camera::new(size.width.max(1) as f32 / size.height.max(1) as f32);
        let (min, max) = particle_bounds(world.particles());
        camera.fit(min, max);

        Self {
            window,
            gpu,
            world,
            renderer,
            overlay,
            camera,
            input: InputState::new(),
            kernel: Kernel::Gpu,
            speed: 1.0,
            paused: false,
            show_tree: false,
            phys_time: 0.0,
            last_frame: Instant::now(),
        }
    }

    fn handle_controls(&mut self) {
        if self.input.was_pressed(KeyCode::Space) {
            self.paused = !self.paused;
        }
        if self.input.was_pressed(KeyCode::ArrowLeft) && self.speed > 0.2 {
            self.speed *= 0.8;
        }
        if self.input.was_pressed(KeyCode::ArrowRight) {
            self.speed *= 1.2;
        }
        if self.input.was_pressed(KeyCode::Digit0) {
            self.speed = 1.0;
        }
        if self.input.was_pressed(KeyCode::KeyB) {
            self.show_tree = !self.show_tree;
        }

        for (key, kernel) in [
            (KeyCode::KeyG, Kernel::Gpu),
            (KeyCode::KeyC, Kernel::CpuExact),
            (KeyCode::KeyT, Kernel::CpuTree),
        ] {
            if self.input.was_pressed(key) && self.kernel != kernel {
                log::info!("switching kernel to {:?}", kernel);
                self.kernel = kernel;
            }
        }
    }

    fn update(&mut self) {
        let now = Instant::now();
        let dt = (now - self.last_frame).as_secs_f32().min(0.25);
        self.last_frame = now;

        self.handle_controls();

        if !self.paused {
            self.phys_time += self.speed * dt;
            let pending = (self.phys_time / PHYS_STEP) as u32;
            if pending > 0 {
                let n = pending.min(MAX_STEPS_PER_FRAME);
                self.phys_time = (self.phys_time - n as f32 * PHYS_STEP).min(PHYS_STEP);

                match self.kernel {
                    Kernel::Gpu => self.world.gpu_step(PHYS_STEP, n),
                    Kernel::CpuExact => self.world.cpu_step(PHYS_STEP, n),
                    Kernel::CpuTree => self.world.cpu_step_approx(PHYS_STEP, n),
                }
            }
        }

        self.camera.update(&self.input, dt);
        self.input.clear_frame_state();
    }

    fn render(&mut self) -> Result<(), wgpu::SurfaceError> {
        let surface_texture = self.gpu.surface.get_current_texture()?;
        let view = surface_texture
            .texture
            .create_view(&wgpu::TextureViewDescriptor::default());

        let mut encoder =
            self.gpu
                .gpu
                .device
                .create_command_encoder(&wgpu::CommandEncoderDescriptor {
                    label: Some("Frame Encoder"),
                });

        // GPU frames read the compute front buffer directly; CPU frames
        // re-upload the host array (downloading from the GPU is a no-op
        // then, since the CPU kernel left the host side fresh)
        let camera = self.camera.uniform_data();
        let source = match self.kernel {
            Kernel::Gpu => RenderSource::GpuFront,
            _ => RenderSource::Host(self.world.particles()),
        };
        self.renderer
            .render(&mut encoder, &view, &self.gpu.gpu.queue, camera, source);

        if self.show_tree && self.kernel == Kernel::CpuTree {
            if let Some(tree) = self.world.quadtree() {
                self.overlay
                    .render(&mut encoder, &view, &self.gpu.gpu.queue, camera, tree);
            }
        }

        self.gpu.gpu.queue.submit(std::iter::once(encoder.finish()));
        surface_texture.present();
        Ok(())
    }

    fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.gpu.resize(width, height);
            self.camera.aspect = width as f32 / height as f32;
        }
    }
}

fn particle_bounds(particles: &[gravity_simulator::Particle]) -> (Vec2, Vec2) {
    let mut min = Vec2::splat(f32::MAX);
    let mut max = Vec2::splat(f32::MIN);
    for p in particles {
        min = min.min(p.pos);
        max = max.max(p.pos);
    }
    if particles.is_empty() {
        (Vec2::ZERO, Vec2::ZERO)
    } else {
        (min, max)
    }
}

struct App {
    preset_id: String,
    viewer: Option<Viewer>,
}

impl ApplicationHandler for App {
    fn resumed(&mut self, event_loop: &ActiveEventLoop) {
        if self.viewer.is_none() {
            let attributes = Window::default_attributes()
                .with_title("Gravity Simulator")
                .with_inner_size(winit::dpi::LogicalSize::new(1280, 720));

            let window = Arc::new(
                event_loop
                    .create_window(attributes)
                    .expect("Failed to create window"),
            );
            self.viewer = Some(Viewer::new(window, &self.preset_id));
        }
    }

    fn window_event(&mut self, event_loop: &ActiveEventLoop, _id: WindowId, event: WindowEvent) {
        let Some(viewer) = &mut self.viewer else {
            return;
        };

        viewer.input.handle_window_event(&event);

        match event {
            WindowEvent::CloseRequested => event_loop.exit(),
            WindowEvent::Resized(size) => viewer.resize(size.width, size.height),
            WindowEvent::RedrawRequested => {
                viewer.update();
                match viewer.render() {
                    Ok(()) => {}
                    Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                        let size = viewer.window.inner_size();
                        viewer.resize(size.width, size.height);
                    }
                    Err(wgpu::SurfaceError::Timeout) => {
                        log::warn!("Surface timeout, skipping frame");
                    }
                    Err(wgpu::SurfaceError::OutOfMemory) => {
                        log::error!("Surface out of memory, exiting");
                        event_loop.exit();
                    }
                }
            }
            _ => {}
        }
    }

    fn about_to_wait(&mut self, _event_loop: &ActiveEventLoop) {
        if let Some(viewer) = &self.viewer {
            viewer.window.request_redraw();
        }
    }
}

fn main() {
    utils::init();

    let preset_id = std::env::args()
        .nth(1)
        .unwrap_or_else(|| presets::DEFAULT_PRESET_ID.to_string());

    let event_loop = EventLoop::new().expect("Failed to create event loop");
    event_loop.set_control_flow(ControlFlow::Poll);

    let mut app = App {
        preset_id,
        viewer: None,
    };
    event_loop.run_app(&mut app).expect("Failed to run event loop");
}
