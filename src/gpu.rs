//! GPU context acquisition: instance, adapter, device and queue, plus the
//! window surface wrapper used by the viewer.

use std::sync::Arc;

use wgpu::*;
use winit::window::Window;

/// Device handle shared by the compute pipeline, the renderer and the
/// benchmark. Acquisition is once-only; subsystems clone the (refcounted)
/// device and queue handles they need.
pub struct GpuContext {
    pub adapter: Adapter,
    pub device: Arc<Device>,
    pub queue: Arc<Queue>,
}

impl GpuContext {
    /// Acquire a device without a surface, for compute-only use.
    pub async fn headless() -> Result<Self, String> {
        let instance = Instance::new(InstanceDescriptor::default());
        Self::request(&instance, None).await
    }

    async fn request(instance: &Instance, surface: Option<&Surface<'_>>) -> Result<Self, String> {
        let adapter = instance
            .request_adapter(&RequestAdapterOptions {
                power_preference: PowerPreference::HighPerformance,
                compatible_surface: surface,
                force_fallback_adapter: false,
            })
            .await
            .ok_or("No suitable GPU adapter found")?;

        log::info!("Using adapter: {:?}", adapter.get_info().name);

        let (device, queue) = adapter
            .request_device(
                &DeviceDescriptor {
                    label: Some("Main Device"),
                    required_features: Features::empty(),
                    required_limits: Limits::default(),
                    memory_hints: Default::default(),
                },
                None,
            )
            .await
            .map_err(|e| format!("Failed to create device: {:?}", e))?;

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }
}

/// Window surface plus its configuration. Owned by the viewer; resizing
/// reconfigures the surface and never touches the compute pipeline.
pub struct WindowGpu {
    pub gpu: GpuContext,
    pub surface: Surface<'static>,
    pub config: SurfaceConfiguration,
    pub surface_format: TextureFormat,
}

impl WindowGpu {
    pub async fn new(window: Arc<Window>) -> Result<Self, String> {
        let size = window.inner_size();

        let instance = Instance::new(InstanceDescriptor::default());
        let surface = instance
            .create_surface(window)
            .map_err(|e| format!("Failed to create surface: {:?}", e))?;

        let gpu = GpuContext::request(&instance, Some(&surface)).await?;

        let surface_caps = surface.get_capabilities(&gpu.adapter);
        let surface_format = surface_caps
            .formats
            .iter()
            .copied()
            .find(|f| f.is_srgb())
            .unwrap_or(surface_caps.formats[0]);

        let config = SurfaceConfiguration {
            usage: TextureUsages::RENDER_ATTACHMENT,
            format: surface_format,
            width: size.width.max(1),
            height: size.height.max(1),
            present_mode: PresentMode::AutoVsync,
            alpha_mode: surface_caps.alpha_modes[0],
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(&gpu.device, &config);

        log::info!(
            "GPU surface initialized: {}x{}, format: {:?}",
            config.width,
            config.height,
            surface_format
        );

        Ok(Self {
            gpu,
            surface,
            config,
            surface_format,
        })
    }

    pub fn resize(&mut self, width: u32, height: u32) {
        if width > 0 && height > 0 {
            self.config.width = width;
            self.config.height = height;
            self.surface.configure(&self.gpu.device, &self.config);
        }
    }
}
