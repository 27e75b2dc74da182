//! Accelerator acquisition
//!
//! Finds an adapter, checks it can run compute work, and opens the device.
//! Windowed sessions also get the surface the adapter was chosen for.

use std::sync::Arc;

use winit::window::Window;

use crate::error::{EngineError, EngineResult};

/// Device and queue shared by every GPU component
pub struct GpuContext {
    adapter: wgpu::Adapter,
    device: Arc<wgpu::Device>,
    queue: Arc<wgpu::Queue>,
}

impl GpuContext {
    /// Open a device able to present to `window`
    pub fn new(window: Arc<Window>) -> EngineResult<(Self, wgpu::Surface<'static>)> {
        let instance = Self::instance();
        let surface = instance.create_surface(window)?;
        let context = pollster::block_on(Self::request(&instance, Some(&surface)))?;
        Ok((context, surface))
    }

    /// Open a device with no presentation target
    pub fn new_headless() -> EngineResult<Self> {
        let instance = Self::instance();
        pollster::block_on(Self::request(&instance, None))
    }

    fn instance() -> wgpu::Instance {
        wgpu::Instance::new(&wgpu::InstanceDescriptor {
            backends: wgpu::Backends::all(),
            ..Default::default()
        })
    }

    async fn request(
        instance: &wgpu::Instance,
        compatible_surface: Option<&wgpu::Surface<'_>>,
    ) -> EngineResult<Self> {
        let adapter = instance
            .request_adapter(&wgpu::RequestAdapterOptions {
                power_preference: wgpu::PowerPreference::HighPerformance,
                compatible_surface,
                force_fallback_adapter: false,
            })
            .await?;

        let info = adapter.get_info();
        let downlevel = adapter.get_downlevel_capabilities();
        if !downlevel.flags.contains(wgpu::DownlevelFlags::COMPUTE_SHADERS) {
            return Err(EngineError::MissingCapability {
                adapter: info.name,
                capability: "compute shaders",
            });
        }

        let supported = adapter.limits();
        let (device, queue) = adapter
            .request_device(&wgpu::DeviceDescriptor {
                label: Some("Gridlife Device"),
                required_features: wgpu::Features::empty(),
                required_limits: wgpu::Limits {
                    max_storage_buffer_binding_size: supported.max_storage_buffer_binding_size,
                    max_buffer_size: supported.max_buffer_size,
                    max_compute_workgroups_per_dimension: supported
                        .max_compute_workgroups_per_dimension,
                    ..wgpu::Limits::downlevel_defaults().using_resolution(supported)
                },
                memory_hints: wgpu::MemoryHints::default(),
                trace: wgpu::Trace::Off,
            })
            .await?;

        log::info!("GPU: {} ({:?}, {:?})", info.name, info.backend, info.device_type);

        Ok(Self {
            adapter,
            device: Arc::new(device),
            queue: Arc::new(queue),
        })
    }

    pub fn adapter(&self) -> &wgpu::Adapter {
        &self.adapter
    }

    pub fn device(&self) -> &Arc<wgpu::Device> {
        &self.device
    }

    pub fn queue(&self) -> &Arc<wgpu::Queue> {
        &self.queue
    }

    pub fn limits(&self) -> wgpu::Limits {
        self.device.limits()
    }
}
