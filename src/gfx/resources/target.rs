// src/gfx/resources/target.rs
//! Drawable targets
//!
//! A window surface for interactive sessions, or an offscreen texture for
//! headless runs and tests. Either way the renderer only ever sees a
//! [`Drawable`] holding a texture view.

use wgpu::{Device, TextureFormat, TextureView};

use crate::error::EngineResult;

pub enum RenderTarget {
    Surface {
        surface: wgpu::Surface<'static>,
        config: wgpu::SurfaceConfiguration,
    },
    Offscreen {
        texture: wgpu::Texture,
    },
}

/// One acquired frame to draw into
pub struct Drawable {
    view: TextureView,
    surface_texture: Option<wgpu::SurfaceTexture>,
}

impl Drawable {
    pub fn view(&self) -> &TextureView {
        &self.view
    }

    /// Queue the frame for display; a no-op for offscreen targets
    pub fn present(self) {
        if let Some(surface_texture) = self.surface_texture {
            surface_texture.present();
        }
    }
}

impl RenderTarget {
    /// Configure `surface` for `adapter` at the window's size
    pub fn for_surface(
        surface: wgpu::Surface<'static>,
        adapter: &wgpu::Adapter,
        device: &Device,
        width: u32,
        height: u32,
    ) -> Self {
        let capabilities = surface.get_capabilities(adapter);
        let format = capabilities
            .formats
            .iter()
            .copied()
            .find(|f| !f.is_srgb())
            .or_else(|| capabilities.formats.first().copied())
            .unwrap_or(TextureFormat::Bgra8Unorm);
        let present_mode = if capabilities.present_modes.contains(&wgpu::PresentMode::Fifo) {
            wgpu::PresentMode::Fifo
        } else {
            capabilities
                .present_modes
                .first()
                .copied()
                .unwrap_or(wgpu::PresentMode::AutoVsync)
        };
        let alpha_mode = capabilities
            .alpha_modes
            .first()
            .copied()
            .unwrap_or(wgpu::CompositeAlphaMode::Auto);

        let config = wgpu::SurfaceConfiguration {
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT,
            format,
            width: width.max(1),
            height: height.max(1),
            present_mode,
            alpha_mode,
            view_formats: vec![],
            desired_maximum_frame_latency: 2,
        };
        surface.configure(device, &config);
        log::info!(
            "Surface configured: {}x{} {:?}, {:?}",
            config.width,
            config.height,
            config.format,
            config.present_mode
        );

        RenderTarget::Surface { surface, config }
    }

    /// Texture target that can be copied back to the host
    pub fn offscreen(device: &Device, width: u32, height: u32, format: TextureFormat) -> Self {
        let texture = device.create_texture(&wgpu::TextureDescriptor {
            label: Some("Offscreen Target"),
            size: wgpu::Extent3d {
                width: width.max(1),
                height: height.max(1),
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: wgpu::TextureDimension::D2,
            format,
            usage: wgpu::TextureUsages::RENDER_ATTACHMENT | wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        RenderTarget::Offscreen { texture }
    }

    pub fn format(&self) -> TextureFormat {
        match self {
            RenderTarget::Surface { config, .. } => config.format,
            RenderTarget::Offscreen { texture } => texture.format(),
        }
    }

    /// Next drawable, or `None` when the surface has to be skipped this tick
    pub fn acquire(&mut self, device: &Device) -> EngineResult<Option<Drawable>> {
        match self {
            RenderTarget::Surface { surface, config } => match surface.get_current_texture() {
                Ok(surface_texture) => {
                    let view = surface_texture
                        .texture
                        .create_view(&wgpu::TextureViewDescriptor::default());
                    Ok(Some(Drawable {
                        view,
                        surface_texture: Some(surface_texture),
                    }))
                }
                Err(wgpu::SurfaceError::Lost | wgpu::SurfaceError::Outdated) => {
                    log::warn!("Surface lost or outdated, reconfiguring");
                    surface.configure(device, config);
                    Ok(None)
                }
                Err(wgpu::SurfaceError::Timeout) => {
                    log::warn!("Surface acquire timed out, skipping frame");
                    Ok(None)
                }
                Err(err) => Err(err.into()),
            },
            RenderTarget::Offscreen { texture } => Ok(Some(Drawable {
                view: texture.create_view(&wgpu::TextureViewDescriptor::default()),
                surface_texture: None,
            })),
        }
    }

    /// Reconfigure after a window resize; the grid itself is unaffected
    pub fn resize(&mut self, device: &Device, width: u32, height: u32) {
        if width == 0 || height == 0 {
            return;
        }
        if let RenderTarget::Surface { surface, config } = self {
            config.width = width;
            config.height = height;
            surface.configure(device, config);
        }
    }

    /// RGBA bytes of an offscreen target, rows tightly packed
    #[cfg(test)]
    pub fn read_pixels(&self, device: &Device, queue: &wgpu::Queue) -> Option<Vec<u8>> {
        let RenderTarget::Offscreen { texture } = self else {
            return None;
        };
        let (width, height) = (texture.width(), texture.height());
        let row_bytes = width * 4;
        let padded_row = row_bytes.div_ceil(wgpu::COPY_BYTES_PER_ROW_ALIGNMENT)
            * wgpu::COPY_BYTES_PER_ROW_ALIGNMENT;

        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Offscreen Readback Buffer"),
            size: (padded_row * height) as u64,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Offscreen Readback Encoder"),
        });
        encoder.copy_texture_to_buffer(
            wgpu::TexelCopyTextureInfo {
                texture,
                mip_level: 0,
                origin: wgpu::Origin3d::ZERO,
                aspect: wgpu::TextureAspect::All,
            },
            wgpu::TexelCopyBufferInfo {
                buffer: &staging,
                layout: wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(padded_row),
                    rows_per_image: Some(height),
                },
            },
            wgpu::Extent3d {
                width,
                height,
                depth_or_array_layers: 1,
            },
        );
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::PollType::Wait).ok()?;
        rx.recv().ok()?.ok()?;

        let view = slice.get_mapped_range();
        let mut pixels = Vec::with_capacity((row_bytes * height) as usize);
        for row in view.chunks(padded_row as usize) {
            pixels.extend_from_slice(&row[..row_bytes as usize]);
        }
        drop(view);
        staging.unmap();
        Some(pixels)
    }
}
