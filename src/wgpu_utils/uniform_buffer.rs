// src/wgpu_utils/uniform_buffer.rs - Typed uniform and array buffers
use std::marker::PhantomData;

use crate::error::{EngineError, EngineResult};

/// Typed uniform buffer holding one `Content`, written once at creation
pub struct UniformBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
}

impl<Content: bytemuck::Pod> UniformBuffer<Content> {
    fn name() -> &'static str {
        let type_name = std::any::type_name::<Content>();
        let pos = type_name.rfind(':').unwrap_or(0);
        if pos > 0 {
            &type_name[(pos + 1)..]
        } else {
            type_name
        }
    }

    /// Create buffer with initial data
    pub fn new_with_data(device: &wgpu::Device, initial_content: &Content) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(&format!("UniformBuffer: {}", Self::name())),
            size: std::mem::size_of::<Content>() as u64,
            usage: wgpu::BufferUsages::UNIFORM | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: true,
        });

        buffer
            .slice(..)
            .get_mapped_range_mut()
            .copy_from_slice(bytemuck::bytes_of(initial_content));
        buffer.unmap();

        UniformBuffer {
            buffer,
            content_type: PhantomData,
        }
    }

    pub fn binding_resource(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }
}

/// Fixed-length array of `Content` on the device
pub struct ArrayBuffer<Content> {
    buffer: wgpu::Buffer,
    content_type: PhantomData<Content>,
    len: usize,
}

impl<Content: bytemuck::Pod> ArrayBuffer<Content> {
    fn byte_len(len: usize) -> u64 {
        (len * std::mem::size_of::<Content>()) as u64
    }

    /// Create a storage array initialised from `data`
    pub fn new_with_data(
        device: &wgpu::Device,
        label: &str,
        data: &[Content],
        extra_usage: wgpu::BufferUsages,
    ) -> Self {
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: Self::byte_len(data.len()),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC
                | extra_usage,
            mapped_at_creation: true,
        });

        buffer
            .slice(..)
            .get_mapped_range_mut()
            .copy_from_slice(bytemuck::cast_slice(data));
        buffer.unmap();

        ArrayBuffer {
            buffer,
            content_type: PhantomData,
            len: data.len(),
        }
    }

    /// Create a zero-filled storage array of `len` elements
    pub fn new_zeroed(
        device: &wgpu::Device,
        label: &str,
        len: usize,
        extra_usage: wgpu::BufferUsages,
    ) -> Self {
        // Buffers are zero-initialised by wgpu
        let buffer = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some(label),
            size: Self::byte_len(len),
            usage: wgpu::BufferUsages::STORAGE
                | wgpu::BufferUsages::COPY_DST
                | wgpu::BufferUsages::COPY_SRC
                | extra_usage,
            mapped_at_creation: false,
        });

        ArrayBuffer {
            buffer,
            content_type: PhantomData,
            len,
        }
    }

    /// Overwrite the whole array; the length must match
    pub fn write(&self, queue: &wgpu::Queue, what: &'static str, data: &[Content]) -> EngineResult<()> {
        if data.len() != self.len {
            return Err(EngineError::DimensionMismatch {
                what,
                expected: self.len,
                actual: data.len(),
            });
        }
        queue.write_buffer(&self.buffer, 0, bytemuck::cast_slice(data));
        Ok(())
    }

    pub fn binding_resource(&self) -> wgpu::BindingResource<'_> {
        self.buffer.as_entire_binding()
    }

    pub fn buffer(&self) -> &wgpu::Buffer {
        &self.buffer
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Copy the array back to the host, blocking until the device is idle
    #[cfg(test)]
    pub fn read_back(&self, device: &wgpu::Device, queue: &wgpu::Queue) -> Vec<Content> {
        let size = self.buffer.size();
        let staging = device.create_buffer(&wgpu::BufferDescriptor {
            label: Some("Readback Staging Buffer"),
            size,
            usage: wgpu::BufferUsages::MAP_READ | wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        let mut encoder = device.create_command_encoder(&wgpu::CommandEncoderDescriptor {
            label: Some("Readback Encoder"),
        });
        encoder.copy_buffer_to_buffer(&self.buffer, 0, &staging, 0, size);
        queue.submit(std::iter::once(encoder.finish()));

        let slice = staging.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        slice.map_async(wgpu::MapMode::Read, move |result| {
            let _ = tx.send(result);
        });
        device.poll(wgpu::PollType::Wait).expect("device poll failed");
        rx.recv()
            .expect("map callback dropped")
            .expect("buffer map failed");

        let view = slice.get_mapped_range();
        let data = bytemuck::cast_slice::<u8, Content>(&view[..]).to_vec();
        drop(view);
        staging.unmap();
        data
    }
}
