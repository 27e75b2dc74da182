//! Instanced Cell Rendering
//!
//! One shared quad drawn once per cell. The instance index picks the cell's
//! lattice position, and the cell state, bound as a per-instance vertex
//! attribute straight from the current state buffer, scales the quad: alive
//! cells draw at full size, dead cells collapse to a point and cover nothing.
//!
//! [`CellPlacement`] is the host-side model of the vertex stage and is what
//! the reference backend evaluates instead of rasterising.

use bytemuck::{Pod, Zeroable};
use cgmath::{Vector2, Vector4};
use wgpu::util::DeviceExt;
use wgpu::{BindGroup, Buffer, CommandEncoder, Device, RenderPipeline, TextureView};

use crate::simulation::{
    gpu::CellStateStore,
    grid::GridSize,
    scheduler::Stepped,
};
use crate::wgpu_utils;

/// Quad corner in cell units
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct QuadVertex {
    pub position: [f32; 2],
}

impl QuadVertex {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![0 => Float32x2];

    pub fn desc() -> wgpu::VertexBufferLayout<'static> {
        wgpu::VertexBufferLayout {
            array_stride: std::mem::size_of::<QuadVertex>() as wgpu::BufferAddress,
            step_mode: wgpu::VertexStepMode::Vertex,
            attributes: &Self::ATTRIBUTES,
        }
    }
}

/// Per-instance cell state, read directly from a state buffer
fn state_desc() -> wgpu::VertexBufferLayout<'static> {
    const ATTRIBUTES: [wgpu::VertexAttribute; 1] = wgpu::vertex_attr_array![1 => Uint32];
    wgpu::VertexBufferLayout {
        array_stride: std::mem::size_of::<u32>() as wgpu::BufferAddress,
        step_mode: wgpu::VertexStepMode::Instance,
        attributes: &ATTRIBUTES,
    }
}

/// Square centred on the origin with half-extent `extent`
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UnitQuad {
    extent: f32,
}

impl UnitQuad {
    pub const INDICES: [u16; 6] = [0, 1, 2, 2, 3, 0];

    pub fn new(extent: f32) -> Self {
        Self { extent }
    }

    pub fn extent(&self) -> f32 {
        self.extent
    }

    /// Corners in counter-clockwise order
    pub fn vertices(&self) -> [QuadVertex; 4] {
        let e = self.extent;
        [
            QuadVertex { position: [-e, -e] },
            QuadVertex { position: [e, -e] },
            QuadVertex { position: [e, e] },
            QuadVertex { position: [-e, e] },
        ]
    }

    /// Lower-left and upper-right corners
    pub fn diagonal(&self) -> [Vector2<f32>; 2] {
        let e = self.extent;
        [Vector2::new(-e, -e), Vector2::new(e, e)]
    }
}

impl Default for UnitQuad {
    fn default() -> Self {
        Self::new(0.8)
    }
}

struct QuadMesh {
    vertex_buffer: Buffer,
    index_buffer: Buffer,
    index_count: u32,
}

impl QuadMesh {
    fn new(device: &Device, quad: &UnitQuad) -> Self {
        let vertex_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cell Quad Vertex Buffer"),
            contents: bytemuck::cast_slice(&quad.vertices()),
            usage: wgpu::BufferUsages::VERTEX,
        });
        let index_buffer = device.create_buffer_init(&wgpu::util::BufferInitDescriptor {
            label: Some("Cell Quad Index Buffer"),
            contents: bytemuck::cast_slice(&UnitQuad::INDICES),
            usage: wgpu::BufferUsages::INDEX,
        });
        Self {
            vertex_buffer,
            index_buffer,
            index_count: UnitQuad::INDICES.len() as u32,
        }
    }
}

/// Where and how one instance is drawn
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CellPlacement {
    /// Lattice coordinate of the instance
    pub cell: Vector2<f32>,
}

impl CellPlacement {
    /// Instance `index` sits at column `index % width`, row `index / width`
    pub fn for_index(index: usize, grid: GridSize) -> Self {
        let (x, y) = grid.coords(index);
        Self {
            cell: Vector2::new(x as f32, y as f32),
        }
    }

    /// Normalised device position of a quad corner scaled by the cell state
    pub fn vertex_ndc(&self, vertex: Vector2<f32>, scale: f32, grid: GridSize) -> Vector2<f32> {
        let dims = Vector2::new(grid.width() as f32, grid.height() as f32);
        Vector2::new(
            (vertex.x * scale + 1.0) / dims.x - 1.0 + self.cell.x / dims.x * 2.0,
            (vertex.y * scale + 1.0) / dims.y - 1.0 + self.cell.y / dims.y * 2.0,
        )
    }

    /// Gradient colour of the cell, independent of its state
    pub fn color(&self, grid: GridSize) -> Vector4<f32> {
        let u = self.cell.x / grid.width() as f32;
        let v = self.cell.y / grid.height() as f32;
        Vector4::new(u, v, 1.0 - u, 1.0)
    }
}

/// Instanced draw of every cell of the current state buffer
pub struct CellRenderer {
    quad: QuadMesh,
    pipeline: RenderPipeline,
    bind_group: BindGroup,
    instance_count: u32,
    clear_color: wgpu::Color,
}

impl CellRenderer {
    pub fn new(
        device: &Device,
        store: &CellStateStore,
        format: wgpu::TextureFormat,
        quad: &UnitQuad,
        clear_color: wgpu::Color,
    ) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Cell Renderer Shader"),
            source: wgpu::ShaderSource::Wgsl(CELL_SHADER.into()),
        });

        let bind_group_layout = device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Cell Renderer Bind Group Layout"),
            entries: &[wgpu_utils::layout_entry(
                0,
                wgpu::ShaderStages::VERTEX,
                wgpu_utils::uniform(),
            )],
        });
        let bind_group = device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some("Cell Renderer Bind Group"),
            layout: &bind_group_layout,
            entries: &[wgpu::BindGroupEntry {
                binding: 0,
                resource: store.grid_uniform().binding_resource(),
            }],
        });

        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Cell Renderer Pipeline Layout"),
            bind_group_layouts: &[&bind_group_layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_render_pipeline(&wgpu::RenderPipelineDescriptor {
            label: Some("Cell Renderer Pipeline"),
            layout: Some(&pipeline_layout),
            vertex: wgpu::VertexState {
                module: &shader,
                entry_point: Some("vs_main"),
                buffers: &[QuadVertex::desc(), state_desc()],
                compilation_options: Default::default(),
            },
            fragment: Some(wgpu::FragmentState {
                module: &shader,
                entry_point: Some("fs_main"),
                targets: &[Some(wgpu::ColorTargetState {
                    format,
                    blend: Some(wgpu::BlendState::REPLACE),
                    write_mask: wgpu::ColorWrites::ALL,
                })],
                compilation_options: Default::default(),
            }),
            primitive: wgpu::PrimitiveState {
                topology: wgpu::PrimitiveTopology::TriangleList,
                strip_index_format: None,
                front_face: wgpu::FrontFace::Ccw,
                cull_mode: None,
                unclipped_depth: false,
                polygon_mode: wgpu::PolygonMode::Fill,
                conservative: false,
            },
            depth_stencil: None,
            multisample: wgpu::MultisampleState::default(),
            multiview: None,
            cache: None,
        });

        Self {
            quad: QuadMesh::new(device, quad),
            pipeline,
            bind_group,
            instance_count: store.grid().cell_count() as u32,
            clear_color,
        }
    }

    pub fn instance_count(&self) -> u32 {
        self.instance_count
    }

    /// Clear `view` and draw the buffer the last generation pass wrote
    pub fn encode(
        &self,
        encoder: &mut CommandEncoder,
        view: &TextureView,
        store: &CellStateStore,
        stepped: &Stepped,
    ) {
        let state = store.buffer(stepped.current());

        let mut render_pass = encoder.begin_render_pass(&wgpu::RenderPassDescriptor {
            label: Some("Cell Render Pass"),
            color_attachments: &[Some(wgpu::RenderPassColorAttachment {
                view,
                resolve_target: None,
                ops: wgpu::Operations {
                    load: wgpu::LoadOp::Clear(self.clear_color),
                    store: wgpu::StoreOp::Store,
                },
            })],
            depth_stencil_attachment: None,
            timestamp_writes: None,
            occlusion_query_set: None,
        });

        render_pass.set_pipeline(&self.pipeline);
        render_pass.set_bind_group(0, &self.bind_group, &[]);
        render_pass.set_vertex_buffer(0, self.quad.vertex_buffer.slice(..));
        render_pass.set_vertex_buffer(1, state.buffer().slice(..));
        render_pass.set_index_buffer(self.quad.index_buffer.slice(..), wgpu::IndexFormat::Uint16);

        render_pass.draw_indexed(0..self.quad.index_count, 0, 0..self.instance_count);
    }
}

const CELL_SHADER: &str = r#"
struct Grid {
    width: u32,
    height: u32,
    _padding: vec2<u32>,
}

@group(0) @binding(0) var<uniform> grid: Grid;

struct VertexOutput {
    @builtin(position) clip_position: vec4<f32>,
    @location(0) @interpolate(flat) uv: vec2<f32>,
}

@vertex
fn vs_main(
    @location(0) position: vec2<f32>,
    @location(1) state: u32,
    @builtin(instance_index) instance: u32,
) -> VertexOutput {
    let dims = vec2<f32>(f32(grid.width), f32(grid.height));
    let cell = vec2<f32>(f32(instance % grid.width), f32(instance / grid.width));
    let scale = f32(state);
    let ndc = (position * scale + 1.0) / dims - 1.0 + cell / dims * 2.0;

    var out: VertexOutput;
    out.clip_position = vec4<f32>(ndc, 0.0, 1.0);
    out.uv = cell / dims;
    return out;
}

@fragment
fn fs_main(in: VertexOutput) -> @location(0) vec4<f32> {
    return vec4<f32>(in.uv, 1.0 - in.uv.x, 1.0);
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    fn grid(w: u32, h: u32) -> GridSize {
        GridSize::new(w, h).unwrap()
    }

    #[test]
    fn test_for_index_is_row_major() {
        let g = grid(5, 4);
        assert_eq!(CellPlacement::for_index(0, g).cell, Vector2::new(0.0, 0.0));
        assert_eq!(CellPlacement::for_index(7, g).cell, Vector2::new(2.0, 1.0));
        assert_eq!(CellPlacement::for_index(19, g).cell, Vector2::new(4.0, 3.0));
    }

    #[test]
    fn test_live_cell_stays_inside_its_slot() {
        let g = grid(4, 4);
        let quad = UnitQuad::default();
        let [low, high] = quad.diagonal();
        for i in 0..g.cell_count() {
            let placement = CellPlacement::for_index(i, g);
            let a = placement.vertex_ndc(low, 1.0, g);
            let b = placement.vertex_ndc(high, 1.0, g);
            // Slot i spans [cell * 2 / dim - 1, (cell + 1) * 2 / dim - 1]
            let slot_low = placement.cell * 0.5 - Vector2::new(1.0, 1.0);
            let slot_high = slot_low + Vector2::new(0.5, 0.5);
            assert!(a.x > slot_low.x && a.y > slot_low.y);
            assert!(b.x < slot_high.x && b.y < slot_high.y);
        }
    }

    #[test]
    fn test_first_cell_centre() {
        let g = grid(4, 4);
        let placement = CellPlacement::for_index(0, g);
        let centre = placement.vertex_ndc(Vector2::new(0.0, 0.0), 1.0, g);
        assert!((centre.x - -0.75).abs() < 1e-6);
        assert!((centre.y - -0.75).abs() < 1e-6);
    }

    #[test]
    fn test_dead_cell_collapses_to_a_point() {
        let g = grid(3, 2);
        let quad = UnitQuad::default();
        let [low, high] = quad.diagonal();
        let placement = CellPlacement::for_index(4, g);
        assert_eq!(
            placement.vertex_ndc(low, 0.0, g),
            placement.vertex_ndc(high, 0.0, g)
        );
    }

    #[test]
    fn test_color_gradient() {
        let g = grid(4, 2);
        let color = CellPlacement::for_index(5, g).color(g);
        assert_eq!(color, Vector4::new(0.25, 0.5, 0.75, 1.0));
    }

    #[test]
    fn test_quad_vertices_match_extent() {
        let quad = UnitQuad::new(0.5);
        let vertices = quad.vertices();
        assert_eq!(vertices[0].position, [-0.5, -0.5]);
        assert_eq!(vertices[2].position, [0.5, 0.5]);
        assert_eq!(quad.extent(), 0.5);
    }
}
