//! Generation kernel and device-side state store
//!
//! [`CellStateStore`] owns the A/B state buffers plus the grid uniform, and
//! [`LifeKernel`] records one compute pass that reads one buffer and writes
//! the other. Bind groups are built once per orientation, so selecting a pass
//! is an index, never a resource allocation.

use bytemuck::{Pod, Zeroable};
use wgpu::{BindGroup, BindGroupLayout, CommandEncoder, ComputePipeline, Device, Queue};

use super::grid::{BufferRole, GridSize, KernelPass, PingPong, TileSize};
use crate::config::EngineConfig;
use crate::error::{EngineError, EngineResult};
use crate::wgpu_utils::{self, ArrayBuffer, UniformBuffer};

/// Grid dimensions as seen by both shaders
#[repr(C)]
#[derive(Copy, Clone, Debug, PartialEq, Eq, Pod, Zeroable)]
pub struct GridUniform {
    pub width: u32,
    pub height: u32,
    _padding: [u32; 2],
}

impl GridUniform {
    pub fn new(grid: GridSize) -> Self {
        Self {
            width: grid.width(),
            height: grid.height(),
            _padding: [0; 2],
        }
    }
}

/// Check a session against what the device can actually run
pub fn check_limits(limits: &wgpu::Limits, config: &EngineConfig) -> EngineResult<()> {
    let grid = config.grid;
    let tile = config.tile;
    let exceeds = |reason: String| EngineError::GridExceedsLimits {
        width: grid.width(),
        height: grid.height(),
        reason,
    };

    let (groups_x, groups_y) = tile.workgroups(grid);
    let max_groups = limits.max_compute_workgroups_per_dimension;
    if groups_x > max_groups || groups_y > max_groups {
        return Err(exceeds(format!(
            "{groups_x}x{groups_y} workgroups, device allows {max_groups} per dimension"
        )));
    }

    if tile.width() > limits.max_compute_workgroup_size_x
        || tile.height() > limits.max_compute_workgroup_size_y
        || tile.width().saturating_mul(tile.height()) > limits.max_compute_invocations_per_workgroup
    {
        return Err(exceeds(format!(
            "{}x{} tile exceeds the device workgroup size",
            tile.width(),
            tile.height()
        )));
    }

    let bytes = config.state_buffer_size();
    if bytes > limits.max_storage_buffer_binding_size as u64 || bytes > limits.max_buffer_size {
        return Err(exceeds(format!(
            "{bytes} byte state buffer, device binds at most {}",
            limits.max_storage_buffer_binding_size
        )));
    }
    Ok(())
}

/// Device-resident A/B cell state plus the grid uniform
pub struct CellStateStore {
    grid: GridSize,
    buffers: PingPong<ArrayBuffer<u32>>,
    grid_uniform: UniformBuffer<GridUniform>,
}

impl CellStateStore {
    /// Upload `seed` into A; B is allocated zeroed and first written by the
    /// generation pass of step 0.
    pub fn new(device: &Device, grid: GridSize, seed: &[u32]) -> EngineResult<Self> {
        grid.check_len("Seed", seed.len())?;

        // Both buffers double as per-instance vertex data for the draw
        let a = ArrayBuffer::new_with_data(device, "Cell State A", seed, wgpu::BufferUsages::VERTEX);
        let b = ArrayBuffer::new_zeroed(
            device,
            "Cell State B",
            grid.cell_count(),
            wgpu::BufferUsages::VERTEX,
        );

        Ok(Self {
            grid,
            buffers: PingPong::new(a, b),
            grid_uniform: UniformBuffer::new_with_data(device, &GridUniform::new(grid)),
        })
    }

    pub fn grid(&self) -> GridSize {
        self.grid
    }

    pub fn buffer(&self, role: BufferRole) -> &ArrayBuffer<u32> {
        self.buffers.get(role)
    }

    pub fn grid_uniform(&self) -> &UniformBuffer<GridUniform> {
        &self.grid_uniform
    }

    /// Overwrite one buffer from the host, ordered before the next submission
    pub fn upload(&self, queue: &Queue, role: BufferRole, cells: &[u32]) -> EngineResult<()> {
        let what = match role {
            BufferRole::A => "Cell State A",
            BufferRole::B => "Cell State B",
        };
        self.buffers.get(role).write(queue, what, cells)
    }
}

/// Compute pipeline producing the next generation
pub struct LifeKernel {
    pipeline: ComputePipeline,
    // Indexed by the read role's slot
    bind_groups: [BindGroup; 2],
    workgroups: (u32, u32),
}

impl LifeKernel {
    pub fn new(device: &Device, store: &CellStateStore, tile: TileSize) -> Self {
        let shader = device.create_shader_module(wgpu::ShaderModuleDescriptor {
            label: Some("Life Kernel Shader"),
            source: wgpu::ShaderSource::Wgsl(kernel_source(tile).into()),
        });

        let layout = Self::bind_group_layout(device);
        let pipeline_layout = device.create_pipeline_layout(&wgpu::PipelineLayoutDescriptor {
            label: Some("Life Kernel Pipeline Layout"),
            bind_group_layouts: &[&layout],
            push_constant_ranges: &[],
        });

        let pipeline = device.create_compute_pipeline(&wgpu::ComputePipelineDescriptor {
            label: Some("Life Kernel Pipeline"),
            layout: Some(&pipeline_layout),
            module: &shader,
            entry_point: Some("main"),
            compilation_options: Default::default(),
            cache: None,
        });

        let bind_groups = [BufferRole::A, BufferRole::B]
            .map(|read| Self::create_bind_group(device, &layout, store, read));

        Self {
            pipeline,
            bind_groups,
            workgroups: tile.workgroups(store.grid()),
        }
    }

    fn bind_group_layout(device: &Device) -> BindGroupLayout {
        let visibility = wgpu::ShaderStages::COMPUTE;
        device.create_bind_group_layout(&wgpu::BindGroupLayoutDescriptor {
            label: Some("Life Kernel Bind Group Layout"),
            entries: &[
                wgpu_utils::layout_entry(0, visibility, wgpu_utils::uniform()),
                wgpu_utils::layout_entry(1, visibility, wgpu_utils::storage_buffer_read_only()),
                wgpu_utils::layout_entry(2, visibility, wgpu_utils::storage_buffer_read_write()),
            ],
        })
    }

    fn create_bind_group(
        device: &Device,
        layout: &BindGroupLayout,
        store: &CellStateStore,
        read: BufferRole,
    ) -> BindGroup {
        let write = read.other();
        device.create_bind_group(&wgpu::BindGroupDescriptor {
            label: Some(&format!(
                "Life Kernel Bind Group {} -> {}",
                read.label(),
                write.label()
            )),
            layout,
            entries: &[
                wgpu::BindGroupEntry {
                    binding: 0,
                    resource: store.grid_uniform().binding_resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 1,
                    resource: store.buffer(read).binding_resource(),
                },
                wgpu::BindGroupEntry {
                    binding: 2,
                    resource: store.buffer(write).binding_resource(),
                },
            ],
        })
    }

    pub fn workgroups(&self) -> (u32, u32) {
        self.workgroups
    }

    /// Record one generation pass reading `pass.read` and writing `pass.write`
    pub fn encode(&self, encoder: &mut CommandEncoder, pass: KernelPass) {
        let mut compute_pass = encoder.begin_compute_pass(&wgpu::ComputePassDescriptor {
            label: Some("Life Kernel Pass"),
            timestamp_writes: None,
        });
        compute_pass.set_pipeline(&self.pipeline);
        compute_pass.set_bind_group(0, &self.bind_groups[pass.read.slot()], &[]);
        compute_pass.dispatch_workgroups(self.workgroups.0, self.workgroups.1, 1);
    }
}

/// Kernel WGSL with the workgroup size filled in
pub fn kernel_source(tile: TileSize) -> String {
    LIFE_KERNEL_SHADER
        .replace("$TILE_W", &tile.width().to_string())
        .replace("$TILE_H", &tile.height().to_string())
}

const LIFE_KERNEL_SHADER: &str = r#"
struct Grid {
    width: u32,
    height: u32,
    _padding: vec2<u32>,
}

@group(0) @binding(0) var<uniform> grid: Grid;
@group(0) @binding(1) var<storage, read> cells_in: array<u32>;
@group(0) @binding(2) var<storage, read_write> cells_out: array<u32>;

fn cell_index(x: u32, y: u32) -> u32 {
    return y * grid.width + x;
}

@compute @workgroup_size($TILE_W, $TILE_H)
fn main(@builtin(global_invocation_id) id: vec3<u32>) {
    let x = id.x;
    let y = id.y;
    // The last row and column of tiles may overshoot the grid
    if (x >= grid.width || y >= grid.height) {
        return;
    }

    let left = (x + grid.width - 1u) % grid.width;
    let right = (x + 1u) % grid.width;
    let below = (y + grid.height - 1u) % grid.height;
    let above = (y + 1u) % grid.height;

    let neighbors = cells_in[cell_index(left, above)]
        + cells_in[cell_index(x, above)]
        + cells_in[cell_index(right, above)]
        + cells_in[cell_index(left, y)]
        + cells_in[cell_index(right, y)]
        + cells_in[cell_index(left, below)]
        + cells_in[cell_index(x, below)]
        + cells_in[cell_index(right, below)];

    let i = cell_index(x, y);
    switch neighbors {
        case 2u: {
            cells_out[i] = cells_in[i];
        }
        case 3u: {
            cells_out[i] = 1u;
        }
        default: {
            cells_out[i] = 0u;
        }
    }
}
"#;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_grid_uniform_layout() {
        assert_eq!(std::mem::size_of::<GridUniform>(), 16);
        let uniform = GridUniform::new(GridSize::new(13, 7).unwrap());
        assert_eq!((uniform.width, uniform.height), (13, 7));
    }

    #[test]
    fn test_kernel_source_substitutes_tile() {
        let source = kernel_source(TileSize::new(16, 4).unwrap());
        assert!(source.contains("@workgroup_size(16, 4)"));
        assert!(!source.contains('$'));
    }

    #[test]
    fn test_check_limits_accepts_default_session() {
        let config = EngineConfig::default();
        assert!(check_limits(&wgpu::Limits::downlevel_defaults(), &config).is_ok());
    }

    #[test]
    fn test_check_limits_rejects_oversized_grid() {
        let limits = wgpu::Limits::downlevel_defaults();
        let config = EngineConfig::with_grid(8 * (limits.max_compute_workgroups_per_dimension + 1), 8)
            .unwrap();
        assert!(matches!(
            check_limits(&limits, &config),
            Err(EngineError::GridExceedsLimits { .. })
        ));
    }

    #[test]
    fn test_check_limits_rejects_oversized_tile() {
        let limits = wgpu::Limits::downlevel_defaults();
        let config = EngineConfig::default().with_tile(64, 64).unwrap();
        assert!(check_limits(&limits, &config).is_err());
    }
}
