//! CPU reference backend
//!
//! Runs the same frame contract as the GPU backend on host memory: the
//! generation pass is the reference rule, and the draw evaluates the
//! renderer's placement model per instance and records how many quads would
//! cover any area. Every tick is kept as a [`FrameRecord`] so the scheduler's
//! handoff can be checked without a device.

use cgmath::Vector2;

use super::grid::{BufferRole, GridSize, HostCells, KernelPass};
use super::pattern::SweepPattern;
use super::rule::{population, step_generation};
use super::scheduler::{FrameBackend, Stepped, SubmissionTicket};
use crate::config::{EngineConfig, Workload};
use crate::error::EngineResult;
use crate::gfx::rendering::cell_renderer::{CellPlacement, UnitQuad};

/// What a generation pass wrote
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GenerationRecord {
    pub pass: KernelPass,
    pub population: usize,
    pub order: u64,
}

/// What a draw read
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct DrawRecord {
    pub step: u64,
    pub source: BufferRole,
    pub visible_instances: usize,
    pub order: u64,
}

/// One submitted tick
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FrameRecord {
    pub generation: Option<GenerationRecord>,
    pub draw: Option<DrawRecord>,
}

pub struct CpuFrame {
    record: FrameRecord,
}

pub struct CpuBackend {
    grid: GridSize,
    workload: Workload,
    quad: UnitQuad,
    cells: HostCells,
    sweep: SweepPattern,
    frames: Vec<FrameRecord>,
    pending: Vec<SubmissionTicket>,
    hold_completions: bool,
    target_available: bool,
    order: u64,
}

impl CpuBackend {
    pub fn new(config: &EngineConfig) -> EngineResult<Self> {
        config.validate()?;
        let cells = HostCells::from_seed(config.grid, config.seed.seed(config.grid))?;
        log::debug!(
            "CPU backend seeded {} of {} cells",
            population(cells.get(BufferRole::A)),
            config.grid.cell_count()
        );

        Ok(Self {
            grid: config.grid,
            workload: config.workload,
            quad: UnitQuad::new(config.quad_extent),
            cells,
            sweep: SweepPattern::new(config.seed.rng()),
            frames: Vec::new(),
            pending: Vec::new(),
            hold_completions: false,
            target_available: true,
            order: 0,
        })
    }

    /// Readable-current cells for `step`
    pub fn current_cells(&self, step: u64) -> &[u32] {
        self.cells.current(step)
    }

    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn last_frame(&self) -> Option<&FrameRecord> {
        self.frames.last()
    }

    /// Keep submissions in flight until released, as a stalled device would
    pub fn hold_completions(&mut self, hold: bool) {
        self.hold_completions = hold;
    }

    pub fn release_completions(&mut self) {
        self.pending.clear();
    }

    pub fn set_target_available(&mut self, available: bool) {
        self.target_available = available;
    }

    fn next_order(&mut self) -> u64 {
        self.order += 1;
        self.order
    }

    /// Instances whose quad covers a non-zero area
    fn visible_instances(&self, source: &[u32]) -> usize {
        let [low, high] = self.quad.diagonal();
        (0..self.grid.cell_count())
            .filter(|&i| {
                let placement = CellPlacement::for_index(i, self.grid);
                let scale = source[i] as f32;
                let a: Vector2<f32> = placement.vertex_ndc(low, scale, self.grid);
                let b: Vector2<f32> = placement.vertex_ndc(high, scale, self.grid);
                a.x != b.x && a.y != b.y
            })
            .count()
    }
}

impl FrameBackend for CpuBackend {
    type Frame = CpuFrame;

    fn grid(&self) -> GridSize {
        self.grid
    }

    fn begin_frame(&mut self) -> EngineResult<Option<CpuFrame>> {
        if !self.target_available {
            return Ok(None);
        }
        Ok(Some(CpuFrame {
            record: FrameRecord::default(),
        }))
    }

    fn encode_generation(
        &mut self,
        frame: &mut CpuFrame,
        pass: KernelPass,
        step: u64,
    ) -> EngineResult<()> {
        let grid = self.grid;
        match self.workload {
            Workload::Life => {
                let (read, write) = self.cells.select_mut(step);
                step_generation(read, write, grid);
            }
            Workload::Sweep => {
                let markers = self.sweep.frame(step + 1, grid);
                self.cells.get_mut(pass.write).copy_from_slice(&markers);
            }
        }
        let order = self.next_order();
        frame.record.generation = Some(GenerationRecord {
            pass,
            population: population(self.cells.get(pass.write)),
            order,
        });
        Ok(())
    }

    fn encode_draw(&mut self, frame: &mut CpuFrame, stepped: &Stepped) {
        let visible_instances = self.visible_instances(self.cells.get(stepped.current()));
        let order = self.next_order();
        frame.record.draw = Some(DrawRecord {
            step: stepped.step(),
            source: stepped.current(),
            visible_instances,
            order,
        });
    }

    fn submit(&mut self, frame: CpuFrame, ticket: SubmissionTicket) -> EngineResult<()> {
        self.frames.push(frame.record);
        if self.hold_completions {
            self.pending.push(ticket);
        } else {
            ticket.complete();
        }
        Ok(())
    }

    fn wait_idle(&mut self) -> EngineResult<()> {
        self.release_completions();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::simulation::pattern::SeedPolicy;
    use crate::simulation::rule::ALIVE;

    #[test]
    fn test_seeds_only_buffer_a() {
        let config = EngineConfig::with_grid(16, 16)
            .unwrap()
            .with_seed(SeedPolicy::new(1.0).unwrap());
        let backend = CpuBackend::new(&config).unwrap();
        assert!(backend.current_cells(0).iter().all(|&c| c == ALIVE));
        assert!(backend.current_cells(1).iter().all(|&c| c == 0));
    }

    #[test]
    fn test_dead_cells_are_degenerate() {
        let config = EngineConfig::with_grid(4, 4).unwrap();
        let backend = CpuBackend::new(&config).unwrap();
        let mut cells = vec![0; 16];
        assert_eq!(backend.visible_instances(&cells), 0);
        cells[5] = ALIVE;
        cells[15] = ALIVE;
        assert_eq!(backend.visible_instances(&cells), 2);
    }

    #[test]
    fn test_rejects_invalid_config() {
        let config = EngineConfig::default().with_overload(0, Default::default());
        assert!(CpuBackend::new(&config).is_err());
    }
}
