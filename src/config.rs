//! Engine configuration
//!
//! Everything that is fixed for a session lives here. [`EngineConfig::validate`]
//! runs before any GPU resource exists, so a bad grid or tile size never
//! reaches the device.

use std::time::Duration;

use crate::error::{EngineError, EngineResult};

pub use crate::simulation::grid::{GridSize, TileSize};
pub use crate::simulation::pattern::SeedPolicy;

/// What produces each new generation
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Workload {
    /// The neighbour-count rule kernel
    #[default]
    Life,
    /// Host-written sweep markers, no kernel
    Sweep,
}

/// What to do when the accelerator falls behind the tick cadence
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum OverloadPolicy {
    /// Skip the tick; the pending work absorbs it
    #[default]
    Coalesce,
    /// Wait for the queue to drain, then run the tick
    Block,
}

/// Session configuration
#[derive(Clone, Debug)]
pub struct EngineConfig {
    pub grid: GridSize,
    pub tile: TileSize,
    pub seed: SeedPolicy,
    pub workload: Workload,
    pub tick_interval: Duration,
    pub max_in_flight: usize,
    pub overload: OverloadPolicy,
    /// Half-extent of the shared quad in cell units, 1.0 fills the cell
    pub quad_extent: f32,
    pub clear_color: wgpu::Color,
    /// Log a performance summary every this many ticks, 0 disables it
    pub report_every: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            grid: GridSize::default(),
            tile: TileSize::default(),
            seed: SeedPolicy::default(),
            workload: Workload::Life,
            tick_interval: Duration::from_millis(16),
            max_in_flight: 3,
            overload: OverloadPolicy::Coalesce,
            quad_extent: 0.8,
            clear_color: wgpu::Color {
                r: 0.0,
                g: 0.0,
                b: 0.4,
                a: 1.0,
            },
            report_every: 600,
        }
    }
}

impl EngineConfig {
    /// Create a configuration for a `width x height` grid with defaults elsewhere
    pub fn with_grid(width: u32, height: u32) -> EngineResult<Self> {
        Ok(Self {
            grid: GridSize::new(width, height)?,
            ..Self::default()
        })
    }

    pub fn with_tile(mut self, width: u32, height: u32) -> EngineResult<Self> {
        self.tile = TileSize::new(width, height)?;
        Ok(self)
    }

    pub fn with_seed(mut self, seed: SeedPolicy) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_workload(mut self, workload: Workload) -> Self {
        self.workload = workload;
        self
    }

    pub fn with_tick_interval(mut self, interval: Duration) -> Self {
        self.tick_interval = interval;
        self
    }

    pub fn with_overload(mut self, max_in_flight: usize, policy: OverloadPolicy) -> Self {
        self.max_in_flight = max_in_flight;
        self.overload = policy;
        self
    }

    /// Reject configurations that cannot describe a valid session
    pub fn validate(&self) -> EngineResult<()> {
        if self.tick_interval.is_zero() {
            return Err(EngineError::InvalidTickInterval);
        }
        if self.max_in_flight == 0 {
            return Err(EngineError::InvalidInFlightLimit);
        }
        let cells = self.grid.width() as u64 * self.grid.height() as u64;
        if cells > u32::MAX as u64 {
            return Err(EngineError::GridExceedsLimits {
                width: self.grid.width(),
                height: self.grid.height(),
                reason: format!("{cells} cells overflow the instance index"),
            });
        }
        Ok(())
    }

    /// Bytes in one state buffer
    pub fn state_buffer_size(&self) -> u64 {
        self.grid.cell_count() as u64 * std::mem::size_of::<u32>() as u64
    }
}
