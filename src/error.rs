//! Error types for the engine
//!
//! Every fatal condition is surfaced at startup: an environment without a
//! usable accelerator, or a configuration whose dimensions do not agree.
//! Nothing here is retried.

use thiserror::Error;

/// Errors produced while building or driving the engine
#[derive(Error, Debug)]
pub enum EngineError {
    #[error("No suitable GPU adapter found: {0}")]
    NoAdapter(#[from] wgpu::RequestAdapterError),

    #[error("Adapter '{adapter}' lacks required capability: {capability}")]
    MissingCapability {
        adapter: String,
        capability: &'static str,
    },

    #[error("Failed to create GPU device: {0}")]
    RequestDevice(#[from] wgpu::RequestDeviceError),

    #[error("Failed to create window surface: {0}")]
    CreateSurface(#[from] wgpu::CreateSurfaceError),

    #[error("Grid dimensions must be non-zero, got {width}x{height}")]
    EmptyGrid { width: u32, height: u32 },

    #[error("Tile dimensions must be non-zero, got {width}x{height}")]
    InvalidTileSize { width: u32, height: u32 },

    #[error("{what} holds {actual} cells but the grid needs {expected}")]
    DimensionMismatch {
        what: &'static str,
        expected: usize,
        actual: usize,
    },

    #[error("Grid {width}x{height} exceeds device limits: {reason}")]
    GridExceedsLimits {
        width: u32,
        height: u32,
        reason: String,
    },

    #[error("Seed probability must lie in [0, 1], got {0}")]
    InvalidSeedProbability(f64),

    #[error("Tick interval must be non-zero")]
    InvalidTickInterval,

    #[error("At least one tick must be allowed in flight")]
    InvalidInFlightLimit,

    #[error("Surface error: {0}")]
    Surface(#[from] wgpu::SurfaceError),

    #[error("Device poll failed: {0}")]
    DevicePoll(#[from] wgpu::PollError),

    #[error("Event loop error: {0}")]
    EventLoop(#[from] winit::error::EventLoopError),

    #[error("Window creation failed: {0}")]
    Window(#[from] winit::error::OsError),
}

/// Convenience type alias for Results with [`EngineError`]
pub type EngineResult<T> = std::result::Result<T, EngineError>;
