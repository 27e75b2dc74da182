// src/simulation/mod.rs
//! Simulation system
//!
//! The A/B state store, the update rule (host reference and device kernel),
//! host-side pattern sources, and the scheduler that sequences a tick.

pub mod cpu;
pub mod gpu;
pub mod grid;
pub mod pattern;
pub mod rule;
pub mod scheduler;

// Re-export main types
pub use grid::{BufferRole, GridSize, KernelPass, PingPong, TileSize};
pub use scheduler::{FrameBackend, FrameScheduler, FrameState, Stepped, TickOutcome, TickStats};
