// src/lib.rs
//! Gridlife
//!
//! A toroidal cellular automaton simulated and rendered on the GPU with wgpu
//! and winit. Cell state lives in two device buffers that swap roles every
//! step; a compute pass writes the next generation and an instanced draw
//! shows it, both submitted together once per tick.

pub mod app;
pub mod config;
pub mod error;
pub mod gfx;
pub mod performance;
pub mod simulation;
pub mod wgpu_utils;

// Re-export main types for convenience
pub use app::App;
pub use config::EngineConfig;
pub use error::{EngineError, EngineResult};
