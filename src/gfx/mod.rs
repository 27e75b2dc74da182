//! # Graphics Module
//!
//! Device acquisition, drawable targets and the instanced cell renderer,
//! tied together by [`GpuBackend`], the device side of a scheduler tick.
//!
//! - **Context** ([`context`]) - adapter and device negotiation
//! - **Rendering** ([`rendering`]) - the cell quad pipeline
//! - **Resources** ([`resources`]) - window surface or offscreen texture

pub mod context;
pub mod render_engine;
pub mod rendering;
pub mod resources;

// Re-export commonly used types
pub use context::GpuContext;
pub use render_engine::GpuBackend;
