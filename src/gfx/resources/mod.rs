// src/gfx/resources/mod.rs
//! GPU resource management

pub mod target;

pub use target::{Drawable, RenderTarget};
