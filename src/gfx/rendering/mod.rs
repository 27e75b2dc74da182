// src/gfx/rendering/mod.rs
//! Core rendering functionality

pub mod cell_renderer;

pub use cell_renderer::{CellPlacement, CellRenderer, UnitQuad};
