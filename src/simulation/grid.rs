//! Grid State Store
//!
//! Two same-shaped cell-state buffers, labelled A and B, whose roles invert
//! every step. For an even step A is read and B is written; for an odd step
//! the orientation flips. Nothing outside this module decides which buffer is
//! current, so the kernel can never read and write the same buffer in one
//! generation.

use crate::error::{EngineError, EngineResult};

/// Immutable-for-session grid dimensions in cells
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GridSize {
    width: u32,
    height: u32,
}

impl GridSize {
    /// Create a grid size, rejecting a zero dimension
    pub fn new(width: u32, height: u32) -> EngineResult<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::EmptyGrid { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Number of cells, which is also the renderer's instance count
    pub fn cell_count(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Row-major index of `(x, y)`
    pub fn index(&self, x: u32, y: u32) -> usize {
        y as usize * self.width as usize + x as usize
    }

    /// Lattice coordinate of a row-major index
    pub fn coords(&self, index: usize) -> (u32, u32) {
        let w = self.width as usize;
        ((index % w) as u32, (index / w) as u32)
    }

    /// Toroidal neighbour of column `x` offset by `dx` in `-1..=1`
    pub fn wrap_x(&self, x: u32, dx: i32) -> u32 {
        wrap(x, dx, self.width)
    }

    /// Toroidal neighbour of row `y` offset by `dy` in `-1..=1`
    pub fn wrap_y(&self, y: u32, dy: i32) -> u32 {
        wrap(y, dy, self.height)
    }

    /// Whether a dispatch coordinate lands on the grid
    pub fn contains(&self, x: u32, y: u32) -> bool {
        x < self.width && y < self.height
    }

    /// Check a flat buffer against the grid
    pub fn check_len(&self, what: &'static str, len: usize) -> EngineResult<()> {
        if len != self.cell_count() {
            return Err(EngineError::DimensionMismatch {
                what,
                expected: self.cell_count(),
                actual: len,
            });
        }
        Ok(())
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self {
            width: 512,
            height: 512,
        }
    }
}

// Adding `extent - 1` instead of subtracting keeps the wrap exact for any
// extent, not only powers of two.
fn wrap(coord: u32, delta: i32, extent: u32) -> u32 {
    let extent = extent as u64;
    let shifted = match delta {
        d if d < 0 => coord as u64 + extent - (d.unsigned_abs() as u64 % extent),
        d => coord as u64 + d as u64,
    };
    (shifted % extent) as u32
}

/// Work-tile dimensions for the kernel dispatch
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TileSize {
    width: u32,
    height: u32,
}

impl TileSize {
    pub fn new(width: u32, height: u32) -> EngineResult<Self> {
        if width == 0 || height == 0 {
            return Err(EngineError::InvalidTileSize { width, height });
        }
        Ok(Self { width, height })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Tiles needed to cover the grid; may overshoot when not tile-aligned
    pub fn workgroups(&self, grid: GridSize) -> (u32, u32) {
        (
            grid.width().div_ceil(self.width),
            grid.height().div_ceil(self.height),
        )
    }

    /// Whether the dispatch covers exactly the grid
    pub fn is_aligned(&self, grid: GridSize) -> bool {
        grid.width() % self.width == 0 && grid.height() % self.height == 0
    }
}

impl Default for TileSize {
    fn default() -> Self {
        Self {
            width: 8,
            height: 8,
        }
    }
}

/// Label of one of the two state buffers
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum BufferRole {
    A,
    B,
}

impl BufferRole {
    /// The buffer that is readable-current for `step`
    pub fn for_step(step: u64) -> Self {
        if step % 2 == 0 {
            BufferRole::A
        } else {
            BufferRole::B
        }
    }

    pub fn other(self) -> Self {
        match self {
            BufferRole::A => BufferRole::B,
            BufferRole::B => BufferRole::A,
        }
    }

    /// Slot used for per-orientation resources such as bind groups
    pub fn slot(self) -> usize {
        match self {
            BufferRole::A => 0,
            BufferRole::B => 1,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            BufferRole::A => "A",
            BufferRole::B => "B",
        }
    }
}

/// Orientation of one generation pass: read one buffer, write the other
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct KernelPass {
    pub read: BufferRole,
    pub write: BufferRole,
}

impl KernelPass {
    /// Orientation for the pre-increment `step`
    pub fn for_step(step: u64) -> Self {
        let read = BufferRole::for_step(step);
        Self {
            read,
            write: read.other(),
        }
    }
}

/// Exclusive owner of the A/B pair
///
/// Callers only ever borrow a buffer for the duration of one pass.
#[derive(Debug)]
pub struct PingPong<T> {
    a: T,
    b: T,
}

impl<T> PingPong<T> {
    pub fn new(a: T, b: T) -> Self {
        Self { a, b }
    }

    pub fn get(&self, role: BufferRole) -> &T {
        match role {
            BufferRole::A => &self.a,
            BufferRole::B => &self.b,
        }
    }

    /// `(read, write)` for `step`
    pub fn select(&self, step: u64) -> (&T, &T) {
        let pass = KernelPass::for_step(step);
        (self.get(pass.read), self.get(pass.write))
    }

    /// `(read, write)` for `step`, with the write side borrowed mutably
    pub fn select_mut(&mut self, step: u64) -> (&T, &mut T) {
        match BufferRole::for_step(step) {
            BufferRole::A => (&self.a, &mut self.b),
            BufferRole::B => (&self.b, &mut self.a),
        }
    }

    /// The readable-current buffer for `step`
    pub fn current(&self, step: u64) -> &T {
        self.get(BufferRole::for_step(step))
    }

    pub fn get_mut(&mut self, role: BufferRole) -> &mut T {
        match role {
            BufferRole::A => &mut self.a,
            BufferRole::B => &mut self.b,
        }
    }
}

/// Host-side store used by the reference backend
pub type HostCells = PingPong<Vec<u32>>;

impl HostCells {
    /// Seed buffer A from `seed`; buffer B starts zeroed and is only
    /// meaningful after the first generation pass writes it.
    pub fn from_seed(grid: GridSize, seed: Vec<u32>) -> EngineResult<Self> {
        grid.check_len("Seed", seed.len())?;
        Ok(PingPong::new(seed, vec![0; grid.cell_count()]))
    }
}
