//! Update rule, host reference
//!
//! The same transition the compute kernel applies, evaluated on the CPU. It is
//! the model the GPU output is compared against, and the generation source of
//! the reference backend.
//!
//! ## Transition policy
//!
//! | live neighbours | next state          |
//! |-----------------|---------------------|
//! | 2               | current state       |
//! | 3               | alive               |
//! | anything else   | dead                |

use rayon::prelude::*;

use super::grid::GridSize;

pub const DEAD: u32 = 0;
pub const ALIVE: u32 = 1;

/// Fixed neighbour-count threshold rule
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct NeighborRule;

impl NeighborRule {
    pub fn next_state(&self, current: u32, live_neighbors: u32) -> u32 {
        match live_neighbors {
            2 => current,
            3 => ALIVE,
            _ => DEAD,
        }
    }
}

/// Live cells in the toroidal 8-neighbourhood of `(x, y)`
pub fn live_neighbors(cells: &[u32], grid: GridSize, x: u32, y: u32) -> u32 {
    let mut count = 0;
    for dy in -1..=1 {
        for dx in -1..=1 {
            if dx == 0 && dy == 0 {
                continue;
            }
            let nx = grid.wrap_x(x, dx);
            let ny = grid.wrap_y(y, dy);
            count += cells[grid.index(nx, ny)];
        }
    }
    count
}

/// Evaluate one cell: the body of a single kernel invocation
pub fn evaluate_cell(read: &[u32], grid: GridSize, x: u32, y: u32) -> u32 {
    let current = read[grid.index(x, y)];
    NeighborRule.next_state(current, live_neighbors(read, grid, x, y))
}

/// Compute the next generation of `read` into `write`
///
/// Rows are evaluated in parallel; no cell reads anything from `write`.
pub fn step_generation(read: &[u32], write: &mut [u32], grid: GridSize) {
    debug_assert_eq!(read.len(), grid.cell_count());
    debug_assert_eq!(write.len(), grid.cell_count());

    write
        .par_chunks_mut(grid.width() as usize)
        .enumerate()
        .for_each(|(y, row)| {
            for (x, cell) in row.iter_mut().enumerate() {
                *cell = evaluate_cell(read, grid, x as u32, y as u32);
            }
        });
}

/// Number of live cells in a buffer
pub fn population(cells: &[u32]) -> usize {
    cells.iter().filter(|&&c| c != DEAD).count()
}
