use crate::common::*;

/// The number of rows and columns of a dense prediction map.
///
/// Both sides are positive, so every grid has at least one cell.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, CopyGetters)]
pub struct GridSize {
    #[get_copy = "pub"]
    h: usize,
    #[get_copy = "pub"]
    w: usize,
}

impl GridSize {
    pub fn new(h: usize, w: usize) -> Result<Self> {
        ensure!(h > 0 && w > 0, "grid size must be positive, but get {}x{}", h, w);
        Ok(Self { h, w })
    }

    /// Derive the grid of an image, `image_size / stride` on each axis.
    pub fn from_image_size(image_h: usize, image_w: usize, stride: usize) -> Result<Self> {
        ensure!(stride > 0, "stride must be positive");
        Self::new(image_h / stride, image_w / stride)
    }

    pub fn num_cells(&self) -> usize {
        self.h * self.w
    }

    /// The cell index of `(row, col)`, `row * w + col`.
    pub fn cell_index(&self, cell: GridCell) -> usize {
        debug_assert!(cell.row < self.h && cell.col < self.w);
        cell.row * self.w + cell.col
    }

    /// The inverse of [cell_index](Self::cell_index).
    pub fn cell_at(&self, cell_index: usize) -> GridCell {
        debug_assert!(cell_index < self.num_cells());
        GridCell {
            row: cell_index / self.w,
            col: cell_index % self.w,
        }
    }
}

/// A grid cell position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct GridCell {
    pub row: usize,
    pub col: usize,
}

/// A location in a batch of dense maps.
///
/// The loss flattens `[batch, cell]` axes into one axis. The bijection is
/// `flat = batch_index * num_cells + cell_index` in both directions, and it
/// agrees with a row-major reshape of a contiguous `[batch, cell, ..]` tensor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FlatIndex {
    pub batch_index: usize,
    pub cell_index: usize,
}

impl FlatIndex {
    pub fn to_flat(&self, grid: &GridSize) -> usize {
        debug_assert!(self.cell_index < grid.num_cells());
        self.batch_index * grid.num_cells() + self.cell_index
    }

    pub fn from_flat(grid: &GridSize, flat: usize) -> Self {
        let num_cells = grid.num_cells();
        Self {
            batch_index: flat / num_cells,
            cell_index: flat % num_cells,
        }
    }
}
