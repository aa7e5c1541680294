use image::RgbaImage;
use ndarray::Array2;
use serde::Serialize;

/// Grid value meaning "no confidence was computed here".
pub const SENTINEL: f32 = -1.0;

/// Per-mask confidences for one label, surrounded by a sentinel border.
///
/// Sweep position `(row, col)` lives at `(row + padding, col + padding)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ConfidenceGrid {
    cells: Array2<f32>,
    grid_cells: usize,
    padding: usize,
}

impl ConfidenceGrid {
    pub fn new(grid_cells: usize, padding: usize) -> Self {
        let dim = grid_cells + 2 * padding;
        Self {
            cells: Array2::from_elem((dim, dim), SENTINEL),
            grid_cells,
            padding,
        }
    }

    pub fn dim(&self) -> usize {
        self.cells.nrows()
    }

    pub fn grid_cells(&self) -> usize {
        self.grid_cells
    }

    pub fn padding(&self) -> usize {
        self.padding
    }

    /// The whole padded matrix, border included.
    pub fn padded(&self) -> &Array2<f32> {
        &self.cells
    }

    /// Confidence recorded for sweep position `(row, col)`.
    pub fn get(&self, row: usize, col: usize) -> Option<f32> {
        if row >= self.grid_cells || col >= self.grid_cells {
            return None;
        }
        let value = self.cells[[row + self.padding, col + self.padding]];
        if is_sentinel(value) {
            None
        } else {
            Some(value)
        }
    }

    pub(crate) fn set(&mut self, row: usize, col: usize, value: f32) {
        debug_assert!(row < self.grid_cells && col < self.grid_cells);
        self.cells[[row + self.padding, col + self.padding]] = value;
    }

    pub fn computed_count(&self) -> usize {
        self.cells.iter().filter(|v| !is_sentinel(**v)).count()
    }

    /// Sweep position whose occlusion left the lowest confidence, i.e. the largest drop.
    pub fn largest_drop_cell(&self) -> Option<(usize, usize)> {
        self.extreme_cell(|candidate, best| candidate < best)
    }

    /// Sweep position whose occlusion left the highest confidence.
    pub fn smallest_drop_cell(&self) -> Option<(usize, usize)> {
        self.extreme_cell(|candidate, best| candidate > best)
    }

    fn extreme_cell(&self, better: impl Fn(f32, f32) -> bool) -> Option<(usize, usize)> {
        let mut best: Option<((usize, usize), f32)> = None;
        for row in 0..self.grid_cells {
            for col in 0..self.grid_cells {
                if let Some(value) = self.get(row, col) {
                    match best {
                        Some((_, current)) if !better(value, current) => {}
                        _ => best = Some(((row, col), value)),
                    }
                }
            }
        }
        best.map(|(cell, _)| cell)
    }
}

pub fn is_sentinel(value: f32) -> bool {
    value < 0.0
}

/// Square region of a photo that was resized into the model input.
#[derive(Debug, Serialize, Clone, Copy, Default, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub side: u32,
}

impl CropRect {
    /// Largest square centered in a `width` x `height` photo.
    pub fn centered(width: u32, height: u32) -> Option<Self> {
        if width == 0 || height == 0 {
            return None;
        }
        let side = width.min(height);
        Some(Self {
            x: (width - side) / 2,
            y: (height - side) / 2,
            side,
        })
    }

    pub fn contains(&self, x: u32, y: u32) -> bool {
        x >= self.x && y >= self.y && x - self.x < self.side && y - self.y < self.side
    }
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct SweepReport {
    pub label: String,
    pub scheduled: usize,
    pub completed: usize,
    /// Cells left at the sentinel because classification failed or omitted the label.
    pub failed: usize,
    pub elapsed_ms: u64,
}

/// Rendered heatmap pair for one label of one photo.
#[derive(Debug, Clone)]
pub struct HeatmapImages {
    pub heatmap: RgbaImage,
    pub outline: RgbaImage,
    pub original_confidence: f32,
    pub report: SweepReport,
}

/// What an analysis hands to the display layer.
#[derive(Debug, Serialize, Clone)]
pub struct HeatmapPayload {
    pub label: String,
    pub original_confidence: f32,
    pub cached: bool,
    pub heatmap: String,
    pub outline: String,
    pub report: SweepReport,
}
