use crate::models::app_config::SweepConfig;
use crate::models::heatmap_types::{ConfidenceGrid, CropRect, HeatmapImages, SweepReport};
use image::{Rgba, RgbaImage};
use ndarray::Array2;

/// Where the swept model input sits inside a rendered image.
///
/// The sweep only ever sees the centered square crop of a photo, so the
/// overlay is drawn inside `crop` (scaled from the model input) and every
/// pixel outside it is left transparent.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Placement {
    pub width: u32,
    pub height: u32,
    pub crop: CropRect,
}

impl Placement {
    /// Rendering at model-input resolution, no crop.
    pub fn input(size: u32) -> Self {
        Self {
            width: size,
            height: size,
            crop: CropRect { x: 0, y: 0, side: size },
        }
    }

    /// Rendering over a whole `width` x `height` photo whose centered square was swept.
    pub fn photo(width: u32, height: u32) -> Self {
        Self {
            width,
            height,
            crop: CropRect::centered(width, height).unwrap_or_default(),
        }
    }

    /// Model-input pixel shown at `(x, y)`, or `None` outside the crop.
    fn input_pixel(&self, x: u32, y: u32, input_size: u32) -> Option<(u32, u32)> {
        if !self.crop.contains(x, y) {
            return None;
        }
        let side = self.crop.side as u64;
        let scale = |offset: u32| (offset as u64 * input_size as u64 / side) as u32;
        Some((scale(x - self.crop.x), scale(y - self.crop.y)))
    }
}

/// Per-cell influence derived from a confidence grid.
///
/// A cell's drop is the original confidence minus the confidence with that
/// cell masked. Influence rescales drops over the computed cells to `[0, 1]`.
/// Each model-input pixel belongs to the cell whose mask centre is nearest,
/// so what a pixel shows is exactly its cell's influence.
#[derive(Debug, Clone)]
pub struct InfluenceMap {
    drops: Array2<Option<f32>>,
    influence: Array2<Option<f32>>,
    input_size: u32,
    stride: u32,
    mask_size: u32,
}

impl InfluenceMap {
    pub fn from_grid(grid: &ConfidenceGrid, original_confidence: f32, config: &SweepConfig) -> Self {
        let cells = grid.grid_cells();
        let drops = Array2::from_shape_fn((cells, cells), |(row, col)| {
            grid.get(row, col).map(|value| original_confidence - value)
        });

        let (min, max) = drops
            .iter()
            .flatten()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &d| (lo.min(d), hi.max(d)));
        let range = max - min;
        let influence = drops.mapv(|d| {
            d.map(|d| if range > 1e-6 { (d - min) / range } else { 0.0 })
        });

        Self {
            drops,
            influence,
            input_size: config.input_size,
            stride: config.stride.max(1),
            mask_size: config.mask_size,
        }
    }

    pub fn dim(&self) -> usize {
        self.drops.nrows()
    }

    pub fn drop_at(&self, row: usize, col: usize) -> Option<f32> {
        self.drops.get((row, col)).copied().flatten()
    }

    pub fn influence_at(&self, row: usize, col: usize) -> Option<f32> {
        self.influence.get((row, col)).copied().flatten()
    }

    /// Sweep cell owning model-input pixel `(x, y)`.
    pub fn cell_for(&self, x: u32, y: u32) -> (usize, usize) {
        (self.nearest_cell(y), self.nearest_cell(x))
    }

    /// Index of the mask whose centre (`i * stride + mask_size / 2`) is closest to `pixel`.
    fn nearest_cell(&self, pixel: u32) -> usize {
        let last = self.dim().saturating_sub(1);
        let centre_offset = pixel as f32 + 0.5 - self.mask_size as f32 / 2.0;
        let index = (centre_offset / self.stride as f32).round().max(0.0) as usize;
        index.min(last)
    }

    fn influence_at_pixel(&self, x: u32, y: u32, placement: &Placement) -> Option<f32> {
        let (mx, my) = placement.input_pixel(x, y, self.input_size)?;
        let (row, col) = self.cell_for(mx, my);
        self.influence_at(row, col)
    }
}

/// Shaded overlay: more influential cells are more opaque `color`.
/// Cells without a computed confidence, and everything outside the crop, are transparent.
pub fn render_heatmap(map: &InfluenceMap, color: [u8; 3], placement: &Placement) -> RgbaImage {
    RgbaImage::from_fn(placement.width, placement.height, |x, y| {
        match map.influence_at_pixel(x, y, placement) {
            Some(influence) => {
                let alpha = (influence.clamp(0.0, 1.0) * 255.0).round() as u8;
                Rgba([color[0], color[1], color[2], alpha])
            }
            None => Rgba([0, 0, 0, 0]),
        }
    })
}

/// Contour between influential (`>= threshold`) and non-influential pixels.
pub fn render_outline(
    map: &InfluenceMap,
    threshold: f32,
    color: [u8; 3],
    line_width: u32,
    placement: &Placement,
) -> RgbaImage {
    let (width, height) = (placement.width, placement.height);
    let hot = |x: u32, y: u32| {
        map.influence_at_pixel(x, y, placement)
            .map(|i| i >= threshold)
            .unwrap_or(false)
    };
    let reach = line_width.max(1);

    RgbaImage::from_fn(width, height, |x, y| {
        let here = hot(x, y);
        let mut edge = false;
        for d in 1..=reach {
            let neighbours = [
                x.checked_sub(d).map(|nx| (nx, y)),
                (x + d < width).then(|| (x + d, y)),
                y.checked_sub(d).map(|ny| (x, ny)),
                (y + d < height).then(|| (x, y + d)),
            ];
            if neighbours.iter().flatten().any(|&(nx, ny)| hot(nx, ny) != here) {
                edge = true;
                break;
            }
        }
        if edge {
            Rgba([color[0], color[1], color[2], 255])
        } else {
            Rgba([0, 0, 0, 0])
        }
    })
}

/// Both heatmap images, laid out by `placement`.
pub fn render(
    grid: &ConfidenceGrid,
    original_confidence: f32,
    report: SweepReport,
    config: &SweepConfig,
    placement: &Placement,
) -> HeatmapImages {
    let map = InfluenceMap::from_grid(grid, original_confidence, config);
    HeatmapImages {
        heatmap: render_heatmap(&map, config.overlay_color, placement),
        outline: render_outline(
            &map,
            config.outline_threshold,
            config.outline_color,
            config.outline_width,
            placement,
        ),
        original_confidence,
        report,
    }
}
