use crate::models::app_config::SweepConfig;
use image::{Rgb, RgbImage};

/// Copy of `base` with the mask block for sweep cell `(row, col)` painted over.
///
/// The block starts at `(col * stride, row * stride)` and is clipped to the image.
pub fn mask_image(base: &RgbImage, row: usize, col: usize, config: &SweepConfig) -> RgbImage {
    let mut masked = base.clone();
    let x0 = col as u32 * config.stride;
    let y0 = row as u32 * config.stride;
    let x1 = (x0 + config.mask_size).min(masked.width());
    let y1 = (y0 + config.mask_size).min(masked.height());
    let fill = Rgb(config.mask_color);

    for y in y0..y1 {
        for x in x0..x1 {
            masked.put_pixel(x, y, fill);
        }
    }
    masked
}
