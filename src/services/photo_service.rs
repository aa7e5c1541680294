use crate::error::AppError;
use crate::models::heatmap_types::CropRect;
use base64::Engine;
use image::codecs::png::{CompressionType, PngEncoder};
use image::imageops::FilterType;
use image::{DynamicImage, ExtendedColorType, ImageEncoder, ImageReader, RgbImage, RgbaImage};
use std::io::{Cursor, Read};
use std::path::Path;

/// Decode a photo from disk, upright according to its EXIF orientation.
pub fn load_photo(path: &Path) -> Result<DynamicImage, AppError> {
    let img = ImageReader::open(path)
        .map_err(|e| AppError {
            message: format!("Failed to open image {}: {}", path.display(), e),
        })?
        .with_guessed_format()
        .map_err(|e| AppError {
            message: format!("Failed to read image format {}: {}", path.display(), e),
        })?
        .decode()
        .map_err(|e| AppError {
            message: format!("Failed to decode image {}: {}", path.display(), e),
        })?;

    Ok(apply_orientation(img, read_orientation(path)))
}

/// Same as `load_photo` for an in-memory capture.
pub fn load_photo_from_bytes(bytes: &[u8]) -> Result<DynamicImage, AppError> {
    let img = ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()
        .map_err(|e| AppError { message: e.to_string() })?
        .decode()
        .map_err(|e| AppError {
            message: format!("Failed to decode image: {}", e),
        })?;

    let orientation = orientation_from_container(bytes).unwrap_or(1);
    Ok(apply_orientation(img, orientation))
}

/// Orientation tag of the file, defaulting to 1.
fn read_orientation(path: &Path) -> u32 {
    let file = match std::fs::File::open(path) {
        Ok(f) => f,
        Err(_) => return 1,
    };

    // Read first 128KB (covers most EXIF headers)
    let mut header_buf = Vec::with_capacity(128 * 1024);
    if file.take(128 * 1024).read_to_end(&mut header_buf).is_err() {
        return 1;
    }

    orientation_from_container(&header_buf).unwrap_or(1)
}

fn orientation_from_container(buf: &[u8]) -> Option<u32> {
    let exif = exif::Reader::new()
        .read_from_container(&mut Cursor::new(buf))
        .ok()?;
    let field = exif.get_field(exif::Tag::Orientation, exif::In::PRIMARY)?;
    match field.value {
        exif::Value::Short(ref v) => v.first().map(|&x| x as u32),
        exif::Value::Long(ref v) => v.first().copied(),
        _ => None,
    }
}

/// Apply EXIF orientation to the image.
pub fn apply_orientation(img: DynamicImage, orientation: u32) -> DynamicImage {
    match orientation {
        2 => img.fliph(),
        3 => img.rotate180(),
        4 => img.flipv(),
        5 => img.fliph().rotate90(),
        6 => img.rotate90(),
        7 => img.fliph().rotate270(),
        8 => img.rotate270(),
        _ => img,
    }
}

/// Largest centered square of `img`, resized to `size` x `size`.
pub fn crop_to_center(img: &DynamicImage, size: u32) -> Option<RgbImage> {
    let crop = CropRect::centered(img.width(), img.height())?;
    crop_square(img, crop, size)
}

/// `crop` of `img`, resized to `size` x `size`.
pub fn crop_square(img: &DynamicImage, crop: CropRect, size: u32) -> Option<RgbImage> {
    if size == 0 || crop.side == 0 {
        return None;
    }
    let cropped = img.crop_imm(crop.x, crop.y, crop.side, crop.side);
    Some(cropped.resize_exact(size, size, FilterType::Triangle).to_rgb8())
}

pub fn encode_png(img: &RgbaImage) -> Result<Vec<u8>, AppError> {
    let mut png_bytes = Vec::new();
    PngEncoder::new_with_quality(
        &mut png_bytes,
        CompressionType::Fast,
        image::codecs::png::FilterType::NoFilter,
    )
    .write_image(img.as_raw(), img.width(), img.height(), ExtendedColorType::Rgba8)
    .map_err(|e| AppError {
        message: format!("Failed to encode PNG: {}", e),
    })?;
    Ok(png_bytes)
}

pub fn to_data_uri(png_bytes: &[u8]) -> String {
    let b64 = base64::engine::general_purpose::STANDARD.encode(png_bytes);
    format!("data:image/png;base64,{}", b64)
}
