use crate::error::AppError;
use std::path::{Path, PathBuf};

const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "gif", "bmp", "webp", "tiff", "tif"];

pub fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| IMAGE_EXTENSIONS.contains(&ext.to_lowercase().as_str()))
        .unwrap_or(false)
}

/// Image files directly inside `path`, sorted case-insensitively by name.
pub fn list_image_files(path: &Path) -> Result<Vec<PathBuf>, AppError> {
    if !path.exists() {
        return Err(format!("Path does not exist: {}", path.display()).into());
    }

    let read_dir = std::fs::read_dir(path).map_err(|e| AppError {
        message: format!("Cannot read directory {}: {}", path.display(), e),
    })?;

    let mut images = Vec::new();
    for entry in read_dir {
        let entry = match entry {
            Ok(e) => e,
            Err(_) => continue,
        };

        match entry.file_type() {
            Ok(ft) if ft.is_file() => {}
            _ => continue,
        }

        let path = entry.path();
        if is_image_file(&path) {
            images.push(path);
        }
    }

    images.sort_by_key(|p| {
        p.file_name()
            .unwrap_or_default()
            .to_string_lossy()
            .to_lowercase()
    });

    Ok(images)
}
