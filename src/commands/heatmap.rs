use crate::error::AppError;
use crate::models::classify_types::{ClassifyResult, ProductContext};
use crate::models::heatmap_types::{HeatmapImages, HeatmapPayload};
use crate::services::classifier::Classifier;
use crate::services::session::PhotoSession;
use crate::services::{fs_service, photo_service};
use rayon::prelude::*;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;

fn file_name_of(path: &Path) -> String {
    path.file_name()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string()
}

/// Make the photo at `path` the session's current photo and classify it.
pub async fn classify_photo(
    session: &PhotoSession,
    path: &Path,
    top_k: Option<usize>,
) -> Result<ClassifyResult, AppError> {
    let owned = path.to_path_buf();
    let photo = tokio::task::spawn_blocking(move || photo_service::load_photo(&owned)).await??;

    let mut predictions = session.classify_photo(&photo).await?;
    if let Some(k) = top_k {
        predictions.truncate(k);
    }

    Ok(ClassifyResult {
        file_name: file_name_of(path),
        file_path: path.to_string_lossy().to_string(),
        predictions,
        product: session.product_context().await,
    })
}

/// Classify every image in `folder` independently of any session.
///
/// Files that fail to load or classify are logged and reported with no predictions.
pub async fn classify_folder(
    classifier: Arc<dyn Classifier>,
    folder: &Path,
    top_k: usize,
    input_size: u32,
    brands: BTreeMap<String, String>,
) -> Result<Vec<ClassifyResult>, AppError> {
    let image_paths = fs_service::list_image_files(folder)?;
    log::info!("Classifying {} images in {}", image_paths.len(), folder.display());

    let results = tokio::task::spawn_blocking(move || {
        image_paths
            .par_iter()
            .map(|img_path| {
                let file_name = file_name_of(img_path);
                let predictions = photo_service::load_photo(img_path)
                    .and_then(|photo| {
                        photo_service::crop_to_center(&photo, input_size)
                            .ok_or_else(|| AppError::from("Photo has no pixels"))
                    })
                    .and_then(|edited| classifier.classify(&edited));

                let mut predictions = match predictions {
                    Ok(p) => p,
                    Err(e) => {
                        log::warn!("Failed to classify {}: {}", file_name, e);
                        Vec::new()
                    }
                };
                predictions.truncate(top_k);

                let product = predictions.first().map(|top| ProductContext {
                    product: top.class_name.clone(),
                    brand: brands.get(&top.class_name).cloned(),
                });

                ClassifyResult {
                    file_name,
                    file_path: img_path.to_string_lossy().to_string(),
                    predictions,
                    product,
                }
            })
            .collect::<Vec<_>>()
    })
    .await?;

    Ok(results)
}

/// Heatmap for `label` on the session's photo, encoded for display.
pub async fn analyze_label(session: &PhotoSession, label: &str) -> Result<Option<HeatmapPayload>, AppError> {
    let Some(analysis) = session.analyze(label).await? else {
        return Ok(None);
    };

    let images = analysis.images.clone();
    let (heatmap, outline) = tokio::task::spawn_blocking(move || -> Result<(String, String), AppError> {
        let heatmap = photo_service::to_data_uri(&photo_service::encode_png(&images.heatmap)?);
        let outline = photo_service::to_data_uri(&photo_service::encode_png(&images.outline)?);
        Ok((heatmap, outline))
    })
    .await??;

    Ok(Some(HeatmapPayload {
        label: analysis.label,
        original_confidence: analysis.images.original_confidence,
        cached: analysis.cached,
        heatmap,
        outline,
        report: analysis.images.report.clone(),
    }))
}

/// File-name stem for `label`: ASCII letters, digits and `-` are kept, spaces
/// become `_`, every other UTF-8 byte is written as `%XX`. Distinct labels
/// always get distinct stems.
pub fn file_stem(label: &str) -> String {
    let mut stem = String::with_capacity(label.len());
    for c in label.chars() {
        match c {
            c if c.is_ascii_alphanumeric() || c == '-' => stem.push(c),
            ' ' => stem.push('_'),
            c => {
                let mut buf = [0u8; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    stem.push_str(&format!("%{:02X}", byte));
                }
            }
        }
    }
    stem
}

/// Write `<stem>-heatmap.png` and `<stem>-outline.png` into `out_dir`, see `file_stem`.
pub fn save_heatmap(images: &HeatmapImages, label: &str, out_dir: &Path) -> Result<(PathBuf, PathBuf), AppError> {
    std::fs::create_dir_all(out_dir).map_err(|e| AppError {
        message: format!("Failed to create directory {}: {}", out_dir.display(), e),
    })?;

    let stem = file_stem(label);

    let heatmap_path = out_dir.join(format!("{}-heatmap.png", stem));
    let outline_path = out_dir.join(format!("{}-outline.png", stem));
    std::fs::write(&heatmap_path, photo_service::encode_png(&images.heatmap)?)?;
    std::fs::write(&outline_path, photo_service::encode_png(&images.outline)?)?;

    Ok((heatmap_path, outline_path))
}
