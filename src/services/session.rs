use crate::error::AppError;
use crate::models::app_config::AppConfig;
use crate::models::classify_types::{score_for, Prediction, ProductContext};
use crate::models::heatmap_types::{CropRect, HeatmapImages};
use crate::services::classifier::Classifier;
use crate::services::heatmap::render::{self, Placement};
use crate::services::heatmap::sweep;
use crate::services::photo_service;
use image::{DynamicImage, RgbImage};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Result of `PhotoSession::analyze`.
#[derive(Debug, Clone)]
pub struct Analysis {
    pub label: String,
    pub images: Arc<HeatmapImages>,
    /// Served from the per-photo cache without touching the classifier.
    pub cached: bool,
}

#[derive(Default)]
struct SessionState {
    /// Bumped for every new photo so in-flight sweeps can tell they are stale.
    generation: u64,
    edited: Option<Arc<RgbImage>>,
    /// Full photo size and the square of it that `edited` was resized from.
    placement: Option<Placement>,
    baseline: Vec<Prediction>,
    heatmaps: HashMap<String, Arc<HeatmapImages>>,
}

/// Everything tied to the photo currently on screen.
///
/// Classifying a new photo replaces the baseline and clears the heatmap cache
/// in the same step, so heatmaps of an earlier photo are never served.
#[derive(Clone)]
pub struct PhotoSession {
    classifier: Arc<dyn Classifier>,
    config: Arc<AppConfig>,
    state: Arc<Mutex<SessionState>>,
}

impl PhotoSession {
    pub fn new(classifier: Arc<dyn Classifier>, config: AppConfig) -> Result<Self, AppError> {
        config.sweep.validate()?;
        Ok(Self {
            classifier,
            config: Arc::new(config),
            state: Arc::new(Mutex::new(SessionState::default())),
        })
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Crop `photo` to the model input, classify it and make it the session's photo.
    pub async fn classify_photo(&self, photo: &DynamicImage) -> Result<Vec<Prediction>, AppError> {
        let input_size = self.config.sweep.input_size;
        let crop = CropRect::centered(photo.width(), photo.height())
            .ok_or_else(|| AppError::from("Photo has no pixels"))?;
        let edited = photo_service::crop_square(photo, crop, input_size)
            .map(Arc::new)
            .ok_or_else(|| AppError::from("Photo has no pixels"))?;
        let placement = Placement {
            width: photo.width(),
            height: photo.height(),
            crop,
        };

        let generation = {
            let mut state = self.state.lock().await;
            state.generation += 1;
            state.edited = Some(edited.clone());
            state.placement = Some(placement);
            state.baseline.clear();
            state.heatmaps.clear();
            state.generation
        };
        log::debug!("Photo {} loaded, heatmap cache cleared", generation);

        let classifier = self.classifier.clone();
        let image = edited.clone();
        let predictions = tokio::task::spawn_blocking(move || classifier.classify(&image)).await??;

        let mut state = self.state.lock().await;
        if state.generation == generation {
            state.baseline = predictions.clone();
        }
        Ok(predictions)
    }

    /// Occlusion heatmap for `label` on the current photo.
    ///
    /// Returns `Ok(None)` without scheduling any work when the label is not in
    /// the photo's classification, and when the photo changed while sweeping.
    pub async fn analyze(&self, label: &str) -> Result<Option<Analysis>, AppError> {
        let (generation, image, placement, original_confidence) = {
            let state = self.state.lock().await;
            if let Some(images) = state.heatmaps.get(label) {
                log::debug!("Heatmap for '{}' served from cache", label);
                return Ok(Some(Analysis {
                    label: label.to_string(),
                    images: images.clone(),
                    cached: true,
                }));
            }

            let Some(original_confidence) = score_for(&state.baseline, label) else {
                log::info!("'{}' is not among the photo's classifications; nothing to analyze", label);
                return Ok(None);
            };
            let (Some(image), Some(placement)) = (state.edited.clone(), state.placement) else {
                return Ok(None);
            };
            (state.generation, image, placement, original_confidence)
        };

        let sweep_config = self.config.sweep.clone();
        let outcome = sweep::sweep(self.classifier.clone(), image, label.to_string(), sweep_config.clone()).await?;

        let images = tokio::task::spawn_blocking(move || {
            render::render(
                &outcome.grid,
                original_confidence,
                outcome.report,
                &sweep_config,
                &placement,
            )
        })
        .await?;
        let images = Arc::new(images);

        let mut state = self.state.lock().await;
        if state.generation != generation {
            log::info!("Photo changed while analyzing '{}'; discarding heatmap", label);
            return Ok(None);
        }
        state.heatmaps.insert(label.to_string(), images.clone());

        Ok(Some(Analysis {
            label: label.to_string(),
            images,
            cached: false,
        }))
    }

    /// Forget the current photo, its classification and its heatmaps.
    pub async fn reset(&self) {
        let mut state = self.state.lock().await;
        let generation = state.generation + 1;
        *state = SessionState {
            generation,
            ..SessionState::default()
        };
    }

    pub async fn baseline(&self) -> Vec<Prediction> {
        self.state.lock().await.baseline.clone()
    }

    pub async fn cached_labels(&self) -> Vec<String> {
        let mut labels: Vec<String> = self.state.lock().await.heatmaps.keys().cloned().collect();
        labels.sort();
        labels
    }

    /// Top label of the current photo and the brand configured for it.
    pub async fn product_context(&self) -> Option<ProductContext> {
        let state = self.state.lock().await;
        let top = state.baseline.first()?;
        Some(ProductContext {
            product: top.class_name.clone(),
            brand: self.config.brands.get(&top.class_name).cloned(),
        })
    }
}
