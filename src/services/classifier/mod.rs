pub mod inference;
pub mod model_manager;

use crate::error::AppError;
use crate::models::classify_types::Prediction;
use image::RgbImage;

/// Anything that can rank labels for a square RGB image.
///
/// Implementations return a non-empty list sorted by descending confidence.
/// Every failure (model missing, inference error, empty output) is reported
/// as `AppError::classification`, so callers only need to know that the call
/// did not produce results.
pub trait Classifier: Send + Sync {
    fn classify(&self, image: &RgbImage) -> Result<Vec<Prediction>, AppError>;
}

#[cfg(test)]
pub(crate) mod testing {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Script = dyn Fn(Option<(usize, usize)>) -> Result<Vec<Prediction>, AppError> + Send + Sync;

    /// Classifier driven by a closure that is told which sweep cell, if any,
    /// is covered by the mask colour.
    pub struct ScriptedClassifier {
        script: Box<Script>,
        mask_color: [u8; 3],
        stride: u32,
        calls: AtomicUsize,
    }

    impl ScriptedClassifier {
        pub fn new(
            script: impl Fn(Option<(usize, usize)>) -> Result<Vec<Prediction>, AppError> + Send + Sync + 'static,
        ) -> Self {
            Self {
                script: Box::new(script),
                mask_color: [255, 0, 255],
                stride: 16,
                calls: AtomicUsize::new(0),
            }
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }

        fn masked_cell(&self, image: &RgbImage) -> Option<(usize, usize)> {
            image
                .enumerate_pixels()
                .find(|(_, _, p)| p.0 == self.mask_color)
                .map(|(x, y, _)| ((y / self.stride) as usize, (x / self.stride) as usize))
        }
    }

    impl Classifier for ScriptedClassifier {
        fn classify(&self, image: &RgbImage) -> Result<Vec<Prediction>, AppError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let mut preds = (self.script)(self.masked_cell(image))?;
            preds.sort_by(|a, b| b.confidence.partial_cmp(&a.confidence).unwrap_or(std::cmp::Ordering::Equal));
            Ok(preds)
        }
    }

    /// The rice krispie treat scenario: confidence falls by 0.01 per row and per column.
    pub fn linear_drop_classifier() -> ScriptedClassifier {
        ScriptedClassifier::new(|cell| {
            let score = match cell {
                None => 0.92,
                Some((r, c)) => 0.92 - 0.01 * r as f32 - 0.01 * c as f32,
            };
            Ok(vec![
                Prediction::new("rice krispie treat", score),
                Prediction::new("bowl", 0.05),
            ])
        })
    }

    pub fn gray_image(size: u32) -> RgbImage {
        RgbImage::from_pixel(size, size, image::Rgb([128, 128, 128]))
    }
}
