use crate::error::AppError;
use crate::models::app_config::SweepConfig;
use crate::models::classify_types::score_for;
use crate::models::heatmap_types::{ConfidenceGrid, SweepReport};
use crate::services::classifier::Classifier;
use crate::services::heatmap::mask::mask_image;
use image::RgbImage;
use rayon::prelude::*;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Instant;

#[derive(Debug, Clone)]
pub struct SweepOutcome {
    pub grid: ConfidenceGrid,
    pub report: SweepReport,
}

/// Every `(row, col)` of the sweep, row-major.
pub fn sweep_cells(config: &SweepConfig) -> Vec<(usize, usize)> {
    let n = config.grid_cells;
    (0..n).flat_map(|row| (0..n).map(move |col| (row, col))).collect()
}

/// Classify one masked copy of `image` per sweep cell and collect the
/// confidence reported for `target`.
///
/// Cells run in parallel; each produces exactly one grid value. A cell whose
/// classification fails, or whose result lacks `target`, stays at the
/// sentinel. The grid is assembled only after every cell has finished.
pub fn run_sweep(
    classifier: &dyn Classifier,
    image: &RgbImage,
    target: &str,
    config: &SweepConfig,
) -> Result<SweepOutcome, AppError> {
    config.validate()?;

    let start = Instant::now();
    let cells = sweep_cells(config);
    let scheduled = cells.len();
    let completed = AtomicUsize::new(0);

    log::info!("Sweeping {} occlusion cells for '{}'", scheduled, target);

    let classify_cell = |&(row, col): &(usize, usize)| {
        let masked = mask_image(image, row, col, config);
        let score = match classifier.classify(&masked) {
            Ok(predictions) => score_for(&predictions, target),
            Err(e) => {
                log::debug!("Cell ({}, {}) failed: {}", row, col, e);
                None
            }
        };
        completed.fetch_add(1, Ordering::Relaxed);
        (row, col, score)
    };

    let results: Vec<(usize, usize, Option<f32>)> = if config.workers == 0 {
        cells.par_iter().map(classify_cell).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.workers)
            .build()
            .map_err(|e| AppError {
                message: format!("Failed to build sweep thread pool: {}", e),
            })?;
        pool.install(|| cells.par_iter().map(classify_cell).collect())
    };

    let mut grid = ConfidenceGrid::new(config.grid_cells, config.padding);
    let mut failed = 0;
    for (row, col, score) in results {
        match score {
            Some(value) => grid.set(row, col, value.max(0.0)),
            None => failed += 1,
        }
    }

    let report = SweepReport {
        label: target.to_string(),
        scheduled,
        completed: completed.into_inner(),
        failed,
        elapsed_ms: start.elapsed().as_millis() as u64,
    };

    if failed > 0 {
        log::warn!(
            "Sweep for '{}': {} of {} cells produced no score",
            target,
            failed,
            scheduled
        );
    }
    log::info!("Sweep for '{}' finished in {} ms", target, report.elapsed_ms);

    Ok(SweepOutcome { grid, report })
}

/// `run_sweep` off the async runtime; resolves once every cell is accounted for.
pub async fn sweep(
    classifier: Arc<dyn Classifier>,
    image: Arc<RgbImage>,
    target: String,
    config: SweepConfig,
) -> Result<SweepOutcome, AppError> {
    tokio::task::spawn_blocking(move || run_sweep(classifier.as_ref(), &image, &target, &config)).await?
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::classify_types::Prediction;
    use crate::models::heatmap_types::SENTINEL;
    use crate::services::classifier::testing::{gray_image, linear_drop_classifier, ScriptedClassifier};

    #[test]
    fn test_sweep_cells_row_major() {
        let cells = sweep_cells(&SweepConfig::default());
        assert_eq!(cells.len(), 121);
        assert_eq!(cells[0], (0, 0));
        assert_eq!(cells[1], (0, 1));
        assert_eq!(cells[120], (10, 10));
    }

    #[test]
    fn test_sweep_fills_active_region_only() {
        let classifier = linear_drop_classifier();
        let config = SweepConfig::default();
        let outcome = run_sweep(&classifier, &gray_image(224), "rice krispie treat", &config).unwrap();

        assert_eq!(classifier.calls(), 121);
        assert_eq!(outcome.grid.computed_count(), 121);
        let padded = outcome.grid.padded();
        for r in 0..17 {
            for c in 0..17 {
                let inside = (3..14).contains(&r) && (3..14).contains(&c);
                if inside {
                    assert!(padded[[r, c]] >= 0.0);
                } else {
                    assert_eq!(padded[[r, c]], SENTINEL);
                }
            }
        }
        let expected = 0.92 - 0.01 * 4.0 - 0.01 * 7.0;
        assert!((outcome.grid.get(4, 7).unwrap() - expected).abs() < 1e-6);
    }

    #[test]
    fn test_failed_cells_stay_sentinel() {
        let classifier = ScriptedClassifier::new(|cell| match cell {
            Some((r, _)) if r == 0 => Err(AppError::classification("vision pipeline failed")),
            Some((_, c)) if c == 0 => Ok(vec![Prediction::new("bowl", 0.5)]),
            _ => Ok(vec![Prediction::new("soylent", 0.7)]),
        });
        let config = SweepConfig {
            workers: 3,
            ..SweepConfig::default()
        };
        let outcome = run_sweep(&classifier, &gray_image(224), "soylent", &config).unwrap();

        // row 0 errors (11), column 0 lacks the label (10 more)
        assert_eq!(outcome.report.failed, 21);
        assert_eq!(outcome.report.scheduled, 121);
        assert_eq!(outcome.report.completed, 121);
        assert_eq!(outcome.grid.computed_count(), 121 - 21);
        assert_eq!(outcome.grid.get(0, 5), None);
        assert_eq!(outcome.grid.get(5, 0), None);
        assert_eq!(outcome.grid.get(5, 5), Some(0.7));
    }

    #[test]
    fn test_sweep_rejects_invalid_config() {
        let classifier = linear_drop_classifier();
        let config = SweepConfig {
            stride: 0,
            ..SweepConfig::default()
        };
        assert!(run_sweep(&classifier, &gray_image(224), "bowl", &config).is_err());
        assert_eq!(classifier.calls(), 0);
    }

    #[tokio::test]
    async fn test_async_sweep_resolves_after_all_cells() {
        let classifier = Arc::new(linear_drop_classifier());
        let outcome = sweep(
            classifier.clone(),
            Arc::new(gray_image(224)),
            "rice krispie treat".to_string(),
            SweepConfig::default(),
        )
        .await
        .unwrap();
        assert_eq!(classifier.calls(), 121);
        assert_eq!(outcome.grid.largest_drop_cell(), Some((10, 10)));
        assert_eq!(outcome.grid.smallest_drop_cell(), Some((0, 0)));
    }
}
