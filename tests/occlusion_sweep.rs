//! End-to-end occlusion analysis through the public API, with an in-memory
//! classifier standing in for the ONNX model.

use image::{DynamicImage, Rgb, RgbImage};
use occlusion_lens_lib::services::heatmap::sweep::run_sweep;
use occlusion_lens_lib::{AppConfig, AppError, Classifier, PhotoSession, Prediction, SweepConfig, SENTINEL};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

const MAGENTA: [u8; 3] = [255, 0, 255];

/// Scores "rice krispie treat" at `0.92 - 0.01*r - 0.01*c` when mask `(r, c)` is present.
struct RiceKrispieModel {
    calls: AtomicUsize,
    fail_rows: Vec<usize>,
}

impl RiceKrispieModel {
    fn new() -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_rows: Vec::new(),
        }
    }

    fn failing_rows(rows: &[usize]) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            fail_rows: rows.to_vec(),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Classifier for RiceKrispieModel {
    fn classify(&self, image: &RgbImage) -> Result<Vec<Prediction>, AppError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let masked = image
            .enumerate_pixels()
            .find(|(_, _, p)| p.0 == MAGENTA)
            .map(|(x, y, _)| ((y / 16) as usize, (x / 16) as usize));

        let score = match masked {
            None => 0.92,
            Some((r, _)) if self.fail_rows.contains(&r) => {
                return Err(AppError::classification("no results"));
            }
            Some((r, c)) => 0.92 - 0.01 * r as f32 - 0.01 * c as f32,
        };
        Ok(vec![
            Prediction::new("rice krispie treat", score),
            Prediction::new("bowl", 0.05),
        ])
    }
}

fn photo(width: u32, height: u32) -> DynamicImage {
    DynamicImage::ImageRgb8(RgbImage::from_pixel(width, height, Rgb([120, 110, 100])))
}

#[test]
fn test_cells_outside_active_region_stay_sentinel() {
    let model = RiceKrispieModel::new();
    let image = RgbImage::from_pixel(224, 224, Rgb([120, 110, 100]));
    let outcome = run_sweep(&model, &image, "rice krispie treat", &SweepConfig::default()).unwrap();

    let padded = outcome.grid.padded();
    let mut outside = 0;
    for ((r, c), value) in padded.indexed_iter() {
        if !(3..14).contains(&r) || !(3..14).contains(&c) {
            assert_eq!(*value, SENTINEL);
            outside += 1;
        }
    }
    assert_eq!(outside, 17 * 17 - 121);
}

#[test]
fn test_computed_cells_equal_scheduled_minus_failures() {
    let model = RiceKrispieModel::failing_rows(&[2, 7]);
    let image = RgbImage::from_pixel(224, 224, Rgb([120, 110, 100]));
    let outcome = run_sweep(&model, &image, "rice krispie treat", &SweepConfig::default()).unwrap();

    assert_eq!(outcome.report.failed, 22);
    assert_eq!(outcome.grid.computed_count(), 121 - outcome.report.failed);
    assert_eq!(model.calls(), 121);
}

#[tokio::test]
async fn test_rice_krispie_scenario() {
    let model = Arc::new(RiceKrispieModel::new());
    let session = PhotoSession::new(model.clone(), AppConfig::default()).unwrap();

    let baseline = session.classify_photo(&photo(224, 224)).await.unwrap();
    assert_eq!(
        baseline,
        vec![Prediction::new("rice krispie treat", 0.92), Prediction::new("bowl", 0.05)]
    );

    let analysis = session.analyze("rice krispie treat").await.unwrap().unwrap();
    assert!(!analysis.cached);
    assert_eq!(analysis.images.report.failed, 0);

    // pixels owned by cell (10,10) are the darkest; those owned by cell (0,0) are clear
    let heatmap = &analysis.images.heatmap;
    let darkest = heatmap.pixels().map(|p| p[3]).max().unwrap();
    assert_eq!(heatmap.get_pixel(223, 223)[3], darkest);
    assert_eq!(heatmap.get_pixel(0, 0)[3], 0);
    assert!(heatmap.get_pixel(223, 223)[3] > heatmap.get_pixel(100, 100)[3]);
    for (x, y, p) in heatmap.enumerate_pixels() {
        if p[3] == darkest {
            assert!(x >= 184 && y >= 184, "darkest pixel ({}, {}) outside cell (10,10)", x, y);
        }
    }
}

#[tokio::test]
async fn test_repeat_analysis_uses_cache() {
    let model = Arc::new(RiceKrispieModel::new());
    let session = PhotoSession::new(model.clone(), AppConfig::default()).unwrap();
    session.classify_photo(&photo(640, 480)).await.unwrap();

    session.analyze("rice krispie treat").await.unwrap().unwrap();
    let calls = model.calls();
    let again = session.analyze("rice krispie treat").await.unwrap().unwrap();
    assert!(again.cached);
    assert_eq!(model.calls(), calls);
}

#[tokio::test]
async fn test_new_photo_requires_fresh_sweep() {
    let model = Arc::new(RiceKrispieModel::new());
    let session = PhotoSession::new(model.clone(), AppConfig::default()).unwrap();
    session.classify_photo(&photo(224, 224)).await.unwrap();
    let first = session.analyze("rice krispie treat").await.unwrap().unwrap();

    session.classify_photo(&photo(300, 200)).await.unwrap();
    let calls = model.calls();
    let second = session.analyze("rice krispie treat").await.unwrap().unwrap();

    assert!(!second.cached);
    assert_eq!(model.calls(), calls + 121);
    assert!(!Arc::ptr_eq(&first.images, &second.images));
    assert_eq!(second.images.heatmap.dimensions(), (300, 200));
}

#[tokio::test]
async fn test_unknown_label_never_sweeps() {
    let model = Arc::new(RiceKrispieModel::new());
    let session = PhotoSession::new(model.clone(), AppConfig::default()).unwrap();
    session.classify_photo(&photo(224, 224)).await.unwrap();

    assert!(session.analyze("soylent").await.unwrap().is_none());
    assert_eq!(model.calls(), 1);
}
