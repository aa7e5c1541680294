use crate::error::AppError;
use crate::models::classify_types::Prediction;
use crate::services::classifier::model_manager::OnnxSession;
use image::imageops::FilterType;
use image::RgbImage;
use ndarray::Array4;
use ort::value::Value;

// ImageNet normalization constants
const MEAN: [f32; 3] = [0.485, 0.456, 0.406];
const STD: [f32; 3] = [0.229, 0.224, 0.225];

/// Scale-fill `img` to `crop_size` square and build a normalized NCHW tensor.
pub fn preprocess_rgb(img: &RgbImage, crop_size: u32) -> Result<Array4<f32>, AppError> {
    if img.width() == 0 || img.height() == 0 {
        return Err("Cannot classify an empty image".into());
    }

    let resized;
    let rgb = if img.width() == crop_size && img.height() == crop_size {
        img
    } else {
        resized = image::imageops::resize(img, crop_size, crop_size, FilterType::Triangle);
        &resized
    };

    // Pass 1: normalize pixels sequentially (reads and writes are contiguous).
    let raw = rgb.as_raw();
    let hw = (crop_size * crop_size) as usize;
    let mut interleaved = vec![0f32; 3 * hw];
    for (i, pixel) in raw.chunks_exact(3).enumerate() {
        let off = i * 3;
        interleaved[off] = (pixel[0] as f32 / 255.0 - MEAN[0]) / STD[0];
        interleaved[off + 1] = (pixel[1] as f32 / 255.0 - MEAN[1]) / STD[1];
        interleaved[off + 2] = (pixel[2] as f32 / 255.0 - MEAN[2]) / STD[2];
    }

    // Pass 2: transpose HWC → CHW in tiles so the source and all three
    // destination planes stay in L1.
    let mut data = vec![0f32; 3 * hw];
    const TILE: usize = 1024;
    for base in (0..hw).step_by(TILE) {
        let end = (base + TILE).min(hw);
        for i in base..end {
            let src = i * 3;
            data[i] = interleaved[src];
            data[hw + i] = interleaved[src + 1];
            data[2 * hw + i] = interleaved[src + 2];
        }
    }

    Array4::from_shape_vec((1, 3, crop_size as usize, crop_size as usize), data).map_err(|e| AppError {
        message: format!("Failed to create tensor: {}", e),
    })
}

pub fn run_inference_with_model(
    model: &mut OnnxSession,
    input: Array4<f32>,
    labels: &[String],
) -> Result<Vec<Prediction>, AppError> {
    let input_name = model
        .inputs()
        .first()
        .map(|i| i.name().to_string())
        .ok_or_else(|| AppError::from("Model declares no inputs"))?;

    let input_tensor = Value::from_array(input)
        .map_err(|e| AppError { message: format!("Failed to create tensor value: {}", e) })?;

    let outputs = model
        .run(ort::inputs![input_name.as_str() => input_tensor])
        .map_err(|e| AppError {
            message: format!("Inference failed: {}", e),
        })?;

    let output_value = outputs
        .values()
        .next()
        .ok_or_else(|| AppError {
            message: "Model produced no outputs".to_string(),
        })?;

    let (_, data) = output_value
        .try_extract_tensor::<f32>()
        .map_err(|e| AppError {
            message: format!("Failed to extract output tensor: {}", e),
        })?;

    rank_predictions(data, labels)
}

/// Softmax over raw logits, then every label sorted by descending confidence.
pub fn rank_predictions(logits: &[f32], labels: &[String]) -> Result<Vec<Prediction>, AppError> {
    if logits.is_empty() {
        return Err("Model produced no predictions".into());
    }

    let max_logit = logits.iter().fold(f32::NEG_INFINITY, |a, &b| a.max(b));
    let exp_sum: f32 = logits.iter().map(|&x| (x - max_logit).exp()).sum();

    let mut indexed: Vec<(usize, f32)> = logits
        .iter()
        .map(|&x| (x - max_logit).exp() / exp_sum)
        .enumerate()
        .collect();
    indexed.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

    Ok(indexed
        .into_iter()
        .map(|(idx, conf)| {
            let class_name = labels
                .get(idx)
                .cloned()
                .unwrap_or_else(|| format!("class_{}", idx));
            Prediction::new(class_name, conf)
        })
        .collect())
}
