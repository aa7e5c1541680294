use serde::Serialize;

#[derive(Debug, Serialize, Clone)]
pub struct ModelStatus {
    pub files_present: bool,
    pub loading: bool,
    pub ready: bool,
    pub error: Option<String>,
}

#[derive(Debug, Serialize, Clone)]
pub struct ClassifyResult {
    pub file_name: String,
    pub file_path: String,
    pub predictions: Vec<Prediction>,
    pub product: Option<ProductContext>,
}

#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct Prediction {
    pub class_name: String,
    pub confidence: f32,
}

impl Prediction {
    pub fn new(class_name: impl Into<String>, confidence: f32) -> Self {
        Self {
            class_name: class_name.into(),
            confidence,
        }
    }
}

/// Confidence reported for `label`, if the classifier returned it at all.
pub fn score_for(predictions: &[Prediction], label: &str) -> Option<f32> {
    predictions
        .iter()
        .find(|p| p.class_name == label)
        .map(|p| p.confidence)
}

/// What the current photo is believed to show.
#[derive(Debug, Serialize, Clone, PartialEq)]
pub struct ProductContext {
    pub product: String,
    pub brand: Option<String>,
}
