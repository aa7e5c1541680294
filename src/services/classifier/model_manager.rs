use crate::error::AppError;
use crate::models::classify_types::Prediction;
use crate::services::classifier::{inference, Classifier};
use image::RgbImage;
use ort::session::Session;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ModelType {
    Base,
    Large,
    MobileNetV3Large,
}

impl ModelType {
    /// (model file, config file) inside the model directory.
    fn config(&self) -> (&'static str, &'static str) {
        match self {
            ModelType::Base => ("convnextv2-base-22k-384.onnx", "convnextv2-base-22k-384-config.json"),
            ModelType::Large => ("convnextv2-large-22k-384.onnx", "convnextv2-large-22k-384-config.json"),
            ModelType::MobileNetV3Large => ("mobilenetv3_large.onnx", "mobilenetv3_config.json"),
        }
    }

    pub fn crop_size(&self) -> u32 {
        match self {
            ModelType::Base | ModelType::Large => 384,
            ModelType::MobileNetV3Large => 224,
        }
    }
}

impl FromStr for ModelType {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "base" => Ok(ModelType::Base),
            "large" => Ok(ModelType::Large),
            "mobilenet" | "mobilenetv3" | "mobilenetv3large" => Ok(ModelType::MobileNetV3Large),
            other => Err(format!("Unknown model type: {}", other).into()),
        }
    }
}

pub type OnnxSession = Session;

/// A session together with what is needed to feed it and read it.
pub struct LoadedModel {
    pub session: OnnxSession,
    pub labels: Vec<String>,
    pub crop_size: u32,
}

/// Owns the ONNX Runtime session and serves as the app's real `Classifier`.
#[derive(Clone)]
pub struct ModelManager {
    pub model_dir: PathBuf,
    model: Arc<std::sync::Mutex<Option<LoadedModel>>>,
    pub loading: Arc<Mutex<bool>>,
    pub error: Arc<Mutex<Option<String>>>,
    pub current_type: Arc<Mutex<ModelType>>,
    pub current_use_gpu: Arc<Mutex<bool>>,
    loaded_type: Arc<Mutex<Option<ModelType>>>,
}

impl ModelManager {
    pub fn new(model_dir: PathBuf) -> Self {
        Self {
            model_dir,
            model: Arc::new(std::sync::Mutex::new(None)),
            loading: Arc::new(Mutex::new(false)),
            error: Arc::new(Mutex::new(None)),
            current_type: Arc::new(Mutex::new(ModelType::MobileNetV3Large)),
            current_use_gpu: Arc::new(Mutex::new(true)),
            loaded_type: Arc::new(Mutex::new(None)),
        }
    }

    pub async fn get_model_type(&self) -> ModelType {
        *self.current_type.lock().await
    }

    pub async fn set_model_type(&self, model_type: ModelType) {
        *self.current_type.lock().await = model_type;
    }

    pub async fn model_path(&self) -> PathBuf {
        let (filename, _) = self.current_type.lock().await.config();
        self.model_dir.join(filename)
    }

    pub async fn config_path(&self) -> PathBuf {
        let (_, filename) = self.current_type.lock().await.config();
        self.model_dir.join(filename)
    }

    pub async fn files_present(&self) -> bool {
        self.model_path().await.exists() && self.config_path().await.exists()
    }

    pub fn is_ready(&self) -> bool {
        self.model.lock().map(|guard| guard.is_some()).unwrap_or(false)
    }

    pub async fn is_loading(&self) -> bool {
        *self.loading.lock().await
    }

    pub async fn get_error(&self) -> Option<String> {
        self.error.lock().await.clone()
    }

    pub async fn load_model(&self, use_gpu: bool) -> Result<(), AppError> {
        let needs_reload = {
            let current_gpu = *self.current_use_gpu.lock().await;
            let loaded = *self.loaded_type.lock().await;
            let requested = *self.current_type.lock().await;
            current_gpu != use_gpu || !self.is_ready() || loaded != Some(requested)
        };

        if !needs_reload {
            return Ok(());
        }

        {
            let mut loading = self.loading.lock().await;
            if *loading {
                return Err("Model is already loading".into());
            }
            *loading = true;
        }

        *self.error.lock().await = None;

        let result = self.do_load_model(use_gpu).await;

        *self.loading.lock().await = false;

        match result {
            Err(ref e) => {
                log::error!("Failed to load model: {}", e);
                *self.error.lock().await = Some(e.message.clone());
            }
            Ok(()) => {
                *self.current_use_gpu.lock().await = use_gpu;
                *self.loaded_type.lock().await = Some(*self.current_type.lock().await);
            }
        }

        result
    }

    async fn do_load_model(&self, use_gpu: bool) -> Result<(), AppError> {
        let config_path = self.config_path().await;
        let config_content = tokio::fs::read_to_string(&config_path)
            .await
            .map_err(|e| AppError {
                message: format!("Failed to read config file {}: {}", config_path.display(), e),
            })?;
        let labels = parse_id2label(&config_content)?;

        let model_type = *self.current_type.lock().await;
        let model_path = self.model_path().await;
        log::info!(
            "Loading {:?} from {} ({} labels, gpu: {})",
            model_type,
            model_path.display(),
            labels.len(),
            use_gpu
        );

        let session = tokio::task::spawn_blocking(move || -> Result<Session, AppError> {
            let _ = ort::init().with_name("occlusion-lens").commit();

            let mut builder = Session::builder()
                .map_err(|e| AppError { message: format!("Failed to create session builder: {}", e) })?
                .with_optimization_level(ort::session::builder::GraphOptimizationLevel::Level3)
                .map_err(|e| AppError { message: format!("Failed to set optimization level: {}", e) })?
                .with_intra_threads(4)
                .map_err(|e| AppError { message: format!("Failed to set intra threads: {}", e) })?;

            if use_gpu {
                builder = builder.with_execution_providers([
                    ort::execution_providers::DirectMLExecutionProvider::default().build(),
                    ort::execution_providers::CoreMLExecutionProvider::default().build(),
                    ort::execution_providers::CUDAExecutionProvider::default().build(),
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ]).map_err(|e| AppError { message: format!("Failed to register GPU execution providers: {}", e) })?;
            } else {
                builder = builder.with_execution_providers([
                    ort::execution_providers::CPUExecutionProvider::default().build(),
                ]).map_err(|e| AppError { message: format!("Failed to register CPU execution provider: {}", e) })?;
            }

            builder.commit_from_file(model_path).map_err(|e| AppError {
                message: format!("Failed to load ONNX model: {}", e),
            })
        })
        .await??;

        let mut guard = self
            .model
            .lock()
            .map_err(|_| AppError::from("Model lock poisoned"))?;
        *guard = Some(LoadedModel {
            session,
            labels,
            crop_size: model_type.crop_size(),
        });

        Ok(())
    }

    pub fn unload(&self) {
        if let Ok(mut guard) = self.model.lock() {
            *guard = None;
        }
    }
}

impl Classifier for ModelManager {
    fn classify(&self, image: &RgbImage) -> Result<Vec<Prediction>, AppError> {
        let crop_size = {
            let guard = self.model.lock().map_err(|_| AppError::classification("model lock poisoned"))?;
            guard
                .as_ref()
                .map(|m| m.crop_size)
                .ok_or_else(|| AppError::classification("model not loaded"))?
        };

        // Preprocess outside the lock so parallel callers only serialize on inference.
        let tensor = inference::preprocess_rgb(image, crop_size).map_err(AppError::classification)?;

        let mut guard = self.model.lock().map_err(|_| AppError::classification("model lock poisoned"))?;
        let loaded = guard
            .as_mut()
            .ok_or_else(|| AppError::classification("model unloaded during classification"))?;
        inference::run_inference_with_model(&mut loaded.session, tensor, &loaded.labels)
            .map_err(AppError::classification)
    }
}

/// Labels ordered by index from a Hugging Face style `id2label` config.
pub fn parse_id2label(config_content: &str) -> Result<Vec<String>, AppError> {
    let config: serde_json::Value = serde_json::from_str(config_content).map_err(|e| AppError {
        message: format!("Failed to parse config JSON: {}", e),
    })?;

    let id2label = config["id2label"]
        .as_object()
        .ok_or_else(|| AppError {
            message: "Config missing id2label field".to_string(),
        })?;

    let mut labels: Vec<(usize, String)> = id2label
        .iter()
        .filter_map(|(k, v)| {
            let idx = k.parse::<usize>().ok()?;
            let label = v.as_str().unwrap_or("unknown").to_string();
            Some((idx, label))
        })
        .collect();
    labels.sort_by_key(|(idx, _)| *idx);
    Ok(labels.into_iter().map(|(_, label)| label).collect())
}
