use crate::error::AppError;
use crate::models::classify_types::ModelStatus;
use crate::services::classifier::model_manager::{ModelManager, ModelType};

pub async fn get_model_status(model_manager: &ModelManager) -> Result<ModelStatus, AppError> {
    Ok(ModelStatus {
        files_present: model_manager.files_present().await,
        loading: model_manager.is_loading().await,
        ready: model_manager.is_ready(),
        error: model_manager.get_error().await,
    })
}

pub async fn load_model(
    model_manager: &ModelManager,
    model_type: Option<ModelType>,
    use_gpu: Option<bool>,
) -> Result<(), AppError> {
    if let Some(t) = model_type {
        model_manager.set_model_type(t).await;
    }

    if !model_manager.files_present().await {
        return Err(format!(
            "Model files not found in {}. Expected {} and {}.",
            model_manager.model_dir.display(),
            model_manager.model_path().await.display(),
            model_manager.config_path().await.display(),
        )
        .into());
    }
    model_manager.load_model(use_gpu.unwrap_or(true)).await
}
