pub mod cli;
pub mod commands;
pub mod error;
pub mod models;
pub mod services;

pub use cli::run;
pub use error::AppError;
pub use models::app_config::{AppConfig, SweepConfig};
pub use models::classify_types::Prediction;
pub use models::heatmap_types::{ConfidenceGrid, CropRect, HeatmapImages, SweepReport, SENTINEL};
pub use services::classifier::Classifier;
pub use services::session::{Analysis, PhotoSession};
