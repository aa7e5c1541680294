pub mod app_config;
pub mod classify_types;
pub mod heatmap_types;
