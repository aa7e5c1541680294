pub mod classifier;
pub mod fs_service;
pub mod heatmap;
pub mod photo_service;
pub mod session;
