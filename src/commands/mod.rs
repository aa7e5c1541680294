pub mod classifier;
pub mod heatmap;
