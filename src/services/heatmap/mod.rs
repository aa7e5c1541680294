pub mod mask;
pub mod render;
pub mod sweep;
