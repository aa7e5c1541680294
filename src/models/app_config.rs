use crate::error::AppError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Geometry and appearance of an occlusion sweep.
///
/// The defaults reproduce the classic setup: a 224 px model input swept by a
/// 64 px block every 16 px, giving an 11x11 grid of masked images.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    pub input_size: u32,
    pub grid_cells: usize,
    pub stride: u32,
    pub mask_size: u32,
    /// Sentinel border around the swept cells in the confidence grid.
    pub padding: usize,
    pub mask_color: [u8; 3],
    /// Worker threads for the sweep; 0 uses the global rayon pool.
    pub workers: usize,
    pub overlay_color: [u8; 3],
    pub outline_color: [u8; 3],
    pub outline_threshold: f32,
    pub outline_width: u32,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            input_size: 224,
            grid_cells: 11,
            stride: 16,
            mask_size: 64,
            padding: 3,
            mask_color: [255, 0, 255],
            workers: 0,
            overlay_color: [0, 0, 0],
            outline_color: [255, 255, 255],
            outline_threshold: 0.5,
            outline_width: 2,
        }
    }
}

impl SweepConfig {
    /// Side length of the padded confidence grid (17 by default).
    pub fn grid_dim(&self) -> usize {
        self.grid_cells + 2 * self.padding
    }

    /// How many stride-sized blocks one mask spans along each axis.
    pub fn window(&self) -> usize {
        (self.mask_size / self.stride.max(1)) as usize
    }

    pub fn cell_count(&self) -> usize {
        self.grid_cells * self.grid_cells
    }

    pub fn validate(&self) -> Result<(), AppError> {
        if self.grid_cells == 0 || self.stride == 0 || self.input_size == 0 {
            return Err("Sweep grid, stride and input size must be non-zero".into());
        }
        if self.mask_size < self.stride || self.mask_size % self.stride != 0 {
            return Err(format!(
                "Mask size {} must be a positive multiple of stride {}",
                self.mask_size, self.stride
            )
            .into());
        }
        let reach = u32::try_from(self.grid_cells - 1)
            .ok()
            .and_then(|steps| steps.checked_mul(self.stride))
            .and_then(|offset| offset.checked_add(self.mask_size));
        match reach {
            Some(reach) if reach <= self.input_size => {}
            Some(reach) => {
                return Err(format!(
                    "Sweep reaches {} px but the input is only {} px",
                    reach, self.input_size
                )
                .into());
            }
            None => {
                return Err(format!(
                    "A {}-cell sweep does not fit in a {} px input",
                    self.grid_cells, self.input_size
                )
                .into());
            }
        }
        if self.padding + 1 < self.window() {
            return Err(format!(
                "Padding {} is too small for a {}-block mask window",
                self.padding,
                self.window()
            )
            .into());
        }
        if !(0.0..=1.0).contains(&self.outline_threshold) {
            return Err("Outline threshold must lie in [0, 1]".into());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub sweep: SweepConfig,
    /// Top label -> brand shown alongside it.
    pub brands: BTreeMap<String, String>,
}

impl Default for AppConfig {
    fn default() -> Self {
        let mut brands = BTreeMap::new();
        brands.insert("soylent".to_string(), "Soylent".to_string());
        brands.insert("rice krispie treat".to_string(), "Kellogg's".to_string());
        Self {
            sweep: SweepConfig::default(),
            brands,
        }
    }
}

impl AppConfig {
    pub fn from_file(path: &Path) -> Result<Self, AppError> {
        let content = std::fs::read_to_string(path).map_err(|e| AppError {
            message: format!("Failed to read config file {}: {}", path.display(), e),
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> Result<Self, AppError> {
        let config: AppConfig = serde_json::from_str(content).map_err(|e| AppError {
            message: format!("Failed to parse config JSON: {}", e),
        })?;
        config.sweep.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_geometry() {
        let config = SweepConfig::default();
        assert_eq!(config.grid_dim(), 17);
        assert_eq!(config.window(), 4);
        assert_eq!(config.cell_count(), 121);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let config = AppConfig::from_json(r#"{"sweep": {"workers": 2}}"#).unwrap();
        assert_eq!(config.sweep.workers, 2);
        assert_eq!(config.sweep.mask_size, 64);
        assert_eq!(config.brands.get("soylent").map(String::as_str), Some("Soylent"));
    }

    #[test]
    fn test_rejects_sweep_larger_than_input() {
        let config = SweepConfig {
            grid_cells: 12,
            ..SweepConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_huge_grid_without_overflow() {
        let config = SweepConfig {
            grid_cells: 300_000_000,
            ..SweepConfig::default()
        };
        assert!(config.validate().is_err());

        let config = SweepConfig {
            grid_cells: usize::MAX,
            ..SweepConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[cfg(target_pointer_width = "64")]
    #[test]
    fn test_rejects_grid_that_truncates_to_one() {
        let config = SweepConfig {
            grid_cells: (1usize << 32) + 1,
            ..SweepConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(AppConfig::from_json(r#"{"sweep": {"grid_cells": 4294967297}}"#).is_err());
    }

    #[test]
    fn test_rejects_mask_not_multiple_of_stride() {
        let config = SweepConfig {
            mask_size: 60,
            ..SweepConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_rejects_thin_padding() {
        let config = SweepConfig {
            padding: 2,
            ..SweepConfig::default()
        };
        assert!(config.validate().is_err());
        assert!(AppConfig::from_json(r#"{"sweep": {"padding": 1}}"#).is_err());
    }
}
