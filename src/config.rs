use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::visual::colormap::ColorMapKind;
use crate::visual::resize::Interpolation;

pub const DEFAULT_ALPHA: f64 = 0.4;
pub const DEFAULT_ADDR: &str = "127.0.0.1:8000";
pub const DEFAULT_MODEL_PATH: &str = "models/malaria_cam.json";
pub const DEFAULT_MAX_UPLOAD_BYTES: u64 = 10 * 1024 * 1024;

pub const ENV_ADDR: &str = "MALARIA_CAM_ADDR";
pub const ENV_MODEL: &str = "MALARIA_CAM_MODEL";

/// How saliency maps are rendered onto the original image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExplainConfig {
    /// Heatmap weight in the overlay, in [0, 1].
    pub alpha: f64,
    pub colormap: ColorMapKind,
    pub interpolation: Interpolation,
}

impl Default for ExplainConfig {
    fn default() -> Self {
        ExplainConfig {
            alpha: DEFAULT_ALPHA,
            colormap: ColorMapKind::default(),
            interpolation: Interpolation::default(),
        }
    }
}

impl ExplainConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(0.0..=1.0).contains(&self.alpha) {
            return Err(ConfigError::Invalid(format!(
                "alpha must be within [0, 1], got {}",
                self.alpha
            )));
        }
        Ok(())
    }
}

/// Settings of the HTTP prediction service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub addr: String,
    pub model_path: PathBuf,
    /// Attach heatmap and overlay to predictions.
    pub include_gradcam: bool,
    /// Largest accepted request body; bigger uploads get 413.
    pub max_upload_bytes: u64,
    pub explain: ExplainConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        ServerConfig {
            addr: DEFAULT_ADDR.to_owned(),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            include_gradcam: true,
            max_upload_bytes: DEFAULT_MAX_UPLOAD_BYTES,
            explain: ExplainConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Reads a JSON config file. Missing fields take their defaults.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let json = fs::read_to_string(path)?;
        let config: ServerConfig = serde_json::from_str(&json)?;
        config.validate()?;
        Ok(config)
    }

    /// File config (or defaults) with environment overrides applied.
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let config = match path {
            Some(path) => Self::from_file(path)?,
            None => Self::default(),
        };
        let config = config.with_overrides(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Applies `MALARIA_CAM_ADDR` / `MALARIA_CAM_MODEL` as resolved by `lookup`.
    pub fn with_overrides<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(addr) = lookup(ENV_ADDR).filter(|v| !v.is_empty()) {
            self.addr = addr;
        }
        if let Some(model) = lookup(ENV_MODEL).filter(|v| !v.is_empty()) {
            self.model_path = PathBuf::from(model);
        }
        self
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.addr.trim().is_empty() {
            return Err(ConfigError::Invalid("addr must not be empty".into()));
        }
        if self.max_upload_bytes == 0 {
            return Err(ConfigError::Invalid("max_upload_bytes must be positive".into()));
        }
        self.explain.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_json_keeps_defaults() {
        let config: ServerConfig =
            serde_json::from_str(r#"{"include_gradcam": false, "explain": {"colormap": "hot"}}"#).unwrap();
        assert!(!config.include_gradcam);
        assert_eq!(config.addr, DEFAULT_ADDR);
        assert_eq!(config.explain.colormap, ColorMapKind::Hot);
        assert_eq!(config.explain.alpha, DEFAULT_ALPHA);
        assert_eq!(config.explain.interpolation, Interpolation::Bilinear);
        assert_eq!(config.max_upload_bytes, DEFAULT_MAX_UPLOAD_BYTES);
    }

    #[test]
    fn zero_upload_limit_is_invalid() {
        let config = ServerConfig { max_upload_bytes: 0, ..ServerConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
    }

    #[test]
    fn alpha_out_of_range_is_invalid() {
        let config = ExplainConfig { alpha: 1.2, ..ExplainConfig::default() };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        let config = ExplainConfig { alpha: f64::NAN, ..ExplainConfig::default() };
        assert!(config.validate().is_err());
    }

    #[test]
    fn environment_overrides_file_values() {
        let config = ServerConfig::default().with_overrides(|key| match key {
            ENV_ADDR => Some("0.0.0.0:9000".to_owned()),
            ENV_MODEL => Some(String::new()),
            _ => None,
        });
        assert_eq!(config.addr, "0.0.0.0:9000");
        assert_eq!(config.model_path, PathBuf::from(DEFAULT_MODEL_PATH));
    }
}
