//! Configuration management for Graphis.
//!
//! Configuration is loaded from a platform config directory (TOML) with
//! sensible defaults. All config structs implement `Default`.

use crate::error::ConfigError;
use crate::model::Architecture;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Root configuration structure for Graphis.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// General settings
    pub general: GeneralConfig,

    /// Embedding model settings
    pub model: ModelConfig,

    /// Image normalization settings
    pub preprocess: PreprocessConfig,

    /// Training settings
    pub training: TrainingConfig,

    /// Logging settings
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from the default location.
    ///
    /// Returns default configuration if the file doesn't exist.
    pub fn load() -> Result<Self, ConfigError> {
        let path = Self::default_path();
        if path.exists() {
            Self::load_from(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        config.validate()?;
        Ok(config)
    }

    /// Get the default config file path.
    ///
    /// Uses platform-appropriate directories, falling back to
    /// ~/.graphis/config.toml if directory detection fails.
    pub fn default_path() -> PathBuf {
        directories::ProjectDirs::from("com", "graphis", "graphis")
            .map(|dirs| dirs.config_dir().to_path_buf().join("config.toml"))
            .unwrap_or_else(|| {
                let home = std::env::var("HOME").unwrap_or_else(|_| ".".to_string());
                PathBuf::from(home).join(".graphis").join("config.toml")
            })
    }

    /// Get the resolved model directory path (with ~ expansion).
    pub fn model_dir(&self) -> PathBuf {
        let path_str = self.general.model_dir.to_string_lossy();
        let expanded = shellexpand::tilde(&path_str);
        PathBuf::from(expanded.into_owned())
    }

    /// Serialize the config to a pretty TOML string.
    pub fn to_toml(&self) -> Result<String, ConfigError> {
        toml::to_string_pretty(self).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.model.input_size == 0 {
            return Err(ConfigError::ValidationError(
                "model.input_size must be positive".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.training.validation_split) {
            return Err(ConfigError::ValidationError(
                "training.validation_split must be in [0, 1)".to_string(),
            ));
        }
        if self.training.negative_ratio < 0.0 {
            return Err(ConfigError::ValidationError(
                "training.negative_ratio must not be negative".to_string(),
            ));
        }
        Ok(())
    }
}

/// General settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GeneralConfig {
    /// Directory where versioned model artifacts are stored
    pub model_dir: PathBuf,
}

impl Default for GeneralConfig {
    fn default() -> Self {
        Self {
            model_dir: PathBuf::from("~/.graphis/models"),
        }
    }
}

/// Embedding model settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ModelConfig {
    /// Feature extractor tier ("simple" or "enhanced")
    pub architecture: Architecture,

    /// Side length of the square grayscale model input, in pixels
    pub input_size: u32,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            architecture: Architecture::Enhanced,
            input_size: 128,
        }
    }
}

/// Image normalization settings.
///
/// The pipeline order is fixed: deskew → denoise → contrast → sharpen.
/// The resize filter is Lanczos3 and changing it is a breaking
/// compatibility change for every stored embedding.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PreprocessConfig {
    /// Estimate stroke orientation and rotate to correct tilt
    pub deskew: bool,

    /// 3x3 median filter before enhancement
    pub denoise: bool,

    /// Contrast enhancement about the image mean
    pub contrast: bool,

    /// Unsharp-mask sharpening
    pub sharpen: bool,
}

impl Default for PreprocessConfig {
    fn default() -> Self {
        Self {
            deskew: false,
            denoise: false,
            contrast: true,
            sharpen: true,
        }
    }
}

/// Training settings (defaults for CLI and job submissions).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TrainingConfig {
    /// Maximum number of epochs (early stopping may end the run sooner)
    pub epochs: usize,

    /// Minibatch size
    pub batch_size: usize,

    /// Fraction of pairs held out for validation
    pub validation_split: f32,

    /// Adam learning rate (starting point; halved on plateau)
    pub learning_rate: f32,

    /// Negative pairs drawn per positive pair
    pub negative_ratio: f64,

    /// Grid-search the learning rate on a capped pair subset first
    pub tune_hyperparams: bool,

    /// Seed for pair sampling, weight init, and augmentation
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            epochs: 50,
            batch_size: 32,
            validation_split: 0.2,
            learning_rate: 1e-3,
            negative_ratio: 1.0,
            tune_hyperparams: false,
            seed: 42,
        }
    }
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: error, warn, info, debug, trace
    pub level: String,

    /// Log format: "pretty" or "json"
    pub format: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            format: "pretty".to_string(),
        }
    }
}
