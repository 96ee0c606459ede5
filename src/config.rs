use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::constants::{DEFAULT_API_KEY_ENV, DEFAULT_CONFIG_FILE, DEFAULT_MODEL, DEFAULT_OCR_BASE_URL};
use crate::error::{PorterError, Result};
use crate::pipeline::ingestion::rate_limiter::Limits;
use crate::pipeline::ingestion::retry::RetryConfig;

/// Top-level configuration, read from `porter.toml`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PorterConfig {
    pub ocr: OcrConfig,
    pub pipeline: PipelineConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    pub model: String,
    pub base_url: String,
    /// Name of the environment variable holding the API key
    pub api_key_env: String,
    pub temperature: f32,
    pub top_p: Option<f32>,
    pub seed: Option<i64>,
    pub timeout_seconds: u64,
    pub requests_per_min: Option<u64>,
    /// Image bytes sent to the endpoint per minute
    pub bytes_per_min: Option<u64>,
    pub concurrency: Option<u32>,
    pub retry: RetryConfig,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            base_url: DEFAULT_OCR_BASE_URL.to_string(),
            api_key_env: DEFAULT_API_KEY_ENV.to_string(),
            temperature: 0.0,
            top_p: None,
            seed: None,
            timeout_seconds: 60,
            requests_per_min: None,
            bytes_per_min: None,
            concurrency: None,
            retry: RetryConfig::default(),
        }
    }
}

impl OcrConfig {
    pub fn limits(&self) -> Limits {
        Limits {
            requests_per_min: self.requests_per_min,
            bytes_per_min: self.bytes_per_min,
            concurrency: self.concurrency,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    pub workers: usize,
    pub out_dir: PathBuf,
    pub index_path: Option<PathBuf>,
    pub debug_samples: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 4,
            out_dir: PathBuf::from("output"),
            index_path: None,
            debug_samples: 0,
        }
    }
}

impl PorterConfig {
    /// Load from `path`, or from `porter.toml` in the working directory when
    /// it exists, else defaults. An explicit path that cannot be read is an
    /// error.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config_path = match path {
            Some(p) => p.to_path_buf(),
            None => {
                let default = PathBuf::from(DEFAULT_CONFIG_FILE);
                if !default.exists() {
                    debug!("No {} found, using default configuration", DEFAULT_CONFIG_FILE);
                    return Ok(Self::default());
                }
                default
            }
        };

        let config_content = fs::read_to_string(&config_path).map_err(|e| {
            PorterError::Config(format!(
                "Failed to read config file '{}': {}",
                config_path.display(),
                e
            ))
        })?;
        let config = Self::from_toml(&config_content)?;
        info!("Loaded configuration from {}", config_path.display());
        Ok(config)
    }

    pub fn from_toml(content: &str) -> Result<Self> {
        let config: PorterConfig = toml::from_str(content)?;
        if config.pipeline.workers == 0 {
            return Err(PorterError::Config("pipeline.workers must be at least 1".to_string()));
        }
        Ok(config)
    }
}
