use async_trait::async_trait;
use serde_json::Value;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::app::ports::{ImageInput, OcrPort, OcrResponse};
use crate::error::ExtractionError;

/// Reads a transcription stored next to the image instead of calling a model.
///
/// For `cards/jinx.png` the candidates are `cards/jinx.png.json`, then
/// `cards/jinx.json`.
#[derive(Debug, Default, Clone)]
pub struct SidecarOcr;

impl SidecarOcr {
    pub fn new() -> Self {
        Self
    }

    pub fn candidates(image: &Path) -> Vec<PathBuf> {
        let mut with_ext = image.as_os_str().to_owned();
        with_ext.push(".json");
        vec![PathBuf::from(with_ext), image.with_extension("json")]
    }
}

#[async_trait]
impl OcrPort for SidecarOcr {
    async fn extract(&self, image: &ImageInput) -> Result<OcrResponse, ExtractionError> {
        for candidate in Self::candidates(&image.path) {
            let raw_text = match tokio::fs::read_to_string(&candidate).await {
                Ok(text) => text,
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => continue,
                Err(e) => return Err(ExtractionError::Transport(format!("{}: {}", candidate.display(), e))),
            };
            debug!("Using sidecar {}", candidate.display());
            let data: Value = serde_json::from_str(&raw_text)
                .ok()
                .filter(Value::is_object)
                .ok_or_else(|| ExtractionError::Malformed { raw: raw_text.clone() })?;
            return Ok(OcrResponse {
                data,
                raw_text,
                attempts: 1,
            });
        }
        Err(ExtractionError::MissingSidecar(image.display_name()))
    }

    fn name(&self) -> &'static str {
        "sidecar"
    }
}
