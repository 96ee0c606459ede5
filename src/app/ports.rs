use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::constants::FALLBACK_FILE_STEM;
use crate::error::{ExtractionError, Result};
use crate::types::{CardSpec, RawExtractionData};

/// One source image, read once and shared with the OCR adapter
#[derive(Clone, Debug)]
pub struct ImageInput {
    pub path: PathBuf,
    pub bytes: Arc<Vec<u8>>,
}

impl ImageInput {
    pub fn new(path: PathBuf, bytes: Vec<u8>) -> Self {
        Self {
            path,
            bytes: Arc::new(bytes),
        }
    }

    /// File stem, used for name repair and sidecar lookup
    pub fn stem(&self) -> String {
        self.path
            .file_stem()
            .and_then(|s| s.to_str())
            .filter(|s| !s.is_empty())
            .unwrap_or(FALLBACK_FILE_STEM)
            .to_string()
    }

    /// File name for logs and duplicate reports
    pub fn display_name(&self) -> String {
        self.path
            .file_name()
            .and_then(|s| s.to_str())
            .map(str::to_string)
            .unwrap_or_else(|| self.path.display().to_string())
    }

    pub fn media_type(&self) -> &'static str {
        media_type_for(&self.path)
    }
}

/// MIME type from the image extension
pub fn media_type_for(path: &Path) -> &'static str {
    match path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("png") => "image/png",
        Some("webp") => "image/webp",
        Some("jpg") | Some("jpeg") => "image/jpeg",
        _ => "application/octet-stream",
    }
}

/// What the OCR collaborator returned for one image
#[derive(Clone, Debug)]
pub struct OcrResponse {
    /// Parsed JSON payload
    pub data: RawExtractionData,
    /// Text exactly as the model (or sidecar) produced it
    pub raw_text: String,
    /// Requests made, including retries and the repair request
    pub attempts: u32,
}

// Extraction side
#[async_trait]
pub trait OcrPort: Send + Sync {
    async fn extract(&self, image: &ImageInput) -> std::result::Result<OcrResponse, ExtractionError>;

    /// Short adapter name for logs
    fn name(&self) -> &'static str;
}

// Output side
#[async_trait]
pub trait CardOutputPort: Send + Sync {
    /// Persist one record, returning where it landed
    async fn write_card(&self, card: &CardSpec) -> Result<PathBuf>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_image_input_names() {
        let image = ImageInput::new(PathBuf::from("cards/Jinx_Loose-Cannon.PNG"), vec![1, 2, 3]);
        assert_eq!(image.stem(), "Jinx_Loose-Cannon");
        assert_eq!(image.display_name(), "Jinx_Loose-Cannon.PNG");
        assert_eq!(image.media_type(), "image/png");
        assert_eq!(media_type_for(Path::new("a.jpeg")), "image/jpeg");
        assert_eq!(media_type_for(Path::new("a.gif")), "application/octet-stream");
    }
}
