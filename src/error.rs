use thiserror::Error;

#[derive(Error, Debug)]
pub enum PorterError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML deserialization failed: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Input error: {0}")]
    Input(String),

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractionError),
}

/// Failures of the OCR collaborator. These never stop a batch; the card is
/// emitted with diagnostics instead.
#[derive(Error, Debug, Clone)]
pub enum ExtractionError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("OCR endpoint responded with status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("model returned no text")]
    EmptyResponse,

    #[error("model output was not valid JSON and repair failed")]
    Malformed { raw: String },

    #[error("no transcription sidecar found for {0}")]
    MissingSidecar(String),
}

impl ExtractionError {
    /// Whether another attempt might succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            ExtractionError::Transport(_) => true,
            ExtractionError::Status { code, .. } => *code == 429 || *code >= 500,
            ExtractionError::EmptyResponse => true,
            ExtractionError::Malformed { .. } => true,
            ExtractionError::MissingSidecar(_) => false,
        }
    }

    /// The raw model text, when the failure carried any.
    pub fn raw_text(&self) -> Option<&str> {
        match self {
            ExtractionError::Malformed { raw } => Some(raw.as_str()),
            ExtractionError::Status { body, .. } if !body.is_empty() => Some(body.as_str()),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, PorterError>;
