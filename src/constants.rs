//! Constants shared across the importer.
//! Keep output-shape constants here so the writer, the validation pass and the
//! JSON schema stay in step.

/// Version stamped into every emitted card record
pub const SCHEMA_VERSION: u32 = 1;

/// Image extensions picked up when the input is a directory
pub const SUPPORTED_EXTENSIONS: &[&str] = &["png", "webp", "jpg", "jpeg"];

/// Default vision model
pub const DEFAULT_MODEL: &str = "gpt-4o";

/// Default OpenAI-compatible endpoint
pub const DEFAULT_OCR_BASE_URL: &str = "https://api.openai.com/v1";

/// Environment variable holding the OCR API key unless configured otherwise
pub const DEFAULT_API_KEY_ENV: &str = "OPENAI_API_KEY";

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "porter.toml";

/// Fallback file stem when a card name sanitizes to nothing
pub const FALLBACK_FILE_STEM: &str = "card";

/// Upper bound when expanding `{domain, amount}` power entries into tokens
pub const MAX_POWER_TOKENS_PER_ENTRY: u32 = 9;

/// Check whether a file extension is one we import
pub fn is_supported_extension(ext: &str) -> bool {
    let lower = ext.to_ascii_lowercase();
    SUPPORTED_EXTENSIONS.iter().any(|e| *e == lower)
}
