pub mod json_writer;
pub mod openai_ocr;
pub mod prompt;
pub mod sidecar_ocr;
