// Pipeline ingestion: duplicate detection and the guards around OCR calls

pub mod duplicate_index;
pub mod rate_limiter;
pub mod retry;
