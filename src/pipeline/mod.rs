// Card import pipeline: ingestion bookkeeping, per-card processing, and the batch runner

pub mod batch;
pub mod ingestion;
pub mod processing;

pub use batch::{BatchOptions, BatchRunner, BatchSummary};
