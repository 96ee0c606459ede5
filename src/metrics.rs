//! Import metrics.
//!
//! Recorded through the `metrics` facade. No exporter is installed here, so
//! these are no-ops unless the embedding process installs a recorder.

pub const CARDS_TOTAL: &str = "porter_cards_total";
pub const OCR_ATTEMPTS_TOTAL: &str = "porter_ocr_attempts_total";
pub const EFFECTS_DERIVED_TOTAL: &str = "porter_effects_derived_total";
pub const CARD_DURATION_SECONDS: &str = "porter_card_duration_seconds";

/// Metrics for the card import pipeline
pub struct ImportMetrics;

impl ImportMetrics {
    /// Record one finished card. `outcome` is a quality decision, `duplicate`,
    /// `failed` or `interrupted`.
    pub fn record_card(outcome: &'static str, duration_secs: Option<f64>) {
        ::metrics::counter!(CARDS_TOTAL, "outcome" => outcome).increment(1);
        if let Some(secs) = duration_secs {
            ::metrics::histogram!(CARD_DURATION_SECONDS).record(secs);
        }
    }

    pub fn record_ocr_attempts(attempts: u32) {
        ::metrics::counter!(OCR_ATTEMPTS_TOTAL).increment(attempts as u64);
    }

    pub fn record_effects_derived(count: usize) {
        ::metrics::counter!(EFFECTS_DERIVED_TOTAL).increment(count as u64);
    }

    /// Pre-register so the series exist before first use
    pub fn register_metrics() {
        use metrics::{counter, histogram};

        let _ = counter!(OCR_ATTEMPTS_TOTAL);
        let _ = counter!(EFFECTS_DERIVED_TOTAL);
        let _ = histogram!(CARD_DURATION_SECONDS);
    }
}
