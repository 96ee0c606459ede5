use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::app::ports::{CardOutputPort, ImageInput, OcrPort};
use crate::error::Result;
use crate::metrics::ImportMetrics;
use crate::pipeline::processing::effects::EffectParser;
use crate::pipeline::processing::normalize::{FieldNormalizer, Normalizer};
use crate::pipeline::processing::parser::{ExtractionParser, TolerantParser};
use crate::pipeline::processing::quality_gate::{
    CardCandidate, DefaultQualityGate, QualityDecision, QualityGate,
};
use crate::types::{CardSpec, NormalizedCard, RawExtractionRecord};

/// Everything produced for one image
#[derive(Debug, Clone)]
pub struct ProcessedCard {
    pub card: CardSpec,
    pub decision: QualityDecision,
    /// Where the record was written; `None` on a dry run
    pub output: Option<PathBuf>,
    /// Intermediate stages, kept for debug samples
    pub raw: Option<RawExtractionRecord>,
    pub normalized: Option<NormalizedCard>,
    pub extraction_failed: bool,
}

/// A card that went through every stage but the write
#[derive(Debug)]
pub struct PreparedCard {
    processed: ProcessedCard,
    source: String,
    started: Instant,
}

impl PreparedCard {
    pub fn card(&self) -> &CardSpec {
        &self.processed.card
    }
}

/// Use case turning one card image into one written record:
/// OCR, decode, normalize, derive effects, validate, write
pub struct ImportCardUseCase {
    ocr: Arc<dyn OcrPort>,
    output: Arc<dyn CardOutputPort>,
    normalizer: Box<dyn Normalizer + Send + Sync>,
    parser: Box<dyn ExtractionParser + Send + Sync>,
    effects: EffectParser,
    gate: Box<dyn QualityGate + Send + Sync>,
    dry_run: bool,
}

impl ImportCardUseCase {
    pub fn new(ocr: Arc<dyn OcrPort>, output: Arc<dyn CardOutputPort>, dry_run: bool) -> Self {
        Self {
            ocr,
            output,
            normalizer: Box::new(FieldNormalizer),
            parser: Box::new(TolerantParser),
            effects: EffectParser::new(),
            gate: Box::new(DefaultQualityGate::new()),
            dry_run,
        }
    }

    pub fn with_effect_parser(mut self, effects: EffectParser) -> Self {
        self.effects = effects;
        self
    }

    pub fn ocr_name(&self) -> &'static str {
        self.ocr.name()
    }

    /// Process one image. Extraction problems never fail this call; only a
    /// failed write does.
    pub async fn process(&self, image: &ImageInput, image_hash: &str) -> Result<ProcessedCard> {
        let prepared = self.prepare(image, image_hash).await;
        self.commit(prepared).await
    }

    /// Everything up to the write. Safe to drop at any await point.
    #[instrument(skip(self, image, image_hash), fields(image = %image.display_name()))]
    pub async fn prepare(&self, image: &ImageInput, image_hash: &str) -> PreparedCard {
        let started = Instant::now();
        let source_stem = image.stem();

        let (mut candidate, raw, normalized) = match self.ocr.extract(image).await {
            Ok(response) => {
                ImportMetrics::record_ocr_attempts(response.attempts);
                let raw = self.parser.parse(&response.data);
                let normalized = self.normalizer.normalize(&raw);
                let derived = self.effects.parse(&normalized.card);
                ImportMetrics::record_effects_derived(derived.effects.len());

                let mut diagnostics = normalized.diagnostics;
                diagnostics.extend(derived.diagnostics);

                let candidate = CardCandidate {
                    card: CardSpec::assemble(normalized.card.clone(), derived.effects),
                    diagnostics,
                    raw_rules_text: raw.rules_text.clone(),
                    has_rules_gaps: !derived.gaps.is_empty(),
                    raw_data: Some(response.data),
                    source_stem,
                };
                (candidate, Some(raw), Some(normalized.card))
            }
            Err(e) => {
                warn!("Extraction failed for {}: {}", image.display_name(), e);
                let candidate = DefaultQualityGate::failed_extraction(
                    &source_stem,
                    &e.to_string(),
                    e.raw_text().map(str::to_string),
                );
                (candidate, None, None)
            }
        };
        let extraction_failed = raw.is_none();

        candidate.card.image_hash = Some(image_hash.to_string());
        let assessed = self.gate.assess(candidate);
        debug!(
            "Card {:?} assessed as {:?} with {} effects",
            assessed.card.name,
            assessed.decision,
            assessed.card.effects.len()
        );

        PreparedCard {
            processed: ProcessedCard {
                card: assessed.card,
                decision: assessed.decision,
                output: None,
                raw,
                normalized,
                extraction_failed,
            },
            source: image.display_name(),
            started,
        }
    }

    /// Write the prepared record unless this is a dry run. Once started the
    /// write runs to completion, so callers must not race it against
    /// cancellation.
    #[instrument(skip(self, prepared), fields(image = %prepared.source))]
    pub async fn commit(&self, prepared: PreparedCard) -> Result<ProcessedCard> {
        let PreparedCard {
            mut processed,
            source,
            started,
        } = prepared;

        if !self.dry_run {
            let path = self.output.write_card(&processed.card).await?;
            info!("Saved {} -> {}", source, path.display());
            processed.output = Some(path);
        }

        ImportMetrics::record_card(
            processed.decision.as_str(),
            Some(started.elapsed().as_secs_f64()),
        );
        Ok(processed)
    }
}
