use chrono::{DateTime, Utc};
use serde::Serialize;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{watch, Semaphore};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::app::import_use_case::{ImportCardUseCase, ProcessedCard};
use crate::app::ports::ImageInput;
use crate::constants::is_supported_extension;
use crate::error::{PorterError, Result};
use crate::metrics::ImportMetrics;
use crate::pipeline::ingestion::duplicate_index::{content_hash, ClaimOutcome, DuplicateIndex};

#[derive(Debug, Clone)]
pub struct BatchOptions {
    /// Concurrent card tasks
    pub workers: usize,
    /// Print the intermediate stages of the first N processed cards
    pub debug_samples: usize,
    /// Print each final record to stdout
    pub print_json: bool,
    /// Where the duplicate index is persisted after the run
    pub index_path: Option<PathBuf>,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            debug_samples: 0,
            print_json: false,
            index_path: None,
        }
    }
}

/// Counts reported at the end of a batch
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BatchSummary {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub processed: usize,
    pub clean: usize,
    pub with_diagnostics: usize,
    pub duplicates: usize,
    pub failed: usize,
    pub interrupted: usize,
}

impl BatchSummary {
    pub fn print(&self) {
        println!("\n📊 Import summary (run {}):", self.run_id);
        println!(
            "   Duration: {:.1}s",
            (self.finished_at - self.started_at).num_milliseconds() as f64 / 1000.0
        );
        println!("   Total images: {}", self.total);
        println!("   Processed: {}", self.processed);
        println!("   Clean: {}", self.clean);
        println!("   With diagnostics: {}", self.with_diagnostics);
        println!("   Duplicates skipped: {}", self.duplicates);
        println!("   Failed: {}", self.failed);
        if self.interrupted > 0 {
            println!("   ⚠️  Interrupted: {}", self.interrupted);
        }
    }
}

/// Images to import: a single supported file, or every supported file in a
/// directory in sorted order
pub fn collect_images(target: &Path) -> Result<Vec<PathBuf>> {
    if !target.exists() {
        return Err(PorterError::Input(format!("Path not found: {}", target.display())));
    }

    let has_supported_ext = |p: &Path| {
        p.extension()
            .and_then(|e| e.to_str())
            .map(is_supported_extension)
            .unwrap_or(false)
    };

    if target.is_dir() {
        let mut images = Vec::new();
        for entry in std::fs::read_dir(target)? {
            let path = entry?.path();
            if path.is_file() && has_supported_ext(&path) {
                images.push(path);
            }
        }
        if images.is_empty() {
            return Err(PorterError::Input(format!(
                "No supported image files found in {}",
                target.display()
            )));
        }
        images.sort();
        return Ok(images);
    }

    if !has_supported_ext(target) {
        return Err(PorterError::Input(format!(
            "Unsupported file type: {}",
            target.display()
        )));
    }
    Ok(vec![target.to_path_buf()])
}

/// Keep at most `limit` images from the sorted list
pub fn limit_images(mut images: Vec<PathBuf>, limit: Option<usize>) -> Vec<PathBuf> {
    if let Some(limit) = limit {
        if images.len() > limit {
            info!("Limiting run to the first {} of {} images", limit, images.len());
            images.truncate(limit);
        }
    }
    images
}

enum CardOutcome {
    Done(Box<ProcessedCard>),
    Failed(String),
    Interrupted,
}

/// Runs the per-card use case over a list of images with a bounded worker
/// pool. Duplicate claims happen here, in input order, before a task is
/// spawned.
pub struct BatchRunner {
    use_case: Arc<ImportCardUseCase>,
    index: Arc<DuplicateIndex>,
    options: BatchOptions,
}

impl BatchRunner {
    pub fn new(use_case: ImportCardUseCase, index: DuplicateIndex, options: BatchOptions) -> Self {
        Self {
            use_case: Arc::new(use_case),
            index: Arc::new(index),
            options,
        }
    }

    pub fn index(&self) -> &DuplicateIndex {
        &self.index
    }

    /// Run until done or until Ctrl-C
    pub async fn run_until_interrupted(&self, images: Vec<PathBuf>) -> Result<BatchSummary> {
        let (tx, rx) = watch::channel(false);
        let listener = tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupt received, stopping after in-flight cards are released");
                let _ = tx.send(true);
            }
        });
        let summary = self.run(images, rx).await;
        listener.abort();
        summary
    }

    /// Run the batch. Flipping `cancel` to true stops new claims; in-flight
    /// cards release their claim and write nothing.
    pub async fn run(&self, images: Vec<PathBuf>, cancel: watch::Receiver<bool>) -> Result<BatchSummary> {
        let run_id = Uuid::new_v4().to_string();
        let workers = self.options.workers.max(1);
        info!(
            "Starting import run {} over {} images with {} workers (ocr: {})",
            run_id,
            images.len(),
            workers,
            self.use_case.ocr_name()
        );

        let mut summary = BatchSummary {
            run_id,
            started_at: Utc::now(),
            total: images.len(),
            ..BatchSummary::default()
        };
        let semaphore = Arc::new(Semaphore::new(workers));
        let mut handles = Vec::new();
        let mut dispatcher_cancel = cancel.clone();

        for (position, path) in images.iter().enumerate() {
            let permit = tokio::select! {
                biased;
                _ = cancelled(&mut dispatcher_cancel) => None,
                permit = semaphore.clone().acquire_owned() => permit.ok(),
            };
            let Some(permit) = permit else {
                let remaining = images.len() - position;
                warn!("Not starting {} remaining images", remaining);
                summary.interrupted += remaining;
                for _ in 0..remaining {
                    ImportMetrics::record_card("interrupted", None);
                }
                break;
            };

            let bytes = match tokio::fs::read(path).await {
                Ok(bytes) => bytes,
                Err(e) => {
                    error!("Failed to read {}: {}", path.display(), e);
                    summary.failed += 1;
                    ImportMetrics::record_card("failed", None);
                    continue;
                }
            };
            let hash = content_hash(&bytes);
            let image = ImageInput::new(path.clone(), bytes);

            if let ClaimOutcome::Duplicate { original, output } =
                self.index.claim(&hash, &image.display_name())
            {
                match output {
                    Some(output) => info!(
                        "Skipping {}: same image as {}, already written to {}",
                        image.display_name(),
                        original,
                        output.display()
                    ),
                    None => info!("Skipping {}: same image as {}", image.display_name(), original),
                }
                summary.duplicates += 1;
                ImportMetrics::record_card("duplicate", None);
                continue;
            }

            let use_case = self.use_case.clone();
            let index = self.index.clone();
            let mut task_cancel = cancel.clone();
            handles.push(tokio::spawn(async move {
                let _permit = permit;
                let outcome = tokio::select! {
                    biased;
                    _ = cancelled(&mut task_cancel) => CardOutcome::Interrupted,
                    // the write happens outside the race, so an interrupt
                    // never lands between a persisted record and its claim
                    prepared = use_case.prepare(&image, &hash) => match use_case.commit(prepared).await {
                        Ok(processed) => CardOutcome::Done(Box::new(processed)),
                        Err(e) => CardOutcome::Failed(e.to_string()),
                    },
                };
                match &outcome {
                    CardOutcome::Done(processed) => index.finalize(&hash, processed.output.clone()),
                    CardOutcome::Failed(_) | CardOutcome::Interrupted => index.release(&hash),
                }
                (image.path, outcome)
            }));
        }

        let mut samples_shown = 0;
        for handle in handles {
            let (path, outcome) = match handle.await {
                Ok(finished) => finished,
                Err(e) => {
                    error!("Card task panicked: {}", e);
                    summary.failed += 1;
                    continue;
                }
            };
            match outcome {
                CardOutcome::Done(processed) => {
                    summary.processed += 1;
                    if processed.card.diagnostics.is_some() {
                        summary.with_diagnostics += 1;
                    } else {
                        summary.clean += 1;
                    }
                    let sampled = samples_shown < self.options.debug_samples && !processed.extraction_failed;
                    if sampled {
                        samples_shown += 1;
                        print!("{}", render_debug_sample(samples_shown, &path, &processed));
                    }
                    // a sample already ends with the final record
                    if !sampled && (self.options.print_json || processed.output.is_none()) {
                        match serde_json::to_string_pretty(&processed.card) {
                            Ok(json) => println!("{}", json),
                            Err(e) => warn!("Could not render {}: {}", path.display(), e),
                        }
                    }
                }
                CardOutcome::Failed(message) => {
                    error!("Failed to write record for {}: {}", path.display(), message);
                    summary.failed += 1;
                    ImportMetrics::record_card("failed", None);
                }
                CardOutcome::Interrupted => {
                    warn!("Interrupted while processing {}", path.display());
                    summary.interrupted += 1;
                    ImportMetrics::record_card("interrupted", None);
                }
            }
        }

        if let Some(index_path) = &self.options.index_path {
            self.index.save(index_path)?;
        }
        summary.finished_at = Utc::now();

        info!(
            run_id = %summary.run_id,
            total = summary.total,
            processed = summary.processed,
            clean = summary.clean,
            with_diagnostics = summary.with_diagnostics,
            duplicates = summary.duplicates,
            failed = summary.failed,
            interrupted = summary.interrupted,
            "Import run finished"
        );
        Ok(summary)
    }
}

/// Resolves once the flag is true. A dropped sender never cancels.
async fn cancelled(rx: &mut watch::Receiver<bool>) {
    loop {
        if *rx.borrow_and_update() {
            return;
        }
        if rx.changed().await.is_err() {
            std::future::pending::<()>().await;
        }
    }
}

/// Every stage of one card: raw extraction, normalized card, decision and
/// the final record
fn render_debug_sample(n: usize, path: &Path, processed: &ProcessedCard) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "\n🔎 Debug sample {}: {}", n, path.display());
    if let Some(raw) = &processed.raw {
        let _ = writeln!(out, "--- raw extraction ---");
        let _ = writeln!(out, "{}", serde_json::to_string_pretty(raw).unwrap_or_default());
    }
    if let Some(normalized) = &processed.normalized {
        let _ = writeln!(out, "--- normalized ---");
        let _ = writeln!(out, "{}", serde_json::to_string_pretty(normalized).unwrap_or_default());
    }
    let _ = writeln!(out, "--- decision: {} ---", processed.decision.as_str());
    let _ = writeln!(out, "--- final record ---");
    let _ = writeln!(
        out,
        "{}",
        serde_json::to_string_pretty(&processed.card).unwrap_or_default()
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::app::ports::{CardOutputPort, OcrPort, OcrResponse};
    use crate::error::ExtractionError;
    use crate::pipeline::ingestion::duplicate_index::IndexEntry;
    use crate::pipeline::processing::quality_gate::QualityDecision;
    use crate::types::{CardSpec, NormalizedCard, RawExtractionRecord};
    use async_trait::async_trait;
    use serde_json::json;
    use std::fs;
    use tokio::sync::Notify;
    use tempfile::tempdir;

    #[test]
    fn test_collect_images_sorted_and_filtered() {
        let dir = tempdir().unwrap();
        for name in ["b.png", "a.JPG", "notes.txt", "c.webp", "a.png.json"] {
            fs::write(dir.path().join(name), b"x").unwrap();
        }
        let images = collect_images(dir.path()).unwrap();
        let names: Vec<_> = images
            .iter()
            .map(|p| p.file_name().unwrap().to_str().unwrap().to_string())
            .collect();
        assert_eq!(names, vec!["a.JPG", "b.png", "c.webp"]);
    }

    #[test]
    fn test_collect_images_errors() {
        let dir = tempdir().unwrap();
        assert!(matches!(collect_images(dir.path()), Err(PorterError::Input(_))));
        assert!(matches!(
            collect_images(&dir.path().join("missing.png")),
            Err(PorterError::Input(_))
        ));

        let text = dir.path().join("card.txt");
        fs::write(&text, b"x").unwrap();
        assert!(matches!(collect_images(&text), Err(PorterError::Input(_))));

        let single = dir.path().join("card.jpeg");
        fs::write(&single, b"x").unwrap();
        assert_eq!(collect_images(&single).unwrap(), vec![single]);
    }

    struct JsonOcr;

    #[async_trait]
    impl OcrPort for JsonOcr {
        async fn extract(&self, _image: &ImageInput) -> std::result::Result<OcrResponse, ExtractionError> {
            let data = json!({"name": "Bolt", "type": "Spell", "energy": 1});
            Ok(OcrResponse {
                raw_text: data.to_string(),
                data,
                attempts: 1,
            })
        }

        fn name(&self) -> &'static str {
            "json"
        }
    }

    /// Signals when a write starts, then takes a while to finish
    struct SlowOutput {
        started: Arc<Notify>,
    }

    #[async_trait]
    impl CardOutputPort for SlowOutput {
        async fn write_card(&self, card: &CardSpec) -> Result<PathBuf> {
            self.started.notify_one();
            tokio::time::sleep(std::time::Duration::from_millis(50)).await;
            Ok(PathBuf::from(format!("out/{}.json", card.name)))
        }
    }

    #[tokio::test]
    async fn test_interrupt_during_write_keeps_the_record() {
        let dir = tempdir().unwrap();
        let image = dir.path().join("bolt.png");
        fs::write(&image, b"bolt").unwrap();

        let started = Arc::new(Notify::new());
        let use_case = ImportCardUseCase::new(
            Arc::new(JsonOcr),
            Arc::new(SlowOutput {
                started: started.clone(),
            }),
            false,
        );
        let runner = BatchRunner::new(use_case, DuplicateIndex::new(), BatchOptions::default());

        let (tx, rx) = watch::channel(false);
        let (summary, _) = tokio::join!(runner.run(vec![image], rx), async {
            started.notified().await;
            tx.send(true).unwrap();
        });
        let summary = summary.unwrap();

        assert_eq!(summary.processed, 1);
        assert_eq!(summary.interrupted, 0);
        assert!(matches!(
            runner.index().get(&content_hash(b"bolt")),
            Some(IndexEntry::Written { .. })
        ));
    }

    #[test]
    fn test_limit_images_keeps_sorted_prefix() {
        let images: Vec<PathBuf> = ["a.png", "b.png", "c.png"].iter().map(PathBuf::from).collect();
        assert_eq!(
            limit_images(images.clone(), Some(2)),
            vec![PathBuf::from("a.png"), PathBuf::from("b.png")]
        );
        assert_eq!(limit_images(images.clone(), Some(10)), images);
        assert_eq!(limit_images(images.clone(), None), images);
        assert!(limit_images(images, Some(0)).is_empty());
    }

    #[test]
    fn test_debug_sample_includes_final_record() {
        let normalized = NormalizedCard {
            name: "Bolt".to_string(),
            ..NormalizedCard::default()
        };
        let processed = ProcessedCard {
            card: CardSpec::assemble(normalized.clone(), Vec::new()),
            decision: QualityDecision::Accept,
            output: Some(PathBuf::from("out/Bolt.json")),
            raw: Some(RawExtractionRecord {
                name: Some("Bolt".to_string()),
                ..RawExtractionRecord::default()
            }),
            normalized: Some(normalized),
            extraction_failed: false,
        };

        let sample = render_debug_sample(1, Path::new("cards/bolt.png"), &processed);
        assert!(sample.contains("Debug sample 1: cards/bolt.png"));
        let stages: Vec<usize> = ["--- raw extraction ---", "--- normalized ---", "--- decision: accept ---", "--- final record ---"]
            .iter()
            .map(|marker| sample.find(marker).expect(marker))
            .collect();
        assert!(stages.windows(2).all(|w| w[0] < w[1]));

        let final_json = &sample[stages[3]..];
        assert!(final_json.contains("\"schema_version\""));
        assert!(final_json.contains("\"name\": \"Bolt\""));
    }

    #[tokio::test]
    async fn test_cancelled_resolves_on_flag() {
        let (tx, mut rx) = watch::channel(false);
        tx.send(true).unwrap();
        tokio::time::timeout(std::time::Duration::from_secs(1), cancelled(&mut rx))
            .await
            .unwrap();
    }
}
