use async_trait::async_trait;
use std::collections::HashSet;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{debug, warn};

use crate::app::ports::CardOutputPort;
use crate::constants::FALLBACK_FILE_STEM;
use crate::error::{PorterError, Result};
use crate::types::CardSpec;

/// Turn a card name into a safe file stem: alphanumerics, space, `-` and `_`
/// survive, whitespace runs become `_`.
pub fn clean_filename(name: &str) -> String {
    let kept: String = name
        .chars()
        .filter(|c| c.is_alphanumeric() || matches!(c, ' ' | '-' | '_'))
        .collect();
    let joined = kept.split_whitespace().collect::<Vec<_>>().join("_");
    if joined.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        joined
    }
}

/// Writes one pretty-printed JSON document per card into `out_dir`.
///
/// Each write goes to a temp file in the same directory and is renamed into
/// place, so a crash never leaves a partial record behind.
#[derive(Debug)]
pub struct JsonCardWriter {
    out_dir: PathBuf,
    used_stems: Mutex<HashSet<String>>,
}

impl JsonCardWriter {
    /// Create the output directory if needed. Failure here stops the batch.
    pub fn new(out_dir: impl Into<PathBuf>) -> Result<Self> {
        let out_dir = out_dir.into();
        std::fs::create_dir_all(&out_dir).map_err(|e| {
            PorterError::Config(format!("output directory {} is not writable: {}", out_dir.display(), e))
        })?;
        Ok(Self {
            out_dir,
            used_stems: Mutex::new(HashSet::new()),
        })
    }

    pub fn out_dir(&self) -> &Path {
        &self.out_dir
    }

    /// Reserve a file stem for this run. A stem already used in this run gets
    /// the first 8 hex digits of the image hash appended.
    fn reserve_stem(&self, card: &CardSpec) -> String {
        let base = clean_filename(&card.name);
        let mut used = self.used_stems.lock().unwrap_or_else(|p| p.into_inner());
        if used.insert(base.clone()) {
            return base;
        }

        let suffix: String = card
            .image_hash
            .as_deref()
            .map(|h| h.chars().take(8).collect())
            .unwrap_or_default();
        let mut stem = if suffix.is_empty() {
            base.clone()
        } else {
            format!("{base}_{suffix}")
        };
        let mut counter = 2;
        while !used.insert(stem.clone()) {
            stem = format!("{base}_{counter}");
            counter += 1;
        }
        warn!("File name {} already used in this run, writing {}", base, stem);
        stem
    }
}

#[async_trait]
impl CardOutputPort for JsonCardWriter {
    async fn write_card(&self, card: &CardSpec) -> Result<PathBuf> {
        let stem = self.reserve_stem(card);
        let target = self.out_dir.join(format!("{stem}.json"));
        let payload = serde_json::to_string_pretty(card)?;
        let dir = self.out_dir.clone();

        let written = tokio::task::spawn_blocking(move || -> Result<PathBuf> {
            let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
            tmp.write_all(payload.as_bytes())?;
            tmp.write_all(b"\n")?;
            tmp.as_file().sync_all()?;
            tmp.persist(&target).map_err(|e| e.error)?;
            Ok(target)
        })
        .await
        .map_err(|e| PorterError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))??;

        debug!("Wrote {}", written.display());
        Ok(written)
    }
}
