use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tracing::{debug, info, warn};

use crate::error::Result;

/// sha256 hex digest of an image's bytes
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// State of one content hash in the index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexEntry {
    /// A worker is processing the card
    InFlight { source: String },
    /// The card's record was written
    Written { source: String, output: PathBuf },
    /// The card was processed without writing (dry run)
    Recorded { source: String },
}

impl IndexEntry {
    pub fn source(&self) -> &str {
        match self {
            IndexEntry::InFlight { source }
            | IndexEntry::Written { source, .. }
            | IndexEntry::Recorded { source } => source,
        }
    }
}

/// Result of claiming a content hash
#[derive(Debug, Clone, PartialEq)]
pub enum ClaimOutcome {
    /// First sighting; the caller owns this hash until finalize or release
    Claimed,
    /// Already seen, from `original`; `output` is its record once written
    Duplicate {
        original: String,
        output: Option<PathBuf>,
    },
}

/// Registry of image content hashes seen in this run (and, when loaded from
/// disk, earlier runs). The lookup-or-insert in `claim` is atomic.
#[derive(Debug, Default)]
pub struct DuplicateIndex {
    entries: Mutex<BTreeMap<String, IndexEntry>>,
}

impl DuplicateIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Load a saved index. A missing file yields an empty index; in-flight
    /// entries left behind by an interrupted run are dropped.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            debug!("No duplicate index at {}, starting empty", path.display());
            return Ok(Self::new());
        }
        let contents = fs::read_to_string(path)?;
        let mut entries: BTreeMap<String, IndexEntry> = serde_json::from_str(&contents)?;
        let before = entries.len();
        entries.retain(|_, entry| !matches!(entry, IndexEntry::InFlight { .. }));
        if entries.len() < before {
            warn!(
                "Dropped {} in-flight entries from {}",
                before - entries.len(),
                path.display()
            );
        }
        info!("Loaded {} known image hashes from {}", entries.len(), path.display());
        Ok(Self {
            entries: Mutex::new(entries),
        })
    }

    /// Persist finished entries atomically (temp file in the same directory,
    /// then rename)
    pub fn save(&self, path: &Path) -> Result<()> {
        let finished: BTreeMap<String, IndexEntry> = self
            .lock()
            .iter()
            .filter(|(_, entry)| !matches!(entry, IndexEntry::InFlight { .. }))
            .map(|(hash, entry)| (hash.clone(), entry.clone()))
            .collect();

        let dir = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
            _ => PathBuf::from("."),
        };
        fs::create_dir_all(&dir)?;
        let mut tmp = tempfile::NamedTempFile::new_in(&dir)?;
        tmp.write_all(serde_json::to_string_pretty(&finished)?.as_bytes())?;
        tmp.flush()?;
        tmp.persist(path).map_err(|e| e.error)?;
        debug!("Saved {} image hashes to {}", finished.len(), path.display());
        Ok(())
    }

    /// Atomically claim `hash` for `source`, or report the source that
    /// claimed it first
    pub fn claim(&self, hash: &str, source: &str) -> ClaimOutcome {
        let mut entries = self.lock();
        if let Some(existing) = entries.get(hash) {
            let output = match existing {
                IndexEntry::Written { output, .. } => Some(output.clone()),
                _ => None,
            };
            return ClaimOutcome::Duplicate {
                original: existing.source().to_string(),
                output,
            };
        }
        entries.insert(
            hash.to_string(),
            IndexEntry::InFlight {
                source: source.to_string(),
            },
        );
        ClaimOutcome::Claimed
    }

    /// Mark a claimed hash as done. `output` is `None` when nothing was written.
    pub fn finalize(&self, hash: &str, output: Option<PathBuf>) {
        let mut entries = self.lock();
        let Some(entry) = entries.get_mut(hash) else {
            warn!("Finalizing unclaimed hash {}", hash);
            return;
        };
        let source = entry.source().to_string();
        *entry = match output {
            Some(output) => IndexEntry::Written { source, output },
            None => IndexEntry::Recorded { source },
        };
    }

    /// Drop an in-flight claim so a later run can process the image again
    pub fn release(&self, hash: &str) {
        let mut entries = self.lock();
        if matches!(entries.get(hash), Some(IndexEntry::InFlight { .. })) {
            entries.remove(hash);
        }
    }

    pub fn get(&self, hash: &str) -> Option<IndexEntry> {
        self.lock().get(hash).cloned()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, IndexEntry>> {
        // entries stay consistent even if a holder panicked
        self.entries.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
