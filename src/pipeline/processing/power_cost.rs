use once_cell::sync::Lazy;
use regex::Regex;
use tracing::{debug, warn};

use super::canonical;
use crate::types::{Diagnostics, Domain, IssueKind, PowerCostItem};

/// Free-text cost tokens: "2 Fury", "Fury 2" or a bare "fury"
static COST_TEXT_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)(\d+)\s*([a-z][a-z_-]*)|([a-z][a-z_-]*)\s*(\d+)|([a-z][a-z_-]*)")
        .expect("cost token regex")
});

/// Words that show up in cost descriptions without naming a domain
const COST_FILLER_WORDS: &[&str] = &["and", "or", "plus", "power", "cost", "icon", "icons"];

/// Output of a power-cost resolution
#[derive(Debug, Clone, Default)]
pub struct PowerCostResolution {
    pub items: Vec<PowerCostItem>,
    pub diagnostics: Diagnostics,
}

/// Turns detected power icons (or a free-text cost) into an ordered,
/// domain-unique list of `{domain, amount}` items.
pub struct PowerCostResolver;

impl PowerCostResolver {
    /// Resolve icon tokens in their left-to-right order. The free-text
    /// description is only consulted when no icon tokens were detected.
    pub fn resolve(icons: &[String], text: Option<&str>) -> PowerCostResolution {
        let mut diagnostics = Diagnostics::new();

        let entries: Vec<(Domain, u32)> = if !icons.is_empty() {
            icons
                .iter()
                .filter_map(|token| match canonical::resolve_icon(token) {
                    Some(domain) => Some((domain, 1)),
                    None => {
                        warn!("Dropping unmapped power icon {:?}", token);
                        diagnostics.unmapped("power", token);
                        diagnostics.warn(
                            IssueKind::UnmappedToken,
                            Some("power"),
                            format!("power icon {token:?} does not map to a domain"),
                        );
                        None
                    }
                })
                .collect()
        } else if let Some(text) = text.filter(|t| !t.trim().is_empty()) {
            Self::entries_from_text(text, &mut diagnostics)
        } else {
            Vec::new()
        };

        let items = Self::accumulate(entries);
        debug!("Resolved power cost {:?}", items);
        PowerCostResolution { items, diagnostics }
    }

    /// Sum amounts per domain, keeping each domain at its first-seen position
    pub fn accumulate(entries: impl IntoIterator<Item = (Domain, u32)>) -> Vec<PowerCostItem> {
        let mut items: Vec<PowerCostItem> = Vec::new();
        for (domain, amount) in entries {
            if amount == 0 {
                continue;
            }
            match items.iter_mut().find(|item| item.domain == domain) {
                Some(existing) => existing.amount += amount,
                None => items.push(PowerCostItem { domain, amount }),
            }
        }
        items
    }

    fn entries_from_text(text: &str, diagnostics: &mut Diagnostics) -> Vec<(Domain, u32)> {
        let mut entries = Vec::new();
        for caps in COST_TEXT_TOKEN.captures_iter(text) {
            let (word, count) = if let (Some(n), Some(w)) = (caps.get(1), caps.get(2)) {
                (w.as_str(), n.as_str().parse::<u32>().ok())
            } else if let (Some(w), Some(n)) = (caps.get(3), caps.get(4)) {
                (w.as_str(), n.as_str().parse::<u32>().ok())
            } else if let Some(w) = caps.get(5) {
                (w.as_str(), Some(1))
            } else {
                continue;
            };

            if COST_FILLER_WORDS.contains(&word.to_lowercase().as_str()) {
                continue;
            }

            match (canonical::resolve_icon(word), count) {
                (Some(domain), Some(amount)) if amount > 0 => entries.push((domain, amount)),
                (Some(domain), _) => {
                    diagnostics.warn(
                        IssueKind::OutOfRange,
                        Some("power"),
                        format!("ignoring non-positive {domain} amount in cost text {text:?}"),
                    );
                }
                (None, _) => {
                    diagnostics.unmapped("power", word);
                    diagnostics.warn(
                        IssueKind::UnmappedToken,
                        Some("power"),
                        format!("cost text token {word:?} does not map to a domain"),
                    );
                }
            }
        }
        entries
    }
}
