pub mod schema;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::constants::{FALLBACK_FILE_STEM, SCHEMA_VERSION};
use crate::pipeline::processing::power_cost::PowerCostResolver;
use crate::types::{CardSpec, Category, Diagnostics, IssueKind, Severity};

/// A card that passed through the quality gate, ready to be written
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QualityAssessedCard {
    pub card: CardSpec,
    pub decision: QualityDecision,
}

/// Quality gate decision for a card. Every decision still emits the record.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum QualityDecision {
    /// No warnings or worse
    Accept,
    /// Defaults or repairs were applied
    AcceptWithWarnings,
    /// A required field is missing or the record broke the schema
    Flagged,
}

impl QualityDecision {
    pub fn as_str(self) -> &'static str {
        match self {
            QualityDecision::Accept => "accept",
            QualityDecision::AcceptWithWarnings => "accept_with_warnings",
            QualityDecision::Flagged => "flagged",
        }
    }

    fn from_severity(severity: Option<Severity>) -> Self {
        match severity {
            None | Some(Severity::Info) => QualityDecision::Accept,
            Some(Severity::Warning) => QualityDecision::AcceptWithWarnings,
            Some(Severity::Error) | Some(Severity::Critical) => QualityDecision::Flagged,
        }
    }
}

/// Everything the gate needs to judge one card
#[derive(Debug, Clone)]
pub struct CardCandidate {
    pub card: CardSpec,
    pub diagnostics: Diagnostics,
    /// Rules text exactly as extracted, before whitespace cleanup
    pub raw_rules_text: Option<String>,
    /// Whether the effect parser left part of the rules text unaccounted for
    pub has_rules_gaps: bool,
    /// Original extraction payload
    pub raw_data: Option<Value>,
    /// Image file stem, used to repair a missing name
    pub source_stem: String,
}

/// Trait for the final validation and recovery pass
pub trait QualityGate {
    fn assess(&self, candidate: CardCandidate) -> QualityAssessedCard;
}

/// Configuration for the default gate
#[derive(Debug, Clone)]
pub struct QualityGateConfig {
    /// Validate the serialized record against the published JSON schema
    pub check_schema: bool,
}

impl Default for QualityGateConfig {
    fn default() -> Self {
        Self { check_schema: true }
    }
}

/// Default gate: bounded repairs, schema check, then a severity-based decision
#[derive(Debug, Clone, Default)]
pub struct DefaultQualityGate {
    pub config: QualityGateConfig,
}

impl DefaultQualityGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: QualityGateConfig) -> Self {
        Self { config }
    }

    /// Candidate for an image whose extraction failed outright
    pub fn failed_extraction(source_stem: &str, message: &str, raw_text: Option<String>) -> CardCandidate {
        let mut diagnostics = Diagnostics::new();
        diagnostics.push(
            IssueKind::ExtractionFailed,
            Severity::Critical,
            None,
            format!("extraction failed: {message}"),
        );
        CardCandidate {
            card: CardSpec::empty(String::new()),
            diagnostics,
            raw_rules_text: None,
            has_rules_gaps: false,
            raw_data: Some(Value::String(raw_text.unwrap_or_else(|| message.to_string()))),
            source_stem: source_stem.to_string(),
        }
    }

    fn repair(&self, card: &mut CardSpec, source_stem: &str, diagnostics: &mut Diagnostics) {
        if card.name.trim().is_empty() {
            card.name = name_from_stem(source_stem);
            diagnostics.warn(
                IssueKind::Repaired,
                Some("name"),
                format!("name repaired from file name as {:?}", card.name),
            );
        }

        if card.category.is_none() {
            let already_reported = diagnostics
                .issues
                .iter()
                .any(|i| i.field.as_deref() == Some("category") && i.severity >= Severity::Error);
            if !already_reported {
                diagnostics.error(IssueKind::MissingData, Some("category"), "category could not be determined");
            }
        }

        let repaired_power = PowerCostResolver::accumulate(card.power.iter().map(|item| (item.domain, item.amount)));
        if repaired_power != card.power {
            diagnostics.warn(
                IssueKind::Repaired,
                Some("power"),
                "zero amounts dropped and repeated domains merged",
            );
            card.power = repaired_power;
        }

        if card.schema_version != SCHEMA_VERSION {
            diagnostics.warn(
                IssueKind::Repaired,
                Some("schema_version"),
                format!("schema_version {} reset to {}", card.schema_version, SCHEMA_VERSION),
            );
            card.schema_version = SCHEMA_VERSION;
        }

        if card.might.is_some() && card.category.is_some_and(|c| c != Category::Unit) {
            card.might = None;
            diagnostics.warn(IssueKind::Repaired, Some("might"), "might cleared on a non-unit card");
        }
    }

    fn check_schema(&self, card: &CardSpec, diagnostics: &mut Diagnostics) {
        let instance = match serde_json::to_value(card) {
            Ok(value) => value,
            Err(e) => {
                diagnostics.error(IssueKind::SchemaViolation, None, format!("record does not serialize: {e}"));
                return;
            }
        };
        for violation in schema::schema_violations(&instance) {
            warn!("Card {:?} violates the schema: {}", card.name, violation);
            diagnostics.error(IssueKind::SchemaViolation, None, violation);
        }
    }
}

impl QualityGate for DefaultQualityGate {
    fn assess(&self, candidate: CardCandidate) -> QualityAssessedCard {
        let CardCandidate {
            mut card,
            mut diagnostics,
            raw_rules_text,
            has_rules_gaps,
            raw_data,
            source_stem,
        } = candidate;

        self.repair(&mut card, &source_stem, &mut diagnostics);
        if self.config.check_schema {
            self.check_schema(&card, &mut diagnostics);
        }

        let decision = QualityDecision::from_severity(diagnostics.max_severity());
        let flagged = decision == QualityDecision::Flagged;

        card.diagnostics = None;
        card.raw_rules_text = None;
        card.raw_data = None;

        if has_rules_gaps || flagged {
            card.raw_rules_text = raw_rules_text
                .filter(|t| !t.trim().is_empty())
                .or_else(|| Some(card.rules_text.clone()).filter(|t| !t.is_empty()));
        }
        if flagged {
            card.raw_data = raw_data;
        }
        if decision != QualityDecision::Accept || has_rules_gaps {
            card.diagnostics = Some(diagnostics);
        } else if !diagnostics.unmapped_tokens.is_empty() {
            debug!("Unmapped tokens on {:?}: {:?}", card.name, diagnostics.unmapped_tokens);
        }

        debug!("Quality gate decision for {:?}: {:?}", card.name, decision);
        QualityAssessedCard { card, decision }
    }
}

/// Human-readable name from an image file stem: separators become spaces and
/// each word is title-cased. Falls back to "card".
pub fn name_from_stem(stem: &str) -> String {
    let words: Vec<String> = stem
        .split(|c: char| c == '_' || c == '-' || c.is_whitespace())
        .filter(|w| !w.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_uppercase().chain(chars.flat_map(char::to_lowercase)).collect(),
                None => String::new(),
            }
        })
        .collect();
    if words.is_empty() {
        FALLBACK_FILE_STEM.to_string()
    } else {
        words.join(" ")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Domain, EffectName, EffectRecord, PowerCostItem};

    fn candidate(card: CardSpec) -> CardCandidate {
        CardCandidate {
            card,
            diagnostics: Diagnostics::new(),
            raw_rules_text: None,
            has_rules_gaps: false,
            raw_data: Some(serde_json::json!({"name": "raw"})),
            source_stem: "jinx_loose-cannon".to_string(),
        }
    }

    fn good_card() -> CardSpec {
        let mut card = CardSpec::empty("Jinx".to_string());
        card.category = Some(Category::Unit);
        card.energy = 3;
        card.might = Some(3);
        card.power = vec![PowerCostItem { domain: Domain::Chaos, amount: 1 }];
        card.effects = vec![EffectRecord::new(EffectName::Tank)];
        card
    }

    #[test]
    fn test_clean_card_is_accepted_without_diagnostics() {
        let assessed = DefaultQualityGate::new().assess(candidate(good_card()));
        assert_eq!(assessed.decision, QualityDecision::Accept);
        assert!(assessed.card.diagnostics.is_none());
        assert!(assessed.card.raw_data.is_none());
    }

    #[test]
    fn test_missing_name_repaired_from_stem() {
        let mut card = good_card();
        card.name = String::new();
        let assessed = DefaultQualityGate::new().assess(candidate(card));
        assert_eq!(assessed.card.name, "Jinx Loose Cannon");
        assert_eq!(assessed.decision, QualityDecision::AcceptWithWarnings);
        let diagnostics = assessed.card.diagnostics.expect("diagnostics attached");
        assert!(diagnostics.has_kind(IssueKind::Repaired));
    }

    #[test]
    fn test_null_category_is_flagged_with_raw_data() {
        let mut card = good_card();
        card.category = None;
        card.rules_text = "Something odd.".to_string();
        let assessed = DefaultQualityGate::new().assess(candidate(card));
        assert_eq!(assessed.decision, QualityDecision::Flagged);
        assert!(assessed.card.raw_data.is_some());
        assert_eq!(assessed.card.raw_rules_text.as_deref(), Some("Something odd."));
        let value = serde_json::to_value(&assessed.card).unwrap();
        assert!(value.get("category").unwrap().is_null());
    }

    #[test]
    fn test_power_repairs() {
        let mut card = good_card();
        card.power = vec![
            PowerCostItem { domain: Domain::Fury, amount: 1 },
            PowerCostItem { domain: Domain::Calm, amount: 0 },
            PowerCostItem { domain: Domain::Fury, amount: 1 },
        ];
        let assessed = DefaultQualityGate::new().assess(candidate(card));
        assert_eq!(assessed.card.power, vec![PowerCostItem { domain: Domain::Fury, amount: 2 }]);
        assert_eq!(assessed.decision, QualityDecision::AcceptWithWarnings);
    }

    #[test]
    fn test_schema_version_and_might_repairs() {
        let mut card = good_card();
        card.schema_version = 0;
        card.category = Some(Category::Gear);
        let assessed = DefaultQualityGate::new().assess(candidate(card));
        assert_eq!(assessed.card.schema_version, SCHEMA_VERSION);
        assert_eq!(assessed.card.might, None);
        assert_eq!(assessed.decision, QualityDecision::AcceptWithWarnings);
    }

    #[test]
    fn test_gaps_attach_rules_text_on_accept() {
        let mut input = candidate(good_card());
        input.has_rules_gaps = true;
        input.raw_rules_text = Some("Swap\nplaces.".to_string());
        input.diagnostics.info(IssueKind::UnparsedRules, Some("rules_text"), "gap");
        let assessed = DefaultQualityGate::new().assess(input);
        assert_eq!(assessed.decision, QualityDecision::Accept);
        assert_eq!(assessed.card.raw_rules_text.as_deref(), Some("Swap\nplaces."));
        assert!(assessed.card.diagnostics.is_some());
        assert!(assessed.card.raw_data.is_none());
    }

    #[test]
    fn test_failed_extraction_record() {
        let input = DefaultQualityGate::failed_extraction("", "model returned garbage", Some("{oops".to_string()));
        let assessed = DefaultQualityGate::new().assess(input);
        assert_eq!(assessed.decision, QualityDecision::Flagged);
        assert_eq!(assessed.card.name, "card");
        assert_eq!(assessed.card.energy, 0);
        assert_eq!(assessed.card.raw_data, Some(Value::String("{oops".to_string())));
        let diagnostics = assessed.card.diagnostics.expect("diagnostics attached");
        assert!(diagnostics.has_kind(IssueKind::ExtractionFailed));
        assert!(!diagnostics.has_kind(IssueKind::SchemaViolation));
    }

    #[test]
    fn test_name_from_stem() {
        assert_eq!(name_from_stem("VOLIBEAR_furious-bear"), "Volibear Furious Bear");
        assert_eq!(name_from_stem("__"), "card");
    }
}
