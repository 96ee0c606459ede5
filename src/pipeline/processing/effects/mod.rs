pub mod rules;

use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use tracing::debug;

use crate::pipeline::processing::canonical::{self, ParamKind};
use crate::types::{Diagnostics, EffectName, EffectRecord, IssueKind, KeywordParam, NormalizedCard};
pub use rules::{KeywordRule, PatternRule};

/// Output of effect derivation for one card
#[derive(Debug, Clone, Default)]
pub struct EffectParseResult {
    pub effects: Vec<EffectRecord>,
    pub diagnostics: Diagnostics,
    /// Rules-text fragments no rule accounted for
    pub gaps: Vec<String>,
}

impl EffectParseResult {
    pub fn has_gaps(&self) -> bool {
        !self.gaps.is_empty()
    }
}

/// Rule engine deriving effect records from a normalized card.
///
/// Keywords are evaluated first, in sorted order, then every pattern rule in
/// declaration order with matches in text order. Pattern matches overlapping
/// a span already claimed by a keyword are skipped.
#[derive(Debug, Clone)]
pub struct EffectParser {
    keyword_rules: BTreeMap<String, KeywordRule>,
    pattern_rules: Vec<PatternRule>,
}

impl Default for EffectParser {
    fn default() -> Self {
        Self::new()
    }
}

impl EffectParser {
    /// Parser loaded with the built-in keyword and pattern rules
    pub fn new() -> Self {
        Self {
            keyword_rules: rules::DEFAULT_KEYWORD_RULES.clone(),
            pattern_rules: rules::DEFAULT_PATTERN_RULES.clone(),
        }
    }

    pub fn with_rules(keyword_rules: Vec<KeywordRule>, pattern_rules: Vec<PatternRule>) -> Self {
        Self {
            keyword_rules: keyword_rules
                .into_iter()
                .map(|rule| (rule.keyword.clone(), rule))
                .collect(),
            pattern_rules,
        }
    }

    pub fn with_keyword_rule(mut self, rule: KeywordRule) -> Self {
        self.keyword_rules.insert(rule.keyword.clone(), rule);
        self
    }

    pub fn with_pattern_rule(mut self, rule: PatternRule) -> Self {
        self.pattern_rules.push(rule);
        self
    }

    pub fn parse(&self, card: &NormalizedCard) -> EffectParseResult {
        let text = card.rules_text.as_str();
        let mut diagnostics = Diagnostics::new();
        let mut keyword_spans: Vec<Range<usize>> = Vec::new();
        let mut touched: Vec<Range<usize>> = Vec::new();

        let mut keyword_effects = Vec::new();
        for keyword in &card.keywords {
            let rule = self.keyword_rules.get(keyword);
            let mention = match rule {
                Some(rule) => Some(rule.mention.clone()),
                None => rules::mention_regex(keyword).ok(),
            };

            let mut from_text = KeywordParam::default();
            if let Some(mention) = mention.as_ref() {
                for caps in mention.captures_iter(text) {
                    let Some(whole) = caps.get(0) else { continue };
                    keyword_spans.push(whole.range());
                    touched.push(whole.range());
                    if let Some(num) = caps.name("num") {
                        from_text.amount = from_text.amount.or_else(|| num.as_str().parse().ok());
                    }
                    if let Some(paren) = caps.name("paren") {
                        let printed = canonical::parse_keyword_param(paren.as_str());
                        from_text.amount = from_text.amount.or(printed.amount);
                        from_text.domain = from_text.domain.or(printed.domain);
                    }
                }
            }

            let Some(rule) = rule else {
                diagnostics.info(
                    IssueKind::UnmappedToken,
                    Some("keywords"),
                    format!("keyword {keyword} has no effect schema"),
                );
                continue;
            };

            let printed = card.keyword_params.get(keyword).copied().unwrap_or_default();
            let params = KeywordParam {
                amount: printed.amount.or(from_text.amount),
                domain: printed.domain.or(from_text.domain),
            };
            keyword_effects.push(build_keyword_effect(rule, params, &mut diagnostics));
        }

        let mut pattern_effects = Vec::new();
        for rule in &self.pattern_rules {
            for caps in rule.matcher.captures_iter(text) {
                let Some(whole) = caps.get(0) else { continue };
                let span = whole.range();
                touched.push(span.clone());
                if keyword_spans.iter().any(|k| overlaps(k, &span)) {
                    debug!("Pattern {} at {:?} overlaps a keyword span, skipped", rule.name, span);
                    continue;
                }
                match (rule.build)(&caps) {
                    Some(effect) => pattern_effects.push(effect),
                    None => debug!("Pattern {} matched {:?} without a usable value", rule.name, whole.as_str()),
                }
            }
        }

        flag_duplicates(&keyword_effects, &pattern_effects, &mut diagnostics);

        let gaps = find_gaps(text, &touched);
        for gap in &gaps {
            diagnostics.info(
                IssueKind::UnparsedRules,
                Some("rules_text"),
                format!("no rule covers {gap:?}"),
            );
        }

        let mut effects = keyword_effects;
        effects.extend(pattern_effects);

        debug!(
            "Derived {} effects for {:?} ({} gaps)",
            effects.len(),
            card.name,
            gaps.len()
        );

        EffectParseResult {
            effects,
            diagnostics,
            gaps,
        }
    }
}

fn build_keyword_effect(rule: &KeywordRule, params: KeywordParam, diagnostics: &mut Diagnostics) -> EffectRecord {
    let mut effect = EffectRecord::new(rule.schema.effect);

    for kind in rule.schema.required {
        match param_value(*kind, &params) {
            Some(value) => effect.params.insert(kind.key().to_string(), value),
            None => {
                diagnostics.warn(
                    IssueKind::UnresolvedParameter,
                    Some("effects"),
                    format!("{} requires {} but none was printed", rule.keyword, kind.key()),
                );
                effect.params.insert(kind.key().to_string(), Value::Null)
            }
        };
    }
    for kind in rule.schema.optional {
        if let Some(value) = param_value(*kind, &params) {
            effect.params.insert(kind.key().to_string(), value);
        }
    }

    effect
}

fn param_value(kind: ParamKind, params: &KeywordParam) -> Option<Value> {
    match kind {
        ParamKind::Amount => params.amount.map(Value::from),
        ParamKind::Domain => params.domain.map(|d| Value::from(d.as_str())),
    }
}

/// Both records are kept; the card carries a warning for each shared name
fn flag_duplicates(keyword_effects: &[EffectRecord], pattern_effects: &[EffectRecord], diagnostics: &mut Diagnostics) {
    let from_keywords: BTreeSet<EffectName> = keyword_effects.iter().map(|e| e.effect).collect();
    let shared: BTreeSet<EffectName> = pattern_effects
        .iter()
        .map(|e| e.effect)
        .filter(|name| from_keywords.contains(name))
        .collect();
    for name in shared {
        diagnostics.warn(
            IssueKind::DuplicateEffect,
            Some("effects"),
            format!("{name} derived from both a keyword and the rules text"),
        );
    }
}

fn overlaps(a: &Range<usize>, b: &Range<usize>) -> bool {
    a.start < b.end && b.start < a.end
}

/// Fragments of the rules text, split on sentence punctuation, that no
/// keyword mention or pattern match touches
fn find_gaps(text: &str, touched: &[Range<usize>]) -> Vec<String> {
    let mut fragments = Vec::new();
    let mut start = 0;
    for (idx, c) in text.char_indices() {
        if matches!(c, '.' | ';' | '!') {
            fragments.push(start..idx);
            start = idx + c.len_utf8();
        }
    }
    fragments.push(start..text.len());

    fragments
        .into_iter()
        .filter(|range| text[range.clone()].chars().any(char::is_alphanumeric))
        .filter(|range| !touched.iter().any(|t| overlaps(t, range)))
        .map(|range| text[range].trim().to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{Category, Domain, Severity};
    use regex::Captures;
    use serde_json::json;

    fn card(keywords: &[&str], rules_text: &str) -> NormalizedCard {
        NormalizedCard {
            name: "Test Card".to_string(),
            category: Some(Category::Unit),
            supertypes: Vec::new(),
            domain: None,
            energy: 2,
            power: Vec::new(),
            might: Some(2),
            damage: None,
            keywords: keywords.iter().map(|k| k.to_string()).collect(),
            tags: Vec::new(),
            rules_text: rules_text.to_string(),
            flavor: None,
            artist: None,
            card_id: None,
            keyword_params: BTreeMap::new(),
        }
    }

    fn as_json(effects: &[EffectRecord]) -> Vec<Value> {
        effects.iter().map(|e| serde_json::to_value(e).unwrap()).collect()
    }

    #[test]
    fn test_deflect_params_from_rules_text() {
        let result = EffectParser::new().parse(&card(&["DEFLECT"], "Deflect 1 (FURY)."));
        assert_eq!(
            as_json(&result.effects),
            vec![json!({"effect": "deflect", "amount": 1, "domain": "FURY"})]
        );
        assert!(!result.has_gaps());
        assert!(result.diagnostics.is_empty());
    }

    #[test]
    fn test_hold_and_score() {
        let input = card(&[], "When I hold, score 1 point.");
        let parser = EffectParser::new();
        let result = parser.parse(&input);
        assert_eq!(
            as_json(&result.effects),
            vec![json!({"effect": "trigger_on_hold"}), json!({"effect": "score_vp", "amount": 1})]
        );
        assert!(!result.has_gaps());

        for _ in 0..5 {
            assert_eq!(parser.parse(&input).effects, result.effects);
        }
    }

    #[test]
    fn test_bare_deflect_emits_null_amount() {
        let result = EffectParser::new().parse(&card(&["DEFLECT"], ""));
        assert_eq!(as_json(&result.effects), vec![json!({"effect": "deflect", "amount": null})]);
        assert!(result.diagnostics.has_kind(IssueKind::UnresolvedParameter));
        assert_eq!(result.diagnostics.max_severity(), Some(Severity::Warning));
    }

    #[test]
    fn test_printed_param_wins_over_text() {
        let mut input = card(&["SHIELD"], "Shield 2.");
        input.keyword_params.insert(
            "SHIELD".to_string(),
            KeywordParam { amount: Some(3), domain: Some(Domain::Calm) },
        );
        let result = EffectParser::new().parse(&input);
        // SHIELD takes no domain, so the printed one is dropped
        assert_eq!(as_json(&result.effects), vec![json!({"effect": "shield", "amount": 3})]);
    }

    #[test]
    fn test_keyword_order_is_sorted() {
        let result = EffectParser::new().parse(&card(&["TANK", "ACCELERATE", "HIDDEN"], ""));
        let names: Vec<EffectName> = result.effects.iter().map(|e| e.effect).collect();
        assert_eq!(names, vec![EffectName::Accelerate, EffectName::Hidden, EffectName::Tank]);
    }

    #[test]
    fn test_keyword_without_schema() {
        let result = EffectParser::new().parse(&card(&["FLYING"], "Flying."));
        assert!(result.effects.is_empty());
        assert!(result.diagnostics.has_kind(IssueKind::UnmappedToken));
        assert!(!result.has_gaps());
    }

    #[test]
    fn test_uncovered_fragment_is_a_gap() {
        let result = EffectParser::new().parse(&card(&["DEFLECT"], "Deflect 1. Swap places with an ally!"));
        assert_eq!(result.gaps, vec!["Swap places with an ally".to_string()]);
        assert!(result.diagnostics.has_kind(IssueKind::UnparsedRules));
    }

    #[test]
    fn test_multiple_patterns_in_one_sentence() {
        let result = EffectParser::new().parse(&card(&[], "Deal 2 damage to a unit and draw a card."));
        assert_eq!(
            as_json(&result.effects),
            vec![
                json!({"effect": "deal_damage", "amount": 2, "target": "a unit"}),
                json!({"effect": "draw_cards", "amount": 1}),
            ]
        );
    }

    fn build_deflect(_: &Captures<'_>) -> Option<EffectRecord> {
        Some(EffectRecord::new(EffectName::Deflect).with_param("amount", 1))
    }

    #[test]
    fn test_pattern_overlapping_keyword_is_skipped() {
        let parser = EffectParser::new()
            .with_pattern_rule(PatternRule::new("deflect_text", r"(?i)\bdeflect\s+\d+", build_deflect).unwrap());
        let result = parser.parse(&card(&["DEFLECT"], "Deflect 1."));
        assert_eq!(result.effects.len(), 1);
        assert!(!result.diagnostics.has_kind(IssueKind::DuplicateEffect));
    }

    #[test]
    fn test_keyword_and_pattern_duplicate_both_kept() {
        let parser = EffectParser::new()
            .with_pattern_rule(PatternRule::new("reflect", r"(?i)\breflects?\b", build_deflect).unwrap());
        let result = parser.parse(&card(&["DEFLECT"], "Deflect 1. Reflect the next spell."));
        let names: Vec<EffectName> = result.effects.iter().map(|e| e.effect).collect();
        assert_eq!(names, vec![EffectName::Deflect, EffectName::Deflect]);
        assert!(result.diagnostics.has_kind(IssueKind::DuplicateEffect));
    }

    #[test]
    fn test_custom_rule_sets() {
        let parser = EffectParser::with_rules(Vec::new(), Vec::new());
        let result = parser.parse(&card(&["TANK"], "Kill a unit."));
        assert!(result.effects.is_empty());
        assert_eq!(result.gaps, vec!["Kill a unit".to_string()]);
    }
}
