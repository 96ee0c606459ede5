use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{BTreeMap, BTreeSet};
use tracing::debug;

use crate::pipeline::processing::canonical;
use crate::pipeline::processing::power_cost::PowerCostResolver;
use crate::types::{Category, Diagnostics, Domain, IssueKind, KeywordParam, NormalizedCard, RawExtractionRecord};

/// First category word on a type line, plural accepted
static CATEGORY_TOKEN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(unit|spell|gear|rune|legend|battlefield)s?\b").expect("category regex")
});

/// A trailing keyword parameter: "DEFLECT 1", "DEFLECT +1", "DEFLECT (FURY)", "ASSAULT_2"
static KEYWORD_PARAM: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(?P<name>.+?)[\s_]*(?:\((?P<paren>[^)]*)\)|\+?(?P<num>\d+))$").expect("keyword param regex")
});

/// Punctuation OCR leaves around a keyword
const KEYWORD_NOISE: &[char] = &['.', ',', ';', ':', '!', '?'];

/// Separators between a category and its subtypes on the type line
const SUBTYPE_SEPARATORS: &[char] = &['—', '–', '-', '·', '•', ',', '/', '|', ':'];

/// Result of normalizing one raw extraction
#[derive(Debug, Clone)]
pub struct NormalizationResult {
    pub card: NormalizedCard,
    pub diagnostics: Diagnostics,
}

/// Trait for turning raw extractions into canonical cards
pub trait Normalizer {
    /// Normalizing never fails; anything odd is reported in the diagnostics
    fn normalize(&self, raw: &RawExtractionRecord) -> NormalizationResult;
}

/// Default normalizer backed by the static canonicalization tables
pub struct FieldNormalizer;

impl Normalizer for FieldNormalizer {
    fn normalize(&self, raw: &RawExtractionRecord) -> NormalizationResult {
        let mut diagnostics = Diagnostics::new();

        for note in &raw.notes {
            diagnostics.info(IssueKind::InvalidFormat, None, format!("decoder: {note}"));
        }

        let name = collapse_whitespace(raw.name.as_deref().unwrap_or_default());
        if name.is_empty() {
            diagnostics.error(IssueKind::MissingData, Some("name"), "card name is missing");
        }

        let type_line = self.parse_type_line(raw.type_line.as_deref(), &mut diagnostics);

        let mut supertypes = type_line.supertypes;
        for label in &raw.supertypes {
            let upper = fold_token(label);
            if upper.is_empty() {
                continue;
            }
            let canonical = match canonical::canonical_supertype(&upper) {
                Some(known) => known.to_string(),
                None => {
                    diagnostics.unmapped("supertypes", &upper);
                    upper
                }
            };
            push_unique(&mut supertypes, canonical);
        }

        let tag_sources = type_line.tags.iter().chain(raw.tags.iter());
        let tags = self.normalize_tags(tag_sources, &mut diagnostics);
        let (keywords, keyword_params) = self.normalize_keywords(&raw.keywords, &mut diagnostics);

        let energy = self.normalize_energy(raw.energy, &mut diagnostics);
        let domain = self.normalize_domain(raw.domain_icon.as_deref(), &mut diagnostics);

        let category = type_line.category;
        let might = match non_negative(raw.might, "might", &mut diagnostics) {
            Some(value) if category.is_some() && category != Some(Category::Unit) => {
                diagnostics.warn(
                    IssueKind::AmbiguousValue,
                    Some("might"),
                    format!("might {value} cleared on a non-unit card"),
                );
                None
            }
            other => other,
        };
        let damage = non_negative(raw.damage, "damage", &mut diagnostics);

        let power = PowerCostResolver::resolve(&raw.power_icons, raw.power_text.as_deref());
        diagnostics.extend(power.diagnostics);

        let card = NormalizedCard {
            name,
            category,
            supertypes,
            domain,
            energy,
            power: power.items,
            might,
            damage,
            keywords,
            tags,
            rules_text: collapse_whitespace(raw.rules_text.as_deref().unwrap_or_default()),
            flavor: optional_text(raw.flavor.as_deref()),
            artist: optional_text(raw.artist.as_deref()),
            card_id: optional_text(raw.card_id.as_deref()),
            keyword_params,
        };

        debug!(
            "Normalized card {:?}: category={:?} keywords={:?} issues={}",
            card.name,
            card.category,
            card.keywords,
            diagnostics.issues.len()
        );

        NormalizationResult { card, diagnostics }
    }
}

/// Pieces recovered from a type line
#[derive(Debug, Default)]
struct TypeLine {
    category: Option<Category>,
    supertypes: Vec<String>,
    tags: Vec<String>,
}

impl FieldNormalizer {
    fn parse_type_line(&self, type_line: Option<&str>, diagnostics: &mut Diagnostics) -> TypeLine {
        let mut parsed = TypeLine::default();

        let Some(line) = type_line.map(collapse_whitespace).filter(|l| !l.is_empty()) else {
            diagnostics.error(IssueKind::MissingData, Some("category"), "type line is missing");
            return parsed;
        };

        let Some(found) = CATEGORY_TOKEN.find(&line) else {
            diagnostics.error(
                IssueKind::InvalidFormat,
                Some("category"),
                format!("no category found in type line {line:?}"),
            );
            return parsed;
        };

        parsed.category = found.as_str().parse::<Category>().ok();

        for word in line[..found.start()]
            .split(|c: char| c.is_whitespace() || SUBTYPE_SEPARATORS.contains(&c))
            .map(fold_token)
            .filter(|w| !w.is_empty())
        {
            match canonical::canonical_supertype(&word) {
                Some(supertype) => push_unique(&mut parsed.supertypes, supertype.to_string()),
                None => {
                    diagnostics.unmapped("type_line", &word);
                    diagnostics.info(
                        IssueKind::UnmappedToken,
                        Some("type_line"),
                        format!("{word:?} before the category is not a supertype, kept as a tag"),
                    );
                    parsed.tags.push(word);
                }
            }
        }

        parsed.tags.extend(
            line[found.end()..]
                .split(SUBTYPE_SEPARATORS)
                .map(str::trim)
                .filter(|part| !part.is_empty())
                .map(str::to_string),
        );

        parsed
    }

    fn normalize_tags<'a>(
        &self,
        sources: impl Iterator<Item = &'a String>,
        diagnostics: &mut Diagnostics,
    ) -> Vec<String> {
        let mut tags = Vec::new();
        for source in sources {
            let upper = fold_token(source);
            if upper.is_empty() {
                continue;
            }
            if upper.parse::<Category>().is_ok() {
                diagnostics.info(
                    IssueKind::InvalidFormat,
                    Some("tags"),
                    format!("category word {upper:?} removed from tags"),
                );
                continue;
            }
            let (tag, known) = canonical::canonical_tag(&upper);
            if !known {
                diagnostics.unmapped("tags", &tag);
            }
            push_unique(&mut tags, tag);
        }
        tags
    }

    fn normalize_keywords(
        &self,
        raw_keywords: &[String],
        diagnostics: &mut Diagnostics,
    ) -> (BTreeSet<String>, BTreeMap<String, KeywordParam>) {
        let mut keywords = BTreeSet::new();
        let mut params: BTreeMap<String, KeywordParam> = BTreeMap::new();

        for raw in raw_keywords {
            let (base, param) = peel_keyword_param(&fold_token(raw));
            let joined = base
                .split(|c: char| c.is_whitespace() || c == '-' || c == '_')
                .filter(|part| !part.is_empty())
                .collect::<Vec<_>>()
                .join("_");
            if joined.is_empty() {
                continue;
            }

            let (keyword, known) = canonical::canonical_keyword(&joined);
            if !is_keyword_shape(&keyword) {
                diagnostics.warn(
                    IssueKind::InvalidFormat,
                    Some("keywords"),
                    format!("keyword {raw:?} dropped, {keyword:?} is not a keyword token"),
                );
                continue;
            }
            if !known {
                diagnostics.unmapped("keywords", &keyword);
            }

            if param != KeywordParam::default() {
                let entry = params.entry(keyword.clone()).or_default();
                entry.amount = entry.amount.or(param.amount);
                entry.domain = entry.domain.or(param.domain);
            }
            keywords.insert(keyword);
        }

        (keywords, params)
    }

    fn normalize_energy(&self, energy: Option<i64>, diagnostics: &mut Diagnostics) -> u32 {
        match energy {
            None => {
                diagnostics.warn(IssueKind::MissingData, Some("energy"), "energy missing, defaulted to 0");
                0
            }
            Some(value) => u32::try_from(value).unwrap_or_else(|_| {
                diagnostics.warn(
                    IssueKind::OutOfRange,
                    Some("energy"),
                    format!("energy {value} out of range, defaulted to 0"),
                );
                0
            }),
        }
    }

    fn normalize_domain(&self, icon: Option<&str>, diagnostics: &mut Diagnostics) -> Option<Domain> {
        let icon = icon.map(str::trim).filter(|i| !i.is_empty())?;
        let domain = canonical::resolve_icon(icon);
        if domain.is_none() {
            diagnostics.unmapped("domain", icon);
            diagnostics.warn(
                IssueKind::UnmappedToken,
                Some("domain"),
                format!("domain icon {icon:?} does not map to a domain"),
            );
        }
        domain
    }
}

/// Peel trailing numeric or parenthetical parameters off a folded keyword
fn peel_keyword_param(folded: &str) -> (String, KeywordParam) {
    // "DEFLECT: 1" reads as "DEFLECT 1"
    let mut base = strip_keyword_noise(&folded.replace(':', " "));
    let mut param = KeywordParam::default();

    while let Some(caps) = KEYWORD_PARAM.captures(&base) {
        if let Some(num) = caps.name("num") {
            param.amount = param.amount.or_else(|| num.as_str().parse().ok());
        }
        if let Some(inner) = caps.name("paren") {
            let printed = canonical::parse_keyword_param(inner.as_str());
            param.amount = param.amount.or(printed.amount);
            param.domain = param.domain.or(printed.domain);
        }
        let Some(name) = caps.name("name") else { break };
        base = strip_keyword_noise(name.as_str());
    }

    (base, param)
}

fn strip_keyword_noise(token: &str) -> String {
    token
        .trim()
        .trim_matches(|c: char| KEYWORD_NOISE.contains(&c) || c.is_whitespace())
        .to_string()
}

fn is_keyword_shape(keyword: &str) -> bool {
    !keyword.is_empty() && keyword.chars().all(|c| c.is_ascii_uppercase() || c.is_ascii_digit() || c == '_')
}

/// Negative stat values are cleared with a diagnostic
fn non_negative(value: Option<i64>, field: &str, diagnostics: &mut Diagnostics) -> Option<u32> {
    let value = value?;
    match u32::try_from(value) {
        Ok(v) => Some(v),
        Err(_) => {
            diagnostics.warn(
                IssueKind::OutOfRange,
                Some(field),
                format!("{field} {value} out of range, cleared"),
            );
            None
        }
    }
}

/// Uppercase with internal whitespace collapsed
fn fold_token(token: &str) -> String {
    collapse_whitespace(token).to_uppercase()
}

pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn optional_text(text: Option<&str>) -> Option<String> {
    text.map(collapse_whitespace).filter(|t| !t.is_empty())
}

fn push_unique(list: &mut Vec<String>, value: String) {
    if !list.contains(&value) {
        list.push(value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PowerCostItem, Severity};

    fn raw(name: &str, type_line: &str) -> RawExtractionRecord {
        RawExtractionRecord {
            name: Some(name.to_string()),
            type_line: Some(type_line.to_string()),
            energy: Some(3),
            ..Default::default()
        }
    }

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_champion_type_line() {
        let result = FieldNormalizer.normalize(&raw("  Volibear,\n  Furious ", "Champion Unit — Volibear"));
        let card = result.card;
        assert_eq!(card.name, "Volibear, Furious");
        assert_eq!(card.category, Some(Category::Unit));
        assert_eq!(card.supertypes, strings(&["CHAMPION"]));
        assert_eq!(card.tags, strings(&["VOLIBEAR"]));
        assert!(result.diagnostics.unmapped_tokens.contains(&"tags:VOLIBEAR".to_string()));
    }

    #[test]
    fn test_plural_category_case_insensitive() {
        let card = FieldNormalizer.normalize(&raw("Blast", "SPELLS")).card;
        assert_eq!(card.category, Some(Category::Spell));
        assert!(card.tags.is_empty());
    }

    #[test]
    fn test_unparseable_type_line() {
        let result = FieldNormalizer.normalize(&raw("Odd", "Mystery Thing"));
        assert_eq!(result.card.category, None);
        assert!(result.diagnostics.has_kind(IssueKind::InvalidFormat));
        assert_eq!(result.diagnostics.max_severity(), Some(Severity::Error));
    }

    #[test]
    fn test_keyword_param_is_peeled() {
        let mut input = raw("Guard", "Unit");
        input.keywords = strings(&["deflect 1", "Assault (2)", "Death Knell", "shield 3 (fury)"]);
        let card = FieldNormalizer.normalize(&input).card;
        let keywords: Vec<&str> = card.keywords.iter().map(String::as_str).collect();
        assert_eq!(keywords, vec!["ASSAULT", "DEATHKNELL", "DEFLECT", "SHIELD"]);
        assert_eq!(card.keyword_params["DEFLECT"].amount, Some(1));
        assert_eq!(card.keyword_params["ASSAULT"].amount, Some(2));
        assert_eq!(
            card.keyword_params["SHIELD"],
            KeywordParam { amount: Some(3), domain: Some(Domain::Fury) }
        );
        assert!(!card.keyword_params.contains_key("DEATHKNELL"));
    }

    #[test]
    fn test_keyword_punctuation_is_stripped() {
        for printed in ["Deflect 1.", "Deflect: 1", "Deflect +1", "deflect 1;"] {
            let mut input = raw("Guard", "Unit");
            input.keywords = strings(&[printed]);
            let result = FieldNormalizer.normalize(&input);
            let keywords: Vec<&str> = result.card.keywords.iter().map(String::as_str).collect();
            assert_eq!(keywords, vec!["DEFLECT"], "{printed}");
            assert_eq!(result.card.keyword_params["DEFLECT"].amount, Some(1), "{printed}");
            assert!(result.diagnostics.unmapped_tokens.is_empty(), "{printed}");
        }
    }

    #[test]
    fn test_malformed_keyword_is_dropped_with_warning() {
        let mut input = raw("Guard", "Unit");
        input.keywords = strings(&["Death's Door", "Tank"]);
        let result = FieldNormalizer.normalize(&input);
        let keywords: Vec<&str> = result.card.keywords.iter().map(String::as_str).collect();
        assert_eq!(keywords, vec!["TANK"]);
        assert!(result
            .diagnostics
            .issues
            .iter()
            .any(|i| i.severity == Severity::Warning && i.field.as_deref() == Some("keywords")));
    }

    #[test]
    fn test_canonicalization_is_idempotent() {
        let mut input = raw("Poro Pal", "Unit - Poros / Dragon");
        input.keywords = strings(&["tank", "gank", "flying"]);
        input.tags = strings(&["equip", "poro", "Unit"]);
        let first = FieldNormalizer.normalize(&input).card;
        assert_eq!(first.tags, strings(&["PORO", "DRAGON", "EQUIPMENT"]));

        let mut again = raw("Poro Pal", "Unit");
        again.keywords = first.keywords.iter().cloned().collect();
        again.tags = first.tags.clone();
        let second = FieldNormalizer.normalize(&again).card;
        assert_eq!(second.keywords, first.keywords);
        assert_eq!(second.tags, first.tags);
    }

    #[test]
    fn test_category_words_removed_from_tags() {
        let mut input = raw("Cannon", "Gear");
        input.tags = strings(&["gear", "Mech", "MECHS"]);
        let result = FieldNormalizer.normalize(&input);
        assert_eq!(result.card.tags, strings(&["MECH"]));
        assert!(result
            .diagnostics
            .issues
            .iter()
            .any(|i| i.severity == Severity::Info && i.field.as_deref() == Some("tags")));
    }

    #[test]
    fn test_energy_defaults() {
        let mut input = raw("Free", "Spell");
        input.energy = None;
        let result = FieldNormalizer.normalize(&input);
        assert_eq!(result.card.energy, 0);
        assert!(result.diagnostics.has_kind(IssueKind::MissingData));

        input.energy = Some(-2);
        let result = FieldNormalizer.normalize(&input);
        assert_eq!(result.card.energy, 0);
        assert!(result.diagnostics.has_kind(IssueKind::OutOfRange));
    }

    #[test]
    fn test_might_cleared_on_spell() {
        let mut input = raw("Bolt", "Spell");
        input.might = Some(4);
        let result = FieldNormalizer.normalize(&input);
        assert_eq!(result.card.might, None);
        assert!(result.diagnostics.has_kind(IssueKind::AmbiguousValue));

        let mut unit = raw("Brute", "Unit");
        unit.might = Some(4);
        assert_eq!(FieldNormalizer.normalize(&unit).card.might, Some(4));
    }

    #[test]
    fn test_domain_only_from_icon() {
        let mut input = raw("Spark", "Spell");
        input.power_icons = strings(&["fury"]);
        let card = FieldNormalizer.normalize(&input).card;
        assert_eq!(card.domain, None);
        assert_eq!(card.power, vec![PowerCostItem { domain: Domain::Fury, amount: 1 }]);

        input.domain_icon = Some("Icon_Chaos.png".to_string());
        assert_eq!(FieldNormalizer.normalize(&input).card.domain, Some(Domain::Chaos));

        input.domain_icon = Some("sparkles".to_string());
        let result = FieldNormalizer.normalize(&input);
        assert_eq!(result.card.domain, None);
        assert!(result.diagnostics.unmapped_tokens.contains(&"domain:sparkles".to_string()));
    }

    #[test]
    fn test_rules_text_whitespace_collapsed() {
        let mut input = raw("Wordy", "Spell");
        input.rules_text = Some("  Deal 2\n damage.\t Draw 1. ".to_string());
        assert_eq!(FieldNormalizer.normalize(&input).card.rules_text, "Deal 2 damage. Draw 1.");
    }

    #[test]
    fn test_missing_name_is_error() {
        let result = FieldNormalizer.normalize(&raw("   ", "Unit"));
        assert_eq!(result.card.name, "");
        assert!(result
            .diagnostics
            .issues
            .iter()
            .any(|i| i.kind == IssueKind::MissingData && i.severity == Severity::Error));
    }
}
