//! Static canonicalization tables.
//!
//! Everything here is read-only lookup data built once on first use. The
//! normalizer and the effect parser consult these tables; nothing mutates them.

use once_cell::sync::Lazy;
use std::collections::{BTreeMap, HashMap};

use crate::types::{Domain, EffectName, KeywordParam};

/// Parameters a keyword schema can ask for
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamKind {
    Amount,
    Domain,
}

impl ParamKind {
    pub fn key(self) -> &'static str {
        match self {
            ParamKind::Amount => "amount",
            ParamKind::Domain => "domain",
        }
    }
}

/// Effect produced by a keyword and the parameters it carries
#[derive(Debug, Clone, Copy)]
pub struct KeywordSchema {
    pub effect: EffectName,
    pub required: &'static [ParamKind],
    pub optional: &'static [ParamKind],
}

/// Icon identifiers (and the colours they are printed in) to domains
pub static ICON_TO_DOMAIN: Lazy<HashMap<&'static str, Domain>> = Lazy::new(|| {
    HashMap::from([
        ("fury", Domain::Fury),
        ("red", Domain::Fury),
        ("calm", Domain::Calm),
        ("green", Domain::Calm),
        ("mind", Domain::Mind),
        ("blue", Domain::Mind),
        ("body", Domain::Body),
        ("orange", Domain::Body),
        ("chaos", Domain::Chaos),
        ("purple", Domain::Chaos),
        ("order", Domain::Order),
        ("gold", Domain::Order),
        ("yellow", Domain::Order),
    ])
});

/// Canonical keyword -> effect schema
pub static KEYWORD_SCHEMAS: Lazy<BTreeMap<&'static str, KeywordSchema>> = Lazy::new(|| {
    let bare = |effect| KeywordSchema { effect, required: &[], optional: &[] };
    BTreeMap::from([
        ("ACCELERATE", KeywordSchema { effect: EffectName::Accelerate, required: &[], optional: &[ParamKind::Domain] }),
        ("ACTION", bare(EffectName::Action)),
        ("ASSAULT", KeywordSchema { effect: EffectName::Assault, required: &[ParamKind::Amount], optional: &[] }),
        ("DEATHKNELL", bare(EffectName::Deathknell)),
        ("DEFLECT", KeywordSchema { effect: EffectName::Deflect, required: &[ParamKind::Amount], optional: &[ParamKind::Domain] }),
        ("GANKING", bare(EffectName::Ganking)),
        ("HIDDEN", bare(EffectName::Hidden)),
        ("LEGION", bare(EffectName::Legion)),
        ("REACTION", bare(EffectName::Reaction)),
        ("SHIELD", KeywordSchema { effect: EffectName::Shield, required: &[ParamKind::Amount], optional: &[] }),
        ("TANK", bare(EffectName::Tank)),
        ("TEMPORARY", bare(EffectName::Temporary)),
        ("VISION", bare(EffectName::Vision)),
    ])
});

/// Alternate keyword spellings -> canonical keyword
pub static KEYWORD_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("DEATH_KNELL", "DEATHKNELL"),
        ("DEFLECTS", "DEFLECT"),
        ("GANK", "GANKING"),
        ("SHIELDED", "SHIELD"),
        ("SHIELDING", "SHIELD"),
        ("ASSAULTS", "ASSAULT"),
        ("TEMP", "TEMPORARY"),
        ("REACT", "REACTION"),
    ])
});

/// Alternate tag spellings -> canonical tag
pub static TAG_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("EQUIPMENT", "EQUIPMENT"),
        ("EQUIP", "EQUIPMENT"),
        ("DRAGONS", "DRAGON"),
        ("DRAGON", "DRAGON"),
        ("YORDLES", "YORDLE"),
        ("YORDLE", "YORDLE"),
        ("MECHS", "MECH"),
        ("MECH", "MECH"),
        ("POROS", "PORO"),
        ("PORO", "PORO"),
        ("BIRDS", "BIRD"),
        ("BIRD", "BIRD"),
    ])
});

/// Supertype labels printed before the category
pub static SUPERTYPE_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("CHAMPION", "CHAMPION"),
        ("CHAMP", "CHAMPION"),
        ("SIGNATURE", "SIGNATURE"),
        ("TOKEN", "TOKEN"),
    ])
});

/// Alternate effect names (as an LLM or older records phrase them) -> canonical
pub static EFFECT_SYNONYMS: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    HashMap::from([
        ("score_point", "score_vp"),
        ("score_points", "score_vp"),
        ("gain_point", "score_vp"),
        ("gain_vp", "score_vp"),
        ("deal_dmg", "deal_damage"),
        ("damage", "deal_damage"),
        ("draw_card", "draw_cards"),
        ("draw", "draw_cards"),
        ("on_hold", "trigger_on_hold"),
        ("when_hold", "trigger_on_hold"),
        ("on_conquer", "trigger_on_conquer"),
        ("on_play", "trigger_on_play"),
        ("stat_mod", "stat_modifier"),
        ("channel", "channel_runes"),
        ("destroy", "kill"),
    ])
});

/// Reduce an icon identifier to its table key: lowercase, non-alphanumerics to
/// `_`, and decorative prefixes/suffixes removed ("Icon-Fury.png" -> "fury").
pub fn icon_key(token: &str) -> String {
    let lowered = token.trim().to_lowercase();
    let lowered = lowered
        .strip_suffix(".png")
        .or_else(|| lowered.strip_suffix(".svg"))
        .unwrap_or(&lowered)
        .to_string();
    let mut key: String = lowered
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    key = key.trim_matches('_').to_string();
    for prefix in ["icon_", "power_", "domain_", "rune_"] {
        if let Some(rest) = key.strip_prefix(prefix) {
            key = rest.to_string();
        }
    }
    for suffix in ["_icon", "_rune"] {
        if let Some(rest) = key.strip_suffix(suffix) {
            key = rest.to_string();
        }
    }
    key
}

/// Map an icon identifier to a domain
pub fn resolve_icon(token: &str) -> Option<Domain> {
    ICON_TO_DOMAIN.get(icon_key(token).as_str()).copied()
}

/// Look up the effect schema for a canonical keyword
pub fn keyword_schema(keyword: &str) -> Option<&'static KeywordSchema> {
    KEYWORD_SCHEMAS.get(keyword)
}

/// Canonical spelling for an uppercased keyword; unknown keywords come back
/// unchanged with `false`.
pub fn canonical_keyword(upper: &str) -> (String, bool) {
    if let Some(mapped) = KEYWORD_SYNONYMS.get(upper) {
        return (mapped.to_string(), true);
    }
    let known = KEYWORD_SCHEMAS.contains_key(upper);
    (upper.to_string(), known)
}

/// Canonical spelling for an uppercased tag; unknown tags come back unchanged
/// with `false`.
pub fn canonical_tag(upper: &str) -> (String, bool) {
    match TAG_SYNONYMS.get(upper) {
        Some(mapped) => (mapped.to_string(), true),
        None => (upper.to_string(), false),
    }
}

/// Canonical supertype, if the label is one
pub fn canonical_supertype(upper: &str) -> Option<&'static str> {
    SUPERTYPE_SYNONYMS.get(upper).copied()
}

/// Canonical effect-name spelling (lower snake case, synonyms resolved)
pub fn canonical_effect_name(raw: &str) -> String {
    let snake: String = raw
        .trim()
        .to_lowercase()
        .split(|c: char| c.is_whitespace() || c == '-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("_");
    EFFECT_SYNONYMS
        .get(snake.as_str())
        .map(|s| s.to_string())
        .unwrap_or(snake)
}

/// Read a printed keyword parameter such as `1`, `FURY` or `2, fury`. The
/// first number becomes the amount and the first domain word the domain.
pub fn parse_keyword_param(text: &str) -> KeywordParam {
    let mut param = KeywordParam::default();
    for piece in text.split(|c: char| c.is_whitespace() || c == ',' || c == '/') {
        if piece.is_empty() {
            continue;
        }
        if let Ok(amount) = piece.parse::<u32>() {
            param.amount = param.amount.or(Some(amount));
        } else if let Some(domain) = resolve_icon(piece) {
            param.domain = param.domain.or(Some(domain));
        }
    }
    param
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_icon_key_strips_decoration() {
        assert_eq!(icon_key("Icon-Fury.png"), "fury");
        assert_eq!(icon_key(" RUNE_CHAOS "), "chaos");
        assert_eq!(icon_key("power:order"), "order");
        assert_eq!(icon_key("calm_icon"), "calm");
    }

    #[test]
    fn test_resolve_icon_accepts_colours() {
        assert_eq!(resolve_icon("red"), Some(Domain::Fury));
        assert_eq!(resolve_icon("GOLD"), Some(Domain::Order));
        assert_eq!(resolve_icon("shadow"), None);
    }

    #[test]
    fn test_every_domain_has_an_icon() {
        for domain in Domain::ALL {
            let key = domain.as_str().to_lowercase();
            assert_eq!(resolve_icon(&key), Some(domain));
        }
    }

    #[test]
    fn test_synonym_targets_are_canonical() {
        for target in KEYWORD_SYNONYMS.values() {
            assert!(KEYWORD_SCHEMAS.contains_key(target), "{target} has no schema");
        }
        for target in TAG_SYNONYMS.values() {
            assert_eq!(canonical_tag(target).0, *target);
        }
        for target in EFFECT_SYNONYMS.values() {
            assert!(target.parse::<EffectName>().is_ok(), "{target} not in namespace");
        }
    }

    #[test]
    fn test_canonical_effect_name() {
        assert_eq!(canonical_effect_name("deal dmg"), "deal_damage");
        assert_eq!(canonical_effect_name("Score-Point"), "score_vp");
        assert_eq!(canonical_effect_name("heal"), "heal");
    }

    #[test]
    fn test_parse_keyword_param() {
        assert_eq!(
            parse_keyword_param("1 FURY"),
            KeywordParam { amount: Some(1), domain: Some(Domain::Fury) }
        );
        assert_eq!(parse_keyword_param("calm"), KeywordParam { amount: None, domain: Some(Domain::Calm) });
        assert_eq!(parse_keyword_param("see below"), KeywordParam::default());
    }

    #[test]
    fn test_canonical_keyword_reports_known() {
        assert_eq!(canonical_keyword("DEFLECT"), ("DEFLECT".to_string(), true));
        assert_eq!(canonical_keyword("DEATH_KNELL"), ("DEATHKNELL".to_string(), true));
        assert_eq!(canonical_keyword("FLYING"), ("FLYING".to_string(), false));
    }
}
