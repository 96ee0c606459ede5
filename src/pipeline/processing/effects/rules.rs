//! Built-in derivation rules.
//!
//! Keyword rules come from the keyword-schema table, one per canonical keyword.
//! Pattern rules are applied to the rules text in declaration order.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};
use std::collections::BTreeMap;
use std::fmt;

use crate::pipeline::processing::canonical::{self, KeywordSchema};
use crate::types::{EffectName, EffectRecord};

/// Builds an effect from a pattern match; `None` when the captures don't
/// carry a usable value
pub type BuildFn = fn(&Captures<'_>) -> Option<EffectRecord>;

/// A regex matcher paired with the builder that turns a match into an effect
#[derive(Clone)]
pub struct PatternRule {
    pub name: &'static str,
    pub matcher: Regex,
    pub build: BuildFn,
}

impl PatternRule {
    pub fn new(name: &'static str, pattern: &str, build: BuildFn) -> Result<Self, regex::Error> {
        Ok(Self {
            name,
            matcher: Regex::new(pattern)?,
            build,
        })
    }
}

impl fmt::Debug for PatternRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternRule")
            .field("name", &self.name)
            .field("matcher", &self.matcher.as_str())
            .finish()
    }
}

/// A canonical keyword, its schema, and the regex that finds it in rules text
/// together with any printed parameter ("Deflect 1 (FURY)")
#[derive(Debug, Clone)]
pub struct KeywordRule {
    pub keyword: String,
    pub schema: KeywordSchema,
    pub mention: Regex,
}

impl KeywordRule {
    pub fn new(keyword: &str, schema: KeywordSchema) -> Result<Self, regex::Error> {
        Ok(Self {
            keyword: keyword.to_string(),
            schema,
            mention: mention_regex(keyword)?,
        })
    }
}

/// Regex matching a keyword name in rules text plus an optional trailing
/// number and parenthetical
pub fn mention_regex(keyword: &str) -> Result<Regex, regex::Error> {
    let name = keyword
        .split('_')
        .filter(|part| !part.is_empty())
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(r"[\s_-]+");
    Regex::new(&format!(
        r"(?i)\b{}\b(?:[\s_]*(?P<num>\d+)\b)?(?:\s*\((?P<paren>[^)]*)\))?",
        name
    ))
}

/// Small number words as printed on cards
pub fn parse_amount(word: &str) -> Option<u32> {
    let lower = word.trim().to_lowercase();
    if let Ok(n) = lower.parse::<u32>() {
        return Some(n);
    }
    let n = match lower.as_str() {
        "a" | "an" | "one" => 1,
        "two" => 2,
        "three" => 3,
        "four" => 4,
        "five" => 5,
        "six" => 6,
        _ => return None,
    };
    Some(n)
}

fn amount_of(caps: &Captures<'_>, group: &str) -> Option<u32> {
    caps.name(group).and_then(|m| parse_amount(m.as_str()))
}

fn signed_of(caps: &Captures<'_>, group: &str) -> Option<i64> {
    caps.name(group)
        .map(|m| m.as_str().replace('\u{2212}', "-"))
        .and_then(|s| s.parse::<i64>().ok())
}

fn bare(effect: EffectName) -> Option<EffectRecord> {
    Some(EffectRecord::new(effect))
}

fn build_trigger_on_hold(_: &Captures<'_>) -> Option<EffectRecord> {
    bare(EffectName::TriggerOnHold)
}

fn build_trigger_on_conquer(_: &Captures<'_>) -> Option<EffectRecord> {
    bare(EffectName::TriggerOnConquer)
}

fn build_trigger_on_play(_: &Captures<'_>) -> Option<EffectRecord> {
    bare(EffectName::TriggerOnPlay)
}

fn build_score_vp(caps: &Captures<'_>) -> Option<EffectRecord> {
    let amount = amount_of(caps, "amount")?;
    Some(EffectRecord::new(EffectName::ScoreVp).with_param("amount", amount))
}

fn build_deal_damage(caps: &Captures<'_>) -> Option<EffectRecord> {
    let amount = amount_of(caps, "amount")?;
    let target = caps
        .name("target")
        .map(|m| m.as_str().trim().to_string())
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| "opponent".to_string());
    Some(
        EffectRecord::new(EffectName::DealDamage)
            .with_param("amount", amount)
            .with_param("target", target),
    )
}

fn build_heal(caps: &Captures<'_>) -> Option<EffectRecord> {
    let amount = amount_of(caps, "amount")?;
    Some(EffectRecord::new(EffectName::Heal).with_param("amount", amount))
}

fn build_draw_cards(caps: &Captures<'_>) -> Option<EffectRecord> {
    let amount = amount_of(caps, "amount").or_else(|| amount_of(caps, "word"))?;
    Some(EffectRecord::new(EffectName::DrawCards).with_param("amount", amount))
}

fn build_armor(caps: &Captures<'_>) -> Option<EffectRecord> {
    let amount = signed_of(caps, "amount")?;
    Some(
        EffectRecord::new(EffectName::StatModifier)
            .with_param("stat", "armor")
            .with_param("amount", amount),
    )
}

fn build_might(caps: &Captures<'_>) -> Option<EffectRecord> {
    let amount = signed_of(caps, "amount")?;
    Some(
        EffectRecord::new(EffectName::StatModifier)
            .with_param("stat", "might")
            .with_param("amount", amount),
    )
}

fn build_stun(_: &Captures<'_>) -> Option<EffectRecord> {
    bare(EffectName::Stun)
}

fn build_channel_runes(caps: &Captures<'_>) -> Option<EffectRecord> {
    let amount = amount_of(caps, "amount")?;
    Some(EffectRecord::new(EffectName::ChannelRunes).with_param("amount", amount))
}

fn build_buff(_: &Captures<'_>) -> Option<EffectRecord> {
    bare(EffectName::Buff)
}

fn build_kill(_: &Captures<'_>) -> Option<EffectRecord> {
    bare(EffectName::Kill)
}

const NUMBER_WORD: &str = r"\d+|an?|one|two|three|four|five|six";

fn rule(name: &'static str, pattern: &str, build: BuildFn) -> PatternRule {
    PatternRule::new(name, pattern, build).expect("built-in pattern rule")
}

/// Pattern rules in evaluation order
pub static DEFAULT_PATTERN_RULES: Lazy<Vec<PatternRule>> = Lazy::new(|| {
    vec![
        rule("trigger_on_hold", r"(?i)\bwhen\s+(?:i|this|you)\s+holds?\b", build_trigger_on_hold),
        rule("trigger_on_conquer", r"(?i)\bwhen\s+(?:i|this|you)\s+conquers?\b", build_trigger_on_conquer),
        rule("trigger_on_play", r"(?i)\bwhen\s+you\s+play\s+(?:me|this)\b", build_trigger_on_play),
        rule(
            "score_vp",
            &format!(r"(?i)\bscores?\s+(?P<amount>{})\s+points?\b", NUMBER_WORD),
            build_score_vp,
        ),
        rule(
            "deal_damage",
            r"(?i)\bdeals?\s+(?P<amount>\d+)\s+damage\b(?:\s+to\s+(?P<target>[^.;!,]+?)(?:\s+and\b|[.;!,]|$))?",
            build_deal_damage,
        ),
        rule("heal", r"(?i)\bheals?\s+(?P<amount>\d+)\b", build_heal),
        rule(
            "draw_cards",
            r"(?i)\bdraws?\s+(?:(?P<amount>\d+)(?:\s+cards?)?|(?P<word>an?|one|two|three|four|five)\s+cards?)\b",
            build_draw_cards,
        ),
        rule("armor", r"(?i)(?P<amount>[+\-\x{2212}]\d+)\s+armor\b", build_armor),
        rule("might", r"(?i)(?P<amount>[+\-\x{2212}]\d+)\s+might\b", build_might),
        rule("stun", r"(?i)\bstun(?:s|ned)?\b", build_stun),
        rule(
            "channel_runes",
            &format!(r"(?i)\bchannels?\s+(?P<amount>{})\s+runes?\b", NUMBER_WORD),
            build_channel_runes,
        ),
        rule("buff", r"(?i)\bbuff(?:s|ed)?\b", build_buff),
        rule("kill", r"(?i)\bkills?\b", build_kill),
    ]
});

/// Keyword rules for every keyword in the schema table, keyed by keyword
pub static DEFAULT_KEYWORD_RULES: Lazy<BTreeMap<String, KeywordRule>> = Lazy::new(|| {
    canonical::KEYWORD_SCHEMAS
        .iter()
        .map(|(keyword, schema)| {
            let rule = KeywordRule::new(keyword, *schema).expect("built-in keyword rule");
            (keyword.to_string(), rule)
        })
        .collect()
});
