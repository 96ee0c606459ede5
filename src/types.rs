use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use crate::constants::SCHEMA_VERSION;
use crate::pipeline::processing::canonical;

/// Raw extraction payload as returned by the OCR collaborator
pub type RawExtractionData = serde_json::Value;

/// One of the six game-colour affiliations
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Domain {
    Fury,
    Calm,
    Mind,
    Body,
    Chaos,
    Order,
}

impl Domain {
    pub const ALL: [Domain; 6] = [
        Domain::Fury,
        Domain::Calm,
        Domain::Mind,
        Domain::Body,
        Domain::Chaos,
        Domain::Order,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Domain::Fury => "FURY",
            Domain::Calm => "CALM",
            Domain::Mind => "MIND",
            Domain::Body => "BODY",
            Domain::Chaos => "CHAOS",
            Domain::Order => "ORDER",
        }
    }
}

impl fmt::Display for Domain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Domain {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        Domain::ALL
            .into_iter()
            .find(|d| d.as_str() == upper)
            .ok_or_else(|| format!("unknown domain: {s}"))
    }
}

/// Card category printed on the type line
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Category {
    Unit,
    Spell,
    Gear,
    Rune,
    Legend,
    Battlefield,
}

impl Category {
    pub const ALL: [Category; 6] = [
        Category::Unit,
        Category::Spell,
        Category::Gear,
        Category::Rune,
        Category::Legend,
        Category::Battlefield,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            Category::Unit => "UNIT",
            Category::Spell => "SPELL",
            Category::Gear => "GEAR",
            Category::Rune => "RUNE",
            Category::Legend => "LEGEND",
            Category::Battlefield => "BATTLEFIELD",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let upper = s.trim().to_ascii_uppercase();
        let singular = upper.strip_suffix('S').unwrap_or(&upper);
        Category::ALL
            .into_iter()
            .find(|c| c.as_str() == upper || c.as_str() == singular)
            .ok_or_else(|| format!("unknown category: {s}"))
    }
}

/// Fields pulled off a card image by the OCR collaborator, before any cleanup.
/// Owned by exactly one card's processing.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawExtractionRecord {
    pub name: Option<String>,
    pub type_line: Option<String>,
    pub energy: Option<i64>,
    /// Power icons in left-to-right visual order
    pub power_icons: Vec<String>,
    /// Free-text cost description, used when no icons were detected
    pub power_text: Option<String>,
    pub domain_icon: Option<String>,
    pub might: Option<i64>,
    pub damage: Option<i64>,
    pub keywords: Vec<String>,
    pub tags: Vec<String>,
    pub supertypes: Vec<String>,
    pub rules_text: Option<String>,
    pub flavor: Option<String>,
    pub artist: Option<String>,
    pub card_id: Option<String>,
    /// Decoder notes about garbled or coerced fields
    pub notes: Vec<String>,
}

/// A single colored-icon requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PowerCostItem {
    pub domain: Domain,
    pub amount: u32,
}

/// Parameter printed alongside a keyword, e.g. the `1` in "Deflect 1"
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct KeywordParam {
    pub amount: Option<u32>,
    pub domain: Option<Domain>,
}

/// Canonical card shape produced by the field normalizer
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NormalizedCard {
    pub name: String,
    pub category: Option<Category>,
    pub supertypes: Vec<String>,
    pub domain: Option<Domain>,
    pub energy: u32,
    pub power: Vec<PowerCostItem>,
    pub might: Option<u32>,
    pub damage: Option<u32>,
    pub keywords: BTreeSet<String>,
    pub tags: Vec<String>,
    pub rules_text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(skip)]
    pub keyword_params: BTreeMap<String, KeywordParam>,
}

/// Closed namespace of effect names an EffectRecord may carry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", try_from = "String")]
pub enum EffectName {
    Accelerate,
    Action,
    Assault,
    Deathknell,
    Deflect,
    Ganking,
    Hidden,
    Legion,
    Reaction,
    Shield,
    Tank,
    Temporary,
    Vision,
    TriggerOnHold,
    TriggerOnConquer,
    TriggerOnPlay,
    ScoreVp,
    DealDamage,
    Heal,
    DrawCards,
    StatModifier,
    Stun,
    ChannelRunes,
    Buff,
    Kill,
}

impl EffectName {
    pub const ALL: [EffectName; 25] = [
        EffectName::Accelerate,
        EffectName::Action,
        EffectName::Assault,
        EffectName::Deathknell,
        EffectName::Deflect,
        EffectName::Ganking,
        EffectName::Hidden,
        EffectName::Legion,
        EffectName::Reaction,
        EffectName::Shield,
        EffectName::Tank,
        EffectName::Temporary,
        EffectName::Vision,
        EffectName::TriggerOnHold,
        EffectName::TriggerOnConquer,
        EffectName::TriggerOnPlay,
        EffectName::ScoreVp,
        EffectName::DealDamage,
        EffectName::Heal,
        EffectName::DrawCards,
        EffectName::StatModifier,
        EffectName::Stun,
        EffectName::ChannelRunes,
        EffectName::Buff,
        EffectName::Kill,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EffectName::Accelerate => "accelerate",
            EffectName::Action => "action",
            EffectName::Assault => "assault",
            EffectName::Deathknell => "deathknell",
            EffectName::Deflect => "deflect",
            EffectName::Ganking => "ganking",
            EffectName::Hidden => "hidden",
            EffectName::Legion => "legion",
            EffectName::Reaction => "reaction",
            EffectName::Shield => "shield",
            EffectName::Tank => "tank",
            EffectName::Temporary => "temporary",
            EffectName::Vision => "vision",
            EffectName::TriggerOnHold => "trigger_on_hold",
            EffectName::TriggerOnConquer => "trigger_on_conquer",
            EffectName::TriggerOnPlay => "trigger_on_play",
            EffectName::ScoreVp => "score_vp",
            EffectName::DealDamage => "deal_damage",
            EffectName::Heal => "heal",
            EffectName::DrawCards => "draw_cards",
            EffectName::StatModifier => "stat_modifier",
            EffectName::Stun => "stun",
            EffectName::ChannelRunes => "channel_runes",
            EffectName::Buff => "buff",
            EffectName::Kill => "kill",
        }
    }
}

impl fmt::Display for EffectName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EffectName {
    type Err = String;

    /// Resolves canonical names and known synonyms ("gain_vp", "deal dmg").
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let canonical = canonical::canonical_effect_name(s);
        EffectName::ALL
            .into_iter()
            .find(|e| e.as_str() == canonical)
            .ok_or_else(|| format!("unknown effect name: {s}"))
    }
}

impl TryFrom<String> for EffectName {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

/// One machine-actionable behaviour derived from a keyword or rules text.
/// Parameters are flattened next to `effect` in the JSON form.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EffectRecord {
    pub effect: EffectName,
    #[serde(flatten)]
    pub params: BTreeMap<String, serde_json::Value>,
}

impl EffectRecord {
    pub fn new(effect: EffectName) -> Self {
        Self {
            effect,
            params: BTreeMap::new(),
        }
    }

    pub fn with_param(mut self, key: &str, value: impl Into<serde_json::Value>) -> Self {
        self.params.insert(key.to_string(), value.into());
        self
    }

    pub fn param(&self, key: &str) -> Option<&serde_json::Value> {
        self.params.get(key)
    }
}

/// Types of issues recorded while processing a card
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueKind {
    MissingData,
    InvalidFormat,
    OutOfRange,
    UnmappedToken,
    AmbiguousValue,
    UnresolvedParameter,
    UnparsedRules,
    DuplicateEffect,
    ExtractionFailed,
    Repaired,
    SchemaViolation,
}

/// Severity levels for card issues
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    /// Informational, the card is still clean
    Info,
    /// Something was defaulted or repaired
    Warning,
    /// A required field could not be determined
    Error,
    /// Nothing usable was extracted
    Critical,
}

/// A single recorded problem with a card
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Issue {
    pub kind: IssueKind,
    pub severity: Severity,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub field: Option<String>,
    pub message: String,
}

/// Per-card diagnostics accumulated across the pipeline stages
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Diagnostics {
    pub issues: Vec<Issue>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub unmapped_tokens: Vec<String>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(
        &mut self,
        kind: IssueKind,
        severity: Severity,
        field: Option<&str>,
        message: impl Into<String>,
    ) {
        self.issues.push(Issue {
            kind,
            severity,
            field: field.map(str::to_string),
            message: message.into(),
        });
    }

    pub fn info(&mut self, kind: IssueKind, field: Option<&str>, message: impl Into<String>) {
        self.push(kind, Severity::Info, field, message);
    }

    pub fn warn(&mut self, kind: IssueKind, field: Option<&str>, message: impl Into<String>) {
        self.push(kind, Severity::Warning, field, message);
    }

    pub fn error(&mut self, kind: IssueKind, field: Option<&str>, message: impl Into<String>) {
        self.push(kind, Severity::Error, field, message);
    }

    /// Record a token that passed through canonicalization unmapped
    pub fn unmapped(&mut self, field: &str, token: &str) {
        let entry = format!("{field}:{token}");
        if !self.unmapped_tokens.contains(&entry) {
            self.unmapped_tokens.push(entry);
        }
    }

    pub fn max_severity(&self) -> Option<Severity> {
        self.issues.iter().map(|i| i.severity).max()
    }

    pub fn has_kind(&self, kind: IssueKind) -> bool {
        self.issues.iter().any(|i| i.kind == kind)
    }

    pub fn is_empty(&self) -> bool {
        self.issues.is_empty() && self.unmapped_tokens.is_empty()
    }

    pub fn extend(&mut self, other: Diagnostics) {
        self.issues.extend(other.issues);
        for token in other.unmapped_tokens {
            if !self.unmapped_tokens.contains(&token) {
                self.unmapped_tokens.push(token);
            }
        }
    }
}

/// Final output record, one per source image
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CardSpec {
    pub schema_version: u32,
    pub name: String,
    pub category: Option<Category>,
    #[serde(default)]
    pub supertypes: Vec<String>,
    pub domain: Option<Domain>,
    pub energy: u32,
    #[serde(default)]
    pub power: Vec<PowerCostItem>,
    #[serde(default)]
    pub might: Option<u32>,
    #[serde(default)]
    pub damage: Option<u32>,
    #[serde(default)]
    pub keywords: BTreeSet<String>,
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub rules_text: String,
    #[serde(default)]
    pub effects: Vec<EffectRecord>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub flavor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artist: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub card_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image_hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_rules_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_data: Option<serde_json::Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub diagnostics: Option<Diagnostics>,
}

impl CardSpec {
    /// Assemble the candidate record from a normalized card and its effects
    pub fn assemble(card: NormalizedCard, effects: Vec<EffectRecord>) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            name: card.name,
            category: card.category,
            supertypes: card.supertypes,
            domain: card.domain,
            energy: card.energy,
            power: card.power,
            might: card.might,
            damage: card.damage,
            keywords: card.keywords,
            tags: card.tags,
            rules_text: card.rules_text,
            effects,
            flavor: card.flavor,
            artist: card.artist,
            card_id: card.card_id,
            image_hash: None,
            raw_rules_text: None,
            raw_data: None,
            diagnostics: None,
        }
    }

    /// Skeleton record emitted when extraction produced nothing usable
    pub fn empty(name: String) -> Self {
        Self {
            schema_version: SCHEMA_VERSION,
            name,
            category: None,
            supertypes: Vec::new(),
            domain: None,
            energy: 0,
            power: Vec::new(),
            might: None,
            damage: None,
            keywords: BTreeSet::new(),
            tags: Vec::new(),
            rules_text: String::new(),
            effects: Vec::new(),
            flavor: None,
            artist: None,
            card_id: None,
            image_hash: None,
            raw_rules_text: None,
            raw_data: None,
            diagnostics: None,
        }
    }
}
