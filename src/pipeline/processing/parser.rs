use serde_json::Value;
use tracing::debug;

use crate::constants::MAX_POWER_TOKENS_PER_ENTRY;
use crate::types::{RawExtractionData, RawExtractionRecord};

/// Decodes whatever the OCR collaborator returned into a `RawExtractionRecord`.
/// Garbled or missing fields never fail the decode; they are left empty and
/// described in `notes`.
pub trait ExtractionParser {
    fn parse(&self, data: &RawExtractionData) -> RawExtractionRecord;
}

/// Tolerant decoder accepting the field spellings vision models commonly emit
pub struct TolerantParser;

impl ExtractionParser for TolerantParser {
    fn parse(&self, data: &RawExtractionData) -> RawExtractionRecord {
        let mut raw = RawExtractionRecord::default();

        if !data.is_object() {
            raw.notes.push(format!("payload is not a JSON object (got {})", kind_of(data)));
            return raw;
        }

        raw.name = str_field(data, &["name", "card_name", "title"]);
        raw.type_line = str_field(data, &["type_line", "type", "card_type"]);
        raw.energy = int_field(data, &["energy", "cost.energy", "cost_energy"], &mut raw.notes);
        raw.might = int_field(data, &["might", "stats.might"], &mut raw.notes);
        raw.damage = int_field(data, &["damage", "stats.damage"], &mut raw.notes);
        raw.keywords = list_field(data, &["keywords"], &mut raw.notes);
        raw.tags = list_field(data, &["tags"], &mut raw.notes);
        raw.supertypes = list_field(data, &["supertypes"], &mut raw.notes);
        raw.rules_text = str_field(data, &["rules_text", "rules", "text"]);
        raw.flavor = str_field(data, &["flavor", "flavor_text"]);
        raw.artist = str_field(data, &["artist"]);
        raw.card_id = str_field(data, &["card_id", "collector_number", "id"]);
        raw.power_text = str_field(data, &["power_text", "cost_text", "cost.power_text"]);

        self.extract_power(data, &mut raw);
        self.extract_domain(data, &mut raw);

        debug!(
            "Decoded raw extraction name={:?} icons={} notes={}",
            raw.name,
            raw.power_icons.len(),
            raw.notes.len()
        );
        raw
    }
}

impl TolerantParser {
    fn extract_power(&self, data: &Value, raw: &mut RawExtractionRecord) {
        let Some(power) = lookup(data, &["power_icons", "cost.power", "power", "cost_power"]) else {
            return;
        };

        match power {
            Value::Null => {}
            Value::String(s) => {
                // "Fury 1" style descriptions end up as free text
                if raw.power_text.is_none() && !s.trim().is_empty() {
                    raw.power_text = Some(s.clone());
                }
            }
            Value::Array(entries) => {
                for entry in entries {
                    push_power_entry(entry, raw);
                }
            }
            Value::Object(_) => push_power_entry(power, raw),
            other => raw
                .notes
                .push(format!("power: unexpected {} value", kind_of(other))),
        }
    }

    fn extract_domain(&self, data: &Value, raw: &mut RawExtractionRecord) {
        if let Some(icon) = str_field(data, &["domain_icon", "domain"]) {
            raw.domain_icon = Some(icon);
            return;
        }
        if let Some(Value::Array(domains)) = lookup(data, &["domains"]) {
            let names: Vec<&str> = domains.iter().filter_map(|d| d.as_str()).collect();
            match names.as_slice() {
                [single] => raw.domain_icon = Some(single.to_string()),
                [] => {}
                many => raw.notes.push(format!(
                    "domain: {} domains listed ({}), no single domain icon",
                    many.len(),
                    many.join(", ")
                )),
            }
        }
    }
}

fn push_power_entry(entry: &Value, raw: &mut RawExtractionRecord) {
    match entry {
        Value::String(s) => raw.power_icons.push(s.clone()),
        Value::Object(map) => {
            let Some(domain) = map.get("domain").and_then(|d| d.as_str()) else {
                raw.notes.push("power: entry without a domain".to_string());
                return;
            };
            let amount = match map.get("amount") {
                None | Some(Value::Null) => 1,
                Some(v) => match coerce_int(v).and_then(|n| u32::try_from(n).ok()) {
                    Some(n) => n,
                    None => {
                        raw.notes.push(format!("power: unparseable amount {v} for {domain}"));
                        1
                    }
                },
            };
            if amount > MAX_POWER_TOKENS_PER_ENTRY {
                raw.notes.push(format!(
                    "power: amount {amount} for {domain} capped at {MAX_POWER_TOKENS_PER_ENTRY}"
                ));
            }
            for _ in 0..amount.min(MAX_POWER_TOKENS_PER_ENTRY) {
                raw.power_icons.push(domain.to_string());
            }
        }
        other => raw
            .notes
            .push(format!("power: unexpected {} entry", kind_of(other))),
    }
}

/// Look up the first present key; dotted keys walk nested objects
fn lookup<'a>(data: &'a Value, keys: &[&str]) -> Option<&'a Value> {
    keys.iter().find_map(|key| {
        let mut current = data;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    })
}

fn str_field(data: &Value, keys: &[&str]) -> Option<String> {
    keys.iter()
        .filter_map(|k| lookup(data, &[*k]))
        .find_map(|v| match v {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        })
}

fn int_field(data: &Value, keys: &[&str], notes: &mut Vec<String>) -> Option<i64> {
    let (key, value) = keys
        .iter()
        .find_map(|k| lookup(data, &[*k]).filter(|v| !v.is_null()).map(|v| (*k, v)))?;
    let parsed = coerce_int(value);
    if parsed.is_none() {
        notes.push(format!("{key}: unparseable value {value}"));
    }
    parsed
}

/// Integers may arrive as numbers, numeric strings, or strings like "3 energy"
fn coerce_int(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n
            .as_i64()
            .or_else(|| n.as_f64().filter(|f| f.fract() == 0.0).map(|f| f as i64)),
        Value::String(s) => {
            let trimmed = s.trim();
            trimmed.parse::<i64>().ok().or_else(|| {
                let digits: String = trimmed
                    .trim_start_matches(['+', ' '])
                    .chars()
                    .take_while(|c| c.is_ascii_digit())
                    .collect();
                digits.parse::<i64>().ok()
            })
        }
        _ => None,
    }
}

fn list_field(data: &Value, keys: &[&str], notes: &mut Vec<String>) -> Vec<String> {
    match lookup(data, keys) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.clone()),
                Value::Number(n) => Some(n.to_string()),
                Value::Null => None,
                other => {
                    notes.push(format!("{}: skipped {} entry", keys[0], kind_of(other)));
                    None
                }
            })
            .collect(),
        Some(Value::String(s)) => s
            .split([',', ';'])
            .map(|part| part.trim().to_string())
            .filter(|part| !part.is_empty())
            .collect(),
        _ => Vec::new(),
    }
}

fn kind_of(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parses_llm_shaped_payload() {
        let data = json!({
            "name": "Volibear Furious",
            "type": "Champion Unit - Volibear",
            "cost": {"energy": "5", "power": [{"domain": "FURY", "amount": 2}, {"domain": "BODY"}]},
            "stats": {"might": 6},
            "keywords": ["Tank"],
            "tags": "Volibear, Freljord",
            "rules_text": "When I hold, score 1 point.",
            "domain": "fury"
        });
        let raw = TolerantParser.parse(&data);
        assert_eq!(raw.name.as_deref(), Some("Volibear Furious"));
        assert_eq!(raw.type_line.as_deref(), Some("Champion Unit - Volibear"));
        assert_eq!(raw.energy, Some(5));
        assert_eq!(raw.might, Some(6));
        assert_eq!(raw.power_icons, vec!["FURY", "FURY", "BODY"]);
        assert_eq!(raw.tags, vec!["Volibear", "Freljord"]);
        assert_eq!(raw.domain_icon.as_deref(), Some("fury"));
        assert!(raw.notes.is_empty());
    }

    #[test]
    fn test_garbled_fields_become_notes() {
        let data = json!({"name": "Odd", "energy": "lots", "keywords": [{"x": 1}, "Deflect"]});
        let raw = TolerantParser.parse(&data);
        assert_eq!(raw.energy, None);
        assert_eq!(raw.keywords, vec!["Deflect"]);
        assert_eq!(raw.notes.len(), 2);
    }

    #[test]
    fn test_non_object_payload() {
        let raw = TolerantParser.parse(&json!(["not", "a", "card"]));
        assert_eq!(raw, RawExtractionRecord {
            notes: vec!["payload is not a JSON object (got array)".to_string()],
            ..Default::default()
        });
    }

    #[test]
    fn test_power_string_is_free_text() {
        let raw = TolerantParser.parse(&json!({"cost_power": "Fury 1"}));
        assert!(raw.power_icons.is_empty());
        assert_eq!(raw.power_text.as_deref(), Some("Fury 1"));
    }

    #[test]
    fn test_oversized_power_amount_is_unparseable() {
        // 2^32 + 2 would wrap to 2 if narrowed blindly
        let raw = TolerantParser.parse(&json!({"power": [{"domain": "FURY", "amount": 4_294_967_298_i64}]}));
        assert_eq!(raw.power_icons, vec!["FURY"]);
        assert_eq!(raw.notes.len(), 1);
        assert!(raw.notes[0].contains("unparseable amount"));
    }

    #[test]
    fn test_multiple_domains_leave_icon_empty() {
        let raw = TolerantParser.parse(&json!({"domains": ["MIND", "CHAOS"]}));
        assert_eq!(raw.domain_icon, None);
        assert_eq!(raw.notes.len(), 1);

        let raw = TolerantParser.parse(&json!({"domains": ["MIND"]}));
        assert_eq!(raw.domain_icon.as_deref(), Some("MIND"));
    }
}
