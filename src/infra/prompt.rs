//! Prompts sent to the vision model.

pub const EXTRACTION_SYSTEM_PROMPT: &str = r#"You transcribe a single Riftbound trading card from an image.

Return exactly one JSON object and nothing else: no prose, no markdown, no code fences, no trailing commas.

Object shape (use null or [] when something is not printed on the card):

{
  "name": "string",
  "supertypes": ["CHAMPION" | "SIGNATURE" | "TOKEN", ...],
  "type": "UNIT | SPELL | GEAR | RUNE | LEGEND | BATTLEFIELD",
  "type_line": "the full type line as printed, e.g. Champion Unit - Volibear",
  "domain": "FURY | CALM | MIND | BODY | CHAOS | ORDER | null",
  "domains": ["FURY", ...],
  "cost": {
    "energy": integer or null,
    "power": [{"domain": "FURY | CALM | MIND | BODY | CHAOS | ORDER", "amount": integer}]
  },
  "stats": {"might": integer or null, "damage": integer or null},
  "keywords": ["string", ...],
  "tags": ["string", ...],
  "rules_text": "string",
  "flavor": "string or null",
  "artist": "string or null",
  "card_id": "string or null"
}

Card names: champion units print a large name with a smaller subtitle below it. The card name is both joined with a space, e.g. "Volibear Furious".

Types: a champion unit has type UNIT and lists CHAMPION in supertypes. Never output "CHAMPION UNIT" as a type. Legends have type LEGEND, are not units, and carry no CHAMPION supertype. A legend shares its champion tag (e.g. "Volibear") with the matching champion unit.

Domains and their frame colours: FURY red, CALM green, MIND blue, BODY orange, CHAOS purple, ORDER gold. A card has at most two domains. With one domain set "domain" to it and "domains" to [it]. With two, set "domain" to null and list both in "domains". Spells take their domain from the colour of their power icons. Runes always have exactly one domain.

Cost: "energy" is the number in the top-left gem, or null when there is no gem. "power" lists the power icons left to right; identical adjacent icons become one entry with an amount, e.g. two BODY icons are {"domain": "BODY", "amount": 2}.

Keywords: list every bold game keyword with its number, e.g. "Assault 2", "Deflect 1", "Shield 3", "Accelerate", "Tank", "Hidden", "Legion", "Deathknell", "Vision".

Tags: champion names, regions and other non-keyword labels from the type line. Never put card type words into tags.

Rules text: the full printed rules text, keeping line breaks. If part of it is unreadable, give the most likely wording."#;

pub const EXTRACTION_USER_PROMPT: &str = "Extract the card data as JSON.";

pub const REPAIR_SYSTEM_PROMPT: &str = "You fix invalid JSON without explanation.";

/// User message asking the model to repair its own malformed output
pub fn repair_prompt(broken: &str) -> String {
    format!(
        "The following text was meant to be a JSON object describing a Riftbound card. \
         It may contain trailing commas or other mistakes. Return ONLY valid JSON for the same data.\n\
         Broken JSON:\n{broken}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repair_prompt_embeds_text() {
        let prompt = repair_prompt("{\"name\": \"Jinx\",}");
        assert!(prompt.ends_with("Broken JSON:\n{\"name\": \"Jinx\",}"));
        assert!(prompt.contains("Return ONLY valid JSON"));
    }
}
