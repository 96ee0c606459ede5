use jsonschema::JSONSchema;
use serde_json::json;

use card_porter::types::CardSpec;

fn compiled_schema() -> JSONSchema {
    let schema = include_str!("../schemas/card_spec.v1.json");
    let schema_json: serde_json::Value = serde_json::from_str(schema).unwrap();
    let schema_static: &'static serde_json::Value = Box::leak(Box::new(schema_json));
    JSONSchema::options().compile(schema_static).unwrap()
}

#[test]
fn clean_example_is_valid() {
    let compiled = compiled_schema();
    let instance: serde_json::Value =
        serde_json::from_str(include_str!("resources/card_volibear.json")).unwrap();
    assert!(compiled.is_valid(&instance));
}

#[test]
fn flagged_example_is_valid() {
    let compiled = compiled_schema();
    let instance: serde_json::Value =
        serde_json::from_str(include_str!("resources/card_flagged.json")).unwrap();
    assert!(compiled.is_valid(&instance));
}

#[test]
fn examples_decode_and_reserialize_identically() {
    for text in [
        include_str!("resources/card_volibear.json"),
        include_str!("resources/card_flagged.json"),
    ] {
        let original: serde_json::Value = serde_json::from_str(text).unwrap();
        let card: CardSpec = serde_json::from_value(original.clone()).unwrap();
        assert_eq!(serde_json::to_value(&card).unwrap(), original);
    }
}

#[test]
fn bad_image_hash_is_rejected() {
    let compiled = compiled_schema();
    let mut invalid: serde_json::Value =
        serde_json::from_str(include_str!("resources/card_volibear.json")).unwrap();
    invalid["image_hash"] = json!("NOTAHEX");
    assert!(!compiled.is_valid(&invalid), "hash regex should fail");
}

#[test]
fn unknown_effect_and_lowercase_keyword_are_rejected() {
    let compiled = compiled_schema();
    let mut invalid: serde_json::Value =
        serde_json::from_str(include_str!("resources/card_volibear.json")).unwrap();
    invalid["effects"] = json!([{"effect": "summon_dragon"}]);
    assert!(!compiled.is_valid(&invalid));

    let mut invalid: serde_json::Value =
        serde_json::from_str(include_str!("resources/card_volibear.json")).unwrap();
    invalid["keywords"] = json!(["deflect"]);
    assert!(!compiled.is_valid(&invalid));
}

#[test]
fn missing_required_key_is_rejected() {
    let compiled = compiled_schema();
    let mut invalid: serde_json::Value =
        serde_json::from_str(include_str!("resources/card_volibear.json")).unwrap();
    invalid.as_object_mut().unwrap().remove("energy");
    assert!(!compiled.is_valid(&invalid));
}
