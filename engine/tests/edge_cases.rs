//! Edge case tests for docmap-engine
//!
//! These tests cover boundary conditions and unusual inputs across the
//! public API.

use docmap_engine::codec::{self, ConformSettings, ReadSettings};
use docmap_engine::value::object_from_json;
use docmap_engine::{
    compile, select_schema, Attribute, AttributeType, AttributeValue, Condition, Error, Filter,
    Object, SaveUnknown, Schema, Timestamps, UpdateOp, UpdateValue, Value,
};
use serde_json::json;

fn obj(value: serde_json::Value) -> Object {
    object_from_json(value).unwrap()
}

fn create_test_schema() -> Schema {
    Schema::new(vec![
        Attribute::new("id", AttributeType::String),
        Attribute::new("name", AttributeType::String).required(),
        Attribute::new("count", AttributeType::Number),
        Attribute::new("data", AttributeType::map()),
        Attribute::new("flag", AttributeType::Boolean).or(AttributeType::Null),
    ])
    .unwrap()
}

// ============================================================================
// String Edge Cases
// ============================================================================

#[test]
fn empty_string_round_trip() {
    let schema = create_test_schema();
    let item = codec::to_item(
        &schema,
        &obj(json!({"id": "a", "name": ""})),
        &ConformSettings::save(),
    )
    .unwrap();
    assert_eq!(item["name"], AttributeValue::S(String::new()));

    let doc = codec::from_item(&schema, &item, &ReadSettings::full(), chrono::Utc::now())
        .unwrap()
        .unwrap();
    assert_eq!(doc.get("name"), Some(&Value::from("")));
}

#[test]
fn unicode_strings() {
    let schema = create_test_schema();
    let names = [
        "日本語テスト",
        "Привет мир",
        "🎉🚀💯",
        "Hello\nWorld\tTab",
        "Null\0Test",
    ];
    for name in names {
        let item = codec::to_item(
            &schema,
            &obj(json!({"id": "a", "name": name})),
            &ConformSettings::save(),
        )
        .unwrap();
        let wire = serde_json::to_string(&item).unwrap();
        let back: docmap_engine::Item = serde_json::from_str(&wire).unwrap();
        assert_eq!(back["name"], AttributeValue::S(name.to_string()), "Failed for: {}", name);
    }
}

// ============================================================================
// Number Edge Cases
// ============================================================================

#[test]
fn integer_boundaries() {
    let schema = create_test_schema();
    for n in [i64::MIN, -1, 0, 1, i64::MAX] {
        let item = codec::to_item(
            &schema,
            &obj(json!({"id": "a", "name": "n", "count": n})),
            &ConformSettings::save(),
        )
        .unwrap();
        assert_eq!(item["count"], AttributeValue::N(n.to_string()));
        let doc = codec::from_item(&schema, &item, &ReadSettings::full(), chrono::Utc::now())
            .unwrap()
            .unwrap();
        assert_eq!(doc.get("count"), Some(&Value::from(n)));
    }
}

#[test]
fn large_unsigned_number() {
    let value = Value::from(u64::MAX);
    let av = AttributeType::Number.to_wire("n", &value).unwrap();
    assert_eq!(av, AttributeValue::N(u64::MAX.to_string()));
    assert_eq!(AttributeType::Number.from_wire("n", &av).unwrap(), value);
}

// ============================================================================
// Null Edge Cases
// ============================================================================

#[test]
fn null_kept_when_type_allows_it() {
    let schema = create_test_schema();
    let item = codec::to_item(
        &schema,
        &obj(json!({"id": "a", "name": "n", "flag": null, "count": null})),
        &ConformSettings::save(),
    )
    .unwrap();
    assert_eq!(item["flag"], AttributeValue::Null(true));
    assert!(!item.contains_key("count"));
}

#[test]
fn explicit_absent_set_becomes_remove() {
    let schema = create_test_schema();
    let plan = compile(
        &schema,
        &[UpdateOp::Set("count".into(), UpdateValue::Absent)],
        0,
    )
    .unwrap();
    assert_eq!(plan.update_expression, "REMOVE #a0");
}

// ============================================================================
// Nested Data Edge Cases
// ============================================================================

#[test]
fn deeply_nested_map() {
    let schema = create_test_schema();
    let data = json!({"level1": {"level2": {"level3": {"level4": {"value": "deep"}}}}});
    let item = codec::to_item(
        &schema,
        &obj(json!({"id": "a", "name": "n", "data": data})),
        &ConformSettings::save(),
    )
    .unwrap();
    let doc = codec::from_item(&schema, &item, &ReadSettings::full(), chrono::Utc::now())
        .unwrap()
        .unwrap();
    assert_eq!(doc.get("data").unwrap().to_json(), data);
}

#[test]
fn mixed_list_round_trip() {
    let schema = Schema::new(vec![
        Attribute::new("id", AttributeType::String),
        Attribute::new("items", AttributeType::list()),
    ])
    .unwrap();
    let items = json!([1, "two", true, null, {"five": 5}, [6]]);
    let item = codec::to_item(
        &schema,
        &obj(json!({"id": "a", "items": items})),
        &ConformSettings::save(),
    )
    .unwrap();
    let doc = codec::from_item(&schema, &item, &ReadSettings::full(), chrono::Utc::now())
        .unwrap()
        .unwrap();
    assert_eq!(doc.get("items").unwrap().to_json(), items);
}

// ============================================================================
// Set Edge Cases
// ============================================================================

#[test]
fn empty_set_cannot_be_written() {
    let schema = Schema::new(vec![
        Attribute::new("id", AttributeType::String),
        Attribute::new("tags", AttributeType::set(AttributeType::String)),
    ])
    .unwrap();
    let mut object = obj(json!({"id": "a"}));
    object.insert("tags".into(), Value::Set(vec![]));
    let err = codec::to_item(&schema, &object, &ConformSettings::save()).unwrap_err();
    assert!(matches!(err, Error::TypeMismatch { attribute, .. } if attribute == "tags"));
}

#[test]
fn date_set_stored_as_numbers() {
    let ty = AttributeType::set(AttributeType::date());
    let value = Value::Set(vec![
        Value::date_millis(1_000).unwrap(),
        Value::date_millis(2_000).unwrap(),
    ]);
    let av = ty.to_wire("when", &value).unwrap();
    assert_eq!(av, AttributeValue::Ns(vec!["1000".into(), "2000".into()]));
    assert_eq!(ty.from_wire("when", &av).unwrap(), value);
}

// ============================================================================
// Schema Selection Edge Cases
// ============================================================================

#[test]
fn selection_with_single_schema() {
    let schemas = vec![create_test_schema()];
    assert_eq!(select_schema(&schemas, &Object::new()), 0);
}

#[test]
fn selection_prefers_saving_unknowns() {
    let strict = Schema::new(vec![Attribute::new("id", AttributeType::String)]).unwrap();
    let open = strict.clone().with_save_unknown(SaveUnknown::All);
    let schemas = vec![strict, open];
    assert_eq!(select_schema(&schemas, &obj(json!({"id": "a", "x": 1}))), 1);
    assert_eq!(select_schema(&schemas, &obj(json!({"id": "a"}))), 0);
}

// ============================================================================
// Update Compiler Edge Cases
// ============================================================================

#[test]
fn empty_update_compiles_to_nothing() {
    let plan = compile(&create_test_schema(), &[], 0).unwrap();
    assert!(plan.is_empty());
    assert!(plan.names.is_empty());
    assert!(plan.values.is_empty());
}

#[test]
fn condition_then_update_share_counter() {
    let schema = create_test_schema();
    let condition = Filter::new().eq("name", "old").render(0).unwrap();
    let plan = compile(
        &schema,
        &UpdateOp::parse(&obj(json!({"name": "new"}))).unwrap(),
        condition.next_index,
    )
    .unwrap();
    assert_eq!(condition.expression, "#a0 = :v0");
    assert_eq!(plan.update_expression, "SET #a1 = :v1");
    assert!(plan.names.keys().all(|k| !condition.names.contains_key(k)));
}

#[test]
fn timestamps_refresh_updated_at_on_update() {
    let schema = create_test_schema()
        .with_timestamps(Timestamps::standard())
        .unwrap();
    let plan = compile(&schema, &[UpdateOp::set("count", 1)], 0).unwrap();
    assert_eq!(plan.update_expression, "SET #a0 = :v0, #a1 = :v1");
    assert_eq!(plan.names["#a1"], "updatedAt");
    assert!(matches!(plan.values[":v1"], AttributeValue::N(_)));
}

#[test]
fn update_of_nested_path() {
    let schema = Schema::new(vec![
        Attribute::new("id", AttributeType::String),
        Attribute::new(
            "address",
            AttributeType::map_of(vec![Attribute::new("zip", AttributeType::Number)]),
        ),
    ])
    .unwrap();
    let plan = compile(&schema, &[UpdateOp::set("address.zip", 12345)], 0).unwrap();
    assert_eq!(plan.update_expression, "SET #a0 = :v0");
    assert_eq!(plan.names["#a0"], "address.zip");
    assert_eq!(plan.values[":v0"], AttributeValue::N("12345".into()));
}

// ============================================================================
// Attribute Name Edge Cases
// ============================================================================

#[test]
fn attribute_names_with_special_characters() {
    let schema = Schema::new(vec![
        Attribute::new("id", AttributeType::String),
        Attribute::new("field-with-dash", AttributeType::String),
        Attribute::new("field_with_underscore", AttributeType::String),
        Attribute::new("#hash", AttributeType::String),
    ])
    .unwrap();
    let plan = compile(
        &schema,
        &UpdateOp::parse(&obj(json!({"field-with-dash": "a", "#hash": "b"}))).unwrap(),
        0,
    )
    .unwrap();
    assert_eq!(plan.names["#a0"], "#hash");
    assert_eq!(plan.names["#a1"], "field-with-dash");
}

#[test]
fn dotted_attribute_name_rejected() {
    let err = Schema::new(vec![Attribute::new("a.b", AttributeType::String)]).unwrap_err();
    assert!(matches!(err, Error::InvalidParameter(_)));
}
