use couchsync_types::{
    Document, Property, PropertyType, RecordAck, RecordAction, Schema, SessionId, WriteRecord,
    is_reserved_field,
};

// ── Schema / Property ────────────────────────────────────────────

#[test]
fn discovered_property_has_default_flags() {
    let p = Property::discovered("title", PropertyType::String);
    assert_eq!(p.id, "title");
    assert_eq!(p.name, "title");
    assert!(!p.is_key);
    assert!(!p.is_create_counter);
    assert!(!p.is_update_counter);
}

#[test]
fn schema_lookup_by_id_and_names() {
    let schema = Schema::new("s1", "Books", r#"{"selector":{}}"#)
        .with_property(Property::new("p_title", "title", PropertyType::String))
        .with_property(Property::new("p_year", "year", PropertyType::Integer).key());

    assert!(schema.has_properties());
    assert!(schema.has_query());
    assert_eq!(schema.property_by_id("p_year").unwrap().name, "year");
    assert!(schema.property_by_id("year").is_none());
    assert_eq!(schema.property_names(), vec!["title", "year"]);
}

#[test]
fn whitespace_query_is_not_a_query() {
    let schema = Schema::new("s", "s", "   \n");
    assert!(!schema.has_query());
}

#[test]
fn property_type_serializes_with_type_key() {
    let p = Property::discovered("n", PropertyType::Datetime);
    let json = serde_json::to_value(&p).unwrap();
    assert_eq!(json["type"], "Datetime");
}

#[test]
fn priority_starts_with_bool_and_ends_with_string() {
    assert_eq!(PropertyType::PRIORITY[0], PropertyType::Bool);
    assert_eq!(PropertyType::PRIORITY[4], PropertyType::String);
}

#[test]
fn reserved_fields() {
    assert!(is_reserved_field("_id"));
    assert!(is_reserved_field("_rev"));
    assert!(!is_reserved_field("id"));
}

// ── Records ──────────────────────────────────────────────────────

#[test]
fn write_record_defaults_to_upsert() {
    let record = WriteRecord::new("r1", "c1", Document::new());
    assert_eq!(record.action, RecordAction::Upsert);
    let record = record.with_action(RecordAction::Delete);
    assert_eq!(record.action, RecordAction::Delete);
}

#[test]
fn write_record_decodes_from_host_json() {
    let record: WriteRecord = serde_json::from_str(
        r#"{"record_id":"new-id","correlation_id":"test","action":"insert",
            "data":{"_id":"12345","title":"test","_rev":"334432"}}"#,
    )
    .unwrap();
    assert_eq!(record.action, RecordAction::Insert);
    assert_eq!(record.data.len(), 3);
}

#[test]
fn ack_success_and_failure() {
    assert!(RecordAck::success("c").is_success());
    let ack = RecordAck::failure("c", "timed out");
    assert!(!ack.is_success());
    assert_eq!(ack.correlation_id, "c");
}

#[test]
fn session_ids_are_unique_and_parse() {
    let a = SessionId::new();
    let b = SessionId::new();
    assert_ne!(a, b);
    let parsed: SessionId = a.to_string().parse().unwrap();
    assert_eq!(parsed, a);
    assert!("not-a-uuid".parse::<SessionId>().is_err());
}
