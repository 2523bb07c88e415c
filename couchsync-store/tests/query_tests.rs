use couchsync_store::{QueryError, StoreQuery, with_reserved_fields};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;

// ── Parsing ─────────────────────────────────────────────────────

#[test]
fn bare_selector_gets_reserved_projection() {
    let query = StoreQuery::parse(r#"{"genre": "scifi"}"#).unwrap();
    assert_eq!(query.selector, json!({"genre": "scifi"}));
    assert_eq!(query.fields, vec!["_id", "_rev"]);
    assert_eq!(query.limit, None);
}

#[test]
fn full_find_body_keeps_fields_limit_and_options() {
    let text = r#"{
        "selector": {"year": {"$gt": 1990}},
        "fields": ["title", "_id"],
        "limit": 25,
        "sort": [{"year": "asc"}]
    }"#;
    let query = StoreQuery::parse(text).unwrap();
    assert_eq!(query.selector, json!({"year": {"$gt": 1990}}));
    assert_eq!(query.fields, vec!["title", "_id", "_rev"]);
    assert_eq!(query.limit, Some(25));
    assert_eq!(query.options.get("sort"), Some(&json!([{"year": "asc"}])));
}

#[test]
fn serialized_body_flattens_options() {
    let query = StoreQuery::parse(r#"{"selector": {}, "skip": 10}"#).unwrap();
    let body = serde_json::to_value(&query).unwrap();
    assert_eq!(
        body,
        json!({"fields": ["_id", "_rev"], "selector": {}, "skip": 10})
    );
}

#[test]
fn invalid_json_is_rejected() {
    assert!(matches!(StoreQuery::parse("{not json"), Err(QueryError::Json(_))));
}

#[test]
fn non_object_is_rejected() {
    assert!(matches!(StoreQuery::parse("[1, 2]"), Err(QueryError::NotAnObject)));
}

#[test]
fn bad_fields_and_limit_are_rejected() {
    assert!(matches!(
        StoreQuery::parse(r#"{"selector": {}, "fields": [1]}"#),
        Err(QueryError::InvalidFields)
    ));
    assert!(matches!(
        StoreQuery::parse(r#"{"selector": {}, "limit": -3}"#),
        Err(QueryError::InvalidLimit)
    ));
}

#[test]
fn zero_limit_means_unbounded() {
    let query = StoreQuery::parse(r#"{"selector": {}, "limit": 0}"#).unwrap();
    assert_eq!(query.limit, None);
}

// ── Limits ──────────────────────────────────────────────────────

#[test]
fn with_limit_overrides_only_when_positive() {
    let query = StoreQuery::match_all().with_limit(Some(5));
    assert_eq!(query.limit, Some(5));
    assert_eq!(query.clone().with_limit(Some(0)).limit, Some(5));
    assert_eq!(query.with_limit(None).limit, Some(5));
}

#[test]
fn default_limit_does_not_override_explicit_one() {
    let explicit = StoreQuery::match_all().with_limit(Some(7)).with_default_limit(100);
    assert_eq!(explicit.limit, Some(7));
    let defaulted = StoreQuery::match_all().with_default_limit(100);
    assert_eq!(defaulted.limit, Some(100));
}

// ── Properties ──────────────────────────────────────────────────

fn field_name() -> impl Strategy<Value = String> {
    prop_oneof![
        Just("_id".to_string()),
        Just("_rev".to_string()),
        "[a-z]{1,6}",
    ]
}

proptest! {
    #[test]
    fn reserved_fields_appear_exactly_once(fields in prop::collection::vec(field_name(), 0..12)) {
        let out = with_reserved_fields(fields);
        prop_assert_eq!(out.iter().filter(|f| *f == "_id").count(), 1);
        prop_assert_eq!(out.iter().filter(|f| *f == "_rev").count(), 1);
        let mut deduped = out.clone();
        deduped.sort();
        deduped.dedup();
        prop_assert_eq!(deduped.len(), out.len());
    }

    #[test]
    fn normalization_is_idempotent(
        fields in prop::collection::vec(field_name(), 0..12),
        limit in prop::option::of(0u32..50),
    ) {
        let once = StoreQuery::new(json!({}), fields, limit);
        let twice = once.clone().normalized();
        prop_assert_eq!(once, twice);
    }

    #[test]
    fn caller_field_order_is_preserved(fields in prop::collection::vec("[a-z]{1,6}", 0..8)) {
        let out = with_reserved_fields(fields.clone());
        let mut seen = Vec::new();
        for f in fields {
            if !seen.contains(&f) {
                seen.push(f);
            }
        }
        prop_assert_eq!(&out[..seen.len()], &seen[..]);
    }
}
