use couchsync_engine::write::{named_payload, resolve_key};
use couchsync_engine::{
    AUTO_GENERATE_KEY, EngineConfig, EngineError, FixedStore, Plugin, PrepareWriteRequest,
    ReplicationTarget, WriteCoordinator, WriteOutcome, WriteSummary,
};
use couchsync_store::RevisionStore;
use couchsync_store::mock::{MemoryStore, StoreCall};
use couchsync_types::{
    Document, FieldValue, Property, PropertyType, RecordAck, RecordAction, Schema, WriteRecord,
};
use futures::stream;
use pretty_assertions::assert_eq;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

const SETTINGS: &str =
    r#"{"Hostname": "localhost:5984", "Username": "u", "Password": "p", "DatabaseName": "source"}"#;

fn doc(value: Value) -> Document {
    Document::from_json_value(value).unwrap()
}

fn schema() -> Schema {
    Schema::new("books", "Books", r#"{"selector": {}}"#)
        .with_property(Property::new("p_isbn", "isbn", PropertyType::String))
        .with_property(Property::new("p_title", "title", PropertyType::String))
}

fn record(id: &str, data: Value) -> WriteRecord {
    WriteRecord::new(id, format!("corr-{id}"), doc(data))
}

async fn prepared_plugin(
    store: Arc<MemoryStore>,
    target: ReplicationTarget,
    commit_sla_seconds: u64,
    config: EngineConfig,
) -> Plugin {
    let plugin = Plugin::with_connector(config, Arc::new(FixedStore::new(store)));
    assert!(plugin.connect(SETTINGS).await.is_connected());
    plugin
        .prepare_write(PrepareWriteRequest {
            schema: schema(),
            commit_sla_seconds,
            replication: Some(target),
        })
        .await
        .unwrap();
    plugin
}

async fn write_all(plugin: &Plugin, records: Vec<WriteRecord>) -> (WriteSummary, Vec<RecordAck>) {
    let (tx, mut rx) = mpsc::channel(64);
    let summary = plugin
        .write_stream(stream::iter(records), tx)
        .await
        .unwrap();
    let mut acks = Vec::new();
    while let Some(ack) = rx.recv().await {
        acks.push(ack);
    }
    (summary, acks)
}

fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("couchsync_engine=debug")
        .with_test_writer()
        .try_init();
}

fn store_with_target() -> Arc<MemoryStore> {
    Arc::new(MemoryStore::new().with_database("source"))
}

// ── Payload and key ─────────────────────────────────────────────

#[test]
fn payload_is_renamed_and_filtered() {
    let data = doc(json!({
        "p_title": "Dune",
        "p_isbn": null,
        "unknown": 1,
        "_rev": "9-x"
    }));
    let named = named_payload(&schema(), &data);
    assert_eq!(named.to_json_value(), json!({"title": "Dune"}));
}

#[test]
fn payload_follows_schema_order() {
    let data = doc(json!({"p_title": "Dune", "p_isbn": "0441"}));
    let named = named_payload(&schema(), &data);
    assert_eq!(named.keys().collect::<Vec<_>>(), vec!["isbn", "title"]);
}

#[test]
fn reserved_names_are_stripped_from_payload() {
    let schema = Schema::new("s", "S", "{}")
        .with_property(Property::new("id", "_id", PropertyType::String))
        .with_property(Property::new("t", "title", PropertyType::String));
    let named = named_payload(&schema, &doc(json!({"id": "k", "t": "x"})));
    assert_eq!(named.to_json_value(), json!({"title": "x"}));
}

#[test]
fn key_from_auto_generate_uses_record_id() {
    let target = ReplicationTarget::new("target", AUTO_GENERATE_KEY);
    let key = resolve_key(&target, &record("r-17", json!({}))).unwrap();
    assert_eq!(key, "r-17");
}

#[test]
fn key_from_property_uses_its_string_form() {
    let target = ReplicationTarget::new("target", "p_isbn");
    let key = resolve_key(&target, &record("r1", json!({"p_isbn": 441172717}))).unwrap();
    assert_eq!(key, "441172717");
}

#[test]
fn missing_or_empty_key_is_an_error() {
    let target = ReplicationTarget::new("target", "p_isbn");
    for data in [json!({}), json!({"p_isbn": null}), json!({"p_isbn": ""})] {
        let err = resolve_key(&target, &record("r1", data)).unwrap_err();
        assert!(matches!(err, EngineError::MissingPrimaryKey(ref id) if id == "p_isbn"));
    }
}

#[test]
fn target_database_strips_whitespace() {
    let target = ReplicationTarget::new(" my db ", AUTO_GENERATE_KEY);
    assert_eq!(target.database(), "mydb");
}

// ── Coordinator ─────────────────────────────────────────────────

#[tokio::test]
async fn write_creates_missing_document() {
    let store = Arc::new(MemoryStore::new().with_database("target"));
    let coordinator = WriteCoordinator::new(
        store.clone(),
        schema(),
        ReplicationTarget::new("target", AUTO_GENERATE_KEY),
    );

    let outcome = coordinator
        .write(&record("k1", json!({"p_title": "Dune"})))
        .await
        .unwrap();

    assert!(matches!(outcome, WriteOutcome::Created { ref key, .. } if key == "k1"));
    assert_eq!(store.call_count(StoreCall::Get), 1);
    assert_eq!(store.call_count(StoreCall::Create), 1);
    let stored = store.document("target", "k1").unwrap();
    assert_eq!(stored.get("title"), Some(&FieldValue::from("Dune")));
}

#[tokio::test]
async fn empty_payload_for_missing_document_is_a_no_op() {
    let store = Arc::new(MemoryStore::new().with_database("target"));
    let coordinator = WriteCoordinator::new(
        store.clone(),
        schema(),
        ReplicationTarget::new("target", AUTO_GENERATE_KEY),
    );

    let outcome = coordinator.write(&record("k1", json!({}))).await.unwrap();
    assert_eq!(outcome, WriteOutcome::Skipped { key: "k1".into() });
    assert_eq!(store.calls(), vec![StoreCall::Get]);
}

#[tokio::test]
async fn lost_revision_race_is_a_conflict() {
    let store = Arc::new(MemoryStore::new());
    store.insert_document("target", "k1", doc(json!({"title": "Old"})));
    store.fail_with_status(StoreCall::Update, 409);
    let coordinator = WriteCoordinator::new(
        store.clone(),
        schema(),
        ReplicationTarget::new("target", AUTO_GENERATE_KEY),
    );

    let err = coordinator
        .write(&record("k1", json!({"p_title": "New"})))
        .await
        .unwrap_err();
    assert!(err.is_conflict());
    assert_eq!(err.to_string(), "revision conflict on document k1");
}

#[tokio::test]
async fn action_tag_does_not_drive_behaviour() {
    let store = Arc::new(MemoryStore::new().with_database("target"));
    let coordinator = WriteCoordinator::new(
        store.clone(),
        schema(),
        ReplicationTarget::new("target", AUTO_GENERATE_KEY),
    );

    let tagged = record("k1", json!({"p_title": "Dune"})).with_action(RecordAction::Delete);
    let outcome = coordinator.write(&tagged).await.unwrap();
    assert!(matches!(outcome, WriteOutcome::Created { .. }));
}

// ── Write stream scenarios ──────────────────────────────────────

#[tokio::test]
async fn new_key_is_created() {
    let store = store_with_target();
    let target = ReplicationTarget::new("target", AUTO_GENERATE_KEY);
    let plugin = prepared_plugin(store.clone(), target, 30, EngineConfig::default()).await;
    let creates_before = store.call_count(StoreCall::Create);

    let (summary, acks) = write_all(&plugin, vec![record("k1", json!({"p_title": "Dune"}))]).await;

    assert_eq!(acks, vec![RecordAck::success("corr-k1")]);
    assert_eq!(summary.written, 1);
    assert_eq!(store.call_count(StoreCall::Create) - creates_before, 1);
}

#[tokio::test]
async fn existing_key_with_empty_payload_is_deleted() {
    let store = store_with_target();
    let rev = store.insert_document("target", "k1", doc(json!({"title": "Dune"})));
    let target = ReplicationTarget::new("target", AUTO_GENERATE_KEY);
    let plugin = prepared_plugin(store.clone(), target, 30, EngineConfig::default()).await;

    let (_, acks) = write_all(&plugin, vec![record("k1", json!({"p_title": null}))]).await;

    assert_eq!(acks, vec![RecordAck::success("corr-k1")]);
    assert_eq!(store.call_count(StoreCall::Delete), 1);
    assert!(store.document("target", "k1").is_none());
    assert!(rev.starts_with("1-"));
}

#[tokio::test]
async fn existing_key_with_payload_is_updated_with_fetched_revision() {
    let store = store_with_target();
    store.insert_document("target", "0441", doc(json!({"title": "Old"})));
    let target = ReplicationTarget::new("target", "p_isbn");
    let plugin = prepared_plugin(store.clone(), target, 30, EngineConfig::default()).await;

    let (_, acks) = write_all(
        &plugin,
        vec![record("r1", json!({"p_isbn": "0441", "p_title": "New"}))],
    )
    .await;

    assert_eq!(acks, vec![RecordAck::success("corr-r1")]);
    assert_eq!(store.call_count(StoreCall::Update), 1);
    let stored = store.document("target", "0441").unwrap();
    assert!(stored.rev().unwrap().starts_with("2-"));
    assert_eq!(stored.get("title"), Some(&FieldValue::from("New")));
}

#[tokio::test(start_paused = true)]
async fn slow_write_times_out_and_stream_continues() {
    init_tracing();
    let store = store_with_target();
    store.insert_document("target", "k2", doc(json!({"title": "Old"})));
    store.set_latency(StoreCall::Create, Duration::from_secs(10));
    let target = ReplicationTarget::new("target", AUTO_GENERATE_KEY);
    let plugin = prepared_plugin(store.clone(), target, 1, EngineConfig::default()).await;

    let started = tokio::time::Instant::now();
    let (summary, acks) = write_all(
        &plugin,
        vec![
            record("k1", json!({"p_title": "Slow"})),
            record("k2", json!({"p_title": "Fast"})),
        ],
    )
    .await;

    assert_eq!(
        acks,
        vec![
            RecordAck::failure("corr-k1", "timed out"),
            RecordAck::success("corr-k2"),
        ]
    );
    assert_eq!(summary.timed_out, 1);
    assert_eq!(summary.written, 1);
    assert!(started.elapsed() < Duration::from_secs(2));
    // The timed-out create was cancelled before it reached the store.
    assert!(store.document("target", "k1").is_none());
}

#[tokio::test]
async fn per_record_failures_do_not_stop_the_stream() {
    let store = store_with_target();
    let target = ReplicationTarget::new("target", "p_isbn");
    let plugin = prepared_plugin(store.clone(), target, 30, EngineConfig::default()).await;

    let (summary, acks) = write_all(
        &plugin,
        vec![
            record("r1", json!({"p_title": "No key"})),
            record("r2", json!({"p_isbn": "0002", "p_title": "Fine"})),
        ],
    )
    .await;

    assert_eq!(acks.len(), 2);
    assert_eq!(
        acks[0].error,
        "record has no value for primary key property p_isbn"
    );
    assert!(acks[1].is_success());
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.written, 1);
}

#[tokio::test(start_paused = true)]
async fn pipelined_writes_ack_in_input_order() {
    let store = store_with_target();
    store.set_latency(StoreCall::Get, Duration::from_millis(50));
    let target = ReplicationTarget::new("target", AUTO_GENERATE_KEY);
    let config = EngineConfig {
        max_in_flight_writes: 4,
        ..Default::default()
    };
    let plugin = prepared_plugin(store.clone(), target, 30, config).await;

    let records: Vec<_> = (0..10)
        .map(|i| record(&format!("k{i}"), json!({"p_title": format!("t{i}")})))
        .collect();
    let expected: Vec<_> = records.iter().map(|r| r.correlation_id.clone()).collect();

    let (summary, acks) = write_all(&plugin, records).await;

    let got: Vec<_> = acks.iter().map(|a| a.correlation_id.clone()).collect();
    assert_eq!(got, expected);
    assert_eq!(summary.written, 10);
    assert_eq!(store.document_count("target"), 10);
}

// ── Preparation and fatal conditions ────────────────────────────

#[tokio::test]
async fn prepare_write_creates_target_database() {
    let store = store_with_target();
    let target = ReplicationTarget::new(" new target ", AUTO_GENERATE_KEY);
    let _plugin = prepared_plugin(store.clone(), target, 30, EngineConfig::default()).await;
    assert!(store.has_database("newtarget"));
}

#[tokio::test]
async fn prepare_write_accepts_existing_database() {
    let store = Arc::new(MemoryStore::new().with_database("source").with_database("target"));
    let target = ReplicationTarget::new("target", AUTO_GENERATE_KEY);
    let plugin = prepared_plugin(store.clone(), target, 30, EngineConfig::default()).await;
    assert!(plugin.context().await.is_write_configured());
}

#[tokio::test]
async fn prepare_write_surfaces_store_failure() {
    let store = store_with_target();
    store.fail_with_status(StoreCall::CreateDatabase, 401);
    let plugin = Plugin::with_connector(EngineConfig::default(), Arc::new(FixedStore::new(store)));
    assert!(plugin.connect(SETTINGS).await.is_connected());

    let err = plugin
        .prepare_write(PrepareWriteRequest {
            schema: schema(),
            commit_sla_seconds: 30,
            replication: Some(ReplicationTarget::new("target", AUTO_GENERATE_KEY)),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::Store(_)));
    assert!(!plugin.context().await.is_write_configured());
}

#[tokio::test]
async fn standard_write_mode_is_fatal() {
    let store = store_with_target();
    let plugin = Plugin::with_connector(EngineConfig::default(), Arc::new(FixedStore::new(store)));
    assert!(plugin.connect(SETTINGS).await.is_connected());
    plugin
        .prepare_write(PrepareWriteRequest {
            schema: schema(),
            commit_sla_seconds: 30,
            replication: None,
        })
        .await
        .unwrap();

    let (tx, _rx) = mpsc::channel(4);
    let err = plugin
        .write_stream(stream::iter(vec![record("k1", json!({}))]), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::UnsupportedWriteMode));
}

#[tokio::test]
async fn writing_before_prepare_is_fatal() {
    let store = store_with_target();
    let plugin = Plugin::with_connector(EngineConfig::default(), Arc::new(FixedStore::new(store)));
    assert!(plugin.connect(SETTINGS).await.is_connected());

    let (tx, _rx) = mpsc::channel(4);
    let err = plugin
        .write_stream(stream::iter(Vec::<WriteRecord>::new()), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::WriteNotConfigured));
}

#[tokio::test]
async fn closed_ack_channel_ends_stream() {
    let store = store_with_target();
    let target = ReplicationTarget::new("target", AUTO_GENERATE_KEY);
    let plugin = prepared_plugin(store.clone(), target, 30, EngineConfig::default()).await;

    let (tx, rx) = mpsc::channel(4);
    drop(rx);
    let err = plugin
        .write_stream(stream::iter(vec![record("k1", json!({"p_title": "x"}))]), tx)
        .await
        .unwrap_err();
    assert!(matches!(err, EngineError::ChannelClosed));
}

#[tokio::test]
async fn store_trait_object_is_usable_directly() {
    let store: Arc<dyn RevisionStore> = Arc::new(MemoryStore::new().with_database("target"));
    let coordinator = WriteCoordinator::new(
        store.clone(),
        schema(),
        ReplicationTarget::new("target", AUTO_GENERATE_KEY),
    );
    assert_eq!(coordinator.database(), "target");
    coordinator
        .write(&record("k1", json!({"p_title": "Dune"})))
        .await
        .unwrap();
    assert!(store.get("target", "k1").await.unwrap().is_some());
}
