//! Unit tests for the destination-state crate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use serde_json::json;
use typedupe_core::testing::MemoryDatabase;
use typedupe_core::{JsonRow, StandardNameTransformer, StreamDescriptor, StreamId};

use crate::{
    fold_destination_states, DestinationState, DestinationStateStore, MemoryStateStore,
    MinimumDestinationState, SqlStateStore, StoredDestinationState,
};

fn stream_id(namespace: Option<&str>, name: &str) -> StreamId {
    StreamId::build(
        &StandardNameTransformer,
        namespace,
        name,
        "public",
        "airbyte_internal",
    )
}

fn row(value: serde_json::Value) -> JsonRow {
    value.as_object().cloned().unwrap()
}

fn stored(name: &str, state: &str, second: Option<u32>) -> StoredDestinationState {
    StoredDestinationState {
        name: name.to_string(),
        namespace: Some("public".to_string()),
        state: Some(state.to_string()),
        updated_at: second.map(|s| Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, s).unwrap()),
    }
}

const RESET: &str = r#"{"needsSoftReset":true}"#;
const NO_RESET: &str = r#"{"needsSoftReset":false}"#;

// ============================================================================
// State decoding
// ============================================================================

#[test]
fn test_minimum_state_decoding_never_fails() {
    assert_eq!(
        MinimumDestinationState::from_stored(None),
        MinimumDestinationState::default()
    );
    assert_eq!(
        MinimumDestinationState::from_stored(Some("not json")),
        MinimumDestinationState::default()
    );
    assert_eq!(
        MinimumDestinationState::from_stored(Some("{}")),
        MinimumDestinationState::default()
    );
    assert!(MinimumDestinationState::from_stored(Some(RESET)).needs_soft_reset());
}

#[test]
fn test_minimum_state_stored_form() {
    let state = MinimumDestinationState::default().with_soft_reset(true);
    assert_eq!(state.to_stored(), RESET);
    assert_eq!(
        MinimumDestinationState::from_stored(Some(&state.to_stored())),
        state
    );
}

// ============================================================================
// Row parsing and folding
// ============================================================================

#[test]
fn test_from_row_is_case_insensitive() {
    let parsed = StoredDestinationState::from_row(&row(json!({
        "NAME": "users",
        "Namespace": "public",
        "DESTINATION_STATE": RESET,
        "UPDATED_AT": "2024-01-01T00:00:05.123456+00:00",
    })))
    .unwrap();

    assert_eq!(parsed.name, "users");
    assert_eq!(parsed.namespace.as_deref(), Some("public"));
    assert_eq!(parsed.state.as_deref(), Some(RESET));
    assert!(parsed.updated_at.is_some());
}

#[test]
fn test_from_row_requires_name() {
    assert!(StoredDestinationState::from_row(&row(json!({"namespace": "public"}))).is_none());
}

#[test]
fn test_fold_keeps_most_recent_row() {
    let rows = vec![
        stored("users", NO_RESET, Some(5)),
        stored("users", RESET, Some(9)),
        stored("users", NO_RESET, Some(1)),
        stored("users", NO_RESET, None),
        stored("orders", "garbage", Some(3)),
    ];
    let folded: HashMap<StreamDescriptor, MinimumDestinationState> =
        fold_destination_states(rows);

    assert_eq!(folded.len(), 2);
    let users = StreamDescriptor::new("users", Some("public".to_string()));
    assert!(folded[&users].needs_soft_reset);
    let orders = StreamDescriptor::new("orders", Some("public".to_string()));
    assert_eq!(folded[&orders], MinimumDestinationState::default());
}

// ============================================================================
// SqlStateStore
// ============================================================================

#[tokio::test]
async fn test_sql_store_reads_and_folds() {
    let db = Arc::new(MemoryDatabase::new().with_rows(
        "_airbyte_destination_state",
        vec![
            row(json!({
                "name": "users", "namespace": "public",
                "destination_state": NO_RESET,
                "updated_at": "2024-01-01T00:00:01+00:00",
            })),
            row(json!({
                "name": "users", "namespace": "public",
                "destination_state": RESET,
                "updated_at": "2024-01-01T00:00:02+00:00",
            })),
        ],
    ));
    let store = SqlStateStore::new(db.clone(), "airbyte_internal");

    let states: HashMap<StreamDescriptor, MinimumDestinationState> = store.read_all().await;
    assert_eq!(states.len(), 1);
    assert!(states[&StreamDescriptor::new("users", Some("public".to_string()))].needs_soft_reset);

    let committed = db.committed_statements();
    assert_eq!(
        committed[0],
        "CREATE SCHEMA IF NOT EXISTS \"airbyte_internal\""
    );
    assert!(committed[1].starts_with(
        "CREATE TABLE IF NOT EXISTS \"airbyte_internal\".\"_airbyte_destination_state\""
    ));
}

#[tokio::test]
async fn test_sql_store_read_failure_yields_empty_map() {
    let db = Arc::new(MemoryDatabase::new().failing_on("SELECT"));
    let store = SqlStateStore::new(db, "airbyte_internal");

    let states: HashMap<StreamDescriptor, MinimumDestinationState> = store.read_all().await;
    assert!(states.is_empty());
}

#[tokio::test]
async fn test_sql_store_commit_empty_is_noop() {
    let db = Arc::new(MemoryDatabase::new());
    let store = SqlStateStore::new(db.clone(), "airbyte_internal");

    let states: HashMap<StreamId, MinimumDestinationState> = HashMap::new();
    store.commit(&states).await;
    assert!(db.committed().is_empty());
}

#[tokio::test]
async fn test_sql_store_commit_deletes_then_inserts_in_one_transaction() {
    let db = Arc::new(MemoryDatabase::new());
    let store = SqlStateStore::new(db.clone(), "airbyte_internal");

    let mut states = HashMap::new();
    states.insert(
        stream_id(Some("public"), "o'brien"),
        MinimumDestinationState::default().with_soft_reset(true),
    );
    states.insert(stream_id(None, "orders"), MinimumDestinationState::default());
    store.commit(&states).await;

    let committed = db.committed();
    assert_eq!(committed.len(), 1);
    let transaction = &committed[0];
    assert_eq!(transaction.len(), 2);

    assert!(transaction[0]
        .starts_with("DELETE FROM \"airbyte_internal\".\"_airbyte_destination_state\" WHERE "));
    assert!(transaction[0].contains("(\"name\" = 'o''brien' AND \"namespace\" = 'public')"));
    assert!(transaction[0].contains("(\"name\" = 'orders' AND \"namespace\" IS NULL)"));

    assert!(transaction[1].starts_with(
        "INSERT INTO \"airbyte_internal\".\"_airbyte_destination_state\" (\"name\", \"namespace\", \"destination_state\", \"updated_at\") VALUES "
    ));
    assert!(transaction[1].contains("('o''brien', 'public', '{\"needsSoftReset\":true}', '"));
    assert!(transaction[1].contains("('orders', NULL, '{\"needsSoftReset\":false}', '"));
}

#[tokio::test]
async fn test_sql_store_commit_failure_is_swallowed() {
    let db = Arc::new(MemoryDatabase::new().failing_on("INSERT"));
    let store = SqlStateStore::new(db.clone(), "airbyte_internal");

    let mut states = HashMap::new();
    states.insert(stream_id(Some("public"), "users"), MinimumDestinationState::default());
    store.commit(&states).await;

    assert!(db.committed().is_empty());
}

// ============================================================================
// MemoryStateStore
// ============================================================================

#[tokio::test]
async fn test_memory_store_commit_replaces_duplicates() {
    let store = MemoryStateStore::with_rows(vec![
        stored("users", NO_RESET, Some(1)),
        stored("users", NO_RESET, Some(2)),
        stored("orders", NO_RESET, Some(1)),
    ]);

    let mut states = HashMap::new();
    states.insert(
        stream_id(Some("public"), "users"),
        MinimumDestinationState::default().with_soft_reset(true),
    );
    states.insert(stream_id(Some("public"), "orders"), MinimumDestinationState::default());
    store.commit(&states).await;

    assert_eq!(store.rows().len(), 2);
    let read: HashMap<StreamDescriptor, MinimumDestinationState> = store.read_all().await;
    assert!(read[&StreamDescriptor::new("users", Some("public".to_string()))].needs_soft_reset);
}
