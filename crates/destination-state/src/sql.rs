//! Destination state stored in a table of the destination database.

use std::collections::HashMap;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{SecondsFormat, Utc};
use tracing::{debug, warn};
use typedupe_core::columns::DESTINATION_STATE_TABLE;
use typedupe_core::{DestinationDatabase, StreamDescriptor, StreamId};

use crate::state::DestinationState;
use crate::store::DestinationStateStore;
use crate::stored::{fold_destination_states, StoredDestinationState, STATE_COLUMN};

/// `DestinationStateStore` backed by the `_airbyte_destination_state` table.
pub struct SqlStateStore {
    db: Arc<dyn DestinationDatabase>,
    namespace: String,
}

impl SqlStateStore {
    /// Store states in `namespace._airbyte_destination_state`.
    pub fn new(db: Arc<dyn DestinationDatabase>, namespace: impl Into<String>) -> Self {
        Self {
            db,
            namespace: namespace.into(),
        }
    }

    fn table(&self) -> String {
        format!(
            "{}.{}",
            quote(&self.namespace),
            quote(DESTINATION_STATE_TABLE)
        )
    }

    async fn try_read_all(&self) -> Result<Vec<StoredDestinationState>> {
        let table = self.table();
        self.db
            .execute(&format!("CREATE SCHEMA IF NOT EXISTS {}", quote(&self.namespace)))
            .await
            .context("Failed to create destination state schema")?;
        self.db
            .execute(&format!(
                "CREATE TABLE IF NOT EXISTS {table} (\"name\" TEXT, \"namespace\" TEXT, {} TEXT, \"updated_at\" TIMESTAMP WITH TIME ZONE)",
                quote(STATE_COLUMN),
            ))
            .await
            .context("Failed to create destination state table")?;

        let rows = self
            .db
            .query_json_rows(&format!(
                "SELECT \"name\", \"namespace\", {}, \"updated_at\" FROM {table}",
                quote(STATE_COLUMN)
            ))
            .await
            .context("Failed to read destination state table")?;

        Ok(rows.iter().filter_map(StoredDestinationState::from_row).collect())
    }

    async fn try_commit<S: DestinationState>(&self, states: &HashMap<StreamId, S>) -> Result<()> {
        let table = self.table();
        let descriptors: Vec<(StreamDescriptor, &S)> = states
            .iter()
            .map(|(id, state)| (id.descriptor(), state))
            .collect();

        let matches = descriptors
            .iter()
            .map(|(descriptor, _)| {
                let namespace = match &descriptor.namespace {
                    Some(ns) => format!("\"namespace\" = {}", literal(ns)),
                    None => "\"namespace\" IS NULL".to_string(),
                };
                format!("(\"name\" = {} AND {namespace})", literal(&descriptor.name))
            })
            .collect::<Vec<_>>()
            .join(" OR ");

        let updated_at = literal(&Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true));
        let values = descriptors
            .iter()
            .map(|(descriptor, state)| {
                let namespace = descriptor
                    .namespace
                    .as_deref()
                    .map(literal)
                    .unwrap_or_else(|| "NULL".to_string());
                format!(
                    "({}, {namespace}, {}, {updated_at})",
                    literal(&descriptor.name),
                    literal(&state.to_stored())
                )
            })
            .collect::<Vec<_>>()
            .join(", ");

        let statements = vec![
            format!("DELETE FROM {table} WHERE {matches}"),
            format!(
                "INSERT INTO {table} (\"name\", \"namespace\", {}, \"updated_at\") VALUES {values}",
                quote(STATE_COLUMN)
            ),
        ];
        self.db
            .execute_within_transaction(&statements)
            .await
            .context("Failed to commit destination states")
    }
}

#[async_trait]
impl<S: DestinationState> DestinationStateStore<S> for SqlStateStore {
    async fn read_all(&self) -> HashMap<StreamDescriptor, S> {
        match self.try_read_all().await {
            Ok(rows) => {
                debug!("Read {} destination state rows", rows.len());
                fold_destination_states(rows)
            }
            Err(e) => {
                warn!("Failed to read destination states, continuing without them: {e:#}");
                HashMap::new()
            }
        }
    }

    async fn commit(&self, states: &HashMap<StreamId, S>) {
        if states.is_empty() {
            return;
        }
        if let Err(e) = self.try_commit(states).await {
            warn!("Failed to commit destination states: {e:#}");
        }
    }
}

fn quote(identifier: &str) -> String {
    format!("\"{}\"", identifier.replace('"', "\"\""))
}

fn literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}
