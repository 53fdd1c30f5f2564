//! Destination handler: initial state gathering and plan execution.
//!
//! The handler is the only part of the engine that talks to the destination.
//! It reads what each stream's tables look like at the start of a sync, runs
//! `Sql` plans as transactions, and hands final states to the state store.

mod error;


use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use chrono::TimeDelta;
use futures::future::{try_join_all, FutureExt};
use tracing::{debug, error, info};
use uuid::Uuid;

use destination_state::{DestinationState, DestinationStateStore};
use typedupe_core::columns::{EXTRACTED_AT, LOADED_AT};
use typedupe_core::{
    DestinationDatabase, DestinationInitialStatus, InitialRawTableStatus, Sql, StreamConfig,
    StreamDescriptor, StreamId,
};
use typedupe_sql::{existing_schema_matches_stream_config, SqlDialect};

pub use error::HandlerError;

/// Margin subtracted from the oldest unprocessed `_airbyte_extracted_at`
/// so that timestamp precision loss between writer and destination cannot
/// hide a record from the next run.
const RAW_TIMESTAMP_SAFETY_MARGIN_SECONDS: i64 = 1;

pub struct DestinationHandler<D, S> {
    database: Arc<dyn DestinationDatabase>,
    dialect: D,
    state_store: Arc<dyn DestinationStateStore<S>>,
}

impl<D, S> DestinationHandler<D, S>
where
    D: SqlDialect,
    S: DestinationState,
{
    pub fn new(
        database: Arc<dyn DestinationDatabase>,
        dialect: D,
        state_store: Arc<dyn DestinationStateStore<S>>,
    ) -> Self {
        Self {
            database,
            dialect,
            state_store,
        }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    /// Determine each stream's starting point for this sync.
    ///
    /// The state table is read once and shared by every stream; the streams
    /// themselves are inspected concurrently. The first failing stream fails
    /// the whole call.
    pub async fn gather_initial_state(
        &self,
        streams: &[StreamConfig],
    ) -> Result<Vec<DestinationInitialStatus<S>>, HandlerError> {
        let store = self.state_store.clone();
        let states = async move { Arc::new(store.read_all().await) }
            .boxed()
            .shared();

        let per_stream = streams.iter().map(|stream| {
            let states = states.clone();
            async move {
                let states = states.await;
                self.initial_status(stream, &states)
                    .await
                    .map_err(|source| HandlerError::InitialState {
                        stream: stream.id.to_string(),
                        source,
                    })
            }
        });

        try_join_all(per_stream).await
    }

    async fn initial_status(
        &self,
        stream: &StreamConfig,
        states: &HashMap<StreamDescriptor, S>,
    ) -> Result<DestinationInitialStatus<S>> {
        let id = &stream.id;
        let existing = self
            .database
            .find_existing_table(&id.final_namespace, &id.final_name)
            .await?;

        let (is_final_table_present, is_schema_mismatch, is_final_table_empty) = match existing {
            Some(table) => (
                true,
                !existing_schema_matches_stream_config(&self.dialect, stream, &table),
                self.is_final_table_empty(id).await?,
            ),
            None => (false, false, true),
        };

        let initial_raw_table_status = self.initial_raw_table_status(id).await?;
        let destination_state = states.get(&id.descriptor()).cloned().unwrap_or_default();

        debug!(
            "Stream {id}: final table present={is_final_table_present}, \
             schema mismatch={is_schema_mismatch}, empty={is_final_table_empty}, \
             raw status={initial_raw_table_status:?}"
        );

        Ok(DestinationInitialStatus {
            stream_config: stream.clone(),
            is_final_table_present,
            initial_raw_table_status,
            is_schema_mismatch,
            is_final_table_empty,
            destination_state,
        })
    }

    /// Probe the raw table for the checkpoint of the next typing and
    /// deduping run.
    ///
    /// With unprocessed rows, the checkpoint sits just before the oldest of
    /// them. Otherwise it is the newest row ever written, or absent when
    /// the table is empty or missing.
    pub async fn initial_raw_table_status(&self, id: &StreamId) -> Result<InitialRawTableStatus> {
        if !self
            .database
            .table_exists(&id.raw_namespace, &id.raw_name)
            .await?
        {
            return Ok(InitialRawTableStatus::default());
        }

        let raw_table = self.dialect.quoted_table(&id.raw_namespace, &id.raw_name);
        let extracted_at = self.dialect.quote_identifier(EXTRACTED_AT);
        let loaded_at = self.dialect.quote_identifier(LOADED_AT);

        let oldest_unprocessed = self
            .database
            .query_timestamp(&format!(
                "SELECT MIN({extracted_at}) FROM {raw_table} WHERE {loaded_at} IS NULL"
            ))
            .await?;
        if let Some(oldest) = oldest_unprocessed {
            return Ok(InitialRawTableStatus {
                raw_table_exists: true,
                has_unprocessed_records: true,
                max_processed_timestamp: Some(
                    oldest - TimeDelta::seconds(RAW_TIMESTAMP_SAFETY_MARGIN_SECONDS),
                ),
            });
        }

        let newest = self
            .database
            .query_timestamp(&format!("SELECT MAX({extracted_at}) FROM {raw_table}"))
            .await?;
        Ok(InitialRawTableStatus {
            raw_table_exists: true,
            has_unprocessed_records: false,
            max_processed_timestamp: newest,
        })
    }

    async fn is_final_table_empty(&self, id: &StreamId) -> Result<bool> {
        let final_table = self.dialect.quoted_table(&id.final_namespace, &id.final_name);
        let has_rows = self
            .database
            .query_bool(&format!(
                "SELECT EXISTS (SELECT 1 FROM {final_table} LIMIT 1)"
            ))
            .await?;
        Ok(!has_rows)
    }

    /// Run each transaction of `sql` in order, stopping at the first failure.
    pub async fn execute(&self, sql: &Sql) -> Result<(), HandlerError> {
        if sql.is_empty() {
            return Ok(());
        }

        let query_id = Uuid::new_v4();
        for transaction in &sql.transactions {
            let id = format!("{query_id}-{}", Uuid::new_v4());
            info!("Executing sql {id}: {}", transaction.join("\n"));
            let started = Instant::now();

            if let Err(source) = self.database.execute_within_transaction(transaction).await {
                error!("Sql {id} failed: {source:#}");
                return Err(HandlerError::Execution { id, source });
            }

            info!(
                "Sql {id} completed in {} ms",
                started.elapsed().as_millis()
            );
        }
        Ok(())
    }

    /// Persist final states. Never fails; see `DestinationStateStore::commit`.
    pub async fn commit_destination_states(&self, states: &HashMap<StreamId, S>) {
        self.state_store.commit(states).await;
    }
}
