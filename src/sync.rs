//! Per-sync orchestration of typing and deduping.
//!
//! A sync runs in three phases:
//!
//! 1. [`TyperDeduper::prepare`] creates namespaces, gathers each stream's
//!    initial status, creates missing final tables, and decides which
//!    streams need a shadow table or a soft reset.
//! 2. [`TyperDeduper::type_and_dedupe`] promotes unprocessed raw rows into
//!    each final table.
//! 3. [`TyperDeduper::commit`] persists the destination states.
//!
//! A soft reset rebuilds a final table from the whole raw table. It is
//! triggered by a final table whose columns no longer match the stream, and
//! is recorded in the destination state before any work starts so that a
//! crashed sync resumes it on the next run.

use std::collections::{BTreeSet, HashMap};
use std::fmt;

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use tracing::{error, info, warn};

use destination_state::DestinationState;
use typedupe_core::columns::TMP_TABLE_SUFFIX;
use typedupe_core::{
    DestinationInitialStatus, DestinationSyncMode, Sql, StreamConfig, StreamId,
};
use typedupe_sql::{SqlDialect, SqlGenerator};

use crate::handler::DestinationHandler;

/// What a sync did to one stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamOutcome {
    /// New raw rows were typed into the final table.
    TypedAndDeduped,
    /// The final table was rebuilt from the whole raw table.
    SoftReset,
    /// Nothing to do: no raw table, or no unprocessed rows.
    Skipped,
}

impl fmt::Display for StreamOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            StreamOutcome::TypedAndDeduped => "typed and deduped",
            StreamOutcome::SoftReset => "soft reset",
            StreamOutcome::Skipped => "skipped",
        };
        write!(f, "{s}")
    }
}

pub struct TyperDeduper<D, S> {
    handler: DestinationHandler<D, S>,
    generator: SqlGenerator<D>,
    streams: Vec<StreamConfig>,
    statuses: Vec<DestinationInitialStatus<S>>,
    /// Final table suffix per overwrite stream that writes to a shadow table.
    overwrite_suffixes: HashMap<StreamId, String>,
    states: HashMap<StreamId, S>,
}

impl<D, S> TyperDeduper<D, S>
where
    D: SqlDialect + Clone,
    S: DestinationState,
{
    pub fn new(handler: DestinationHandler<D, S>, streams: Vec<StreamConfig>) -> Self {
        let generator = SqlGenerator::new(handler.dialect().clone());
        Self {
            handler,
            generator,
            streams,
            statuses: Vec::new(),
            overwrite_suffixes: HashMap::new(),
            states: HashMap::new(),
        }
    }

    pub fn states(&self) -> &HashMap<StreamId, S> {
        &self.states
    }

    pub async fn prepare(&mut self) -> Result<()> {
        let namespaces: BTreeSet<&str> = self
            .streams
            .iter()
            .flat_map(|s| [s.id.final_namespace.as_str(), s.id.raw_namespace.as_str()])
            .collect();
        let create_schemas = Sql::concat(
            namespaces
                .iter()
                .map(|ns| self.generator.create_schema(ns)),
        );
        self.handler
            .execute(&create_schemas)
            .await
            .context("Failed to create namespaces")?;

        self.statuses = self
            .handler
            .gather_initial_state(&self.streams)
            .await
            .context("Failed to gather initial state")?;

        let mut flagged = false;
        for status in &self.statuses {
            let stream = &status.stream_config;
            let id = &stream.id;
            let mut state = status.destination_state.clone();

            if !status.is_final_table_present {
                info!("Creating final table for stream {id}");
                self.handler
                    .execute(&self.generator.create_table(stream, "", false))
                    .await?;
            } else if stream.destination_sync_mode == DestinationSyncMode::Overwrite {
                // without a raw table the stream is skipped, so nothing would swap
                if status.initial_raw_table_status.raw_table_exists
                    && (!status.is_final_table_empty || status.is_schema_mismatch)
                {
                    info!("Stream {id} will be written to a shadow table");
                    self.handler
                        .execute(&self.generator.create_table(stream, TMP_TABLE_SUFFIX, true))
                        .await?;
                    self.overwrite_suffixes
                        .insert(id.clone(), TMP_TABLE_SUFFIX.to_string());
                }
            } else if status.is_schema_mismatch && !state.needs_soft_reset() {
                info!("Final table of stream {id} does not match its columns; scheduling soft reset");
                state = state.with_soft_reset(true);
                flagged = true;
            }

            self.states.insert(id.clone(), state);
        }

        if flagged {
            self.commit().await;
        }
        Ok(())
    }

    /// Type and dedupe every stream, in declaration order.
    ///
    /// Streams are independent: a failing stream does not stop the ones
    /// after it. The first failure is returned once all have been tried.
    pub async fn type_and_dedupe(&mut self) -> Result<Vec<(StreamId, StreamOutcome)>> {
        let mut outcomes = Vec::with_capacity(self.statuses.len());
        let mut first_error = None;
        for index in 0..self.statuses.len() {
            let id = self.statuses[index].stream_config.id.clone();
            match self.type_and_dedupe_stream(index).await {
                Ok(outcome) => {
                    info!("Stream {id}: {outcome}");
                    outcomes.push((id, outcome));
                }
                Err(e) => {
                    error!("Stream {id} failed: {e:#}");
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(outcomes),
        }
    }

    async fn type_and_dedupe_stream(&mut self, index: usize) -> Result<StreamOutcome> {
        let status = &self.statuses[index];
        let stream = status.stream_config.clone();
        let raw_status = status.initial_raw_table_status;
        let id = &stream.id;

        if !raw_status.raw_table_exists {
            warn!("Raw table of stream {id} does not exist; skipping");
            return Ok(StreamOutcome::Skipped);
        }

        let state = self.states.get(id).cloned().unwrap_or_default();
        let shadow_suffix = self.overwrite_suffixes.get(id).cloned();

        if state.needs_soft_reset() && shadow_suffix.is_none() {
            self.soft_reset(&stream).await?;
            self.states.insert(id.clone(), state.with_soft_reset(false));
            return Ok(StreamOutcome::SoftReset);
        }

        match shadow_suffix {
            Some(suffix) => {
                self.update_with_retry(&stream, &suffix, None).await?;
                self.handler
                    .execute(&self.generator.overwrite_final_table(id, &suffix))
                    .await?;
                // the swap replaced the whole table, so any pending reset is done
                self.states.insert(id.clone(), state.with_soft_reset(false));
            }
            None if raw_status.has_unprocessed_records => {
                self.update_with_retry(&stream, "", raw_status.max_processed_timestamp)
                    .await?;
            }
            None => return Ok(StreamOutcome::Skipped),
        }
        Ok(StreamOutcome::TypedAndDeduped)
    }

    /// Rebuild the final table from every raw row.
    async fn soft_reset(&self, stream: &StreamConfig) -> Result<()> {
        let id = &stream.id;
        info!("Soft resetting stream {id}");
        self.handler
            .execute(&self.generator.create_table(stream, TMP_TABLE_SUFFIX, true))
            .await?;
        self.handler
            .execute(&self.generator.clear_loaded_at(id))
            .await?;
        self.update_with_retry(stream, TMP_TABLE_SUFFIX, None).await?;
        self.handler
            .execute(&self.generator.overwrite_final_table(id, TMP_TABLE_SUFFIX))
            .await?;
        Ok(())
    }

    /// Run the typing and deduping transaction with plain casts, falling
    /// back to per-value validated casts when that fails.
    async fn update_with_retry(
        &self,
        stream: &StreamConfig,
        final_suffix: &str,
        min_raw_timestamp: Option<DateTime<Utc>>,
    ) -> Result<()> {
        let cheap = self
            .generator
            .update_table(stream, final_suffix, min_raw_timestamp, false);
        if let Err(e) = self.handler.execute(&cheap).await {
            warn!(
                "Typing and deduping stream {} failed, retrying with safer casting: {e:#}",
                stream.id
            );
            let safer = self
                .generator
                .update_table(stream, final_suffix, min_raw_timestamp, true);
            self.handler
                .execute(&safer)
                .await
                .with_context(|| format!("Failed to type and dedupe stream {}", stream.id))?;
        }
        Ok(())
    }

    pub async fn commit(&self) {
        self.handler.commit_destination_states(&self.states).await;
    }

    /// Run all three phases. States are committed even when a stream
    /// fails, so progress such as a finished soft reset is kept.
    pub async fn run(&mut self) -> Result<Vec<(StreamId, StreamOutcome)>> {
        self.prepare().await?;
        let outcomes = self.type_and_dedupe().await;
        self.commit().await;
        outcomes
    }
}
