use chrono::{DateTime, Utc};

use crate::stream::StreamConfig;

/// What the raw table tells us about a stream's progress.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct InitialRawTableStatus {
    pub raw_table_exists: bool,
    pub has_unprocessed_records: bool,
    /// Lower bound (exclusive) of `_airbyte_extracted_at` for the next
    /// typing and deduping run. `None` means process everything.
    pub max_processed_timestamp: Option<DateTime<Utc>>,
}

/// Snapshot of one stream's destination at the start of a sync.
#[derive(Debug, Clone, PartialEq)]
pub struct DestinationInitialStatus<S> {
    pub stream_config: StreamConfig,
    pub is_final_table_present: bool,
    pub initial_raw_table_status: InitialRawTableStatus,
    pub is_schema_mismatch: bool,
    pub is_final_table_empty: bool,
    pub destination_state: S,
}
