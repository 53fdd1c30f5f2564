use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde_json::Value;
use typedupe_core::{JsonRow, StreamDescriptor};

use crate::state::DestinationState;

/// Column holding the state text.
pub const STATE_COLUMN: &str = "destination_state";

/// One row of the destination state table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredDestinationState {
    pub name: String,
    pub namespace: Option<String>,
    pub state: Option<String>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl StoredDestinationState {
    /// Read a row returned by the state table query.
    ///
    /// Column names are matched case-insensitively. Returns `None` for rows
    /// without a stream name.
    pub fn from_row(row: &JsonRow) -> Option<Self> {
        let lowered: HashMap<String, &Value> = row
            .iter()
            .map(|(key, value)| (key.to_lowercase(), value))
            .collect();
        let text = |key: &str| -> Option<String> {
            match lowered.get(key) {
                Some(Value::String(s)) => Some(s.clone()),
                Some(Value::Null) | None => None,
                Some(other) => Some(other.to_string()),
            }
        };

        Some(Self {
            name: text("name")?,
            namespace: text("namespace"),
            state: text(STATE_COLUMN),
            updated_at: text("updated_at").and_then(|s| parse_timestamp(&s)),
        })
    }

    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::new(self.name.clone(), self.namespace.clone())
    }
}

fn parse_timestamp(value: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|ts| ts.with_timezone(&Utc))
        .ok()
}

/// Fold stored rows into one state per stream, newest row winning.
///
/// Rows without a parseable `updated_at` sort before every dated row.
pub fn fold_destination_states<S: DestinationState>(
    mut rows: Vec<StoredDestinationState>,
) -> HashMap<StreamDescriptor, S> {
    rows.sort_by_key(|row| row.updated_at.unwrap_or(DateTime::<Utc>::MIN_UTC));
    rows.into_iter()
        .map(|row| (row.descriptor(), S::from_stored(row.state.as_deref())))
        .collect()
}
