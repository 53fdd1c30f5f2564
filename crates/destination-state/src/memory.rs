use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use typedupe_core::{StreamDescriptor, StreamId};

use crate::state::DestinationState;
use crate::store::DestinationStateStore;
use crate::stored::{fold_destination_states, StoredDestinationState};

/// In-memory `DestinationStateStore`, mainly for tests and dry runs.
#[derive(Default)]
pub struct MemoryStateStore {
    rows: Mutex<Vec<StoredDestinationState>>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_rows(rows: Vec<StoredDestinationState>) -> Self {
        Self {
            rows: Mutex::new(rows),
        }
    }

    /// Current rows, duplicates included.
    pub fn rows(&self) -> Vec<StoredDestinationState> {
        self.lock().clone()
    }

    fn lock(&self) -> MutexGuard<'_, Vec<StoredDestinationState>> {
        self.rows.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

#[async_trait]
impl<S: DestinationState> DestinationStateStore<S> for MemoryStateStore {
    async fn read_all(&self) -> HashMap<StreamDescriptor, S> {
        fold_destination_states(self.rows())
    }

    async fn commit(&self, states: &HashMap<StreamId, S>) {
        if states.is_empty() {
            return;
        }
        let now = Utc::now();
        let mut rows = self.lock();
        rows.retain(|row| !states.keys().any(|id| id.descriptor() == row.descriptor()));
        rows.extend(states.iter().map(|(id, state)| StoredDestinationState {
            name: id.original_name.clone(),
            namespace: id.original_namespace.clone(),
            state: Some(state.to_stored()),
            updated_at: Some(now),
        }));
    }
}
