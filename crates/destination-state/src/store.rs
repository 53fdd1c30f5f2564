//! Destination state storage trait.

use std::collections::HashMap;

use async_trait::async_trait;
use typedupe_core::{StreamDescriptor, StreamId};

use crate::state::DestinationState;

/// Bulk read and commit of per-stream destination state.
///
/// Neither operation returns an error. Implementations log failures and
/// degrade: a failed read yields an empty map, a failed commit is dropped.
#[async_trait]
pub trait DestinationStateStore<S: DestinationState>: Send + Sync {
    /// Every stored state, keyed by the stream's original name and namespace.
    /// When a stream has several rows, the most recently updated one wins.
    async fn read_all(&self) -> HashMap<StreamDescriptor, S>;

    /// Replace the stored state of each given stream. No-op when empty.
    async fn commit(&self, states: &HashMap<StreamId, S>);
}
