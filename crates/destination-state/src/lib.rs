//! Destination state management for typedupe
//!
//! Each stream may carry an opaque, destination-defined state blob across
//! syncs. The blobs live in a single table inside the destination itself,
//! one row per stream, and are read once at the start of a sync and
//! rewritten once at the end.
//!
//! # Architecture
//!
//! - `DestinationState` is implemented by the destination's state type;
//!   `MinimumDestinationState` is the stock one
//! - `DestinationStateStore` reads and commits states for a whole sync
//! - `SqlStateStore` keeps them in the `_airbyte_destination_state` table
//!   via any `DestinationDatabase`
//! - `MemoryStateStore` keeps them in memory
//!
//! Both operations are best effort. A failed read yields no states and a
//! failed commit is logged, so losing state only costs reprocessing.

mod memory;
mod sql;
mod state;
pub mod store;
mod stored;

#[cfg(test)]
mod tests;

pub use memory::MemoryStateStore;
pub use sql::SqlStateStore;
pub use state::{DestinationState, MinimumDestinationState};
pub use store::DestinationStateStore;
pub use stored::{fold_destination_states, StoredDestinationState};
