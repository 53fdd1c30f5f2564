//! Core data model for the typedupe typing and deduplication engine.
//!
//! Sources append JSON records to a per-stream raw table. The engine casts
//! those records into a typed final table, optionally keeping only the
//! latest version of each primary key. This crate holds the types shared by
//! every part of that pipeline:
//!
//! - [`AirbyteType`]: the abstract column type system
//! - [`StreamId`], [`ColumnId`], [`StreamConfig`]: what to sync and where
//! - [`Sql`]: an ordered plan of transactions
//! - [`DestinationDatabase`]: the executor seam implemented per destination

pub mod columns;
pub mod database;
mod error;
pub mod naming;
pub mod schema;
pub mod sql;
pub mod status;
pub mod stream;
pub mod types;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use database::{DestinationDatabase, JsonRow};
pub use error::TypeError;
pub use naming::{NameTransformer, StandardNameTransformer};
pub use schema::{ColumnDefinition, TableDefinition};
pub use sql::Sql;
pub use status::{DestinationInitialStatus, InitialRawTableStatus};
pub use stream::{ColumnId, DestinationSyncMode, StreamConfig, StreamDescriptor, StreamId};
pub use types::{AirbyteProtocolType, AirbyteType};
