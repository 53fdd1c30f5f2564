//! Typedupe Library
//!
//! Promotes raw JSON records into typed, deduplicated tables inside the
//! destination database.
//!
//! # Features
//!
//! - Typing: each declared column is cast out of the raw record, with cast
//!   failures nulled and recorded in `_airbyte_meta`
//! - Deduplication: `append_dedup` streams keep only the latest version of
//!   each primary key, ordered by the cursor
//! - CDC deletes: rows marked with `_ab_cdc_deleted_at` are removed
//! - Incremental progress: only raw rows not yet loaded are read
//! - Schema drift: a final table whose columns no longer match the stream is
//!   rebuilt from the raw table (soft reset)
//!
//! # CLI Usage
//!
//! ```bash
//! # Print the SQL a sync would run, without connecting
//! typedupe plan --config typedupe.toml
//!
//! # Show each stream's initial status
//! typedupe status --config typedupe.toml --connection-string postgres://...
//!
//! # Type and dedupe every stream
//! typedupe run --config typedupe.toml
//! ```

use clap::Parser;

pub mod config;
pub mod handler;
pub mod sync;

pub use config::{Config, ConfigError};
pub use handler::{DestinationHandler, HandlerError};
pub use sync::{StreamOutcome, TyperDeduper};

#[derive(Parser, Clone)]
pub struct ConnectionOpts {
    /// PostgreSQL connection string, overriding the config file
    #[arg(long, env = "TYPEDUPE_CONNECTION_STRING")]
    pub connection_string: Option<String>,
}
