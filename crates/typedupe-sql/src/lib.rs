//! SQL generation for typing and deduplication.
//!
//! [`SqlDialect`] is the type mapper and the handful of expressions that
//! differ between destinations. [`SqlGenerator`] builds every statement the
//! engine runs on top of a dialect, without ever branching on which dialect
//! it is.

pub mod dialect;
pub mod generator;
pub mod schema;

pub use dialect::SqlDialect;
pub use generator::SqlGenerator;
pub use schema::existing_schema_matches_stream_config;
