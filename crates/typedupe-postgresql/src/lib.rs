//! PostgreSQL support for typedupe.
//!
//! - [`PostgresDialect`] maps abstract types to PostgreSQL columns and casts
//!   JSONB payloads
//! - [`PostgresDatabase`] runs plans over a shared `tokio-postgres` client

mod database;
mod dialect;

pub use database::PostgresDatabase;
pub use dialect::PostgresDialect;

use typedupe_sql::SqlGenerator;

/// A generator for PostgreSQL destinations.
pub fn postgres_generator(cascade_drop: bool) -> SqlGenerator<PostgresDialect> {
    SqlGenerator::new(PostgresDialect { cascade_drop })
}
