//! The executor seam between the engine and a live destination.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::{Map, Value};

use crate::schema::TableDefinition;

/// A JSON object per result row, keyed by column name.
pub type JsonRow = Map<String, Value>;

/// Operations the engine needs from a destination connection.
///
/// Implementations wrap a single client and must be safe to share across the
/// per-stream tasks of one sync.
#[async_trait]
pub trait DestinationDatabase: Send + Sync {
    /// Run one statement outside any explicit transaction.
    async fn execute(&self, statement: &str) -> Result<()>;

    /// Run statements in order inside one transaction. Either all of them
    /// take effect or none do.
    async fn execute_within_transaction(&self, statements: &[String]) -> Result<()>;

    /// Run a query returning one row with one timestamp column, which may be NULL.
    async fn query_timestamp(&self, query: &str) -> Result<Option<DateTime<Utc>>>;

    /// Run a query returning one row with one boolean column.
    async fn query_bool(&self, query: &str) -> Result<bool>;

    /// Run a query and return every row as a JSON object.
    async fn query_json_rows(&self, query: &str) -> Result<Vec<JsonRow>>;

    async fn table_exists(&self, namespace: &str, name: &str) -> Result<bool> {
        Ok(self.find_existing_table(namespace, name).await?.is_some())
    }

    /// Look up a table's columns in the catalog. `None` if it does not exist.
    async fn find_existing_table(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<TableDefinition>>;
}
