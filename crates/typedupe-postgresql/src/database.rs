//! `DestinationDatabase` over `tokio-postgres`.

use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use tokio::sync::Mutex;
use tokio_postgres::{Client, NoTls};
use tracing::{debug, info, warn};
use typedupe_core::{ColumnDefinition, DestinationDatabase, JsonRow, TableDefinition};

const COLUMNS_QUERY: &str = "
    SELECT column_name::text, udt_name::text, character_maximum_length::int4, is_nullable::text
    FROM information_schema.columns
    WHERE table_schema = $1::text AND table_name = $2::text
    ORDER BY ordinal_position";

#[derive(Clone)]
pub struct PostgresDatabase {
    client: Arc<Mutex<Client>>,
}

impl PostgresDatabase {
    pub fn new(client: Arc<Mutex<Client>>) -> Self {
        Self { client }
    }

    /// Open a connection and drive it on a background task.
    pub async fn connect(connection_string: &str) -> Result<Self> {
        let (client, connection) = tokio_postgres::connect(connection_string, NoTls)
            .await
            .context("Failed to connect to PostgreSQL destination")?;

        tokio::spawn(async move {
            if let Err(e) = connection.await {
                log::error!("Destination connection closed with error: {e}");
            }
        });

        info!("Connected to PostgreSQL destination");
        Ok(Self::new(Arc::new(Mutex::new(client))))
    }
}

#[async_trait]
impl DestinationDatabase for PostgresDatabase {
    async fn execute(&self, statement: &str) -> Result<()> {
        let client = self.client.lock().await;
        client
            .batch_execute(statement)
            .await
            .with_context(|| format!("Failed to execute statement: {statement}"))
    }

    async fn execute_within_transaction(&self, statements: &[String]) -> Result<()> {
        let mut client = self.client.lock().await;
        let transaction = client
            .transaction()
            .await
            .context("Failed to begin transaction")?;

        for statement in statements {
            let started = Instant::now();
            transaction
                .batch_execute(statement)
                .await
                .with_context(|| format!("Failed to execute statement: {statement}"))?;
            debug!("Statement finished in {:?}", started.elapsed());
        }

        transaction
            .commit()
            .await
            .context("Failed to commit transaction")
    }

    async fn query_timestamp(&self, query: &str) -> Result<Option<DateTime<Utc>>> {
        let client = self.client.lock().await;
        let row = client
            .query_one(query, &[])
            .await
            .with_context(|| format!("Failed to run query: {query}"))?;
        Ok(row.try_get(0)?)
    }

    async fn query_bool(&self, query: &str) -> Result<bool> {
        let client = self.client.lock().await;
        let row = client
            .query_one(query, &[])
            .await
            .with_context(|| format!("Failed to run query: {query}"))?;
        Ok(row.try_get(0)?)
    }

    async fn query_json_rows(&self, query: &str) -> Result<Vec<JsonRow>> {
        let wrapped = format!("SELECT row_to_json(t) FROM ({query}) t");
        let client = self.client.lock().await;
        let rows = client
            .query(&wrapped, &[])
            .await
            .with_context(|| format!("Failed to run query: {query}"))?;

        let mut objects = Vec::with_capacity(rows.len());
        for row in rows {
            match row.try_get::<_, Value>(0)? {
                Value::Object(object) => objects.push(object),
                other => warn!("Ignoring non-object row: {other}"),
            }
        }
        Ok(objects)
    }

    async fn find_existing_table(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<TableDefinition>> {
        let client = self.client.lock().await;
        let rows = client
            .query(COLUMNS_QUERY, &[&namespace, &name])
            .await
            .with_context(|| format!("Failed to read columns of {namespace}.{name}"))?;

        if rows.is_empty() {
            return Ok(None);
        }

        let columns = rows
            .iter()
            .map(|row| {
                let is_nullable: String = row.try_get(3)?;
                Ok(ColumnDefinition {
                    name: row.try_get(0)?,
                    type_name: row.try_get(1)?,
                    column_size: row.try_get(2)?,
                    is_nullable: is_nullable.eq_ignore_ascii_case("YES"),
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Some(TableDefinition::new(columns)))
    }
}
