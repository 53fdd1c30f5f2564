//! In-memory `DestinationDatabase` for unit tests.
//!
//! Queries are answered from scripted responses matched by substring;
//! committed transactions are recorded for assertions.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::database::{DestinationDatabase, JsonRow};
use crate::schema::TableDefinition;

#[derive(Default)]
struct Inner {
    tables: HashMap<(String, String), TableDefinition>,
    timestamps: Vec<(String, Option<DateTime<Utc>>)>,
    bools: Vec<(String, bool)>,
    rows: Vec<(String, Vec<JsonRow>)>,
    failures: Vec<Failure>,
    queries: Vec<String>,
    committed: Vec<Vec<String>>,
}

struct Failure {
    pattern: String,
    remaining: Option<usize>,
}

#[derive(Default)]
pub struct MemoryDatabase {
    inner: Mutex<Inner>,
}

impl MemoryDatabase {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an existing table.
    pub fn with_table(self, namespace: &str, name: &str, table: TableDefinition) -> Self {
        self.lock()
            .tables
            .insert((namespace.to_string(), name.to_string()), table);
        self
    }

    /// Answer timestamp queries containing `pattern`.
    pub fn with_timestamp(self, pattern: &str, value: Option<DateTime<Utc>>) -> Self {
        self.lock().timestamps.push((pattern.to_string(), value));
        self
    }

    /// Answer boolean queries containing `pattern`.
    pub fn with_bool(self, pattern: &str, value: bool) -> Self {
        self.lock().bools.push((pattern.to_string(), value));
        self
    }

    /// Answer row queries containing `pattern`.
    pub fn with_rows(self, pattern: &str, rows: Vec<JsonRow>) -> Self {
        self.lock().rows.push((pattern.to_string(), rows));
        self
    }

    /// Fail every statement or query containing `pattern`.
    pub fn failing_on(self, pattern: &str) -> Self {
        self.lock().failures.push(Failure {
            pattern: pattern.to_string(),
            remaining: None,
        });
        self
    }

    /// Fail only the first statement or query containing `pattern`.
    pub fn failing_once_on(self, pattern: &str) -> Self {
        self.lock().failures.push(Failure {
            pattern: pattern.to_string(),
            remaining: Some(1),
        });
        self
    }

    /// Transactions that committed, in order. A single `execute` counts as
    /// a transaction of one statement.
    pub fn committed(&self) -> Vec<Vec<String>> {
        self.lock().committed.clone()
    }

    /// Every committed statement, flattened.
    pub fn committed_statements(&self) -> Vec<String> {
        self.lock().committed.iter().flatten().cloned().collect()
    }

    /// Every query issued, including failed ones.
    pub fn queries(&self) -> Vec<String> {
        self.lock().queries.clone()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn check_failure(&mut self, sql: &str) -> Result<()> {
        for failure in self.failures.iter_mut() {
            if !sql.contains(&failure.pattern) {
                continue;
            }
            match failure.remaining.as_mut() {
                None => return Err(anyhow!("injected failure on '{}'", failure.pattern)),
                Some(0) => {}
                Some(n) => {
                    *n -= 1;
                    return Err(anyhow!("injected failure on '{}'", failure.pattern));
                }
            }
        }
        Ok(())
    }

    fn answer<'a, T>(answers: &'a [(String, T)], query: &str) -> Option<&'a T> {
        answers
            .iter()
            .find(|(pattern, _)| query.contains(pattern.as_str()))
            .map(|(_, v)| v)
    }
}

#[async_trait]
impl DestinationDatabase for MemoryDatabase {
    async fn execute(&self, statement: &str) -> Result<()> {
        let mut inner = self.lock();
        inner.check_failure(statement)?;
        inner.committed.push(vec![statement.to_string()]);
        Ok(())
    }

    async fn execute_within_transaction(&self, statements: &[String]) -> Result<()> {
        let mut inner = self.lock();
        for statement in statements {
            inner.check_failure(statement)?;
        }
        inner.committed.push(statements.to_vec());
        Ok(())
    }

    async fn query_timestamp(&self, query: &str) -> Result<Option<DateTime<Utc>>> {
        let mut inner = self.lock();
        inner.queries.push(query.to_string());
        inner.check_failure(query)?;
        Ok(Inner::answer(&inner.timestamps, query).copied().flatten())
    }

    async fn query_bool(&self, query: &str) -> Result<bool> {
        let mut inner = self.lock();
        inner.queries.push(query.to_string());
        inner.check_failure(query)?;
        Ok(Inner::answer(&inner.bools, query).copied().unwrap_or(false))
    }

    async fn query_json_rows(&self, query: &str) -> Result<Vec<JsonRow>> {
        let mut inner = self.lock();
        inner.queries.push(query.to_string());
        inner.check_failure(query)?;
        Ok(Inner::answer(&inner.rows, query).cloned().unwrap_or_default())
    }

    async fn find_existing_table(
        &self,
        namespace: &str,
        name: &str,
    ) -> Result<Option<TableDefinition>> {
        let mut inner = self.lock();
        inner
            .queries
            .push(format!("find_existing_table {namespace}.{name}"));
        inner.check_failure(&format!("{namespace}.{name}"))?;
        Ok(inner
            .tables
            .get(&(namespace.to_string(), name.to_string()))
            .cloned())
    }
}
