//! Stream identity and per-stream sync descriptors.

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::naming::{concatenate_raw_table_name, NameTransformer};
use crate::types::AirbyteType;

/// How records of a stream land in the final table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DestinationSyncMode {
    /// Every record is appended.
    Append,
    /// Records are appended, then only the latest version per primary key is kept.
    AppendDedup,
    /// The final table is rebuilt from scratch each sync.
    Overwrite,
}

impl DestinationSyncMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Append => "append",
            Self::AppendDedup => "append_dedup",
            Self::Overwrite => "overwrite",
        }
    }
}

impl std::fmt::Display for DestinationSyncMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stream as the source names it. Used as the destination-state key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct StreamDescriptor {
    pub name: String,
    pub namespace: Option<String>,
}

impl StreamDescriptor {
    pub fn new(name: impl Into<String>, namespace: Option<String>) -> Self {
        Self {
            name: name.into(),
            namespace,
        }
    }
}

impl std::fmt::Display for StreamDescriptor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &self.namespace {
            Some(ns) => write!(f, "{ns}.{}", self.name),
            None => f.write_str(&self.name),
        }
    }
}

/// Locations of a stream's raw and final tables.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct StreamId {
    pub final_namespace: String,
    pub final_name: String,
    pub raw_namespace: String,
    pub raw_name: String,
    pub original_namespace: Option<String>,
    pub original_name: String,
}

impl StreamId {
    /// Derive table locations from the names the source declared.
    ///
    /// Final tables live in the stream's own namespace; all raw tables share
    /// `raw_namespace`, disambiguated by [`concatenate_raw_table_name`].
    pub fn build(
        naming: &dyn NameTransformer,
        namespace: Option<&str>,
        name: &str,
        default_namespace: &str,
        raw_namespace: &str,
    ) -> Self {
        let effective_namespace = namespace.unwrap_or(default_namespace);
        Self {
            final_namespace: naming.namespace(effective_namespace),
            final_name: naming.stream_name(name),
            raw_namespace: naming.namespace(raw_namespace),
            raw_name: naming
                .stream_name(&concatenate_raw_table_name(effective_namespace, name)),
            original_namespace: namespace.map(str::to_string),
            original_name: name.to_string(),
        }
    }

    pub fn descriptor(&self) -> StreamDescriptor {
        StreamDescriptor::new(self.original_name.clone(), self.original_namespace.clone())
    }
}

impl std::fmt::Display for StreamId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}", self.final_namespace, self.final_name)
    }
}

/// A column's destination name plus the name the source used.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ColumnId {
    pub name: String,
    pub original_name: String,
    /// Name used when comparing columns for collisions.
    pub canonical_name: String,
}

impl ColumnId {
    pub fn build(naming: &dyn NameTransformer, name: &str) -> Self {
        let normalized = naming.identifier(name);
        Self {
            canonical_name: normalized.to_lowercase(),
            name: normalized,
            original_name: name.to_string(),
        }
    }
}

/// Everything the engine needs to know about one stream for one sync.
#[derive(Debug, Clone, PartialEq)]
pub struct StreamConfig {
    pub id: StreamId,
    pub destination_sync_mode: DestinationSyncMode,
    pub primary_key: Vec<ColumnId>,
    pub cursor: Option<ColumnId>,
    /// Declared columns; this order is the final table's column order.
    pub columns: Vec<(ColumnId, AirbyteType)>,
}

impl StreamConfig {
    /// Build and validate a stream descriptor.
    ///
    /// Primary key and cursor columns must be declared columns, and
    /// `append_dedup` requires a primary key.
    pub fn new(
        id: StreamId,
        destination_sync_mode: DestinationSyncMode,
        primary_key: Vec<ColumnId>,
        cursor: Option<ColumnId>,
        columns: Vec<(ColumnId, AirbyteType)>,
    ) -> Result<Self, TypeError> {
        let config = Self {
            id,
            destination_sync_mode,
            primary_key,
            cursor,
            columns,
        };

        for pk in &config.primary_key {
            if !config.has_column(pk) {
                return Err(TypeError::UnknownPrimaryKeyColumn {
                    stream: config.id.to_string(),
                    column: pk.original_name.clone(),
                });
            }
        }
        if let Some(cursor) = &config.cursor {
            if !config.has_column(cursor) {
                return Err(TypeError::UnknownCursorColumn {
                    stream: config.id.to_string(),
                    column: cursor.original_name.clone(),
                });
            }
        }
        if config.destination_sync_mode == DestinationSyncMode::AppendDedup
            && config.primary_key.is_empty()
        {
            return Err(TypeError::MissingPrimaryKey {
                stream: config.id.to_string(),
            });
        }

        Ok(config)
    }

    pub fn has_column(&self, column: &ColumnId) -> bool {
        self.columns.iter().any(|(id, _)| id == column)
    }

    pub fn column_type(&self, column: &ColumnId) -> Option<&AirbyteType> {
        self.columns
            .iter()
            .find(|(id, _)| id == column)
            .map(|(_, t)| t)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::naming::StandardNameTransformer;

    fn users_id() -> StreamId {
        StreamId::build(
            &StandardNameTransformer,
            Some("public"),
            "users",
            "default",
            "airbyte_internal",
        )
    }

    #[test]
    fn test_stream_id_build() {
        let id = users_id();
        assert_eq!(id.final_namespace, "public");
        assert_eq!(id.final_name, "users");
        assert_eq!(id.raw_namespace, "airbyte_internal");
        assert_eq!(id.raw_name, "public_raw__stream_users");
        assert_eq!(id.descriptor(), StreamDescriptor::new("users", Some("public".into())));
    }

    #[test]
    fn test_stream_id_default_namespace() {
        let id = StreamId::build(&StandardNameTransformer, None, "orders", "sales", "raw");
        assert_eq!(id.final_namespace, "sales");
        assert_eq!(id.raw_name, "sales_raw__stream_orders");
        assert_eq!(id.original_namespace, None);
    }

    #[test]
    fn test_column_id_quoting() {
        let col = ColumnId::build(&StandardNameTransformer, "first name");
        assert_eq!(col.name, "first_name");
        assert_eq!(col.original_name, "first name");
        assert_eq!(col.quoted("\""), "\"first_name\"");
    }

    #[test]
    fn test_dedup_requires_primary_key() {
        let err = StreamConfig::new(
            users_id(),
            DestinationSyncMode::AppendDedup,
            vec![],
            None,
            vec![],
        );
        assert!(matches!(err, Err(TypeError::MissingPrimaryKey { .. })));
    }

    #[test]
    fn test_cursor_must_be_declared() {
        let naming = StandardNameTransformer;
        let err = StreamConfig::new(
            users_id(),
            DestinationSyncMode::Append,
            vec![],
            Some(ColumnId::build(&naming, "updated_at")),
            vec![(ColumnId::build(&naming, "id"), AirbyteType::INTEGER)],
        );
        assert!(matches!(err, Err(TypeError::UnknownCursorColumn { .. })));
    }
}
