//! Statement builders for every step of a sync.

use chrono::{DateTime, Utc};
use typedupe_core::columns::{
    CDC_DELETED_AT, DATA, EXTRACTED_AT, LOADED_AT, META, RAW_ID, V1_AB_ID, V1_DATA, V1_EMITTED_AT,
};
use typedupe_core::{
    AirbyteType, ColumnId, DestinationSyncMode, Sql, StreamConfig, StreamId,
};

use crate::dialect::{SqlDialect, ROW_NUMBER_COLUMN};

const TYPING_CTE: &str = "intermediate_data";
const NUMBERED_ROWS_CTE: &str = "numbered_rows";

/// Builds `Sql` plans for one dialect. Never touches a database.
#[derive(Debug, Clone)]
pub struct SqlGenerator<D> {
    dialect: D,
}

impl<D: SqlDialect> SqlGenerator<D> {
    pub fn new(dialect: D) -> Self {
        Self { dialect }
    }

    pub fn dialect(&self) -> &D {
        &self.dialect
    }

    pub fn create_schema(&self, schema: &str) -> Sql {
        Sql::of(format!(
            "CREATE SCHEMA IF NOT EXISTS {}",
            self.dialect.quote_identifier(schema)
        ))
    }

    /// Create the final table `final_name + suffix`.
    ///
    /// With `force`, any existing table of that name is dropped first in the
    /// same transaction. This is how the shadow table of an overwrite sync
    /// is rebuilt.
    pub fn create_table(&self, stream: &StreamConfig, suffix: &str, force: bool) -> Sql {
        let table_name = format!("{}{}", stream.id.final_name, suffix.to_lowercase());
        let table = self
            .dialect
            .quoted_table(&stream.id.final_namespace, &table_name);
        let columns = self.final_table_column_definitions(&stream.columns);

        if !force {
            return Sql::of(format!(
                "CREATE TABLE IF NOT EXISTS {table} (\n{columns}\n)"
            ));
        }

        Sql::transactionally([
            self.drop_table(&table),
            format!("CREATE TABLE {table} (\n{columns}\n)"),
        ])
    }

    /// Create a v2 raw table for a stream if it does not exist yet.
    pub fn create_raw_table(&self, id: &StreamId) -> Sql {
        let d = &self.dialect;
        let struct_type = d.struct_type();
        let timestamp = d.timestamp_with_timezone_type();
        let columns = [
            format!("  {} {} NOT NULL", d.quote_identifier(RAW_ID), d.raw_id_type()),
            format!("  {} {timestamp} NOT NULL", d.quote_identifier(EXTRACTED_AT)),
            format!("  {} {timestamp}", d.quote_identifier(LOADED_AT)),
            format!("  {} {struct_type} NOT NULL", d.quote_identifier(DATA)),
            format!("  {} {struct_type}", d.quote_identifier(META)),
        ];
        Sql::of(format!(
            "CREATE TABLE IF NOT EXISTS {} (\n{}\n)",
            d.quoted_table(&id.raw_namespace, &id.raw_name),
            columns.join(",\n")
        ))
    }

    /// The typing and deduping transaction.
    ///
    /// Casts unprocessed raw rows into the final table `final_name +
    /// final_suffix`, deduplicates it for `append_dedup`, applies CDC
    /// deletes, and marks the raw rows processed.
    pub fn update_table(
        &self,
        stream: &StreamConfig,
        final_suffix: &str,
        min_raw_timestamp: Option<DateTime<Utc>>,
        use_expensive_safer_casting: bool,
    ) -> Sql {
        let id = &stream.id;
        let final_table = self.dialect.quoted_table(
            &id.final_namespace,
            &format!("{}{}", id.final_name, final_suffix.to_lowercase()),
        );
        let raw_table = self.dialect.quoted_table(&id.raw_namespace, &id.raw_name);
        let cdc_deleted_at_present = has_cdc_deleted_at(stream);

        let condition = self.raw_table_condition(
            stream.destination_sync_mode,
            cdc_deleted_at_present,
            min_raw_timestamp,
        );
        let typing_cte = self.select_from_raw_table(
            &raw_table,
            &stream.columns,
            &condition,
            use_expensive_safer_casting,
        );
        let final_columns = self.final_table_column_list(&stream.columns);
        let checkpoint = self.checkpoint_raw_table(&raw_table, min_raw_timestamp);

        if stream.destination_sync_mode != DestinationSyncMode::AppendDedup {
            let insert = format!(
                "INSERT INTO {final_table} ({final_columns})\n\
                 WITH {TYPING_CTE} AS (\n{typing_cte}\n)\n\
                 SELECT {final_columns}\n\
                 FROM {TYPING_CTE}"
            );
            return Sql::transactionally([insert, checkpoint]);
        }

        let row_number = self
            .dialect
            .row_number(&stream.primary_key, stream.cursor.as_ref());
        let insert = format!(
            "INSERT INTO {final_table} ({final_columns})\n\
             WITH {TYPING_CTE} AS (\n{typing_cte}\n), {NUMBERED_ROWS_CTE} AS (\n\
             SELECT *, {row_number}\n\
             FROM {TYPING_CTE}\n)\n\
             SELECT {final_columns}\n\
             FROM {NUMBERED_ROWS_CTE}\n\
             WHERE {ROW_NUMBER_COLUMN} = 1"
        );
        let dedup = self.delete_stale_versions(&final_table, stream);
        let cdc_deletes = if cdc_deleted_at_present {
            format!(
                "DELETE FROM {final_table} WHERE {} IS NOT NULL",
                self.dialect.quote_identifier(CDC_DELETED_AT)
            )
        } else {
            String::new()
        };

        Sql::transactionally([insert, dedup, cdc_deletes, checkpoint])
    }

    /// Replace the live final table with its shadow `final_name + final_suffix`.
    pub fn overwrite_final_table(&self, id: &StreamId, final_suffix: &str) -> Sql {
        let live = self.dialect.quoted_table(&id.final_namespace, &id.final_name);
        Sql::transactionally([
            self.drop_table(&live),
            self.dialect.rename_table(
                &id.final_namespace,
                &format!("{}{}", id.final_name, final_suffix.to_lowercase()),
                &id.final_name,
            ),
        ])
    }

    /// Rebuild a legacy v1 raw table `namespace.table_name` as the stream's
    /// v2 raw table. Every migrated row is unprocessed.
    pub fn migrate_from_v1_to_v2(&self, id: &StreamId, namespace: &str, table_name: &str) -> Sql {
        let d = &self.dialect;
        let raw_table = d.quoted_table(&id.raw_namespace, &id.raw_name);
        let select = format!(
            "SELECT\n  {} AS {},\n  {} AS {},\n  CAST(NULL AS {}) AS {},\n  {} AS {},\n  CAST(NULL AS {}) AS {}\nFROM {}",
            d.quote_identifier(V1_AB_ID),
            d.quote_identifier(RAW_ID),
            d.quote_identifier(V1_EMITTED_AT),
            d.quote_identifier(EXTRACTED_AT),
            d.timestamp_with_timezone_type(),
            d.quote_identifier(LOADED_AT),
            d.quote_identifier(V1_DATA),
            d.quote_identifier(DATA),
            d.struct_type(),
            d.quote_identifier(META),
            d.quoted_table(namespace, table_name),
        );
        Sql::transactionally([
            format!(
                "CREATE SCHEMA IF NOT EXISTS {}",
                d.quote_identifier(&id.raw_namespace)
            ),
            self.drop_table(&raw_table),
            format!("CREATE TABLE {raw_table} AS\n{select}"),
        ])
    }

    /// Mark every raw row unprocessed so the next run retypes all of them.
    pub fn clear_loaded_at(&self, id: &StreamId) -> Sql {
        Sql::of(format!(
            "UPDATE {} SET {} = NULL",
            self.dialect.quoted_table(&id.raw_namespace, &id.raw_name),
            self.dialect.quote_identifier(LOADED_AT)
        ))
    }

    /// Which raw rows a typing and deduping run reads.
    ///
    /// Unprocessed rows always; for `append_dedup` with a CDC column, also
    /// rows marked deleted so the delete reaches the final table. When a
    /// checkpoint is known, only rows extracted after it.
    pub fn raw_table_condition(
        &self,
        sync_mode: DestinationSyncMode,
        cdc_deleted_at_present: bool,
        min_raw_timestamp: Option<DateTime<Utc>>,
    ) -> String {
        let mut condition = format!("{} IS NULL", self.dialect.quote_identifier(LOADED_AT));
        if sync_mode == DestinationSyncMode::AppendDedup && cdc_deleted_at_present {
            condition = format!(
                "({condition} OR {})",
                self.dialect.cdc_deleted_at_not_null_condition()
            );
        }
        if let Some(timestamp) = min_raw_timestamp {
            condition = format!(
                "{condition} AND {} > {}",
                self.dialect.quote_identifier(EXTRACTED_AT),
                self.dialect.timestamp_literal(timestamp)
            );
        }
        condition
    }

    fn select_from_raw_table(
        &self,
        raw_table: &str,
        columns: &[(ColumnId, AirbyteType)],
        condition: &str,
        use_expensive_safer_casting: bool,
    ) -> String {
        let d = &self.dialect;
        let mut fields: Vec<String> = columns
            .iter()
            .map(|(column, airbyte_type)| {
                format!(
                    "  {} AS {}",
                    d.cast_field(column, airbyte_type, use_expensive_safer_casting),
                    d.quote_identifier(&column.name)
                )
            })
            .collect();
        fields.push(format!("  {}", d.quote_identifier(RAW_ID)));
        fields.push(format!("  {}", d.quote_identifier(EXTRACTED_AT)));
        fields.push(format!(
            "  {} AS {}",
            d.airbyte_meta_column(columns, use_expensive_safer_casting),
            d.quote_identifier(META)
        ));

        format!(
            "SELECT\n{}\nFROM {raw_table}\nWHERE {condition}",
            fields.join(",\n")
        )
    }

    fn delete_stale_versions(&self, final_table: &str, stream: &StreamConfig) -> String {
        let raw_id = self.dialect.quote_identifier(RAW_ID);
        let row_number = self
            .dialect
            .row_number(&stream.primary_key, stream.cursor.as_ref());
        format!(
            "DELETE FROM {final_table}\n\
             WHERE {raw_id} IN (\n\
             SELECT {raw_id} FROM (\n\
             SELECT {raw_id}, {row_number}\n\
             FROM {final_table}\n\
             ) airbyte_ids\n\
             WHERE {ROW_NUMBER_COLUMN} <> 1\n)"
        )
    }

    fn checkpoint_raw_table(
        &self,
        raw_table: &str,
        min_raw_timestamp: Option<DateTime<Utc>>,
    ) -> String {
        let loaded_at = self.dialect.quote_identifier(LOADED_AT);
        let mut statement = format!(
            "UPDATE {raw_table} SET {loaded_at} = {} WHERE {loaded_at} IS NULL",
            self.dialect.current_timestamp()
        );
        if let Some(timestamp) = min_raw_timestamp {
            statement.push_str(&format!(
                " AND {} > {}",
                self.dialect.quote_identifier(EXTRACTED_AT),
                self.dialect.timestamp_literal(timestamp)
            ));
        }
        statement
    }

    fn drop_table(&self, table: &str) -> String {
        if self.dialect.cascade_drop() {
            format!("DROP TABLE IF EXISTS {table} CASCADE")
        } else {
            format!("DROP TABLE IF EXISTS {table}")
        }
    }

    fn final_table_column_definitions(&self, columns: &[(ColumnId, AirbyteType)]) -> String {
        let d = &self.dialect;
        let mut definitions: Vec<String> = columns
            .iter()
            .map(|(column, airbyte_type)| {
                format!(
                    "  {} {}",
                    d.quote_identifier(&column.name),
                    d.to_dialect_type(airbyte_type)
                )
            })
            .collect();
        definitions.push(format!(
            "  {} {} NOT NULL",
            d.quote_identifier(RAW_ID),
            d.raw_id_type()
        ));
        definitions.push(format!(
            "  {} {} NOT NULL",
            d.quote_identifier(EXTRACTED_AT),
            d.timestamp_with_timezone_type()
        ));
        definitions.push(format!(
            "  {} {} NOT NULL",
            d.quote_identifier(META),
            d.struct_type()
        ));
        definitions.join(",\n")
    }

    fn final_table_column_list(&self, columns: &[(ColumnId, AirbyteType)]) -> String {
        columns
            .iter()
            .map(|(column, _)| column.name.as_str())
            .chain([RAW_ID, EXTRACTED_AT, META])
            .map(|name| self.dialect.quote_identifier(name))
            .collect::<Vec<_>>()
            .join(", ")
    }
}

fn has_cdc_deleted_at(stream: &StreamConfig) -> bool {
    stream
        .columns
        .iter()
        .any(|(column, _)| column.name == CDC_DELETED_AT)
}
