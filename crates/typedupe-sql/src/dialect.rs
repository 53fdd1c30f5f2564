//! Destination-specific SQL fragments.

use chrono::{DateTime, SecondsFormat, Utc};
use typedupe_core::columns::EXTRACTED_AT;
use typedupe_core::{AirbyteProtocolType, AirbyteType, ColumnId};

/// Name of the window column the generator filters on.
pub const ROW_NUMBER_COLUMN: &str = "row_number";

/// The capabilities a destination supplies to [`crate::SqlGenerator`].
///
/// Only the JSON-facing pieces (`extract_field`, `airbyte_meta_column`,
/// `cdc_deleted_at_not_null_condition`), the semi-structured types and the
/// catalog type names are required. Everything else has a default that
/// works on most ANSI databases.
pub trait SqlDialect: Send + Sync {
    /// Type used for struct and unsupported `oneOf` columns.
    fn struct_type(&self) -> String;

    /// Type used for array columns.
    fn array_type(&self) -> String;

    /// Type able to hold any JSON value. Used for `Unknown`.
    fn widest_type(&self) -> String;

    /// Name the catalog reports for a column created with
    /// [`SqlDialect::to_dialect_type`] of `airbyte_type`.
    fn metadata_type_name(&self, airbyte_type: &AirbyteType) -> String;

    /// Expression reading the source field `original_name` out of the raw
    /// `_airbyte_data` column, shaped for casting to `airbyte_type`.
    fn extract_field(&self, original_name: &str, airbyte_type: &AirbyteType) -> String;

    /// Expression building the `_airbyte_meta` value of a typed row from the
    /// per-column cast results.
    fn airbyte_meta_column(
        &self,
        columns: &[(ColumnId, AirbyteType)],
        use_expensive_safer_casting: bool,
    ) -> String;

    /// Condition on a raw row that is true when the source marked it deleted.
    fn cdc_deleted_at_not_null_condition(&self) -> String;

    fn quote(&self) -> &'static str {
        "\""
    }

    fn quote_identifier(&self, name: &str) -> String {
        let quote = self.quote();
        format!(
            "{quote}{}{quote}",
            name.replace(quote, &format!("{quote}{quote}"))
        )
    }

    fn quoted_table(&self, namespace: &str, name: &str) -> String {
        format!(
            "{}.{}",
            self.quote_identifier(namespace),
            self.quote_identifier(name)
        )
    }

    /// Column type for a primitive.
    fn protocol_type(&self, protocol_type: AirbyteProtocolType) -> String {
        match protocol_type {
            AirbyteProtocolType::String => "VARCHAR(65535)".to_string(),
            AirbyteProtocolType::Number => "DECIMAL(38, 9)".to_string(),
            AirbyteProtocolType::Integer => "BIGINT".to_string(),
            AirbyteProtocolType::Boolean => "BOOLEAN".to_string(),
            AirbyteProtocolType::TimestampWithTimezone => "TIMESTAMP WITH TIME ZONE".to_string(),
            AirbyteProtocolType::TimestampWithoutTimezone => "TIMESTAMP".to_string(),
            AirbyteProtocolType::TimeWithTimezone => "TIME WITH TIME ZONE".to_string(),
            AirbyteProtocolType::TimeWithoutTimezone => "TIME".to_string(),
            AirbyteProtocolType::Date => "DATE".to_string(),
            AirbyteProtocolType::Unknown => self.widest_type(),
        }
    }

    /// Map an abstract type to this destination's column type.
    fn to_dialect_type(&self, airbyte_type: &AirbyteType) -> String {
        match airbyte_type {
            AirbyteType::Primitive(p) => self.protocol_type(*p),
            AirbyteType::Struct(_) | AirbyteType::UnsupportedOneOf(_) => self.struct_type(),
            AirbyteType::Array(_) => self.array_type(),
            AirbyteType::Union(_) => self.to_dialect_type(&airbyte_type.choose_type()),
        }
    }

    fn timestamp_with_timezone_type(&self) -> String {
        self.protocol_type(AirbyteProtocolType::TimestampWithTimezone)
    }

    /// Type of `_airbyte_raw_id`.
    fn raw_id_type(&self) -> String {
        "VARCHAR(36)".to_string()
    }

    /// Expression casting one declared column out of `_airbyte_data`.
    ///
    /// The cheap form is a plain `CAST`, which may fail the whole statement
    /// on bad input. Dialects override this to offer a safer form that
    /// yields NULL instead.
    fn cast_field(
        &self,
        column: &ColumnId,
        airbyte_type: &AirbyteType,
        use_expensive_safer_casting: bool,
    ) -> String {
        let _ = use_expensive_safer_casting;
        let field = self.extract_field(&column.original_name, airbyte_type);
        format!("CAST({field} AS {})", self.to_dialect_type(airbyte_type))
    }

    /// `ROW_NUMBER()` window ranking rows of one primary key newest first.
    fn row_number(&self, primary_key: &[ColumnId], cursor: Option<&ColumnId>) -> String {
        let partition = primary_key
            .iter()
            .map(|pk| self.quote_identifier(&pk.name))
            .collect::<Vec<_>>()
            .join(", ");
        let extracted_at = format!("{} DESC", self.quote_identifier(EXTRACTED_AT));
        let order = match cursor {
            Some(cursor) => format!(
                "{} DESC NULLS LAST, {extracted_at}",
                self.quote_identifier(&cursor.name)
            ),
            None => extracted_at,
        };
        format!(
            "ROW_NUMBER() OVER (PARTITION BY {partition} ORDER BY {order}) AS {ROW_NUMBER_COLUMN}"
        )
    }

    fn current_timestamp(&self) -> String {
        "CURRENT_TIMESTAMP".to_string()
    }

    fn timestamp_literal(&self, timestamp: DateTime<Utc>) -> String {
        self.string_literal(&timestamp.to_rfc3339_opts(SecondsFormat::AutoSi, true))
    }

    fn string_literal(&self, value: &str) -> String {
        format!("'{}'", value.replace('\'', "''"))
    }

    fn rename_table(&self, namespace: &str, from: &str, to: &str) -> String {
        format!(
            "ALTER TABLE {} RENAME TO {}",
            self.quoted_table(namespace, from),
            self.quote_identifier(to)
        )
    }

    /// Whether `DROP TABLE` must cascade to dependent views.
    fn cascade_drop(&self) -> bool {
        false
    }
}
