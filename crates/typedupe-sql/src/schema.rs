//! Final table drift detection.

use std::collections::HashMap;

use typedupe_core::columns::{is_final_table_metadata_column, EXTRACTED_AT, META, RAW_ID};
use typedupe_core::{AirbyteType, StreamConfig, TableDefinition};

use crate::dialect::SqlDialect;

/// Whether an existing final table has exactly the shape this sync would
/// create.
///
/// The three metadata columns must carry the dialect's string, timestamp
/// with time zone and struct types. The remaining columns must match the
/// stream's declared columns one to one by name and mapped type. Any
/// difference means the caller should soft reset the stream.
pub fn existing_schema_matches_stream_config<D: SqlDialect + ?Sized>(
    dialect: &D,
    stream: &StreamConfig,
    existing: &TableDefinition,
) -> bool {
    let metadata_ok = [
        (RAW_ID, AirbyteType::STRING),
        (EXTRACTED_AT, AirbyteType::TIMESTAMP_WITH_TIMEZONE),
        (META, AirbyteType::Struct(Vec::new())),
    ]
    .iter()
    .all(|(name, expected)| {
        existing.column(name).is_some_and(|column| {
            column
                .type_name
                .eq_ignore_ascii_case(&dialect.metadata_type_name(expected))
        })
    });
    if !metadata_ok {
        return false;
    }

    let actual: HashMap<&str, String> = existing
        .columns
        .iter()
        .filter(|column| !is_final_table_metadata_column(&column.name))
        .map(|column| (column.name.as_str(), column.type_name.to_lowercase()))
        .collect();
    let expected: HashMap<&str, String> = stream
        .columns
        .iter()
        .map(|(column, airbyte_type)| {
            (
                column.name.as_str(),
                dialect.metadata_type_name(airbyte_type).to_lowercase(),
            )
        })
        .collect();

    actual == expected
}
