//! Reserved column and table names.

/// Unique id assigned to each record when it lands in the raw table.
pub const RAW_ID: &str = "_airbyte_raw_id";
/// When the source emitted the record.
pub const EXTRACTED_AT: &str = "_airbyte_extracted_at";
/// When typing and deduping promoted the record. NULL until then.
pub const LOADED_AT: &str = "_airbyte_loaded_at";
/// The record payload as JSON.
pub const DATA: &str = "_airbyte_data";
/// Per-record metadata, including typing errors.
pub const META: &str = "_airbyte_meta";

// Legacy (v1) raw table columns
pub const V1_AB_ID: &str = "_airbyte_ab_id";
pub const V1_DATA: &str = "_airbyte_data";
pub const V1_EMITTED_AT: &str = "_airbyte_emitted_at";

/// Column a CDC source sets when a record was deleted upstream.
pub const CDC_DELETED_AT: &str = "_ab_cdc_deleted_at";

/// Suffix of the shadow table an overwrite sync writes into.
pub const TMP_TABLE_SUFFIX: &str = "_airbyte_tmp";

/// Table holding per-stream destination state.
pub const DESTINATION_STATE_TABLE: &str = "_airbyte_destination_state";

/// Metadata columns every final table carries after the declared columns.
pub const FINAL_TABLE_METADATA_COLUMNS: [&str; 3] = [RAW_ID, EXTRACTED_AT, META];

/// Whether `name` is one of the final table's metadata columns.
pub fn is_final_table_metadata_column(name: &str) -> bool {
    FINAL_TABLE_METADATA_COLUMNS
        .iter()
        .any(|c| c.eq_ignore_ascii_case(name))
}
