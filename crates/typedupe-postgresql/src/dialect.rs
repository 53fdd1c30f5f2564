//! PostgreSQL type mapping and JSONB casting.

use typedupe_core::columns::{CDC_DELETED_AT, DATA, LOADED_AT};
use typedupe_core::{AirbyteProtocolType, AirbyteType, ColumnId};
use typedupe_sql::SqlDialect;

#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect {
    /// Drop dependent views along with replaced tables.
    pub cascade_drop: bool,
}

/// How a column's value is read out of `_airbyte_data`.
enum Extraction {
    /// `->>`, a text value to cast
    Text,
    /// `->`, a JSONB value kept as is
    Json,
}

fn extraction(airbyte_type: &AirbyteType) -> Extraction {
    match airbyte_type.choose_type() {
        AirbyteType::Primitive(AirbyteProtocolType::Unknown)
        | AirbyteType::Struct(_)
        | AirbyteType::Array(_)
        | AirbyteType::UnsupportedOneOf(_)
        | AirbyteType::Union(_) => Extraction::Json,
        AirbyteType::Primitive(_) => Extraction::Text,
    }
}

// Value shapes a text cast accepts. Each pattern is no looser than the
// server's input parser, so a matching value always casts.
const DATE: &str = concat!(
    "([1-9][0-9]{3}-(0[1-9]|1[0-2])-(0[1-9]|1[0-9]|2[0-8])",
    "|[1-9][0-9]{3}-(0[13-9]|1[0-2])-(29|30)",
    "|[1-9][0-9]{3}-(0[13578]|1[02])-31",
    "|([1-9][0-9](0[48]|[2468][048]|[13579][26])|([2468][048]|[13579][26])00)-02-29)"
);
const TIME: &str = "([01][0-9]|2[0-3]):[0-5][0-9](:[0-5][0-9]([.][0-9]+)?)?";
const ZONE: &str = "(Z|[+-](0[0-9]|1[0-4])(:?[0-5][0-9])?)";

/// Regex a text value must match before it is cast to `protocol_type`.
/// Types every text casts to have none.
fn valid_input_pattern(protocol_type: AirbyteProtocolType) -> Option<String> {
    let pattern = match protocol_type {
        AirbyteProtocolType::String | AirbyteProtocolType::Unknown => return None,
        // at most 18 digits always fits in a BIGINT
        AirbyteProtocolType::Integer => "^[-+]?[0-9]{1,18}$".to_string(),
        // 28 integer digits leave room for rounding into DECIMAL(38, 9)
        AirbyteProtocolType::Number => "^[-+]?([0-9]{1,28}([.][0-9]*)?|[.][0-9]+)$".to_string(),
        AirbyteProtocolType::Boolean => "^(t|true|f|false|y|yes|n|no|on|off|1|0)$".to_string(),
        AirbyteProtocolType::TimestampWithTimezone
        | AirbyteProtocolType::TimestampWithoutTimezone => {
            format!("^{DATE}([T ]{TIME}{ZONE}?)?$")
        }
        AirbyteProtocolType::TimeWithTimezone => format!("^{TIME}{ZONE}?$"),
        AirbyteProtocolType::TimeWithoutTimezone => format!("^{TIME}$"),
        AirbyteProtocolType::Date => format!("^{DATE}$"),
    };
    Some(pattern)
}

impl PostgresDialect {
    fn json_field(&self, original_name: &str) -> String {
        format!(
            "{}->{}",
            self.quote_identifier(DATA),
            self.string_literal(original_name)
        )
    }

    /// Condition true when the source sent a non-null value for the field.
    fn has_value(&self, original_name: &str) -> String {
        let json = self.json_field(original_name);
        format!("({json}) IS NOT NULL AND jsonb_typeof({json}) <> 'null'")
    }
}

impl SqlDialect for PostgresDialect {
    fn struct_type(&self) -> String {
        "JSONB".to_string()
    }

    fn array_type(&self) -> String {
        "JSONB".to_string()
    }

    fn widest_type(&self) -> String {
        "JSONB".to_string()
    }

    fn protocol_type(&self, protocol_type: AirbyteProtocolType) -> String {
        match protocol_type {
            AirbyteProtocolType::String => "VARCHAR",
            AirbyteProtocolType::Number => "DECIMAL(38, 9)",
            AirbyteProtocolType::Integer => "BIGINT",
            AirbyteProtocolType::Boolean => "BOOLEAN",
            AirbyteProtocolType::TimestampWithTimezone => "TIMESTAMP WITH TIME ZONE",
            AirbyteProtocolType::TimestampWithoutTimezone => "TIMESTAMP",
            AirbyteProtocolType::TimeWithTimezone => "TIME WITH TIME ZONE",
            AirbyteProtocolType::TimeWithoutTimezone => "TIME",
            AirbyteProtocolType::Date => "DATE",
            AirbyteProtocolType::Unknown => "JSONB",
        }
        .to_string()
    }

    // udt_name as reported by information_schema.columns
    fn metadata_type_name(&self, airbyte_type: &AirbyteType) -> String {
        match airbyte_type.choose_type() {
            AirbyteType::Primitive(p) => match p {
                AirbyteProtocolType::String => "varchar",
                AirbyteProtocolType::Number => "numeric",
                AirbyteProtocolType::Integer => "int8",
                AirbyteProtocolType::Boolean => "bool",
                AirbyteProtocolType::TimestampWithTimezone => "timestamptz",
                AirbyteProtocolType::TimestampWithoutTimezone => "timestamp",
                AirbyteProtocolType::TimeWithTimezone => "timetz",
                AirbyteProtocolType::TimeWithoutTimezone => "time",
                AirbyteProtocolType::Date => "date",
                AirbyteProtocolType::Unknown => "jsonb",
            },
            _ => "jsonb",
        }
        .to_string()
    }

    fn extract_field(&self, original_name: &str, airbyte_type: &AirbyteType) -> String {
        match extraction(airbyte_type) {
            Extraction::Json => self.json_field(original_name),
            Extraction::Text => format!(
                "({}->>{})",
                self.quote_identifier(DATA),
                self.string_literal(original_name)
            ),
        }
    }

    fn cast_field(
        &self,
        column: &ColumnId,
        airbyte_type: &AirbyteType,
        use_expensive_safer_casting: bool,
    ) -> String {
        let field = self.extract_field(&column.original_name, airbyte_type);
        match airbyte_type.choose_type() {
            // A struct or array column only keeps JSON of the matching shape.
            AirbyteType::Struct(_) => {
                format!("CASE WHEN jsonb_typeof({field}) = 'object' THEN {field} END")
            }
            AirbyteType::Array(_) => {
                format!("CASE WHEN jsonb_typeof({field}) = 'array' THEN {field} END")
            }
            AirbyteType::Primitive(AirbyteProtocolType::Unknown)
            | AirbyteType::UnsupportedOneOf(_)
            | AirbyteType::Union(_) => field,
            AirbyteType::Primitive(p) => {
                let target = self.protocol_type(p);
                match valid_input_pattern(p).filter(|_| use_expensive_safer_casting) {
                    Some(pattern) => {
                        // boolean input is case-insensitive
                        let value = if p == AirbyteProtocolType::Boolean {
                            format!("lower({field})")
                        } else {
                            field.clone()
                        };
                        format!(
                            "CASE WHEN {value} ~ {} THEN CAST({field} AS {target}) END",
                            self.string_literal(&pattern)
                        )
                    }
                    None => format!("CAST({field} AS {target})"),
                }
            }
        }
    }

    fn airbyte_meta_column(
        &self,
        columns: &[(ColumnId, AirbyteType)],
        use_expensive_safer_casting: bool,
    ) -> String {
        let errors: Vec<String> = columns
            .iter()
            .map(|(column, airbyte_type)| {
                format!(
                    "CASE WHEN {} AND ({}) IS NULL THEN jsonb_build_object('field', {}, 'change', 'NULLED', 'reason', 'DESTINATION_TYPECAST_ERROR') END",
                    self.has_value(&column.original_name),
                    self.cast_field(column, airbyte_type, use_expensive_safer_casting),
                    self.string_literal(&column.original_name),
                )
            })
            .collect();

        format!(
            "jsonb_build_object('changes', jsonb_path_query_array(jsonb_build_array({}), '$[*] ? (@ != null)'))",
            errors.join(", ")
        )
    }

    fn cdc_deleted_at_not_null_condition(&self) -> String {
        format!(
            "({} IS NOT NULL AND jsonb_typeof({}) <> 'null')",
            self.quote_identifier(LOADED_AT),
            self.json_field(CDC_DELETED_AT)
        )
    }

    fn cascade_drop(&self) -> bool {
        self.cascade_drop
    }
}
