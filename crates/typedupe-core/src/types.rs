//! The protocol's abstract type system.
//!
//! `AirbyteType` describes what a stream column holds, independent of any
//! destination. Dialects map it to concrete column types via
//! `typedupe_sql::SqlDialect`.

use serde::{Deserialize, Deserializer};
use serde_json::{Map, Value};

use crate::error::TypeError;

/// Primitive types of the protocol.
///
/// Declaration order matters: [`AirbyteType::choose_type`] prefers
/// earlier variants when resolving a union.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AirbyteProtocolType {
    String,
    Number,
    Integer,
    Boolean,
    TimestampWithTimezone,
    TimestampWithoutTimezone,
    TimeWithTimezone,
    TimeWithoutTimezone,
    Date,
    Unknown,
}

impl AirbyteProtocolType {
    /// All primitive types in priority order.
    pub const ALL: [AirbyteProtocolType; 10] = [
        Self::String,
        Self::Number,
        Self::Integer,
        Self::Boolean,
        Self::TimestampWithTimezone,
        Self::TimestampWithoutTimezone,
        Self::TimeWithTimezone,
        Self::TimeWithoutTimezone,
        Self::Date,
        Self::Unknown,
    ];

    /// Short name used in configuration files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::TimestampWithTimezone => "timestamp_with_timezone",
            Self::TimestampWithoutTimezone => "timestamp_without_timezone",
            Self::TimeWithTimezone => "time_with_timezone",
            Self::TimeWithoutTimezone => "time_without_timezone",
            Self::Date => "date",
            Self::Unknown => "unknown",
        }
    }

    /// Parse the short configuration name.
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == name)
    }
}

impl std::fmt::Display for AirbyteProtocolType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A column type as declared by a stream's schema.
#[derive(Debug, Clone, PartialEq)]
pub enum AirbyteType {
    Primitive(AirbyteProtocolType),
    /// Object with named properties, in declaration order
    Struct(Vec<(String, AirbyteType)>),
    /// Array of a single item type
    Array(Box<AirbyteType>),
    /// Several acceptable types; resolved with [`AirbyteType::choose_type`]
    Union(Vec<AirbyteType>),
    /// A `oneOf` schema, which is never typed beyond a semi-structured value
    UnsupportedOneOf(Vec<AirbyteType>),
}

impl AirbyteType {
    pub const STRING: AirbyteType = AirbyteType::Primitive(AirbyteProtocolType::String);
    pub const NUMBER: AirbyteType = AirbyteType::Primitive(AirbyteProtocolType::Number);
    pub const INTEGER: AirbyteType = AirbyteType::Primitive(AirbyteProtocolType::Integer);
    pub const BOOLEAN: AirbyteType = AirbyteType::Primitive(AirbyteProtocolType::Boolean);
    pub const TIMESTAMP_WITH_TIMEZONE: AirbyteType =
        AirbyteType::Primitive(AirbyteProtocolType::TimestampWithTimezone);
    pub const UNKNOWN: AirbyteType = AirbyteType::Primitive(AirbyteProtocolType::Unknown);

    /// Resolve a union to the single member the destination column will use.
    ///
    /// Arrays win over structs, structs over primitives, and primitives are
    /// ranked by [`AirbyteProtocolType`] declaration order. An empty union is
    /// `Unknown`. Non-union types resolve to themselves.
    pub fn choose_type(&self) -> AirbyteType {
        match self {
            AirbyteType::Union(options) => options
                .iter()
                .min_by_key(|option| option.union_priority())
                .map(|chosen| chosen.choose_type())
                .unwrap_or(AirbyteType::UNKNOWN),
            other => other.clone(),
        }
    }

    fn union_priority(&self) -> i32 {
        match self {
            AirbyteType::Array(_) => -2,
            AirbyteType::Struct(_) => -1,
            AirbyteType::Primitive(p) => *p as i32,
            _ => i32::MAX,
        }
    }

    /// Parse a JSON schema fragment the way stream catalogs declare columns.
    pub fn from_json_schema(schema: &Value) -> AirbyteType {
        let Some(object) = schema.as_object() else {
            return AirbyteType::UNKNOWN;
        };

        if let Some(Value::Array(options)) = object.get("oneOf") {
            return AirbyteType::UnsupportedOneOf(
                options.iter().map(AirbyteType::from_json_schema).collect(),
            );
        }

        match object.get("type") {
            Some(Value::String(type_name)) => from_single_type(type_name, object),
            Some(Value::Array(type_names)) => {
                let non_null: Vec<&str> = type_names
                    .iter()
                    .filter_map(Value::as_str)
                    .filter(|t| *t != "null")
                    .collect();
                match non_null.as_slice() {
                    [] => AirbyteType::UNKNOWN,
                    [single] => from_single_type(single, object),
                    many => AirbyteType::Union(
                        many.iter().map(|t| from_single_type(t, object)).collect(),
                    ),
                }
            }
            _ if object.contains_key("properties") => struct_from_properties(object),
            _ => AirbyteType::UNKNOWN,
        }
    }

    /// Parse the compact form used by configuration files: either a
    /// primitive name, `"object"`, `"array"`, or a JSON schema object.
    pub fn from_config_value(value: &Value) -> Result<AirbyteType, TypeError> {
        match value {
            Value::String(name) => match name.as_str() {
                "object" | "struct" => Ok(AirbyteType::Struct(Vec::new())),
                "array" => Ok(AirbyteType::Array(Box::new(AirbyteType::UNKNOWN))),
                other => AirbyteProtocolType::from_name(other)
                    .map(AirbyteType::Primitive)
                    .ok_or_else(|| TypeError::UnknownTypeName(other.to_string())),
            },
            Value::Object(_) => Ok(AirbyteType::from_json_schema(value)),
            other => Err(TypeError::InvalidDeclaration(other.to_string())),
        }
    }
}

fn from_single_type(type_name: &str, schema: &Map<String, Value>) -> AirbyteType {
    let format = schema.get("format").and_then(Value::as_str);
    let airbyte_type = schema.get("airbyte_type").and_then(Value::as_str);

    match type_name {
        "string" => match format {
            Some("date") => AirbyteType::Primitive(AirbyteProtocolType::Date),
            Some("date-time") => {
                if airbyte_type == Some("timestamp_without_timezone") {
                    AirbyteType::Primitive(AirbyteProtocolType::TimestampWithoutTimezone)
                } else {
                    AirbyteType::Primitive(AirbyteProtocolType::TimestampWithTimezone)
                }
            }
            Some("time") => {
                if airbyte_type == Some("time_without_timezone") {
                    AirbyteType::Primitive(AirbyteProtocolType::TimeWithoutTimezone)
                } else {
                    AirbyteType::Primitive(AirbyteProtocolType::TimeWithTimezone)
                }
            }
            _ => AirbyteType::STRING,
        },
        "number" => {
            if airbyte_type == Some("integer") {
                AirbyteType::INTEGER
            } else {
                AirbyteType::NUMBER
            }
        }
        "integer" => AirbyteType::INTEGER,
        "boolean" => AirbyteType::BOOLEAN,
        "object" => struct_from_properties(schema),
        "array" => {
            let items = schema
                .get("items")
                .map(AirbyteType::from_json_schema)
                .unwrap_or(AirbyteType::UNKNOWN);
            AirbyteType::Array(Box::new(items))
        }
        _ => AirbyteType::UNKNOWN,
    }
}

fn struct_from_properties(schema: &Map<String, Value>) -> AirbyteType {
    let properties = schema
        .get("properties")
        .and_then(Value::as_object)
        .map(|props| {
            props
                .iter()
                .map(|(name, prop)| (name.clone(), AirbyteType::from_json_schema(prop)))
                .collect()
        })
        .unwrap_or_default();
    AirbyteType::Struct(properties)
}

// Configuration files may write a column type either as a short name
// ("integer") or as a JSON schema object ({ type = "string", format = "date" }).
impl<'de> Deserialize<'de> for AirbyteType {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        AirbyteType::from_config_value(&value).map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_union_prefers_array_then_struct() {
        let union = AirbyteType::Union(vec![
            AirbyteType::STRING,
            AirbyteType::Struct(vec![]),
            AirbyteType::Array(Box::new(AirbyteType::INTEGER)),
        ]);
        assert_eq!(
            union.choose_type(),
            AirbyteType::Array(Box::new(AirbyteType::INTEGER))
        );

        let union = AirbyteType::Union(vec![AirbyteType::INTEGER, AirbyteType::Struct(vec![])]);
        assert_eq!(union.choose_type(), AirbyteType::Struct(vec![]));
    }

    #[test]
    fn test_union_of_primitives_uses_declaration_order() {
        let union = AirbyteType::Union(vec![AirbyteType::INTEGER, AirbyteType::STRING]);
        assert_eq!(union.choose_type(), AirbyteType::STRING);

        let union = AirbyteType::Union(vec![AirbyteType::BOOLEAN, AirbyteType::NUMBER]);
        assert_eq!(union.choose_type(), AirbyteType::NUMBER);
    }

    #[test]
    fn test_degenerate_unions() {
        assert_eq!(AirbyteType::Union(vec![]).choose_type(), AirbyteType::UNKNOWN);
        assert_eq!(
            AirbyteType::Union(vec![AirbyteType::BOOLEAN]).choose_type(),
            AirbyteType::BOOLEAN
        );
    }

    #[test]
    fn test_from_json_schema_primitives() {
        assert_eq!(
            AirbyteType::from_json_schema(&json!({"type": "string"})),
            AirbyteType::STRING
        );
        assert_eq!(
            AirbyteType::from_json_schema(&json!({"type": ["null", "integer"]})),
            AirbyteType::INTEGER
        );
        assert_eq!(
            AirbyteType::from_json_schema(&json!({"type": "number", "airbyte_type": "integer"})),
            AirbyteType::INTEGER
        );
        assert_eq!(
            AirbyteType::from_json_schema(&json!({"type": "string", "format": "date"})),
            AirbyteType::Primitive(AirbyteProtocolType::Date)
        );
        assert_eq!(
            AirbyteType::from_json_schema(&json!({
                "type": "string",
                "format": "date-time",
                "airbyte_type": "timestamp_without_timezone"
            })),
            AirbyteType::Primitive(AirbyteProtocolType::TimestampWithoutTimezone)
        );
        assert_eq!(
            AirbyteType::from_json_schema(&json!({"type": "string", "format": "time"})),
            AirbyteType::Primitive(AirbyteProtocolType::TimeWithTimezone)
        );
        assert_eq!(AirbyteType::from_json_schema(&json!({})), AirbyteType::UNKNOWN);
    }

    #[test]
    fn test_from_json_schema_composites() {
        let parsed = AirbyteType::from_json_schema(&json!({
            "type": "object",
            "properties": {"a": {"type": "boolean"}}
        }));
        assert_eq!(
            parsed,
            AirbyteType::Struct(vec![("a".to_string(), AirbyteType::BOOLEAN)])
        );

        let parsed = AirbyteType::from_json_schema(&json!({"type": "array"}));
        assert_eq!(parsed, AirbyteType::Array(Box::new(AirbyteType::UNKNOWN)));

        let parsed = AirbyteType::from_json_schema(&json!({"type": ["string", "integer"]}));
        assert_eq!(
            parsed,
            AirbyteType::Union(vec![AirbyteType::STRING, AirbyteType::INTEGER])
        );

        let parsed = AirbyteType::from_json_schema(&json!({
            "oneOf": [{"type": "string"}, {"type": "integer"}]
        }));
        assert!(matches!(parsed, AirbyteType::UnsupportedOneOf(ref o) if o.len() == 2));
    }

    #[test]
    fn test_deserialize_config_forms() {
        #[derive(Deserialize)]
        struct Column {
            #[serde(rename = "type")]
            column_type: AirbyteType,
        }

        let column: Column = toml::from_str(r#"type = "timestamp_with_timezone""#).unwrap();
        assert_eq!(column.column_type, AirbyteType::TIMESTAMP_WITH_TIMEZONE);

        let column: Column =
            toml::from_str(r#"type = { type = "string", format = "date" }"#).unwrap();
        assert_eq!(
            column.column_type,
            AirbyteType::Primitive(AirbyteProtocolType::Date)
        );

        let err = toml::from_str::<Column>(r#"type = "varchar""#);
        assert!(err.is_err());
    }
}
