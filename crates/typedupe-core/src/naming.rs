//! Identifier normalization.
//!
//! Destinations restrict which characters may appear in schema, table and
//! column names. A `NameTransformer` turns the names a source declares into
//! names the destination accepts; the original names are kept alongside for
//! JSON extraction and state keys.

/// Destination-specific naming rules.
pub trait NameTransformer: Send + Sync {
    /// Normalize a column identifier.
    fn identifier(&self, name: &str) -> String;

    /// Normalize a schema name.
    fn namespace(&self, namespace: &str) -> String {
        self.identifier(namespace)
    }

    /// Normalize a table name.
    fn stream_name(&self, name: &str) -> String {
        self.identifier(name)
    }
}

/// Replaces every character outside `[A-Za-z0-9_]` with an underscore.
#[derive(Debug, Clone, Copy, Default)]
pub struct StandardNameTransformer;

impl NameTransformer for StandardNameTransformer {
    fn identifier(&self, name: &str) -> String {
        to_alphanumeric_and_underscore(name)
    }
}

/// Replace every character that is not an ASCII letter, digit or `_`.
pub fn to_alphanumeric_and_underscore(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect()
}

/// Build the raw table name for a stream.
///
/// The separator is two underscores longer than the longest underscore run
/// in `namespace + name`, so distinct (namespace, name) pairs can never
/// produce the same raw table name.
pub fn concatenate_raw_table_name(namespace: &str, name: &str) -> String {
    let plain = format!("{namespace}{name}");
    let mut longest_run = 0;
    let mut current_run = 0;
    for c in plain.chars() {
        if c == '_' {
            current_run += 1;
            longest_run = longest_run.max(current_run);
        } else {
            current_run = 0;
        }
    }
    let underscores = "_".repeat(longest_run + 2);
    format!("{namespace}_raw{underscores}stream_{name}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_transformer() {
        let naming = StandardNameTransformer;
        assert_eq!(naming.identifier("user id"), "user_id");
        assert_eq!(naming.identifier("amount$usd"), "amount_usd");
        assert_eq!(naming.identifier("plain_name9"), "plain_name9");
    }

    #[test]
    fn test_raw_table_name_separator() {
        assert_eq!(concatenate_raw_table_name("public", "users"), "public_raw__stream_users");
        assert_eq!(concatenate_raw_table_name("a_b", "c"), "a_b_raw___stream_c");
        assert_eq!(concatenate_raw_table_name("a", "b__c"), "a_raw____stream_b__c");
    }

    #[test]
    fn test_raw_table_names_do_not_collide() {
        assert_ne!(
            concatenate_raw_table_name("a_raw", "stream_b"),
            concatenate_raw_table_name("a", "raw_stream_b")
        );
    }
}
