//! Introspected table definitions.

/// One column as the destination catalog reports it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ColumnDefinition {
    pub name: String,
    /// Catalog type name, e.g. `int8` or `timestamptz` on PostgreSQL.
    pub type_name: String,
    pub column_size: Option<i32>,
    pub is_nullable: bool,
}

/// Columns of an existing table in ordinal order.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TableDefinition {
    pub columns: Vec<ColumnDefinition>,
}

impl TableDefinition {
    pub fn new(columns: Vec<ColumnDefinition>) -> Self {
        Self { columns }
    }

    pub fn column(&self, name: &str) -> Option<&ColumnDefinition> {
        self.columns.iter().find(|c| c.name == name)
    }
}
