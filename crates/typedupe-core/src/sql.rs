//! The `Sql` plan value handed from the generator to the execution driver.

/// An ordered list of transactions, each an ordered list of statements.
///
/// Blank statements are dropped on construction, and a transaction left
/// with no statements is dropped entirely, so callers can build plans from
/// optional fragments without special-casing them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Sql {
    pub transactions: Vec<Vec<String>>,
}

impl Sql {
    /// One statement in its own transaction.
    pub fn of(statement: impl Into<String>) -> Self {
        Self::transactionally([statement.into()])
    }

    /// All statements in a single transaction.
    pub fn transactionally<I, T>(statements: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        let statements = non_blank(statements);
        if statements.is_empty() {
            return Self::empty();
        }
        Self {
            transactions: vec![statements],
        }
    }

    /// Each statement in its own transaction.
    pub fn separately<I, T>(statements: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<String>,
    {
        Self {
            transactions: non_blank(statements)
                .into_iter()
                .map(|statement| vec![statement])
                .collect(),
        }
    }

    /// Concatenate several plans, preserving transaction boundaries.
    pub fn concat<I>(plans: I) -> Self
    where
        I: IntoIterator<Item = Sql>,
    {
        Self {
            transactions: plans
                .into_iter()
                .flat_map(|plan| plan.transactions)
                .collect(),
        }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.transactions.is_empty()
    }

    /// Every statement in execution order, ignoring transaction boundaries.
    pub fn statements(&self) -> impl Iterator<Item = &str> {
        self.transactions.iter().flatten().map(String::as_str)
    }
}

fn non_blank<I, T>(statements: I) -> Vec<String>
where
    I: IntoIterator<Item = T>,
    T: Into<String>,
{
    statements
        .into_iter()
        .map(Into::into)
        .filter(|s| !s.trim().is_empty())
        .collect()
}
