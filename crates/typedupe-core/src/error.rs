use thiserror::Error;

/// Errors raised while reading stream declarations.
#[derive(Debug, Error)]
pub enum TypeError {
    #[error("Unknown column type name: {0}")]
    UnknownTypeName(String),

    #[error("Invalid column type declaration: {0}")]
    InvalidDeclaration(String),

    #[error("Stream '{stream}' declares primary key column '{column}' which is not a stream column")]
    UnknownPrimaryKeyColumn { stream: String, column: String },

    #[error("Stream '{stream}' declares cursor column '{column}' which is not a stream column")]
    UnknownCursorColumn { stream: String, column: String },

    #[error("Stream '{stream}' uses append_dedup but declares no primary key")]
    MissingPrimaryKey { stream: String },
}
