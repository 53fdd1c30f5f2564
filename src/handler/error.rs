use thiserror::Error;

/// Failures that abort a sync.
#[derive(Debug, Error)]
pub enum HandlerError {
    /// A transaction of a plan failed and was rolled back. `id` matches the
    /// correlation id in the logs.
    #[error("SQL transaction {id} failed")]
    Execution {
        id: String,
        #[source]
        source: anyhow::Error,
    },

    #[error("Failed to gather initial state of stream {stream}")]
    InitialState {
        stream: String,
        #[source]
        source: anyhow::Error,
    },
}
