use crate::db::DbError;

/// Everything that can abort the handling of one event.
///
/// Each storage phase has its own variant so a failure tells which step of
/// the insert pipeline gave up. Nothing is retried.
#[derive(thiserror::Error, Debug)]
pub enum HandlerError {
    #[error("configuration error: {0}")]
    Configuration(String),
    #[error("invalid event: {0}")]
    Event(String),
    #[error("failed to read event: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to connect to database: {0}")]
    Connection(DbError),
    #[error("failed to begin transaction: {0}")]
    Transaction(DbError),
    #[error("failed to prepare insert statement: {0}")]
    Prepare(DbError),
    #[error("failed to serialize tags of metric {metric}: {source}")]
    Serialization {
        metric: String,
        source: serde_json::Error,
    },
    #[error("failed to insert point {index} ({metric}): {source}")]
    Execution {
        index: usize,
        metric: String,
        source: DbError,
    },
    #[error("failed to commit transaction: {0}")]
    Commit(DbError),
}

pub type Result<T> = std::result::Result<T, HandlerError>;
