use std::path::PathBuf;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("database error: {0}")]
    Redb(#[from] redb::Error),

    #[error("database storage error: {0}")]
    RedbStorage(#[from] redb::StorageError),

    #[error("database transaction error: {0}")]
    RedbTransaction(#[from] redb::TransactionError),

    #[error("database table error: {0}")]
    RedbTable(#[from] redb::TableError),

    #[error("database commit error: {0}")]
    RedbCommit(#[from] redb::CommitError),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    #[error("data directory does not exist and could not be created: {0}")]
    DataDir(PathBuf),

    /// A storage backend could not be reached at initialization. Fatal to
    /// startup, unlike an empty store which is a normal first run.
    #[error("storage unavailable: {0}")]
    StorageUnavailable(String),

    /// An external provider call (embedding, LLM, vector store, speech)
    /// failed. Failures are reported once and not retried.
    #[error("{provider} provider failure: {message}")]
    Provider {
        provider: &'static str,
        message: String,
    },

    /// The in-memory index mutated but the following persist did not commit;
    /// durable state is behind memory until the next successful persist.
    #[error("persist failed, on-disk state is behind memory: {0}")]
    Persist(String),
}

impl Error {
    pub(crate) fn provider(provider: &'static str, err: impl std::fmt::Display) -> Self {
        Error::Provider {
            provider,
            message: err.to_string(),
        }
    }
}
