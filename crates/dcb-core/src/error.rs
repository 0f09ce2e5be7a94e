use std::path::PathBuf;

/// Boundary error kinds for the event store.
///
/// Callers branch on variant, not on message text. `Concurrency` is a
/// refinement of `AppendConditionFailed`: code that wants to catch the
/// broad case should match `Error::AppendConditionFailed | Error::Concurrency { .. }`,
/// and [`Error::is_append_condition_failure`] does exactly that.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("store not found: {store}")]
    StoreNotFound { store: String },

    #[error("engine used before a store was configured")]
    ContextNotConfigured,

    #[error("invalid query: {reason}")]
    InvalidQuery { reason: String },

    #[error("append condition failed: {matched} event(s) matched the condition's query")]
    AppendConditionFailed { matched: usize },

    #[error(
        "concurrency conflict: expected sequence {expected_sequence}, actual sequence {actual_sequence}"
    )]
    Concurrency {
        expected_sequence: u64,
        actual_sequence: u64,
    },

    #[error(
        "timed out acquiring lock at {path} after {elapsed_ms}ms; increase `cross_process_lock_timeout` if contention is expected"
    )]
    Timeout { path: PathBuf, elapsed_ms: u64 },

    #[error("event not found at position {position}")]
    EventNotFound { position: u64 },

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("I/O error at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("operation cancelled")]
    Cancelled,

    #[error("invalid configuration: {fields:?}")]
    InvalidConfig { fields: Vec<String> },

    #[error("invalid argument: {reason}")]
    InvalidArgument { reason: String },
}

impl Error {
    /// True for `AppendConditionFailed` and its `Concurrency` refinement.
    pub fn is_append_condition_failure(&self) -> bool {
        matches!(
            self,
            Error::AppendConditionFailed { .. } | Error::Concurrency { .. }
        )
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::Io {
            path: path.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
