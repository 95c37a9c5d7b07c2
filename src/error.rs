use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("stored payload is not valid JSON: {0}")]
    Payload(#[from] serde_json::Error),

    #[error("bad timestamp in store: {0}")]
    Timestamp(#[from] chrono::ParseError),

    #[error("record store lock poisoned")]
    Poisoned,
}

/// Failure of a data-access operation.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("upstream error: {0}")]
    Upstream(String),

    #[error("unexpected response: {0}")]
    Parse(String),

    #[error("record store failed: {0}")]
    Store(#[from] StoreError),

    #[error("invalid input: {0}")]
    InvalidInput(String),
}

impl From<reqwest::Error> for LookupError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            LookupError::Parse(err.to_string())
        } else {
            LookupError::Upstream(err.to_string())
        }
    }
}

pub type LookupResult<T> = std::result::Result<T, LookupError>;
