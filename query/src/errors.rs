use provenance_database::prelude::StoreError;
use provenance_model::errors::SwhidError;
use thiserror::Error;

/// Query failure taxonomy. `NotFound` is not represented here: missing nodes
/// and missing provenance yield empty results, not errors.
#[derive(Error, Debug)]
pub enum QueryError {
    #[error("invalid input: {0}")]
    Input(#[from] SwhidError),

    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("corrupt table data: {0}")]
    Corruption(String),

    #[error("query cancelled")]
    Cancelled,

    #[error("deadline exceeded")]
    DeadlineExceeded,
}

impl From<StoreError> for QueryError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::Cancelled => QueryError::Cancelled,
            err if err.is_corruption() => QueryError::Corruption(err.to_string()),
            err => QueryError::Unavailable(err.to_string()),
        }
    }
}

impl QueryError {
    /// Transient failures worth retrying with backoff.
    pub fn is_transient(&self) -> bool {
        matches!(self, QueryError::Unavailable(_))
    }
}

pub type QueryResult<T> = std::result::Result<T, QueryError>;
