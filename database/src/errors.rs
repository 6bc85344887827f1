use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("table {0} not found in store")]
    TableNotFound(String),

    #[error("table {0} is incomplete (no success marker)")]
    TableIncomplete(String),

    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("parquet error on {path}: {source}")]
    Parquet { path: PathBuf, source: parquet::errors::ParquetError },

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("sidecar decode error on {path}: {source}")]
    Sidecar { path: PathBuf, source: Box<bincode::ErrorKind> },

    #[error("corrupt table file {path}: {reason}")]
    Corruption { path: PathBuf, reason: String },

    #[error("unsupported database url: {0}")]
    UnsupportedUrl(String),

    #[error("lookup cancelled")]
    Cancelled,
}

impl StoreError {
    pub fn io(path: impl AsRef<Path>, source: std::io::Error) -> Self {
        Self::Io { path: path.as_ref().to_path_buf(), source }
    }

    pub fn parquet(path: impl AsRef<Path>, source: parquet::errors::ParquetError) -> Self {
        Self::Parquet { path: path.as_ref().to_path_buf(), source }
    }

    pub fn corruption(path: impl AsRef<Path>, reason: impl Into<String>) -> Self {
        Self::Corruption { path: path.as_ref().to_path_buf(), reason: reason.into() }
    }

    /// Errors that quarantine the offending file for the process lifetime.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corruption { .. } | Self::Sidecar { .. } | Self::Parquet { .. })
    }
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;
