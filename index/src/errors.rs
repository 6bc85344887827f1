use provenance_database::prelude::StoreError;
use provenance_graph::GraphError;
use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum IndexError {
    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("incomplete input: {0}")]
    IncompleteInput(String),

    #[error("builder invariant violated: {0}")]
    InvariantViolation(String),
}

pub type IndexResult<T> = std::result::Result<T, IndexError>;
