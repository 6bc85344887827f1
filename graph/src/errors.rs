use std::path::PathBuf;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum GraphError {
    #[error("io error on {path}: {source}")]
    Io { path: PathBuf, source: std::io::Error },

    #[error("snapshot decode error on {path}: {source}")]
    Decode { path: PathBuf, source: Box<bincode::ErrorKind> },

    #[error("snapshot references invalid node: {0}")]
    InvalidNode(String),
}

pub type GraphResult<T> = std::result::Result<T, GraphError>;
