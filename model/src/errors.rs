use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SwhidError {
    #[error("malformed identifier: {0}")]
    MalformedIdentifier(String),

    #[error("unsupported identifier version: {0}")]
    UnsupportedVersion(String),

    #[error("unknown object type: {0}")]
    UnknownType(String),

    #[error("unknown object type tag: {0}")]
    UnknownTypeTag(u8),

    #[error("invalid hash: {0}")]
    InvalidHash(String),

    #[error("invalid identifier length: {0}")]
    InvalidLength(usize),
}
