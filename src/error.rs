//! Error types for basalt

use std::io;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Malformed index: {0}")]
    Corruption(String),

    #[error("Malformed query: {0}")]
    Query(String),

    #[error("Precondition not met: {0}")]
    Precondition(String),
}

pub type Result<T> = std::result::Result<T, Error>;
