use thiserror::Error;

use crate::file::FileError;

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Key not present in index")]
    InvalidKey,

    #[error("End of index scan")]
    Eof,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Index structure corrupted: {0}")]
    Corrupted(String),
}

pub type IndexResult<T> = Result<T, IndexError>;
