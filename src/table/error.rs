use std::io;
use thiserror::Error;

use crate::file::FileError;
use crate::index::IndexError;
use crate::record::RecordError;
use crate::transaction::TransactionError;

#[derive(Debug, Error)]
pub enum TableError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record error: {0}")]
    Record(#[from] RecordError),

    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Metadata error: {0}")]
    Metadata(#[from] serde_json::Error),

    #[error("Schema mismatch: {0}")]
    SchemaMismatch(String),

    #[error("Field {0} not found")]
    FieldNotFound(String),

    #[error("Index {0} already exists")]
    IndexExists(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type TableResult<T> = Result<T, TableError>;
