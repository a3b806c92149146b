use thiserror::Error;

use crate::file::FileError;

use super::Rid;

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Record handler already open")]
    AlreadyOpen,

    #[error("Page is full")]
    PageFull,

    #[error("Record does not exist")]
    NotExist,

    #[error("Invalid record id: {0:?}")]
    InvalidRid(Rid),

    #[error("End of records")]
    Eof,

    #[error("Scanner is closed")]
    Closed,

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type RecordResult<T> = Result<T, RecordError>;
