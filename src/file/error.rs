use std::io;
use thiserror::Error;

use super::PageNum;

#[derive(Debug, Error)]
pub enum FileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("File not found: {0}")]
    FileNotFound(String),

    #[error("File already exists: {0}")]
    FileAlreadyExists(String),

    #[error("Invalid file handle: {0}")]
    InvalidHandle(usize),

    #[error("Invalid page number: {0}")]
    InvalidPageNum(PageNum),

    #[error("Page not resident in buffer pool: page_num={0}")]
    PageNotCached(PageNum),

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },
}

pub type FileResult<T> = Result<T, FileError>;
