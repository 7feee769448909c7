use std::io;
use thiserror::Error;

use super::PageNo;

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

    #[error("File handle limit reached")]
    TooManyOpenFiles,

    #[error("Invalid page number: {0}")]
    InvalidPageNo(PageNo),

    #[error("Invalid page size: expected {expected}, got {actual}")]
    InvalidPageSize { expected: usize, actual: usize },

    #[error("Corrupt file header: {0}")]
    CorruptHeader(String),
}

pub type FileResult<T> = Result<T, FileError>;
