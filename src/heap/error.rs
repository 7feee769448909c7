use thiserror::Error;

use crate::buffer::BufferError;
use crate::file::{FileError, PageNo};

#[derive(Debug, Error)]
pub enum PageError {
    #[error("No space left in page")]
    NoSpace,

    #[error("Page holds no records")]
    NoRecords,

    #[error("No further records in page")]
    EndOfPage,

    #[error("Invalid slot: page_no={page_no}, slot_no={slot_no}")]
    InvalidSlot { page_no: PageNo, slot_no: u16 },

    #[error("Corrupt page: {0}")]
    Corrupt(String),
}

#[derive(Debug, Error)]
pub enum HeapError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("Buffer error: {0}")]
    Buffer(#[from] BufferError),

    #[error("Page error: {0}")]
    Page(#[from] PageError),

    #[error("Heap file already exists: {0}")]
    FileExists(String),

    #[error("Invalid record id: page_no={page_no}, slot_no={slot_no}")]
    BadRid { page_no: PageNo, slot_no: u16 },

    #[error("Invalid scan parameters")]
    BadScanParam,

    #[error("Scan is not positioned on a record")]
    BadScan,

    #[error("Record length {0} exceeds page capacity")]
    InvalidRecLen(usize),

    #[error("Heap file has no usable header page")]
    BadHeaderPage,

    #[error("End of heap file reached")]
    EndOfFile,
}

pub type HeapResult<T> = Result<T, HeapError>;
