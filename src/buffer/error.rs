use thiserror::Error;

use crate::file::{FileError, PageNo};

#[derive(Debug, Error)]
pub enum BufferError {
    #[error("File error: {0}")]
    File(#[from] FileError),

    #[error("All buffer frames are pinned")]
    BufferExceeded,

    #[error("Page {1} of file {0} is not in the buffer pool")]
    PageNotFound(usize, PageNo),

    #[error("Page {1} of file {0} is not pinned")]
    PageNotPinned(usize, PageNo),

    #[error("Page {1} of file {0} is still pinned")]
    PagePinned(usize, PageNo),

    #[error("Buffer frame {0} is in an inconsistent state")]
    BadBuffer(usize),

    #[error("Frame table error: {0}")]
    FrameTable(String),
}

pub type BufferResult<T> = Result<T, BufferError>;
