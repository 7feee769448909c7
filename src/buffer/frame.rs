use std::cell::RefCell;
use std::rc::Rc;

use crate::file::{FileHandle, INVALID_PAGE, PAGE_SIZE, PageNo};

/// A page-sized in-memory slot of the buffer pool
pub struct Frame {
    pub data: [u8; PAGE_SIZE],
}

impl Frame {
    pub(crate) fn new() -> Self {
        Self {
            data: [0u8; PAGE_SIZE],
        }
    }
}

/// Shared handle onto a pooled frame
///
/// Cloning the handle does not pin the page; the pin count in the
/// descriptor table is what keeps a frame resident.
pub type FrameRef = Rc<RefCell<Frame>>;

/// Bookkeeping for one frame of the pool
#[derive(Debug)]
pub(crate) struct FrameDesc {
    pub file: Option<FileHandle>,
    pub page_no: PageNo,
    pub frame_no: usize,
    pub pin_cnt: u32,
    pub dirty: bool,
    pub valid: bool,
    pub refbit: bool,
}

impl FrameDesc {
    pub fn new(frame_no: usize) -> Self {
        Self {
            file: None,
            page_no: INVALID_PAGE,
            frame_no,
            pin_cnt: 0,
            dirty: false,
            valid: false,
            refbit: false,
        }
    }

    /// Install a freshly read or allocated page: one pin, referenced, clean
    pub fn set(&mut self, file: FileHandle, page_no: PageNo) {
        self.file = Some(file);
        self.page_no = page_no;
        self.pin_cnt = 1;
        self.dirty = false;
        self.valid = true;
        self.refbit = true;
    }

    /// Return the frame to the invalid state
    pub fn clear(&mut self) {
        self.file = None;
        self.page_no = INVALID_PAGE;
        self.pin_cnt = 0;
        self.dirty = false;
        self.valid = false;
        self.refbit = false;
    }
}
