use std::rc::Rc;

use log::{debug, warn};

use crate::buffer::{BufMgr, BufMgrRef, BufferError, FrameRef};
use crate::file::{FileError, FileHandle, INVALID_PAGE, PageNo};

use super::error::{HeapError, HeapResult};
use super::header::FileHdrPage;
use super::page::{NULL_RID, Rid, SlottedPage};

/// Create a heap file: a header page plus one empty data page
pub fn create_heap_file(bufmgr: &BufMgrRef, name: &str) -> HeapResult<()> {
    let mut bm = bufmgr.borrow_mut();

    // if the page store can open it, it already exists
    match bm.file_manager_mut().open_file(name) {
        Ok(file) => {
            bm.file_manager_mut().close_file(file)?;
            return Err(HeapError::FileExists(name.to_string()));
        }
        Err(FileError::FileNotFound(_)) => {}
        Err(e) => return Err(e.into()),
    }

    bm.file_manager_mut().create_file(name)?;
    let file = bm.file_manager_mut().open_file(name)?;

    let result = init_heap_file(&mut bm, file, name).and_then(|_| {
        // the new pages must reach disk before the handle goes away
        Ok(bm.flush_file(file)?)
    });
    if result.is_err() {
        if let Err(e) = bm.file_manager_mut().close_file(file) {
            warn!("close of {} after failed create: {}", name, e);
        }
        return result;
    }

    bm.file_manager_mut().close_file(file)?;
    debug!("created heap file {}", name);
    Ok(())
}

fn init_heap_file(bm: &mut BufMgr, file: FileHandle, name: &str) -> HeapResult<()> {
    let (hdr_page_no, hdr_frame) = bm.alloc_page(file)?;

    let (data_page_no, data_frame) = match bm.alloc_page(file) {
        Ok(page) => page,
        Err(e) => {
            let _ = bm.unpin_page(file, hdr_page_no, false);
            return Err(e.into());
        }
    };

    {
        let mut frame = data_frame.borrow_mut();
        SlottedPage::init(&mut frame.data, data_page_no)?;
    }
    {
        let mut frame = hdr_frame.borrow_mut();
        frame.data.fill(0);
        let mut header = FileHdrPage::new(name);
        header.first_page = data_page_no;
        header.last_page = data_page_no;
        header.page_cnt = 2;
        header.rec_cnt = 0;
        header.store(&mut frame.data);
    }

    if let Err(e) = bm.unpin_page(file, data_page_no, true) {
        let _ = bm.unpin_page(file, hdr_page_no, true);
        return Err(e.into());
    }
    bm.unpin_page(file, hdr_page_no, true)?;
    Ok(())
}

/// Delete a heap file from the page store
pub fn destroy_heap_file(bufmgr: &BufMgrRef, name: &str) -> HeapResult<()> {
    let mut bm = bufmgr.borrow_mut();

    // drop any cached pages before the file goes away; a pinned page means
    // the file is still in use and destruction is refused
    if let Ok(file) = bm.file_manager_mut().open_file(name) {
        let flushed = bm.flush_file(file);
        let closed = bm.file_manager_mut().close_file(file);
        flushed?;
        closed?;
    }

    bm.file_manager_mut().remove_file(name)?;
    Ok(())
}

/// Open handle on a heap file
///
/// Holds a pin on the header page for its whole lifetime and on at most
/// one data page (the cursor page) at any moment.
pub struct HeapFile {
    pub(crate) bufmgr: BufMgrRef,
    pub(crate) file: FileHandle,
    pub(crate) header_page: FrameRef,
    pub(crate) header_page_no: PageNo,
    pub(crate) hdr_dirty: bool,
    pub(crate) cur_page: Option<FrameRef>,
    pub(crate) cur_page_no: PageNo,
    pub(crate) cur_dirty: bool,
    pub(crate) cur_rec: Rid,
}

impl HeapFile {
    /// Open an existing heap file, pinning its header page
    pub fn open(bufmgr: &BufMgrRef, name: &str) -> HeapResult<Self> {
        debug!("opening heap file {}", name);
        let mut bm = bufmgr.borrow_mut();
        let file = bm.file_manager_mut().open_file(name)?;

        let header_page_no = match bm.file_manager_mut().first_page(file) {
            Ok(page_no) if page_no >= 0 => page_no,
            Ok(_) => {
                let _ = bm.file_manager_mut().close_file(file);
                return Err(HeapError::BadHeaderPage);
            }
            Err(e) => {
                let _ = bm.file_manager_mut().close_file(file);
                return Err(e.into());
            }
        };

        let header_page = match bm.read_page(file, header_page_no) {
            Ok(frame) => frame,
            Err(e) => {
                let _ = bm.file_manager_mut().close_file(file);
                return Err(e.into());
            }
        };
        let header = FileHdrPage::load(&header_page.borrow().data);

        // start the cursor on the first data page when there is one
        let (cur_page, cur_page_no) = if header.first_page != INVALID_PAGE {
            match bm.read_page(file, header.first_page) {
                Ok(frame) => (Some(frame), header.first_page),
                Err(e) => {
                    let _ = bm.unpin_page(file, header_page_no, false);
                    let _ = bm.file_manager_mut().close_file(file);
                    return Err(e.into());
                }
            }
        } else {
            (None, INVALID_PAGE)
        };

        drop(bm);
        Ok(Self {
            bufmgr: Rc::clone(bufmgr),
            file,
            header_page,
            header_page_no,
            hdr_dirty: false,
            cur_page,
            cur_page_no,
            cur_dirty: false,
            cur_rec: NULL_RID,
        })
    }

    /// Number of live records in the file
    pub fn get_rec_cnt(&self) -> i32 {
        self.header().rec_cnt
    }

    /// Name recorded in the header page
    pub fn name(&self) -> String {
        self.header().file_name()
    }

    /// Fetch a record by identifier, moving the cursor to its page
    pub fn get_record(&mut self, rid: Rid) -> HeapResult<Vec<u8>> {
        if rid.page_no < 0 || rid.slot_no == 0 {
            return Err(HeapError::BadRid {
                page_no: rid.page_no,
                slot_no: rid.slot_no,
            });
        }

        if self.cur_page.is_none() || self.cur_page_no != rid.page_no {
            self.move_to_page(rid.page_no)?;
        }

        let frame = self.cur_frame()?;
        let rec = {
            let mut guard = frame.borrow_mut();
            let page = SlottedPage::from_buffer(&mut guard.data)?;
            page.get_record(rid)?.to_vec()
        };
        self.cur_rec = rid;
        Ok(rec)
    }

    pub(crate) fn header(&self) -> FileHdrPage {
        FileHdrPage::load(&self.header_page.borrow().data)
    }

    pub(crate) fn store_header(&mut self, header: &FileHdrPage) {
        header.store(&mut self.header_page.borrow_mut().data);
        self.hdr_dirty = true;
    }

    pub(crate) fn cur_frame(&self) -> HeapResult<FrameRef> {
        self.cur_page.as_ref().map(Rc::clone).ok_or(HeapError::BadScan)
    }

    /// Unpin the cursor page, if any, folding its dirtiness into the pool
    pub(crate) fn release_cur_page(&mut self) -> HeapResult<()> {
        if self.cur_page.is_some() {
            let dirty = self.cur_dirty;
            self.bufmgr
                .borrow_mut()
                .unpin_page(self.file, self.cur_page_no, dirty)?;
            self.cur_page = None;
            self.cur_page_no = INVALID_PAGE;
            self.cur_dirty = false;
        }
        Ok(())
    }

    /// Move the cursor onto another page of the file
    pub(crate) fn move_to_page(&mut self, page_no: PageNo) -> HeapResult<()> {
        self.release_cur_page()?;
        match self.bufmgr.borrow_mut().read_page(self.file, page_no) {
            Ok(frame) => {
                self.cur_page = Some(frame);
                self.cur_page_no = page_no;
                self.cur_dirty = false;
                Ok(())
            }
            Err(e) => {
                self.cur_page_no = INVALID_PAGE;
                Err(e.into())
            }
        }
    }
}

impl Drop for HeapFile {
    fn drop(&mut self) {
        let name = self.header().file_name();
        debug!("closing heap file {}", name);

        let mut bm = self.bufmgr.borrow_mut();
        if self.cur_page.take().is_some() {
            if let Err(e) = bm.unpin_page(self.file, self.cur_page_no, self.cur_dirty) {
                warn!("unpin of data page {} failed: {}", self.cur_page_no, e);
            }
        }
        if let Err(e) = bm.unpin_page(self.file, self.header_page_no, self.hdr_dirty) {
            warn!("unpin of header page {} failed: {}", self.header_page_no, e);
        }

        // persist our pages while the handle still exists; another open
        // handle keeps its pins, in which case its close will flush
        match bm.flush_file(self.file) {
            Ok(()) | Err(BufferError::PagePinned(..)) => {}
            Err(e) => warn!("flush of {} failed: {}", name, e),
        }
        if let Err(e) = bm.file_manager_mut().close_file(self.file) {
            warn!("close of {} failed: {}", name, e);
        }
    }
}
