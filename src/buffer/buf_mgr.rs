use std::cell::RefCell;
use std::rc::Rc;

use itertools::Itertools;
use log::{debug, warn};

use crate::file::{FileHandle, PageNo, PagedFileManager};

use super::error::{BufferError, BufferResult};
use super::frame::{Frame, FrameDesc, FrameRef};
use super::frame_table::FrameTable;

/// Buffer pool manager with second-chance (clock) replacement
///
/// Every page handed out by `read_page` or `alloc_page` carries one pin
/// that the caller must release through `unpin_page`; a frame is only
/// eligible for eviction once its pin count reaches zero.
pub struct BufMgr {
    file_manager: PagedFileManager,
    pool: Vec<FrameRef>,
    descs: Vec<FrameDesc>,
    table: FrameTable,
    clock_hand: usize,
}

pub type BufMgrRef = Rc<RefCell<BufMgr>>;

impl BufMgr {
    pub fn new(file_manager: PagedFileManager, nframes: usize) -> Self {
        assert!(nframes > 0);
        debug!("creating buffer pool with {} frames", nframes);
        let pool = (0..nframes)
            .map(|_| Rc::new(RefCell::new(Frame::new())))
            .collect_vec();
        let descs = (0..nframes).map(FrameDesc::new).collect_vec();
        Self {
            file_manager,
            pool,
            descs,
            table: FrameTable::new(nframes),
            clock_hand: nframes - 1,
        }
    }

    pub fn new_shared(file_manager: PagedFileManager, nframes: usize) -> BufMgrRef {
        Rc::new(RefCell::new(Self::new(file_manager, nframes)))
    }

    pub fn file_manager(&self) -> &PagedFileManager {
        &self.file_manager
    }

    pub fn file_manager_mut(&mut self) -> &mut PagedFileManager {
        &mut self.file_manager
    }

    pub fn num_frames(&self) -> usize {
        self.pool.len()
    }

    /// Check whether a page currently occupies a frame
    pub fn is_page_resident(&self, file: FileHandle, page_no: PageNo) -> bool {
        self.table.lookup(file, page_no).is_some()
    }

    /// Current pin count of a resident page
    pub fn pin_count(&self, file: FileHandle, page_no: PageNo) -> Option<u32> {
        self.table
            .lookup(file, page_no)
            .map(|frame_no| self.descs[frame_no].pin_cnt)
    }

    fn advance_clock(&mut self) {
        self.clock_hand = (self.clock_hand + 1) % self.pool.len();
    }

    /// Select a frame to receive a page, evicting a victim if needed
    ///
    /// Runs at most two full sweeps: the first may do nothing but clear
    /// reference bits, so a victim can only surface on the second.
    fn alloc_buf(&mut self) -> BufferResult<usize> {
        for _ in 0..2 * self.pool.len() {
            self.advance_clock();
            let hand = self.clock_hand;

            if !self.descs[hand].valid {
                return Ok(hand);
            }
            if self.descs[hand].refbit {
                self.descs[hand].refbit = false;
                continue;
            }
            if self.descs[hand].pin_cnt > 0 {
                continue;
            }

            // valid, unreferenced, unpinned: this is the victim
            if self.descs[hand].dirty {
                self.write_back(hand)?;
            }
            let file = match self.descs[hand].file {
                Some(file) => file,
                None => return Err(BufferError::BadBuffer(hand)),
            };
            let page_no = self.descs[hand].page_no;
            if self.table.remove(file, page_no).is_none() {
                return Err(BufferError::FrameTable(format!(
                    "no entry for evicted page {} of file {}",
                    page_no,
                    file.as_usize()
                )));
            }
            self.descs[hand].clear();
            return Ok(hand);
        }

        Err(BufferError::BufferExceeded)
    }

    /// Read a page into the pool, pinning its frame
    ///
    /// A resident page just gains a pin and a reference; otherwise a frame
    /// is claimed via the clock, the page is read from disk, and the frame
    /// table learns the new mapping.
    pub fn read_page(&mut self, file: FileHandle, page_no: PageNo) -> BufferResult<FrameRef> {
        if let Some(frame_no) = self.table.lookup(file, page_no) {
            let desc = &mut self.descs[frame_no];
            desc.refbit = true;
            desc.pin_cnt += 1;
            return Ok(Rc::clone(&self.pool[frame_no]));
        }

        let frame_no = self.alloc_buf()?;
        {
            let mut frame = self.pool[frame_no].borrow_mut();
            self.file_manager.read_page(file, page_no, &mut frame.data)?;
        }
        self.table.insert(file, page_no, frame_no)?;
        self.descs[frame_no].set(file, page_no);
        Ok(Rc::clone(&self.pool[frame_no]))
    }

    /// Release one pin, folding the caller's dirty flag into the frame
    pub fn unpin_page(&mut self, file: FileHandle, page_no: PageNo, dirty: bool) -> BufferResult<()> {
        let frame_no = self
            .table
            .lookup(file, page_no)
            .ok_or(BufferError::PageNotFound(file.as_usize(), page_no))?;

        let desc = &mut self.descs[frame_no];
        if desc.pin_cnt == 0 {
            return Err(BufferError::PageNotPinned(file.as_usize(), page_no));
        }
        desc.pin_cnt -= 1;
        desc.dirty |= dirty;
        Ok(())
    }

    /// Allocate a new page in the file and pin it in a frame
    ///
    /// The frame contents are whatever the frame last held; callers who
    /// want slotted semantics must initialize the page themselves.
    pub fn alloc_page(&mut self, file: FileHandle) -> BufferResult<(PageNo, FrameRef)> {
        let page_no = self.file_manager.allocate_page(file)?;
        let frame_no = self.alloc_buf()?;
        self.table.insert(file, page_no, frame_no)?;
        self.descs[frame_no].set(file, page_no);
        Ok((page_no, Rc::clone(&self.pool[frame_no])))
    }

    /// Drop a page from the pool and return it to the file's free list
    ///
    /// Callers must ensure the page is not pinned.
    pub fn dispose_page(&mut self, file: FileHandle, page_no: PageNo) -> BufferResult<()> {
        if let Some(frame_no) = self.table.remove(file, page_no) {
            self.descs[frame_no].clear();
        }
        self.file_manager.dispose_page(file, page_no)?;
        Ok(())
    }

    /// Write back and invalidate every frame belonging to a file
    pub fn flush_file(&mut self, file: FileHandle) -> BufferResult<()> {
        for frame_no in 0..self.pool.len() {
            if self.descs[frame_no].file != Some(file) {
                continue;
            }
            if !self.descs[frame_no].valid {
                return Err(BufferError::BadBuffer(frame_no));
            }
            if self.descs[frame_no].pin_cnt > 0 {
                return Err(BufferError::PagePinned(
                    file.as_usize(),
                    self.descs[frame_no].page_no,
                ));
            }
            if self.descs[frame_no].dirty {
                self.write_back(frame_no)?;
            }
            self.table.remove(file, self.descs[frame_no].page_no);
            self.descs[frame_no].clear();
        }
        Ok(())
    }

    fn write_back(&mut self, frame_no: usize) -> BufferResult<()> {
        let desc = &self.descs[frame_no];
        let file = desc.file.ok_or(BufferError::BadBuffer(desc.frame_no))?;
        let page_no = desc.page_no;

        let frame = self.pool[frame_no].borrow();
        self.file_manager.write_page(file, page_no, &frame.data)?;
        drop(frame);

        self.descs[frame_no].dirty = false;
        Ok(())
    }
}

impl Drop for BufMgr {
    fn drop(&mut self) {
        // flush out all unwritten pages; shutdown cannot propagate failure
        for frame_no in 0..self.pool.len() {
            if self.descs[frame_no].valid && self.descs[frame_no].dirty {
                if let Err(e) = self.write_back(frame_no) {
                    warn!("shutdown write-back of frame {} failed: {}", frame_no, e);
                }
            }
        }
    }
}
