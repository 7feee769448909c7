use crate::buffer::BufMgrRef;
use crate::file::INVALID_PAGE;

use super::error::{HeapError, HeapResult, PageError};
use super::heap_file::HeapFile;
use super::page::{MAX_REC_SIZE, NULL_RID, Rid, SlottedPage};

/// Appending handle that extends the page chain on overflow
pub struct InsertFileScan {
    hf: HeapFile,
}

impl InsertFileScan {
    /// Open for appending; the cursor starts on the chain tail
    pub fn open(bufmgr: &BufMgrRef, name: &str) -> HeapResult<Self> {
        let mut hf = HeapFile::open(bufmgr, name)?;
        let last = hf.header().last_page;
        if last != INVALID_PAGE && hf.cur_page_no != last {
            hf.move_to_page(last)?;
            hf.cur_rec = NULL_RID;
        }
        Ok(Self { hf })
    }

    /// The underlying heap-file handle
    pub fn heap_file(&self) -> &HeapFile {
        &self.hf
    }

    /// Append a record, growing the file by one page when the tail is full
    pub fn insert_record(&mut self, rec: &[u8]) -> HeapResult<Rid> {
        if rec.len() > MAX_REC_SIZE {
            // will never fit on a page, so don't even bother looking
            return Err(HeapError::InvalidRecLen(rec.len()));
        }

        if self.hf.cur_page.is_none() {
            let last = self.hf.header().last_page;
            if last == INVALID_PAGE {
                return Err(HeapError::BadHeaderPage);
            }
            self.hf.move_to_page(last)?;
        }

        if let Some(rid) = self.try_insert(rec)? {
            return Ok(rid);
        }

        // the tail is full: extend the chain and retry once; a record
        // within the size bound must fit in an empty page
        self.extend_chain()?;
        match self.try_insert(rec)? {
            Some(rid) => Ok(rid),
            None => Err(PageError::NoSpace.into()),
        }
    }

    fn try_insert(&mut self, rec: &[u8]) -> HeapResult<Option<Rid>> {
        let frame = self.hf.cur_frame()?;
        let inserted = {
            let mut guard = frame.borrow_mut();
            let mut page = SlottedPage::from_buffer(&mut guard.data)?;
            match page.insert_record(rec) {
                Ok(rid) => Some(rid),
                Err(PageError::NoSpace) => None,
                Err(e) => return Err(e.into()),
            }
        };

        if let Some(rid) = inserted {
            self.hf.cur_dirty = true;
            self.hf.cur_rec = rid;
            let mut header = self.hf.header();
            header.rec_cnt += 1;
            self.hf.store_header(&header);
            return Ok(Some(rid));
        }
        Ok(None)
    }

    /// Allocate a fresh data page, link it behind the current tail, and
    /// move the cursor onto it
    fn extend_chain(&mut self) -> HeapResult<()> {
        let (new_page_no, new_frame) = self.hf.bufmgr.borrow_mut().alloc_page(self.hf.file)?;
        {
            let mut guard = new_frame.borrow_mut();
            SlottedPage::init(&mut guard.data, new_page_no)?;
        }

        {
            let frame = self.hf.cur_frame()?;
            let mut guard = frame.borrow_mut();
            let mut page = SlottedPage::from_buffer(&mut guard.data)?;
            page.set_next_page(new_page_no);
        }
        self.hf.cur_dirty = true;

        self.hf
            .bufmgr
            .borrow_mut()
            .unpin_page(self.hf.file, self.hf.cur_page_no, true)?;
        self.hf.cur_page = Some(new_frame);
        self.hf.cur_page_no = new_page_no;
        self.hf.cur_dirty = false;
        self.hf.cur_rec = NULL_RID;

        let mut header = self.hf.header();
        header.last_page = new_page_no;
        header.page_cnt += 1;
        self.hf.store_header(&header);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buffer::BufMgr;
    use crate::file::PagedFileManager;
    use crate::heap::create_heap_file;
    use tempfile::TempDir;

    fn setup_pool(nframes: usize) -> (TempDir, BufMgrRef, String) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("insert.hf").display().to_string();
        let bufmgr = BufMgr::new_shared(PagedFileManager::new(), nframes);
        (temp_dir, bufmgr, path)
    }

    #[test]
    fn test_insert_and_fetch() {
        let (_temp_dir, bufmgr, name) = setup_pool(8);
        create_heap_file(&bufmgr, &name).unwrap();

        let mut inserter = InsertFileScan::open(&bufmgr, &name).unwrap();
        let rid = inserter.insert_record(b"payload").unwrap();
        assert_eq!(inserter.heap_file().get_rec_cnt(), 1);
        assert_eq!(rid.slot_no, 1);

        drop(inserter);
        let mut hf = HeapFile::open(&bufmgr, &name).unwrap();
        assert_eq!(hf.get_record(rid).unwrap(), b"payload");
    }

    #[test]
    fn test_oversized_record_rejected() {
        let (_temp_dir, bufmgr, name) = setup_pool(8);
        create_heap_file(&bufmgr, &name).unwrap();

        let mut inserter = InsertFileScan::open(&bufmgr, &name).unwrap();
        let rec = vec![0u8; MAX_REC_SIZE + 1];
        assert!(matches!(
            inserter.insert_record(&rec),
            Err(HeapError::InvalidRecLen(_))
        ));

        // the bound itself is insertable
        let rec = vec![0u8; MAX_REC_SIZE];
        inserter.insert_record(&rec).unwrap();
    }

    #[test]
    fn test_spill_extends_chain() {
        let (_temp_dir, bufmgr, name) = setup_pool(8);
        create_heap_file(&bufmgr, &name).unwrap();

        let mut inserter = InsertFileScan::open(&bufmgr, &name).unwrap();
        // three 2500-byte records fill a page; the fourth spills
        let rec = vec![0u8; 2500];
        let mut rids = Vec::new();
        for _ in 0..4 {
            rids.push(inserter.insert_record(&rec).unwrap());
        }

        let header = inserter.heap_file().header();
        assert_eq!(header.page_cnt, 3);
        assert_eq!(header.rec_cnt, 4);
        assert_eq!(header.last_page, rids[3].page_no);
        assert_ne!(rids[3].page_no, rids[2].page_no);
        assert_eq!(rids[3].slot_no, 1);

        // the old tail links to the new one
        let old_tail = rids[2].page_no;
        let new_tail = rids[3].page_no;
        drop(inserter);
        {
            let mut bm = bufmgr.borrow_mut();
            let file = bm.file_manager_mut().open_file(&name).unwrap();
            let frame = bm.read_page(file, old_tail).unwrap();
            let next = {
                let mut guard = frame.borrow_mut();
                SlottedPage::from_buffer(&mut guard.data).unwrap().next_page()
            };
            assert_eq!(next, new_tail);
            bm.unpin_page(file, old_tail, false).unwrap();
            bm.file_manager_mut().close_file(file).unwrap();
        }

        // every record is still reachable by its identifier
        let mut hf = HeapFile::open(&bufmgr, &name).unwrap();
        for rid in rids {
            assert_eq!(hf.get_record(rid).unwrap().len(), rec.len());
        }
    }

    #[test]
    fn test_open_positions_on_tail() {
        let (_temp_dir, bufmgr, name) = setup_pool(8);
        create_heap_file(&bufmgr, &name).unwrap();
        {
            let mut inserter = InsertFileScan::open(&bufmgr, &name).unwrap();
            let rec = vec![0u8; 2500];
            for _ in 0..4 {
                inserter.insert_record(&rec).unwrap();
            }
        }

        // a fresh inserter appends to the tail page, not the first page
        let inserter = InsertFileScan::open(&bufmgr, &name).unwrap();
        let header = inserter.heap_file().header();
        assert_eq!(inserter.hf.cur_page_no, header.last_page);
    }

    #[test]
    fn test_many_inserts_under_buffer_pressure() {
        let (_temp_dir, bufmgr, name) = setup_pool(4);
        create_heap_file(&bufmgr, &name).unwrap();

        let mut inserter = InsertFileScan::open(&bufmgr, &name).unwrap();
        let mut rids = Vec::new();
        for i in 0..50i32 {
            let mut rec = vec![0u8; 1500];
            rec[..4].copy_from_slice(&i.to_le_bytes());
            rids.push(inserter.insert_record(&rec).unwrap());
        }
        assert_eq!(inserter.heap_file().get_rec_cnt(), 50);
        drop(inserter);

        let mut hf = HeapFile::open(&bufmgr, &name).unwrap();
        for (i, rid) in rids.iter().enumerate() {
            let rec = hf.get_record(*rid).unwrap();
            assert_eq!(&rec[..4], &(i as i32).to_le_bytes());
        }
    }
}
