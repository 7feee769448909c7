use std::cmp::Ordering;

use crate::buffer::BufMgrRef;
use crate::file::{INVALID_PAGE, PageNo};

use super::error::{HeapError, HeapResult, PageError};
use super::heap_file::HeapFile;
use super::page::{NULL_RID, Rid, SlottedPage};

/// Attribute type a scan predicate compares on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Datatype {
    String,
    Integer,
    Float,
}

/// Comparison operator of a scan predicate
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    Lt,
    Lte,
    Eq,
    Gte,
    Gt,
    Ne,
}

impl Operator {
    fn eval(self, ord: Ordering) -> bool {
        match self {
            Operator::Lt => ord == Ordering::Less,
            Operator::Lte => ord != Ordering::Greater,
            Operator::Eq => ord == Ordering::Equal,
            Operator::Gte => ord != Ordering::Less,
            Operator::Gt => ord == Ordering::Greater,
            Operator::Ne => ord != Ordering::Equal,
        }
    }
}

/// Filter applied to each record of a scan
///
/// `offset` and `length` select the attribute bytes inside the record;
/// `value` holds at least `length` filter bytes.
#[derive(Debug, Clone)]
pub struct Predicate {
    pub offset: usize,
    pub length: usize,
    pub datatype: Datatype,
    pub op: Operator,
    pub value: Vec<u8>,
}

impl Predicate {
    fn valid(&self) -> bool {
        if self.length < 1 || self.value.len() < self.length {
            return false;
        }
        match self.datatype {
            Datatype::Integer => self.length == std::mem::size_of::<i32>(),
            Datatype::Float => self.length == std::mem::size_of::<f32>(),
            Datatype::String => true,
        }
    }

    /// A record whose attribute window falls outside its bytes fails the
    /// predicate. Numeric attributes are decoded by copy; records carry
    /// no alignment. A NaN on either side of a float comparison fails
    /// every operator except `Ne`.
    fn matches(&self, rec: &[u8]) -> bool {
        if self.offset + self.length > rec.len() {
            return false;
        }
        let attr = &rec[self.offset..self.offset + self.length];
        let value = &self.value[..self.length];

        let ord = match self.datatype {
            Datatype::Integer => match (<[u8; 4]>::try_from(attr), <[u8; 4]>::try_from(value)) {
                (Ok(a), Ok(v)) => {
                    let a = i32::from_le_bytes(a) as i64;
                    let v = i32::from_le_bytes(v) as i64;
                    Some(a.cmp(&v))
                }
                _ => None,
            },
            Datatype::Float => match (<[u8; 4]>::try_from(attr), <[u8; 4]>::try_from(value)) {
                (Ok(a), Ok(v)) => f32::from_le_bytes(a).partial_cmp(&f32::from_le_bytes(v)),
                _ => None,
            },
            Datatype::String => Some(attr.cmp(value)),
        };

        match ord {
            Some(ord) => self.op.eval(ord),
            None => self.op == Operator::Ne,
        }
    }
}

enum Step {
    Matched(Rid),
    Skipped(Rid),
    PageDone(PageNo),
}

/// Forward scan over a heap file with an optional predicate
///
/// The cursor pins at most one data page; moving to the next page swaps
/// the pin. `mark_scan`/`reset_scan` snapshot and restore a position.
pub struct HeapFileScan {
    hf: HeapFile,
    filter: Option<Predicate>,
    marked_page_no: PageNo,
    marked_rec: Rid,
}

impl HeapFileScan {
    pub fn open(bufmgr: &BufMgrRef, name: &str) -> HeapResult<Self> {
        Ok(Self {
            hf: HeapFile::open(bufmgr, name)?,
            filter: None,
            marked_page_no: INVALID_PAGE,
            marked_rec: NULL_RID,
        })
    }

    /// The underlying heap-file handle
    pub fn heap_file(&self) -> &HeapFile {
        &self.hf
    }

    /// Number of live records in the file
    pub fn get_rec_cnt(&self) -> i32 {
        self.hf.get_rec_cnt()
    }

    /// Install a predicate (or none) and rewind to the first data page
    pub fn start_scan(&mut self, filter: Option<Predicate>) -> HeapResult<()> {
        if let Some(pred) = &filter {
            if !pred.valid() {
                return Err(HeapError::BadScanParam);
            }
        }
        self.filter = filter;
        self.marked_page_no = INVALID_PAGE;
        self.marked_rec = NULL_RID;

        let first = self.hf.header().first_page;
        if first == INVALID_PAGE {
            self.hf.release_cur_page()?;
            self.hf.cur_rec = NULL_RID;
            return Ok(());
        }
        self.hf.move_to_page(first)?;
        self.hf.cur_rec = NULL_RID;
        Ok(())
    }

    /// Advance to the next record satisfying the predicate
    ///
    /// `EndOfFile` is the normal terminator, not a fault; the last page
    /// stays pinned until `end_scan` or the handle is dropped.
    pub fn scan_next(&mut self) -> HeapResult<Rid> {
        if self.hf.cur_page.is_none() {
            let first = self.hf.header().first_page;
            if first == INVALID_PAGE {
                return Err(HeapError::EndOfFile);
            }
            self.hf.move_to_page(first)?;
            self.hf.cur_rec = NULL_RID;
        }

        loop {
            let frame = self.hf.cur_frame()?;
            let step = {
                let mut guard = frame.borrow_mut();
                let page = SlottedPage::from_buffer(&mut guard.data)?;
                let next = if self.hf.cur_rec == NULL_RID {
                    page.first_record()
                } else {
                    page.next_record(self.hf.cur_rec)
                };
                match next {
                    Ok(rid) => {
                        let rec = page.get_record(rid)?;
                        let matched = self.filter.as_ref().map_or(true, |p| p.matches(rec));
                        if matched {
                            Step::Matched(rid)
                        } else {
                            Step::Skipped(rid)
                        }
                    }
                    Err(PageError::EndOfPage) | Err(PageError::NoRecords) => {
                        Step::PageDone(page.next_page())
                    }
                    Err(e) => return Err(e.into()),
                }
            };

            match step {
                Step::Matched(rid) => {
                    self.hf.cur_rec = rid;
                    return Ok(rid);
                }
                Step::Skipped(rid) => {
                    self.hf.cur_rec = rid;
                }
                Step::PageDone(next_page_no) => {
                    if next_page_no == INVALID_PAGE {
                        return Err(HeapError::EndOfFile);
                    }
                    self.hf.move_to_page(next_page_no)?;
                    self.hf.cur_rec = NULL_RID;
                }
            }
        }
    }

    /// The record under the cursor, without advancing
    pub fn get_record(&self) -> HeapResult<Vec<u8>> {
        if self.hf.cur_page.is_none() || self.hf.cur_rec.page_no < 0 {
            return Err(HeapError::BadScan);
        }
        let frame = self.hf.cur_frame()?;
        let mut guard = frame.borrow_mut();
        let page = SlottedPage::from_buffer(&mut guard.data)?;
        Ok(page.get_record(self.hf.cur_rec)?.to_vec())
    }

    /// Delete the record under the cursor
    pub fn delete_record(&mut self) -> HeapResult<()> {
        if self.hf.cur_page.is_none() || self.hf.cur_rec.page_no < 0 {
            return Err(HeapError::BadScan);
        }
        let frame = self.hf.cur_frame()?;
        {
            let mut guard = frame.borrow_mut();
            let mut page = SlottedPage::from_buffer(&mut guard.data)?;
            page.delete_record(self.hf.cur_rec)?;
        }
        self.hf.cur_dirty = true;

        let mut header = self.hf.header();
        header.rec_cnt -= 1;
        self.hf.store_header(&header);
        Ok(())
    }

    /// Snapshot the current position; requires a positioned record
    pub fn mark_scan(&mut self) -> HeapResult<()> {
        if self.hf.cur_page.is_none() || self.hf.cur_rec.page_no < 0 {
            return Err(HeapError::BadScan);
        }
        self.marked_page_no = self.hf.cur_page_no;
        self.marked_rec = self.hf.cur_rec;
        Ok(())
    }

    /// Return to the marked position; the next `scan_next` resumes with
    /// the record after the marked one
    pub fn reset_scan(&mut self) -> HeapResult<()> {
        if self.marked_page_no < 0 {
            return Err(HeapError::BadScan);
        }
        if self.hf.cur_page.is_none() || self.hf.cur_page_no != self.marked_page_no {
            self.hf.move_to_page(self.marked_page_no)?;
        }
        self.hf.cur_rec = self.marked_rec;
        Ok(())
    }

    /// Release the cursor page and clear the position
    pub fn end_scan(&mut self) -> HeapResult<()> {
        self.hf.cur_rec = NULL_RID;
        self.hf.release_cur_page()
    }
}
