pub mod buffer;
pub mod file;
pub mod heap;

pub use buffer::{BufMgr, BufMgrRef, BufferError, BufferResult};
pub use file::{FileHandle, INVALID_PAGE, PAGE_SIZE, PageNo, PagedFileManager};
pub use heap::{
    Datatype, HeapError, HeapFile, HeapFileScan, HeapResult, InsertFileScan, NULL_RID, Operator,
    Predicate, Rid, create_heap_file, destroy_heap_file,
};
