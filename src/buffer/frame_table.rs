use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use itertools::Itertools;

use crate::file::{FileHandle, PageNo};

use super::error::{BufferError, BufferResult};

/// A key identifying a page in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct FrameKey {
    file: FileHandle,
    page_no: PageNo,
}

/// Bucket-chained hash table mapping (file, page) to a frame index
pub(crate) struct FrameTable {
    buckets: Vec<Vec<(FrameKey, usize)>>,
}

impl FrameTable {
    /// Sized to the smallest odd integer >= 1.2 * nframes
    pub fn new(nframes: usize) -> Self {
        let mut size = nframes + (nframes + 4) / 5;
        if size % 2 == 0 {
            size += 1;
        }
        Self {
            buckets: (0..size).map(|_| Vec::new()).collect_vec(),
        }
    }

    fn bucket_of(&self, key: &FrameKey) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.buckets.len() as u64) as usize
    }

    pub fn lookup(&self, file: FileHandle, page_no: PageNo) -> Option<usize> {
        let key = FrameKey { file, page_no };
        self.buckets[self.bucket_of(&key)]
            .iter()
            .find(|(k, _)| *k == key)
            .map(|&(_, frame_no)| frame_no)
    }

    pub fn insert(&mut self, file: FileHandle, page_no: PageNo, frame_no: usize) -> BufferResult<()> {
        let key = FrameKey { file, page_no };
        let bucket = self.bucket_of(&key);
        if self.buckets[bucket].iter().any(|(k, _)| *k == key) {
            return Err(BufferError::FrameTable(format!(
                "duplicate entry for page {} of file {}",
                page_no,
                file.as_usize()
            )));
        }
        self.buckets[bucket].push((key, frame_no));
        Ok(())
    }

    pub fn remove(&mut self, file: FileHandle, page_no: PageNo) -> Option<usize> {
        let key = FrameKey { file, page_no };
        let bucket = self.bucket_of(&key);
        let pos = self.buckets[bucket].iter().position(|(k, _)| *k == key)?;
        let (_, frame_no) = self.buckets[bucket].swap_remove(pos);
        Some(frame_no)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.buckets.iter().map(Vec::len).sum()
    }
}
