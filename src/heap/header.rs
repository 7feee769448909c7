use crate::file::{INVALID_PAGE, PageNo};

/// Upper bound on a heap file's stored name, including NUL padding
pub const MAX_NAME: usize = 64;

/// Typed view of a heap file's header page
///
/// The header occupies the first page of every heap file and tracks the
/// data-page chain endpoints and counts. It is serialized explicitly into
/// the page bytes rather than overlaid on them.
#[derive(Debug, Clone)]
pub(crate) struct FileHdrPage {
    pub file_name: [u8; MAX_NAME],
    pub first_page: PageNo,
    pub last_page: PageNo,
    pub page_cnt: i32,
    pub rec_cnt: i32,
}

impl FileHdrPage {
    pub fn new(name: &str) -> Self {
        let mut file_name = [0u8; MAX_NAME];
        let bytes = name.as_bytes();
        let n = bytes.len().min(MAX_NAME - 1);
        file_name[..n].copy_from_slice(&bytes[..n]);
        Self {
            file_name,
            first_page: INVALID_PAGE,
            last_page: INVALID_PAGE,
            page_cnt: 0,
            rec_cnt: 0,
        }
    }

    pub fn file_name(&self) -> String {
        let end = self
            .file_name
            .iter()
            .position(|&b| b == 0)
            .unwrap_or(MAX_NAME);
        String::from_utf8_lossy(&self.file_name[..end]).into_owned()
    }

    pub fn load(data: &[u8]) -> Self {
        let mut file_name = [0u8; MAX_NAME];
        file_name.copy_from_slice(&data[..MAX_NAME]);
        let int = |i: usize| i32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        Self {
            file_name,
            first_page: int(MAX_NAME),
            last_page: int(MAX_NAME + 4),
            page_cnt: int(MAX_NAME + 8),
            rec_cnt: int(MAX_NAME + 12),
        }
    }

    pub fn store(&self, data: &mut [u8]) {
        data[..MAX_NAME].copy_from_slice(&self.file_name);
        data[MAX_NAME..MAX_NAME + 4].copy_from_slice(&self.first_page.to_le_bytes());
        data[MAX_NAME + 4..MAX_NAME + 8].copy_from_slice(&self.last_page.to_le_bytes());
        data[MAX_NAME + 8..MAX_NAME + 12].copy_from_slice(&self.page_cnt.to_le_bytes());
        data[MAX_NAME + 12..MAX_NAME + 16].copy_from_slice(&self.rec_cnt.to_le_bytes());
    }
}
