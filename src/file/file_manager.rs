use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{INVALID_PAGE, PAGE_SIZE, PageNo};

const FILE_MAGIC: u32 = 0x4846_5031;
const FILE_HDR_SIZE: usize = 16;

/// Handle to an open file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(usize);

impl FileHandle {
    pub fn as_usize(&self) -> usize {
        self.0
    }
}

/// Store metadata kept in physical page 0 of every file.
///
/// Page 0 is owned by the store and never handed out; free pages form a
/// singly-linked list threaded through the first 4 bytes of each free page.
#[derive(Debug, Clone, Copy)]
struct FileHeader {
    /// First page ever allocated in this file (-1 if none)
    first_page: PageNo,
    /// Physical pages in the file, including page 0
    page_cnt: i32,
    /// Head of the free-page list (-1 if empty)
    free_head: PageNo,
}

impl FileHeader {
    fn new() -> Self {
        Self {
            first_page: INVALID_PAGE,
            page_cnt: 1,
            free_head: INVALID_PAGE,
        }
    }

    fn serialize(&self) -> [u8; FILE_HDR_SIZE] {
        let mut result = [0u8; FILE_HDR_SIZE];
        result[0..4].copy_from_slice(&FILE_MAGIC.to_le_bytes());
        result[4..8].copy_from_slice(&self.first_page.to_le_bytes());
        result[8..12].copy_from_slice(&self.page_cnt.to_le_bytes());
        result[12..16].copy_from_slice(&self.free_head.to_le_bytes());
        result
    }

    fn deserialize(data: &[u8]) -> FileResult<Self> {
        if data.len() < FILE_HDR_SIZE {
            return Err(FileError::CorruptHeader(format!(
                "not enough data for file header: {} bytes",
                data.len()
            )));
        }

        let magic = u32::from_le_bytes([data[0], data[1], data[2], data[3]]);
        if magic != FILE_MAGIC {
            return Err(FileError::CorruptHeader(format!(
                "bad magic: {:#010x}",
                magic
            )));
        }

        Ok(Self {
            first_page: PageNo::from_le_bytes([data[4], data[5], data[6], data[7]]),
            page_cnt: i32::from_le_bytes([data[8], data[9], data[10], data[11]]),
            free_head: PageNo::from_le_bytes([data[12], data[13], data[14], data[15]]),
        })
    }
}

struct FileEntry {
    file: File,
    path: PathBuf,
    open_count: usize,
}

/// Manages named files of fixed-size pages with in-file page allocation
pub struct PagedFileManager {
    /// Map from file handles to open files
    open_files: HashMap<FileHandle, FileEntry>,
    /// Map from file paths to handles (for checking if already open)
    path_to_handle: HashMap<PathBuf, FileHandle>,
    /// Next available file handle
    next_handle: usize,
    /// Maximum number of open files
    max_open_files: usize,
}

impl PagedFileManager {
    pub fn new() -> Self {
        Self::with_max_files(128)
    }

    pub fn with_max_files(max_open_files: usize) -> Self {
        Self {
            open_files: HashMap::new(),
            path_to_handle: HashMap::new(),
            next_handle: 0,
            max_open_files,
        }
    }

    /// Create a new file holding only its store header page
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = File::create(path)?;
        let mut page = vec![0u8; PAGE_SIZE];
        page[..FILE_HDR_SIZE].copy_from_slice(&FileHeader::new().serialize());
        file.write_all(&page)?;

        Ok(())
    }

    /// Open an existing file
    ///
    /// Opening an already-open path returns the same handle and bumps its
    /// open count; the OS file is released when the count drops to zero.
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let path_ref = path.as_ref();
        let path = path_ref
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(path_ref.display().to_string()))?;

        if let Some(&handle) = self.path_to_handle.get(&path) {
            if let Some(entry) = self.open_files.get_mut(&handle) {
                entry.open_count += 1;
            }
            return Ok(handle);
        }

        if self.open_files.len() >= self.max_open_files {
            return Err(FileError::TooManyOpenFiles);
        }

        let file = OpenOptions::new().read(true).write(true).open(&path)?;

        let handle = FileHandle(self.next_handle);
        self.next_handle += 1;

        let mut entry = FileEntry {
            file,
            path: path.clone(),
            open_count: 1,
        };
        // reject files that were not created through this store
        Self::read_header(&mut entry)?;

        self.open_files.insert(handle, entry);
        self.path_to_handle.insert(path, handle);

        Ok(handle)
    }

    /// Close a file, releasing the OS file once every opener has closed it
    pub fn close_file(&mut self, handle: FileHandle) -> FileResult<()> {
        let entry = self
            .open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))?;

        entry.open_count -= 1;
        if entry.open_count == 0 {
            let entry = self
                .open_files
                .remove(&handle)
                .ok_or(FileError::InvalidHandle(handle.0))?;
            self.path_to_handle.remove(&entry.path);
        }
        Ok(())
    }

    /// Remove (delete) a file
    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();

        // If file is open, drop its entry regardless of open count
        if let Ok(canonical_path) = path.canonicalize() {
            if let Some(handle) = self.path_to_handle.remove(&canonical_path) {
                self.open_files.remove(&handle);
            }
        }

        std::fs::remove_file(path)?;
        Ok(())
    }

    /// Allocate a new page number in a file
    ///
    /// Pops the free list when possible, otherwise extends the file by one
    /// zeroed page. The on-disk contents carry no meaning until the first
    /// write.
    pub fn allocate_page(&mut self, handle: FileHandle) -> FileResult<PageNo> {
        let entry = self.entry_mut(handle)?;
        let mut header = Self::read_header(entry)?;

        let page_no = if header.free_head != INVALID_PAGE {
            let page_no = header.free_head;
            let mut next = [0u8; 4];
            entry
                .file
                .seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
            entry.file.read_exact(&mut next)?;
            header.free_head = PageNo::from_le_bytes(next);
            page_no
        } else {
            let page_no = header.page_cnt;
            header.page_cnt += 1;
            entry
                .file
                .set_len(header.page_cnt as u64 * PAGE_SIZE as u64)?;
            page_no
        };

        if header.first_page == INVALID_PAGE {
            header.first_page = page_no;
        }

        Self::write_header(entry, &header)?;
        Ok(page_no)
    }

    /// Return a page to the file's free list
    pub fn dispose_page(&mut self, handle: FileHandle, page_no: PageNo) -> FileResult<()> {
        let entry = self.entry_mut(handle)?;
        let mut header = Self::read_header(entry)?;

        if page_no < 1 || page_no >= header.page_cnt {
            return Err(FileError::InvalidPageNo(page_no));
        }

        entry
            .file
            .seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        entry.file.write_all(&header.free_head.to_le_bytes())?;

        header.free_head = page_no;
        Self::write_header(entry, &header)?;
        Ok(())
    }

    /// Number of the first page ever allocated in the file (-1 if none)
    pub fn first_page(&mut self, handle: FileHandle) -> FileResult<PageNo> {
        let entry = self.entry_mut(handle)?;
        Ok(Self::read_header(entry)?.first_page)
    }

    /// Read a page from a file
    pub fn read_page(
        &mut self,
        handle: FileHandle,
        page_no: PageNo,
        buffer: &mut [u8],
    ) -> FileResult<()> {
        if buffer.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: buffer.len(),
            });
        }

        let entry = self.entry_mut(handle)?;
        Self::check_page_no(entry, page_no)?;

        entry
            .file
            .seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        entry.file.read_exact(buffer)?;
        Ok(())
    }

    /// Write a page to a file
    pub fn write_page(
        &mut self,
        handle: FileHandle,
        page_no: PageNo,
        buffer: &[u8],
    ) -> FileResult<()> {
        if buffer.len() != PAGE_SIZE {
            return Err(FileError::InvalidPageSize {
                expected: PAGE_SIZE,
                actual: buffer.len(),
            });
        }

        let entry = self.entry_mut(handle)?;
        Self::check_page_no(entry, page_no)?;

        entry
            .file
            .seek(SeekFrom::Start(page_no as u64 * PAGE_SIZE as u64))?;
        entry.file.write_all(buffer)?;
        Ok(())
    }

    /// Get the number of physical pages in a file, including page 0
    pub fn page_count(&mut self, handle: FileHandle) -> FileResult<usize> {
        let entry = self.entry_mut(handle)?;
        let file_size = entry.file.metadata()?.len();
        Ok((file_size / PAGE_SIZE as u64) as usize)
    }

    /// Check if a file is open
    pub fn is_file_open(&self, handle: FileHandle) -> bool {
        self.open_files.contains_key(&handle)
    }

    /// Get the number of currently open files
    pub fn open_file_count(&self) -> usize {
        self.open_files.len()
    }

    fn entry_mut(&mut self, handle: FileHandle) -> FileResult<&mut FileEntry> {
        self.open_files
            .get_mut(&handle)
            .ok_or(FileError::InvalidHandle(handle.0))
    }

    fn check_page_no(entry: &mut FileEntry, page_no: PageNo) -> FileResult<()> {
        let pages = entry.file.metadata()?.len() / PAGE_SIZE as u64;
        if page_no < 1 || page_no as u64 >= pages {
            return Err(FileError::InvalidPageNo(page_no));
        }
        Ok(())
    }

    fn read_header(entry: &mut FileEntry) -> FileResult<FileHeader> {
        let mut buf = [0u8; FILE_HDR_SIZE];
        entry.file.seek(SeekFrom::Start(0))?;
        entry.file.read_exact(&mut buf)?;
        FileHeader::deserialize(&buf)
    }

    fn write_header(entry: &mut FileEntry, header: &FileHeader) -> FileResult<()> {
        entry.file.seek(SeekFrom::Start(0))?;
        entry.file.write_all(&header.serialize())?;
        Ok(())
    }
}

impl Default for PagedFileManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::Rng;
    use tempfile::TempDir;

    fn setup_test_dir() -> TempDir {
        tempfile::tempdir().unwrap()
    }

    #[test]
    fn test_create_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        assert!(manager.create_file(&test_file).is_ok());
        assert!(test_file.exists());
    }

    #[test]
    fn test_create_file_already_exists() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let result = manager.create_file(&test_file);
        assert!(matches!(result, Err(FileError::FileAlreadyExists(_))));
    }

    #[test]
    fn test_open_close_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();
        assert!(manager.is_file_open(handle));

        manager.close_file(handle).unwrap();
        assert!(!manager.is_file_open(handle));
    }

    #[test]
    fn test_open_nonexistent_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("nonexistent.db");
        let mut manager = PagedFileManager::new();

        let result = manager.open_file(&test_file);
        assert!(matches!(result, Err(FileError::FileNotFound(_))));
    }

    #[test]
    fn test_open_counts() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle1 = manager.open_file(&test_file).unwrap();
        let handle2 = manager.open_file(&test_file).unwrap();

        assert_eq!(handle1, handle2);
        assert_eq!(manager.open_file_count(), 1);

        // closing once leaves the second opener's handle usable
        manager.close_file(handle1).unwrap();
        assert!(manager.is_file_open(handle2));

        manager.close_file(handle2).unwrap();
        assert!(!manager.is_file_open(handle2));
    }

    #[test]
    fn test_allocate_extends_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();

        assert_eq!(manager.page_count(handle).unwrap(), 1);
        assert_eq!(manager.first_page(handle).unwrap(), INVALID_PAGE);

        let p1 = manager.allocate_page(handle).unwrap();
        let p2 = manager.allocate_page(handle).unwrap();
        assert_eq!(p1, 1);
        assert_eq!(p2, 2);
        assert_eq!(manager.page_count(handle).unwrap(), 3);
        assert_eq!(manager.first_page(handle).unwrap(), p1);
    }

    #[test]
    fn test_dispose_then_reuse() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();

        let p1 = manager.allocate_page(handle).unwrap();
        let p2 = manager.allocate_page(handle).unwrap();
        let p3 = manager.allocate_page(handle).unwrap();

        manager.dispose_page(handle, p2).unwrap();
        manager.dispose_page(handle, p1).unwrap();

        // free list is LIFO and disposal does not shrink the file
        assert_eq!(manager.allocate_page(handle).unwrap(), p1);
        assert_eq!(manager.allocate_page(handle).unwrap(), p2);
        assert_eq!(manager.allocate_page(handle).unwrap(), p3 + 1);
        assert_eq!(manager.page_count(handle).unwrap(), 5);
    }

    #[test]
    fn test_dispose_header_page_rejected() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();

        assert!(matches!(
            manager.dispose_page(handle, 0),
            Err(FileError::InvalidPageNo(0))
        ));
        assert!(matches!(
            manager.dispose_page(handle, 7),
            Err(FileError::InvalidPageNo(7))
        ));
    }

    #[test]
    fn test_read_write_page() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();
        let page_no = manager.allocate_page(handle).unwrap();

        let mut rng = rand::thread_rng();
        let mut write_buffer = vec![0u8; PAGE_SIZE];
        rng.fill(write_buffer.as_mut_slice());

        manager.write_page(handle, page_no, &write_buffer).unwrap();

        let mut read_buffer = vec![0u8; PAGE_SIZE];
        manager.read_page(handle, page_no, &mut read_buffer).unwrap();

        assert_eq!(read_buffer, write_buffer);
    }

    #[test]
    fn test_page_io_bounds() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();
        manager.allocate_page(handle).unwrap();

        let mut buffer = vec![0u8; PAGE_SIZE];
        // page 0 is the store header, page 2 is past the end
        assert!(matches!(
            manager.read_page(handle, 0, &mut buffer),
            Err(FileError::InvalidPageNo(0))
        ));
        assert!(matches!(
            manager.read_page(handle, 2, &mut buffer),
            Err(FileError::InvalidPageNo(2))
        ));

        let mut small_buffer = vec![0u8; PAGE_SIZE - 1];
        assert!(matches!(
            manager.read_page(handle, 1, &mut small_buffer),
            Err(FileError::InvalidPageSize { .. })
        ));
    }

    #[test]
    fn test_header_survives_reopen() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();
        let first = manager.allocate_page(handle).unwrap();
        manager.allocate_page(handle).unwrap();
        manager.close_file(handle).unwrap();

        let handle = manager.open_file(&test_file).unwrap();
        assert_eq!(manager.first_page(handle).unwrap(), first);
        assert_eq!(manager.page_count(handle).unwrap(), 3);
    }

    #[test]
    fn test_open_rejects_foreign_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("garbage.db");
        std::fs::write(&test_file, vec![0xabu8; PAGE_SIZE]).unwrap();

        let mut manager = PagedFileManager::new();
        assert!(matches!(
            manager.open_file(&test_file),
            Err(FileError::CorruptHeader(_))
        ));
    }

    #[test]
    fn test_remove_file() {
        let temp_dir = setup_test_dir();
        let test_file = temp_dir.path().join("test.db");
        let mut manager = PagedFileManager::new();

        manager.create_file(&test_file).unwrap();
        let handle = manager.open_file(&test_file).unwrap();

        manager.remove_file(&test_file).unwrap();
        assert!(!test_file.exists());
        assert!(!manager.is_file_open(handle));
    }

    #[test]
    fn test_max_open_files() {
        let temp_dir = setup_test_dir();
        let mut manager = PagedFileManager::with_max_files(2);

        let file1 = temp_dir.path().join("test1.db");
        let file2 = temp_dir.path().join("test2.db");
        let file3 = temp_dir.path().join("test3.db");

        manager.create_file(&file1).unwrap();
        manager.create_file(&file2).unwrap();
        manager.create_file(&file3).unwrap();

        manager.open_file(&file1).unwrap();
        manager.open_file(&file2).unwrap();

        let result = manager.open_file(&file3);
        assert!(matches!(result, Err(FileError::TooManyOpenFiles)));
    }
}
