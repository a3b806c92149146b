use std::collections::{BTreeSet, HashMap};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use super::error::{FileError, FileResult};
use super::{PageNum, PAGE_SIZE};

/// Handle to an open paged file. Handles index the manager's slab, so a slot
/// freed by `close_file` is reused by a later open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FileHandle(u32);

impl FileHandle {
    pub fn as_usize(&self) -> usize {
        self.0 as usize
    }
}

/// One open paged file together with its page-allocation state.
///
/// `page_count` counts every page ever allocated, disposed ones included;
/// `free_pages` holds pages disposed during this session and is consulted
/// before the file grows. Pages disposed by an earlier process stay zeroed
/// on disk and are never handed out again.
struct PagedFile {
    file: File,
    path: PathBuf,
    page_count: PageNum,
    free_pages: BTreeSet<PageNum>,
}

impl PagedFile {
    fn open(path: PathBuf) -> FileResult<PagedFile> {
        let file = OpenOptions::new().read(true).write(true).open(&path)?;
        let len = file.metadata()?.len();
        let page_count = ((len + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64) as PageNum;
        Ok(PagedFile {
            file,
            path,
            page_count,
            free_pages: BTreeSet::new(),
        })
    }

    fn page_is_valid(&self, page_num: PageNum) -> bool {
        page_num >= 0 && page_num < self.page_count && !self.free_pages.contains(&page_num)
    }

    /// Hand out the lowest disposed page, or extend the file by one page
    fn allocate_page(&mut self) -> PageNum {
        match self.free_pages.iter().next().copied() {
            Some(reused) => {
                self.free_pages.remove(&reused);
                reused
            }
            None => {
                let fresh = self.page_count;
                self.page_count += 1;
                fresh
            }
        }
    }

    /// Reads past the end of the file yield zeros
    fn read_page(&mut self, page_num: PageNum, buffer: &mut [u8]) -> FileResult<()> {
        check_page_buffer(buffer.len())?;
        if page_num < 0 {
            return Err(FileError::InvalidPageNum(page_num));
        }

        self.file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        let bytes_read = self.file.read(buffer)?;
        buffer[bytes_read..].fill(0);
        Ok(())
    }

    /// Writing past the end of the file extends it first
    fn write_page(&mut self, page_num: PageNum, buffer: &[u8]) -> FileResult<()> {
        check_page_buffer(buffer.len())?;
        if page_num < 0 {
            return Err(FileError::InvalidPageNum(page_num));
        }

        let offset = page_num as u64 * PAGE_SIZE as u64;
        let required = offset + PAGE_SIZE as u64;
        if self.file.metadata()?.len() < required {
            self.file.set_len(required)?;
        }

        self.file.seek(SeekFrom::Start(offset))?;
        self.file.write_all(buffer)?;
        // No per-write sync; callers batch and sync through the buffer layer.
        Ok(())
    }
}

fn check_page_buffer(len: usize) -> FileResult<()> {
    if len != PAGE_SIZE {
        return Err(FileError::InvalidPageSize {
            expected: PAGE_SIZE,
            actual: len,
        });
    }
    Ok(())
}

/// Registry of open paged files. Owns the per-file allocation state; the
/// buffer layer above only caches frames.
pub struct FileManager {
    /// Slab of open files; `None` slots are reused for new handles
    files: Vec<Option<PagedFile>>,
    /// Open-path index so the same file never gets two handles
    path_to_handle: HashMap<PathBuf, FileHandle>,
}

impl FileManager {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            path_to_handle: HashMap::new(),
        }
    }

    /// Create a new, empty paged file on disk
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();
        if path.exists() {
            return Err(FileError::FileAlreadyExists(path.display().to_string()));
        }
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        File::create(path)?;
        Ok(())
    }

    /// Open a file, reusing the existing handle if it is already open
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        let path_ref = path.as_ref();
        let path = path_ref
            .canonicalize()
            .map_err(|_| FileError::FileNotFound(path_ref.display().to_string()))?;

        if let Some(&handle) = self.path_to_handle.get(&path) {
            return Ok(handle);
        }

        let opened = PagedFile::open(path.clone())?;
        let handle = match self.files.iter().position(|slot| slot.is_none()) {
            Some(slot) => {
                self.files[slot] = Some(opened);
                FileHandle(slot as u32)
            }
            None => {
                self.files.push(Some(opened));
                FileHandle((self.files.len() - 1) as u32)
            }
        };
        self.path_to_handle.insert(path, handle);
        Ok(handle)
    }

    /// Close a file, freeing its handle slot
    pub fn close_file(&mut self, handle: FileHandle) -> FileResult<()> {
        let entry = self
            .files
            .get_mut(handle.as_usize())
            .and_then(Option::take)
            .ok_or(FileError::InvalidHandle(handle.as_usize()))?;
        self.path_to_handle.remove(&entry.path);
        Ok(())
    }

    /// Delete a file from disk, closing it first if open
    pub fn remove_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        let path = path.as_ref();
        if let Ok(canonical) = path.canonicalize() {
            if let Some(&handle) = self.path_to_handle.get(&canonical) {
                self.close_file(handle)?;
            }
        }
        std::fs::remove_file(path)?;
        Ok(())
    }

    fn entry(&self, handle: FileHandle) -> FileResult<&PagedFile> {
        self.files
            .get(handle.as_usize())
            .and_then(Option::as_ref)
            .ok_or(FileError::InvalidHandle(handle.as_usize()))
    }

    fn entry_mut(&mut self, handle: FileHandle) -> FileResult<&mut PagedFile> {
        self.files
            .get_mut(handle.as_usize())
            .and_then(Option::as_mut)
            .ok_or(FileError::InvalidHandle(handle.as_usize()))
    }

    pub fn read_page(
        &mut self,
        handle: FileHandle,
        page_num: PageNum,
        buffer: &mut [u8],
    ) -> FileResult<()> {
        self.entry_mut(handle)?.read_page(page_num, buffer)
    }

    pub fn write_page(
        &mut self,
        handle: FileHandle,
        page_num: PageNum,
        buffer: &[u8],
    ) -> FileResult<()> {
        self.entry_mut(handle)?.write_page(page_num, buffer)
    }

    /// Number of pages in the file, disposed pages included
    pub fn page_count(&self, handle: FileHandle) -> FileResult<PageNum> {
        Ok(self.entry(handle)?.page_count)
    }

    /// Fail with `InvalidPageNum` for never-allocated or disposed pages
    pub fn validate_page(&self, handle: FileHandle, page_num: PageNum) -> FileResult<()> {
        if !self.entry(handle)?.page_is_valid(page_num) {
            return Err(FileError::InvalidPageNum(page_num));
        }
        Ok(())
    }

    /// Allocate a page: the lowest disposed page if any, else a fresh one at
    /// the end of the file. The page contents on disk are unspecified until
    /// the first write.
    pub fn allocate_page(&mut self, handle: FileHandle) -> FileResult<PageNum> {
        Ok(self.entry_mut(handle)?.allocate_page())
    }

    /// Dispose a page: zero it on disk so it stays recognizably dead across
    /// reopen, and mark it free for reallocation.
    pub fn dispose_page(&mut self, handle: FileHandle, page_num: PageNum) -> FileResult<()> {
        self.validate_page(handle, page_num)?;
        let entry = self.entry_mut(handle)?;
        let zeros = vec![0u8; PAGE_SIZE];
        entry.write_page(page_num, &zeros)?;
        entry.free_pages.insert(page_num);
        Ok(())
    }

    /// Flush one file's OS buffers to disk
    pub fn sync_file(&mut self, handle: FileHandle) -> FileResult<()> {
        self.entry_mut(handle)?.file.sync_data()?;
        Ok(())
    }

    /// Flush every open file's OS buffers to disk
    pub fn sync_all(&mut self) -> FileResult<()> {
        for entry in self.files.iter_mut().flatten() {
            entry.file.sync_data()?;
        }
        Ok(())
    }

    pub fn is_file_open(&self, handle: FileHandle) -> bool {
        self.entry(handle).is_ok()
    }

    pub fn open_file_count(&self) -> usize {
        self.files.iter().flatten().count()
    }
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new()
    }
}
