use lru::LruCache;
use std::num::NonZeroUsize;
use std::path::Path;

use super::error::{FileError, FileResult};
use super::file_manager::{FileHandle, FileManager};
use super::{PageNum, BUFFER_POOL_SIZE, PAGE_SIZE};

/// A key identifying a page in the buffer pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
struct BufferKey {
    file: FileHandle,
    page_num: PageNum,
}

/// In-memory frame holding one page
struct Frame {
    data: Vec<u8>,
    dirty: bool,
}

/// Buffer manager: an LRU frame cache in front of the file manager, which
/// owns page allocation and disposal.
///
/// There is no explicit pin/unpin: a page is resident exactly as long as the
/// `&[u8]`/`&mut [u8]` returned by `get_page`/`get_page_mut` is borrowed, and
/// nothing can evict it underneath the borrow. `get_page_mut` marks the frame
/// dirty.
pub struct BufferManager {
    file_manager: FileManager,
    frames: LruCache<BufferKey, Frame>,
    max_pool_size: usize,
    /// Reusable buffer for loading pages (avoids allocation on every load)
    load_buffer: Vec<u8>,
}

impl BufferManager {
    pub fn new() -> Self {
        Self::with_capacity(BUFFER_POOL_SIZE)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            file_manager: FileManager::new(),
            frames: LruCache::new(NonZeroUsize::new(capacity).unwrap()),
            max_pool_size: capacity,
            load_buffer: vec![0u8; PAGE_SIZE],
        }
    }

    pub fn file_manager(&self) -> &FileManager {
        &self.file_manager
    }

    pub fn file_manager_mut(&mut self) -> &mut FileManager {
        &mut self.file_manager
    }

    /// Create a new paged file on disk
    pub fn create_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<()> {
        self.file_manager.create_file(path)
    }

    /// Open a file (or return the handle it is already open under)
    pub fn open_file<P: AsRef<Path>>(&mut self, path: P) -> FileResult<FileHandle> {
        self.file_manager.open_file(path)
    }

    /// Flush and drop the file's frames, then close it
    pub fn close_file(&mut self, file: FileHandle) -> FileResult<()> {
        self.purge_file(file)?;
        self.file_manager.close_file(file)
    }

    /// Number of pages in the file, disposed pages included
    pub fn get_page_count(&self, file: FileHandle) -> FileResult<PageNum> {
        self.file_manager.page_count(file)
    }

    /// Allocate a page through the file manager and give it a zeroed, dirty
    /// frame.
    pub fn allocate_page(&mut self, file: FileHandle) -> FileResult<PageNum> {
        let page_num = self.file_manager.allocate_page(file)?;

        let key = BufferKey { file, page_num };
        while self.frames.len() >= self.max_pool_size {
            self.evict_lru_page()?;
        }
        self.frames.put(
            key,
            Frame {
                data: vec![0u8; PAGE_SIZE],
                dirty: true,
            },
        );

        Ok(page_num)
    }

    /// Dispose a page: its frame is discarded (not written back) and the file
    /// manager zeroes it on disk and marks it free for reuse.
    pub fn dispose_page(&mut self, file: FileHandle, page_num: PageNum) -> FileResult<()> {
        self.file_manager.validate_page(file, page_num)?;
        self.frames.pop(&BufferKey { file, page_num });
        self.file_manager.dispose_page(file, page_num)
    }

    /// Borrow a page read-only, loading it from disk if necessary
    pub fn get_page(&mut self, file: FileHandle, page_num: PageNum) -> FileResult<&[u8]> {
        self.file_manager.validate_page(file, page_num)?;
        let key = BufferKey { file, page_num };

        if self.frames.peek(&key).is_none() {
            self.load_page(file, page_num)?;
        }

        Ok(&self.frames.get(&key).unwrap().data)
    }

    /// Borrow a page mutably, loading it if necessary; marks the frame dirty
    pub fn get_page_mut(&mut self, file: FileHandle, page_num: PageNum) -> FileResult<&mut [u8]> {
        self.file_manager.validate_page(file, page_num)?;
        let key = BufferKey { file, page_num };

        if self.frames.peek(&key).is_none() {
            self.load_page(file, page_num)?;
        }

        let frame = self.frames.get_mut(&key).unwrap();
        frame.dirty = true;
        Ok(&mut frame.data)
    }

    /// Mark a resident page as modified
    pub fn mark_dirty(&mut self, file: FileHandle, page_num: PageNum) -> FileResult<()> {
        let key = BufferKey { file, page_num };
        let frame = self
            .frames
            .get_mut(&key)
            .ok_or(FileError::PageNotCached(page_num))?;
        frame.dirty = true;
        Ok(())
    }

    /// Write one page back to disk if dirty
    pub fn flush_page(&mut self, file: FileHandle, page_num: PageNum) -> FileResult<()> {
        let key = BufferKey { file, page_num };
        if let Some(frame) = self.frames.peek_mut(&key) {
            if frame.dirty {
                self.file_manager.write_page(file, page_num, &frame.data)?;
                frame.dirty = false;
            }
        }
        Ok(())
    }

    /// Write back every dirty frame of one file and sync it
    pub fn flush_file(&mut self, file: FileHandle) -> FileResult<()> {
        let dirty_pages: Vec<PageNum> = self
            .frames
            .iter()
            .filter(|(key, frame)| key.file == file && frame.dirty)
            .map(|(key, _)| key.page_num)
            .collect();

        for page_num in dirty_pages {
            self.flush_page(file, page_num)?;
        }
        self.file_manager.sync_file(file)
    }

    /// Write back every dirty frame and sync all files
    pub fn flush_all(&mut self) -> FileResult<()> {
        let dirty_pages: Vec<BufferKey> = self
            .frames
            .iter()
            .filter(|(_, frame)| frame.dirty)
            .map(|(key, _)| *key)
            .collect();

        for key in dirty_pages {
            self.flush_page(key.file, key.page_num)?;
        }
        self.file_manager.sync_all()
    }

    /// Flush one file's frames and drop them from the cache
    pub fn purge_file(&mut self, file: FileHandle) -> FileResult<()> {
        self.flush_file(file)?;
        let keys: Vec<BufferKey> = self
            .frames
            .iter()
            .filter(|(key, _)| key.file == file)
            .map(|(key, _)| *key)
            .collect();
        for key in keys {
            self.frames.pop(&key);
        }
        Ok(())
    }

    fn load_page(&mut self, file: FileHandle, page_num: PageNum) -> FileResult<()> {
        let key = BufferKey { file, page_num };

        while self.frames.len() >= self.max_pool_size {
            self.evict_lru_page()?;
        }

        if self.load_buffer.len() != PAGE_SIZE {
            self.load_buffer = vec![0u8; PAGE_SIZE];
        }

        self.file_manager
            .read_page(file, page_num, &mut self.load_buffer)?;

        // Swap ownership into the pool without copying; an empty Vec comes
        // back and is replaced on the next eviction.
        let data = std::mem::take(&mut self.load_buffer);
        self.frames.put(key, Frame { data, dirty: false });

        Ok(())
    }

    fn evict_lru_page(&mut self) -> FileResult<()> {
        if let Some((key, frame)) = self.frames.pop_lru() {
            if frame.dirty {
                self.file_manager
                    .write_page(key.file, key.page_num, &frame.data)?;
            }
            // Recycle the evicted buffer for future page loads
            self.load_buffer = frame.data;
        }
        Ok(())
    }

    pub fn cached_page_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_page_cached(&self, file: FileHandle, page_num: PageNum) -> bool {
        self.frames.contains(&BufferKey { file, page_num })
    }

    pub fn dirty_page_count(&self) -> usize {
        self.frames.iter().filter(|(_, f)| f.dirty).count()
    }
}

impl Default for BufferManager {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for BufferManager {
    fn drop(&mut self) {
        let _ = self.flush_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn setup_test_env() -> (TempDir, BufferManager, FileHandle) {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.data");

        let mut bm = BufferManager::new();
        bm.create_file(&test_file).unwrap();
        let handle = bm.open_file(&test_file).unwrap();

        (temp_dir, bm, handle)
    }

    #[test]
    fn test_allocate_and_read_page() {
        let (_temp_dir, mut bm, handle) = setup_test_env();

        assert_eq!(bm.get_page_count(handle).unwrap(), 0);
        let p0 = bm.allocate_page(handle).unwrap();
        assert_eq!(p0, 0);
        assert_eq!(bm.get_page_count(handle).unwrap(), 1);

        let page = bm.get_page(handle, p0).unwrap();
        assert!(page.iter().all(|&b| b == 0));
    }

    #[test]
    fn test_get_unallocated_page_fails() {
        let (_temp_dir, mut bm, handle) = setup_test_env();

        assert!(matches!(
            bm.get_page(handle, 0),
            Err(FileError::InvalidPageNum(0))
        ));
        assert!(matches!(
            bm.get_page(handle, -1),
            Err(FileError::InvalidPageNum(-1))
        ));
    }

    #[test]
    fn test_get_page_mut_marks_dirty() {
        let (_temp_dir, mut bm, handle) = setup_test_env();

        let p = bm.allocate_page(handle).unwrap();
        bm.flush_all().unwrap();
        assert_eq!(bm.dirty_page_count(), 0);

        {
            let page = bm.get_page_mut(handle, p).unwrap();
            page[0] = 99;
        }
        assert_eq!(bm.dirty_page_count(), 1);

        let page = bm.get_page(handle, p).unwrap();
        assert_eq!(page[0], 99);
    }

    #[test]
    fn test_flush_and_reload() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.data");

        {
            let mut bm = BufferManager::new();
            bm.create_file(&test_file).unwrap();
            let handle = bm.open_file(&test_file).unwrap();
            let p = bm.allocate_page(handle).unwrap();
            bm.get_page_mut(handle, p).unwrap()[0] = 88;
            bm.flush_all().unwrap();
        }

        let mut bm = BufferManager::new();
        let handle = bm.open_file(&test_file).unwrap();
        assert_eq!(bm.get_page_count(handle).unwrap(), 1);
        assert_eq!(bm.get_page(handle, 0).unwrap()[0], 88);
    }

    #[test]
    fn test_dispose_page_invalidates_and_reuses() {
        let (_temp_dir, mut bm, handle) = setup_test_env();

        let p0 = bm.allocate_page(handle).unwrap();
        let p1 = bm.allocate_page(handle).unwrap();
        assert_eq!((p0, p1), (0, 1));

        bm.dispose_page(handle, p0).unwrap();
        assert!(matches!(
            bm.get_page(handle, p0),
            Err(FileError::InvalidPageNum(0))
        ));
        // Disposal does not shrink the file
        assert_eq!(bm.get_page_count(handle).unwrap(), 2);

        // The disposed page is reused before the file grows
        let p2 = bm.allocate_page(handle).unwrap();
        assert_eq!(p2, p0);
        assert_eq!(bm.get_page_count(handle).unwrap(), 2);
        assert!(bm.get_page(handle, p2).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_dispose_page_zeroes_disk() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.data");

        {
            let mut bm = BufferManager::new();
            bm.create_file(&test_file).unwrap();
            let handle = bm.open_file(&test_file).unwrap();
            let p = bm.allocate_page(handle).unwrap();
            bm.get_page_mut(handle, p).unwrap().fill(0xAB);
            bm.flush_all().unwrap();
            bm.dispose_page(handle, p).unwrap();
            bm.flush_all().unwrap();
        }

        let mut bm = BufferManager::new();
        let handle = bm.open_file(&test_file).unwrap();
        // After reopen the disposed page is readable again but zeroed
        assert!(bm.get_page(handle, 0).unwrap().iter().all(|&b| b == 0));
    }

    #[test]
    fn test_lru_eviction_writes_back() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.data");

        let mut bm = BufferManager::with_capacity(2);
        bm.create_file(&test_file).unwrap();
        let handle = bm.open_file(&test_file).unwrap();

        let p0 = bm.allocate_page(handle).unwrap();
        bm.get_page_mut(handle, p0).unwrap()[0] = 77;

        // Two more allocations evict p0's frame
        let p1 = bm.allocate_page(handle).unwrap();
        let p2 = bm.allocate_page(handle).unwrap();
        assert!(!bm.is_page_cached(handle, p0));
        assert!(bm.is_page_cached(handle, p1));
        assert!(bm.is_page_cached(handle, p2));

        // Reloading sees the written-back data
        assert_eq!(bm.get_page(handle, p0).unwrap()[0], 77);
    }

    #[test]
    fn test_lru_update_on_access() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.data");

        let mut bm = BufferManager::with_capacity(3);
        bm.create_file(&test_file).unwrap();
        let handle = bm.open_file(&test_file).unwrap();

        for _ in 0..3 {
            bm.allocate_page(handle).unwrap();
        }
        bm.flush_all().unwrap();

        // Touch page 0 so page 1 becomes the LRU
        bm.get_page(handle, 0).unwrap();
        bm.allocate_page(handle).unwrap();

        assert!(bm.is_page_cached(handle, 0));
        assert!(!bm.is_page_cached(handle, 1));
        assert!(bm.is_page_cached(handle, 2));
        assert!(bm.is_page_cached(handle, 3));
    }

    #[test]
    fn test_multiple_files() {
        let temp_dir = tempfile::tempdir().unwrap();
        let file1 = temp_dir.path().join("test1.data");
        let file2 = temp_dir.path().join("test2.data");

        let mut bm = BufferManager::new();
        bm.create_file(&file1).unwrap();
        bm.create_file(&file2).unwrap();
        let h1 = bm.open_file(&file1).unwrap();
        let h2 = bm.open_file(&file2).unwrap();

        let p1 = bm.allocate_page(h1).unwrap();
        let p2 = bm.allocate_page(h2).unwrap();
        bm.get_page_mut(h1, p1).unwrap()[0] = 11;
        bm.get_page_mut(h2, p2).unwrap()[0] = 22;

        assert_eq!(bm.get_page(h1, p1).unwrap()[0], 11);
        assert_eq!(bm.get_page(h2, p2).unwrap()[0], 22);
    }

    #[test]
    fn test_close_file_flushes_and_drops_frames() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.data");

        let mut bm = BufferManager::new();
        bm.create_file(&test_file).unwrap();
        let handle = bm.open_file(&test_file).unwrap();
        let p = bm.allocate_page(handle).unwrap();
        bm.get_page_mut(handle, p).unwrap()[0] = 44;

        bm.close_file(handle).unwrap();
        assert_eq!(bm.cached_page_count(), 0);
        assert!(matches!(
            bm.get_page(handle, p),
            Err(FileError::InvalidHandle(_))
        ));

        let handle = bm.open_file(&test_file).unwrap();
        assert_eq!(bm.get_page(handle, p).unwrap()[0], 44);
    }

    #[test]
    fn test_drop_flushes_dirty_pages() {
        let temp_dir = tempfile::tempdir().unwrap();
        let test_file = temp_dir.path().join("test.data");

        {
            let mut bm = BufferManager::new();
            bm.create_file(&test_file).unwrap();
            let handle = bm.open_file(&test_file).unwrap();
            let p = bm.allocate_page(handle).unwrap();
            bm.get_page_mut(handle, p).unwrap()[0] = 66;
            // bm dropped here, flushes
        }

        let mut bm = BufferManager::new();
        let handle = bm.open_file(&test_file).unwrap();
        assert_eq!(bm.get_page(handle, 0).unwrap()[0], 66);
    }
}
