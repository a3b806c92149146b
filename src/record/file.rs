use std::path::Path;

use crate::file::{BufferManager, FileError, FileHandle, PageNum};

use super::error::{RecordError, RecordResult};
use super::page::{RecordPage, RecordPageView};
use super::{Record, Rid};

/// Record storage over one data file.
///
/// Page 0 is reserved; records live on pages 1 and up. The handler remembers
/// the page it last inserted into and probes from there, wrapping around the
/// file, before allocating a new page.
pub struct RecordFile {
    file: FileHandle,
    record_size: usize,
    /// Insertion hint; -1 when no page is cached
    current_page_num: PageNum,
}

impl RecordFile {
    /// Create the data file and reserve page 0
    pub fn create<P: AsRef<Path>>(
        buffer_manager: &mut BufferManager,
        path: P,
        record_size: usize,
    ) -> RecordResult<Self> {
        if record_size == 0 {
            return Err(RecordError::InvalidArgument(
                "record size must be positive".to_string(),
            ));
        }
        buffer_manager.create_file(&path)?;
        let file = buffer_manager.open_file(&path)?;
        let reserved = buffer_manager.allocate_page(file)?;
        debug_assert_eq!(reserved, 0);

        Ok(Self {
            file,
            record_size,
            current_page_num: -1,
        })
    }

    /// Open an existing data file
    pub fn open<P: AsRef<Path>>(
        buffer_manager: &mut BufferManager,
        path: P,
        record_size: usize,
    ) -> RecordResult<Self> {
        let file = buffer_manager.open_file(path)?;
        Ok(Self {
            file,
            record_size,
            current_page_num: -1,
        })
    }

    pub fn file(&self) -> FileHandle {
        self.file
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    /// Insert a record, probing from the cached page, wrapping over every
    /// page but page 0, then allocating a fresh page on miss.
    pub fn insert_record(
        &mut self,
        buffer_manager: &mut BufferManager,
        data: &[u8],
    ) -> RecordResult<Rid> {
        if data.len() != self.record_size {
            return Err(RecordError::InvalidArgument(format!(
                "record has {} bytes, table stores {}",
                data.len(),
                self.record_size
            )));
        }

        let page_count = buffer_manager.get_page_count(self.file)?;
        let start = if self.current_page_num > 0 {
            self.current_page_num
        } else {
            1
        };

        for i in 0..page_count {
            let page_num = (start + i) % page_count;
            if page_num == 0 {
                continue;
            }
            let has_room = match buffer_manager.get_page(self.file, page_num) {
                Ok(buffer) => match RecordPageView::init(buffer, page_num) {
                    Ok(view) => !view.is_full(),
                    Err(RecordError::File(FileError::InvalidPageNum(_))) => false,
                    Err(e) => return Err(e),
                },
                Err(FileError::InvalidPageNum(_)) => false,
                Err(e) => return Err(e.into()),
            };
            if has_room {
                let buffer = buffer_manager.get_page_mut(self.file, page_num)?;
                let mut page = RecordPage::init(buffer, page_num)?;
                let rid = page.insert_record(data)?;
                self.current_page_num = page_num;
                return Ok(rid);
            }
        }

        // Every existing page is full (or dead); grow the file
        let mut page_num = buffer_manager.allocate_page(self.file)?;
        if page_num == 0 {
            // Reserved page was never persisted; claim it and move on
            page_num = buffer_manager.allocate_page(self.file)?;
        }
        let buffer = buffer_manager.get_page_mut(self.file, page_num)?;
        let mut page = RecordPage::init_empty(buffer, page_num, self.record_size)?;
        let rid = page.insert_record(data)?;
        self.current_page_num = page_num;
        Ok(rid)
    }

    /// Overwrite the record's bytes in place
    pub fn update_record(
        &mut self,
        buffer_manager: &mut BufferManager,
        rid: Rid,
        data: &[u8],
    ) -> RecordResult<()> {
        if rid.is_empty() {
            return Err(RecordError::InvalidRid(rid));
        }
        let buffer = buffer_manager.get_page_mut(self.file, rid.page_num)?;
        let mut page = RecordPage::init(buffer, rid.page_num)?;
        page.update_record(rid, data)
    }

    /// Delete the record; a page that empties is disposed and the insertion
    /// hint invalidated if it pointed there.
    pub fn delete_record(
        &mut self,
        buffer_manager: &mut BufferManager,
        rid: Rid,
    ) -> RecordResult<()> {
        if rid.is_empty() {
            return Err(RecordError::InvalidRid(rid));
        }

        let page_empty = {
            let buffer = buffer_manager.get_page_mut(self.file, rid.page_num)?;
            let mut page = RecordPage::init(buffer, rid.page_num)?;
            page.delete_record(rid)?
        };

        if page_empty {
            buffer_manager.dispose_page(self.file, rid.page_num)?;
            if self.current_page_num == rid.page_num {
                self.current_page_num = -1;
            }
        }
        Ok(())
    }

    /// Copy a record out of its page
    pub fn get_record(
        &self,
        buffer_manager: &mut BufferManager,
        rid: Rid,
    ) -> RecordResult<Record> {
        if rid.is_empty() {
            return Err(RecordError::InvalidRid(rid));
        }
        let buffer = buffer_manager.get_page(self.file, rid.page_num)?;
        let view = RecordPageView::init(buffer, rid.page_num)?;
        let data = view.record(rid)?.to_vec();
        Ok(Record::new(rid, data))
    }
}
