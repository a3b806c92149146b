use crate::file::{FileError, PageNum, PAGE_SIZE};

use super::error::{RecordError, RecordResult};
use super::{Rid, SlotNum};

/// Page header stored at the beginning of each record page
#[derive(Debug, Clone, Copy)]
pub struct PageHeader {
    /// Current number of live records
    pub record_num: i32,
    /// Maximum number of slots in this page
    pub record_capacity: i32,
    /// Unaligned tuple size
    pub record_real_size: i32,
    /// 8-byte aligned slot size
    pub record_size: i32,
    /// Offset of the record area (after header + bitmap, 8-byte aligned)
    pub first_record_offset: i32,
}

impl PageHeader {
    pub const SIZE: usize = 20;

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.record_num.to_le_bytes());
        out[4..8].copy_from_slice(&self.record_capacity.to_le_bytes());
        out[8..12].copy_from_slice(&self.record_real_size.to_le_bytes());
        out[12..16].copy_from_slice(&self.record_size.to_le_bytes());
        out[16..20].copy_from_slice(&self.first_record_offset.to_le_bytes());
        out
    }

    pub fn deserialize(data: &[u8]) -> PageHeader {
        let read = |i: usize| i32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        PageHeader {
            record_num: read(0),
            record_capacity: read(4),
            record_real_size: read(8),
            record_size: read(12),
            first_record_offset: read(16),
        }
    }
}

fn align8(size: usize) -> usize {
    (size + 7) / 8 * 8
}

fn bitmap_size(record_capacity: usize) -> usize {
    (record_capacity + 7) / 8
}

/// Largest capacity such that header + bitmap + aligned slots fit in a page
pub fn page_record_capacity(record_size: usize) -> usize {
    let mut capacity = ((PAGE_SIZE - PageHeader::SIZE - 1) * 8) / (record_size * 8 + 1);
    while capacity > 0
        && align8(PageHeader::SIZE + bitmap_size(capacity)) + capacity * record_size > PAGE_SIZE
    {
        capacity -= 1;
    }
    capacity
}

fn bit_get(bitmap: &[u8], index: usize) -> bool {
    (bitmap[index / 8] & (1 << (index % 8))) != 0
}

fn bit_set(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] |= 1 << (index % 8);
}

fn bit_clear(bitmap: &mut [u8], index: usize) {
    bitmap[index / 8] &= !(1 << (index % 8));
}

fn next_set_bit(bitmap: &[u8], capacity: usize, from: usize) -> Option<usize> {
    (from..capacity).find(|&i| bit_get(bitmap, i))
}

fn next_clear_bit(bitmap: &[u8], capacity: usize, from: usize) -> Option<usize> {
    (from..capacity).find(|&i| !bit_get(bitmap, i))
}

/// Mutable slot layout over one pinned record-page frame.
///
/// All mutations go through the frame borrow, so the page is dirty exactly
/// when the caller obtained the frame via `get_page_mut`.
pub struct RecordPage<'a> {
    buffer: &'a mut [u8],
    header: PageHeader,
    page_num: PageNum,
}

impl<'a> RecordPage<'a> {
    /// Bind an existing record page. A zeroed (disposed or never initialized)
    /// page has capacity 0 and reports `InvalidPageNum` so scanners skip it.
    pub fn init(buffer: &'a mut [u8], page_num: PageNum) -> RecordResult<Self> {
        let header = PageHeader::deserialize(&buffer[..PageHeader::SIZE]);
        if header.record_capacity <= 0 || header.record_size <= 0 {
            return Err(RecordError::File(FileError::InvalidPageNum(page_num)));
        }
        Ok(Self {
            buffer,
            header,
            page_num,
        })
    }

    /// Lay out a fresh record page for records of `record_size` bytes
    pub fn init_empty(
        buffer: &'a mut [u8],
        page_num: PageNum,
        record_size: usize,
    ) -> RecordResult<Self> {
        if record_size == 0 {
            return Err(RecordError::InvalidArgument(
                "record size must be positive".to_string(),
            ));
        }
        let aligned = align8(record_size);
        let capacity = page_record_capacity(aligned);
        if capacity == 0 {
            return Err(RecordError::InvalidArgument(format!(
                "record size {} is too large for one page",
                record_size
            )));
        }

        let header = PageHeader {
            record_num: 0,
            record_capacity: capacity as i32,
            record_real_size: record_size as i32,
            record_size: aligned as i32,
            first_record_offset: align8(PageHeader::SIZE + bitmap_size(capacity)) as i32,
        };

        buffer.fill(0);
        buffer[..PageHeader::SIZE].copy_from_slice(&header.serialize());

        Ok(Self {
            buffer,
            header,
            page_num,
        })
    }

    fn write_header(&mut self) {
        self.buffer[..PageHeader::SIZE].copy_from_slice(&self.header.serialize());
    }

    fn bitmap(&self) -> &[u8] {
        let size = bitmap_size(self.header.record_capacity as usize);
        &self.buffer[PageHeader::SIZE..PageHeader::SIZE + size]
    }

    fn bitmap_mut(&mut self) -> &mut [u8] {
        let size = bitmap_size(self.header.record_capacity as usize);
        &mut self.buffer[PageHeader::SIZE..PageHeader::SIZE + size]
    }

    fn slot_range(&self, slot: usize) -> (usize, usize) {
        let start = self.header.first_record_offset as usize + slot * self.header.record_size as usize;
        (start, start + self.header.record_real_size as usize)
    }

    /// Insert into the lowest free slot
    pub fn insert_record(&mut self, data: &[u8]) -> RecordResult<Rid> {
        if self.header.record_num == self.header.record_capacity {
            return Err(RecordError::PageFull);
        }
        if data.len() != self.header.record_real_size as usize {
            return Err(RecordError::InvalidArgument(format!(
                "record has {} bytes, page stores {}",
                data.len(),
                self.header.record_real_size
            )));
        }

        let capacity = self.header.record_capacity as usize;
        let slot = next_clear_bit(self.bitmap(), capacity, 0).ok_or(RecordError::PageFull)?;

        bit_set(self.bitmap_mut(), slot);
        self.header.record_num += 1;
        let (start, end) = self.slot_range(slot);
        self.buffer[start..end].copy_from_slice(data);
        self.write_header();

        Ok(Rid::new(self.page_num, slot as SlotNum))
    }

    /// Overwrite an existing record's bytes
    pub fn update_record(&mut self, rid: Rid, data: &[u8]) -> RecordResult<()> {
        if rid.slot_num < 0 || rid.slot_num >= self.header.record_capacity {
            return Err(RecordError::InvalidArgument(format!(
                "slot {} exceeds page capacity {}",
                rid.slot_num, self.header.record_capacity
            )));
        }
        if data.len() != self.header.record_real_size as usize {
            return Err(RecordError::InvalidArgument(format!(
                "record has {} bytes, page stores {}",
                data.len(),
                self.header.record_real_size
            )));
        }
        if !bit_get(self.bitmap(), rid.slot_num as usize) {
            return Err(RecordError::NotExist);
        }

        let (start, end) = self.slot_range(rid.slot_num as usize);
        self.buffer[start..end].copy_from_slice(data);
        Ok(())
    }

    /// Clear the record's slot. Returns true when the page became empty; the
    /// caller is then responsible for disposing the page.
    pub fn delete_record(&mut self, rid: Rid) -> RecordResult<bool> {
        if rid.slot_num < 0 || rid.slot_num >= self.header.record_capacity {
            return Err(RecordError::InvalidArgument(format!(
                "slot {} exceeds page capacity {}",
                rid.slot_num, self.header.record_capacity
            )));
        }
        if !bit_get(self.bitmap(), rid.slot_num as usize) {
            return Err(RecordError::NotExist);
        }

        bit_clear(self.bitmap_mut(), rid.slot_num as usize);
        self.header.record_num -= 1;
        self.write_header();

        Ok(self.header.record_num == 0)
    }

    /// Borrow a record's bytes; the borrow cannot outlive the frame
    pub fn record(&self, rid: Rid) -> RecordResult<&[u8]> {
        if rid.slot_num < 0 || rid.slot_num >= self.header.record_capacity {
            return Err(RecordError::InvalidRid(rid));
        }
        if !bit_get(self.bitmap(), rid.slot_num as usize) {
            return Err(RecordError::NotExist);
        }
        let (start, end) = self.slot_range(rid.slot_num as usize);
        Ok(&self.buffer[start..end])
    }

    /// Next occupied slot strictly after `slot` (-1 scans from the start)
    pub fn next_occupied_slot(&self, slot: SlotNum) -> Option<SlotNum> {
        let from = (slot + 1).max(0) as usize;
        next_set_bit(self.bitmap(), self.header.record_capacity as usize, from)
            .map(|s| s as SlotNum)
    }

    pub fn is_full(&self) -> bool {
        self.header.record_num >= self.header.record_capacity
    }

    pub fn record_num(&self) -> i32 {
        self.header.record_num
    }

    pub fn record_capacity(&self) -> i32 {
        self.header.record_capacity
    }

    pub fn page_num(&self) -> PageNum {
        self.page_num
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }
}

/// Read-only view of a record page, used by scanners and free-space probes
pub struct RecordPageView<'a> {
    buffer: &'a [u8],
    header: PageHeader,
    page_num: PageNum,
}

impl<'a> RecordPageView<'a> {
    pub fn init(buffer: &'a [u8], page_num: PageNum) -> RecordResult<Self> {
        let header = PageHeader::deserialize(&buffer[..PageHeader::SIZE]);
        if header.record_capacity <= 0 || header.record_size <= 0 {
            return Err(RecordError::File(FileError::InvalidPageNum(page_num)));
        }
        Ok(Self {
            buffer,
            header,
            page_num,
        })
    }

    fn bitmap(&self) -> &[u8] {
        let size = bitmap_size(self.header.record_capacity as usize);
        &self.buffer[PageHeader::SIZE..PageHeader::SIZE + size]
    }

    pub fn record(&self, rid: Rid) -> RecordResult<&'a [u8]> {
        if rid.slot_num < 0 || rid.slot_num >= self.header.record_capacity {
            return Err(RecordError::InvalidRid(rid));
        }
        if !bit_get(self.bitmap(), rid.slot_num as usize) {
            return Err(RecordError::NotExist);
        }
        let start = self.header.first_record_offset as usize
            + rid.slot_num as usize * self.header.record_size as usize;
        Ok(&self.buffer[start..start + self.header.record_real_size as usize])
    }

    pub fn next_occupied_slot(&self, slot: SlotNum) -> Option<SlotNum> {
        let from = (slot + 1).max(0) as usize;
        next_set_bit(self.bitmap(), self.header.record_capacity as usize, from)
            .map(|s| s as SlotNum)
    }

    pub fn is_full(&self) -> bool {
        self.header.record_num >= self.header.record_capacity
    }

    pub fn record_num(&self) -> i32 {
        self.header.record_num
    }

    pub fn page_num(&self) -> PageNum {
        self.page_num
    }

    pub fn header(&self) -> &PageHeader {
        &self.header
    }
}
