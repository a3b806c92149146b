use crate::condition::ConditionFilter;
use crate::file::{BufferManager, FileError, FileHandle};

use super::error::{RecordError, RecordResult};
use super::page::RecordPageView;
use super::{Record, Rid};

/// Sequential full-file scan with an optional predicate.
///
/// Starts at (page 1, slot -1); disposed pages are skipped. Each call returns
/// the next matching record or `RecordError::Eof` past the last page.
pub struct RecordScanner<'a> {
    file: FileHandle,
    filter: Option<&'a dyn ConditionFilter>,
    position: Rid,
    open: bool,
}

impl<'a> RecordScanner<'a> {
    pub fn open_scan(file: FileHandle, filter: Option<&'a dyn ConditionFilter>) -> Self {
        Self {
            file,
            filter,
            position: Rid::new(1, -1),
            open: true,
        }
    }

    pub fn close_scan(&mut self) {
        self.open = false;
    }

    /// Advance to the next matching record
    pub fn next_record(&mut self, buffer_manager: &mut BufferManager) -> RecordResult<Record> {
        if !self.open {
            return Err(RecordError::Closed);
        }

        let page_count = buffer_manager.get_page_count(self.file)?;
        if page_count <= 1 {
            return Err(RecordError::Eof);
        }

        let mut page_num = self.position.page_num;
        let mut slot_num = self.position.slot_num;

        while page_num < page_count {
            let buffer = match buffer_manager.get_page(self.file, page_num) {
                Ok(buffer) => buffer,
                Err(FileError::InvalidPageNum(_)) => {
                    page_num += 1;
                    slot_num = -1;
                    continue;
                }
                Err(e) => return Err(e.into()),
            };

            let view = match RecordPageView::init(buffer, page_num) {
                Ok(view) => view,
                Err(RecordError::File(FileError::InvalidPageNum(_))) => {
                    page_num += 1;
                    slot_num = -1;
                    continue;
                }
                Err(e) => return Err(e),
            };

            let mut advanced = slot_num;
            loop {
                match view.next_occupied_slot(advanced) {
                    None => break,
                    Some(slot) => {
                        advanced = slot;
                        let rid = Rid::new(page_num, slot);
                        let data = view.record(rid)?;
                        if self.filter.map_or(true, |f| f.matches(data)) {
                            let record = Record::new(rid, data.to_vec());
                            self.position = rid;
                            return Ok(record);
                        }
                    }
                }
            }

            page_num += 1;
            slot_num = -1;
        }

        self.position = Rid::new(page_num, -1);
        Err(RecordError::Eof)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::condition::{AttrConditionFilter, CompOp};
    use crate::record::{AttrType, RecordFile, Value};
    use std::collections::HashSet;
    use tempfile::TempDir;

    fn setup(record_size: usize) -> (TempDir, BufferManager, RecordFile) {
        let temp_dir = tempfile::tempdir().unwrap();
        let path = temp_dir.path().join("test.data");
        let mut bm = BufferManager::new();
        let rf = RecordFile::create(&mut bm, &path, record_size).unwrap();
        (temp_dir, bm, rf)
    }

    fn collect_all(bm: &mut BufferManager, scanner: &mut RecordScanner) -> Vec<Record> {
        let mut out = Vec::new();
        loop {
            match scanner.next_record(bm) {
                Ok(record) => out.push(record),
                Err(RecordError::Eof) => break,
                Err(e) => panic!("scan failed: {}", e),
            }
        }
        out
    }

    #[test]
    fn test_empty_file_is_eof() {
        let (_dir, mut bm, rf) = setup(8);
        let mut scanner = RecordScanner::open_scan(rf.file(), None);
        assert!(matches!(
            scanner.next_record(&mut bm),
            Err(RecordError::Eof)
        ));
    }

    #[test]
    fn test_scan_returns_live_set() {
        let (_dir, mut bm, mut rf) = setup(8);

        let mut expected = HashSet::new();
        let mut rids = Vec::new();
        for i in 0..50u8 {
            let rid = rf.insert_record(&mut bm, &[i; 8]).unwrap();
            rids.push(rid);
            expected.insert(rid);
        }
        for rid in rids.iter().step_by(4) {
            rf.delete_record(&mut bm, *rid).unwrap();
            expected.remove(rid);
        }

        let mut scanner = RecordScanner::open_scan(rf.file(), None);
        let scanned: HashSet<Rid> = collect_all(&mut bm, &mut scanner)
            .into_iter()
            .map(|r| r.rid)
            .collect();
        assert_eq!(scanned, expected);
    }

    #[test]
    fn test_scan_with_predicate() {
        let (_dir, mut bm, mut rf) = setup(4);

        for i in 0..20 {
            let data = Value::Int(i).encode(4).unwrap();
            rf.insert_record(&mut bm, &data).unwrap();
        }

        let filter = AttrConditionFilter::new(
            0,
            4,
            AttrType::Ints,
            CompOp::GreatEqual,
            Value::Int(15).encode(4).unwrap(),
        );
        let mut scanner = RecordScanner::open_scan(rf.file(), Some(&filter));
        let matched = collect_all(&mut bm, &mut scanner);
        assert_eq!(matched.len(), 5);
        for record in &matched {
            let v = i32::from_le_bytes([
                record.data[0],
                record.data[1],
                record.data[2],
                record.data[3],
            ]);
            assert!(v >= 15);
        }
    }

    #[test]
    fn test_scan_skips_disposed_page() {
        let (_dir, mut bm, mut rf) = setup(512);

        let mut rids = Vec::new();
        for i in 0..40u8 {
            rids.push(rf.insert_record(&mut bm, &[i; 512]).unwrap());
        }
        // Wipe out page 1, leaving a hole the scan must step over
        for rid in rids.iter().filter(|r| r.page_num == 1) {
            rf.delete_record(&mut bm, *rid).unwrap();
        }

        let survivors: Vec<Rid> = rids.iter().copied().filter(|r| r.page_num != 1).collect();
        let mut scanner = RecordScanner::open_scan(rf.file(), None);
        let scanned: Vec<Rid> = collect_all(&mut bm, &mut scanner)
            .into_iter()
            .map(|r| r.rid)
            .collect();
        assert_eq!(scanned, survivors);
    }

    #[test]
    fn test_scan_order_is_physical() {
        let (_dir, mut bm, mut rf) = setup(4);

        for v in [5, 3, 7] {
            let data = Value::Int(v).encode(4).unwrap();
            rf.insert_record(&mut bm, &data).unwrap();
        }

        let mut scanner = RecordScanner::open_scan(rf.file(), None);
        let values: Vec<i32> = collect_all(&mut bm, &mut scanner)
            .iter()
            .map(|r| i32::from_le_bytes([r.data[0], r.data[1], r.data[2], r.data[3]]))
            .collect();
        assert_eq!(values, vec![5, 3, 7]);
    }

    #[test]
    fn test_closed_scanner_errors() {
        let (_dir, mut bm, rf) = setup(8);
        let mut scanner = RecordScanner::open_scan(rf.file(), None);
        scanner.close_scan();
        assert!(matches!(
            scanner.next_record(&mut bm),
            Err(RecordError::Closed)
        ));
    }
}
