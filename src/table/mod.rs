mod error;
mod meta;

pub use error::{TableError, TableResult};
pub use meta::{AttrInfo, FieldMeta, IndexMeta, TableMeta, TRANSACTION_FIELD_NAME};

use std::path::{Path, PathBuf};

use crate::condition::{CompOp, ConditionFilter};
use crate::file::BufferManager;
use crate::index::{IndexError, IndexFile, IndexScanner};
use crate::record::{Record, RecordError, RecordFile, RecordScanner, Rid, Value};
use crate::transaction::{DeleteOutcome, Transaction};

fn meta_path(base_dir: &Path, table: &str) -> PathBuf {
    base_dir.join(format!("{}.table", table))
}

fn data_path(base_dir: &Path, table: &str) -> PathBuf {
    base_dir.join(format!("{}.data", table))
}

fn index_path(base_dir: &Path, table: &str, index: &str) -> PathBuf {
    base_dir.join(format!("{}-{}.index", table, index))
}

fn read_stamp(data: &[u8], offset: usize) -> i32 {
    i32::from_le_bytes([
        data[offset],
        data[offset + 1],
        data[offset + 2],
        data[offset + 3],
    ])
}

fn write_stamp(data: &mut [u8], offset: usize, stamp: i32) {
    data[offset..offset + 4].copy_from_slice(&stamp.to_le_bytes());
}

/// One open secondary index of a table
struct TableIndex {
    field: FieldMeta,
    file: IndexFile,
}

impl TableIndex {
    fn key_of<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        &data[self.field.offset..self.field.offset + self.field.length]
    }
}

/// A table: record file plus secondary indexes under one schema.
///
/// Every mutation keeps the indexes in step with the records; failures
/// partway reverse the earlier steps in reverse order before surfacing.
pub struct Table {
    base_dir: PathBuf,
    meta: TableMeta,
    record_file: RecordFile,
    indexes: Vec<TableIndex>,
}

impl Table {
    /// Create the table: metadata first, then the empty data file
    pub fn create(
        buffer_manager: &mut BufferManager,
        base_dir: &Path,
        name: &str,
        attributes: &[AttrInfo],
    ) -> TableResult<Table> {
        let meta = TableMeta::new(name, attributes)?;
        meta.save(meta_path(base_dir, name))?;

        let record_file =
            RecordFile::create(buffer_manager, data_path(base_dir, name), meta.record_size())?;

        Ok(Table {
            base_dir: base_dir.to_path_buf(),
            meta,
            record_file,
            indexes: Vec::new(),
        })
    }

    /// Open the table and every index its metadata names
    pub fn open(
        buffer_manager: &mut BufferManager,
        base_dir: &Path,
        name: &str,
    ) -> TableResult<Table> {
        let meta = TableMeta::load(meta_path(base_dir, name))?;
        let record_file =
            RecordFile::open(buffer_manager, data_path(base_dir, name), meta.record_size())?;

        let mut indexes = Vec::new();
        for index_meta in meta.indexes() {
            let field = meta
                .field(&index_meta.field)
                .ok_or_else(|| TableError::FieldNotFound(index_meta.field.clone()))?
                .clone();
            let file = IndexFile::open(
                buffer_manager,
                index_path(base_dir, meta.name(), &index_meta.name),
            )?;
            indexes.push(TableIndex { field, file });
        }

        Ok(Table {
            base_dir: base_dir.to_path_buf(),
            meta,
            record_file,
            indexes,
        })
    }

    pub fn name(&self) -> &str {
        self.meta.name()
    }

    pub fn meta(&self) -> &TableMeta {
        &self.meta
    }

    /// Compose a record image from user values (stamp field left zero)
    pub fn make_record(&self, values: &[Value]) -> TableResult<Vec<u8>> {
        if values.len() != self.meta.visible_field_count() {
            return Err(TableError::SchemaMismatch(format!(
                "table {} has {} attributes, got {} values",
                self.meta.name(),
                self.meta.visible_field_count(),
                values.len()
            )));
        }

        let mut data = vec![0u8; self.meta.record_size()];
        for (value, field) in values.iter().zip(self.meta.visible_fields()) {
            if value.attr_type() != field.attr_type {
                return Err(TableError::SchemaMismatch(format!(
                    "attribute {} is {:?}, got {:?}",
                    field.name,
                    field.attr_type,
                    value.attr_type()
                )));
            }
            let encoded = value.encode(field.length)?;
            data[field.offset..field.offset + field.length].copy_from_slice(&encoded);
        }
        Ok(data)
    }

    /// Insert a tuple: stamp it with the transaction, store it, maintain
    /// every index, then register the intent.
    pub fn insert_record(
        &mut self,
        buffer_manager: &mut BufferManager,
        transaction: &mut Transaction,
        values: &[Value],
    ) -> TableResult<Rid> {
        let mut data = self.make_record(values)?;
        let stamp = transaction.stamp_for_insert();
        write_stamp(&mut data, self.meta.transaction_field().offset, stamp);

        let rid = self.record_file.insert_record(buffer_manager, &data)?;

        for i in 0..self.indexes.len() {
            let key = self.indexes[i].key_of(&data).to_vec();
            if let Err(e) = self.indexes[i].file.insert_entry(buffer_manager, &key, rid) {
                self.undo_insert(buffer_manager, &data, rid, i);
                return Err(e.into());
            }
        }

        if let Err(e) = transaction.insert_record(self.meta.name(), rid) {
            self.undo_insert(buffer_manager, &data, rid, self.indexes.len());
            return Err(e.into());
        }

        Ok(rid)
    }

    /// Reverse a partial insert: entries of the first `inserted` indexes,
    /// then the record itself
    fn undo_insert(
        &mut self,
        buffer_manager: &mut BufferManager,
        data: &[u8],
        rid: Rid,
        inserted: usize,
    ) {
        for j in (0..inserted).rev() {
            let key = self.indexes[j].key_of(data).to_vec();
            let _ = self.indexes[j].file.delete_entry(buffer_manager, &key, rid);
        }
        let _ = self.record_file.delete_record(buffer_manager, rid);
    }

    /// Delete every visible record matching the filter. Deletion is logical:
    /// the stamp is flagged and physical removal waits for commit, except
    /// when it cancels this transaction's own pending insert.
    pub fn delete_record(
        &mut self,
        buffer_manager: &mut BufferManager,
        transaction: &mut Transaction,
        filter: Option<&dyn ConditionFilter>,
    ) -> TableResult<usize> {
        let matches = self.collect_records(buffer_manager, transaction, filter, -1)?;
        let table_name = self.meta.name().to_string();
        let stamp_offset = self.meta.transaction_field().offset;

        for record in &matches {
            match transaction.delete_record(&table_name, record.rid)? {
                DeleteOutcome::CancelledPendingInsert => {
                    self.rollback_insert(buffer_manager, record.rid)?;
                }
                DeleteOutcome::MarkDeleted => {
                    let mut data = record.data.clone();
                    write_stamp(&mut data, stamp_offset, transaction.stamp_for_delete());
                    self.record_file
                        .update_record(buffer_manager, record.rid, &data)?;
                }
            }
        }
        Ok(matches.len())
    }

    /// Rewrite one attribute on every visible record matching the filter,
    /// maintaining the indexes on that attribute per record
    pub fn update_record(
        &mut self,
        buffer_manager: &mut BufferManager,
        transaction: &Transaction,
        field_name: &str,
        value: &Value,
        filter: Option<&dyn ConditionFilter>,
    ) -> TableResult<usize> {
        let field = self
            .meta
            .field(field_name)
            .filter(|f| f.visible)
            .ok_or_else(|| TableError::FieldNotFound(field_name.to_string()))?
            .clone();
        if value.attr_type() != field.attr_type {
            return Err(TableError::SchemaMismatch(format!(
                "attribute {} is {:?}, got {:?}",
                field.name,
                field.attr_type,
                value.attr_type()
            )));
        }
        let new_bytes = value.encode(field.length)?;

        let matches = self.collect_records(buffer_manager, transaction, filter, -1)?;
        for record in &matches {
            let old_key = record.data[field.offset..field.offset + field.length].to_vec();
            if old_key == new_bytes {
                continue;
            }

            let mut data = record.data.clone();
            data[field.offset..field.offset + field.length].copy_from_slice(&new_bytes);
            self.record_file
                .update_record(buffer_manager, record.rid, &data)?;

            for i in 0..self.indexes.len() {
                if self.indexes[i].field.name != field.name {
                    continue;
                }
                self.indexes[i]
                    .file
                    .delete_entry(buffer_manager, &old_key, record.rid)?;
                self.indexes[i]
                    .file
                    .insert_entry(buffer_manager, &new_bytes, record.rid)?;
            }
        }
        Ok(matches.len())
    }

    /// Scan visible records, routing through an index when the filter is a
    /// single-attribute range over an indexed attribute. `limit < 0` means
    /// unlimited. Returns the number of records handed to the reader.
    pub fn scan_record<F>(
        &self,
        buffer_manager: &mut BufferManager,
        transaction: &Transaction,
        filter: Option<&dyn ConditionFilter>,
        limit: i64,
        reader: &mut F,
    ) -> TableResult<usize>
    where
        F: FnMut(&Record) -> TableResult<()>,
    {
        if limit == 0 {
            return Ok(0);
        }
        let stamp_offset = self.meta.transaction_field().offset;
        let mut count = 0usize;

        if let Some(index) = filter.and_then(|f| self.find_index_for_scan(f)) {
            let attr = filter.unwrap().as_attr_filter().unwrap();
            let mut scanner =
                IndexScanner::open(&index.file, buffer_manager, attr.comp_op(), attr.value())?;
            loop {
                let rid = match scanner.next_entry(buffer_manager) {
                    Ok(rid) => rid,
                    Err(IndexError::Eof) => break,
                    Err(e) => return Err(e.into()),
                };
                let record = self.record_file.get_record(buffer_manager, rid)?;
                if !transaction.is_visible(read_stamp(&record.data, stamp_offset)) {
                    continue;
                }
                if let Some(f) = filter {
                    if !f.matches(&record.data) {
                        continue;
                    }
                }
                reader(&record)?;
                count += 1;
                if limit >= 0 && count as i64 >= limit {
                    break;
                }
            }
            return Ok(count);
        }

        let mut scanner = RecordScanner::open_scan(self.record_file.file(), filter);
        loop {
            let record = match scanner.next_record(buffer_manager) {
                Ok(record) => record,
                Err(RecordError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            if !transaction.is_visible(read_stamp(&record.data, stamp_offset)) {
                continue;
            }
            reader(&record)?;
            count += 1;
            if limit >= 0 && count as i64 >= limit {
                break;
            }
        }
        Ok(count)
    }

    /// Collect matching visible records into owned copies
    pub fn collect_records(
        &self,
        buffer_manager: &mut BufferManager,
        transaction: &Transaction,
        filter: Option<&dyn ConditionFilter>,
        limit: i64,
    ) -> TableResult<Vec<Record>> {
        let mut records = Vec::new();
        self.scan_record(buffer_manager, transaction, filter, limit, &mut |record| {
            records.push(record.clone());
            Ok(())
        })?;
        Ok(records)
    }

    /// An index usable for this filter: a single-attribute equality or range
    /// comparison over an indexed attribute
    fn find_index_for_scan(&self, filter: &dyn ConditionFilter) -> Option<&TableIndex> {
        let attr = filter.as_attr_filter()?;
        match attr.comp_op() {
            CompOp::EqualTo
            | CompOp::LessEqual
            | CompOp::LessThan
            | CompOp::GreatEqual
            | CompOp::GreatThan => {}
            CompOp::NotEqual | CompOp::NoOp => return None,
        }
        self.indexes.iter().find(|index| {
            index.field.offset == attr.offset()
                && index.field.length == attr.length()
                && index.field.attr_type == attr.attr_type()
        })
    }

    /// Build a secondary index over one attribute, backfilling it from every
    /// record already in the table
    pub fn create_index(
        &mut self,
        buffer_manager: &mut BufferManager,
        _transaction: &Transaction,
        index_name: &str,
        field_name: &str,
    ) -> TableResult<()> {
        if index_name.trim().is_empty() {
            return Err(TableError::InvalidArgument(
                "index name must not be blank".to_string(),
            ));
        }
        if self.meta.index(index_name).is_some() {
            return Err(TableError::IndexExists(index_name.to_string()));
        }
        let field = self
            .meta
            .field(field_name)
            .filter(|f| f.visible)
            .ok_or_else(|| TableError::FieldNotFound(field_name.to_string()))?
            .clone();

        let path = index_path(&self.base_dir, self.meta.name(), index_name);
        let mut file =
            IndexFile::create(buffer_manager, &path, field.attr_type, field.length)?;

        // Backfill from every physical record, committed or not
        let mut scanner = RecordScanner::open_scan(self.record_file.file(), None);
        loop {
            let record = match scanner.next_record(buffer_manager) {
                Ok(record) => record,
                Err(RecordError::Eof) => break,
                Err(e) => return Err(e.into()),
            };
            let key = &record.data[field.offset..field.offset + field.length];
            file.insert_entry(buffer_manager, key, record.rid)?;
        }

        self.meta.add_index(IndexMeta {
            name: index_name.to_string(),
            field: field.name.clone(),
        });
        self.meta.save(meta_path(&self.base_dir, self.meta.name()))?;

        self.indexes.push(TableIndex { field, file });
        Ok(())
    }

    /// Commit a pending insert: clear the stamp to "committed"
    pub fn commit_insert(&mut self, buffer_manager: &mut BufferManager, rid: Rid) -> TableResult<()> {
        let record = self.record_file.get_record(buffer_manager, rid)?;
        let mut data = record.data;
        write_stamp(&mut data, self.meta.transaction_field().offset, 0);
        self.record_file.update_record(buffer_manager, rid, &data)?;
        Ok(())
    }

    /// Commit a pending delete: remove index entries, then the record
    pub fn commit_delete(&mut self, buffer_manager: &mut BufferManager, rid: Rid) -> TableResult<()> {
        let record = self.record_file.get_record(buffer_manager, rid)?;
        for i in 0..self.indexes.len() {
            let key = self.indexes[i].key_of(&record.data).to_vec();
            self.indexes[i]
                .file
                .delete_entry(buffer_manager, &key, rid)?;
        }
        self.record_file.delete_record(buffer_manager, rid)?;
        Ok(())
    }

    /// Roll back a pending insert: the record vanishes physically
    pub fn rollback_insert(
        &mut self,
        buffer_manager: &mut BufferManager,
        rid: Rid,
    ) -> TableResult<()> {
        self.commit_delete(buffer_manager, rid)
    }

    /// Roll back a pending delete: clear the deletion flag
    pub fn rollback_delete(
        &mut self,
        buffer_manager: &mut BufferManager,
        rid: Rid,
    ) -> TableResult<()> {
        let record = self.record_file.get_record(buffer_manager, rid)?;
        let mut data = record.data;
        write_stamp(&mut data, self.meta.transaction_field().offset, 0);
        self.record_file.update_record(buffer_manager, rid, &data)?;
        Ok(())
    }

    /// Flush the table's indexes and data file
    pub fn sync(&mut self, buffer_manager: &mut BufferManager) -> TableResult<()> {
        for index in &mut self.indexes {
            index.file.sync(buffer_manager)?;
        }
        buffer_manager.flush_file(self.record_file.file())?;
        Ok(())
    }

    /// Build a single-attribute filter against this table's schema
    pub fn make_attr_filter(
        &self,
        field_name: &str,
        comp_op: CompOp,
        value: &Value,
    ) -> TableResult<crate::condition::AttrConditionFilter> {
        let field = self
            .meta
            .field(field_name)
            .filter(|f| f.visible)
            .ok_or_else(|| TableError::FieldNotFound(field_name.to_string()))?;
        if value.attr_type() != field.attr_type {
            return Err(TableError::SchemaMismatch(format!(
                "attribute {} is {:?}, got {:?}",
                field.name,
                field.attr_type,
                value.attr_type()
            )));
        }
        Ok(crate::condition::AttrConditionFilter::new(
            field.offset,
            field.length,
            field.attr_type,
            comp_op,
            value.encode(field.length)?,
        ))
    }
}
