
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};

use thiserror::Error;

use crate::condition::ConditionFilter;
use crate::file::BufferManager;
use crate::record::{Record, Rid, Value};
use crate::table::{AttrInfo, Table, TableError, TableResult};
use crate::transaction::{OperationType, Transaction};

#[derive(Debug, Error)]
pub enum DatabaseError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Database {0} already exists")]
    DatabaseExists(String),

    #[error("Database {0} does not exist")]
    DatabaseNotExist(String),

    #[error("Database {0} is not opened")]
    DatabaseNotOpened(String),

    #[error("Table {0} already exists")]
    TableExists(String),

    #[error("Table {0} does not exist")]
    TableNotExist(String),

    #[error("Table error: {0}")]
    Table(#[from] TableError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("File error: {0}")]
    File(#[from] crate::file::FileError),
}

pub type DatabaseResult<T> = Result<T, DatabaseError>;

/// One open database: its directory, its buffer manager and its tables
pub struct Database {
    name: String,
    path: PathBuf,
    buffer_manager: BufferManager,
    tables: HashMap<String, Table>,
}

impl Database {
    /// Open a database directory, enumerating and opening every table whose
    /// `<name>.table` metadata is present
    pub fn open(name: &str, path: &Path) -> DatabaseResult<Database> {
        let mut buffer_manager = BufferManager::new();
        let mut tables = HashMap::new();

        for entry in fs::read_dir(path)? {
            let entry = entry?;
            let file_name = entry.file_name();
            let file_name = file_name.to_string_lossy();
            if let Some(table_name) = file_name.strip_suffix(".table") {
                let table = Table::open(&mut buffer_manager, path, table_name)?;
                tables.insert(table_name.to_string(), table);
            }
        }

        Ok(Database {
            name: name.to_string(),
            path: path.to_path_buf(),
            buffer_manager,
            tables,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn table_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.tables.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn create_table(&mut self, name: &str, attributes: &[AttrInfo]) -> DatabaseResult<()> {
        if self.tables.contains_key(name) {
            return Err(DatabaseError::TableExists(name.to_string()));
        }
        let table = Table::create(&mut self.buffer_manager, &self.path, name, attributes)?;
        self.tables.insert(name.to_string(), table);
        Ok(())
    }

    fn table_parts(&mut self, name: &str) -> DatabaseResult<(&mut Table, &mut BufferManager)> {
        let table = self
            .tables
            .get_mut(name)
            .ok_or_else(|| DatabaseError::TableNotExist(name.to_string()))?;
        Ok((table, &mut self.buffer_manager))
    }

    pub fn table(&self, name: &str) -> DatabaseResult<&Table> {
        self.tables
            .get(name)
            .ok_or_else(|| DatabaseError::TableNotExist(name.to_string()))
    }

    pub fn insert_record(
        &mut self,
        transaction: &mut Transaction,
        table_name: &str,
        values: &[Value],
    ) -> DatabaseResult<Rid> {
        let (table, buffer_manager) = self.table_parts(table_name)?;
        Ok(table.insert_record(buffer_manager, transaction, values)?)
    }

    pub fn delete_record(
        &mut self,
        transaction: &mut Transaction,
        table_name: &str,
        filter: Option<&dyn ConditionFilter>,
    ) -> DatabaseResult<usize> {
        let (table, buffer_manager) = self.table_parts(table_name)?;
        Ok(table.delete_record(buffer_manager, transaction, filter)?)
    }

    pub fn update_record(
        &mut self,
        transaction: &Transaction,
        table_name: &str,
        field_name: &str,
        value: &Value,
        filter: Option<&dyn ConditionFilter>,
    ) -> DatabaseResult<usize> {
        let (table, buffer_manager) = self.table_parts(table_name)?;
        Ok(table.update_record(buffer_manager, transaction, field_name, value, filter)?)
    }

    pub fn scan_record<F>(
        &mut self,
        transaction: &Transaction,
        table_name: &str,
        filter: Option<&dyn ConditionFilter>,
        limit: i64,
        reader: &mut F,
    ) -> DatabaseResult<usize>
    where
        F: FnMut(&Record) -> TableResult<()>,
    {
        let (table, buffer_manager) = self.table_parts(table_name)?;
        Ok(table.scan_record(buffer_manager, transaction, filter, limit, reader)?)
    }

    pub fn collect_records(
        &mut self,
        transaction: &Transaction,
        table_name: &str,
        filter: Option<&dyn ConditionFilter>,
        limit: i64,
    ) -> DatabaseResult<Vec<Record>> {
        let (table, buffer_manager) = self.table_parts(table_name)?;
        Ok(table.collect_records(buffer_manager, transaction, filter, limit)?)
    }

    pub fn create_index(
        &mut self,
        transaction: &Transaction,
        table_name: &str,
        index_name: &str,
        field_name: &str,
    ) -> DatabaseResult<()> {
        let (table, buffer_manager) = self.table_parts(table_name)?;
        Ok(table.create_index(buffer_manager, transaction, index_name, field_name)?)
    }

    /// Replay the transaction's recorded intents through the tables'
    /// commit entry points, then deactivate it
    pub fn commit_transaction(&mut self, transaction: &mut Transaction) -> DatabaseResult<()> {
        for (table_name, operations) in transaction.take_operations() {
            let (table, buffer_manager) = self.table_parts(&table_name)?;
            for (rid, operation) in operations {
                match operation {
                    OperationType::Insert => table.commit_insert(buffer_manager, rid)?,
                    OperationType::Delete => table.commit_delete(buffer_manager, rid)?,
                }
            }
        }
        Ok(())
    }

    /// Undo the transaction's recorded intents, then deactivate it
    pub fn rollback_transaction(&mut self, transaction: &mut Transaction) -> DatabaseResult<()> {
        for (table_name, operations) in transaction.take_operations() {
            let (table, buffer_manager) = self.table_parts(&table_name)?;
            for (rid, operation) in operations {
                match operation {
                    OperationType::Insert => table.rollback_insert(buffer_manager, rid)?,
                    OperationType::Delete => table.rollback_delete(buffer_manager, rid)?,
                }
            }
        }
        Ok(())
    }

    /// Flush every table and the whole buffer pool
    pub fn sync(&mut self) -> DatabaseResult<()> {
        for table in self.tables.values_mut() {
            table.sync(&mut self.buffer_manager)?;
        }
        self.buffer_manager.flush_all()?;
        Ok(())
    }
}

/// Top-level handler: owns `<base_dir>/db` with one subdirectory per
/// database, opens databases lazily, and routes table operations.
pub struct DatabaseManager {
    db_dir: PathBuf,
    opened_dbs: HashMap<String, Database>,
}

impl DatabaseManager {
    /// Validate and create the handler root `<base_dir>/db`
    pub fn init<P: AsRef<Path>>(base_dir: P) -> DatabaseResult<DatabaseManager> {
        let db_dir = base_dir.as_ref().join("db");
        fs::create_dir_all(&db_dir)?;
        Ok(DatabaseManager {
            db_dir,
            opened_dbs: HashMap::new(),
        })
    }

    pub fn create_db(&mut self, name: &str) -> DatabaseResult<()> {
        if name.trim().is_empty() {
            return Err(DatabaseError::InvalidArgument(
                "database name must not be blank".to_string(),
            ));
        }
        let path = self.db_dir.join(name);
        if path.is_dir() {
            return Err(DatabaseError::DatabaseExists(name.to_string()));
        }
        fs::create_dir_all(&path)?;
        Ok(())
    }

    /// Open a database lazily; reopening an open database is a no-op
    pub fn open_db(&mut self, name: &str) -> DatabaseResult<()> {
        if name.trim().is_empty() {
            return Err(DatabaseError::InvalidArgument(
                "database name must not be blank".to_string(),
            ));
        }
        if self.opened_dbs.contains_key(name) {
            return Ok(());
        }
        let path = self.db_dir.join(name);
        if !path.is_dir() {
            return Err(DatabaseError::DatabaseNotExist(name.to_string()));
        }
        let db = Database::open(name, &path)?;
        self.opened_dbs.insert(name.to_string(), db);
        Ok(())
    }

    pub fn db(&mut self, name: &str) -> DatabaseResult<&mut Database> {
        self.opened_dbs
            .get_mut(name)
            .ok_or_else(|| DatabaseError::DatabaseNotOpened(name.to_string()))
    }

    pub fn create_table(
        &mut self,
        db_name: &str,
        table_name: &str,
        attributes: &[AttrInfo],
    ) -> DatabaseResult<()> {
        self.db(db_name)?.create_table(table_name, attributes)
    }

    pub fn create_index(
        &mut self,
        transaction: &Transaction,
        db_name: &str,
        table_name: &str,
        index_name: &str,
        field_name: &str,
    ) -> DatabaseResult<()> {
        self.db(db_name)?
            .create_index(transaction, table_name, index_name, field_name)
    }

    pub fn insert_record(
        &mut self,
        transaction: &mut Transaction,
        db_name: &str,
        table_name: &str,
        values: &[Value],
    ) -> DatabaseResult<Rid> {
        self.db(db_name)?
            .insert_record(transaction, table_name, values)
    }

    pub fn delete_record(
        &mut self,
        transaction: &mut Transaction,
        db_name: &str,
        table_name: &str,
        filter: Option<&dyn ConditionFilter>,
    ) -> DatabaseResult<usize> {
        self.db(db_name)?
            .delete_record(transaction, table_name, filter)
    }

    pub fn update_record(
        &mut self,
        transaction: &Transaction,
        db_name: &str,
        table_name: &str,
        field_name: &str,
        value: &Value,
        filter: Option<&dyn ConditionFilter>,
    ) -> DatabaseResult<usize> {
        self.db(db_name)?
            .update_record(transaction, table_name, field_name, value, filter)
    }

    /// Flush every open database
    pub fn sync(&mut self) -> DatabaseResult<()> {
        for db in self.opened_dbs.values_mut() {
            db.sync()?;
        }
        Ok(())
    }
}

impl Drop for DatabaseManager {
    fn drop(&mut self) {
        let _ = self.sync();
    }
}
