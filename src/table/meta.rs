use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::record::AttrType;

use super::error::{TableError, TableResult};

/// Name of the hidden leading transaction-stamp field
pub const TRANSACTION_FIELD_NAME: &str = "__trx";

/// Attribute description supplied at table creation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttrInfo {
    pub name: String,
    pub attr_type: AttrType,
    pub length: usize,
}

impl AttrInfo {
    pub fn new(name: &str, attr_type: AttrType, length: usize) -> Self {
        Self {
            name: name.to_string(),
            attr_type,
            length,
        }
    }
}

/// One field of the record layout
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldMeta {
    pub name: String,
    pub attr_type: AttrType,
    pub length: usize,
    pub offset: usize,
    /// Hidden system fields carry `visible = false`
    pub visible: bool,
}

/// One secondary index over a single field
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IndexMeta {
    pub name: String,
    pub field: String,
}

/// Table metadata: field layout (transaction stamp first, then user
/// attributes in declaration order) and the index list. Persisted as JSON in
/// `<table>.table`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableMeta {
    name: String,
    fields: Vec<FieldMeta>,
    indexes: Vec<IndexMeta>,
    record_size: usize,
}

impl TableMeta {
    pub fn new(name: &str, attributes: &[AttrInfo]) -> TableResult<Self> {
        if name.trim().is_empty() {
            return Err(TableError::InvalidArgument(
                "table name must not be blank".to_string(),
            ));
        }
        if attributes.is_empty() {
            return Err(TableError::InvalidArgument(format!(
                "table {} needs at least one attribute",
                name
            )));
        }

        let mut fields = Vec::with_capacity(attributes.len() + 1);
        let mut offset = 0;

        // Reserved leading stamp field; the storage layer never interprets it
        fields.push(FieldMeta {
            name: TRANSACTION_FIELD_NAME.to_string(),
            attr_type: AttrType::Ints,
            length: 4,
            offset,
            visible: false,
        });
        offset += 4;

        for attr in attributes {
            if attr.name.trim().is_empty() {
                return Err(TableError::InvalidArgument(
                    "attribute name must not be blank".to_string(),
                ));
            }
            if attr.name == TRANSACTION_FIELD_NAME {
                return Err(TableError::InvalidArgument(format!(
                    "attribute name {} is reserved",
                    attr.name
                )));
            }
            if fields.iter().any(|f| f.name == attr.name) {
                return Err(TableError::InvalidArgument(format!(
                    "duplicate attribute name {}",
                    attr.name
                )));
            }
            let length = match attr.attr_type.fixed_length() {
                Some(fixed) => {
                    if attr.length != fixed {
                        return Err(TableError::InvalidArgument(format!(
                            "attribute {} of type {:?} must have length {}",
                            attr.name, attr.attr_type, fixed
                        )));
                    }
                    fixed
                }
                None => {
                    if attr.length == 0 {
                        return Err(TableError::InvalidArgument(format!(
                            "attribute {} must have a positive length",
                            attr.name
                        )));
                    }
                    attr.length
                }
            };

            fields.push(FieldMeta {
                name: attr.name.clone(),
                attr_type: attr.attr_type,
                length,
                offset,
                visible: true,
            });
            offset += length;
        }

        Ok(Self {
            name: name.to_string(),
            fields,
            indexes: Vec::new(),
            record_size: offset,
        })
    }

    pub fn load<P: AsRef<Path>>(path: P) -> TableResult<Self> {
        let content = fs::read_to_string(path)?;
        let meta = serde_json::from_str(&content)?;
        Ok(meta)
    }

    pub fn save<P: AsRef<Path>>(&self, path: P) -> TableResult<()> {
        let content = serde_json::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn record_size(&self) -> usize {
        self.record_size
    }

    pub fn fields(&self) -> &[FieldMeta] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldMeta> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn visible_fields(&self) -> impl Iterator<Item = &FieldMeta> {
        self.fields.iter().filter(|f| f.visible)
    }

    pub fn visible_field_count(&self) -> usize {
        self.fields.iter().filter(|f| f.visible).count()
    }

    pub fn transaction_field(&self) -> &FieldMeta {
        // Always present: constructed first in new(), serialized with the rest
        &self.fields[0]
    }

    pub fn indexes(&self) -> &[IndexMeta] {
        &self.indexes
    }

    pub fn index(&self, name: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.name == name)
    }

    pub fn index_on_field(&self, field: &str) -> Option<&IndexMeta> {
        self.indexes.iter().find(|i| i.field == field)
    }

    pub fn add_index(&mut self, index: IndexMeta) {
        self.indexes.push(index);
    }
}
