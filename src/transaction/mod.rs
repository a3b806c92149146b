use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};

use thiserror::Error;

use crate::record::Rid;

/// Low 31 bits of the stamp carry the transaction id
const TRANSACTION_ID_BIT_MASK: u32 = 0x7FFF_FFFF;
/// Bit 31 of the stamp is the deletion flag
const DELETED_FLAG_BIT_MASK: u32 = 0x8000_0000;

/// Process-wide monotonic transaction id source. Stamp 0 always means
/// "committed", so ids start at 1.
static NEXT_TRANSACTION_ID: AtomicI32 = AtomicI32::new(1);

fn next_transaction_id() -> i32 {
    NEXT_TRANSACTION_ID.fetch_add(1, Ordering::Relaxed)
}

#[derive(Debug, Error)]
pub enum TransactionError {
    #[error("Operation already recorded for {table}:{rid:?}")]
    DuplicateOperation { table: String, rid: Rid },
}

pub type TransactionResult<T> = Result<T, TransactionError>;

/// Intent recorded against one record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationType {
    Insert,
    Delete,
}

/// What the table layer must do after registering a delete
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    /// The delete cancelled this transaction's own pending insert; the
    /// record never becomes visible and is removed physically right away.
    CancelledPendingInsert,
    /// Stamp the record deleted and wait for commit to remove it.
    MarkDeleted,
}

/// In-memory transaction: per-table insert/delete intents keyed by RID.
///
/// A transaction is inactive (id 0) until its first write; commit and
/// rollback drain the operation set and reset the id. Visibility is a pure
/// function of the on-record stamp and this transaction's id.
#[derive(Debug, Default)]
pub struct Transaction {
    transaction_id: i32,
    operations: HashMap<String, HashMap<Rid, OperationType>>,
}

impl Transaction {
    pub fn new() -> Self {
        Self {
            transaction_id: 0,
            operations: HashMap::new(),
        }
    }

    pub fn id(&self) -> i32 {
        self.transaction_id
    }

    pub fn is_active(&self) -> bool {
        self.transaction_id != 0
    }

    pub fn start_if_not_started(&mut self) {
        if self.transaction_id == 0 {
            self.transaction_id = next_transaction_id();
        }
    }

    /// Pack a stamp from id and deletion flag
    pub fn make_stamp(transaction_id: i32, deleted: bool) -> i32 {
        let mut stamp = transaction_id as u32 & TRANSACTION_ID_BIT_MASK;
        if deleted {
            stamp |= DELETED_FLAG_BIT_MASK;
        }
        stamp as i32
    }

    /// Unpack a stamp into (transaction id, deleted)
    pub fn unpack_stamp(stamp: i32) -> (i32, bool) {
        let raw = stamp as u32;
        (
            (raw & TRANSACTION_ID_BIT_MASK) as i32,
            (raw & DELETED_FLAG_BIT_MASK) != 0,
        )
    }

    /// Visibility of a record stamp from this transaction's point of view.
    ///
    /// Own writes and committed records are visible unless delete-flagged.
    /// Another transaction's uncommitted insert is hidden, and its
    /// uncommitted delete leaves the record visible, which is why the
    /// other-transaction branch returns the flag itself.
    pub fn is_visible(&self, stamp: i32) -> bool {
        let (stamp_id, deleted) = Self::unpack_stamp(stamp);
        if stamp_id == 0 || stamp_id == self.transaction_id {
            return !deleted;
        }
        deleted
    }

    /// Register an insert intent. The record was already stamped by the
    /// caller via `stamp_for_insert`.
    pub fn insert_record(&mut self, table: &str, rid: Rid) -> TransactionResult<()> {
        if self.find_operation(table, rid).is_some() {
            return Err(TransactionError::DuplicateOperation {
                table: table.to_string(),
                rid,
            });
        }
        self.start_if_not_started();
        self.operations
            .entry(table.to_string())
            .or_default()
            .insert(rid, OperationType::Insert);
        Ok(())
    }

    /// Register a delete intent, cancelling a same-transaction pending
    /// insert when one exists.
    pub fn delete_record(&mut self, table: &str, rid: Rid) -> TransactionResult<DeleteOutcome> {
        self.start_if_not_started();
        match self.find_operation(table, rid) {
            Some(OperationType::Insert) => {
                self.remove_operation(table, rid);
                Ok(DeleteOutcome::CancelledPendingInsert)
            }
            Some(OperationType::Delete) => Err(TransactionError::DuplicateOperation {
                table: table.to_string(),
                rid,
            }),
            None => {
                self.operations
                    .entry(table.to_string())
                    .or_default()
                    .insert(rid, OperationType::Delete);
                Ok(DeleteOutcome::MarkDeleted)
            }
        }
    }

    /// Stamp value for a record this transaction is inserting; starts the
    /// transaction so the record never carries a committed stamp early.
    pub fn stamp_for_insert(&mut self) -> i32 {
        self.start_if_not_started();
        Self::make_stamp(self.transaction_id, false)
    }

    /// Stamp value marking a record deleted by this transaction
    pub fn stamp_for_delete(&self) -> i32 {
        Self::make_stamp(self.transaction_id, true)
    }

    pub fn find_operation(&self, table: &str, rid: Rid) -> Option<OperationType> {
        self.operations.get(table).and_then(|ops| ops.get(&rid)).copied()
    }

    fn remove_operation(&mut self, table: &str, rid: Rid) {
        if let Some(ops) = self.operations.get_mut(table) {
            ops.remove(&rid);
        }
    }

    /// Drain the operation set and deactivate; the database layer replays
    /// the drained operations through the table commit/rollback entry points.
    pub fn take_operations(&mut self) -> HashMap<String, HashMap<Rid, OperationType>> {
        self.transaction_id = 0;
        std::mem::take(&mut self.operations)
    }

    pub fn operation_count(&self) -> usize {
        self.operations.values().map(|ops| ops.len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stamp_round_trip() {
        let stamp = Transaction::make_stamp(12345, false);
        assert_eq!(Transaction::unpack_stamp(stamp), (12345, false));

        let stamp = Transaction::make_stamp(12345, true);
        assert_eq!(Transaction::unpack_stamp(stamp), (12345, true));
        assert!(stamp < 0);
    }

    #[test]
    fn test_lazy_start() {
        let mut t = Transaction::new();
        assert!(!t.is_active());

        t.insert_record("t", Rid::new(1, 0)).unwrap();
        assert!(t.is_active());
        assert!(t.id() > 0);
    }

    #[test]
    fn test_monotonic_ids() {
        let mut a = Transaction::new();
        let mut b = Transaction::new();
        a.start_if_not_started();
        b.start_if_not_started();
        assert_ne!(a.id(), b.id());
    }

    #[test]
    fn test_duplicate_insert_rejected() {
        let mut t = Transaction::new();
        let rid = Rid::new(1, 0);
        t.insert_record("t", rid).unwrap();
        assert!(t.insert_record("t", rid).is_err());
        // Same rid in another table is a distinct operation
        t.insert_record("other", rid).unwrap();
    }

    #[test]
    fn test_delete_cancels_pending_insert() {
        let mut t = Transaction::new();
        let rid = Rid::new(1, 0);
        t.insert_record("t", rid).unwrap();

        let outcome = t.delete_record("t", rid).unwrap();
        assert_eq!(outcome, DeleteOutcome::CancelledPendingInsert);
        assert_eq!(t.operation_count(), 0);
    }

    #[test]
    fn test_delete_registers_intent() {
        let mut t = Transaction::new();
        let rid = Rid::new(1, 0);

        let outcome = t.delete_record("t", rid).unwrap();
        assert_eq!(outcome, DeleteOutcome::MarkDeleted);
        assert_eq!(t.find_operation("t", rid), Some(OperationType::Delete));

        assert!(t.delete_record("t", rid).is_err());
    }

    #[test]
    fn test_visibility_rules() {
        let mut t1 = Transaction::new();
        let mut t2 = Transaction::new();
        t1.start_if_not_started();
        t2.start_if_not_started();

        // Committed, live
        assert!(t1.is_visible(Transaction::make_stamp(0, false)));
        // Committed, deleted flag (transient rollback state)
        assert!(!t1.is_visible(Transaction::make_stamp(0, true)));

        // T1's own uncommitted insert: visible to T1, hidden from T2
        let own_insert = Transaction::make_stamp(t1.id(), false);
        assert!(t1.is_visible(own_insert));
        assert!(!t2.is_visible(own_insert));

        // T1's uncommitted delete: hidden from T1, still visible to T2
        let own_delete = Transaction::make_stamp(t1.id(), true);
        assert!(!t1.is_visible(own_delete));
        assert!(t2.is_visible(own_delete));
    }

    #[test]
    fn test_take_operations_resets() {
        let mut t = Transaction::new();
        t.insert_record("t", Rid::new(1, 0)).unwrap();
        t.delete_record("t", Rid::new(1, 1)).unwrap();

        let ops = t.take_operations();
        assert_eq!(ops.get("t").map(|m| m.len()), Some(2));
        assert!(!t.is_active());
        assert_eq!(t.operation_count(), 0);
    }
}
