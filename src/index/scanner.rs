use std::cmp::Ordering;

use crate::condition::CompOp;
use crate::file::{BufferManager, PageNum};
use crate::record::Rid;

use super::btree::IndexFile;
use super::error::{IndexError, IndexResult};
use super::node::IndexNode;

/// Comparator-based scan over an index.
///
/// `EqualTo`/`GreatEqual`/`GreatThan` position on the first leaf that may
/// satisfy the predicate; the other operators start at the leftmost leaf.
/// One leaf is held as an owned copy at a time and the walk follows
/// `next_brother`.
pub struct IndexScanner<'a> {
    index: &'a IndexFile,
    comp_op: CompOp,
    value: Vec<u8>,
    node: IndexNode,
    index_in_node: usize,
    finished: bool,
}

impl<'a> IndexScanner<'a> {
    pub fn open(
        index: &'a IndexFile,
        buffer_manager: &mut BufferManager,
        comp_op: CompOp,
        value: &[u8],
    ) -> IndexResult<Self> {
        if comp_op != CompOp::NoOp && value.len() != index.attr_length() {
            return Err(IndexError::InvalidArgument(format!(
                "scan value has {} bytes, index stores {}",
                value.len(),
                index.attr_length()
            )));
        }

        let start_page: PageNum = match comp_op {
            CompOp::EqualTo | CompOp::GreatEqual | CompOp::GreatThan => {
                index.find_leaf(buffer_manager, value)?
            }
            CompOp::LessEqual | CompOp::LessThan | CompOp::NotEqual | CompOp::NoOp => {
                index.first_leaf_page(buffer_manager)?
            }
        };

        let node = index.load_node(buffer_manager, start_page)?;
        Ok(Self {
            index,
            comp_op,
            value: value.to_vec(),
            node,
            index_in_node: 0,
            finished: false,
        })
    }

    /// Next RID satisfying the predicate, or `Eof`
    pub fn next_entry(&mut self, buffer_manager: &mut BufferManager) -> IndexResult<Rid> {
        loop {
            if self.finished {
                return Err(IndexError::Eof);
            }

            if self.index_in_node >= self.node.key_num() {
                if self.node.next_brother == -1 {
                    self.finished = true;
                    return Err(IndexError::Eof);
                }
                self.node = self
                    .index
                    .load_node(buffer_manager, self.node.next_brother)?;
                self.index_in_node = 0;
                continue;
            }

            let key = &self.node.keys[self.index_in_node];
            let ordering = if self.comp_op == CompOp::NoOp {
                Ordering::Equal
            } else {
                self.index.compare_key(key, &self.value)
            };

            let satisfied = match self.comp_op {
                CompOp::NoOp => true,
                op => op.accepts(ordering),
            };

            if satisfied {
                let rid = self.node.rids[self.index_in_node];
                self.index_in_node += 1;
                return Ok(rid);
            }

            // Keys arrive in ascending order, so a key past the bound ends
            // the scan for the bounded operators.
            let past_bound = match self.comp_op {
                CompOp::EqualTo | CompOp::LessEqual => ordering == Ordering::Greater,
                CompOp::LessThan => ordering != Ordering::Less,
                _ => false,
            };
            if past_bound {
                self.finished = true;
                return Err(IndexError::Eof);
            }

            self.index_in_node += 1;
        }
    }
}
