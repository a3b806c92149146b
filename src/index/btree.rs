use std::cmp::Ordering;
use std::path::Path;

use crate::file::{BufferManager, FileHandle, PageNum};
use crate::record::{AttrType, Rid};

use crate::file::PAGE_SIZE;

use super::error::{IndexError, IndexResult};
use super::node::{IndexFileHeader, IndexNode, NODE_HEADER_SIZE, NODE_RESERVE_SLOTS, RID_SLOT_SIZE};

/// Disk-resident B+-tree mapping `(key, rid)` pairs to records.
///
/// Page 0 holds the file header, page 1 the initial root leaf. Every node
/// occupies one page; parent and sibling links are page numbers, re-resolved
/// through the buffer manager on every visit, and nodes are manipulated as
/// owned values so at most one frame is borrowed at a time.
pub struct IndexFile {
    file: FileHandle,
    header: IndexFileHeader,
    header_dirty: bool,
}

impl IndexFile {
    /// Create an index file: header on page 0, an empty leaf root on page 1
    pub fn create<P: AsRef<Path>>(
        buffer_manager: &mut BufferManager,
        path: P,
        attr_type: AttrType,
        attr_length: usize,
    ) -> IndexResult<Self> {
        if let Some(fixed) = attr_type.fixed_length() {
            if attr_length != fixed {
                return Err(IndexError::InvalidArgument(format!(
                    "attribute type {:?} has length {}, got {}",
                    attr_type, fixed, attr_length
                )));
            }
        }
        if attr_length == 0 {
            return Err(IndexError::InvalidArgument(
                "attribute length must be positive".to_string(),
            ));
        }
        let order = IndexFileHeader::compute_order(attr_length);
        let slots = order as usize + NODE_RESERVE_SLOTS;
        if NODE_HEADER_SIZE + slots * attr_length + (slots + 1) * RID_SLOT_SIZE > PAGE_SIZE {
            return Err(IndexError::InvalidArgument(format!(
                "attribute of {} bytes cannot be indexed in one page",
                attr_length
            )));
        }

        buffer_manager.create_file(&path)?;
        let file = buffer_manager.open_file(&path)?;

        let header_page = buffer_manager.allocate_page(file)?;
        debug_assert_eq!(header_page, 0);
        let root_page = buffer_manager.allocate_page(file)?;
        debug_assert_eq!(root_page, 1);

        let header = IndexFileHeader {
            attr_length: attr_length as i32,
            key_length: attr_length as i32,
            attr_type,
            root_page,
            order,
        };

        let buffer = buffer_manager.get_page_mut(file, header_page)?;
        buffer.fill(0);
        buffer[..IndexFileHeader::SIZE].copy_from_slice(&header.serialize());

        let tree = Self {
            file,
            header,
            header_dirty: false,
        };
        tree.store_node(buffer_manager, root_page, &IndexNode::new_leaf())?;

        Ok(tree)
    }

    /// Open an existing index file
    pub fn open<P: AsRef<Path>>(buffer_manager: &mut BufferManager, path: P) -> IndexResult<Self> {
        let file = buffer_manager.open_file(path)?;
        let buffer = buffer_manager.get_page(file, 0)?;
        let header = IndexFileHeader::deserialize(&buffer[..IndexFileHeader::SIZE])?;
        Ok(Self {
            file,
            header,
            header_dirty: false,
        })
    }

    pub fn file(&self) -> FileHandle {
        self.file
    }

    pub fn attr_type(&self) -> AttrType {
        self.header.attr_type
    }

    pub fn attr_length(&self) -> usize {
        self.header.attr_length as usize
    }

    pub fn order(&self) -> i32 {
        self.header.order
    }

    /// Write the header back if changed and flush the file
    pub fn sync(&mut self, buffer_manager: &mut BufferManager) -> IndexResult<()> {
        if self.header_dirty {
            let buffer = buffer_manager.get_page_mut(self.file, 0)?;
            buffer[..IndexFileHeader::SIZE].copy_from_slice(&self.header.serialize());
            self.header_dirty = false;
        }
        buffer_manager.flush_file(self.file)?;
        Ok(())
    }

    pub(super) fn load_node(
        &self,
        buffer_manager: &mut BufferManager,
        page_num: PageNum,
    ) -> IndexResult<IndexNode> {
        let buffer = buffer_manager.get_page(self.file, page_num)?;
        IndexNode::decode(buffer, &self.header)
    }

    fn store_node(
        &self,
        buffer_manager: &mut BufferManager,
        page_num: PageNum,
        node: &IndexNode,
    ) -> IndexResult<()> {
        let buffer = buffer_manager.get_page_mut(self.file, page_num)?;
        node.encode(buffer, &self.header)
    }

    pub(super) fn compare_key(&self, a: &[u8], b: &[u8]) -> Ordering {
        self.header
            .attr_type
            .compare(a, b, self.header.attr_length as usize)
    }

    fn check_key(&self, key: &[u8]) -> IndexResult<()> {
        if key.len() != self.header.key_length as usize {
            return Err(IndexError::InvalidArgument(format!(
                "key has {} bytes, index stores {}",
                key.len(),
                self.header.key_length
            )));
        }
        Ok(())
    }

    fn child_index(parent: &IndexNode, child_page: PageNum) -> IndexResult<usize> {
        parent
            .rids
            .iter()
            .position(|rid| rid.page_num == child_page)
            .ok_or_else(|| {
                IndexError::Corrupted(format!(
                    "page {} missing from its parent's children",
                    child_page
                ))
            })
    }

    fn min_keys(&self, node: &IndexNode) -> usize {
        let half = (self.header.order / 2) as usize;
        if node.is_leaf {
            half
        } else {
            half.saturating_sub(1)
        }
    }

    /// Descend to the leaf where `key` first may reside. An equal separator
    /// routes left, so duplicates spanning a split stay reachable.
    pub(super) fn find_leaf(
        &self,
        buffer_manager: &mut BufferManager,
        key: &[u8],
    ) -> IndexResult<PageNum> {
        let mut page_num = self.header.root_page;
        loop {
            let node = self.load_node(buffer_manager, page_num)?;
            if node.is_leaf {
                return Ok(page_num);
            }
            let mut child = node.keys.len();
            for (i, separator) in node.keys.iter().enumerate() {
                if self.compare_key(separator, key) != Ordering::Less {
                    child = i;
                    break;
                }
            }
            page_num = node.rids[child].page_num;
        }
    }

    /// Leftmost leaf of the tree
    pub(super) fn first_leaf_page(
        &self,
        buffer_manager: &mut BufferManager,
    ) -> IndexResult<PageNum> {
        let mut page_num = self.header.root_page;
        loop {
            let node = self.load_node(buffer_manager, page_num)?;
            if node.is_leaf {
                return Ok(page_num);
            }
            page_num = node.rids[0].page_num;
        }
    }

    /// Insert one `(key, rid)` pair
    pub fn insert_entry(
        &mut self,
        buffer_manager: &mut BufferManager,
        key: &[u8],
        rid: Rid,
    ) -> IndexResult<()> {
        self.check_key(key)?;
        if rid.is_empty() {
            return Err(IndexError::InvalidArgument(format!(
                "cannot index the empty rid {:?}",
                rid
            )));
        }

        let leaf_page = self.find_leaf(buffer_manager, key)?;
        let mut node = self.load_node(buffer_manager, leaf_page)?;

        let mut position = node.keys.len();
        for i in 0..node.keys.len() {
            match self.compare_key(&node.keys[i], key) {
                Ordering::Less => {}
                Ordering::Greater => {
                    position = i;
                    break;
                }
                Ordering::Equal => match node.rids[i].cmp(&rid) {
                    Ordering::Less => {}
                    Ordering::Greater => {
                        position = i;
                        break;
                    }
                    Ordering::Equal => {
                        return Err(IndexError::InvalidArgument(format!(
                            "entry already present for rid {:?}",
                            rid
                        )))
                    }
                },
            }
        }

        node.keys.insert(position, key.to_vec());
        node.rids.insert(position, rid);

        // A new minimum must be reflected in the first ancestor where this
        // subtree is not the leftmost child.
        if position == 0 && node.parent != -1 {
            self.propagate_min_key(buffer_manager, leaf_page, node.parent, key)?;
        }

        if node.keys.len() <= self.header.order as usize {
            self.store_node(buffer_manager, leaf_page, &node)
        } else {
            self.split_leaf(buffer_manager, leaf_page, node)
        }
    }

    fn propagate_min_key(
        &mut self,
        buffer_manager: &mut BufferManager,
        mut child_page: PageNum,
        mut parent_page: PageNum,
        key: &[u8],
    ) -> IndexResult<()> {
        while parent_page != -1 {
            let mut parent = self.load_node(buffer_manager, parent_page)?;
            let index = Self::child_index(&parent, child_page)?;
            if index > 0 {
                parent.keys[index - 1] = key.to_vec();
                self.store_node(buffer_manager, parent_page, &parent)?;
                break;
            }
            child_page = parent_page;
            parent_page = parent.parent;
        }
        Ok(())
    }

    fn split_leaf(
        &mut self,
        buffer_manager: &mut BufferManager,
        left_page: PageNum,
        mut left: IndexNode,
    ) -> IndexResult<()> {
        let right_page = buffer_manager.allocate_page(self.file)?;

        let split = (left.keys.len() + 1) / 2;
        let right = IndexNode {
            is_leaf: true,
            parent: left.parent,
            prev_brother: left_page,
            next_brother: left.next_brother,
            keys: left.keys.split_off(split),
            rids: left.rids.split_off(split),
        };
        let old_next = left.next_brother;
        left.next_brother = right_page;
        let separator = right.keys[0].clone();

        self.store_node(buffer_manager, left_page, &left)?;
        self.store_node(buffer_manager, right_page, &right)?;

        if old_next != -1 {
            let mut next = self.load_node(buffer_manager, old_next)?;
            next.prev_brother = right_page;
            self.store_node(buffer_manager, old_next, &next)?;
        }

        self.insert_into_parent(buffer_manager, left_page, left.parent, separator, right_page)
    }

    fn insert_into_parent(
        &mut self,
        buffer_manager: &mut BufferManager,
        left_page: PageNum,
        parent_page: PageNum,
        separator: Vec<u8>,
        right_page: PageNum,
    ) -> IndexResult<()> {
        if parent_page == -1 {
            // The split reached the root; grow the tree by one level
            let new_root_page = buffer_manager.allocate_page(self.file)?;
            let root = IndexNode {
                is_leaf: false,
                parent: -1,
                prev_brother: -1,
                next_brother: -1,
                keys: vec![separator],
                rids: vec![Rid::new(left_page, -1), Rid::new(right_page, -1)],
            };
            self.store_node(buffer_manager, new_root_page, &root)?;
            for child_page in [left_page, right_page] {
                let mut child = self.load_node(buffer_manager, child_page)?;
                child.parent = new_root_page;
                self.store_node(buffer_manager, child_page, &child)?;
            }
            self.header.root_page = new_root_page;
            self.header_dirty = true;
            return Ok(());
        }

        let mut parent = self.load_node(buffer_manager, parent_page)?;
        let index = Self::child_index(&parent, left_page)?;
        parent.keys.insert(index, separator);
        parent.rids.insert(index + 1, Rid::new(right_page, -1));

        if parent.keys.len() <= self.header.order as usize - 1 {
            self.store_node(buffer_manager, parent_page, &parent)
        } else {
            self.split_internal(buffer_manager, parent_page, parent)
        }
    }

    fn split_internal(
        &mut self,
        buffer_manager: &mut BufferManager,
        left_page: PageNum,
        mut left: IndexNode,
    ) -> IndexResult<()> {
        let right_page = buffer_manager.allocate_page(self.file)?;

        // The median separator is promoted, not stored in either half
        let middle = left.keys.len() / 2;
        let promoted = left.keys[middle].clone();
        let right_keys = left.keys.split_off(middle + 1);
        left.keys.truncate(middle);
        let right_rids = left.rids.split_off(middle + 1);

        let right = IndexNode {
            is_leaf: false,
            parent: left.parent,
            prev_brother: -1,
            next_brother: -1,
            keys: right_keys,
            rids: right_rids,
        };

        self.store_node(buffer_manager, left_page, &left)?;
        self.store_node(buffer_manager, right_page, &right)?;

        for child_rid in &right.rids {
            let mut child = self.load_node(buffer_manager, child_rid.page_num)?;
            child.parent = right_page;
            self.store_node(buffer_manager, child_rid.page_num, &child)?;
        }

        self.insert_into_parent(buffer_manager, left_page, left.parent, promoted, right_page)
    }

    /// Collect every RID stored under `key`, crossing leaf boundaries
    pub fn get_entry(
        &self,
        buffer_manager: &mut BufferManager,
        key: &[u8],
    ) -> IndexResult<Vec<Rid>> {
        self.check_key(key)?;

        let mut page_num = self.find_leaf(buffer_manager, key)?;
        let mut rids = Vec::new();
        loop {
            let node = self.load_node(buffer_manager, page_num)?;
            for i in 0..node.keys.len() {
                match self.compare_key(&node.keys[i], key) {
                    Ordering::Less => {}
                    Ordering::Equal => rids.push(node.rids[i]),
                    Ordering::Greater => return Ok(rids),
                }
            }
            if node.next_brother == -1 {
                return Ok(rids);
            }
            page_num = node.next_brother;
        }
    }

    /// Remove one exact `(key, rid)` pair; `InvalidKey` when absent
    pub fn delete_entry(
        &mut self,
        buffer_manager: &mut BufferManager,
        key: &[u8],
        rid: Rid,
    ) -> IndexResult<()> {
        self.check_key(key)?;

        let mut page_num = self.find_leaf(buffer_manager, key)?;
        let (found_page, mut node, index) = loop {
            let node = self.load_node(buffer_manager, page_num)?;
            let mut found = None;
            for i in 0..node.keys.len() {
                match self.compare_key(&node.keys[i], key) {
                    Ordering::Less => {}
                    Ordering::Equal => {
                        if node.rids[i] == rid {
                            found = Some(i);
                            break;
                        }
                    }
                    Ordering::Greater => return Err(IndexError::InvalidKey),
                }
            }
            if let Some(i) = found {
                break (page_num, node, i);
            }
            if node.next_brother == -1 {
                return Err(IndexError::InvalidKey);
            }
            page_num = node.next_brother;
        };

        node.keys.remove(index);
        node.rids.remove(index);
        self.store_node(buffer_manager, found_page, &node)?;

        if index == 0 && !node.keys.is_empty() && node.parent != -1 {
            let new_min = node.keys[0].clone();
            self.propagate_min_key(buffer_manager, found_page, node.parent, &new_min)?;
        }

        self.rebalance(buffer_manager, found_page)
    }

    fn can_merge(&self, left: &IndexNode, right: &IndexNode) -> bool {
        let combined = left.keys.len() + right.keys.len();
        if left.is_leaf {
            combined <= self.header.order as usize
        } else {
            // The separator pulled down from the parent joins the merge
            combined + 1 <= self.header.order as usize - 1
        }
    }

    fn rebalance(&mut self, buffer_manager: &mut BufferManager, page_num: PageNum) -> IndexResult<()> {
        let mut node = self.load_node(buffer_manager, page_num)?;

        if page_num == self.header.root_page {
            // An internal root left with a single child shrinks the tree
            if !node.is_leaf && node.keys.is_empty() {
                let child_page = node.rids[0].page_num;
                let mut child = self.load_node(buffer_manager, child_page)?;
                child.parent = -1;
                self.store_node(buffer_manager, child_page, &child)?;
                self.header.root_page = child_page;
                self.header_dirty = true;
                buffer_manager.dispose_page(self.file, page_num)?;
            }
            return Ok(());
        }

        if node.keys.len() >= self.min_keys(&node) {
            return Ok(());
        }

        let parent_page = node.parent;
        let mut parent = self.load_node(buffer_manager, parent_page)?;
        let index = Self::child_index(&parent, page_num)?;

        // Redistribute from the right sibling first
        if index + 1 < parent.rids.len() {
            let right_page = parent.rids[index + 1].page_num;
            let mut right = self.load_node(buffer_manager, right_page)?;
            if right.keys.len() > self.min_keys(&right) {
                if node.is_leaf {
                    node.keys.push(right.keys.remove(0));
                    node.rids.push(right.rids.remove(0));
                    parent.keys[index] = right.keys[0].clone();
                } else {
                    node.keys.push(parent.keys[index].clone());
                    let moved = right.rids.remove(0);
                    node.rids.push(moved);
                    parent.keys[index] = right.keys.remove(0);
                    let mut child = self.load_node(buffer_manager, moved.page_num)?;
                    child.parent = page_num;
                    self.store_node(buffer_manager, moved.page_num, &child)?;
                }
                self.store_node(buffer_manager, page_num, &node)?;
                self.store_node(buffer_manager, right_page, &right)?;
                self.store_node(buffer_manager, parent_page, &parent)?;
                return Ok(());
            }
        }

        // Then from the left sibling
        if index > 0 {
            let left_page = parent.rids[index - 1].page_num;
            let mut left = self.load_node(buffer_manager, left_page)?;
            if left.keys.len() > self.min_keys(&left) {
                if node.is_leaf {
                    node.keys.insert(0, left.keys.pop().unwrap());
                    node.rids.insert(0, left.rids.pop().unwrap());
                    parent.keys[index - 1] = node.keys[0].clone();
                } else {
                    node.keys.insert(0, parent.keys[index - 1].clone());
                    let moved = left.rids.pop().unwrap();
                    node.rids.insert(0, moved);
                    parent.keys[index - 1] = left.keys.pop().unwrap();
                    let mut child = self.load_node(buffer_manager, moved.page_num)?;
                    child.parent = page_num;
                    self.store_node(buffer_manager, moved.page_num, &child)?;
                }
                self.store_node(buffer_manager, page_num, &node)?;
                self.store_node(buffer_manager, left_page, &left)?;
                self.store_node(buffer_manager, parent_page, &parent)?;
                return Ok(());
            }
        }

        // No sibling can lend; merge right-into-left
        if index + 1 < parent.rids.len() {
            let right_page = parent.rids[index + 1].page_num;
            let right = self.load_node(buffer_manager, right_page)?;
            self.merge_nodes(
                buffer_manager,
                page_num,
                node,
                right_page,
                right,
                parent_page,
                parent,
                index,
            )
        } else {
            let left_page = parent.rids[index - 1].page_num;
            let left = self.load_node(buffer_manager, left_page)?;
            self.merge_nodes(
                buffer_manager,
                left_page,
                left,
                page_num,
                node,
                parent_page,
                parent,
                index - 1,
            )
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn merge_nodes(
        &mut self,
        buffer_manager: &mut BufferManager,
        left_page: PageNum,
        mut left: IndexNode,
        right_page: PageNum,
        right: IndexNode,
        parent_page: PageNum,
        mut parent: IndexNode,
        separator_index: usize,
    ) -> IndexResult<()> {
        debug_assert!(self.can_merge(&left, &right));

        if left.is_leaf {
            left.keys.extend(right.keys);
            left.rids.extend(right.rids);
            left.next_brother = right.next_brother;
            if right.next_brother != -1 {
                let mut next = self.load_node(buffer_manager, right.next_brother)?;
                next.prev_brother = left_page;
                self.store_node(buffer_manager, right.next_brother, &next)?;
            }
        } else {
            left.keys.push(parent.keys[separator_index].clone());
            left.keys.extend(right.keys);
            for child_rid in &right.rids {
                let mut child = self.load_node(buffer_manager, child_rid.page_num)?;
                child.parent = left_page;
                self.store_node(buffer_manager, child_rid.page_num, &child)?;
            }
            left.rids.extend(right.rids);
        }

        parent.keys.remove(separator_index);
        parent.rids.remove(separator_index + 1);

        self.store_node(buffer_manager, left_page, &left)?;
        self.store_node(buffer_manager, parent_page, &parent)?;
        buffer_manager.dispose_page(self.file, right_page)?;

        self.rebalance(buffer_manager, parent_page)
    }

    /// Walk the whole tree checking structural invariants: per-node
    /// sortedness, fill bounds, parent pointers, separator/minimum agreement,
    /// uniform depth and the doubly-linked leaf chain.
    pub fn validate(&self, buffer_manager: &mut BufferManager) -> IndexResult<()> {
        let root_summary =
            self.validate_subtree(buffer_manager, self.header.root_page, -1, true)?;

        // Leaf chain must visit every leaf once, in ascending key order
        let mut page_num = self.first_leaf_page(buffer_manager)?;
        let mut prev_page = -1;
        let mut chain_leaves = 0usize;
        let mut chain_entries = 0usize;
        let mut last_key: Option<Vec<u8>> = None;
        loop {
            let node = self.load_node(buffer_manager, page_num)?;
            if !node.is_leaf {
                return Err(IndexError::Corrupted(format!(
                    "leaf chain reached internal page {}",
                    page_num
                )));
            }
            if node.prev_brother != prev_page {
                return Err(IndexError::Corrupted(format!(
                    "page {} has prev_brother {}, expected {}",
                    page_num, node.prev_brother, prev_page
                )));
            }
            if let (Some(last), Some(first)) = (&last_key, node.keys.first()) {
                if self.compare_key(last, first) == Ordering::Greater {
                    return Err(IndexError::Corrupted(format!(
                        "keys descend across leaf boundary into page {}",
                        page_num
                    )));
                }
            }
            chain_leaves += 1;
            chain_entries += node.keys.len();
            if let Some(last) = node.keys.last() {
                last_key = Some(last.clone());
            }
            if node.next_brother == -1 {
                break;
            }
            prev_page = page_num;
            page_num = node.next_brother;
        }

        if chain_leaves != root_summary.leaf_count || chain_entries != root_summary.entry_count {
            return Err(IndexError::Corrupted(format!(
                "leaf chain sees {} leaves / {} entries, tree has {} / {}",
                chain_leaves, chain_entries, root_summary.leaf_count, root_summary.entry_count
            )));
        }

        Ok(())
    }

    fn validate_subtree(
        &self,
        buffer_manager: &mut BufferManager,
        page_num: PageNum,
        expected_parent: PageNum,
        is_root: bool,
    ) -> IndexResult<SubtreeSummary> {
        let node = self.load_node(buffer_manager, page_num)?;
        let order = self.header.order as usize;

        if node.parent != expected_parent {
            return Err(IndexError::Corrupted(format!(
                "page {} has parent {}, expected {}",
                page_num, node.parent, expected_parent
            )));
        }

        for i in 1..node.keys.len() {
            match self.compare_key(&node.keys[i - 1], &node.keys[i]) {
                Ordering::Greater => {
                    return Err(IndexError::Corrupted(format!(
                        "keys out of order in page {}",
                        page_num
                    )))
                }
                Ordering::Equal if node.is_leaf && node.rids[i - 1] >= node.rids[i] => {
                    return Err(IndexError::Corrupted(format!(
                        "duplicate keys out of rid order in page {}",
                        page_num
                    )))
                }
                _ => {}
            }
        }

        let max_keys = if node.is_leaf { order } else { order - 1 };
        if node.keys.len() > max_keys {
            return Err(IndexError::Corrupted(format!(
                "page {} overflows with {} keys",
                page_num,
                node.keys.len()
            )));
        }
        if !is_root && node.keys.len() < self.min_keys(&node) {
            return Err(IndexError::Corrupted(format!(
                "page {} underflows with {} keys",
                page_num,
                node.keys.len()
            )));
        }

        if node.is_leaf {
            return Ok(SubtreeSummary {
                min_key: node.keys.first().cloned(),
                max_key: node.keys.last().cloned(),
                leaf_count: 1,
                entry_count: node.keys.len(),
                depth: 1,
            });
        }

        if node.keys.is_empty() && self.header.order > 2 {
            return Err(IndexError::Corrupted(format!(
                "internal page {} has no keys",
                page_num
            )));
        }

        let mut children = Vec::with_capacity(node.rids.len());
        for child_rid in &node.rids {
            children.push(self.validate_subtree(
                buffer_manager,
                child_rid.page_num,
                page_num,
                false,
            )?);
        }

        let depth = children[0].depth;
        for child in &children {
            if child.depth != depth {
                return Err(IndexError::Corrupted(format!(
                    "uneven subtree depth under page {}",
                    page_num
                )));
            }
        }

        for (i, separator) in node.keys.iter().enumerate() {
            let right_min = children[i + 1].min_key.as_ref().ok_or_else(|| {
                IndexError::Corrupted(format!("empty child under internal page {}", page_num))
            })?;
            if self.compare_key(separator, right_min) != Ordering::Equal {
                return Err(IndexError::Corrupted(format!(
                    "separator {} of page {} is not its right subtree's minimum",
                    i, page_num
                )));
            }
            if let Some(left_max) = &children[i].max_key {
                if self.compare_key(left_max, separator) == Ordering::Greater {
                    return Err(IndexError::Corrupted(format!(
                        "left subtree exceeds separator {} in page {}",
                        i, page_num
                    )));
                }
            }
        }

        Ok(SubtreeSummary {
            min_key: children[0].min_key.clone(),
            max_key: children[children.len() - 1].max_key.clone(),
            leaf_count: children.iter().map(|c| c.leaf_count).sum(),
            entry_count: children.iter().map(|c| c.entry_count).sum(),
            depth: depth + 1,
        })
    }
}

struct SubtreeSummary {
    min_key: Option<Vec<u8>>,
    max_key: Option<Vec<u8>>,
    leaf_count: usize,
    entry_count: usize,
    depth: usize,
}

/// Privileged tuning surface for tests: the order may only change while the
/// tree holds no keys.
pub struct IndexTester<'a> {
    index: &'a mut IndexFile,
}

impl<'a> IndexTester<'a> {
    pub fn new(index: &'a mut IndexFile) -> Self {
        Self { index }
    }

    pub fn order(&self) -> i32 {
        self.index.header.order
    }

    pub fn set_order(
        &mut self,
        buffer_manager: &mut BufferManager,
        order: i32,
    ) -> IndexResult<()> {
        if order < 2 || order % 2 != 0 {
            return Err(IndexError::InvalidArgument(format!(
                "order must be even and >= 2, got {}",
                order
            )));
        }
        let slots = order as usize + NODE_RESERVE_SLOTS;
        let key_length = self.index.header.key_length as usize;
        if NODE_HEADER_SIZE + slots * key_length + (slots + 1) * RID_SLOT_SIZE > PAGE_SIZE {
            return Err(IndexError::InvalidArgument(format!(
                "order {} does not fit a page for this key length",
                order
            )));
        }
        let root = self
            .index
            .load_node(buffer_manager, self.index.header.root_page)?;
        if !root.is_leaf || !root.keys.is_empty() {
            return Err(IndexError::InvalidArgument(
                "order is immutable once the tree is populated".to_string(),
            ));
        }
        self.index.header.order = order;
        self.index.header_dirty = true;
        Ok(())
    }
}
