use crate::file::{PageNum, PAGE_SIZE};
use crate::record::{AttrType, Rid};

use super::error::{IndexError, IndexResult};

/// Work reserve beyond `order` key slots, used transiently during splits
pub const NODE_RESERVE_SLOTS: usize = 2;

/// Fixed node header: is_leaf, key_num, parent, prev_brother, next_brother
pub const NODE_HEADER_SIZE: usize = 20;

/// On-disk size of one RID slot (page_num + slot_num)
pub const RID_SLOT_SIZE: usize = 8;

/// Index file header, stored on page 0
#[derive(Debug, Clone, Copy)]
pub struct IndexFileHeader {
    pub attr_length: i32,
    /// Stored key width; equals `attr_length`
    pub key_length: i32,
    pub attr_type: AttrType,
    pub root_page: PageNum,
    /// Maximum keys in a leaf; also the internal branching factor.
    /// Always even and >= 2.
    pub order: i32,
}

impl IndexFileHeader {
    pub const SIZE: usize = 20;

    pub fn serialize(&self) -> [u8; Self::SIZE] {
        let mut out = [0u8; Self::SIZE];
        out[0..4].copy_from_slice(&self.attr_length.to_le_bytes());
        out[4..8].copy_from_slice(&self.key_length.to_le_bytes());
        out[8..12].copy_from_slice(&self.attr_type.to_code().to_le_bytes());
        out[12..16].copy_from_slice(&self.root_page.to_le_bytes());
        out[16..20].copy_from_slice(&self.order.to_le_bytes());
        out
    }

    pub fn deserialize(data: &[u8]) -> IndexResult<Self> {
        let read = |i: usize| i32::from_le_bytes([data[i], data[i + 1], data[i + 2], data[i + 3]]);
        let attr_type = AttrType::from_code(read(8))
            .map_err(|_| IndexError::Corrupted(format!("bad attribute type code {}", read(8))))?;
        let header = IndexFileHeader {
            attr_length: read(0),
            key_length: read(4),
            attr_type,
            root_page: read(12),
            order: read(16),
        };
        if header.attr_length <= 0 || header.key_length <= 0 {
            return Err(IndexError::Corrupted(format!(
                "bad key length {} in index header",
                header.key_length
            )));
        }
        if header.order < 2 || header.order % 2 != 0 {
            return Err(IndexError::Corrupted(format!(
                "bad order {} in index header",
                header.order
            )));
        }
        Ok(header)
    }

    /// Largest even order >= 2 such that two full key and RID areas plus the
    /// node header fit in a page
    pub fn compute_order(key_length: usize) -> i32 {
        let per_entry = 2 * (key_length + RID_SLOT_SIZE);
        let mut order = (PAGE_SIZE - NODE_HEADER_SIZE) / per_entry;
        order = order.saturating_sub(NODE_RESERVE_SLOTS);
        order -= order % 2;
        order.max(2) as i32
    }

    /// Key slots present in every node page
    pub fn key_slots(&self) -> usize {
        self.order as usize + NODE_RESERVE_SLOTS
    }
}

/// One B+-tree node, decoded from / encoded to a single page.
///
/// For leaves `rids[i]` is the record keyed by `keys[i]`; for internal nodes
/// `rids` holds `keys.len() + 1` child page numbers (in `page_num`, slot -1)
/// and the child at index `i` covers keys below `keys[i]`.
#[derive(Debug, Clone)]
pub struct IndexNode {
    pub is_leaf: bool,
    pub parent: PageNum,
    /// Sibling leaves; -1 at the ends, unused for internal nodes
    pub prev_brother: PageNum,
    pub next_brother: PageNum,
    pub keys: Vec<Vec<u8>>,
    pub rids: Vec<Rid>,
}

impl IndexNode {
    pub fn new_leaf() -> Self {
        Self {
            is_leaf: true,
            parent: -1,
            prev_brother: -1,
            next_brother: -1,
            keys: Vec::new(),
            rids: Vec::new(),
        }
    }

    pub fn key_num(&self) -> usize {
        self.keys.len()
    }

    pub fn decode(buffer: &[u8], header: &IndexFileHeader) -> IndexResult<IndexNode> {
        let read = |i: usize| {
            i32::from_le_bytes([buffer[i], buffer[i + 1], buffer[i + 2], buffer[i + 3]])
        };
        let is_leaf = read(0) != 0;
        let key_num = read(4) as usize;
        let parent = read(8);
        let prev_brother = read(12);
        let next_brother = read(16);

        if key_num > header.key_slots() {
            return Err(IndexError::Corrupted(format!(
                "node key_num {} exceeds capacity {}",
                key_num,
                header.key_slots()
            )));
        }

        let key_length = header.key_length as usize;
        let keys_base = NODE_HEADER_SIZE;
        let rids_base = keys_base + header.key_slots() * key_length;

        let mut keys = Vec::with_capacity(key_num);
        for i in 0..key_num {
            let start = keys_base + i * key_length;
            keys.push(buffer[start..start + key_length].to_vec());
        }

        let rid_num = if is_leaf { key_num } else { key_num + 1 };
        let mut rids = Vec::with_capacity(rid_num);
        for i in 0..rid_num {
            let start = rids_base + i * RID_SLOT_SIZE;
            let page_num = i32::from_le_bytes([
                buffer[start],
                buffer[start + 1],
                buffer[start + 2],
                buffer[start + 3],
            ]);
            let slot_num = i32::from_le_bytes([
                buffer[start + 4],
                buffer[start + 5],
                buffer[start + 6],
                buffer[start + 7],
            ]);
            rids.push(Rid::new(page_num, slot_num));
        }

        Ok(IndexNode {
            is_leaf,
            parent,
            prev_brother,
            next_brother,
            keys,
            rids,
        })
    }

    pub fn encode(&self, buffer: &mut [u8], header: &IndexFileHeader) -> IndexResult<()> {
        let key_length = header.key_length as usize;
        if self.keys.len() > header.key_slots() {
            return Err(IndexError::Corrupted(format!(
                "node holds {} keys, page fits {}",
                self.keys.len(),
                header.key_slots()
            )));
        }
        let expected_rids = if self.is_leaf {
            self.keys.len()
        } else {
            self.keys.len() + 1
        };
        if self.rids.len() != expected_rids {
            return Err(IndexError::Corrupted(format!(
                "node has {} keys but {} rids",
                self.keys.len(),
                self.rids.len()
            )));
        }

        buffer.fill(0);
        buffer[0..4].copy_from_slice(&(self.is_leaf as i32).to_le_bytes());
        buffer[4..8].copy_from_slice(&(self.keys.len() as i32).to_le_bytes());
        buffer[8..12].copy_from_slice(&self.parent.to_le_bytes());
        buffer[12..16].copy_from_slice(&self.prev_brother.to_le_bytes());
        buffer[16..20].copy_from_slice(&self.next_brother.to_le_bytes());

        let keys_base = NODE_HEADER_SIZE;
        let rids_base = keys_base + header.key_slots() * key_length;

        for (i, key) in self.keys.iter().enumerate() {
            if key.len() != key_length {
                return Err(IndexError::Corrupted(format!(
                    "key of {} bytes in index with key length {}",
                    key.len(),
                    key_length
                )));
            }
            let start = keys_base + i * key_length;
            buffer[start..start + key_length].copy_from_slice(key);
        }
        for (i, rid) in self.rids.iter().enumerate() {
            let start = rids_base + i * RID_SLOT_SIZE;
            buffer[start..start + 4].copy_from_slice(&rid.page_num.to_le_bytes());
            buffer[start + 4..start + 8].copy_from_slice(&rid.slot_num.to_le_bytes());
        }

        Ok(())
    }
}
