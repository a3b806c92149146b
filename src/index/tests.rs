use std::collections::HashSet;

use tempfile::TempDir;

use crate::file::BufferManager;
use crate::record::{AttrType, Rid, Value};

use super::{IndexError, IndexFile, IndexTester};

fn setup() -> (TempDir, BufferManager, IndexFile) {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("test.index");
    let mut bm = BufferManager::new();
    let index = IndexFile::create(&mut bm, &path, AttrType::Ints, 4).unwrap();
    (temp_dir, bm, index)
}

fn setup_with_order(order: i32) -> (TempDir, BufferManager, IndexFile) {
    let (temp_dir, mut bm, mut index) = setup();
    IndexTester::new(&mut index).set_order(&mut bm, order).unwrap();
    (temp_dir, bm, index)
}

fn key(v: i32) -> Vec<u8> {
    Value::Int(v).encode(4).unwrap()
}

#[test]
fn test_create_has_sane_order() {
    let (_dir, _bm, index) = setup();
    assert!(index.order() >= 2);
    assert_eq!(index.order() % 2, 0);
}

#[test]
fn test_tester_rejects_bad_orders() {
    let (_dir, mut bm, mut index) = setup();
    let mut tester = IndexTester::new(&mut index);
    assert!(tester.set_order(&mut bm, 3).is_err());
    assert!(tester.set_order(&mut bm, 0).is_err());
    assert!(tester.set_order(&mut bm, 6).is_ok());
    assert_eq!(tester.order(), 6);
}

#[test]
fn test_tester_rejects_populated_tree() {
    let (_dir, mut bm, mut index) = setup();
    index.insert_entry(&mut bm, &key(1), Rid::new(1, 0)).unwrap();
    let mut tester = IndexTester::new(&mut index);
    assert!(tester.set_order(&mut bm, 4).is_err());
}

#[test]
fn test_insert_and_get_single_leaf() {
    let (_dir, mut bm, mut index) = setup();

    for v in [5, 3, 7] {
        index
            .insert_entry(&mut bm, &key(v), Rid::new(1, v))
            .unwrap();
    }

    assert_eq!(index.get_entry(&mut bm, &key(3)).unwrap(), vec![Rid::new(1, 3)]);
    assert_eq!(index.get_entry(&mut bm, &key(5)).unwrap(), vec![Rid::new(1, 5)]);
    assert!(index.get_entry(&mut bm, &key(4)).unwrap().is_empty());
    index.validate(&mut bm).unwrap();
}

#[test]
fn test_duplicate_rid_rejected() {
    let (_dir, mut bm, mut index) = setup();
    index.insert_entry(&mut bm, &key(1), Rid::new(1, 0)).unwrap();
    assert!(index.insert_entry(&mut bm, &key(1), Rid::new(1, 0)).is_err());
}

#[test]
fn test_duplicate_keys_all_returned() {
    let (_dir, mut bm, mut index) = setup();

    let rids: Vec<Rid> = (0..10).map(|i| Rid::new(2, i)).collect();
    for rid in &rids {
        index.insert_entry(&mut bm, &key(42), *rid).unwrap();
    }

    let found: HashSet<Rid> = index.get_entry(&mut bm, &key(42)).unwrap().into_iter().collect();
    assert_eq!(found, rids.iter().copied().collect());
    index.validate(&mut bm).unwrap();
}

#[test]
fn test_duplicate_keys_span_leaves() {
    let (_dir, mut bm, mut index) = setup_with_order(4);

    // Far more duplicates than one order-4 leaf can hold
    let rids: Vec<Rid> = (0..40).map(|i| Rid::new(3, i)).collect();
    for rid in &rids {
        index.insert_entry(&mut bm, &key(42), *rid).unwrap();
    }
    // Neighbouring keys on both sides
    index.insert_entry(&mut bm, &key(41), Rid::new(4, 0)).unwrap();
    index.insert_entry(&mut bm, &key(43), Rid::new(4, 1)).unwrap();

    index.validate(&mut bm).unwrap();
    let found: HashSet<Rid> = index.get_entry(&mut bm, &key(42)).unwrap().into_iter().collect();
    assert_eq!(found, rids.iter().copied().collect());
    assert_eq!(index.get_entry(&mut bm, &key(41)).unwrap().len(), 1);
    assert_eq!(index.get_entry(&mut bm, &key(43)).unwrap().len(), 1);
}

#[test]
fn test_split_ascending_inserts() {
    let (_dir, mut bm, mut index) = setup_with_order(4);

    for v in 0..200 {
        index.insert_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
    }
    index.validate(&mut bm).unwrap();

    for v in 0..200 {
        assert_eq!(
            index.get_entry(&mut bm, &key(v)).unwrap(),
            vec![Rid::new(1, v)],
            "key {} lost",
            v
        );
    }
}

#[test]
fn test_split_descending_inserts() {
    let (_dir, mut bm, mut index) = setup_with_order(4);

    for v in (0..200).rev() {
        index.insert_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
    }
    index.validate(&mut bm).unwrap();

    for v in 0..200 {
        assert_eq!(index.get_entry(&mut bm, &key(v)).unwrap(), vec![Rid::new(1, v)]);
    }
}

#[test]
fn test_interleaved_inserts_keep_invariants() {
    let (_dir, mut bm, mut index) = setup_with_order(4);

    // A deterministic shuffle: multiples of a generator mod a prime
    let n = 211;
    for i in 0..n {
        let v = (i * 73) % n;
        index.insert_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
    }
    index.validate(&mut bm).unwrap();

    for v in 0..n {
        assert_eq!(index.get_entry(&mut bm, &key(v)).unwrap(), vec![Rid::new(1, v)]);
    }
}

#[test]
fn test_delete_missing_key() {
    let (_dir, mut bm, mut index) = setup();
    index.insert_entry(&mut bm, &key(1), Rid::new(1, 0)).unwrap();

    assert!(matches!(
        index.delete_entry(&mut bm, &key(2), Rid::new(1, 0)),
        Err(IndexError::InvalidKey)
    ));
    // Right key, wrong rid
    assert!(matches!(
        index.delete_entry(&mut bm, &key(1), Rid::new(1, 9)),
        Err(IndexError::InvalidKey)
    ));
}

#[test]
fn test_insert_delete_round_trip() {
    let (_dir, mut bm, mut index) = setup_with_order(4);

    for v in 0..50 {
        index.insert_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
    }
    index.insert_entry(&mut bm, &key(25), Rid::new(9, 9)).unwrap();
    index.validate(&mut bm).unwrap();

    index.delete_entry(&mut bm, &key(25), Rid::new(9, 9)).unwrap();
    index.validate(&mut bm).unwrap();

    for v in 0..50 {
        assert_eq!(index.get_entry(&mut bm, &key(v)).unwrap(), vec![Rid::new(1, v)]);
    }
}

#[test]
fn test_bulk_insert_then_delete_evens() {
    let (_dir, mut bm, mut index) = setup_with_order(4);

    for v in 0..1000 {
        index.insert_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
    }
    index.validate(&mut bm).unwrap();

    for v in (0..1000).step_by(2) {
        index.delete_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
    }
    index.validate(&mut bm).unwrap();

    for v in 0..1000 {
        let found = index.get_entry(&mut bm, &key(v)).unwrap();
        if v % 2 == 0 {
            assert!(found.is_empty(), "deleted key {} still present", v);
        } else {
            assert_eq!(found, vec![Rid::new(1, v)]);
        }
    }
}

#[test]
fn test_delete_everything_leaves_empty_tree() {
    let (_dir, mut bm, mut index) = setup_with_order(4);

    for v in 0..100 {
        index.insert_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
    }
    for v in 0..100 {
        index.delete_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
    }
    index.validate(&mut bm).unwrap();
    assert!(index.get_entry(&mut bm, &key(0)).unwrap().is_empty());

    // The emptied tree accepts fresh inserts
    index.insert_entry(&mut bm, &key(7), Rid::new(1, 7)).unwrap();
    assert_eq!(index.get_entry(&mut bm, &key(7)).unwrap(), vec![Rid::new(1, 7)]);
    index.validate(&mut bm).unwrap();
}

#[test]
fn test_alternating_insert_delete_keeps_invariants() {
    let (_dir, mut bm, mut index) = setup_with_order(4);

    let mut live: HashSet<i32> = HashSet::new();
    for round in 0..5 {
        for v in 0..60 {
            let v = v + round * 7;
            if live.insert(v) {
                index.insert_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
            }
        }
        let doomed: Vec<i32> = live.iter().copied().filter(|v| v % 3 == round % 3).collect();
        for v in doomed {
            index.delete_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
            live.remove(&v);
        }
        index.validate(&mut bm).unwrap();
    }

    for v in &live {
        assert_eq!(index.get_entry(&mut bm, &key(*v)).unwrap(), vec![Rid::new(1, *v)]);
    }
}

#[test]
fn test_persistence_across_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("test.index");

    {
        let mut bm = BufferManager::new();
        let mut index = IndexFile::create(&mut bm, &path, AttrType::Ints, 4).unwrap();
        IndexTester::new(&mut index).set_order(&mut bm, 4).unwrap();
        for v in 0..100 {
            index.insert_entry(&mut bm, &key(v), Rid::new(1, v)).unwrap();
        }
        index.sync(&mut bm).unwrap();
    }

    let mut bm = BufferManager::new();
    let index = IndexFile::open(&mut bm, &path).unwrap();
    assert_eq!(index.order(), 4);
    index.validate(&mut bm).unwrap();
    for v in 0..100 {
        assert_eq!(index.get_entry(&mut bm, &key(v)).unwrap(), vec![Rid::new(1, v)]);
    }
}

#[test]
fn test_chars_keys() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("chars.index");
    let mut bm = BufferManager::new();
    let mut index = IndexFile::create(&mut bm, &path, AttrType::Chars, 8).unwrap();
    IndexTester::new(&mut index).set_order(&mut bm, 4).unwrap();

    let words = [
        "apple", "pear", "fig", "plum", "cherry", "grape", "lemon", "lime", "mango", "peach",
    ];
    for (i, word) in words.iter().enumerate() {
        let k = Value::Chars(word.to_string()).encode(8).unwrap();
        index.insert_entry(&mut bm, &k, Rid::new(1, i as i32)).unwrap();
    }
    index.validate(&mut bm).unwrap();

    let k = Value::Chars("lemon".to_string()).encode(8).unwrap();
    assert_eq!(index.get_entry(&mut bm, &k).unwrap(), vec![Rid::new(1, 6)]);
}

#[test]
fn test_float_keys() {
    let temp_dir = tempfile::tempdir().unwrap();
    let path = temp_dir.path().join("floats.index");
    let mut bm = BufferManager::new();
    let mut index = IndexFile::create(&mut bm, &path, AttrType::Floats, 4).unwrap();

    for i in 0..20 {
        let k = Value::Float(i as f32 * 0.5 - 3.0).encode(4).unwrap();
        index.insert_entry(&mut bm, &k, Rid::new(1, i)).unwrap();
    }
    index.validate(&mut bm).unwrap();

    let k = Value::Float(-3.0).encode(4).unwrap();
    assert_eq!(index.get_entry(&mut bm, &k).unwrap(), vec![Rid::new(1, 0)]);
}

#[test]
fn test_wrong_key_length_rejected() {
    let (_dir, mut bm, mut index) = setup();
    assert!(index.insert_entry(&mut bm, &[0u8; 2], Rid::new(1, 0)).is_err());
    assert!(index.get_entry(&mut bm, &[0u8; 2]).is_err());
}
