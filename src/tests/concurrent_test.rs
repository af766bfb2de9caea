use std::collections::BTreeMap;
use std::sync::Arc;

use rand::seq::SliceRandom;
use rand::thread_rng;

use crate::index::b_plus_tree::{BPlusTree, BPlusTreeBuilder};
use crate::index::key::RowID;

use super::{single_pool, test_db};

const WRITER_THREADS: usize = 4;
const READER_THREADS: usize = 4;
const KEYS_PER_WRITER: i64 = 250;

fn writer_range(writer: usize) -> impl Iterator<Item = i64> {
    let base = writer as i64 * 10_000;
    (base..base + KEYS_PER_WRITER).map(move |key| key * 7 % 10_000 + base)
}

#[test]
fn concurrent_inserts_and_scans_agree_with_the_oracle() {
    let db = test_db("concurrent");
    let pool = single_pool(&db, 256);
    let tree: Arc<BPlusTree<i64>> = Arc::new(
        BPlusTreeBuilder::new()
            .leaf_max_size(8)
            .internal_max_size(8)
            .build::<i64>("numbers", pool.clone())
            .unwrap(),
    );

    let mut handles = Vec::new();
    for writer in 0..WRITER_THREADS {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            let mut keys: Vec<i64> = writer_range(writer).collect();
            keys.shuffle(&mut thread_rng());
            for key in keys {
                assert!(tree.insert(&key, RowID::new(writer as i32, key as u32)));
            }
        }));
    }
    for _ in 0..READER_THREADS {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            // Scans interleave with the inserts; each one must come back
            // sorted and duplicate-free whatever state it observes.
            for _ in 0..20 {
                let keys: Vec<i64> = tree.iter().map(|(key, _)| key).collect();
                assert!(keys.windows(2).all(|pair| pair[0] < pair[1]));
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    // sequential oracle
    let mut oracle = BTreeMap::new();
    for writer in 0..WRITER_THREADS {
        for key in writer_range(writer) {
            oracle.insert(key, RowID::new(writer as i32, key as u32));
        }
    }

    tree.verify_integrity();
    for (key, rid) in &oracle {
        assert_eq!(tree.get_value(key), Some(*rid));
    }
    let scanned: Vec<i64> = tree.iter().map(|(key, _)| key).collect();
    let expected: Vec<i64> = oracle.keys().copied().collect();
    assert_eq!(scanned, expected);
    assert_eq!(pool.pinned_frame_count(), 0);
}

#[test]
fn concurrent_disjoint_removals_leave_the_rest_intact() {
    let db = test_db("concurrent_remove");
    let pool = single_pool(&db, 256);
    let tree: Arc<BPlusTree<i64>> = Arc::new(
        BPlusTreeBuilder::new()
            .leaf_max_size(8)
            .internal_max_size(8)
            .build::<i64>("numbers", pool.clone())
            .unwrap(),
    );

    let total: i64 = 2000;
    for key in 0..total {
        assert!(tree.insert(&key, RowID::new(0, key as u32)));
    }

    // four threads each drain a disjoint residue class; evens survive
    let mut handles = Vec::new();
    for residue in [1i64, 3, 5, 7] {
        let tree = Arc::clone(&tree);
        handles.push(std::thread::spawn(move || {
            let mut keys: Vec<i64> = (0..total).filter(|key| key % 8 == residue).collect();
            keys.shuffle(&mut thread_rng());
            for key in keys {
                tree.remove(&key);
            }
        }));
    }
    for handle in handles {
        handle.join().unwrap();
    }

    tree.verify_integrity();
    for key in 0..total {
        let expected = if key % 2 == 0 {
            Some(RowID::new(0, key as u32))
        } else {
            None
        };
        assert_eq!(tree.get_value(&key), expected);
    }
    assert_eq!(pool.pinned_frame_count(), 0);
}
