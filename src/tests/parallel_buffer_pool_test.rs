use std::sync::Arc;

use crate::buffer::buffer_pool_manager::BufferPool;
use crate::buffer::parallel_buffer_pool_manager::ParallelBufferPoolManager;
use crate::storage::disk::manager::DiskManager;
use crate::storage::page::page_layout::PAGE_SIZE;

use super::test_db;

#[test]
fn allocation_shards_across_instances() {
    let db = test_db("pbp_shard");
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    let pool = ParallelBufferPoolManager::new(3, 2, disk_manager);
    assert_eq!(pool.num_instances(), 3);
    assert_eq!(pool.pool_size(), 2);

    // The cursor parks on the instance that last succeeded, so allocations
    // fill instance 0, then 1, then 2.
    let mut pids = Vec::new();
    for _ in 0..6 {
        let (pid, _page) = pool.new_page().unwrap();
        pids.push(pid);
    }
    assert_eq!(pids, vec![0, 3, 1, 4, 2, 5]);

    // every instance is full of pinned pages now
    assert!(pool.new_page().is_none());

    for &pid in &pids {
        assert_eq!(pool.pin_count(pid), Some(1));
        assert!(pool.unpin_page(pid, false));
    }
    assert_eq!(pool.pinned_frame_count(), 0);
}

#[test]
fn operations_route_by_page_id() {
    let db = test_db("pbp_route");
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    let pool = ParallelBufferPoolManager::new(2, 2, Arc::clone(&disk_manager));

    let (pid, page) = pool.new_page().unwrap();
    page.write()[42] = 7;
    assert!(pool.unpin_page(pid, true));

    let page = pool.fetch_page(pid).unwrap();
    assert_eq!(page.read()[42], 7);
    assert!(pool.flush_page(pid));
    assert!(pool.unpin_page(pid, false));

    let mut buf = [0u8; PAGE_SIZE];
    disk_manager.read_page(pid, &mut buf).unwrap();
    assert_eq!(buf[42], 7);

    // ids the router never allocated are refused
    assert!(pool.fetch_page(17).is_none());
    assert!(!pool.unpin_page(17, false));
    assert!(!pool.flush_page(17));
}

#[test]
fn delete_unroutes_the_page() {
    let db = test_db("pbp_delete");
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    let pool = ParallelBufferPoolManager::new(2, 2, disk_manager);

    let (pid, _page) = pool.new_page().unwrap();
    assert!(!pool.delete_page(pid));
    assert!(pool.unpin_page(pid, false));
    assert!(pool.delete_page(pid));
    assert!(pool.fetch_page(pid).is_none());
}

#[test]
fn flush_all_fans_out() {
    let db = test_db("pbp_flush_all");
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    let pool = ParallelBufferPoolManager::new(3, 2, Arc::clone(&disk_manager));

    let mut pids = Vec::new();
    for i in 0..5u8 {
        let (pid, page) = pool.new_page().unwrap();
        page.write()[0] = i + 1;
        assert!(pool.unpin_page(pid, true));
        pids.push(pid);
    }

    pool.flush_all_pages();
    for (i, &pid) in pids.iter().enumerate() {
        let mut buf = [0u8; PAGE_SIZE];
        disk_manager.read_page(pid, &mut buf).unwrap();
        assert_eq!(buf[0], i as u8 + 1);
    }
}
