use std::sync::Arc;

use crate::buffer::buffer_pool_manager::{BufferPool, BufferPoolManagerInstance};
use crate::storage::disk::manager::DiskManager;
use crate::storage::page::page_layout::PAGE_SIZE;

use super::test_db;

#[test]
fn eviction_waits_for_unpin() {
    let db = test_db("bp_eviction");
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    let pool = BufferPoolManagerInstance::new(3, disk_manager);

    let (p0, page0) = pool.new_page().unwrap();
    let (p1, _page1) = pool.new_page().unwrap();
    let (p2, _page2) = pool.new_page().unwrap();
    assert_eq!((p0, p1, p2), (0, 1, 2));

    // every frame is pinned
    assert!(pool.new_page().is_none());
    assert!(pool.fetch_page(p0).is_some());
    assert_eq!(pool.pin_count(p0), Some(2));
    assert!(pool.unpin_page(p0, false));

    // still pinned once, still not evictable
    assert!(pool.new_page().is_none());

    {
        let mut data = page0.write();
        data[0..4].copy_from_slice(b"agat");
    }
    assert!(pool.unpin_page(p0, true));

    // now p0 is the victim
    let (p3, _page3) = pool.new_page().unwrap();
    assert_eq!(p3, 3);
    assert_eq!(pool.pin_count(p0), None);

    // p0 comes back from disk with its dirty write preserved
    assert!(pool.unpin_page(p1, false));
    let page0 = pool.fetch_page(p0).unwrap();
    {
        let data = page0.read();
        assert_eq!(&data[0..4], b"agat");
    }
    assert!(pool.unpin_page(p0, false));
}

#[test]
fn flush_makes_bytes_durable() {
    let db = test_db("bp_flush");
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    let pool = BufferPoolManagerInstance::new(3, Arc::clone(&disk_manager));

    let (p1, page1) = pool.new_page().unwrap();
    {
        let mut data = page1.write();
        data[10] = 0xab;
    }
    assert!(pool.unpin_page(p1, true));

    // a re-fetch observes the modified bytes without any flush
    let page1 = pool.fetch_page(p1).unwrap();
    assert_eq!(page1.read()[10], 0xab);

    assert!(pool.flush_page(p1));
    assert!(!page1.is_dirty());

    let mut buf = [0u8; PAGE_SIZE];
    disk_manager.read_page(p1, &mut buf).unwrap();
    assert_eq!(buf[10], 0xab);

    assert!(pool.unpin_page(p1, false));
    assert!(!pool.flush_page(99));
}

#[test]
fn flush_all_writes_every_dirty_page() {
    let db = test_db("bp_flush_all");
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    let pool = BufferPoolManagerInstance::new(4, Arc::clone(&disk_manager));

    let mut pids = Vec::new();
    for i in 0..3u8 {
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

#[test]
fn unpin_edge_cases() {
    let db = test_db("bp_unpin");
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    let pool = BufferPoolManagerInstance::new(3, disk_manager);

    assert!(!pool.unpin_page(0, false));

    let (pid, _page) = pool.new_page().unwrap();
    assert!(pool.unpin_page(pid, false));
    // second unpin finds pin_count already at zero
    assert!(!pool.unpin_page(pid, false));

    // the dirty bit is sticky across unpins
    let _ = pool.fetch_page(pid).unwrap();
    let _ = pool.fetch_page(pid).unwrap();
    assert!(pool.unpin_page(pid, true));
    assert!(pool.unpin_page(pid, false));
    let page = pool.fetch_page(pid).unwrap();
    assert!(page.is_dirty());
    assert!(pool.unpin_page(pid, false));
}

#[test]
fn delete_page_frees_the_frame() {
    let db = test_db("bp_delete");
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    let pool = BufferPoolManagerInstance::new(2, Arc::clone(&disk_manager));

    let (p0, _page0) = pool.new_page().unwrap();
    let (p1, _page1) = pool.new_page().unwrap();
    assert!(pool.new_page().is_none());

    // pinned pages cannot be deleted
    assert!(!pool.delete_page(p0));
    assert!(pool.unpin_page(p0, false));
    assert!(pool.delete_page(p0));
    assert_eq!(disk_manager.num_deletes(), 1);

    // absent pages delete vacuously
    assert!(pool.delete_page(p0));

    // the freed frame is usable again
    let (p2, _page2) = pool.new_page().unwrap();
    assert_eq!(p2, 2);
    assert!(pool.new_page().is_none());

    assert!(pool.unpin_page(p1, false));
    assert!(pool.unpin_page(p2, false));
    assert_eq!(pool.pinned_frame_count(), 0);
}

#[test]
fn fetch_refuses_foreign_ids() {
    let db = test_db("bp_foreign");
    let disk_manager = Arc::new(DiskManager::new(db.path()).unwrap());
    let pool = BufferPoolManagerInstance::new(2, disk_manager);

    assert!(pool.fetch_page(-1).is_none());
    // never allocated by this instance
    assert!(pool.fetch_page(5).is_none());
}
