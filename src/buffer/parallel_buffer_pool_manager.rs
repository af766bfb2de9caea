use std::sync::Arc;

use dashmap::DashMap;
use parking_lot::Mutex;

use crate::storage::disk::manager::DiskManager;
use crate::storage::page::page::{Page, PageId};

use super::buffer_pool_manager::{BufferPool, BufferPoolManagerInstance};

/// Shard router over N buffer pool instances. Disk-level allocation is
/// sharded by `page_id mod N`, and the router remembers which instance
/// produced each page so every later operation dispatches to it.
pub struct ParallelBufferPoolManager {
    instances: Vec<Arc<BufferPoolManagerInstance>>,
    // page id -> owning instance, populated by new_page
    routing_table: DashMap<PageId, usize>,
    // round-robin cursor for new_page
    start_index: Mutex<usize>,
}

impl ParallelBufferPoolManager {
    pub fn new(num_instances: usize, pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");
        let instances = (0..num_instances)
            .map(|i| {
                Arc::new(BufferPoolManagerInstance::with_sharding(
                    pool_size,
                    num_instances as u32,
                    i as u32,
                    Arc::clone(&disk_manager),
                ))
            })
            .collect();

        Self {
            instances,
            routing_table: DashMap::new(),
            start_index: Mutex::new(0),
        }
    }

    pub fn num_instances(&self) -> usize {
        self.instances.len()
    }

    /// Frame count of one instance (every instance is sized the same).
    pub fn pool_size(&self) -> usize {
        self.instances[0].pool_size()
    }

    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let instance = self.instance_for(page_id)?;
        instance.pin_count(page_id)
    }

    pub fn pinned_frame_count(&self) -> usize {
        self.instances
            .iter()
            .map(|instance| instance.pinned_frame_count())
            .sum()
    }

    fn instance_for(&self, page_id: PageId) -> Option<&BufferPoolManagerInstance> {
        self.routing_table
            .get(&page_id)
            .map(|entry| self.instances[*entry.value()].as_ref())
    }
}

impl BufferPool for ParallelBufferPoolManager {
    fn fetch_page(&self, page_id: PageId) -> Option<Arc<Page>> {
        self.instance_for(page_id)?.fetch_page(page_id)
    }

    fn new_page(&self) -> Option<(PageId, Arc<Page>)> {
        // Start at the cursor and try every instance once; park the cursor
        // on the instance that succeeded.
        let mut start_index = self.start_index.lock();
        let num_instances = self.instances.len();
        for offset in 0..num_instances {
            let index = (*start_index + offset) % num_instances;
            if let Some((page_id, page)) = self.instances[index].new_page() {
                *start_index = index;
                self.routing_table.insert(page_id, index);
                return Some((page_id, page));
            }
        }
        None
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        match self.instance_for(page_id) {
            Some(instance) => instance.unpin_page(page_id, is_dirty),
            None => false,
        }
    }

    fn flush_page(&self, page_id: PageId) -> bool {
        match self.instance_for(page_id) {
            Some(instance) => instance.flush_page(page_id),
            None => false,
        }
    }

    fn flush_all_pages(&self) {
        for instance in &self.instances {
            instance.flush_all_pages();
        }
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        let Some(instance) = self.instance_for(page_id) else {
            return true;
        };
        if instance.delete_page(page_id) {
            self.routing_table.remove(&page_id);
            true
        } else {
            false
        }
    }
}
