use std::{
    collections::{HashMap, VecDeque},
    sync::Arc,
};

use log::debug;
use parking_lot::Mutex;

use crate::storage::disk::manager::DiskManager;
use crate::storage::page::page::{FrameId, Page, PageId, INVALID_PAGE_ID};

use super::lru_replacer::{LruReplacer, Replacer};

/// The surface the index layer programs against. Implemented by a single
/// pool instance and by the sharded router, so callers are indifferent to
/// which one backs them.
pub trait BufferPool: Send + Sync {
    /// Pins and returns the page, reading it from disk if not resident.
    /// `None` when every frame is pinned.
    fn fetch_page(&self, page_id: PageId) -> Option<Arc<Page>>;

    /// Allocates a fresh page id and pins a zeroed frame for it. `None`
    /// when every frame is pinned.
    fn new_page(&self) -> Option<(PageId, Arc<Page>)>;

    /// Drops one pin. `false` when the page is not resident or not pinned.
    /// `is_dirty` is sticky: it can set the dirty bit, never clear it.
    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool;

    /// Writes the page out regardless of its dirty bit and clears the bit.
    /// Callers must quiesce writers of the page first: the frame's latch is
    /// taken for reading, so flushing a write-latched page blocks.
    fn flush_page(&self, page_id: PageId) -> bool;

    /// Writes out every resident dirty page.
    fn flush_all_pages(&self);

    /// Removes the page from the pool and deallocates it on disk. `true`
    /// when the page is absent or was removed; `false` while it is pinned.
    fn delete_page(&self, page_id: PageId) -> bool;
}

struct PoolInner {
    page_table: HashMap<PageId, FrameId>,
    free_list: VecDeque<FrameId>,
    next_page_id: PageId,
}

/// A fixed array of `pool_size` frames over one disk manager. Every public
/// operation holds the instance latch for its whole body; disk I/O under
/// the latch is part of the contract.
///
/// Page ids are allocated sharded: instance `i` of `n` hands out ids
/// congruent to `i` mod `n`, starting at `i`.
pub struct BufferPoolManagerInstance {
    pool_size: usize,
    num_instances: u32,
    instance_index: u32,
    frames: Vec<Arc<Page>>,
    replacer: LruReplacer,
    disk_manager: Arc<DiskManager>,
    inner: Mutex<PoolInner>,
}

impl BufferPoolManagerInstance {
    pub fn new(pool_size: usize, disk_manager: Arc<DiskManager>) -> Self {
        Self::with_sharding(pool_size, 1, 0, disk_manager)
    }

    pub fn with_sharding(
        pool_size: usize,
        num_instances: u32,
        instance_index: u32,
        disk_manager: Arc<DiskManager>,
    ) -> Self {
        assert!(num_instances > 0, "a pool needs at least one instance");
        assert!(
            instance_index < num_instances,
            "instance index {} out of range for {} instances",
            instance_index,
            num_instances
        );

        let frames = (0..pool_size).map(|i| Arc::new(Page::new(i))).collect();
        // Initially every frame sits in the free list.
        let free_list = (0..pool_size).collect();

        Self {
            pool_size,
            num_instances,
            instance_index,
            frames,
            replacer: LruReplacer::new(pool_size),
            disk_manager,
            inner: Mutex::new(PoolInner {
                page_table: HashMap::new(),
                free_list,
                next_page_id: instance_index as PageId,
            }),
        }
    }

    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Pin count of a resident page; `None` when the page is not resident.
    pub fn pin_count(&self, page_id: PageId) -> Option<u32> {
        let inner = self.inner.lock();
        inner
            .page_table
            .get(&page_id)
            .map(|&frame_id| self.frames[frame_id].pin_count())
    }

    /// Number of frames currently holding a pinned page.
    pub fn pinned_frame_count(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .page_table
            .values()
            .filter(|&&frame_id| self.frames[frame_id].pin_count() > 0)
            .count()
    }

    fn allocate_page(&self, inner: &mut PoolInner) -> PageId {
        let page_id = inner.next_page_id;
        inner.next_page_id += self.num_instances as PageId;
        debug_assert_eq!(
            page_id as u32 % self.num_instances,
            self.instance_index,
            "allocated ids must shard back to this instance"
        );
        page_id
    }

    /// Ids this instance has handed out so far. Anything else cannot be
    /// resident and must not be conjured out of the disk file.
    fn owns_page(&self, inner: &PoolInner, page_id: PageId) -> bool {
        page_id >= 0
            && page_id < inner.next_page_id
            && page_id as u32 % self.num_instances == self.instance_index
    }

    /// Free list first, replacer second.
    fn find_victim(&self, inner: &mut PoolInner) -> Option<FrameId> {
        if let Some(frame_id) = inner.free_list.pop_front() {
            return Some(frame_id);
        }
        self.replacer.victim()
    }

    /// Evicts whatever the frame holds (writing it back if dirty), rebinds
    /// the frame to `new_page_id` and zeroes the buffer.
    fn reset_frame(&self, inner: &mut PoolInner, frame_id: FrameId, new_page_id: PageId) {
        let page = &self.frames[frame_id];
        let old_page_id = page.id();
        if old_page_id != INVALID_PAGE_ID {
            if page.is_dirty() {
                debug!("writing back page {} before reuse of frame {}", old_page_id, frame_id);
                let data = page.read();
                self.disk_manager
                    .write_page(old_page_id, &data[..])
                    .expect("disk write failed");
                page.set_dirty(false);
            }
            inner.page_table.remove(&old_page_id);
        }
        if new_page_id != INVALID_PAGE_ID {
            inner.page_table.insert(new_page_id, frame_id);
        }
        {
            let mut data = page.write();
            data.fill(0);
        }
        page.set_id(new_page_id);
    }
}

impl BufferPool for BufferPoolManagerInstance {
    fn fetch_page(&self, page_id: PageId) -> Option<Arc<Page>> {
        if page_id == INVALID_PAGE_ID {
            return None;
        }
        let mut inner = self.inner.lock();

        if let Some(&frame_id) = inner.page_table.get(&page_id) {
            let page = &self.frames[frame_id];
            page.increment_pin_count();
            self.replacer.pin(frame_id);
            return Some(Arc::clone(page));
        }

        if !self.owns_page(&inner, page_id) {
            return None;
        }
        let frame_id = self.find_victim(&mut inner)?;
        self.reset_frame(&mut inner, frame_id, page_id);

        let page = &self.frames[frame_id];
        {
            let mut data = page.write();
            self.disk_manager
                .read_page(page_id, &mut data[..])
                .expect("disk read failed");
        }
        page.set_pin_count(1);
        page.set_dirty(false);
        self.replacer.pin(frame_id);
        Some(Arc::clone(page))
    }

    fn new_page(&self) -> Option<(PageId, Arc<Page>)> {
        let mut inner = self.inner.lock();
        let frame_id = self.find_victim(&mut inner)?;
        let page_id = self.allocate_page(&mut inner);
        self.reset_frame(&mut inner, frame_id, page_id);

        let page = &self.frames[frame_id];
        page.set_pin_count(1);
        page.set_dirty(false);
        self.replacer.pin(frame_id);
        debug!("new page {} in frame {}", page_id, frame_id);
        Some((page_id, Arc::clone(page)))
    }

    fn unpin_page(&self, page_id: PageId, is_dirty: bool) -> bool {
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let page = &self.frames[frame_id];
        if page.pin_count() == 0 {
            return false;
        }
        if page.decrement_pin_count() == 0 {
            self.replacer.unpin(frame_id);
        }
        if is_dirty {
            page.set_dirty(true);
        }
        true
    }

    fn flush_page(&self, page_id: PageId) -> bool {
        if page_id == INVALID_PAGE_ID {
            return false;
        }
        let inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return false;
        };
        let page = &self.frames[frame_id];
        let data = page.read();
        self.disk_manager
            .write_page(page_id, &data[..])
            .expect("disk write failed");
        page.set_dirty(false);
        true
    }

    fn flush_all_pages(&self) {
        let inner = self.inner.lock();
        for (&page_id, &frame_id) in &inner.page_table {
            let page = &self.frames[frame_id];
            if page.id() != INVALID_PAGE_ID && page.is_dirty() {
                let data = page.read();
                self.disk_manager
                    .write_page(page_id, &data[..])
                    .expect("disk write failed");
                page.set_dirty(false);
            }
        }
    }

    fn delete_page(&self, page_id: PageId) -> bool {
        let mut inner = self.inner.lock();
        let Some(&frame_id) = inner.page_table.get(&page_id) else {
            return true;
        };
        let page = &self.frames[frame_id];
        if page.pin_count() > 0 {
            return false;
        }

        self.disk_manager.deallocate_page(page_id);
        self.reset_frame(&mut inner, frame_id, INVALID_PAGE_ID);
        // The frame goes back to the free list; make sure the replacer
        // cannot hand it out a second time.
        self.replacer.pin(frame_id);
        inner.free_list.push_back(frame_id);
        debug!("deleted page {}, frame {} freed", page_id, frame_id);
        true
    }
}
