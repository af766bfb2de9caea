use std::sync::Arc;

use crate::buffer::buffer_pool_manager::BufferPool;
use crate::storage::page::leaf_page::LeafPage;
use crate::storage::page::page::{Page, PageReadGuard, INVALID_PAGE_ID};

use super::key::{IndexKey, RowID};

struct IterPosition {
    page: Arc<Page>,
    guard: PageReadGuard,
    index: usize,
}

/// Forward scan over the leaf chain. Holds exactly one read-latched, pinned
/// leaf at a time and read-crabs to the next leaf at each boundary. The
/// latch and pin are released when the scan runs off the end or the
/// iterator is dropped.
pub struct IndexIterator<K: IndexKey> {
    bpm: Arc<dyn BufferPool>,
    position: Option<IterPosition>,
    _key: std::marker::PhantomData<K>,
}

impl<K: IndexKey> IndexIterator<K> {
    pub(crate) fn new(
        bpm: Arc<dyn BufferPool>,
        page: Arc<Page>,
        guard: PageReadGuard,
        index: usize,
    ) -> Self {
        Self {
            bpm,
            position: Some(IterPosition { page, guard, index }),
            _key: std::marker::PhantomData,
        }
    }

    pub(crate) fn empty(bpm: Arc<dyn BufferPool>) -> Self {
        Self {
            bpm,
            position: None,
            _key: std::marker::PhantomData,
        }
    }

    fn release(&mut self) {
        if let Some(position) = self.position.take() {
            let page_id = position.page.id();
            drop(position.guard);
            self.bpm.unpin_page(page_id, false);
        }
    }
}

impl<K: IndexKey> Iterator for IndexIterator<K> {
    type Item = (K, RowID);

    fn next(&mut self) -> Option<(K, RowID)> {
        loop {
            let position = self.position.as_mut()?;
            let (size, next_page_id, item) = {
                let leaf = LeafPage::<_, K>::new(&position.guard[..]);
                let item = if position.index < leaf.size() {
                    Some(leaf.item(position.index))
                } else {
                    None
                };
                (leaf.size(), leaf.next_page_id(), item)
            };

            if let Some(item) = item {
                position.index += 1;
                return Some(item);
            }

            debug_assert!(position.index >= size);
            if next_page_id == INVALID_PAGE_ID {
                self.release();
                return None;
            }

            // Read-crab: latch the next leaf before letting go of this one.
            let next_page = self
                .bpm
                .fetch_page(next_page_id)
                .expect("buffer pool exhausted during scan");
            let next_guard = next_page.read_owned();
            let page_id = position.page.id();
            let old = std::mem::replace(
                position,
                IterPosition {
                    page: next_page,
                    guard: next_guard,
                    index: 0,
                },
            );
            drop(old.guard);
            self.bpm.unpin_page(page_id, false);
        }
    }
}

impl<K: IndexKey> Drop for IndexIterator<K> {
    fn drop(&mut self) {
        self.release();
    }
}
