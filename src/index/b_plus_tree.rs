use std::{collections::VecDeque, marker::PhantomData, sync::Arc};

use log::debug;
use parking_lot::{Mutex, MutexGuard};

use crate::buffer::buffer_pool_manager::BufferPool;
use crate::storage::page::b_plus_tree_page::BPlusTreePage;
use crate::storage::page::header_page::HeaderPage;
use crate::storage::page::internal_page::{internal_page_capacity, InternalPage};
use crate::storage::page::leaf_page::{leaf_page_capacity, LeafPage};
use crate::storage::page::page::{
    Page, PageId, PageReadGuard, PageWriteGuard, HEADER_PAGE_ID, INVALID_PAGE_ID,
};
use crate::storage::page::page_layout::HEADER_NAME_SIZE;

use super::errors::Error;
use super::index_iterator::IndexIterator;
use super::key::{IndexKey, RowID};

/// What a descent is about to do to the leaf it reaches. Writers crab with
/// write latches; point reads descend separately with read latches.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Operation {
    Insert,
    Delete,
}

/// Per-operation bookkeeping for a writing descent: the root latch while it
/// is still held, the write-latched ancestors retained below the last safe
/// node, and the pages scheduled for deletion once the operation finishes.
struct Context<'a> {
    root_guard: Option<MutexGuard<'a, PageId>>,
    write_set: VecDeque<(Arc<Page>, PageWriteGuard)>,
    deleted_page_set: Vec<PageId>,
}

impl<'a> Context<'a> {
    fn new(root_guard: MutexGuard<'a, PageId>) -> Self {
        Self {
            root_guard: Some(root_guard),
            write_set: VecDeque::new(),
            deleted_page_set: Vec::new(),
        }
    }
}

pub struct BPlusTreeBuilder {
    leaf_max_size: usize,
    internal_max_size: usize,
}

impl BPlusTreeBuilder {
    /// A size of 0 means "as many pairs as the page layout fits".
    pub fn new() -> Self {
        Self {
            leaf_max_size: 0,
            internal_max_size: 0,
        }
    }

    pub fn leaf_max_size(mut self, leaf_max_size: usize) -> Self {
        self.leaf_max_size = leaf_max_size;
        self
    }

    pub fn internal_max_size(mut self, internal_max_size: usize) -> Self {
        self.internal_max_size = internal_max_size;
        self
    }

    pub fn build<K: IndexKey>(
        self,
        name: impl Into<String>,
        bpm: Arc<dyn BufferPool>,
    ) -> Result<BPlusTree<K>, Error> {
        let name = name.into();
        if name.len() > HEADER_NAME_SIZE {
            return Err(Error::NameTooLong(name));
        }

        let leaf_capacity = leaf_page_capacity::<K>();
        let leaf_max_size = if self.leaf_max_size == 0 {
            leaf_capacity
        } else {
            self.leaf_max_size
        };
        if !(2..=leaf_capacity).contains(&leaf_max_size) {
            return Err(Error::InvalidNodeSize(format!(
                "leaf max size {} not in 2..={}",
                leaf_max_size, leaf_capacity
            )));
        }

        let internal_capacity = internal_page_capacity::<K>();
        let internal_max_size = if self.internal_max_size == 0 {
            internal_capacity
        } else {
            self.internal_max_size
        };
        if !(3..=internal_capacity).contains(&internal_max_size) {
            return Err(Error::InvalidNodeSize(format!(
                "internal max size {} not in 3..={}",
                internal_max_size, internal_capacity
            )));
        }

        let tree = BPlusTree {
            index_name: name,
            bpm,
            root_latch: Mutex::new(INVALID_PAGE_ID),
            leaf_max_size,
            internal_max_size,
            _key: PhantomData,
        };
        tree.register()?;
        Ok(tree)
    }
}

impl Default for BPlusTreeBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A concurrent B+ tree index over buffer pool pages.
///
/// Keys are unique and fixed-width; values are record ids. Readers descend
/// with hand-over-hand read latches; writers crab with write latches,
/// releasing every ancestor above the last node that cannot split or merge.
/// The identity of the root page is guarded by a tree-level latch, and every
/// change of it is mirrored into the header page record for this index.
pub struct BPlusTree<K: IndexKey> {
    index_name: String,
    bpm: Arc<dyn BufferPool>,
    root_latch: Mutex<PageId>,
    leaf_max_size: usize,
    internal_max_size: usize,
    _key: PhantomData<K>,
}

impl<K: IndexKey> BPlusTree<K> {
    pub fn name(&self) -> &str {
        &self.index_name
    }

    pub fn is_empty(&self) -> bool {
        *self.root_latch.lock() == INVALID_PAGE_ID
    }

    /// Looks the index up in the header page, creating the header page and
    /// the record as needed, and adopts the recorded root.
    fn register(&self) -> Result<(), Error> {
        let mut root_guard = self.root_latch.lock();

        let header = match self.bpm.fetch_page(HEADER_PAGE_ID) {
            Some(page) => page,
            None => {
                let (page_id, page) = self
                    .bpm
                    .new_page()
                    .expect("buffer pool exhausted while creating the header page");
                assert_eq!(
                    page_id, HEADER_PAGE_ID,
                    "the header page must be the first page allocated"
                );
                page
            }
        };

        let recorded = {
            let data = header.read();
            HeaderPage::new(&data[..]).get_record(&self.index_name)
        };
        let mut inserted = false;
        let result = match recorded {
            Some(root_page_id) => {
                *root_guard = root_page_id;
                Ok(())
            }
            None => {
                let mut data = header.write();
                inserted =
                    HeaderPage::new(&mut data[..]).insert_record(&self.index_name, INVALID_PAGE_ID);
                if inserted {
                    Ok(())
                } else {
                    Err(Error::RegistryFull)
                }
            }
        };
        drop(root_guard);
        self.bpm.unpin_page(HEADER_PAGE_ID, inserted);
        result
    }

    /// Rewrites this index's header page record. Called with the root latch
    /// held, which serialises all root identity changes.
    fn update_root_record(&self, root_page_id: PageId) {
        let header = self
            .bpm
            .fetch_page(HEADER_PAGE_ID)
            .expect("buffer pool exhausted while updating the header page");
        {
            let mut data = header.write();
            let updated =
                HeaderPage::new(&mut data[..]).update_record(&self.index_name, root_page_id);
            assert!(updated, "index '{}' lost its header record", self.index_name);
        }
        self.bpm.unpin_page(HEADER_PAGE_ID, true);
    }

    /// A node is safe for an operation when the operation cannot propagate a
    /// structural change above it.
    fn is_safe(data: &[u8], op: Operation) -> bool {
        let page = BPlusTreePage::new(data);
        if page.is_root() {
            match op {
                Operation::Insert => page.size() < page.max_size() - 1,
                Operation::Delete => page.size() > 2,
            }
        } else {
            match op {
                Operation::Insert => page.size() < page.max_size() - 1,
                Operation::Delete => page.size() > page.min_size(),
            }
        }
    }

    fn release_root(&self, ctx: &mut Context<'_>) {
        ctx.root_guard.take();
    }

    /// Unlatches and unpins every retained ancestor. Ancestors released here
    /// were never modified, so they unpin clean.
    fn release_write_set(&self, ctx: &mut Context<'_>) {
        while let Some((page, guard)) = ctx.write_set.pop_front() {
            let page_id = page.id();
            drop(guard);
            self.bpm.unpin_page(page_id, false);
        }
    }

    fn release_page(&self, page: &Arc<Page>, guard: PageWriteGuard, is_dirty: bool) {
        let page_id = page.id();
        drop(guard);
        self.bpm.unpin_page(page_id, is_dirty);
    }

    /// Descends to the leaf responsible for `key` with read latches,
    /// hand-over-hand. `None` when the tree is empty.
    fn find_leaf_read(&self, key: Option<&K>) -> Option<(Arc<Page>, PageReadGuard)> {
        let root_guard = self.root_latch.lock();
        let root_page_id = *root_guard;
        if root_page_id == INVALID_PAGE_ID {
            return None;
        }
        let mut page = self
            .bpm
            .fetch_page(root_page_id)
            .expect("buffer pool exhausted during descent");
        let mut guard = page.read_owned();
        drop(root_guard);

        loop {
            let child_page_id = {
                let view = BPlusTreePage::new(&guard[..]);
                if view.is_leaf() {
                    break;
                }
                let internal = InternalPage::<_, K>::new(&guard[..]);
                match key {
                    Some(key) => internal.lookup(key),
                    None => internal.value_at(0),
                }
            };

            let child = self
                .bpm
                .fetch_page(child_page_id)
                .expect("buffer pool exhausted during descent");
            let child_guard = child.read_owned();
            let page_id = page.id();
            drop(guard);
            self.bpm.unpin_page(page_id, false);
            page = child;
            guard = child_guard;
        }
        Some((page, guard))
    }

    /// Descends to the leaf responsible for `key` with write latches,
    /// retaining latched ancestors in `ctx` from the last unsafe node down.
    /// The caller must hold the root latch in `ctx`.
    fn find_leaf_write(
        &self,
        key: &K,
        op: Operation,
        ctx: &mut Context<'_>,
    ) -> (Arc<Page>, PageWriteGuard) {
        let root_page_id = **ctx
            .root_guard
            .as_ref()
            .expect("writing descent requires the root latch");
        let mut page = self
            .bpm
            .fetch_page(root_page_id)
            .expect("buffer pool exhausted during descent");
        let mut guard = page.write_owned();
        if Self::is_safe(&guard[..], op) {
            self.release_root(ctx);
        }

        loop {
            let child_page_id = {
                let view = BPlusTreePage::new(&guard[..]);
                if view.is_leaf() {
                    break;
                }
                InternalPage::<_, K>::new(&guard[..]).lookup(key)
            };

            let child = self
                .bpm
                .fetch_page(child_page_id)
                .expect("buffer pool exhausted during descent");
            let child_guard = child.write_owned();
            ctx.write_set.push_back((page, guard));
            if Self::is_safe(&child_guard[..], op) {
                self.release_root(ctx);
                self.release_write_set(ctx);
            }
            page = child;
            guard = child_guard;
        }
        (page, guard)
    }

    /// Point lookup. `None` when the key is absent or the tree is empty.
    pub fn get_value(&self, key: &K) -> Option<RowID> {
        let (page, guard) = self.find_leaf_read(Some(key))?;
        let result = LeafPage::<_, K>::new(&guard[..]).lookup(key);
        let page_id = page.id();
        drop(guard);
        self.bpm.unpin_page(page_id, false);
        result
    }

    /// Inserts the pair. Keys are unique: inserting a present key changes
    /// nothing and returns false.
    pub fn insert(&self, key: &K, rid: RowID) -> bool {
        let root_guard = self.root_latch.lock();
        if *root_guard == INVALID_PAGE_ID {
            self.start_new_tree(root_guard, key, rid);
            return true;
        }
        let mut ctx = Context::new(root_guard);
        self.insert_into_leaf(key, rid, &mut ctx)
    }

    fn start_new_tree(&self, mut root_guard: MutexGuard<'_, PageId>, key: &K, rid: RowID) {
        let (page_id, page) = self.bpm.new_page().expect("out of memory");
        {
            let mut data = page.write();
            let mut leaf = LeafPage::<_, K>::new(&mut data[..]);
            leaf.init(page_id, INVALID_PAGE_ID, self.leaf_max_size);
            leaf.insert(key, rid);
        }
        *root_guard = page_id;
        self.update_root_record(page_id);
        debug!("started new tree '{}' at page {}", self.index_name, page_id);
        drop(root_guard);
        self.bpm.unpin_page(page_id, true);
    }

    fn insert_into_leaf(&self, key: &K, rid: RowID, ctx: &mut Context<'_>) -> bool {
        let (page, mut guard) = self.find_leaf_write(key, Operation::Insert, ctx);

        let (old_size, new_size) = {
            let mut leaf = LeafPage::<_, K>::new(&mut guard[..]);
            (leaf.size(), leaf.insert(key, rid))
        };
        if new_size == old_size {
            // duplicate key
            self.release_root(ctx);
            self.release_write_set(ctx);
            self.release_page(&page, guard, false);
            return false;
        }
        if new_size < self.leaf_max_size {
            self.release_root(ctx);
            self.release_write_set(ctx);
            self.release_page(&page, guard, true);
            return true;
        }

        // The leaf is full: split it and push the new separator upwards.
        let (new_page_id, new_page) = self.bpm.new_page().expect("out of memory");
        let mut new_guard = new_page.write_owned();
        let (split_key, leaf_was_root) = {
            let mut leaf = LeafPage::<_, K>::new(&mut guard[..]);
            let mut new_leaf = LeafPage::<_, K>::new(&mut new_guard[..]);
            new_leaf.init(new_page_id, leaf.parent_page_id(), self.leaf_max_size);
            leaf.move_half_to(&mut new_leaf);
            new_leaf.set_next_page_id(leaf.next_page_id());
            leaf.set_next_page_id(new_page_id);
            (new_leaf.key_at(0), leaf.parent_page_id() == INVALID_PAGE_ID)
        };
        debug!(
            "split leaf {} into {} at key {:?}",
            page.id(),
            new_page_id,
            split_key
        );

        // Both halves are final; the ancestors stay latched through the
        // parent linkage, so the halves can be released before it.
        let page_id = page.id();
        self.release_page(&page, guard, true);
        self.release_page(&new_page, new_guard, true);
        self.insert_into_parent(page_id, leaf_was_root, split_key, new_page_id, ctx);
        true
    }

    /// Links a freshly split-off page into the tree: inserts the separator
    /// into the parent, splitting upwards as long as parents overflow.
    fn insert_into_parent(
        &self,
        mut old_page_id: PageId,
        mut old_was_root: bool,
        mut key: K,
        mut new_page_id: PageId,
        ctx: &mut Context<'_>,
    ) {
        loop {
            if old_was_root {
                // The split reached the root: grow the tree by one level.
                let (root_page_id, root_page) = self.bpm.new_page().expect("out of memory");
                {
                    let mut data = root_page.write();
                    let mut root = InternalPage::<_, K>::new(&mut data[..]);
                    root.init(root_page_id, INVALID_PAGE_ID, self.internal_max_size);
                    root.populate_new_root(old_page_id, &key, new_page_id);
                }
                self.bpm.unpin_page(root_page_id, true);
                self.reparent(old_page_id, root_page_id);
                self.reparent(new_page_id, root_page_id);

                let root_guard = ctx
                    .root_guard
                    .as_mut()
                    .expect("a root split must still hold the root latch");
                **root_guard = root_page_id;
                self.update_root_record(root_page_id);
                debug!("tree '{}' grew a new root {}", self.index_name, root_page_id);

                self.release_root(ctx);
                self.release_write_set(ctx);
                return;
            }

            let (parent_page, mut parent_guard) = ctx
                .write_set
                .pop_back()
                .expect("an unsafe split must retain its parent");
            let new_size = {
                let mut parent = InternalPage::<_, K>::new(&mut parent_guard[..]);
                parent.insert_node_after(old_page_id, &key, new_page_id)
            };
            if new_size < self.internal_max_size {
                self.release_root(ctx);
                self.release_page(&parent_page, parent_guard, true);
                self.release_write_set(ctx);
                return;
            }

            // The parent overflowed in turn: split it and keep climbing.
            let (sibling_page_id, sibling_page) = self.bpm.new_page().expect("out of memory");
            let mut sibling_guard = sibling_page.write_owned();
            let (promoted_key, parent_was_root, moved_children) = {
                let mut parent = InternalPage::<_, K>::new(&mut parent_guard[..]);
                let mut sibling = InternalPage::<_, K>::new(&mut sibling_guard[..]);
                sibling.init(
                    sibling_page_id,
                    parent.parent_page_id(),
                    self.internal_max_size,
                );
                parent.move_half_to(&mut sibling);
                let moved = (0..sibling.size())
                    .map(|index| sibling.value_at(index))
                    .collect::<Vec<_>>();
                (
                    sibling.key_at(0),
                    parent.parent_page_id() == INVALID_PAGE_ID,
                    moved,
                )
            };
            let parent_page_id = parent_page.id();
            debug!(
                "split internal {} into {} promoting {:?}",
                parent_page_id, sibling_page_id, promoted_key
            );
            self.release_page(&parent_page, parent_guard, true);
            self.release_page(&sibling_page, sibling_guard, true);
            for child_page_id in moved_children {
                self.reparent(child_page_id, sibling_page_id);
            }

            old_page_id = parent_page_id;
            old_was_root = parent_was_root;
            key = promoted_key;
            new_page_id = sibling_page_id;
        }
    }

    /// Rewrites one page's parent pointer. Callers guarantee the page is not
    /// write-latched by this thread.
    fn reparent(&self, page_id: PageId, parent_page_id: PageId) {
        let page = self
            .bpm
            .fetch_page(page_id)
            .expect("buffer pool exhausted while re-parenting");
        {
            let mut data = page.write();
            BPlusTreePage::new(&mut data[..]).set_parent_page_id(parent_page_id);
        }
        self.bpm.unpin_page(page_id, true);
    }

    /// Removes the key if present. Removing an absent key is a no-op.
    pub fn remove(&self, key: &K) {
        let root_guard = self.root_latch.lock();
        if *root_guard == INVALID_PAGE_ID {
            return;
        }
        let mut ctx = Context::new(root_guard);
        let (page, mut guard) = self.find_leaf_write(key, Operation::Delete, &mut ctx);

        let (old_size, new_size) = {
            let mut leaf = LeafPage::<_, K>::new(&mut guard[..]);
            (leaf.size(), leaf.remove(key))
        };
        if new_size == old_size {
            // key not present
            self.release_root(&mut ctx);
            self.release_write_set(&mut ctx);
            self.release_page(&page, guard, false);
            return;
        }

        self.coalesce_or_redistribute((page, guard), &mut ctx);

        for page_id in std::mem::take(&mut ctx.deleted_page_set) {
            self.bpm.delete_page(page_id);
        }
    }

    /// Walks from an underflowing node towards the root, merging with or
    /// borrowing from a sibling at each level. Owns and fully releases the
    /// node guard it is handed; on return every latch and pin taken by the
    /// descent is released.
    fn coalesce_or_redistribute(&self, node: (Arc<Page>, PageWriteGuard), ctx: &mut Context<'_>) {
        let (mut page, mut guard) = node;
        loop {
            let (is_root, is_leaf, size, min_size) = {
                let view = BPlusTreePage::new(&guard[..]);
                (view.is_root(), view.is_leaf(), view.size(), view.min_size())
            };

            if is_root {
                self.adjust_root(&page, &mut guard, ctx);
                self.release_page(&page, guard, true);
                self.release_root(ctx);
                self.release_write_set(ctx);
                return;
            }
            if size >= min_size {
                self.release_page(&page, guard, true);
                self.release_root(ctx);
                self.release_write_set(ctx);
                return;
            }

            let (parent_page, mut parent_guard) = ctx
                .write_set
                .pop_back()
                .expect("an underflowing node must retain its parent");
            let (index, sibling_page_id) = {
                let parent = InternalPage::<_, K>::new(&parent_guard[..]);
                let index = parent
                    .value_index(page.id())
                    .expect("node must be present in its parent");
                // Prefer the left sibling; the leftmost child pairs with its
                // right neighbour.
                let sibling_index = if index == 0 { 1 } else { index - 1 };
                (index, parent.value_at(sibling_index))
            };
            let sibling_page = self
                .bpm
                .fetch_page(sibling_page_id)
                .expect("buffer pool exhausted while rebalancing");
            let mut sibling_guard = sibling_page.write_owned();
            let sibling_size = BPlusTreePage::new(&sibling_guard[..]).size();
            let max_size = if is_leaf {
                self.leaf_max_size
            } else {
                self.internal_max_size
            };

            if size + sibling_size >= max_size {
                // Enough entries for two nodes: rotate one across.
                self.redistribute(
                    (&page, &mut guard),
                    (&sibling_page, &mut sibling_guard),
                    &mut parent_guard,
                    index,
                    is_leaf,
                );
                self.release_page(&page, guard, true);
                self.release_page(&sibling_page, sibling_guard, true);
                self.release_page(&parent_page, parent_guard, true);
                self.release_root(ctx);
                self.release_write_set(ctx);
                return;
            }

            // Merge: the right participant empties into the left one and is
            // deleted; the parent loses the separator and may underflow.
            let key_index = if index == 0 { 1 } else { index };
            let middle_key = InternalPage::<_, K>::new(&parent_guard[..]).key_at(key_index);
            {
                // victim = right participant, recipient = left participant
                let (victim_guard, recipient_guard) = if index == 0 {
                    (&mut sibling_guard, &mut guard)
                } else {
                    (&mut guard, &mut sibling_guard)
                };
                if is_leaf {
                    let mut victim = LeafPage::<_, K>::new(&mut victim_guard[..]);
                    let mut recipient = LeafPage::<_, K>::new(&mut recipient_guard[..]);
                    victim.move_all_to(&mut recipient);
                    recipient.set_next_page_id(victim.next_page_id());
                } else {
                    let mut victim = InternalPage::<_, K>::new(&mut victim_guard[..]);
                    let mut recipient = InternalPage::<_, K>::new(&mut recipient_guard[..]);
                    victim.move_all_to(&mut recipient, &middle_key);
                }
            }
            let (victim_page_id, recipient_page_id, moved) = if index == 0 {
                let recipient = BPlusTreePage::new(&guard[..]);
                (sibling_page.id(), page.id(), recipient.size())
            } else {
                let recipient = BPlusTreePage::new(&sibling_guard[..]);
                (page.id(), sibling_page.id(), recipient.size())
            };
            {
                let mut parent = InternalPage::<_, K>::new(&mut parent_guard[..]);
                parent.remove(key_index);
            }
            ctx.deleted_page_set.push(victim_page_id);
            debug!("merged page {} into {}", victim_page_id, recipient_page_id);

            // Content below this level is final; release it before touching
            // the moved children and the level above.
            let moved_children = if is_leaf {
                Vec::new()
            } else {
                let (recipient_guard, old_recipient_size) = if index == 0 {
                    (&guard, moved - sibling_size)
                } else {
                    (&sibling_guard, moved - size)
                };
                let recipient = InternalPage::<_, K>::new(&recipient_guard[..]);
                (old_recipient_size..recipient.size())
                    .map(|i| recipient.value_at(i))
                    .collect::<Vec<_>>()
            };
            self.release_page(&page, guard, true);
            self.release_page(&sibling_page, sibling_guard, true);
            for child_page_id in moved_children {
                self.reparent(child_page_id, recipient_page_id);
            }

            page = parent_page;
            guard = parent_guard;
        }
    }

    /// Rotates one entry across the parent separator between `node` and its
    /// sibling. `index` is the node's position in the parent.
    fn redistribute(
        &self,
        node: (&Arc<Page>, &mut PageWriteGuard),
        sibling: (&Arc<Page>, &mut PageWriteGuard),
        parent_guard: &mut PageWriteGuard,
        index: usize,
        is_leaf: bool,
    ) {
        let (node_page, node_guard) = node;
        let (_sibling_page, sibling_guard) = sibling;

        if is_leaf {
            let mut node = LeafPage::<_, K>::new(&mut node_guard[..]);
            let mut sibling = LeafPage::<_, K>::new(&mut sibling_guard[..]);
            let mut parent = InternalPage::<_, K>::new(&mut parent_guard[..]);
            if index == 0 {
                // sibling is the right neighbour
                sibling.move_first_to_end_of(&mut node);
                parent.set_key_at(1, &sibling.key_at(0));
            } else {
                sibling.move_last_to_front_of(&mut node);
                parent.set_key_at(index, &node.key_at(0));
            }
            return;
        }

        let moved_child = {
            let mut node = InternalPage::<_, K>::new(&mut node_guard[..]);
            let mut sibling = InternalPage::<_, K>::new(&mut sibling_guard[..]);
            let mut parent = InternalPage::<_, K>::new(&mut parent_guard[..]);
            if index == 0 {
                let middle_key = parent.key_at(1);
                sibling.move_first_to_end_of(&mut node, &middle_key);
                parent.set_key_at(1, &sibling.key_at(0));
                node.value_at(node.size() - 1)
            } else {
                let middle_key = parent.key_at(index);
                sibling.move_last_to_front_of(&mut node, &middle_key);
                parent.set_key_at(index, &node.key_at(0));
                node.value_at(0)
            }
        };
        self.reparent(moved_child, node_page.id());
    }

    /// Shrinks the tree at the root: an internal root left with one child
    /// promotes that child, an emptied leaf root leaves the tree empty. The
    /// old root is scheduled for deletion in either case.
    fn adjust_root(&self, page: &Arc<Page>, guard: &mut PageWriteGuard, ctx: &mut Context<'_>) {
        let (is_leaf, size) = {
            let view = BPlusTreePage::new(&guard[..]);
            (view.is_leaf(), view.size())
        };

        if !is_leaf && size == 1 {
            let child_page_id =
                InternalPage::<_, K>::new(&mut guard[..]).remove_and_return_only_child();
            let root_guard = ctx
                .root_guard
                .as_mut()
                .expect("a root change must hold the root latch");
            **root_guard = child_page_id;
            self.update_root_record(child_page_id);
            self.reparent(child_page_id, INVALID_PAGE_ID);
            ctx.deleted_page_set.push(page.id());
            debug!(
                "tree '{}' dropped a level, new root {}",
                self.index_name, child_page_id
            );
        } else if is_leaf && size == 0 {
            let root_guard = ctx
                .root_guard
                .as_mut()
                .expect("a root change must hold the root latch");
            **root_guard = INVALID_PAGE_ID;
            self.update_root_record(INVALID_PAGE_ID);
            ctx.deleted_page_set.push(page.id());
            debug!("tree '{}' is now empty", self.index_name);
        }
    }

    /// Iterator over every pair in key order, starting at the leftmost leaf.
    pub fn iter(&self) -> IndexIterator<K> {
        match self.find_leaf_read(None) {
            Some((page, guard)) => IndexIterator::new(Arc::clone(&self.bpm), page, guard, 0),
            None => IndexIterator::empty(Arc::clone(&self.bpm)),
        }
    }

    /// Iterator starting at the first pair whose key is >= `key`.
    pub fn iter_from(&self, key: &K) -> IndexIterator<K> {
        match self.find_leaf_read(Some(key)) {
            Some((page, guard)) => {
                let index = LeafPage::<_, K>::new(&guard[..]).key_index(key);
                IndexIterator::new(Arc::clone(&self.bpm), page, guard, index)
            }
            None => IndexIterator::empty(Arc::clone(&self.bpm)),
        }
    }
}

#[cfg(test)]
impl<K: IndexKey> BPlusTree<K> {
    /// Walks the whole tree and asserts its structural invariants: ordered
    /// keys within separator bounds, size bounds, uniform leaf depth,
    /// consistent parent pointers and an ordered, complete leaf chain.
    pub(crate) fn verify_integrity(&self) {
        let root_page_id = *self.root_latch.lock();
        if root_page_id == INVALID_PAGE_ID {
            return;
        }

        let mut leaves = Vec::new();
        self.verify_node(root_page_id, INVALID_PAGE_ID, None, None, &mut leaves);

        // The leaf chain must visit exactly the leaves found by descent, in
        // order, with globally ascending keys.
        let mut chained = Vec::new();
        let mut keys = Vec::new();
        let mut next = leaves.first().copied().unwrap_or(INVALID_PAGE_ID);
        while next != INVALID_PAGE_ID {
            let page = self.bpm.fetch_page(next).expect("leaf chain fetch failed");
            let data = page.read();
            let leaf = LeafPage::<_, K>::new(&data[..]);
            chained.push(next);
            for i in 0..leaf.size() {
                keys.push(leaf.key_at(i));
            }
            let following = leaf.next_page_id();
            drop(data);
            self.bpm.unpin_page(next, false);
            next = following;
        }
        assert_eq!(chained, leaves, "leaf chain disagrees with tree descent");
        assert!(
            keys.windows(2).all(|pair| pair[0] < pair[1]),
            "leaf chain keys out of order"
        );
    }

    fn verify_node(
        &self,
        page_id: PageId,
        expected_parent: PageId,
        lower: Option<K>,
        upper: Option<K>,
        leaves: &mut Vec<PageId>,
    ) -> usize {
        let page = self.bpm.fetch_page(page_id).expect("verify fetch failed");
        let data = page.read();
        let view = BPlusTreePage::new(&data[..]);
        assert_eq!(view.page_id(), page_id, "page {} header id mismatch", page_id);
        assert_eq!(
            view.parent_page_id(),
            expected_parent,
            "page {} parent pointer mismatch",
            page_id
        );
        let is_root = expected_parent == INVALID_PAGE_ID;
        let depth;

        if view.is_leaf() {
            let leaf = LeafPage::<_, K>::new(&data[..]);
            if is_root {
                assert!(leaf.size() >= 1, "empty leaf root should not exist");
            } else {
                assert!(
                    (leaf.min_size()..leaf.max_size()).contains(&leaf.size()),
                    "leaf {} size {} out of bounds",
                    page_id,
                    leaf.size()
                );
            }
            for i in 0..leaf.size() {
                let key = leaf.key_at(i);
                if i > 0 {
                    assert!(leaf.key_at(i - 1) < key, "leaf {} keys out of order", page_id);
                }
                if let Some(lower) = lower {
                    assert!(lower <= key, "leaf {} key below separator", page_id);
                }
                if let Some(upper) = upper {
                    assert!(key < upper, "leaf {} key above separator", page_id);
                }
            }
            leaves.push(page_id);
            depth = 0;
        } else {
            let node = InternalPage::<_, K>::new(&data[..]);
            if is_root {
                assert!(node.size() >= 2, "internal root {} too small", page_id);
            } else {
                assert!(
                    (node.min_size()..node.max_size()).contains(&node.size()),
                    "internal {} size {} out of bounds",
                    page_id,
                    node.size()
                );
            }
            for i in 2..node.size() {
                assert!(
                    node.key_at(i - 1) < node.key_at(i),
                    "internal {} separators out of order",
                    page_id
                );
            }
            let mut child_depth = None;
            for i in 0..node.size() {
                let child_lower = if i == 0 { lower } else { Some(node.key_at(i)) };
                let child_upper = if i + 1 < node.size() {
                    Some(node.key_at(i + 1))
                } else {
                    upper
                };
                let d = self.verify_node(node.value_at(i), page_id, child_lower, child_upper, leaves);
                match child_depth {
                    None => child_depth = Some(d),
                    Some(expected) => {
                        assert_eq!(expected, d, "internal {} children at uneven depth", page_id)
                    }
                }
            }
            depth = child_depth.unwrap() + 1;
        }

        drop(data);
        self.bpm.unpin_page(page_id, false);
        depth
    }

    pub(crate) fn height(&self) -> usize {
        let root_page_id = *self.root_latch.lock();
        if root_page_id == INVALID_PAGE_ID {
            return 0;
        }
        let mut leaves = Vec::new();
        self.verify_node(root_page_id, INVALID_PAGE_ID, None, None, &mut leaves) + 1
    }

    pub(crate) fn root_page_id(&self) -> PageId {
        *self.root_latch.lock()
    }
}
