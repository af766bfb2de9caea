use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use byteorder::{ByteOrder, LittleEndian};

use crate::index::key::IndexKey;

use super::b_plus_tree_page as header;
use super::page::PageId;
use super::page_layout::{INTERNAL_HEADER_SIZE, PAGE_SIZE, PAGE_TYPE_INTERNAL, PTR_SIZE};

/// Typed view over an internal page: routing keys plus child page ids in
/// key-sorted order. The key at index 0 is a dummy that lookup ignores;
/// `size` counts pairs, which equals the number of children.
///
///  ------------------------------------------------------------
/// | COMMON HEADER | KEY(0) CHILD(0) | KEY(1) CHILD(1) | ...   |
///  ------------------------------------------------------------
pub struct InternalPage<D, K> {
    data: D,
    _key: PhantomData<K>,
}

/// Number of children an internal page can physically hold for a given key
/// width.
pub fn internal_page_capacity<K: IndexKey>() -> usize {
    (PAGE_SIZE - INTERNAL_HEADER_SIZE) / (K::SIZE + PTR_SIZE)
}

impl<D: Deref<Target = [u8]>, K: IndexKey> InternalPage<D, K> {
    pub fn new(data: D) -> Self {
        Self {
            data,
            _key: PhantomData,
        }
    }

    pub fn size(&self) -> usize {
        header::size(&self.data)
    }

    pub fn max_size(&self) -> usize {
        header::max_size(&self.data)
    }

    pub fn min_size(&self) -> usize {
        header::max_size(&self.data) / 2
    }

    pub fn parent_page_id(&self) -> PageId {
        header::parent_page_id(&self.data)
    }

    pub fn page_id(&self) -> PageId {
        header::page_id(&self.data)
    }

    fn pair_offset(index: usize) -> usize {
        INTERNAL_HEADER_SIZE + index * (K::SIZE + PTR_SIZE)
    }

    pub fn key_at(&self, index: usize) -> K {
        K::read_from(&self.data[Self::pair_offset(index)..])
    }

    pub fn value_at(&self, index: usize) -> PageId {
        LittleEndian::read_i32(&self.data[Self::pair_offset(index) + K::SIZE..])
    }

    /// Index of the child entry holding `value`, if any.
    pub fn value_index(&self, value: PageId) -> Option<usize> {
        (0..self.size()).find(|&i| self.value_at(i) == value)
    }

    /// Child page id for the subtree that contains `key`: the child left of
    /// the first routing key greater than `key`. The dummy key at index 0 is
    /// skipped.
    pub fn lookup(&self, key: &K) -> PageId {
        let mut lo = 1;
        let mut hi = self.size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid) > *key {
                hi = mid;
            } else {
                lo = mid + 1;
            }
        }
        self.value_at(lo - 1)
    }
}

impl<D: DerefMut<Target = [u8]>, K: IndexKey> InternalPage<D, K> {
    pub fn init(&mut self, page_id: PageId, parent_id: PageId, max_size: usize) {
        header::set_page_type(&mut self.data, PAGE_TYPE_INTERNAL);
        header::set_page_id(&mut self.data, page_id);
        header::set_parent_page_id(&mut self.data, parent_id);
        header::set_size(&mut self.data, 0);
        header::set_max_size(&mut self.data, max_size);
    }

    pub fn set_size(&mut self, size: usize) {
        header::set_size(&mut self.data, size);
    }

    pub fn set_parent_page_id(&mut self, parent_id: PageId) {
        header::set_parent_page_id(&mut self.data, parent_id);
    }

    pub fn set_key_at(&mut self, index: usize, key: &K) {
        key.write_to(&mut self.data[Self::pair_offset(index)..]);
    }

    fn set_value_at(&mut self, index: usize, value: PageId) {
        LittleEndian::write_i32(&mut self.data[Self::pair_offset(index) + K::SIZE..], value);
    }

    fn shift_right_from(&mut self, index: usize) {
        let pair = K::SIZE + PTR_SIZE;
        let start = Self::pair_offset(index);
        let end = Self::pair_offset(self.size());
        self.data.copy_within(start..end, start + pair);
    }

    fn shift_left_onto(&mut self, index: usize) {
        let pair = K::SIZE + PTR_SIZE;
        let start = Self::pair_offset(index + 1);
        let end = Self::pair_offset(self.size());
        self.data.copy_within(start..end, start - pair);
    }

    /// Sets up a freshly created root after the old root split: children
    /// `old` and `new` separated by `key`.
    pub fn populate_new_root(&mut self, old: PageId, key: &K, new: PageId) {
        self.set_value_at(0, old);
        self.set_key_at(1, key);
        self.set_value_at(1, new);
        self.set_size(2);
    }

    /// Inserts (key, new) immediately after the entry whose child is `old`.
    /// Returns the new size.
    pub fn insert_node_after(&mut self, old: PageId, key: &K, new: PageId) -> usize {
        let index = self
            .value_index(old)
            .expect("split child must be present in its parent")
            + 1;
        self.shift_right_from(index);
        self.set_key_at(index, key);
        self.set_value_at(index, new);
        let size = self.size() + 1;
        self.set_size(size);
        size
    }

    /// Removes the entry at `index`, keeping the array dense.
    pub fn remove(&mut self, index: usize) {
        self.shift_left_onto(index);
        let size = self.size();
        self.set_size(size - 1);
    }

    /// Collapses a one-child root: drops the entry and hands back the only
    /// child.
    pub fn remove_and_return_only_child(&mut self) -> PageId {
        let child = self.value_at(0);
        self.set_size(0);
        child
    }

    /// Moves the upper half of the entries to an (empty) recipient. The
    /// caller re-parents the moved children and promotes the recipient's
    /// key 0.
    pub fn move_half_to<E: DerefMut<Target = [u8]>>(&mut self, recipient: &mut InternalPage<E, K>) {
        let size = self.size();
        let start = self.min_size();
        let moved = size - start;
        let src = Self::pair_offset(start)..Self::pair_offset(size);
        recipient.data[Self::pair_offset(0)..Self::pair_offset(moved)]
            .copy_from_slice(&self.data[src]);
        recipient.set_size(moved);
        self.set_size(start);
    }

    /// Appends every entry to the recipient (the left sibling), pulling the
    /// parent separator down as this page's key 0. The caller re-parents the
    /// moved children.
    pub fn move_all_to<E: DerefMut<Target = [u8]>>(
        &mut self,
        recipient: &mut InternalPage<E, K>,
        middle_key: &K,
    ) {
        self.set_key_at(0, middle_key);
        let size = self.size();
        let recipient_size = recipient.size();
        let src = Self::pair_offset(0)..Self::pair_offset(size);
        recipient.data[Self::pair_offset(recipient_size)..Self::pair_offset(recipient_size + size)]
            .copy_from_slice(&self.data[src]);
        recipient.set_size(recipient_size + size);
        self.set_size(0);
    }

    /// Moves the first entry to the end of the recipient (the left sibling),
    /// rotating the parent separator through it. The caller re-parents the
    /// moved child.
    pub fn move_first_to_end_of<E: DerefMut<Target = [u8]>>(
        &mut self,
        recipient: &mut InternalPage<E, K>,
        middle_key: &K,
    ) {
        self.set_key_at(0, middle_key);
        let key = self.key_at(0);
        let child = self.value_at(0);
        let recipient_size = recipient.size();
        recipient.set_key_at(recipient_size, &key);
        recipient.set_value_at(recipient_size, child);
        recipient.set_size(recipient_size + 1);
        self.remove(0);
    }

    /// Moves the last entry to the front of the recipient (the right
    /// sibling); the old dummy key of the recipient becomes the parent
    /// separator. The caller re-parents the moved child.
    pub fn move_last_to_front_of<E: DerefMut<Target = [u8]>>(
        &mut self,
        recipient: &mut InternalPage<E, K>,
        middle_key: &K,
    ) {
        recipient.set_key_at(0, middle_key);
        let index = self.size() - 1;
        let key = self.key_at(index);
        let child = self.value_at(index);
        recipient.shift_right_from(0);
        recipient.set_key_at(0, &key);
        recipient.set_value_at(0, child);
        let recipient_size = recipient.size();
        recipient.set_size(recipient_size + 1);
        self.set_size(index);
    }
}
