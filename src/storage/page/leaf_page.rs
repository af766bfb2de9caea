use std::marker::PhantomData;
use std::ops::{Deref, DerefMut};

use byteorder::{ByteOrder, LittleEndian};

use crate::index::key::{IndexKey, RowID};

use super::b_plus_tree_page as header;
use super::page::{PageId, INVALID_PAGE_ID};
use super::page_layout::{LEAF_HEADER_SIZE, NEXT_PAGE_ID_OFFSET, PAGE_SIZE, PAGE_TYPE_LEAF, RID_SIZE};

/// Typed view over a leaf page: a sorted array of (key, rid) pairs plus the
/// forward pointer of the leaf linked list. Keys are unique.
///
///  ----------------------------------------------------------
/// | COMMON HEADER | NextPageId | KEY(0) RID(0) | KEY(1) ... |
///  ----------------------------------------------------------
pub struct LeafPage<D, K> {
    data: D,
    _key: PhantomData<K>,
}

/// Number of pairs a leaf page can physically hold for a given key width.
pub fn leaf_page_capacity<K: IndexKey>() -> usize {
    (PAGE_SIZE - LEAF_HEADER_SIZE) / (K::SIZE + RID_SIZE)
}

impl<D: Deref<Target = [u8]>, K: IndexKey> LeafPage<D, K> {
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

    pub fn next_page_id(&self) -> PageId {
        LittleEndian::read_i32(&self.data[NEXT_PAGE_ID_OFFSET..])
    }

    fn pair_offset(index: usize) -> usize {
        LEAF_HEADER_SIZE + index * (K::SIZE + RID_SIZE)
    }

    pub fn key_at(&self, index: usize) -> K {
        K::read_from(&self.data[Self::pair_offset(index)..])
    }

    pub fn rid_at(&self, index: usize) -> RowID {
        RowID::read_from(&self.data[Self::pair_offset(index) + K::SIZE..])
    }

    pub fn item(&self, index: usize) -> (K, RowID) {
        (self.key_at(index), self.rid_at(index))
    }

    /// Index of the first pair whose key is >= `key`; `size()` if none is.
    pub fn key_index(&self, key: &K) -> usize {
        let mut lo = 0;
        let mut hi = self.size();
        while lo < hi {
            let mid = lo + (hi - lo) / 2;
            if self.key_at(mid) < *key {
                lo = mid + 1;
            } else {
                hi = mid;
            }
        }
        lo
    }

    pub fn lookup(&self, key: &K) -> Option<RowID> {
        let index = self.key_index(key);
        if index < self.size() && self.key_at(index) == *key {
            Some(self.rid_at(index))
        } else {
            None
        }
    }
}

impl<D: DerefMut<Target = [u8]>, K: IndexKey> LeafPage<D, K> {
    pub fn init(&mut self, page_id: PageId, parent_id: PageId, max_size: usize) {
        header::set_page_type(&mut self.data, PAGE_TYPE_LEAF);
        header::set_page_id(&mut self.data, page_id);
        header::set_parent_page_id(&mut self.data, parent_id);
        header::set_size(&mut self.data, 0);
        header::set_max_size(&mut self.data, max_size);
        self.set_next_page_id(INVALID_PAGE_ID);
    }

    pub fn set_size(&mut self, size: usize) {
        header::set_size(&mut self.data, size);
    }

    pub fn set_parent_page_id(&mut self, parent_id: PageId) {
        header::set_parent_page_id(&mut self.data, parent_id);
    }

    pub fn set_next_page_id(&mut self, next_page_id: PageId) {
        LittleEndian::write_i32(&mut self.data[NEXT_PAGE_ID_OFFSET..], next_page_id);
    }

    fn write_pair(&mut self, index: usize, key: &K, rid: RowID) {
        let offset = Self::pair_offset(index);
        key.write_to(&mut self.data[offset..]);
        rid.write_to(&mut self.data[offset + K::SIZE..]);
    }

    /// Shifts pairs [index, size) one slot towards the end.
    fn shift_right_from(&mut self, index: usize) {
        let pair = K::SIZE + RID_SIZE;
        let start = Self::pair_offset(index);
        let end = Self::pair_offset(self.size());
        self.data.copy_within(start..end, start + pair);
    }

    /// Shifts pairs [index + 1, size) one slot towards the front.
    fn shift_left_onto(&mut self, index: usize) {
        let pair = K::SIZE + RID_SIZE;
        let start = Self::pair_offset(index + 1);
        let end = Self::pair_offset(self.size());
        self.data.copy_within(start..end, start - pair);
    }

    /// Inserts the pair keeping the array sorted. Returns the new size; an
    /// already-present key leaves the page untouched and the size unchanged.
    pub fn insert(&mut self, key: &K, rid: RowID) -> usize {
        let index = self.key_index(key);
        let size = self.size();
        if index < size && self.key_at(index) == *key {
            return size;
        }
        self.shift_right_from(index);
        self.write_pair(index, key, rid);
        self.set_size(size + 1);
        size + 1
    }

    /// Removes the pair for `key` if present. Returns the new size; an
    /// absent key leaves the size unchanged.
    pub fn remove(&mut self, key: &K) -> usize {
        let index = self.key_index(key);
        let size = self.size();
        if index >= size || self.key_at(index) != *key {
            return size;
        }
        self.shift_left_onto(index);
        self.set_size(size - 1);
        size - 1
    }

    /// Moves the upper half of this page's pairs to an (empty) recipient.
    /// The leaf chain is spliced by the caller.
    pub fn move_half_to<E: DerefMut<Target = [u8]>>(&mut self, recipient: &mut LeafPage<E, K>) {
        let size = self.size();
        let start = self.min_size();
        let moved = size - start;
        let src = Self::pair_offset(start)..Self::pair_offset(size);
        recipient.data[Self::pair_offset(0)..Self::pair_offset(moved)]
            .copy_from_slice(&self.data[src]);
        recipient.set_size(moved);
        self.set_size(start);
    }

    /// Appends every pair of this page to the recipient, emptying this page.
    pub fn move_all_to<E: DerefMut<Target = [u8]>>(&mut self, recipient: &mut LeafPage<E, K>) {
        let size = self.size();
        let recipient_size = recipient.size();
        let src = Self::pair_offset(0)..Self::pair_offset(size);
        recipient.data[Self::pair_offset(recipient_size)..Self::pair_offset(recipient_size + size)]
            .copy_from_slice(&self.data[src]);
        recipient.set_size(recipient_size + size);
        self.set_size(0);
    }

    /// Moves this page's first pair to the end of the recipient (its left
    /// sibling).
    pub fn move_first_to_end_of<E: DerefMut<Target = [u8]>>(
        &mut self,
        recipient: &mut LeafPage<E, K>,
    ) {
        let (key, rid) = self.item(0);
        recipient.write_pair(recipient.size(), &key, rid);
        let recipient_size = recipient.size();
        recipient.set_size(recipient_size + 1);
        self.shift_left_onto(0);
        let size = self.size();
        self.set_size(size - 1);
    }

    /// Moves this page's last pair to the front of the recipient (its right
    /// sibling).
    pub fn move_last_to_front_of<E: DerefMut<Target = [u8]>>(
        &mut self,
        recipient: &mut LeafPage<E, K>,
    ) {
        let (key, rid) = self.item(self.size() - 1);
        recipient.shift_right_from(0);
        recipient.write_pair(0, &key, rid);
        let recipient_size = recipient.size();
        recipient.set_size(recipient_size + 1);
        let size = self.size();
        self.set_size(size - 1);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn leaf_buf() -> Vec<u8> {
        vec![0u8; PAGE_SIZE]
    }

    #[test]
    fn insert_keeps_pairs_sorted_and_unique() {
        let mut buf = leaf_buf();
        let mut leaf = LeafPage::<_, i64>::new(&mut buf[..]);
        leaf.init(3, INVALID_PAGE_ID, 8);

        for key in [5i64, 1, 9, 3] {
            leaf.insert(&key, RowID::new(0, key as u32));
        }
        assert_eq!(leaf.size(), 4);
        assert_eq!(leaf.key_at(0), 1);
        assert_eq!(leaf.key_at(3), 9);

        // duplicate is refused
        assert_eq!(leaf.insert(&5, RowID::new(0, 99)), 4);
        assert_eq!(leaf.lookup(&5), Some(RowID::new(0, 5)));
        assert_eq!(leaf.lookup(&4), None);
    }

    #[test]
    fn remove_compacts_the_array() {
        let mut buf = leaf_buf();
        let mut leaf = LeafPage::<_, i64>::new(&mut buf[..]);
        leaf.init(3, INVALID_PAGE_ID, 8);
        for key in 1..=5i64 {
            leaf.insert(&key, RowID::new(0, key as u32));
        }

        assert_eq!(leaf.remove(&3), 4);
        assert_eq!(leaf.remove(&3), 4);
        assert_eq!(leaf.lookup(&3), None);
        assert_eq!(leaf.key_at(2), 4);
    }

    #[test]
    fn move_half_splits_around_the_middle() {
        let mut left_buf = leaf_buf();
        let mut right_buf = leaf_buf();
        let mut left = LeafPage::<_, i64>::new(&mut left_buf[..]);
        left.init(3, INVALID_PAGE_ID, 4);
        for key in 1..=4i64 {
            left.insert(&key, RowID::new(0, key as u32));
        }

        let mut right = LeafPage::<_, i64>::new(&mut right_buf[..]);
        right.init(7, INVALID_PAGE_ID, 4);
        left.move_half_to(&mut right);

        assert_eq!(left.size(), 2);
        assert_eq!(right.size(), 2);
        assert_eq!(right.key_at(0), 3);
    }

    #[test]
    fn redistribution_moves_one_pair_across() {
        let mut left_buf = leaf_buf();
        let mut right_buf = leaf_buf();
        let mut left = LeafPage::<_, i64>::new(&mut left_buf[..]);
        let mut right = LeafPage::<_, i64>::new(&mut right_buf[..]);
        left.init(3, INVALID_PAGE_ID, 6);
        right.init(7, INVALID_PAGE_ID, 6);
        for key in [1i64, 2, 3] {
            left.insert(&key, RowID::new(0, key as u32));
        }
        right.insert(&10, RowID::new(0, 10));

        left.move_last_to_front_of(&mut right);
        assert_eq!(left.size(), 2);
        assert_eq!(right.size(), 2);
        assert_eq!(right.key_at(0), 3);

        right.move_first_to_end_of(&mut left);
        assert_eq!(left.key_at(2), 3);
        assert_eq!(right.key_at(0), 10);
    }
}
