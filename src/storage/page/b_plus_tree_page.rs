use std::ops::{Deref, DerefMut};

use byteorder::{ByteOrder, LittleEndian};

use super::page::{PageId, INVALID_PAGE_ID};
use super::page_layout::{
    CURRENT_SIZE_OFFSET, MAX_SIZE_OFFSET, PAGE_ID_OFFSET, PAGE_TYPE_INTERNAL, PAGE_TYPE_LEAF,
    PAGE_TYPE_OFFSET, PARENT_PAGE_ID_OFFSET,
};

// Raw accessors for the common header shared by leaf and internal pages.
// The typed views delegate here so the layout lives in one place.

pub(crate) fn page_type(data: &[u8]) -> u32 {
    LittleEndian::read_u32(&data[PAGE_TYPE_OFFSET..])
}

pub(crate) fn set_page_type(data: &mut [u8], page_type: u32) {
    LittleEndian::write_u32(&mut data[PAGE_TYPE_OFFSET..], page_type);
}

pub(crate) fn size(data: &[u8]) -> usize {
    LittleEndian::read_u32(&data[CURRENT_SIZE_OFFSET..]) as usize
}

pub(crate) fn set_size(data: &mut [u8], size: usize) {
    LittleEndian::write_u32(&mut data[CURRENT_SIZE_OFFSET..], size as u32);
}

pub(crate) fn max_size(data: &[u8]) -> usize {
    LittleEndian::read_u32(&data[MAX_SIZE_OFFSET..]) as usize
}

pub(crate) fn set_max_size(data: &mut [u8], max_size: usize) {
    LittleEndian::write_u32(&mut data[MAX_SIZE_OFFSET..], max_size as u32);
}

pub(crate) fn parent_page_id(data: &[u8]) -> PageId {
    LittleEndian::read_i32(&data[PARENT_PAGE_ID_OFFSET..])
}

pub(crate) fn set_parent_page_id(data: &mut [u8], parent_id: PageId) {
    LittleEndian::write_i32(&mut data[PARENT_PAGE_ID_OFFSET..], parent_id);
}

pub(crate) fn page_id(data: &[u8]) -> PageId {
    LittleEndian::read_i32(&data[PAGE_ID_OFFSET..])
}

pub(crate) fn set_page_id(data: &mut [u8], page_id: PageId) {
    LittleEndian::write_i32(&mut data[PAGE_ID_OFFSET..], page_id);
}

/// Untyped view over any tree page. Used to sniff a fetched page before
/// deciding whether to treat it as a leaf or an internal node.
pub struct BPlusTreePage<D> {
    data: D,
}

impl<D: Deref<Target = [u8]>> BPlusTreePage<D> {
    pub fn new(data: D) -> Self {
        Self { data }
    }

    pub fn is_leaf(&self) -> bool {
        page_type(&self.data) == PAGE_TYPE_LEAF
    }

    pub fn is_internal(&self) -> bool {
        page_type(&self.data) == PAGE_TYPE_INTERNAL
    }

    pub fn is_root(&self) -> bool {
        self.parent_page_id() == INVALID_PAGE_ID
    }

    pub fn size(&self) -> usize {
        size(&self.data)
    }

    pub fn max_size(&self) -> usize {
        max_size(&self.data)
    }

    pub fn min_size(&self) -> usize {
        max_size(&self.data) / 2
    }

    pub fn parent_page_id(&self) -> PageId {
        parent_page_id(&self.data)
    }

    pub fn page_id(&self) -> PageId {
        page_id(&self.data)
    }
}

impl<D: DerefMut<Target = [u8]>> BPlusTreePage<D> {
    pub fn set_parent_page_id(&mut self, parent_id: PageId) {
        set_parent_page_id(&mut self.data, parent_id);
    }
}
