use std::ops::{Deref, DerefMut};

use byteorder::{ByteOrder, LittleEndian};

use super::page::PageId;
use super::page_layout::{
    HEADER_MAX_RECORDS, HEADER_NAME_SIZE, HEADER_RECORDS_OFFSET, HEADER_RECORD_COUNT_OFFSET,
    HEADER_RECORD_SIZE,
};

/// View over the reserved header page (page id 0): a record array mapping
/// index names to their current root page ids. An index inserts its record
/// once on creation and updates it on every later change of root identity.
pub struct HeaderPage<D> {
    data: D,
}

impl<D: Deref<Target = [u8]>> HeaderPage<D> {
    pub fn new(data: D) -> Self {
        Self { data }
    }

    pub fn record_count(&self) -> usize {
        LittleEndian::read_u32(&self.data[HEADER_RECORD_COUNT_OFFSET..]) as usize
    }

    fn record_offset(index: usize) -> usize {
        HEADER_RECORDS_OFFSET + index * HEADER_RECORD_SIZE
    }

    fn name_at(&self, index: usize) -> &[u8] {
        let offset = Self::record_offset(index);
        let name = &self.data[offset..offset + HEADER_NAME_SIZE];
        let end = name.iter().position(|&b| b == 0).unwrap_or(HEADER_NAME_SIZE);
        &name[..end]
    }

    fn find_record(&self, name: &str) -> Option<usize> {
        (0..self.record_count()).find(|&i| self.name_at(i) == name.as_bytes())
    }

    /// Root page id recorded for `name`, if the index is registered.
    pub fn get_record(&self, name: &str) -> Option<PageId> {
        self.find_record(name).map(|index| {
            let offset = Self::record_offset(index) + HEADER_NAME_SIZE;
            LittleEndian::read_i32(&self.data[offset..])
        })
    }
}

impl<D: DerefMut<Target = [u8]>> HeaderPage<D> {
    fn write_record(&mut self, index: usize, name: &str, root_page_id: PageId) {
        let offset = Self::record_offset(index);
        self.data[offset..offset + HEADER_NAME_SIZE].fill(0);
        self.data[offset..offset + name.len()].copy_from_slice(name.as_bytes());
        LittleEndian::write_i32(&mut self.data[offset + HEADER_NAME_SIZE..], root_page_id);
    }

    /// Registers a new index. Refused when the name is taken, too long, or
    /// the record array is full.
    pub fn insert_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        let count = self.record_count();
        if name.len() > HEADER_NAME_SIZE
            || count >= HEADER_MAX_RECORDS
            || self.find_record(name).is_some()
        {
            return false;
        }
        self.write_record(count, name, root_page_id);
        LittleEndian::write_u32(
            &mut self.data[HEADER_RECORD_COUNT_OFFSET..],
            (count + 1) as u32,
        );
        true
    }

    /// Updates the root page id of a registered index.
    pub fn update_record(&mut self, name: &str, root_page_id: PageId) -> bool {
        match self.find_record(name) {
            Some(index) => {
                let offset = Self::record_offset(index) + HEADER_NAME_SIZE;
                LittleEndian::write_i32(&mut self.data[offset..], root_page_id);
                true
            }
            None => false,
        }
    }

    /// Drops the record for `name`, if present.
    pub fn delete_record(&mut self, name: &str) -> bool {
        let count = self.record_count();
        match self.find_record(name) {
            Some(index) => {
                let start = Self::record_offset(index + 1);
                let end = Self::record_offset(count);
                let dst = Self::record_offset(index);
                self.data.copy_within(start..end, dst);
                LittleEndian::write_u32(
                    &mut self.data[HEADER_RECORD_COUNT_OFFSET..],
                    (count - 1) as u32,
                );
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::page_layout::PAGE_SIZE;

    #[test]
    fn records_round_trip() {
        let mut buf = vec![0u8; PAGE_SIZE];
        let mut header = HeaderPage::new(&mut buf[..]);

        assert!(header.insert_record("orders_pk", 7));
        assert!(header.insert_record("users_pk", 12));
        assert!(!header.insert_record("orders_pk", 9));

        assert_eq!(header.get_record("orders_pk"), Some(7));
        assert!(header.update_record("orders_pk", 21));
        assert_eq!(header.get_record("orders_pk"), Some(21));
        assert!(!header.update_record("missing", 1));

        assert!(header.delete_record("orders_pk"));
        assert_eq!(header.get_record("orders_pk"), None);
        assert_eq!(header.get_record("users_pk"), Some(12));
        assert_eq!(header.record_count(), 1);
    }
}
