use std::fmt::Debug;

use byteorder::{ByteOrder, LittleEndian};

use crate::storage::page::page::PageId;

/// A fixed-width, totally ordered key. The tree stores keys as raw bytes at
/// fixed offsets inside tree pages, so every implementation must encode to
/// exactly `SIZE` bytes.
pub trait IndexKey: Ord + Copy + Default + Debug + Send + Sync + 'static {
    const SIZE: usize;

    fn write_to(&self, buf: &mut [u8]);
    fn read_from(buf: &[u8]) -> Self;
}

macro_rules! integer_index_key {
    ($ty:ty, $write:ident, $read:ident) => {
        impl IndexKey for $ty {
            const SIZE: usize = size_of::<$ty>();

            fn write_to(&self, buf: &mut [u8]) {
                LittleEndian::$write(buf, *self);
            }

            fn read_from(buf: &[u8]) -> Self {
                LittleEndian::$read(buf)
            }
        }
    };
}

integer_index_key!(i32, write_i32, read_i32);
integer_index_key!(i64, write_i64, read_i64);
integer_index_key!(u32, write_u32, read_u32);
integer_index_key!(u64, write_u64, read_u64);

/// Opaque fixed-width key compared byte-lexicographically. Instantiated at
/// the widths 4/8/16/32/64.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Debug)]
pub struct GenericKey<const N: usize> {
    data: [u8; N],
}

impl<const N: usize> Default for GenericKey<N> {
    fn default() -> Self {
        Self { data: [0; N] }
    }
}

impl<const N: usize> GenericKey<N> {
    pub fn new(data: [u8; N]) -> Self {
        Self { data }
    }

    /// Big-endian integer encoding, so numeric order matches byte order.
    pub fn from_integer(value: u64) -> Self {
        let mut data = [0u8; N];
        let prefix = N.min(8);
        data[..prefix].copy_from_slice(&value.to_be_bytes()[8 - prefix..]);
        Self { data }
    }

    pub fn as_bytes(&self) -> &[u8; N] {
        &self.data
    }
}

impl<const N: usize> IndexKey for GenericKey<N> {
    const SIZE: usize = N;

    fn write_to(&self, buf: &mut [u8]) {
        buf[..N].copy_from_slice(&self.data);
    }

    fn read_from(buf: &[u8]) -> Self {
        let mut data = [0u8; N];
        data.copy_from_slice(&buf[..N]);
        Self { data }
    }
}

/// Record id stored as the leaf value: the heap page holding the row plus
/// its slot number.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct RowID {
    pub page_id: PageId,
    pub slot_num: u32,
}

impl RowID {
    pub fn new(page_id: PageId, slot_num: u32) -> Self {
        Self { page_id, slot_num }
    }

    pub(crate) fn write_to(&self, buf: &mut [u8]) {
        LittleEndian::write_i32(buf, self.page_id);
        LittleEndian::write_u32(&mut buf[4..], self.slot_num);
    }

    pub(crate) fn read_from(buf: &[u8]) -> Self {
        Self {
            page_id: LittleEndian::read_i32(buf),
            slot_num: LittleEndian::read_u32(&buf[4..]),
        }
    }
}
