use std::sync::{
    atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering},
    Arc,
};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use super::page_layout::PAGE_SIZE;

pub type PageId = i32;
pub type FrameId = usize;

/// A frame that holds no page keeps this id.
pub const INVALID_PAGE_ID: PageId = -1;

/// The reserved page that maps index names to their root page ids.
pub const HEADER_PAGE_ID: PageId = 0;

pub type PageData = [u8; PAGE_SIZE];

/// Owned latch guards. Tree code stores these across calls while crabbing,
/// which is why the data lock sits behind its own `Arc`.
pub type PageReadGuard = parking_lot::ArcRwLockReadGuard<parking_lot::RawRwLock, PageData>;
pub type PageWriteGuard = parking_lot::ArcRwLockWriteGuard<parking_lot::RawRwLock, PageData>;

/// One buffer pool frame: the page bytes behind a reader/writer latch plus
/// the frame metadata.
///
/// The metadata fields are atomics so holders of a pin can read them without
/// any lock, but they are only ever written under the owning instance's
/// latch.
pub struct Page {
    frame_id: FrameId,
    page_id: AtomicI32,
    pin_count: AtomicU32,
    is_dirty: AtomicBool,
    data: Arc<RwLock<PageData>>,
}

impl Page {
    pub(crate) fn new(frame_id: FrameId) -> Self {
        Self {
            frame_id,
            page_id: AtomicI32::new(INVALID_PAGE_ID),
            pin_count: AtomicU32::new(0),
            is_dirty: AtomicBool::new(false),
            data: Arc::new(RwLock::new([0u8; PAGE_SIZE])),
        }
    }

    pub fn frame_id(&self) -> FrameId {
        self.frame_id
    }

    pub fn id(&self) -> PageId {
        self.page_id.load(Ordering::Acquire)
    }

    pub fn pin_count(&self) -> u32 {
        self.pin_count.load(Ordering::Acquire)
    }

    pub fn is_dirty(&self) -> bool {
        self.is_dirty.load(Ordering::Acquire)
    }

    /// Takes the page's read latch.
    pub fn read(&self) -> RwLockReadGuard<'_, PageData> {
        self.data.read()
    }

    /// Takes the page's write latch.
    pub fn write(&self) -> RwLockWriteGuard<'_, PageData> {
        self.data.write()
    }

    /// Takes the read latch as an owned guard that can outlive this borrow.
    pub fn read_owned(&self) -> PageReadGuard {
        self.data.read_arc()
    }

    /// Takes the write latch as an owned guard that can outlive this borrow.
    pub fn write_owned(&self) -> PageWriteGuard {
        self.data.write_arc()
    }

    pub(crate) fn set_id(&self, page_id: PageId) {
        self.page_id.store(page_id, Ordering::Release);
    }

    pub(crate) fn set_dirty(&self, dirty: bool) {
        self.is_dirty.store(dirty, Ordering::Release);
    }

    pub(crate) fn set_pin_count(&self, count: u32) {
        self.pin_count.store(count, Ordering::Release);
    }

    pub(crate) fn increment_pin_count(&self) -> u32 {
        self.pin_count.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub(crate) fn decrement_pin_count(&self) -> u32 {
        self.pin_count.fetch_sub(1, Ordering::AcqRel) - 1
    }
}
