use hashlink::LinkedHashMap;
use parking_lot::Mutex;

use crate::storage::page::page::FrameId;

/// Eviction policy over buffer pool frames. Only unpinned frames are
/// tracked; `victim` hands back the one to reclaim.
pub trait Replacer: Send + Sync {
    /// Removes and returns the frame to evict, if any frame is eligible.
    fn victim(&self) -> Option<FrameId>;

    /// Marks a frame as in use: drops it from the eviction candidates.
    fn pin(&self, frame_id: FrameId);

    /// Marks a frame as eligible for eviction. A frame that is already
    /// tracked, or an insert beyond capacity, is ignored.
    fn unpin(&self, frame_id: FrameId);

    /// Number of frames currently eligible for eviction.
    fn size(&self) -> usize;
}

/// Strict LRU ordered by unpin time. The map keeps the oldest unpinned
/// frame at the front; pinning never refreshes a frame's position.
pub struct LruReplacer {
    capacity: usize,
    frames: Mutex<LinkedHashMap<FrameId, ()>>,
}

impl LruReplacer {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            frames: Mutex::new(LinkedHashMap::with_capacity(capacity)),
        }
    }
}

impl Replacer for LruReplacer {
    fn victim(&self) -> Option<FrameId> {
        let mut frames = self.frames.lock();
        frames.pop_front().map(|(frame_id, ())| frame_id)
    }

    fn pin(&self, frame_id: FrameId) {
        let mut frames = self.frames.lock();
        frames.remove(&frame_id);
    }

    fn unpin(&self, frame_id: FrameId) {
        let mut frames = self.frames.lock();
        if frames.contains_key(&frame_id) || frames.len() >= self.capacity {
            return;
        }
        frames.insert(frame_id, ());
    }

    fn size(&self) -> usize {
        self.frames.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn victims_come_back_in_unpin_order() {
        let replacer = LruReplacer::new(7);
        for frame_id in [1, 2, 3, 4, 5, 6] {
            replacer.unpin(frame_id);
        }
        assert_eq!(replacer.size(), 6);

        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), Some(3));

        replacer.pin(4);
        // already gone, no effect
        replacer.pin(3);
        assert_eq!(replacer.size(), 2);

        replacer.unpin(4);
        assert_eq!(replacer.victim(), Some(5));
        assert_eq!(replacer.victim(), Some(6));
        assert_eq!(replacer.victim(), Some(4));
        assert_eq!(replacer.victim(), None);
    }

    #[test]
    fn duplicate_unpin_keeps_the_original_position() {
        let replacer = LruReplacer::new(4);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(1);
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(1));
    }

    #[test]
    fn capacity_bounds_membership() {
        let replacer = LruReplacer::new(2);
        replacer.unpin(1);
        replacer.unpin(2);
        replacer.unpin(3);
        assert_eq!(replacer.size(), 2);
        assert_eq!(replacer.victim(), Some(1));
        assert_eq!(replacer.victim(), Some(2));
        assert_eq!(replacer.victim(), None);
    }
}
