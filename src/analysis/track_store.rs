// src/analysis/track_store.rs
//
// Holds the current frame's in-band tracks and the set of identities that
// have already produced a CountEvent.
//
// Design:
//   - Tracks live in a small slot table that is replaced wholesale every frame
//   - Nearest-neighbour lookups are linear scans (a handful of tracks per frame)
//   - Identities come from a session-scoped monotonic counter, never from the
//     size of any collection, so a rebuilt track table cannot collide with ids
//     issued earlier in the session

use crate::types::Center;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU32, Ordering};

const INITIAL_SLOTS: usize = 32;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackSlot {
    pub id: u32,
    pub center: Center,
}

#[derive(Debug)]
pub struct TrackStore {
    previous: Vec<TrackSlot>,
    counted: HashSet<u32>,
    next_id: AtomicU32,
}

impl Default for TrackStore {
    fn default() -> Self {
        Self::new()
    }
}

impl TrackStore {
    pub fn new() -> Self {
        Self {
            previous: Vec::with_capacity(INITIAL_SLOTS),
            counted: HashSet::new(),
            next_id: AtomicU32::new(1),
        }
    }

    /// Previous frame's tracks
    pub fn previous(&self) -> &[TrackSlot] {
        &self.previous
    }

    /// Swap in this frame's tracks; the old table is dropped in one step.
    pub fn replace(&mut self, tracks: Vec<TrackSlot>) {
        self.previous = tracks;
    }

    /// Issue a fresh identity
    pub fn next_id(&self) -> u32 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Returns true when `id` was not counted before this call.
    pub fn mark_counted(&mut self, id: u32) -> bool {
        self.counted.insert(id)
    }

    pub fn is_counted(&self, id: u32) -> bool {
        self.counted.contains(&id)
    }

    pub fn counted_len(&self) -> usize {
        self.counted.len()
    }

    /// Start a new counting epoch. Live tracks keep their identities, which
    /// become countable again.
    pub fn clear_counted(&mut self) {
        self.counted.clear();
    }

    /// Forget everything, including the identity sequence
    pub fn clear(&mut self) {
        self.previous.clear();
        self.counted.clear();
        self.next_id.store(1, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_monotonic() {
        let store = TrackStore::new();
        let a = store.next_id();
        let b = store.next_id();
        let c = store.next_id();
        assert_eq!((a, b, c), (1, 2, 3));
    }

    #[test]
    fn test_mark_counted_is_idempotent() {
        let mut store = TrackStore::new();
        assert!(store.mark_counted(7));
        assert!(!store.mark_counted(7));
        assert!(store.is_counted(7));
        assert_eq!(store.counted_len(), 1);
    }

    #[test]
    fn test_replace_swaps_whole_table() {
        let mut store = TrackStore::new();
        store.replace(vec![
            TrackSlot { id: 1, center: Center::new(0, 0) },
            TrackSlot { id: 2, center: Center::new(10, 10) },
        ]);
        store.replace(vec![TrackSlot { id: 3, center: Center::new(5, 5) }]);
        assert_eq!(store.previous().len(), 1);
        assert_eq!(store.previous()[0].id, 3);
    }

    #[test]
    fn test_clear_counted_keeps_tracks_and_sequence() {
        let mut store = TrackStore::new();
        let id = store.next_id();
        store.mark_counted(id);
        store.replace(vec![TrackSlot { id, center: Center::new(1, 1) }]);

        store.clear_counted();
        assert!(!store.is_counted(id));
        assert_eq!(store.previous().len(), 1);
        assert_eq!(store.next_id(), 2);
    }

    #[test]
    fn test_clear_restarts_sequence() {
        let mut store = TrackStore::new();
        store.next_id();
        store.next_id();
        store.mark_counted(1);
        store.clear();
        assert_eq!(store.next_id(), 1);
        assert!(store.previous().is_empty());
        assert_eq!(store.counted_len(), 0);
    }
}
