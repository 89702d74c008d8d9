//! # Snapshot Store
//!
//! Intermediate predicted state, one slot per in-flight command per object.
//!
//! Slot `k` holds an object's state after executing command
//! `last_acknowledged + 1 + k`. When the server acknowledges more commands the
//! ring is shifted forward instead of re-simulated.

use bitflags::bitflags;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use slotmap::SecondaryMap;

use crate::error::{PredictionError, Result};
use crate::registry::ObjectHandle;

bitflags! {
    /// Which fields of [`PredictedState`] an object declares as predictable
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
    pub struct FieldMask: u8 {
        const ORIGIN = 1 << 0;
        const VIEW_ANGLES = 1 << 1;
        const VELOCITY = 1 << 2;
        const VIEW_OFFSET = 1 << 3;
        const FLAGS = 1 << 4;
    }
}

impl Default for FieldMask {
    fn default() -> Self {
        FieldMask::all()
    }
}

bitflags! {
    /// Discrete predicted flags
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct StateFlags: u32 {
        const ON_GROUND = 1 << 0;
        const DUCKING = 1 << 1;
        const DUCKED = 1 << 2;
        const IN_WATER = 1 << 3;
        const FROZEN = 1 << 4;
        const ON_LADDER = 1 << 5;
    }
}

/// The predictable subset of an object's state
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct PredictedState {
    pub origin: Vec3,
    /// Pitch, yaw, roll in degrees
    pub view_angles: Vec3,
    pub velocity: Vec3,
    /// Eye position relative to origin
    pub view_offset: Vec3,
    pub flags: StateFlags,
}

impl PredictedState {
    /// State at `origin` with everything else zeroed
    pub fn at(origin: Vec3) -> Self {
        Self {
            origin,
            ..Default::default()
        }
    }

    /// Copy of the declared fields only; undeclared fields are zeroed
    pub fn masked(&self, mask: FieldMask) -> Self {
        let mut out = Self::default();
        out.copy_fields_from(self, mask);
        out
    }

    /// Overwrite the declared fields with those of `other`
    pub fn copy_fields_from(&mut self, other: &PredictedState, mask: FieldMask) {
        if mask.contains(FieldMask::ORIGIN) {
            self.origin = other.origin;
        }
        if mask.contains(FieldMask::VIEW_ANGLES) {
            self.view_angles = other.view_angles;
        }
        if mask.contains(FieldMask::VELOCITY) {
            self.velocity = other.velocity;
        }
        if mask.contains(FieldMask::VIEW_OFFSET) {
            self.view_offset = other.view_offset;
        }
        if mask.contains(FieldMask::FLAGS) {
            self.flags = other.flags;
        }
    }

    /// Eye position in world space
    pub fn eye_position(&self) -> Vec3 {
        self.origin + self.view_offset
    }
}

/// Ring of per-object predicted slots bounded by the in-flight window
pub struct SnapshotStore {
    rings: SecondaryMap<ObjectHandle, Box<[Option<PredictedState>]>>,
    capacity: usize,
}

impl SnapshotStore {
    /// Create a store with `capacity` slots per object
    pub fn new(capacity: usize) -> Self {
        Self {
            rings: SecondaryMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Slots per object
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Store `state` into `slot` for `handle`, allocating the ring on first use
    pub fn store(&mut self, handle: ObjectHandle, slot: usize, state: PredictedState) -> Result<()> {
        if slot >= self.capacity {
            return Err(PredictionError::SlotOutOfRange {
                slot,
                capacity: self.capacity,
            });
        }

        let capacity = self.capacity;
        let ring = self
            .rings
            .entry(handle)
            .ok_or(PredictionError::InvalidHandle)?
            .or_insert_with(|| vec![None; capacity].into_boxed_slice());
        ring[slot] = Some(state);
        Ok(())
    }

    /// Stored state for `handle` at `slot`
    pub fn get(&self, handle: ObjectHandle, slot: usize) -> Option<&PredictedState> {
        self.rings.get(handle)?.get(slot)?.as_ref()
    }

    /// Discard the first `count` slots of every ring, moving the remaining
    /// `predicted - count` slots to the front.
    pub fn shift_forward(&mut self, count: usize, predicted: usize) {
        if count == 0 {
            return;
        }

        let remaining = predicted.saturating_sub(count);
        let count = count.min(self.capacity);
        for (_, ring) in self.rings.iter_mut() {
            ring.rotate_left(count);
            for slot in ring.iter_mut().skip(remaining) {
                *slot = None;
            }
        }
    }

    /// Drop every slot for one object
    pub fn remove(&mut self, handle: ObjectHandle) {
        self.rings.remove(handle);
    }

    /// Drop every slot for every object
    pub fn clear(&mut self) {
        self.rings.clear();
    }

    /// Number of occupied slots across all objects
    pub fn occupied(&self) -> usize {
        self.rings
            .values()
            .map(|ring| ring.iter().filter(|slot| slot.is_some()).count())
            .sum()
    }

    /// Largest ring length held for any object
    pub fn max_ring_len(&self) -> usize {
        self.rings.values().map(|ring| ring.len()).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::SlotMap;

    fn handles(n: usize) -> Vec<ObjectHandle> {
        let mut map: SlotMap<ObjectHandle, ()> = SlotMap::with_key();
        (0..n).map(|_| map.insert(())).collect()
    }

    #[test]
    fn test_masked_copy() {
        let state = PredictedState {
            origin: Vec3::new(1.0, 2.0, 3.0),
            velocity: Vec3::X,
            flags: StateFlags::ON_GROUND,
            ..Default::default()
        };

        let masked = state.masked(FieldMask::ORIGIN | FieldMask::FLAGS);
        assert_eq!(masked.origin, state.origin);
        assert_eq!(masked.velocity, Vec3::ZERO);
        assert_eq!(masked.flags, StateFlags::ON_GROUND);
    }

    #[test]
    fn test_store_and_get() {
        let h = handles(1)[0];
        let mut store = SnapshotStore::new(4);

        store.store(h, 2, PredictedState::at(Vec3::ONE)).unwrap();
        assert_eq!(store.get(h, 2).unwrap().origin, Vec3::ONE);
        assert!(store.get(h, 1).is_none());
        assert_eq!(store.occupied(), 1);
    }

    #[test]
    fn test_slot_out_of_range() {
        let h = handles(1)[0];
        let mut store = SnapshotStore::new(4);

        let err = store.store(h, 4, PredictedState::default()).unwrap_err();
        assert_eq!(err, PredictionError::SlotOutOfRange { slot: 4, capacity: 4 });
    }

    #[test]
    fn test_shift_forward() {
        let h = handles(1)[0];
        let mut store = SnapshotStore::new(8);
        for slot in 0..6 {
            store.store(h, slot, PredictedState::at(Vec3::splat(slot as f32))).unwrap();
        }

        store.shift_forward(3, 6);

        for slot in 0..3 {
            assert_eq!(store.get(h, slot).unwrap().origin, Vec3::splat((slot + 3) as f32));
        }
        assert!(store.get(h, 3).is_none());
        assert_eq!(store.occupied(), 3);
        assert_eq!(store.max_ring_len(), 8);
    }

    #[test]
    fn test_shift_past_predicted_clears() {
        let h = handles(1)[0];
        let mut store = SnapshotStore::new(4);
        store.store(h, 0, PredictedState::default()).unwrap();

        store.shift_forward(5, 1);
        assert_eq!(store.occupied(), 0);
    }

    #[test]
    fn test_remove() {
        let hs = handles(2);
        let mut store = SnapshotStore::new(2);
        store.store(hs[0], 0, PredictedState::default()).unwrap();
        store.store(hs[1], 0, PredictedState::default()).unwrap();

        store.remove(hs[0]);
        assert!(store.get(hs[0], 0).is_none());
        assert!(store.get(hs[1], 0).is_some());
    }
}
