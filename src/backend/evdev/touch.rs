//! Per-device multi-touch slot table (spec §4.3).
//!
//! The seat-wide slot-bitmap allocator these slots draw from
//! ([`SeatSlotMap`]) lives in [`crate::backend::input`]: it is shared by
//! every device under one seat, not specific to the evdev MT protocol, so
//! it belongs with the rest of the seat-scoped vocabulary rather than here.

use crate::utils::{Point, Raw};

pub use crate::backend::input::{SeatSlotMap, NO_SEAT_SLOT};

/// A single multi-touch slot's bookkeeping (spec §3: "Multi-touch table").
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SlotRecord {
    /// Last reported position.
    pub position: Point<i32, Raw>,
    /// The seat-slot currently allocated for this slot's contact, or
    /// [`NO_SEAT_SLOT`] if the slot has no active contact.
    pub seat_slot: i32,
}

impl SlotRecord {
    fn empty() -> Self {
        SlotRecord {
            position: Point::default(),
            seat_slot: NO_SEAT_SLOT,
        }
    }
}

/// A device's per-slot multi-touch table (spec §4.3 "Construction").
#[derive(Debug, Clone)]
pub struct SlotTable {
    slots: Vec<SlotRecord>,
    current: i32,
}

impl SlotTable {
    /// Allocate `max_slot + 1` slot records, all empty, current slot set to
    /// the reported active slot.
    pub fn new(max_slot: i32, active_slot: i32) -> Self {
        let count = (max_slot + 1).max(0) as usize;
        SlotTable {
            slots: vec![SlotRecord::empty(); count],
            current: active_slot,
        }
    }

    /// The number of slot records this table has.
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether this table has no slot records.
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// The currently selected slot index.
    pub fn current_slot(&self) -> i32 {
        self.current
    }

    /// Change the currently selected slot (`ABS_MT_SLOT`).
    pub fn set_current_slot(&mut self, slot: i32) {
        self.current = slot;
    }

    /// The record for the currently selected slot, if it's in range.
    pub fn current(&self) -> Option<&SlotRecord> {
        self.slots.get(self.current as usize)
    }

    /// Mutable access to the record for the currently selected slot.
    pub fn current_mut(&mut self) -> Option<&mut SlotRecord> {
        self.slots.get_mut(self.current as usize)
    }

    /// The record for a given slot index, if it's in range.
    pub fn get(&self, slot: i32) -> Option<&SlotRecord> {
        if slot < 0 {
            return None;
        }
        self.slots.get(slot as usize)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn slot_table_tracks_current() {
        let mut table = SlotTable::new(1, 0);
        assert_eq!(table.len(), 2);
        table.set_current_slot(1);
        table.current_mut().unwrap().position.x = 300;
        table.current_mut().unwrap().position.y = 400;
        assert_eq!(
            table.get(1),
            Some(&SlotRecord {
                position: (300, 400).into(),
                seat_slot: -1
            })
        );
    }
}
