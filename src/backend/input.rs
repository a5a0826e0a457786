//! Vocabulary shared by any input source: capabilities, key/button state,
//! the seat a device belongs to, and the outbound notification type
//! delivered to a consumer (see spec §6 "External interfaces — Outbound").

use std::cell::RefCell;
use std::rc::Rc;
use std::sync::Arc;

bitflags::bitflags! {
    /// The subset of {pointer, keyboard, touch} a device grants to its seat.
    ///
    /// Immutable after a device finishes its capability probe.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Capabilities: u8 {
        /// The device moves a pointer (relative motion, absolute motion, or buttons).
        const POINTER = 0b001;
        /// The device reports keys or buttons classified as keyboard keys.
        const KEYBOARD = 0b010;
        /// The device reports multi- or single-touch contacts.
        const TOUCH = 0b100;
    }
}

/// Unique, seat-scoped identifier of a logical input device.
///
/// Cheaply cloneable; carried on every [`Event`] so a consumer can tell
/// which adapter produced it without holding a borrow on it.
pub type DeviceId = Arc<str>;

/// Unique identifier of a seat: a named group of devices whose touch
/// contacts share one seat-slot allocation (spec §3 "Seat state").
pub type SeatId = Arc<str>;

/// No seat-slot assigned.
pub const NO_SEAT_SLOT: i32 = -1;

/// The seat-wide bitmap of allocated seat-slots (spec §3 "Seat state",
/// §4.3 "Seat-slot allocation").
///
/// Not evdev-specific: any device under a seat, regardless of input
/// source, draws its touch contacts' seat-slots from the same map.
#[derive(Debug, Clone, Default)]
pub struct SeatSlotMap {
    allocated: Vec<bool>,
}

impl SeatSlotMap {
    /// A fresh, empty slot map.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquire the lowest-index clear bit, set it, and return its index.
    /// Returns [`NO_SEAT_SLOT`] if this map has no representable bit left
    /// to grow into — in practice this never happens since the map grows
    /// on demand.
    pub fn acquire(&mut self) -> i32 {
        if let Some(index) = self.allocated.iter().position(|&taken| !taken) {
            self.allocated[index] = true;
            return index as i32;
        }
        self.allocated.push(true);
        (self.allocated.len() - 1) as i32
    }

    /// Clear the bit for `seat_slot`. No-op if it wasn't set or is out of range.
    pub fn release(&mut self, seat_slot: i32) {
        if seat_slot < 0 {
            return;
        }
        if let Some(taken) = self.allocated.get_mut(seat_slot as usize) {
            *taken = false;
        }
    }

    /// Whether `seat_slot`'s bit is currently set.
    pub fn is_set(&self, seat_slot: i32) -> bool {
        seat_slot >= 0 && self.allocated.get(seat_slot as usize).copied().unwrap_or(false)
    }

    /// Whether no bit is set (used to assert the map returns to empty in tests).
    pub fn is_empty(&self) -> bool {
        !self.allocated.iter().any(|&taken| taken)
    }
}

/// A seat: the group of devices whose touch contacts share one
/// [`SeatSlotMap`] (spec §3 "Seat state").
///
/// Cheap to clone: the slot map itself is reference-counted, so every
/// device constructed against the same `Seat` shares one allocator.
#[derive(Debug, Clone)]
pub struct Seat {
    id: SeatId,
    slots: Rc<RefCell<SeatSlotMap>>,
}

impl Seat {
    /// Create a fresh seat with an empty slot map.
    pub fn new(id: impl Into<SeatId>) -> Self {
        Seat {
            id: id.into(),
            slots: Rc::new(RefCell::new(SeatSlotMap::new())),
        }
    }

    /// This seat's identifier.
    pub fn id(&self) -> &SeatId {
        &self.id
    }

    /// A new handle to this seat's shared slot map.
    pub fn slots(&self) -> Rc<RefCell<SeatSlotMap>> {
        Rc::clone(&self.slots)
    }
}

/// State of a key on a keyboard. Either pressed or released.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum KeyState {
    /// Key is released.
    Released,
    /// Key is pressed.
    Pressed,
}

/// State of a button on a pointer device. Either pressed or released.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum ButtonState {
    /// Button is released.
    Released,
    /// Button is pressed.
    Pressed,
}

impl From<bool> for KeyState {
    fn from(pressed: bool) -> Self {
        if pressed {
            KeyState::Pressed
        } else {
            KeyState::Released
        }
    }
}

impl From<bool> for ButtonState {
    fn from(pressed: bool) -> Self {
        if pressed {
            ButtonState::Pressed
        } else {
            ButtonState::Released
        }
    }
}

/// Axis scrolled on a pointer device.
#[derive(Debug, PartialEq, Eq, Clone, Copy, Hash)]
pub enum Axis {
    /// Vertical axis.
    Vertical,
    /// Horizontal axis.
    Horizontal,
}

/// A single semantic notification produced by a device's pipeline.
///
/// Carries the device that produced it and a monotonic millisecond
/// timestamp, matching spec §6's outbound contract.
#[derive(Debug, Clone, PartialEq)]
pub struct Event {
    /// The device that produced this notification.
    pub device: DeviceId,
    /// Monotonic timestamp in milliseconds.
    pub time: u32,
    /// The notification payload.
    pub kind: EventKind,
}

impl Event {
    /// Build a new notification for `device` at `time`.
    pub fn new(device: DeviceId, time: u32, kind: EventKind) -> Self {
        Event { device, time, kind }
    }
}

/// Payload of an [`Event`].
///
/// Floating-point coordinates are never rounded back to integers; once a
/// raw `i32` device coordinate has passed through calibration it stays a
/// `f64` for the rest of its life (spec §9).
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum EventKind {
    /// Relative pointer motion, already passed through the acceleration filter.
    PointerMotion {
        /// Filtered delta on the x axis.
        dx: f64,
        /// Filtered delta on the y axis.
        dy: f64,
    },
    /// Absolute pointer motion, already passed through calibration.
    PointerMotionAbsolute {
        /// Calibrated x coordinate.
        x: f64,
        /// Calibrated y coordinate.
        y: f64,
    },
    /// A pointer button changed state.
    PointerButton {
        /// Linux input-event-codes button code (e.g. `BTN_LEFT` = `0x110`).
        code: u16,
        /// New state of the button.
        state: ButtonState,
    },
    /// Scrolling on a relative axis.
    PointerAxis {
        /// Which axis was scrolled.
        axis: Axis,
        /// Scroll magnitude in axis units (see spec §4.6).
        value: f64,
    },
    /// A keyboard key or non-pointer button changed state.
    KeyboardKey {
        /// Linux input-event-codes key code.
        code: u16,
        /// New state of the key.
        state: KeyState,
    },
    /// A new touch contact appeared.
    TouchDown {
        /// Device-local slot index, or `-1` for a single-touch device.
        slot: i32,
        /// Seat-scoped contact identifier allocated for this touch.
        seat_slot: i32,
        /// Calibrated x coordinate.
        x: f64,
        /// Calibrated y coordinate.
        y: f64,
    },
    /// An existing touch contact moved.
    TouchMotion {
        /// Device-local slot index, or `-1` for a single-touch device.
        slot: i32,
        /// Seat-scoped contact identifier for this touch.
        seat_slot: i32,
        /// Calibrated x coordinate.
        x: f64,
        /// Calibrated y coordinate.
        y: f64,
    },
    /// A touch contact was lifted.
    TouchUp {
        /// Device-local slot index, or `-1` for a single-touch device.
        slot: i32,
        /// Seat-scoped contact identifier that is now free again.
        seat_slot: i32,
    },
    /// Marks the end of a `SYN_REPORT` frame that produced at least one touch notification.
    TouchFrame,
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn lowest_clear_bit_allocation() {
        let mut map = SeatSlotMap::new();
        assert_eq!(map.acquire(), 0);
        assert_eq!(map.acquire(), 1);
        map.release(0);
        assert_eq!(map.acquire(), 0);
        assert_eq!(map.acquire(), 2);
        assert!(!map.is_empty());
    }

    #[test]
    fn release_returns_to_empty() {
        let mut map = SeatSlotMap::new();
        let a = map.acquire();
        let b = map.acquire();
        map.release(a);
        map.release(b);
        assert!(map.is_empty());
    }

    #[test]
    fn seat_clones_share_one_slot_map() {
        let seat = Seat::new("seat0");
        let other_handle = seat.clone();
        seat.slots().borrow_mut().acquire();
        assert!(!other_handle.slots().borrow().is_empty());
    }
}
