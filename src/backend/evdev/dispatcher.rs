//! The pluggable per-device dispatcher strategy (spec §2 item 6, §9).
//!
//! Modeled as a tagged variant rather than a raw function-pointer table, as
//! the teacher's trait objects are elsewhere in this codebase: an explicit
//! enum discriminant with method dispatch. The touchpad gesture dispatcher
//! (tap-to-click, scroll detection) is out of scope (spec §1) and has no
//! variant here; [`FallbackDispatcher`] is the only one implemented.

use crate::backend::input::{DeviceId, Event};

use super::accel::AccelerationFilter;
use super::calibration::EffectiveCalibration;
use super::keys::KeyBookkeeping;
use super::pending::FallbackDispatcher;
use super::raw::RawEvent;
use super::touch::{SeatSlotMap, SlotTable};

/// The collaborators a dispatcher needs to process one raw event, borrowed
/// fresh for the duration of a single `process_event`/`destroy` call.
pub struct DeviceContext<'a> {
    /// Key/button bitmap and press counters.
    pub keys: &'a mut KeyBookkeeping,
    /// Multi-touch slot table, if this device has one (spec §4.3).
    pub slots: Option<&'a mut SlotTable>,
    /// Seat-slot currently held by the single-touch emulation contact, or
    /// [`super::touch::NO_SEAT_SLOT`].
    pub single_touch_seat_slot: &'a mut i32,
    /// The device's calibration state.
    pub calibration: &'a EffectiveCalibration,
    /// The seat-wide slot-bitmap allocator, shared across devices.
    pub seat: &'a mut SeatSlotMap,
    /// The acceleration-filter collaborator.
    pub accel: &'a mut dyn AccelerationFilter,
    /// Whether this device grants the seat TOUCH capability.
    pub touch_capable: bool,
    /// This device's identifier, stamped onto every emitted notification.
    pub device: &'a DeviceId,
}

/// The per-device event-processing strategy (spec §9).
#[derive(Debug)]
pub enum Dispatcher {
    /// The generic pointer/keyboard/touch pipeline (spec §4.4-§4.6).
    Fallback(FallbackDispatcher),
}

impl Dispatcher {
    /// A fresh fallback dispatcher with no pending event.
    pub fn fallback() -> Self {
        Dispatcher::Fallback(FallbackDispatcher::new())
    }

    /// Process one raw event, appending any resulting notifications to `out`.
    pub fn process_event(&mut self, ctx: &mut DeviceContext<'_>, event: RawEvent, out: &mut Vec<Event>) {
        match self {
            Dispatcher::Fallback(dispatcher) => dispatcher.process_event(ctx, event, out),
        }
    }

    /// Synthesize release notifications for everything still held down,
    /// called once at device removal (spec §3 "Lifecycles").
    pub fn destroy(&mut self, ctx: &mut DeviceContext<'_>, time: u32, out: &mut Vec<Event>) {
        match self {
            Dispatcher::Fallback(dispatcher) => dispatcher.destroy(ctx, time, out),
        }
    }
}
