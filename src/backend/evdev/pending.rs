//! The pending-event state machine: the heart of the core (spec §4.4).

use tracing::warn;

use crate::backend::input::{Axis, ButtonState, Event, EventKind, KeyState};
use crate::utils::{Point, Raw};

use super::dispatcher::DeviceContext;
use super::keys::{classify, KeyClass};
use super::raw::{
    RawEvent, ABS_MT_POSITION_X, ABS_MT_POSITION_Y, ABS_MT_SLOT, ABS_MT_TRACKING_ID, ABS_X, ABS_Y,
    BTN_TOUCH, EV_ABS, EV_KEY, EV_LED, EV_REL, EV_SYN, REL_HWHEEL, REL_WHEEL, REL_X, REL_Y, SYN_REPORT,
};
use super::touch::NO_SEAT_SLOT;

/// Scroll magnitude, in axis units, of one wheel "click" (spec §4.6).
const WHEEL_STEP: f64 = 10.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum PendingKind {
    #[default]
    None,
    RelativeMotion,
    AbsoluteMotion,
    AbsoluteMtDown,
    AbsoluteMtMotion,
    AbsoluteMtUp,
    AbsoluteTouchDown,
    AbsoluteTouchUp,
}

/// The generic fallback dispatcher implementing spec §4.4-§4.6.
#[derive(Debug, Default)]
pub struct FallbackDispatcher {
    pending: PendingKind,
    rel: Point<i32, Raw>,
    abs: Point<i32, Raw>,
}

impl FallbackDispatcher {
    /// A fresh dispatcher with no pending event and a zeroed accumulator.
    pub fn new() -> Self {
        Self::default()
    }

    pub(super) fn process_event(&mut self, ctx: &mut DeviceContext<'_>, event: RawEvent, out: &mut Vec<Event>) {
        let time = event.time_ms();
        match event.event_type {
            EV_REL => self.handle_rel(ctx, event, time, out),
            EV_ABS => self.handle_abs(ctx, event, time, out),
            EV_KEY => self.handle_key(ctx, event, time, out),
            EV_SYN => self.handle_syn(ctx, event, time, out),
            EV_LED => { /* recipient only; LED output is a separate write path, spec §4.5 */ }
            _ => {}
        }
    }

    pub(super) fn destroy(&mut self, ctx: &mut DeviceContext<'_>, time: u32, out: &mut Vec<Event>) {
        let mut down: Vec<u16> = ctx.keys.currently_down().collect();
        down.sort_unstable();
        for code in down {
            ctx.keys.clear(code);
            let kind = match classify(code) {
                KeyClass::Button => EventKind::PointerButton {
                    code,
                    state: ButtonState::Released,
                },
                _ => EventKind::KeyboardKey {
                    code,
                    state: KeyState::Released,
                },
            };
            out.push(Event::new(ctx.device.clone(), time, kind));
        }
    }

    fn handle_rel(&mut self, ctx: &mut DeviceContext<'_>, event: RawEvent, time: u32, out: &mut Vec<Event>) {
        match event.code {
            REL_X | REL_Y => {
                if self.pending != PendingKind::RelativeMotion {
                    self.flush(ctx, time, out);
                    self.pending = PendingKind::RelativeMotion;
                }
                if event.code == REL_X {
                    self.rel.x += event.value;
                } else {
                    self.rel.y += event.value;
                }
            }
            REL_WHEEL => {
                self.flush(ctx, time, out);
                out.push(Event::new(
                    ctx.device.clone(),
                    time,
                    EventKind::PointerAxis {
                        axis: Axis::Vertical,
                        value: -(event.value as f64) * WHEEL_STEP,
                    },
                ));
            }
            REL_HWHEEL => {
                self.flush(ctx, time, out);
                if event.value == 1 || event.value == -1 {
                    out.push(Event::new(
                        ctx.device.clone(),
                        time,
                        EventKind::PointerAxis {
                            axis: Axis::Horizontal,
                            value: event.value as f64 * WHEEL_STEP,
                        },
                    ));
                }
            }
            _ => {}
        }
    }

    fn handle_abs(&mut self, ctx: &mut DeviceContext<'_>, event: RawEvent, time: u32, out: &mut Vec<Event>) {
        match event.code {
            ABS_X | ABS_Y if ctx.slots.is_none() => {
                if event.code == ABS_X {
                    self.abs.x = event.value;
                } else {
                    self.abs.y = event.value;
                }
                if self.pending == PendingKind::None {
                    self.pending = PendingKind::AbsoluteMotion;
                }
            }
            ABS_MT_SLOT => {
                self.flush(ctx, time, out);
                if let Some(slots) = ctx.slots.as_deref_mut() {
                    slots.set_current_slot(event.value);
                }
            }
            ABS_MT_TRACKING_ID => {
                let down = event.value >= 0;
                if matches!(self.pending, PendingKind::None | PendingKind::AbsoluteMtMotion) {
                    self.pending = if down {
                        PendingKind::AbsoluteMtDown
                    } else {
                        PendingKind::AbsoluteMtUp
                    };
                } else {
                    self.flush(ctx, time, out);
                    self.pending = if down {
                        PendingKind::AbsoluteMtDown
                    } else {
                        PendingKind::AbsoluteMtUp
                    };
                }
            }
            ABS_MT_POSITION_X | ABS_MT_POSITION_Y => {
                if let Some(slots) = ctx.slots.as_deref_mut() {
                    if let Some(record) = slots.current_mut() {
                        if event.code == ABS_MT_POSITION_X {
                            record.position.x = event.value;
                        } else {
                            record.position.y = event.value;
                        }
                    }
                }
                if self.pending == PendingKind::None {
                    self.pending = PendingKind::AbsoluteMtMotion;
                }
            }
            _ => {}
        }
    }

    fn handle_key(&mut self, ctx: &mut DeviceContext<'_>, event: RawEvent, time: u32, out: &mut Vec<Event>) {
        if event.value == 2 {
            return; // auto-repeat, never notified (P7)
        }
        if event.code == BTN_TOUCH && ctx.slots.is_none() {
            if !matches!(self.pending, PendingKind::None | PendingKind::AbsoluteMotion) {
                self.flush(ctx, time, out);
            }
            self.pending = if event.value != 0 {
                PendingKind::AbsoluteTouchDown
            } else {
                PendingKind::AbsoluteTouchUp
            };
            return;
        }

        self.flush(ctx, time, out);

        let class = classify(event.code);
        if class == KeyClass::None {
            return;
        }

        let pressed = event.value != 0;
        if !pressed && !ctx.keys.test_bit(event.code) {
            return; // release of a key never recorded as down: kernel quirk, suppressed
        }

        ctx.keys.set_bit(event.code, pressed);
        let count = ctx.keys.update_count(event.code, pressed);
        let notify = if pressed { count == 1 } else { count == 0 };
        if !notify {
            return;
        }

        let kind = match class {
            KeyClass::Key => EventKind::KeyboardKey {
                code: event.code,
                state: KeyState::from(pressed),
            },
            KeyClass::Button => EventKind::PointerButton {
                code: event.code,
                state: ButtonState::from(pressed),
            },
            KeyClass::None => unreachable!("checked above"),
        };
        out.push(Event::new(ctx.device.clone(), time, kind));
    }

    fn handle_syn(&mut self, ctx: &mut DeviceContext<'_>, event: RawEvent, time: u32, out: &mut Vec<Event>) {
        if event.code != SYN_REPORT {
            return;
        }
        let touch_flushed = self.flush(ctx, time, out);
        if ctx.touch_capable && touch_flushed {
            out.push(Event::new(ctx.device.clone(), time, EventKind::TouchFrame));
        }
    }

    /// Flush the pending event, emitting the notification it implies, and
    /// reset `pending` to `NONE` unconditionally (spec §4.4 "Flush semantics").
    ///
    /// Returns whether a touch-class event was flushed, to gate the
    /// touch-frame notification emitted by the caller on `SYN_REPORT`.
    fn flush(&mut self, ctx: &mut DeviceContext<'_>, time: u32, out: &mut Vec<Event>) -> bool {
        let pending = self.pending;
        self.pending = PendingKind::None;

        match pending {
            PendingKind::None => false,

            PendingKind::RelativeMotion => {
                let (dx, dy) = (self.rel.x, self.rel.y);
                self.rel = Point::default();
                let (fdx, fdy) = ctx.accel.filter(dx, dy, time);
                if fdx != 0.0 || fdy != 0.0 {
                    out.push(Event::new(
                        ctx.device.clone(),
                        time,
                        EventKind::PointerMotion { dx: fdx, dy: fdy },
                    ));
                }
                false
            }

            PendingKind::AbsoluteMotion => {
                let (cx, cy) = ctx.calibration.transform(self.abs).into();
                if ctx.touch_capable {
                    if *ctx.single_touch_seat_slot != NO_SEAT_SLOT {
                        out.push(Event::new(
                            ctx.device.clone(),
                            time,
                            EventKind::TouchMotion {
                                slot: -1,
                                seat_slot: *ctx.single_touch_seat_slot,
                                x: cx,
                                y: cy,
                            },
                        ));
                        true
                    } else {
                        false
                    }
                } else {
                    out.push(Event::new(
                        ctx.device.clone(),
                        time,
                        EventKind::PointerMotionAbsolute { x: cx, y: cy },
                    ));
                    false
                }
            }

            PendingKind::AbsoluteTouchDown => {
                if *ctx.single_touch_seat_slot != NO_SEAT_SLOT {
                    warn!(target: "evseat::touch", "touch-down on an already-down single-touch contact");
                    return true;
                }
                let seat_slot = ctx.seat.acquire();
                if seat_slot == NO_SEAT_SLOT {
                    return true;
                }
                *ctx.single_touch_seat_slot = seat_slot;
                let (cx, cy) = ctx.calibration.transform(self.abs).into();
                out.push(Event::new(
                    ctx.device.clone(),
                    time,
                    EventKind::TouchDown {
                        slot: -1,
                        seat_slot,
                        x: cx,
                        y: cy,
                    },
                ));
                true
            }

            PendingKind::AbsoluteTouchUp => {
                let seat_slot = *ctx.single_touch_seat_slot;
                if seat_slot != NO_SEAT_SLOT {
                    ctx.seat.release(seat_slot);
                    *ctx.single_touch_seat_slot = NO_SEAT_SLOT;
                    out.push(Event::new(
                        ctx.device.clone(),
                        time,
                        EventKind::TouchUp { slot: -1, seat_slot },
                    ));
                }
                true
            }

            PendingKind::AbsoluteMtDown => {
                let Some(slots) = ctx.slots.as_deref_mut() else {
                    return false;
                };
                let slot_index = slots.current_slot();
                let Some(record) = slots.current_mut() else {
                    return false;
                };
                if record.seat_slot != NO_SEAT_SLOT {
                    warn!(target: "evseat::touch", slot = slot_index, "touch-down on an already-down MT slot");
                    return true;
                }
                let seat_slot = ctx.seat.acquire();
                if seat_slot == NO_SEAT_SLOT {
                    return true;
                }
                record.seat_slot = seat_slot;
                let position = record.position;
                let (cx, cy) = ctx.calibration.transform(position).into();
                out.push(Event::new(
                    ctx.device.clone(),
                    time,
                    EventKind::TouchDown {
                        slot: slot_index,
                        seat_slot,
                        x: cx,
                        y: cy,
                    },
                ));
                true
            }

            PendingKind::AbsoluteMtMotion => {
                let Some(slots) = ctx.slots.as_deref_mut() else {
                    return false;
                };
                let slot_index = slots.current_slot();
                let Some(record) = slots.current() else {
                    return false;
                };
                if record.seat_slot == NO_SEAT_SLOT {
                    return false;
                }
                let (position, seat_slot) = (record.position, record.seat_slot);
                let (cx, cy) = ctx.calibration.transform(position).into();
                out.push(Event::new(
                    ctx.device.clone(),
                    time,
                    EventKind::TouchMotion {
                        slot: slot_index,
                        seat_slot,
                        x: cx,
                        y: cy,
                    },
                ));
                true
            }

            PendingKind::AbsoluteMtUp => {
                let Some(slots) = ctx.slots.as_deref_mut() else {
                    return false;
                };
                let slot_index = slots.current_slot();
                let Some(record) = slots.current_mut() else {
                    return false;
                };
                let seat_slot = record.seat_slot;
                if seat_slot != NO_SEAT_SLOT {
                    record.seat_slot = NO_SEAT_SLOT;
                    ctx.seat.release(seat_slot);
                    out.push(Event::new(
                        ctx.device.clone(),
                        time,
                        EventKind::TouchUp { slot: slot_index, seat_slot },
                    ));
                }
                true
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::backend::evdev::accel::IdentityFilter;
    use crate::backend::evdev::calibration::{CalibrationMatrix, EffectiveCalibration};
    use crate::backend::evdev::keys::KeyBookkeeping;
    use crate::backend::evdev::raw::AbsInfo;
    use crate::backend::evdev::touch::{SeatSlotMap, SlotTable};
    use std::sync::Arc;

    fn raw(event_type: u16, code: u16, value: i32, seconds: i64) -> RawEvent {
        RawEvent {
            seconds,
            microseconds: 0,
            event_type,
            code,
            value,
        }
    }

    struct Fixture {
        keys: KeyBookkeeping,
        slots: Option<SlotTable>,
        single_touch_seat_slot: i32,
        calibration: EffectiveCalibration,
        seat: SeatSlotMap,
        accel: IdentityFilter,
        touch_capable: bool,
        device: Arc<str>,
    }

    impl Fixture {
        fn pointer() -> Self {
            Fixture {
                keys: KeyBookkeeping::new(),
                slots: None,
                single_touch_seat_slot: NO_SEAT_SLOT,
                calibration: EffectiveCalibration::default(),
                seat: SeatSlotMap::new(),
                accel: IdentityFilter,
                touch_capable: false,
                device: Arc::from("test0"),
            }
        }

        fn multitouch(max_slot: i32) -> Self {
            Fixture {
                slots: Some(SlotTable::new(max_slot, 0)),
                touch_capable: true,
                ..Self::pointer()
            }
        }

        fn ctx(&mut self) -> DeviceContext<'_> {
            DeviceContext {
                keys: &mut self.keys,
                slots: self.slots.as_mut(),
                single_touch_seat_slot: &mut self.single_touch_seat_slot,
                calibration: &self.calibration,
                seat: &mut self.seat,
                accel: &mut self.accel,
                touch_capable: self.touch_capable,
                device: &self.device,
            }
        }
    }

    #[test]
    fn mouse_motion_then_button() {
        let mut fixture = Fixture::pointer();
        let mut dispatcher = FallbackDispatcher::new();
        let mut out = Vec::new();

        let mut ctx = fixture.ctx();
        for event in [
            raw(EV_REL, REL_X, 3, 0),
            raw(EV_REL, REL_Y, -2, 0),
            raw(EV_SYN, SYN_REPORT, 0, 0),
            raw(EV_KEY, 0x110, 1, 0),
            raw(EV_SYN, SYN_REPORT, 0, 0),
        ] {
            dispatcher.process_event(&mut ctx, event, &mut out);
        }

        assert_eq!(
            out,
            vec![
                Event::new(fixture.device.clone(), 0, EventKind::PointerMotion { dx: 3.0, dy: -2.0 }),
                Event::new(
                    fixture.device.clone(),
                    0,
                    EventKind::PointerButton {
                        code: 0x110,
                        state: ButtonState::Pressed
                    }
                ),
            ]
        );
    }

    #[test]
    fn multitouch_two_finger_tap() {
        let mut fixture = Fixture::multitouch(1);
        let mut dispatcher = FallbackDispatcher::new();
        let mut out = Vec::new();

        {
            let mut ctx = fixture.ctx();
            for event in [
                raw(EV_ABS, ABS_MT_SLOT, 0, 0),
                raw(EV_ABS, ABS_MT_TRACKING_ID, 77, 0),
                raw(EV_ABS, ABS_MT_POSITION_X, 100, 0),
                raw(EV_ABS, ABS_MT_POSITION_Y, 200, 0),
                raw(EV_ABS, ABS_MT_SLOT, 1, 0),
                raw(EV_ABS, ABS_MT_TRACKING_ID, 78, 0),
                raw(EV_ABS, ABS_MT_POSITION_X, 300, 0),
                raw(EV_ABS, ABS_MT_POSITION_Y, 400, 0),
                raw(EV_SYN, SYN_REPORT, 0, 0),
            ] {
                dispatcher.process_event(&mut ctx, event, &mut out);
            }
        }

        assert_eq!(
            out,
            vec![
                Event::new(
                    fixture.device.clone(),
                    0,
                    EventKind::TouchDown {
                        slot: 0,
                        seat_slot: 0,
                        x: 100.0,
                        y: 200.0
                    }
                ),
                Event::new(
                    fixture.device.clone(),
                    0,
                    EventKind::TouchDown {
                        slot: 1,
                        seat_slot: 1,
                        x: 300.0,
                        y: 400.0
                    }
                ),
                Event::new(fixture.device.clone(), 0, EventKind::TouchFrame),
            ]
        );

        out.clear();
        {
            let mut ctx = fixture.ctx();
            for event in [
                raw(EV_ABS, ABS_MT_SLOT, 0, 1),
                raw(EV_ABS, ABS_MT_TRACKING_ID, -1, 1),
                raw(EV_ABS, ABS_MT_SLOT, 1, 1),
                raw(EV_ABS, ABS_MT_TRACKING_ID, -1, 1),
                raw(EV_SYN, SYN_REPORT, 0, 1),
            ] {
                dispatcher.process_event(&mut ctx, event, &mut out);
            }
        }

        assert_eq!(
            out,
            vec![
                Event::new(
                    fixture.device.clone(),
                    1000,
                    EventKind::TouchUp { slot: 0, seat_slot: 0 }
                ),
                Event::new(
                    fixture.device.clone(),
                    1000,
                    EventKind::TouchUp { slot: 1, seat_slot: 1 }
                ),
                Event::new(fixture.device.clone(), 1000, EventKind::TouchFrame),
            ]
        );
        assert!(fixture.seat.is_empty());
    }

    #[test]
    fn calibration_applied_to_touch() {
        // Same independently hand-derived case as calibration.rs's
        // `calibration_applied_to_raw_point`: power-of-two axis spans
        // (x: [0,1023], span 1024; y: [0,511], span 512) and a matrix with
        // exactly-binary-representable coefficients, so the expected value
        // is not computed by calling the code under test.
        let mut fixture = Fixture::multitouch(0);
        let abs_x = AbsInfo {
            value: 0,
            minimum: 0,
            maximum: 1023,
            fuzz: 0,
            flat: 0,
            resolution: 0,
        };
        let abs_y = AbsInfo {
            value: 0,
            minimum: 0,
            maximum: 511,
            fuzz: 0,
            flat: 0,
            resolution: 0,
        };
        let matrix = CalibrationMatrix::from_6_floats([2.0, 0.0, 0.25, 0.0, 3.0, 0.5]);
        fixture.calibration.set_user_matrix(matrix, &abs_x, &abs_y);
        let expected = (1280.0, 1024.0);

        let mut dispatcher = FallbackDispatcher::new();
        let mut out = Vec::new();
        let mut ctx = fixture.ctx();
        for event in [
            raw(EV_ABS, ABS_MT_SLOT, 0, 0),
            raw(EV_ABS, ABS_MT_TRACKING_ID, 1, 0),
            raw(EV_ABS, ABS_MT_POSITION_X, 512, 0),
            raw(EV_ABS, ABS_MT_POSITION_Y, 256, 0),
            raw(EV_SYN, SYN_REPORT, 0, 0),
        ] {
            dispatcher.process_event(&mut ctx, event, &mut out);
        }

        match out[0].kind {
            EventKind::TouchDown { x, y, .. } => {
                assert_eq!((x, y), expected);
            }
            _ => panic!("expected a touch-down notification"),
        }
    }

    #[test]
    fn release_of_never_pressed_is_suppressed() {
        let mut fixture = Fixture::pointer();
        let mut dispatcher = FallbackDispatcher::new();
        let mut out = Vec::new();
        let mut ctx = fixture.ctx();
        dispatcher.process_event(&mut ctx, raw(EV_KEY, 30, 0, 0), &mut out);
        assert!(out.is_empty());
        assert_eq!(fixture.keys.press_count(30), 0);
    }

    #[test]
    fn auto_repeat_never_notifies() {
        let mut fixture = Fixture::pointer();
        let mut dispatcher = FallbackDispatcher::new();
        let mut out = Vec::new();
        let mut ctx = fixture.ctx();
        dispatcher.process_event(&mut ctx, raw(EV_KEY, 30, 1, 0), &mut out);
        out.clear();
        dispatcher.process_event(&mut ctx, raw(EV_KEY, 30, 2, 0), &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn device_removal_synthesizes_releases_in_ascending_order() {
        let mut fixture = Fixture::pointer();
        let mut dispatcher = FallbackDispatcher::new();
        let mut out = Vec::new();
        {
            let mut ctx = fixture.ctx();
            dispatcher.process_event(&mut ctx, raw(EV_KEY, 48, 1, 0), &mut out);
            dispatcher.process_event(&mut ctx, raw(EV_KEY, 30, 1, 0), &mut out);
        }
        out.clear();

        let mut ctx = fixture.ctx();
        dispatcher.destroy(&mut ctx, 5000, &mut out);

        assert_eq!(
            out,
            vec![
                Event::new(
                    fixture.device.clone(),
                    5000,
                    EventKind::KeyboardKey {
                        code: 30,
                        state: KeyState::Released
                    }
                ),
                Event::new(
                    fixture.device.clone(),
                    5000,
                    EventKind::KeyboardKey {
                        code: 48,
                        state: KeyState::Released
                    }
                ),
            ]
        );
    }
}
