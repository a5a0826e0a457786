//! Per-device evdev adapter: owns the file descriptor (via a
//! [`RawEventSource`] collaborator), capability set, multi-touch slot
//! table, calibration, and a pluggable [`Dispatcher`] (spec §2 items 5, 8).

pub mod accel;
pub mod calibration;
pub mod dispatcher;
pub mod error;
pub mod keys;
pub mod pending;
pub mod raw;
pub mod touch;

pub use accel::{AccelerationFilter, IdentityFilter};
pub use calibration::{CalibrationMatrix, EffectiveCalibration};
pub use dispatcher::{DeviceContext, Dispatcher};
pub use error::{DeviceOutcome, DispatchError};
pub use pending::FallbackDispatcher;
pub use raw::{AbsInfo, RawEvent, RawEventSource, ReadOutcome, SyncOutcome};
pub use touch::SlotTable;

use std::cell::RefCell;
use std::fmt;
use std::os::unix::io::{AsRawFd, RawFd};
use std::rc::Rc;

use calloop::{EventSource, Interest, Mode, Poll, PostAction, Readiness, Token, TokenFactory};
use tracing::{error, info_span, warn, Span};

use crate::backend::input::{Capabilities, DeviceId, Event, Seat, SeatSlotMap, NO_SEAT_SLOT};
use crate::utils::{Clock, Monotonic, Physical, Size};
use keys::{classify, KeyBookkeeping, KeyClass};
use raw::{BTN_TOUCH, EV_SYN, SYN_DROPPED};

/// Declared capabilities of an event device, as queried by the caller's
/// event-stream library before a device is constructed (spec §4.7).
///
/// Probing `EVIOCGBIT`/`EVIOCGABS`-style bitmaps is the "low-level event
/// decoding" spec §1 assumes is supplied externally; this struct is the
/// boundary where that result crosses into this pipeline.
#[derive(Debug, Clone, Default)]
pub struct DeviceProbe {
    /// `ABS_X` metadata, if the device reports it.
    pub abs_x: Option<AbsInfo>,
    /// `ABS_Y` metadata, if the device reports it.
    pub abs_y: Option<AbsInfo>,
    /// Whether the device reports `REL_X`/`REL_Y`.
    pub has_rel: bool,
    /// Whether the device reports `ABS_MT_POSITION_X`/`ABS_MT_POSITION_Y`.
    pub has_mt_position: bool,
    /// The device's maximum multi-touch slot index, if it has `ABS_MT_SLOT`.
    pub mt_slot_count: Option<i32>,
    /// The device's currently active multi-touch slot at probe time.
    pub mt_current_slot: i32,
    /// Every `EV_KEY` code the device advertises support for.
    pub supported_keys: Vec<u16>,
    /// Whether the device reports any `EV_LED`.
    pub has_led: bool,
    /// Whether the device advertises an indirect pointer with a finger tool
    /// but no pen — the touchpad heuristic (spec §4.7).
    pub is_indirect_finger_no_pen: bool,
}

fn detect_capabilities(probe: &DeviceProbe) -> Capabilities {
    let has_abs = probe.abs_x.is_some() && probe.abs_y.is_some();
    // Matches the original's unconditional check: BTN_TOUCH alone sets
    // has_touch, independent of whether the device also reports ABS_X/Y.
    let has_touch = probe.has_mt_position || probe.supported_keys.contains(&BTN_TOUCH);

    let mut has_keyboard = false;
    let mut has_button = false;
    for &code in &probe.supported_keys {
        match classify(code) {
            KeyClass::Key => has_keyboard = true,
            KeyClass::Button => has_button = true,
            KeyClass::None => {}
        }
    }

    let mut capabilities = Capabilities::empty();
    if (has_abs || probe.has_rel) && has_button {
        capabilities |= Capabilities::POINTER;
    }
    if has_keyboard || probe.has_led {
        capabilities |= Capabilities::KEYBOARD;
    }
    // Buttons plus touch is a touchpad, not a touch device (spec §4.7, §9 open question b).
    if has_touch && !has_button {
        capabilities |= Capabilities::TOUCH;
    }
    capabilities
}

fn now_ms() -> u32 {
    Clock::<Monotonic>::new().now().as_millis()
}

/// A synthetic `SYN_REPORT` used to flush a mid-frame accumulator ahead of
/// a resync sequence (spec §4.8), or to synthesize a removal timestamp.
fn syn_report_at(time_ms: u32) -> RawEvent {
    RawEvent {
        seconds: (time_ms / 1000) as i64,
        microseconds: ((time_ms % 1000) * 1000) as i64,
        event_type: EV_SYN,
        code: raw::SYN_REPORT,
        value: 0,
    }
}

/// A single evdev character device's event-processing pipeline.
///
/// Generic over the [`RawEventSource`] collaborator that supplies decoded
/// events; callers typically instantiate this over their own ioctl/read
/// wrapper around `/dev/input/eventN`.
pub struct EvdevDevice<S: RawEventSource> {
    id: DeviceId,
    span: Span,
    source: S,
    capabilities: Capabilities,
    keys: KeyBookkeeping,
    slots: Option<SlotTable>,
    single_touch_seat_slot: i32,
    calibration: EffectiveCalibration,
    abs_x: Option<AbsInfo>,
    abs_y: Option<AbsInfo>,
    /// Set when the kernel reported a zero resolution and this pipeline
    /// synthesized `1` in its place (spec §4.7); physical-size queries
    /// downstream must then refuse to answer.
    fake_resolution: bool,
    accel: Box<dyn AccelerationFilter>,
    dispatcher: Dispatcher,
    seat: Rc<RefCell<SeatSlotMap>>,
    in_sync: bool,
    token: Option<Token>,
}

impl<S: RawEventSource> fmt::Debug for EvdevDevice<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EvdevDevice")
            .field("id", &self.id)
            .field("capabilities", &self.capabilities)
            .field("in_sync", &self.in_sync)
            .finish_non_exhaustive()
    }
}

impl<S: RawEventSource> EvdevDevice<S> {
    /// Create a device, probing capabilities and wiring up calibration.
    ///
    /// Returns [`DeviceOutcome::Unhandled`] (not an error) if the probe
    /// grants no seat capability at all (spec §4.7, §7).
    pub fn new(
        name: impl Into<DeviceId>,
        source: S,
        probe: &DeviceProbe,
        accel: Box<dyn AccelerationFilter>,
        seat: &Seat,
        default_calibration: Option<CalibrationMatrix>,
    ) -> DeviceOutcome<Self> {
        let id: DeviceId = name.into();
        let span = info_span!("evdev_device", sysname = %id);
        let _entered = span.enter();

        if probe.is_indirect_finger_no_pen && !probe.supported_keys.is_empty() {
            warn!(
                target: "evseat::evdev",
                "touchpad-classified device handled by the generic fallback pipeline; \
                 specialized gesture dispatch is out of scope"
            );
        }

        let capabilities = detect_capabilities(probe);
        if capabilities.is_empty() {
            drop(_entered);
            return DeviceOutcome::Unhandled;
        }

        let mut abs_x = probe.abs_x;
        let mut abs_y = probe.abs_y;
        let mut fake_resolution = false;
        for info in [&mut abs_x, &mut abs_y].into_iter().flatten() {
            if info.resolution == 0 {
                info.resolution = 1;
                fake_resolution = true;
            }
        }

        let slots = if probe.has_mt_position {
            probe
                .mt_slot_count
                .map(|max_slot| SlotTable::new(max_slot, probe.mt_current_slot))
        } else {
            None
        };

        let mut calibration = EffectiveCalibration::default();
        if let (Some(default), Some(x), Some(y)) = (default_calibration, &abs_x, &abs_y) {
            calibration.set_default_matrix(default, x, y);
        }

        drop(_entered);

        DeviceOutcome::Handled(EvdevDevice {
            id,
            span,
            source,
            capabilities,
            keys: KeyBookkeeping::new(),
            slots,
            single_touch_seat_slot: NO_SEAT_SLOT,
            calibration,
            abs_x,
            abs_y,
            fake_resolution,
            accel,
            dispatcher: Dispatcher::fallback(),
            seat: seat.slots(),
            in_sync: false,
            token: None,
        })
    }

    /// This device's identifier.
    pub fn id(&self) -> &DeviceId {
        &self.id
    }

    /// The seat capabilities this device was granted at creation (immutable, spec §3).
    pub fn capabilities(&self) -> Capabilities {
        self.capabilities
    }

    /// Whether the kernel-reported resolution was absent and synthesized (spec §4.7).
    pub fn has_fake_resolution(&self) -> bool {
        self.fake_resolution
    }

    /// Whether this device supports calibration (`ABS_X` and `ABS_Y` both present, spec §6).
    pub fn supports_calibration(&self) -> bool {
        self.abs_x.is_some() && self.abs_y.is_some()
    }

    /// The current user calibration matrix.
    pub fn calibration_matrix(&self) -> CalibrationMatrix {
        self.calibration.user_matrix()
    }

    /// The environment-provided default calibration matrix.
    pub fn default_calibration_matrix(&self) -> CalibrationMatrix {
        self.calibration.default_matrix()
    }

    /// Set the user calibration matrix (spec §6 "Configuration").
    ///
    /// No-op if this device doesn't support calibration.
    pub fn set_calibration_matrix(&mut self, matrix: CalibrationMatrix) {
        if let (Some(x), Some(y)) = (&self.abs_x, &self.abs_y) {
            self.calibration.set_user_matrix(matrix, x, y);
        }
    }

    /// The device's physical size in millimeters, derived from the kernel's
    /// reported absolute range and resolution.
    ///
    /// Returns `None` if either axis is missing or the resolution was
    /// synthesized (spec §4.7: "physical-size queries must then fail").
    pub fn physical_size(&self) -> Option<Size<f64, Physical>> {
        if self.fake_resolution {
            return None;
        }
        let (x, y) = (self.abs_x?, self.abs_y?);
        Some(Size::new(
            x.span() as f64 / x.resolution as f64,
            y.span() as f64 / y.resolution as f64,
        ))
    }

    /// Write LED output. The write result is ignored; hardware LED state
    /// is best-effort (spec §4.5).
    pub fn set_leds(&mut self, num_lock: bool, caps_lock: bool, scroll_lock: bool) {
        let events = [
            RawEvent {
                seconds: 0,
                microseconds: 0,
                event_type: raw::EV_LED,
                code: raw::LED_NUML,
                value: num_lock as i32,
            },
            RawEvent {
                seconds: 0,
                microseconds: 0,
                event_type: raw::EV_LED,
                code: raw::LED_CAPSL,
                value: caps_lock as i32,
            },
            RawEvent {
                seconds: 0,
                microseconds: 0,
                event_type: raw::EV_LED,
                code: raw::LED_SCROLLL,
                value: scroll_lock as i32,
            },
            syn_report_at(now_ms()),
        ];
        let _ = self.source.write_leds(&events);
    }

    /// Drain every available event from the source, dispatching each one
    /// and returning the notifications they produced.
    ///
    /// Drives the resynchronization sub-loop transparently when the source
    /// reports a dropped-events condition (spec §4.8, §5).
    pub fn dispatch(&mut self) -> Result<Vec<Event>, DispatchError> {
        let _entered = self.span.enter();
        let mut out = Vec::new();
        loop {
            if self.in_sync {
                match self.source.read_sync()? {
                    SyncOutcome::Event(event) => self.process(event, &mut out),
                    SyncOutcome::Done => self.in_sync = false,
                }
                continue;
            }
            match self.source.read()? {
                ReadOutcome::Event(event) if event.event_type == EV_SYN && event.code == SYN_DROPPED => {
                    self.begin_resync(event.time_ms(), &mut out);
                }
                ReadOutcome::Event(event) => self.process(event, &mut out),
                ReadOutcome::WouldBlock => break,
            }
        }
        Ok(out)
    }

    fn begin_resync(&mut self, time_ms: u32, out: &mut Vec<Event>) {
        self.process(syn_report_at(time_ms), out);
        self.in_sync = true;
    }

    fn process(&mut self, event: RawEvent, out: &mut Vec<Event>) {
        let mut seat = self.seat.borrow_mut();
        let mut ctx = DeviceContext {
            keys: &mut self.keys,
            slots: self.slots.as_mut(),
            single_touch_seat_slot: &mut self.single_touch_seat_slot,
            calibration: &self.calibration,
            seat: &mut seat,
            accel: &mut *self.accel,
            touch_capable: self.capabilities.contains(Capabilities::TOUCH),
            device: &self.id,
        };
        self.dispatcher.process_event(&mut ctx, event, out);
    }

    /// Deregister and tear the device down, synthesizing release
    /// notifications for everything still held (spec §3 "Lifecycles", §5).
    ///
    /// Mid-dispatch removal is unsupported: the caller must not call
    /// [`dispatch`](Self::dispatch) concurrently with this.
    pub fn remove(mut self) -> Vec<Event> {
        let _entered = self.span.enter();
        let time = now_ms();
        let mut out = Vec::new();
        let mut seat = self.seat.borrow_mut();
        let mut ctx = DeviceContext {
            keys: &mut self.keys,
            slots: self.slots.as_mut(),
            single_touch_seat_slot: &mut self.single_touch_seat_slot,
            calibration: &self.calibration,
            seat: &mut seat,
            accel: &mut *self.accel,
            touch_capable: self.capabilities.contains(Capabilities::TOUCH),
            device: &self.id,
        };
        self.dispatcher.destroy(&mut ctx, time, &mut out);
        drop(ctx);
        drop(seat);
        out
    }
}

impl<S: RawEventSource + AsRawFd> AsRawFd for EvdevDevice<S> {
    fn as_raw_fd(&self) -> RawFd {
        self.source.as_raw_fd()
    }
}

/// Plugs a device into a `calloop` event loop: readiness on the
/// underlying fd drains the device via [`EvdevDevice::dispatch`] and
/// hands each notification to the loop's callback (spec §5: "the
/// dispatch entry point is invoked by an external event loop when the
/// device file descriptor is readable").
impl<S: RawEventSource + AsRawFd> EventSource for EvdevDevice<S> {
    type Event = Event;
    type Metadata = ();
    type Ret = ();
    type Error = DispatchError;

    fn process_events<F>(
        &mut self,
        _: Readiness,
        token: Token,
        mut callback: F,
    ) -> Result<PostAction, Self::Error>
    where
        F: FnMut(Self::Event, &mut ()),
    {
        if Some(token) != self.token {
            return Ok(PostAction::Continue);
        }
        for event in self.dispatch()? {
            callback(event, &mut ());
        }
        Ok(PostAction::Continue)
    }

    fn register(&mut self, poll: &mut Poll, factory: &mut TokenFactory) -> calloop::Result<()> {
        self.token = Some(factory.token());
        poll.register(self.as_raw_fd(), Interest::READ, Mode::Level, self.token.unwrap())
    }

    fn reregister(&mut self, poll: &mut Poll, factory: &mut TokenFactory) -> calloop::Result<()> {
        self.token = Some(factory.token());
        poll.reregister(self.as_raw_fd(), Interest::READ, Mode::Level, self.token.unwrap())
    }

    fn unregister(&mut self, poll: &mut Poll) -> calloop::Result<()> {
        self.token = None;
        poll.unregister(self.as_raw_fd())
    }
}

/// Deregister a device's file descriptor from the event loop after a read
/// error other than would-block/interrupted (spec §7). This pipeline does
/// not own the event loop, so it only logs; the caller performs the
/// deregistration and decides whether to remove the device later.
pub fn log_dispatch_error(device: &DeviceId, err: &DispatchError) {
    error!(target: "evseat::evdev", device = %device, error = %err, "read loop error; deregistering fd");
}
