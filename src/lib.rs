#![warn(missing_docs, missing_debug_implementations, rust_2018_idioms)]
// Allow acronyms like EGL, MT, LED
#![allow(clippy::upper_case_acronyms)]

//! # evseat: the evdev pipeline for a compositor's input backend
//!
//! This crate turns raw kernel input events read from an evdev character
//! device into a normalized stream of pointer, keyboard and touch
//! notifications. It is the piece that sits between a `read()` on
//! `/dev/input/eventN` and a compositor's seat: coalescing partial axis
//! reports between `SYN_REPORT` boundaries, tracking multi-touch slots and
//! their seat-wide allocation, applying calibration to absolute
//! coordinates, and turning raw keycode transitions into edge-triggered
//! press/release notifications.
//!
//! ## Structure of the crate
//!
//! [`backend::input`] contains the vocabulary shared by any input source
//! (capabilities, key/button state, the outbound notification type).
//! [`backend::evdev`] contains the actual per-device pipeline: the pending-
//! event state machine, the multi-touch slot table, the calibration
//! matrix, and the per-device adapter that ties them together behind a
//! pluggable [`Dispatcher`](backend::evdev::Dispatcher).
//!
//! ## What this crate does not do
//!
//! Device discovery and hot-plug, decoding the wire format of an evdev
//! character device (that's the job of the [`RawEventSource`](backend::evdev::RawEventSource)
//! collaborator a caller supplies), touchpad gesture recognition, pointer
//! acceleration curves, keymap interpretation, and delivery to wayland
//! clients are all out of scope — see each module's documentation for the
//! exact collaborator boundary.

pub mod backend;
pub mod utils;
