//! Bit-set and fixed-capacity counter bookkeeping for keys and buttons
//! (spec §4.1).

use tracing::warn;

use super::raw::{
    BTN_DPAD_UP, BTN_GEAR_UP, BTN_MISC, BTN_TOUCH, BTN_TRIGGER_HAPPY40, KEY_CNT, KEY_ESC,
    KEY_LIGHTS_TOGGLE, KEY_MICMUTE, KEY_OK,
};

/// Sanity ceiling on a single keycode's press count. Exceeding it only logs
/// a diagnostic; per spec §9 this threshold is arbitrary and not a hard
/// limit on behavior.
const COUNT_SANITY_CEILING: u32 = 32;

/// How a keycode classifies for notification purposes (spec §4.4 "key classification").
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyClass {
    /// Not tracked as a keyboard key or pointer button (e.g. `BTN_TOUCH`, handled elsewhere).
    None,
    /// A keyboard key.
    Key,
    /// A pointer/gamepad-style button.
    Button,
}

/// Classify a keycode by its numeric range (spec §4.4).
pub fn classify(code: u16) -> KeyClass {
    if code == BTN_TOUCH {
        KeyClass::None
    } else if (KEY_ESC..=KEY_MICMUTE).contains(&code) || (KEY_OK..=KEY_LIGHTS_TOGGLE).contains(&code) {
        KeyClass::Key
    } else if (BTN_MISC..=BTN_GEAR_UP).contains(&code) || (BTN_DPAD_UP..=BTN_TRIGGER_HAPPY40).contains(&code) {
        KeyClass::Button
    } else {
        KeyClass::None
    }
}

/// A fixed-capacity bitmap of last-observed key state plus a parallel
/// per-keycode press-count array, sized to `KEY_CNT` (spec §3, §9: "do not
/// resize at runtime").
#[derive(Debug, Clone)]
pub struct KeyBookkeeping {
    mask: Box<[bool; KEY_CNT]>,
    counts: Box<[u32; KEY_CNT]>,
}

impl Default for KeyBookkeeping {
    fn default() -> Self {
        KeyBookkeeping {
            mask: Box::new([false; KEY_CNT]),
            counts: Box::new([0; KEY_CNT]),
        }
    }
}

impl KeyBookkeeping {
    /// Create a fresh bookkeeping table, all keys up, all counts zero.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the last-observed state of keycode `c`.
    pub fn set_bit(&mut self, code: u16, down: bool) {
        self.mask[code as usize] = down;
    }

    /// Last-observed state of keycode `c`.
    pub fn test_bit(&self, code: u16) -> bool {
        self.mask[code as usize]
    }

    /// Current press count of keycode `c`.
    pub fn press_count(&self, code: u16) -> u32 {
        self.counts[code as usize]
    }

    /// Increment or decrement the press count of `code` and return the new
    /// value. Logs a diagnostic instead of underflowing if asked to
    /// decrement a count already at zero (spec §4.1: "a lost press event"),
    /// and warns past the sanity ceiling.
    pub fn update_count(&mut self, code: u16, pressed: bool) -> u32 {
        let count = &mut self.counts[code as usize];
        if pressed {
            *count += 1;
            if *count > COUNT_SANITY_CEILING {
                warn!(target: "evseat::keys", code, count = *count, "key press count exceeded sanity ceiling");
            }
        } else if *count == 0 {
            warn!(target: "evseat::keys", code, "decrementing a key count already at zero");
        } else {
            *count -= 1;
        }
        *count
    }

    /// Force a keycode's count and last-observed state back to zero/up,
    /// without emitting a notification itself (the caller does that).
    pub fn clear(&mut self, code: u16) {
        self.counts[code as usize] = 0;
        self.mask[code as usize] = false;
    }

    /// Iterate all keycodes whose count is currently nonzero, in ascending
    /// order (used to synthesize release notifications on device removal,
    /// spec §3 "Lifecycles", scenario 6).
    pub fn currently_down(&self) -> impl Iterator<Item = u16> + '_ {
        self.counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(code, _)| code as u16)
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn classify_ranges() {
        assert_eq!(classify(BTN_TOUCH), KeyClass::None);
        assert_eq!(classify(KEY_ESC), KeyClass::Key);
        assert_eq!(classify(KEY_OK), KeyClass::Key);
        assert_eq!(classify(BTN_MISC), KeyClass::Button);
        assert_eq!(classify(BTN_DPAD_UP), KeyClass::Button);
        assert_eq!(classify(0xffff), KeyClass::None);
    }

    #[test]
    fn count_transitions() {
        let mut keys = KeyBookkeeping::new();
        assert_eq!(keys.update_count(30, true), 1);
        assert_eq!(keys.press_count(30), 1);
        assert_eq!(keys.update_count(30, false), 0);
        assert_eq!(keys.press_count(30), 0);
    }

    #[test]
    fn decrement_at_zero_does_not_underflow() {
        let mut keys = KeyBookkeeping::new();
        assert_eq!(keys.update_count(30, false), 0);
        assert_eq!(keys.press_count(30), 0);
    }

    #[test]
    fn currently_down_is_ascending() {
        let mut keys = KeyBookkeeping::new();
        keys.update_count(40, true);
        keys.update_count(30, true);
        assert_eq!(keys.currently_down().collect::<Vec<_>>(), vec![30, 40]);
    }
}
