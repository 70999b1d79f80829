//! Polled, debounced push-button driver.
//!
//! ## Hardware
//!
//! Active-low momentary switch with pull-up (BOOT button on most ESP32
//! boards).  [`ButtonDriver::tick`] is called from the hub task's
//! housekeeping timer; a level must be stable for 40 ms to count.
//!
//! ## Gesture detection
//!
//! Gestures are classified on release by hold time.
//!
//! | Gesture        | Held            | Event           |
//! |----------------|-----------------|-----------------|
//! | Short press    | < 2 s           | `ShortPress`    |
//! | Long press     | 2 s ..< 5 s     | `LongPress`     |
//! | Very long      | >= 5 s          | `VeryLongPress` |

use embedded_hal::digital::InputPin;

pub const DEBOUNCE_MS: u32 = 40;
pub const LONG_PRESS_MS: u32 = 2_000;
pub const VERY_LONG_PRESS_MS: u32 = 5_000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ButtonEvent {
    ShortPress,
    LongPress,
    /// Factory reset.
    VeryLongPress,
}

impl ButtonEvent {
    fn classify(held_ms: u32) -> Self {
        if held_ms >= VERY_LONG_PRESS_MS {
            Self::VeryLongPress
        } else if held_ms >= LONG_PRESS_MS {
            Self::LongPress
        } else {
            Self::ShortPress
        }
    }
}

pub struct ButtonDriver<P> {
    pin: P,
    /// Last raw level and when it was first seen.
    raw_pressed: bool,
    raw_since_ms: u32,
    /// Debounced level.
    pressed: bool,
    pressed_at_ms: u32,
}

impl<P: InputPin> ButtonDriver<P> {
    pub fn new(pin: P) -> Self {
        Self {
            pin,
            raw_pressed: false,
            raw_since_ms: 0,
            pressed: false,
            pressed_at_ms: 0,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    /// Sample the pin.  Returns a gesture when a debounced release ends
    /// a press.
    pub fn tick(&mut self, now_ms: u32) -> Option<ButtonEvent> {
        // A read error counts as released.
        let raw = self.pin.is_low().unwrap_or(false);
        if raw != self.raw_pressed {
            self.raw_pressed = raw;
            self.raw_since_ms = now_ms;
            return None;
        }
        if raw == self.pressed || now_ms.wrapping_sub(self.raw_since_ms) < DEBOUNCE_MS {
            return None;
        }

        self.pressed = raw;
        if raw {
            self.pressed_at_ms = self.raw_since_ms;
            None
        } else {
            let held = self.raw_since_ms.wrapping_sub(self.pressed_at_ms);
            let event = ButtonEvent::classify(held);
            log::info!("Button: {:?} ({} ms)", event, held);
            Some(event)
        }
    }
}
