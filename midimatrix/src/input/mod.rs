//! Input
//!
//! Two physical buttons, each reporting debounced `Released` and `Held`
//! presses. `Debouncer` turns raw line levels into those presses; the GPIO
//! character-device source (feature `gpio`) samples the lines and feeds
//! them through it.

#[cfg(feature = "gpio")]
pub mod gpio;

use std::time::{Duration, Instant};

use crossbeam::channel;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Button {
    Previous,
    Select,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Press {
    /// Button went up. Sent after every press, including held ones.
    Released,
    /// Button stayed down past the hold threshold. Sent once per press.
    Held,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ButtonEvent {
    pub button: Button,
    pub press: Press,
}

impl ButtonEvent {
    pub fn new(button: Button, press: Press) -> ButtonEvent {
        ButtonEvent { button, press }
    }
}

#[derive(Debug)]
pub enum InputError {
    /// The input device could not be opened.
    Unavailable(String),
    /// Reading the line failed.
    Io(String),
}

/// A blocking source of button events. `Ok(None)` means the source is
/// exhausted and its thread may exit.
pub trait InputSource: Send {
    fn next_event(&mut self) -> Result<Option<ButtonEvent>, InputError>;
}

impl InputSource for channel::Receiver<ButtonEvent> {
    fn next_event(&mut self) -> Result<Option<ButtonEvent>, InputError> {
        Ok(self.recv().ok())
    }
}

pub const DEFAULT_BOUNCE: Duration = Duration::from_millis(20);
pub const DEFAULT_HOLD: Duration = Duration::from_millis(1000);

/// Turns sampled line levels into presses.
///
/// A level change only counts once it has been stable for `bounce`. A
/// press that stays down for `hold` reports `Held` once, then `Released`
/// when it comes up.
#[derive(Debug, Clone)]
pub struct Debouncer {
    bounce: Duration,
    hold: Duration,
    pressed: bool,
    candidate: Option<(bool, Instant)>,
    pressed_at: Option<Instant>,
    held_sent: bool,
}

impl Debouncer {
    pub fn new(bounce: Duration, hold: Duration) -> Debouncer {
        Debouncer {
            bounce,
            hold,
            pressed: false,
            candidate: None,
            pressed_at: None,
            held_sent: false,
        }
    }

    pub fn is_pressed(&self) -> bool {
        self.pressed
    }

    pub fn update(&mut self, raw: bool, now: Instant) -> Option<Press> {
        if raw != self.pressed {
            let since = match self.candidate {
                Some((level, since)) if level == raw => since,
                _ => {
                    self.candidate = Some((raw, now));
                    now
                }
            };
            if now.duration_since(since) >= self.bounce {
                self.candidate = None;
                self.pressed = raw;
                if raw {
                    self.pressed_at = Some(now);
                    self.held_sent = false;
                } else {
                    self.pressed_at = None;
                    return Some(Press::Released);
                }
            }
        } else {
            self.candidate = None;
        }

        match self.pressed_at {
            Some(at) if !self.held_sent && now.duration_since(at) >= self.hold => {
                self.held_sent = true;
                Some(Press::Held)
            }
            _ => None,
        }
    }
}

impl Default for Debouncer {
    fn default() -> Self {
        Debouncer::new(DEFAULT_BOUNCE, DEFAULT_HOLD)
    }
}
