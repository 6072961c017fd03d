//! Buttons on GPIO character-device lines.
//!
//! Lines are requested active-low: the buttons short to ground against the
//! pull-ups, so a pressed button reads 1.

use super::{Button, ButtonEvent, Debouncer, InputError, InputSource};

use std::thread;
use std::time::{Duration, Instant};

use linux_embedded_hal::gpio_cdev::{self, Chip, LineHandle, LineRequestFlags};

const POLL_INTERVAL: Duration = Duration::from_millis(5);

impl From<gpio_cdev::Error> for InputError {
    fn from(e: gpio_cdev::Error) -> Self {
        InputError::Io(e.to_string())
    }
}

pub struct GpioButton {
    button: Button,
    line: LineHandle,
    debouncer: Debouncer,
}

impl GpioButton {
    pub fn open(
        chip_path: &str,
        offset: u32,
        button: Button,
        debouncer: Debouncer,
    ) -> Result<GpioButton, InputError> {
        let mut chip = Chip::new(chip_path)
            .map_err(|e| InputError::Unavailable(format!("{}: {}", chip_path, e)))?;
        let consumer = match button {
            Button::Previous => "midimatrix-prev",
            Button::Select => "midimatrix-select",
        };
        let line = chip
            .get_line(offset)
            .and_then(|l| {
                l.request(
                    LineRequestFlags::INPUT | LineRequestFlags::ACTIVE_LOW,
                    0,
                    consumer,
                )
            })
            .map_err(|e| {
                InputError::Unavailable(format!("{} line {}: {}", chip_path, offset, e))
            })?;
        Ok(GpioButton {
            button,
            line,
            debouncer,
        })
    }
}

impl InputSource for GpioButton {
    fn next_event(&mut self) -> Result<Option<ButtonEvent>, InputError> {
        loop {
            let level = self.line.get_value()? != 0;
            if let Some(press) = self.debouncer.update(level, Instant::now()) {
                return Ok(Some(ButtonEvent::new(self.button, press)));
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}
