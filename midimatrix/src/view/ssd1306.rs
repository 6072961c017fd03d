//! SSD1306 128x64 OLED on a Linux I2C bus.

use super::{draw, DisplayError, DisplaySink, Primitive};

use embedded_graphics::geometry::Size;
use linux_embedded_hal::I2cdev;
use ::ssd1306::mode::BufferedGraphicsMode;
use ::ssd1306::prelude::{
    Brightness, DisplayConfig, DisplayRotation, DisplaySize128x64, I2CInterface,
};
use ::ssd1306::{I2CDisplayInterface, Ssd1306};

pub const DEFAULT_ADDRESS: u8 = 0x3C;

/// Pre-charge period used with a custom contrast, the driver's normal
/// brightness value.
const PRECHARGE: u8 = 0x2;

type Panel =
    Ssd1306<I2CInterface<I2cdev>, DisplaySize128x64, BufferedGraphicsMode<DisplaySize128x64>>;

pub struct Ssd1306Display {
    panel: Panel,
    released: bool,
}

impl Ssd1306Display {
    /// Opens `bus` and initializes the panel at `address`.
    pub fn open(bus: &str, address: u8, contrast: u8) -> Result<Ssd1306Display, DisplayError> {
        let i2c = I2cdev::new(bus)
            .map_err(|e| DisplayError::Unavailable(format!("{}: {}", bus, e)))?;
        let interface = I2CDisplayInterface::new_custom_address(i2c, address);
        let mut panel = Ssd1306::new(interface, DisplaySize128x64, DisplayRotation::Rotate0)
            .into_buffered_graphics_mode();
        panel.init().map_err(|e| {
            DisplayError::Unavailable(format!("no display at {:#04x} on {}: {:?}", address, bus, e))
        })?;
        panel
            .set_brightness(Brightness::custom(PRECHARGE, contrast))
            .map_err(|e| DisplayError::Io(format!("setting contrast: {:?}", e)))?;
        panel.clear_buffer();
        panel
            .flush()
            .map_err(|e| DisplayError::Io(format!("{:?}", e)))?;
        Ok(Ssd1306Display {
            panel,
            released: false,
        })
    }
}

impl DisplaySink for Ssd1306Display {
    fn size(&self) -> Size {
        Size::new(128, 64)
    }

    fn paint(&mut self, primitives: &[Primitive]) -> Result<(), DisplayError> {
        self.panel.clear_buffer();
        draw(&mut self.panel, primitives).map_err(|e| DisplayError::Io(format!("{:?}", e)))?;
        self.panel
            .flush()
            .map_err(|e| DisplayError::Io(format!("{:?}", e)))
    }

    fn release(&mut self) -> Result<(), DisplayError> {
        if self.released {
            return Ok(());
        }
        self.released = true;
        self.panel.clear_buffer();
        self.panel
            .flush()
            .map_err(|e| DisplayError::Io(format!("{:?}", e)))?;
        self.panel
            .set_display_on(false)
            .map_err(|e| DisplayError::Io(format!("{:?}", e)))
    }
}

impl Drop for Ssd1306Display {
    fn drop(&mut self) {
        let _ = self.release();
    }
}
