//! A driver for the Seeed Grove LCD RGB backlight module.
//!
//! The module carries two controllers on one I2C bus: a PCA9633 driving the RGB backlight, and an
//! HD44780-compatible 16x2 character LCD. This crate sequences the register writes for both,
//! keeps a cache of what was last shown, and exposes the result as a [`Grove`] device.
//!
//! Devices are bound through a [`DeviceHost`], which runs the init sequence off-thread and only
//! hands out devices once they're ready. The [`rpc`] module maps serialisable requests onto a
//! device, for daemons and clients.
//!
//! On Linux, `BusArgs` opens the controllers through `/dev/i2c-N`. Everywhere, [`MockBus`]
//! simulates the module in memory and records every transaction.
//!
//! # Example
//!
//! ```
//! # use grove_lcd_driver::{DeviceHost, Line, MockBus, Result, Rgb, Variant};
//! # fn main() -> Result<()> {
//! let host = DeviceHost::new(Default::default());
//! let binding = host.bind("grove", Variant::Combined, &MockBus::new())?;
//! let lcd = binding.device().clone();
//! binding.wait()?;
//!
//! lcd.set_color(Rgb::new(255, 0, 255))?;
//! lcd.write_line(Line::First, 0, "Hallo")?;
//! assert_eq!(lcd.read_lcd()?, "Hallo\n");
//! # Ok(()) }
//! ```

#[doc(inline)]
pub use bus::{Capability, Channel, I2cChannel, Parent};

#[doc(inline)]
pub use device::{
	visible_text, Grove, InitOptions, Lifecycle, Line, Rgb, Variant, BLANK_LINE, LINE_SIZE,
};

#[doc(inline)]
pub use error::{Error, Result};

#[doc(inline)]
pub use host::{Binding, DeviceHost};

#[cfg(target_os = "linux")]
#[doc(inline)]
pub use io::*;

#[doc(inline)]
pub use mock::{MockBus, MockChannel, Transaction};

#[doc(inline)]
pub use sequence::{apply_commands, write_data, Cmd};

mod bus;
pub mod commands;
mod device;
mod error;
mod host;
#[cfg(target_os = "linux")]
mod io;
mod mock;
pub mod rpc;
mod sequence;
pub mod textproto;
