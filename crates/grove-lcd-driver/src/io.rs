use std::io;

use rppal::i2c::I2c;
use tracing::{instrument, trace};

use crate::{
	bus::{Capability, Channel, I2cChannel, Parent},
	error::{Error, Result},
};

impl From<rppal::i2c::Error> for Error {
	fn from(err: rppal::i2c::Error) -> Self {
		Self::I2c(Box::new(err))
	}
}

/// Arguments to open the module on a Linux I2C bus.
///
/// It implements [`Default`] with the Raspberry Pi's user I2C bus and the module's factory
/// addresses.
#[derive(Debug, Clone)]
pub struct BusArgs {
	/// I2C bus number, as in `/dev/i2c-N`.
	///
	/// Defaults to 1.
	pub bus: u8,

	/// 7-bit address of the RGB backlight controller.
	///
	/// Defaults to 0x62.
	pub rgb_address: u16,

	/// 7-bit address of the LCD controller.
	///
	/// Defaults to 0x3E.
	pub lcd_address: u16,
}

impl Default for BusArgs {
	fn default() -> Self {
		Self {
			bus: 1,
			rgb_address: Channel::Rgb.default_address(),
			lcd_address: Channel::Lcd.default_address(),
		}
	}
}

impl Parent for BusArgs {
	type Channel = LinuxChannel;

	/// Open a handle to the bus for one of the controllers.
	///
	/// Each channel gets its own file handle, so the two controllers don't share slave address
	/// state.
	#[instrument(level = "debug")]
	fn channel(&self, channel: Channel) -> Result<LinuxChannel> {
		let mut i2c = I2c::with_bus(self.bus).map_err(|err| {
			tracing::debug!(bus = self.bus, ?err, "could not open I2C bus");
			Error::NotSupported(Capability::I2c)
		})?;

		let address = match channel {
			Channel::Rgb => self.rgb_address,
			Channel::Lcd => self.lcd_address,
		};
		i2c.set_slave_address(address).map_err(|err| {
			tracing::debug!(address, ?err, "could not select I2C slave");
			Error::ResourceUnavailable(channel)
		})?;

		Ok(LinuxChannel { i2c, address })
	}
}

/// A controller on a Linux I2C bus, through `/dev/i2c-N`.
#[derive(Debug)]
pub struct LinuxChannel {
	i2c: I2c,
	address: u16,
}

impl I2cChannel for LinuxChannel {
	#[instrument(level = "trace", skip(self, bytes))]
	fn write(&mut self, bytes: &[u8]) -> Result<()> {
		trace!(
			address = %format!("{:02X}", self.address),
			length = bytes.len(),
			"writing bytes to I2C"
		);
		let written = self.i2c.write(bytes)?;
		if written != bytes.len() {
			return Err(Error::Io(io::Error::new(
				io::ErrorKind::WriteZero,
				format!("short I2C write: {written} of {} bytes", bytes.len()),
			)));
		}

		Ok(())
	}
}
