use std::fmt;

use crate::error::Result;

/// A handle to one addressed device on an I2C bus.
///
/// Implementations perform exactly one synchronous write transaction per call, blocking until the
/// transaction completes or fails.
pub trait I2cChannel: Send {
	/// Write `bytes` to the device in a single transaction.
	fn write(&mut self, bytes: &[u8]) -> Result<()>;
}

impl<C: I2cChannel + ?Sized> I2cChannel for Box<C> {
	fn write(&mut self, bytes: &[u8]) -> Result<()> {
		(**self).write(bytes)
	}
}

/// The two controllers on the Grove LCD RGB module.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Channel {
	/// PCA9633 RGB backlight controller.
	Rgb,

	/// HD44780-compatible character LCD controller.
	Lcd,
}

impl Channel {
	/// Factory 7-bit address of the controller.
	pub const fn default_address(self) -> u16 {
		match self {
			Self::Rgb => 0x62,
			Self::Lcd => 0x3E,
		}
	}
}

impl fmt::Display for Channel {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		f.write_str(match self {
			Self::Rgb => "RGB backlight",
			Self::Lcd => "LCD",
		})
	}
}

/// Something a parent node or device can lack.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Capability {
	/// The I2C protocol as a whole.
	I2c,

	/// One of the module's channels.
	Channel(Channel),
}

impl fmt::Display for Capability {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		match self {
			Self::I2c => f.write_str("I2C"),
			Self::Channel(channel) => write!(f, "the {channel} channel"),
		}
	}
}

/// The node a device binds to: hands out bus channels.
///
/// Returns [`Error::NotSupported`](crate::Error::NotSupported) with [`Capability::I2c`] when the
/// parent has no I2C at all, and [`Error::ResourceUnavailable`](crate::Error::ResourceUnavailable)
/// when the specific channel can't be obtained.
pub trait Parent {
	type Channel: I2cChannel;

	fn channel(&self, channel: Channel) -> Result<Self::Channel>;
}
