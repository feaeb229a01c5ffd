use std::collections::TryReserveError;

use crate::bus::{Capability, Channel};

/// Error type for driver operations.
#[derive(Debug, thiserror::Error)]
#[cfg_attr(feature = "miette", derive(miette::Diagnostic))]
pub enum Error {
	#[error("I2C error")]
	#[cfg_attr(
		feature = "miette",
		diagnostic(help("I2C error, check the bus number and device addresses"))
	)]
	I2c(#[source] Box<dyn std::error::Error + Send + Sync + 'static>),

	#[error("I/O error")]
	#[cfg_attr(feature = "miette", diagnostic(help("local (non-I2C) I/O error")))]
	Io(#[from] std::io::Error),

	#[error("{0} channel is not available")]
	#[cfg_attr(
		feature = "miette",
		diagnostic(help("check the device is wired up and answers at its address"))
	)]
	ResourceUnavailable(Channel),

	#[error("no I2C channel is available for this device")]
	NoChannels,

	#[error("could not allocate device context")]
	AllocationFailure(#[from] TryReserveError),

	#[error("{0} is not supported here")]
	NotSupported(Capability),

	#[error("a device named {0:?} is already bound")]
	AlreadyBound(String),

	#[error("cursor position {0} is past the end of the display row")]
	InvalidPosition(u8),

	#[error("invalid colour {input:?}: {reason}")]
	#[cfg_attr(
		feature = "miette",
		diagnostic(help("the expected format is 'r<N> g<N> b<N>', e.g. 'r0 g255 b0'"))
	)]
	InvalidColor { input: String, reason: &'static str },

	#[error("device has been removed")]
	Removed,

	#[error("initialization failed after {attempts} attempt(s)")]
	Init {
		attempts: u32,
		#[source]
		source: Box<Error>,
	},
}

impl Error {
	/// Whether this error came from the bus itself, rather than from the driver.
	pub fn is_bus_failure(&self) -> bool {
		match self {
			Self::I2c(_) | Self::Io(_) => true,
			Self::Init { source, .. } => source.is_bus_failure(),
			_ => false,
		}
	}
}

/// Convenience type for Results in this crate.
pub type Result<T> = std::result::Result<T, Error>;
