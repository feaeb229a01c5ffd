use tracing::{error, instrument, trace};

use crate::{bus::I2cChannel, commands::LCD_DATA, error::Result};

/// A single register write: one register byte, one value byte.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Cmd {
	pub register: u8,
	pub value: u8,
}

impl Cmd {
	pub const fn new(register: u8, value: u8) -> Self {
		Self { register, value }
	}

	/// The two bytes that go on the wire.
	pub const fn bytes(self) -> [u8; 2] {
		[self.register, self.value]
	}
}

/// Apply a command sequence to a channel, in order.
///
/// Each command is one 2-byte transaction, and the next one is only issued once the previous one
/// has succeeded. The first failure aborts the sequence and is returned as-is: commands already
/// applied are not undone.
#[instrument(level = "trace", skip(channel, cmds), fields(len = cmds.len()))]
pub fn apply_commands<C: I2cChannel + ?Sized>(channel: &mut C, cmds: &[Cmd]) -> Result<()> {
	for (index, cmd) in cmds.iter().enumerate() {
		trace!(index, bytes=%format!("{:02X?}", cmd.bytes()), "writing command to I2C");
		if let Err(err) = channel.write(&cmd.bytes()) {
			error!(
				index,
				register = %format!("{:02X}", cmd.register),
				"I2C write failed, aborting sequence"
			);
			return Err(err);
		}
	}

	Ok(())
}

/// Write display data at the current cursor, in one transaction.
#[instrument(level = "trace", skip(channel, text), fields(len = text.len()))]
pub fn write_data<C: I2cChannel + ?Sized>(channel: &mut C, text: &[u8]) -> Result<()> {
	let mut bytes = Vec::with_capacity(text.len() + 1);
	bytes.push(LCD_DATA);
	bytes.extend_from_slice(text);

	trace!(length = bytes.len(), data=%format!("{bytes:02X?}"), "writing data to I2C");
	channel.write(&bytes).inspect_err(|_| error!("I2C data write failed"))
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		bus::{Channel, Parent},
		mock::MockBus,
	};

	fn cmds() -> [Cmd; 3] {
		[Cmd::new(0x04, 1), Cmd::new(0x03, 2), Cmd::new(0x02, 3)]
	}

	#[test]
	fn applies_in_order() {
		let bus = MockBus::new();
		let mut channel = bus.channel(Channel::Rgb).unwrap();
		apply_commands(&mut channel, &cmds()).unwrap();
		assert_eq!(
			bus.writes(),
			vec![vec![0x04, 1], vec![0x03, 2], vec![0x02, 3]]
		);
	}

	#[test]
	fn aborts_on_first_failure() {
		let bus = MockBus::new();
		let mut channel = bus.channel(Channel::Rgb).unwrap();
		bus.fail_nth(1);

		let err = apply_commands(&mut channel, &cmds()).unwrap_err();
		assert!(err.is_bus_failure());

		// the failing write was attempted, the one after it never was
		assert_eq!(bus.writes(), vec![vec![0x04, 1], vec![0x03, 2]]);
	}

	#[test]
	fn empty_sequence_is_a_noop() {
		let bus = MockBus::new();
		let mut channel = bus.channel(Channel::Rgb).unwrap();
		apply_commands(&mut channel, &[]).unwrap();
		assert!(bus.writes().is_empty());
	}

	#[test]
	fn data_is_prefixed() {
		let bus = MockBus::new();
		let mut channel = bus.channel(Channel::Lcd).unwrap();
		write_data(&mut channel, b"Init").unwrap();
		assert_eq!(bus.writes(), vec![b"@Init".to_vec()]);
	}
}
