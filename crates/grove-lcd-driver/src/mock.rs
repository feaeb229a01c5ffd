//! An in-memory bus that records every transaction.
//!
//! Used for simulation and tests. Failures and latency can be injected.

use std::{
	collections::VecDeque,
	io,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
	thread::sleep,
	time::Duration,
};

use itertools::Itertools;
use tracing::{debug, instrument};

use crate::{
	bus::{Capability, Channel, I2cChannel, Parent},
	error::{Error, Result},
};

/// One write as seen on the bus, including writes that were made to fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
	pub channel: Channel,
	pub bytes: Vec<u8>,
	pub failed: bool,
}

#[derive(Debug, Default)]
struct State {
	log: VecDeque<Transaction>,
	log_limit: Option<usize>,
	written: usize,
	fail_at: Option<usize>,
	broken: Vec<Channel>,
	missing: Vec<Channel>,
	no_i2c: bool,
	delay: Duration,
}

/// A simulated bus, acting as the parent node for both channels.
///
/// Clones share the same state, so a test can keep one to inspect while the device owns the
/// channels.
#[derive(Debug, Clone, Default)]
pub struct MockBus {
	state: Arc<Mutex<State>>,
}

impl MockBus {
	pub fn new() -> Self {
		Self::default()
	}

	fn state(&self) -> MutexGuard<'_, State> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Make the `n`th write from now fail (zero-based), once.
	pub fn fail_nth(&self, n: usize) {
		let mut state = self.state();
		state.fail_at = Some(state.written + n);
	}

	/// Make every write to `channel` fail until [`heal()`](Self::heal) is called.
	pub fn break_channel(&self, channel: Channel) {
		self.state().broken.push(channel);
	}

	/// Stop injecting failures.
	pub fn heal(&self) {
		let mut state = self.state();
		state.broken.clear();
		state.fail_at = None;
	}

	/// Pretend `channel` isn't wired up: the parent won't hand it out.
	pub fn without(self, channel: Channel) -> Self {
		self.state().missing.push(channel);
		self
	}

	/// Pretend the parent doesn't speak I2C at all.
	pub fn without_i2c(self) -> Self {
		self.state().no_i2c = true;
		self
	}

	/// Only remember the last `limit` transactions.
	///
	/// For long-running simulations, where an unbounded log would grow forever.
	pub fn with_log_limit(self, limit: usize) -> Self {
		self.state().log_limit = Some(limit);
		self
	}

	/// Make every write take at least this long.
	pub fn with_delay(self, delay: Duration) -> Self {
		self.state().delay = delay;
		self
	}

	/// Every transaction so far, in order.
	pub fn transactions(&self) -> Vec<Transaction> {
		self.state().log.iter().cloned().collect()
	}

	/// The bytes of every transaction so far, in order.
	pub fn writes(&self) -> Vec<Vec<u8>> {
		self.state().log.iter().map(|t| t.bytes.clone()).collect()
	}

	/// Forget recorded transactions.
	pub fn clear_log(&self) {
		self.state().log.clear();
	}
}

impl Parent for MockBus {
	type Channel = MockChannel;

	fn channel(&self, channel: Channel) -> Result<MockChannel> {
		let state = self.state();
		if state.no_i2c {
			return Err(Error::NotSupported(Capability::I2c));
		}
		if state.missing.contains(&channel) {
			return Err(Error::ResourceUnavailable(channel));
		}

		Ok(MockChannel {
			channel,
			bus: self.clone(),
		})
	}
}

/// A channel on a [`MockBus`].
#[derive(Debug)]
pub struct MockChannel {
	channel: Channel,
	bus: MockBus,
}

impl I2cChannel for MockChannel {
	#[instrument(level = "trace", skip(self, bytes), fields(channel = %self.channel))]
	fn write(&mut self, bytes: &[u8]) -> Result<()> {
		let delay = self.bus.state().delay;
		if !delay.is_zero() {
			sleep(delay);
		}

		let mut state = self.bus.state();
		let index = state.written;
		state.written += 1;
		let failed = state.broken.contains(&self.channel) || state.fail_at == Some(index);
		if state.fail_at == Some(index) {
			state.fail_at = None;
		}

		debug!(
			channel = %self.channel,
			bytes = %bytes.iter().map(|b| format!("{b:02X}")).join(" "),
			failed,
			"simulated I2C write"
		);
		if state.log_limit != Some(0) {
			if state.log_limit.is_some_and(|limit| state.log.len() >= limit) {
				state.log.pop_front();
			}
			state.log.push_back(Transaction {
				channel: self.channel,
				bytes: bytes.to_vec(),
				failed,
			});
		}

		if failed {
			Err(Error::Io(io::Error::other("injected bus failure")))
		} else {
			Ok(())
		}
	}
}
