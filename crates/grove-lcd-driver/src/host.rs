//! Binding devices to a bus and tracking which of them are visible.

use std::{
	collections::HashMap,
	io,
	sync::{Arc, Mutex, MutexGuard, PoisonError},
	thread::{Builder, JoinHandle},
};

use tracing::{debug, error, info, instrument, warn};

use crate::{
	bus::{Channel, I2cChannel, Parent},
	device::{Grove, InitOptions, Variant},
	error::{Error, Result},
};

/// Owns every bound device.
///
/// A device is registered as soon as it is bound, but [`lookup()`](Self::lookup) only returns it
/// once its init sequence has completed. Devices whose init fails are released and forgotten.
#[derive(Debug)]
pub struct DeviceHost<C> {
	options: InitOptions,
	devices: Arc<Mutex<HashMap<String, Arc<Grove<C>>>>>,
}

impl<C> Clone for DeviceHost<C> {
	fn clone(&self) -> Self {
		Self {
			options: self.options.clone(),
			devices: Arc::clone(&self.devices),
		}
	}
}

/// A freshly bound device and its init thread.
#[derive(Debug)]
pub struct Binding<C> {
	device: Arc<Grove<C>>,
	handle: JoinHandle<Result<()>>,
}

impl<C> Binding<C> {
	pub fn device(&self) -> &Arc<Grove<C>> {
		&self.device
	}

	/// Whether init has finished, one way or the other.
	pub fn is_finished(&self) -> bool {
		self.handle.is_finished()
	}

	/// Block until init has finished, and return its outcome.
	pub fn wait(self) -> Result<()> {
		self.handle
			.join()
			.unwrap_or_else(|_| Err(Error::Io(io::Error::other("init thread panicked"))))
	}
}

impl<C: I2cChannel + 'static> DeviceHost<C> {
	pub fn new(options: InitOptions) -> Self {
		Self {
			options,
			devices: Default::default(),
		}
	}

	fn devices(&self) -> MutexGuard<'_, HashMap<String, Arc<Grove<C>>>> {
		self.devices.lock().unwrap_or_else(PoisonError::into_inner)
	}

	/// Bind a device to a parent node.
	///
	/// Obtains the channels the variant needs, registers the device, then runs its init sequence
	/// on a separate thread. The device stays invisible until init completes.
	///
	/// The combined variant makes do with whichever channels it can get, and only fails if it gets
	/// neither.
	#[instrument(level = "debug", skip(self, parent))]
	pub fn bind<P>(&self, name: &str, variant: Variant, parent: &P) -> Result<Binding<C>>
	where
		P: Parent<Channel = C>,
	{
		let (rgb, lcd) = match variant {
			Variant::Rgb => (Some(parent.channel(Channel::Rgb)?), None),
			Variant::Lcd => (None, Some(parent.channel(Channel::Lcd)?)),
			Variant::Combined => {
				let rgb = optional_channel(parent, Channel::Rgb)?;
				let lcd = optional_channel(parent, Channel::Lcd)?;
				if rgb.is_none() && lcd.is_none() {
					return Err(Error::NoChannels);
				}
				(rgb, lcd)
			}
		};

		let device = {
			let mut devices = self.devices();
			if devices.contains_key(name) {
				return Err(Error::AlreadyBound(name.into()));
			}
			devices.try_reserve(1)?;

			let device = Arc::new(Grove::new(name, variant, rgb, lcd));
			devices.insert(name.into(), Arc::clone(&device));
			device
		};
		debug!(name, ?variant, "device registered, starting init");

		let host = self.clone();
		let dev = Arc::clone(&device);
		let spawned = Builder::new()
			.name(format!("grove-init-{name}"))
			.spawn(move || {
				let result = dev.init(&host.options);
				if let Err(err) = &result {
					error!(device = dev.name(), ?err, "init failed, removing device");
					host.forget(&dev);
				}
				result
			});

		match spawned {
			Ok(handle) => Ok(Binding { device, handle }),
			Err(err) => {
				self.forget(&device);
				Err(err.into())
			}
		}
	}

	/// Release a device and drop it from the registry, if it's still the one registered.
	fn forget(&self, device: &Arc<Grove<C>>) {
		device.release();
		let mut devices = self.devices();
		if devices
			.get(device.name())
			.is_some_and(|known| Arc::ptr_eq(known, device))
		{
			devices.remove(device.name());
		}
	}

	/// A device by name, if it's visible.
	pub fn lookup(&self, name: &str) -> Option<Arc<Grove<C>>> {
		self.devices()
			.get(name)
			.filter(|device| device.is_visible())
			.cloned()
	}

	/// Unbind a device. Operations still in flight on it complete; later ones fail.
	pub fn remove(&self, name: &str) -> bool {
		let Some(device) = self.devices().remove(name) else {
			return false;
		};

		device.release();
		info!(name, "device removed");
		true
	}

	/// Names of all registered devices, visible or not.
	pub fn names(&self) -> Vec<String> {
		let mut names: Vec<_> = self.devices().keys().cloned().collect();
		names.sort();
		names
	}
}

fn optional_channel<P: Parent>(parent: &P, channel: Channel) -> Result<Option<P::Channel>> {
	match parent.channel(channel) {
		Ok(ch) => Ok(Some(ch)),
		Err(Error::ResourceUnavailable(missing)) => {
			warn!(channel = %missing, "channel unavailable, continuing without it");
			Ok(None)
		}
		Err(err) => Err(err),
	}
}

#[cfg(test)]
mod tests {
	use std::time::{Duration, Instant};

	use super::*;
	use crate::{
		bus::Capability,
		device::Lifecycle,
		mock::{MockBus, MockChannel},
	};

	fn host() -> DeviceHost<MockChannel> {
		DeviceHost::new(InitOptions::default())
	}

	#[test]
	fn visible_after_init() {
		let host = host();
		let bus = MockBus::new();
		let binding = host.bind("grove", Variant::Combined, &bus).unwrap();
		let device = Arc::clone(binding.device());
		binding.wait().unwrap();

		assert_eq!(device.lifecycle(), Lifecycle::Visible);
		assert!(host.lookup("grove").is_some());
		assert_eq!(host.names(), vec!["grove".to_string()]);
	}

	#[test]
	fn failed_init_is_never_visible() {
		let host = host();
		let bus = MockBus::new();
		bus.break_channel(Channel::Lcd);

		let binding = host.bind("grove", Variant::Combined, &bus).unwrap();
		let device = Arc::clone(binding.device());
		assert!(binding.wait().unwrap_err().is_bus_failure());

		assert_eq!(device.lifecycle(), Lifecycle::Removed);
		assert!(host.lookup("grove").is_none());
		assert!(host.names().is_empty());
	}

	#[test]
	fn lookup_during_init_is_immediate() {
		let host = host();
		let bus = MockBus::new().with_delay(Duration::from_millis(50));
		let binding = host.bind("grove", Variant::Combined, &bus).unwrap();
		std::thread::sleep(Duration::from_millis(20));

		let started = Instant::now();
		assert!(host.lookup("grove").is_none());
		assert_eq!(host.names(), vec!["grove".to_string()]);
		assert!(started.elapsed() < Duration::from_millis(200));
		assert!(!binding.is_finished());

		binding.wait().unwrap();
		assert!(host.lookup("grove").is_some());
	}

	#[test]
	fn combined_tolerates_one_missing_channel() {
		let host = host();
		let bus = MockBus::new().without(Channel::Rgb);
		let binding = host.bind("grove", Variant::Combined, &bus).unwrap();
		binding.wait().unwrap();

		let device = host.lookup("grove").unwrap();
		assert!(!device.has(Channel::Rgb));
		assert!(device.has(Channel::Lcd));
	}

	#[test]
	fn combined_needs_some_channel() {
		let bus = MockBus::new().without(Channel::Rgb).without(Channel::Lcd);
		assert!(matches!(
			host().bind("grove", Variant::Combined, &bus),
			Err(Error::NoChannels)
		));
	}

	#[test]
	fn single_variant_needs_its_channel() {
		let host = host();
		let bus = MockBus::new().without(Channel::Lcd);
		assert!(matches!(
			host.bind("grove", Variant::Lcd, &bus),
			Err(Error::ResourceUnavailable(Channel::Lcd))
		));
		assert!(host.names().is_empty());
		assert!(bus.writes().is_empty());
	}

	#[test]
	fn parent_without_i2c() {
		let bus = MockBus::new().without_i2c();
		assert!(matches!(
			host().bind("grove", Variant::Combined, &bus),
			Err(Error::NotSupported(Capability::I2c))
		));
	}

	#[test]
	fn names_are_unique() {
		let host = host();
		let bus = MockBus::new();
		host.bind("grove", Variant::Rgb, &bus).unwrap().wait().unwrap();
		assert!(matches!(
			host.bind("grove", Variant::Lcd, &bus),
			Err(Error::AlreadyBound(_))
		));
	}

	#[test]
	fn removed_devices_refuse_calls() {
		let host = host();
		let bus = MockBus::new();
		let binding = host.bind("grove", Variant::Combined, &bus).unwrap();
		let device = Arc::clone(binding.device());
		binding.wait().unwrap();

		assert!(host.remove("grove"));
		assert!(!host.remove("grove"));
		assert!(host.lookup("grove").is_none());
		assert!(matches!(device.clear(), Err(Error::Removed)));
	}
}
