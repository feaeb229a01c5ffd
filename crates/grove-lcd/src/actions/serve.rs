use std::sync::{
	Arc,
	atomic::{AtomicBool, Ordering},
};

use clap::{Parser, ValueEnum};
use grove_lcd_driver::{DeviceHost, InitOptions, MockBus, Parent, Rgb, Variant, rpc};
use miette::{IntoDiagnostic, Result, WrapErr};
use tracing::{error, info, trace, warn};

use crate::{DEFAULT_ENDPOINT, actions::Context};

/// How many simulated bus transactions to remember while serving.
const SIMULATED_LOG_LIMIT: usize = 256;

/// Bind the module and answer remote calls.
///
/// Listens on a ZMQ REP socket for JSON requests, one at a time, and replies with JSON. Requests
/// that arrive before the device has finished initialising get an `unavailable` error.
///
/// If the device fails to initialise, the daemon exits with an error.
#[derive(Debug, Clone, Parser)]
pub struct ServeArgs {
	/// I2C bus number, as in `/dev/i2c-N`.
	#[arg(long, default_value = "1", env = "GROVE_LCD_BUS")]
	pub bus: u8,

	/// I2C address of the RGB backlight controller.
	///
	/// Either decimal or hexadecimal with a `0x` prefix.
	#[arg(long, default_value = "0x62", value_parser = parse_address, env = "GROVE_LCD_RGB_ADDRESS")]
	pub rgb_address: u16,

	/// I2C address of the LCD controller.
	///
	/// Either decimal or hexadecimal with a `0x` prefix.
	#[arg(long, default_value = "0x3e", value_parser = parse_address, env = "GROVE_LCD_LCD_ADDRESS")]
	pub lcd_address: u16,

	/// Which parts of the module to drive.
	///
	/// `combined` carries on if one of the two controllers can't be reached.
	#[arg(long, value_enum, default_value_t = VariantArg::Combined, env = "GROVE_LCD_VARIANT")]
	pub variant: VariantArg,

	/// Name to register the device under.
	#[arg(long, default_value = "grove-lcd", env = "GROVE_LCD_NAME")]
	pub name: String,

	/// Text shown on the first line once the display is up.
	#[arg(long, default_value = "Init", env = "GROVE_LCD_GREETING")]
	pub greeting: String,

	/// How many more times to try initialising the device if the first attempt fails.
	#[arg(long, default_value = "0", env = "GROVE_LCD_INIT_RETRIES")]
	pub init_retries: u32,

	/// Pause between initialisation attempts.
	///
	/// Syntax is a number followed by a unit, such as "100ms" or "2s".
	#[arg(long, default_value = "100ms", env = "GROVE_LCD_INIT_RETRY_DELAY")]
	pub init_retry_delay: humantime::Duration,

	/// Simulate the module in memory instead of opening the I2C bus.
	#[arg(long, env = "GROVE_LCD_SIMULATE")]
	pub simulate: bool,

	/// ZMQ REP socket to listen on for JSON calls.
	#[arg(default_value = DEFAULT_ENDPOINT, env = "GROVE_LCD_ZMQ_SOCKET")]
	pub zmq_socket: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum VariantArg {
	/// Only the RGB backlight.
	Rgb,

	/// Only the character LCD.
	Lcd,

	/// Both controllers.
	Combined,
}

impl From<VariantArg> for Variant {
	fn from(arg: VariantArg) -> Self {
		match arg {
			VariantArg::Rgb => Self::Rgb,
			VariantArg::Lcd => Self::Lcd,
			VariantArg::Combined => Self::Combined,
		}
	}
}

fn parse_address(s: &str) -> Result<u16, String> {
	let parsed = match s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
		Some(hex) => u16::from_str_radix(hex, 16),
		None => s.parse(),
	};

	match parsed {
		Ok(addr) if addr <= 0x7F => Ok(addr),
		Ok(addr) => Err(format!("{addr:#x} is not a 7-bit address")),
		Err(err) => Err(err.to_string()),
	}
}

pub async fn run(ctx: Context<ServeArgs>) -> Result<()> {
	let running = Arc::new(AtomicBool::new(true));
	let r = running.clone();

	ctrlc::set_handler(move || {
		r.store(false, Ordering::SeqCst);
	})
	.into_diagnostic()
	.wrap_err("ctrlc: set_handler")?;

	let args = &ctx.args_top;
	let z = zmq::Context::new();
	let socket = z
		.socket(zmq::REP)
		.into_diagnostic()
		.wrap_err("zmq: socket(REP)")?;
	socket
		.set_ipv6(true)
		.into_diagnostic()
		.wrap_err("zmq: set_ipv6")?;
	socket
		.bind(&args.zmq_socket)
		.into_diagnostic()
		.wrap_err(format!("zmq: bind({})", args.zmq_socket))?;
	info!("ZMQ REP listening on {} for JSON calls", args.zmq_socket);

	if args.simulate {
		info!("simulating the module, no I2C traffic will happen");
		let bus = MockBus::new().with_log_limit(SIMULATED_LOG_LIMIT);
		return serve(args, &bus, &socket, &running);
	}

	#[cfg(target_os = "linux")]
	{
		let bus = grove_lcd_driver::BusArgs {
			bus: args.bus,
			rgb_address: args.rgb_address,
			lcd_address: args.lcd_address,
		};
		serve(args, &bus, &socket, &running)
	}

	#[cfg(not(target_os = "linux"))]
	{
		Err(miette::miette!(
			help = "pass --simulate to use an in-memory module instead",
			"I2C is only available on Linux"
		))
	}
}

impl ServeArgs {
	fn init_options(&self) -> InitOptions {
		InitOptions {
			color: Rgb::GREEN,
			greeting: self.greeting.clone(),
			retries: self.init_retries,
			retry_delay: *self.init_retry_delay,
		}
	}
}

/// Bind the device on `parent` and answer calls until ctrl-c.
fn serve<P>(args: &ServeArgs, parent: &P, socket: &zmq::Socket, running: &AtomicBool) -> Result<()>
where
	P: Parent,
	P::Channel: 'static,
{
	let host = DeviceHost::new(args.init_options());
	let mut binding = Some(
		host.bind(&args.name, args.variant.into(), parent)
			.wrap_err_with(|| format!("binding {}", args.name))?,
	);

	loop {
		let mut polls = [socket.as_poll_item(zmq::POLLIN)];
		let polled = zmq::poll(&mut polls, 1000)
			.into_diagnostic()
			.wrap_err("zmq: poll")?;
		if !running.load(Ordering::SeqCst) {
			info!("ctrl-c received, exiting");
			break;
		}

		if let Some(b) = binding.take_if(|b| b.is_finished()) {
			b.wait()
				.wrap_err_with(|| format!("{} failed to initialise", args.name))?;
			info!(name = %args.name, "device ready");
		}

		if polled == 0 || !polls[0].is_readable() {
			trace!("zmq: no messages (poll timed out)");
			continue;
		}

		let Ok(bytes) = socket
			.recv_bytes(0)
			.map_err(|err| error!("zmq: failed to recv: {err}"))
		else {
			continue;
		};
		trace!(request = %String::from_utf8_lossy(&bytes), "received call");

		let device = host.lookup(&args.name);
		let response = rpc::handle_message(device.as_deref(), &bytes);
		if let rpc::Response::Error { kind, message } = &response {
			warn!(?kind, %message, "call failed");
		}

		let reply = serde_json::to_vec(&response).into_diagnostic()?;
		socket
			.send(reply, 0)
			.into_diagnostic()
			.wrap_err("zmq: send")?;
	}

	host.remove(&args.name);
	Ok(())
}
