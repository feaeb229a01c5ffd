use std::sync::Arc;

use clap::Parser;
use grove_lcd_driver::{
	DeviceHost, InitOptions, MockBus, Variant,
	rpc::{Request, Response},
};
use miette::{Result, bail};
use tokio::time::sleep;
use tracing::{debug, info};

use crate::{
	DEFAULT_ENDPOINT,
	actions::Context,
	client::{LocalClient, Transport, ZmqClient},
};

/// Run a demo script against the module.
///
/// Sets the colour to magenta and reads it back, clears the display, writes "Hallo" on the first
/// line at columns 0 and then 4, "Anna" on the second line at column 4, then reads back the
/// display and the line size. Stops at the first call that fails.
#[derive(Debug, Clone, Parser)]
pub struct ExerciseArgs {
	/// ZMQ socket the daemon listens on.
	#[arg(long, default_value = DEFAULT_ENDPOINT, env = "GROVE_LCD_ZMQ_SOCKET")]
	pub zmq_socket: String,

	/// How long to wait for each reply.
	#[arg(long, default_value = "5s")]
	pub timeout: humantime::Duration,

	/// Pause between steps.
	///
	/// Syntax is a number followed by a unit, such as "3s" or "500ms".
	#[arg(long, default_value = "3s")]
	pub pause: humantime::Duration,

	/// Run against a simulated module in this process instead of a daemon.
	#[arg(long)]
	pub simulate: bool,
}

pub async fn run(ctx: Context<ExerciseArgs>) -> Result<()> {
	if ctx.args_top.simulate {
		let host = DeviceHost::new(InitOptions::default());
		let binding = host.bind("grove-lcd", Variant::Combined, &MockBus::new())?;
		let device = Arc::clone(binding.device());
		binding.wait()?;
		debug!("simulated device ready");

		script(&ctx, &LocalClient::new(device)).await
	} else {
		let client = ZmqClient::connect(&ctx.args_top.zmq_socket, *ctx.args_top.timeout)?;
		script(&ctx, &client).await
	}
}

async fn script(ctx: &Context<ExerciseArgs>, client: &impl Transport) -> Result<()> {
	let steps = [
		Request::SetColor {
			red: 0xff,
			green: 0,
			blue: 0xff,
		},
		Request::GetColor,
		Request::Clear,
		Request::WriteFirstLine {
			position: 0,
			text: "Hallo".into(),
		},
		Request::WriteFirstLine {
			position: 4,
			text: "Hallo".into(),
		},
		Request::WriteSecondLine {
			position: 4,
			text: "Anna".into(),
		},
		Request::ReadLcd,
		Request::GetLineSize,
	];

	let bar = ctx.step_bar(steps.len() as u64);
	for (n, request) in steps.into_iter().enumerate() {
		if n > 0 {
			sleep(*ctx.args_top.pause).await;
		}

		bar.set_message(format!("{request:?}"));
		let response = client.call_ok(request.clone())?;
		match (&request, response) {
			(Request::GetColor, Response::Color { red, green, blue }) => ctx.println(format!(
				"grove-lcd: color status after change is:\nred: {red:x}\ngreen: {green:x}\nblue: {blue:x}"
			)),
			(Request::ReadLcd, Response::Text { text }) => {
				ctx.println(format!("grove-lcd: display content: {text}"))
			}
			(Request::GetLineSize, Response::LineSize { size }) => {
				ctx.println(format!("grove-lcd: linesize {size}"))
			}
			(_, Response::Done) => {}
			(request, other) => bail!("unexpected reply to {request:?}: {other:?}"),
		}
		bar.inc(1);
	}

	bar.finish_and_clear();
	info!("exercise complete");
	Ok(())
}
