use clap::{Parser, Subcommand};
use grove_lcd_driver::{
	Rgb,
	rpc::{Request, Response},
};
use miette::{IntoDiagnostic, Result};

use crate::{
	DEFAULT_ENDPOINT,
	actions::Context,
	client::{Transport, ZmqClient},
};

/// Make one call to a running daemon and print the result.
#[derive(Debug, Clone, Parser)]
pub struct CallArgs {
	/// ZMQ socket the daemon listens on.
	#[arg(long, default_value = DEFAULT_ENDPOINT, env = "GROVE_LCD_ZMQ_SOCKET")]
	pub zmq_socket: String,

	/// How long to wait for the reply.
	#[arg(long, default_value = "5s")]
	pub timeout: humantime::Duration,

	/// Print the raw JSON reply.
	#[arg(long)]
	pub json: bool,

	/// The call to make
	#[command(subcommand)]
	pub call: Call,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Call {
	/// Set the backlight colour.
	SetColor { red: u8, green: u8, blue: u8 },

	/// Get the backlight colour last set.
	GetColor,

	/// Clear the display.
	Clear,

	/// Write text on the first line.
	WriteFirstLine {
		text: String,

		/// Column to start at.
		#[arg(long, default_value = "0")]
		position: u8,
	},

	/// Write text on the second line.
	WriteSecondLine {
		text: String,

		/// Column to start at.
		#[arg(long, default_value = "0")]
		position: u8,
	},

	/// Read back what's on the display.
	ReadLcd,

	/// How many characters fit on a line.
	GetLineSize,

	/// Write to the device file: a colour as `r<N> g<N> b<N>`, or text on LCD-only devices.
	FileWrite { data: String },

	/// Read the device file's status text.
	FileRead {
		#[arg(long, default_value = "0")]
		offset: usize,

		#[arg(long, default_value = "4096")]
		count: usize,
	},
}

impl From<Call> for Request {
	fn from(call: Call) -> Self {
		match call {
			Call::SetColor { red, green, blue } => Self::SetColor { red, green, blue },
			Call::GetColor => Self::GetColor,
			Call::Clear => Self::Clear,
			Call::WriteFirstLine { text, position } => Self::WriteFirstLine { position, text },
			Call::WriteSecondLine { text, position } => Self::WriteSecondLine { position, text },
			Call::ReadLcd => Self::ReadLcd,
			Call::GetLineSize => Self::GetLineSize,
			Call::FileWrite { data } => Self::FileWrite { data },
			Call::FileRead { offset, count } => Self::FileRead { offset, count },
		}
	}
}

pub async fn run(ctx: Context<CallArgs>) -> Result<()> {
	let CallArgs {
		zmq_socket,
		timeout,
		json,
		call,
	} = ctx.args_top;

	let client = ZmqClient::connect(&zmq_socket, *timeout)?;
	let response = client.call_ok(call.into())?;

	if json {
		println!("{}", serde_json::to_string(&response).into_diagnostic()?);
	} else if let Some(line) = describe(&response) {
		println!("{line}");
	}

	Ok(())
}

fn describe(response: &Response) -> Option<String> {
	match response {
		Response::Done => None,
		Response::Color { red, green, blue } => Some(Rgb::new(*red, *green, *blue).to_string()),
		Response::Text { text } => Some(text.clone()),
		Response::LineSize { size } => Some(size.to_string()),
		Response::Written { written } => Some(format!("{written} bytes written")),
		Response::Error { kind, message } => Some(format!("{kind:?}: {message}")),
	}
}
