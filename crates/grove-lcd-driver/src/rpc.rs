//! Remote calls to a device.
//!
//! Requests and responses are plain serde types, so they can travel over any transport; the
//! `grove-lcd` daemon carries them as JSON over ZeroMQ. [`dispatch`] maps a request onto a device.

use serde::{Deserialize, Serialize};
use tracing::{debug, instrument};

use crate::{
	bus::I2cChannel,
	device::{Grove, Line, Rgb},
	error::Error,
};

/// A call to a device.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "call", rename_all = "snake_case")]
pub enum Request {
	SetColor { red: u8, green: u8, blue: u8 },
	GetColor,
	Clear,
	WriteFirstLine { position: u8, text: String },
	WriteSecondLine { position: u8, text: String },
	ReadLcd,
	GetLineSize,
	FileWrite { data: String },
	FileRead { offset: usize, count: usize },
}

/// The answer to a [`Request`].
#[derive(Clone, Debug, PartialEq, Eq, Deserialize, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Response {
	Done,
	Color { red: u8, green: u8, blue: u8 },
	Text { text: String },
	LineSize { size: u8 },
	Written { written: usize },
	Error { kind: ErrorKind, message: String },
}

/// Broad category of a failed call.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
	/// The bus reported an error.
	Io,

	/// The device lacks what the call needs.
	NotSupported,

	/// No device is visible to take the call.
	Unavailable,

	/// The call's arguments were rejected.
	InvalidInput,

	/// The request couldn't be decoded.
	BadRequest,

	/// Anything else.
	Internal,
}

impl From<&Error> for ErrorKind {
	fn from(err: &Error) -> Self {
		match err {
			Error::I2c(_) | Error::Io(_) => Self::Io,
			Error::NotSupported(_) => Self::NotSupported,
			Error::ResourceUnavailable(_) | Error::NoChannels | Error::Removed => Self::Unavailable,
			Error::InvalidPosition(_) | Error::InvalidColor { .. } => Self::InvalidInput,
			Error::Init { source, .. } => Self::from(source.as_ref()),
			Error::AllocationFailure(_) | Error::AlreadyBound(_) => Self::Internal,
		}
	}
}

/// A failed call, as seen by the caller.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
#[error("remote call failed ({kind:?}): {message}")]
pub struct RemoteError {
	pub kind: ErrorKind,
	pub message: String,
}

impl Response {
	pub fn error(kind: ErrorKind, message: impl Into<String>) -> Self {
		Self::Error {
			kind,
			message: message.into(),
		}
	}

	/// Split off error responses.
	pub fn into_result(self) -> Result<Self, RemoteError> {
		match self {
			Self::Error { kind, message } => Err(RemoteError { kind, message }),
			other => Ok(other),
		}
	}
}

impl From<Error> for Response {
	fn from(err: Error) -> Self {
		let kind = ErrorKind::from(&err);
		let mut message = err.to_string();
		let mut source = std::error::Error::source(&err);
		while let Some(inner) = source {
			message.push_str(": ");
			message.push_str(&inner.to_string());
			source = inner.source();
		}

		Self::Error { kind, message }
	}
}

/// Carry out a request on a device.
///
/// Device errors become [`Response::Error`]; they never propagate further.
#[instrument(level = "debug", skip(device), fields(device = %device.name()))]
pub fn dispatch<C: I2cChannel>(device: &Grove<C>, request: Request) -> Response {
	let result = match request {
		Request::SetColor { red, green, blue } => device
			.set_color(Rgb { red, green, blue })
			.map(|()| Response::Done),
		Request::GetColor => device.color().map(|Rgb { red, green, blue }| Response::Color {
			red,
			green,
			blue,
		}),
		Request::Clear => device.clear().map(|()| Response::Done),
		Request::WriteFirstLine { position, text } => device
			.write_line(Line::First, position, &text)
			.map(|()| Response::Done),
		Request::WriteSecondLine { position, text } => device
			.write_line(Line::Second, position, &text)
			.map(|()| Response::Done),
		Request::ReadLcd => device.read_lcd().map(|text| Response::Text { text }),
		Request::GetLineSize => device.line_size().map(|size| Response::LineSize { size }),
		Request::FileWrite { data } => device
			.file_write(data.as_bytes())
			.map(|written| Response::Written { written }),
		Request::FileRead { offset, count } => device.file_read(offset, count).map(|bytes| {
			Response::Text {
				text: String::from_utf8_lossy(&bytes).into_owned(),
			}
		}),
	};

	result.unwrap_or_else(|err| {
		debug!(?err, "call failed");
		Response::from(err)
	})
}

/// Decode a raw request and carry it out, if a device is there to take it.
pub fn handle_message<C: I2cChannel>(device: Option<&Grove<C>>, bytes: &[u8]) -> Response {
	let request = match serde_json::from_slice::<Request>(bytes) {
		Ok(request) => request,
		Err(err) => return Response::error(ErrorKind::BadRequest, err.to_string()),
	};

	match device {
		Some(device) => dispatch(device, request),
		None => Response::error(ErrorKind::Unavailable, "device is not visible"),
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{
		bus::{Channel, Parent},
		device::{InitOptions, Variant},
		mock::{MockBus, MockChannel},
	};

	fn device(bus: &MockBus) -> Grove<MockChannel> {
		let grove = Grove::new(
			"grove",
			Variant::Combined,
			bus.channel(Channel::Rgb).ok(),
			bus.channel(Channel::Lcd).ok(),
		);
		grove.init(&InitOptions::default()).unwrap();
		grove
	}

	#[test]
	fn request_wire_format() {
		let request: Request =
			serde_json::from_str(r#"{"call":"write_first_line","position":4,"text":"Hallo"}"#)
				.unwrap();
		assert_eq!(
			request,
			Request::WriteFirstLine {
				position: 4,
				text: "Hallo".into()
			}
		);

		let request: Request = serde_json::from_str(r#"{"call":"get_color"}"#).unwrap();
		assert_eq!(request, Request::GetColor);
	}

	#[test]
	fn response_wire_format() {
		assert_eq!(
			serde_json::to_string(&Response::Done).unwrap(),
			r#"{"status":"done"}"#
		);
		assert_eq!(
			serde_json::to_string(&Response::LineSize { size: 16 }).unwrap(),
			r#"{"status":"line_size","size":16}"#
		);
		assert_eq!(
			serde_json::to_string(&Response::error(ErrorKind::Io, "nope")).unwrap(),
			r#"{"status":"error","kind":"io","message":"nope"}"#
		);
	}

	#[test]
	fn dispatches_calls() {
		let bus = MockBus::new();
		let grove = device(&bus);

		assert_eq!(
			dispatch(
				&grove,
				Request::SetColor {
					red: 0xff,
					green: 0,
					blue: 0xff
				}
			),
			Response::Done
		);
		assert_eq!(
			dispatch(&grove, Request::GetColor),
			Response::Color {
				red: 0xff,
				green: 0,
				blue: 0xff
			}
		);
		assert_eq!(dispatch(&grove, Request::Clear), Response::Done);
		assert_eq!(
			dispatch(&grove, Request::ReadLcd),
			Response::Text {
				text: " \n ".into()
			}
		);
		assert_eq!(
			dispatch(&grove, Request::GetLineSize),
			Response::LineSize { size: 16 }
		);
	}

	#[test]
	fn bus_errors_become_responses() {
		let bus = MockBus::new();
		let grove = device(&bus);
		bus.break_channel(Channel::Lcd);

		let response = dispatch(&grove, Request::Clear);
		assert!(matches!(
			response,
			Response::Error {
				kind: ErrorKind::Io,
				..
			}
		));
	}

	#[test]
	fn malformed_requests_are_call_errors() {
		let bus = MockBus::new();
		let grove = device(&bus);

		let response = handle_message(Some(&grove), b"{\"call\":\"self_destruct\"}");
		assert!(matches!(
			response,
			Response::Error {
				kind: ErrorKind::BadRequest,
				..
			}
		));

		// device still answers afterwards
		assert_eq!(
			handle_message(Some(&grove), br#"{"call":"get_line_size"}"#),
			Response::LineSize { size: 16 }
		);
	}

	#[test]
	fn invisible_device_is_unavailable() {
		let response = handle_message::<MockChannel>(None, br#"{"call":"get_color"}"#);
		assert_eq!(
			response.into_result().unwrap_err().kind,
			ErrorKind::Unavailable
		);
	}
}
