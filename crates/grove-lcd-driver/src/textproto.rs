//! The plain-text protocol of the device file.
//!
//! Writes carry a colour as three whitespace-separated tokens, `r<N> g<N> b<N>`, in that order,
//! each value a decimal number from 0 to 255. Anything else is rejected as a whole: no partial
//! colour is ever applied.
//!
//! Reads return a human-readable status.

use std::fmt::Write as _;

use crate::{
	device::Rgb,
	error::{Error, Result},
};

/// Parse a colour written to the device file.
pub fn parse_color(data: &[u8]) -> Result<Rgb> {
	let input = std::str::from_utf8(data).map_err(|_| Error::InvalidColor {
		input: String::from_utf8_lossy(data).into_owned(),
		reason: "not valid UTF-8",
	})?;

	let invalid = |reason| Error::InvalidColor {
		input: input.trim().to_owned(),
		reason,
	};

	let mut tokens = input.split_whitespace();
	let mut component = |prefix: char| -> Result<u8> {
		let token = tokens.next().ok_or_else(|| invalid("expected three tokens"))?;
		let value = token
			.strip_prefix(prefix)
			.ok_or_else(|| invalid("tokens must be r, g, b in that order"))?;
		if value.is_empty() || !value.bytes().all(|b| b.is_ascii_digit()) {
			return Err(invalid("values must be decimal numbers"));
		}
		value.parse().map_err(|_| invalid("values must be at most 255"))
	};

	let red = component('r')?;
	let green = component('g')?;
	let blue = component('b')?;

	if tokens.next().is_some() {
		return Err(invalid("expected three tokens"));
	}

	Ok(Rgb { red, green, blue })
}

/// The status text read from the device file.
///
/// Each part is only present when the device has the matching channel.
pub fn status_text(color: Option<Rgb>, lines: Option<(&str, &str)>) -> String {
	let mut text = String::new();

	if let Some(Rgb { red, green, blue }) = color {
		let _ = write!(
			text,
			"Grove LCD RGB Status:\nRed: {red:x}\nGreen: {green:x}\nBlue: {blue:x}\n"
		);
	}

	if let Some((one, two)) = lines {
		let _ = write!(text, "Grove LCD RGB Content:\n{one}\n{two}\n");
	}

	text
}
