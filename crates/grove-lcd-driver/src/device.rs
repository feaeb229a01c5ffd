use std::{
	fmt,
	sync::{Mutex, MutexGuard, PoisonError},
	thread::sleep,
	time::Duration,
};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::{
	bus::{Capability, Channel, I2cChannel},
	commands::{
		LcdInstruction, RgbRegister, LCD_COMMAND, LED_OUTPUT_PWM, MAX_COLUMN, ROW_ONE, ROW_TWO,
	},
	error::{Error, Result},
	sequence::{apply_commands, write_data, Cmd},
	textproto,
};

/// How many characters fit on a line of the display.
pub const LINE_SIZE: usize = 16;

/// What a line holds after the display is cleared.
pub const BLANK_LINE: &str = " ";

/// A backlight colour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize, Serialize)]
pub struct Rgb {
	pub red: u8,
	pub green: u8,
	pub blue: u8,
}

impl Rgb {
	pub const GREEN: Self = Self::new(0, 0xFF, 0);

	pub const fn new(red: u8, green: u8, blue: u8) -> Self {
		Self { red, green, blue }
	}

	/// The command sequence that applies this colour.
	pub const fn commands(self) -> [Cmd; 3] {
		[
			RgbRegister::Red.set(self.red),
			RgbRegister::Green.set(self.green),
			RgbRegister::Blue.set(self.blue),
		]
	}
}

impl fmt::Display for Rgb {
	fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
		write!(f, "#{:02x}{:02x}{:02x}", self.red, self.green, self.blue)
	}
}

/// Which channels a device is made of.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
	/// Only the backlight.
	Rgb,

	/// Only the LCD.
	Lcd,

	/// Both, tolerating either one being absent.
	Combined,
}

/// A row of the display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Line {
	First,
	Second,
}

impl Line {
	/// The DDRAM address command value putting the cursor at `position` on this row.
	pub const fn cursor(self, position: u8) -> u8 {
		match self {
			Self::First => ROW_ONE | position,
			Self::Second => ROW_TWO | position,
		}
	}
}

/// Where a device is in its life.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Lifecycle {
	Created,
	Initializing,
	Visible,
	Removed,
}

/// What the init sequence should do.
#[derive(Debug, Clone)]
pub struct InitOptions {
	/// Backlight colour to start with.
	///
	/// Defaults to full green.
	pub color: Rgb,

	/// Text written to the first line once the LCD is up.
	///
	/// Defaults to `Init`.
	pub greeting: String,

	/// How many more times to try the whole sequence if it fails.
	///
	/// Defaults to 0: fail on the first error.
	pub retries: u32,

	/// Pause between attempts.
	///
	/// Defaults to 100ms.
	pub retry_delay: Duration,
}

impl Default for InitOptions {
	fn default() -> Self {
		Self {
			color: Rgb::GREEN,
			greeting: "Init".into(),
			retries: 0,
			retry_delay: Duration::from_millis(100),
		}
	}
}

/// Clamp text to what a line can show.
///
/// Keeps at most [`LINE_SIZE`] characters. Anything outside ASCII has no place in the
/// controller's character ROM and becomes `?`.
pub fn visible_text(text: &str) -> String {
	text.chars()
		.map(|c| if c.is_ascii() { c } else { '?' })
		.take(LINE_SIZE)
		.collect()
}

/// One Grove LCD RGB module.
///
/// All bus access and all cached state sit behind a single lock, so operations on one device are
/// totally ordered and never interleave on the wire. The lifecycle has its own lock, which is never
/// held across bus traffic, so checking visibility doesn't wait on a running init sequence.
#[derive(Debug)]
pub struct Grove<C> {
	name: String,
	variant: Variant,
	state: Mutex<State<C>>,
	lifecycle: Mutex<Lifecycle>,
}

#[derive(Debug)]
struct State<C> {
	rgb: Option<C>,
	lcd: Option<C>,
	color: Rgb,
	line_one: String,
	line_two: String,
}

impl<C: I2cChannel> Grove<C> {
	pub(crate) fn new(name: &str, variant: Variant, rgb: Option<C>, lcd: Option<C>) -> Self {
		Self {
			name: name.into(),
			variant,
			state: Mutex::new(State {
				rgb,
				lcd,
				color: Rgb::default(),
				line_one: String::new(),
				line_two: String::new(),
			}),
			lifecycle: Mutex::new(Lifecycle::Created),
		}
	}

	fn state(&self) -> MutexGuard<'_, State<C>> {
		self.state.lock().unwrap_or_else(PoisonError::into_inner)
	}

	fn live(&self) -> Result<MutexGuard<'_, State<C>>> {
		let state = self.state();
		if self.lifecycle() == Lifecycle::Removed {
			return Err(Error::Removed);
		}
		Ok(state)
	}

	/// Move from one lifecycle stage to the next, if the device is still where it's expected to be.
	fn advance(&self, from: Lifecycle, to: Lifecycle) -> Result<()> {
		let mut lifecycle = self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner);
		if *lifecycle != from {
			return Err(Error::Removed);
		}
		*lifecycle = to;
		Ok(())
	}

	pub fn name(&self) -> &str {
		&self.name
	}

	pub fn variant(&self) -> Variant {
		self.variant
	}

	pub fn lifecycle(&self) -> Lifecycle {
		*self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner)
	}

	pub fn is_visible(&self) -> bool {
		self.lifecycle() == Lifecycle::Visible
	}

	/// Whether the device has this channel.
	pub fn has(&self, channel: Channel) -> bool {
		let state = self.state();
		match channel {
			Channel::Rgb => state.rgb.is_some(),
			Channel::Lcd => state.lcd.is_some(),
		}
	}

	/// Set the backlight colour.
	///
	/// The cached colour only changes if all three writes succeed.
	#[instrument(level = "debug", skip(self), fields(device = %self.name))]
	pub fn set_color(&self, color: Rgb) -> Result<()> {
		self.live()?.set_color(color)
	}

	/// The last colour successfully applied.
	///
	/// This is the cached value: it doesn't touch the bus.
	pub fn color(&self) -> Result<Rgb> {
		let state = self.live()?;
		state.require(Channel::Rgb)?;
		Ok(state.color)
	}

	/// Write text on a line, starting at `position`.
	///
	/// Text longer than [`LINE_SIZE`] is truncated. `position` is a DDRAM column, at most 0x27.
	#[instrument(level = "debug", skip(self), fields(device = %self.name))]
	pub fn write_line(&self, line: Line, position: u8, text: &str) -> Result<()> {
		self.live()?.write_line(line, position, text)
	}

	/// Clear the display.
	#[instrument(level = "debug", skip(self), fields(device = %self.name))]
	pub fn clear(&self) -> Result<()> {
		self.live()?.clear()
	}

	/// Both cached lines, joined by a newline.
	pub fn read_lcd(&self) -> Result<String> {
		let state = self.live()?;
		state.require(Channel::Lcd)?;
		Ok(format!("{}\n{}", state.line_one, state.line_two))
	}

	/// How many characters fit on a line.
	pub fn line_size(&self) -> Result<u8> {
		self.live()?.require(Channel::Lcd)?;
		Ok(LINE_SIZE as u8)
	}

	/// Handle a write to the device file.
	///
	/// Devices with a backlight take a colour in `r<N> g<N> b<N>` form; LCD-only devices take text,
	/// which replaces the whole display. Returns how many bytes were consumed.
	#[instrument(level = "debug", skip(self, data), fields(device = %self.name, len = data.len()))]
	pub fn file_write(&self, data: &[u8]) -> Result<usize> {
		let mut state = self.live()?;
		if state.rgb.is_some() {
			let color = textproto::parse_color(data)?;
			state.set_color(color)?;
		} else {
			let text = String::from_utf8_lossy(data);
			state.write_screen(text.trim_end_matches(['\r', '\n']))?;
		}

		Ok(data.len())
	}

	/// Handle a read of the device file: the status text from `offset`, at most `count` bytes.
	pub fn file_read(&self, offset: usize, count: usize) -> Result<Vec<u8>> {
		let state = self.live()?;
		let color = state.rgb.as_ref().map(|_| state.color);
		let lines = state
			.lcd
			.as_ref()
			.map(|_| (state.line_one.as_str(), state.line_two.as_str()));
		let text = textproto::status_text(color, lines);

		Ok(text
			.as_bytes()
			.iter()
			.skip(offset)
			.take(count)
			.copied()
			.collect())
	}

	/// Run the init sequence, then make the device visible.
	///
	/// The whole sequence is retried up to `options.retries` times. The device lock is held for
	/// each attempt, not across the pause between them. On failure the device stays invisible;
	/// the caller is expected to remove it.
	#[instrument(level = "debug", skip(self, options), fields(device = %self.name))]
	pub(crate) fn init(&self, options: &InitOptions) -> Result<()> {
		self.advance(Lifecycle::Created, Lifecycle::Initializing)?;

		let attempts = options.retries.saturating_add(1);
		let mut attempt = 1;
		loop {
			let outcome = self.state().init(options);
			match outcome {
				Ok(()) => break,
				Err(err) if attempt < attempts => {
					warn!(attempt, attempts, ?err, "init sequence failed, retrying");
					sleep(options.retry_delay);
					attempt += 1;
				}
				Err(err) => {
					return Err(Error::Init {
						attempts: attempt,
						source: Box::new(err),
					});
				}
			}
		}

		self.advance(Lifecycle::Initializing, Lifecycle::Visible)?;
		info!(device = %self.name, "device initialised and visible");
		Ok(())
	}

	/// Tear the device down: drop its channels and refuse further operations.
	pub(crate) fn release(&self) {
		let mut state = self.state();
		state.rgb = None;
		state.lcd = None;
		*self.lifecycle.lock().unwrap_or_else(PoisonError::into_inner) = Lifecycle::Removed;
		drop(state);
		debug!(device = %self.name, "device released");
	}
}

impl<C: I2cChannel> State<C> {
	fn require(&self, channel: Channel) -> Result<()> {
		let present = match channel {
			Channel::Rgb => self.rgb.is_some(),
			Channel::Lcd => self.lcd.is_some(),
		};

		if present {
			Ok(())
		} else {
			Err(Error::NotSupported(Capability::Channel(channel)))
		}
	}

	fn rgb(&mut self) -> Result<&mut C> {
		self.rgb
			.as_mut()
			.ok_or(Error::NotSupported(Capability::Channel(Channel::Rgb)))
	}

	fn lcd(&mut self) -> Result<&mut C> {
		self.lcd
			.as_mut()
			.ok_or(Error::NotSupported(Capability::Channel(Channel::Lcd)))
	}

	fn set_color(&mut self, color: Rgb) -> Result<()> {
		apply_commands(self.rgb()?, &color.commands())?;
		self.color = color;
		Ok(())
	}

	fn write_line(&mut self, line: Line, position: u8, text: &str) -> Result<()> {
		if position > MAX_COLUMN {
			return Err(Error::InvalidPosition(position));
		}

		let text = visible_text(text);
		let lcd = self.lcd()?;
		apply_commands(lcd, &[Cmd::new(LCD_COMMAND, line.cursor(position))])?;
		write_data(lcd, text.as_bytes())?;

		match line {
			Line::First => self.line_one = text,
			Line::Second => self.line_two = text,
		}
		Ok(())
	}

	fn clear(&mut self) -> Result<()> {
		apply_commands(self.lcd()?, &[LcdInstruction::ClearDisplay.cmd()])?;
		self.line_one = BLANK_LINE.into();
		self.line_two = BLANK_LINE.into();
		Ok(())
	}

	/// Replace the whole display with one line of text.
	fn write_screen(&mut self, text: &str) -> Result<()> {
		let text = visible_text(text);
		let lcd = self.lcd()?;
		apply_commands(
			lcd,
			&[
				LcdInstruction::ClearDisplay.cmd(),
				LcdInstruction::ReturnHome.cmd(),
			],
		)?;
		write_data(lcd, text.as_bytes())?;

		self.line_one = text;
		self.line_two = BLANK_LINE.into();
		Ok(())
	}

	fn init(&mut self, options: &InitOptions) -> Result<()> {
		if let Some(rgb) = self.rgb.as_mut() {
			debug!("bringing up RGB backlight");
			apply_commands(
				rgb,
				&[
					RgbRegister::Mode1.set(0),
					RgbRegister::Mode2.set(0),
					RgbRegister::LedOutput.set(LED_OUTPUT_PWM),
				],
			)?;
			self.set_color(options.color)?;
		}

		if let Some(lcd) = self.lcd.as_mut() {
			debug!("bringing up LCD");
			apply_commands(
				lcd,
				&[
					LcdInstruction::ClearDisplay.cmd(),
					LcdInstruction::ReturnHome.cmd(),
					LcdInstruction::DisplayOnNoCursor.cmd(),
					LcdInstruction::TwoLines.cmd(),
				],
			)?;
			self.write_line(Line::First, 0, &options.greeting)?;
		}

		Ok(())
	}
}

#[cfg(test)]
mod tests {
	use super::*;
	use crate::{bus::Parent, mock::MockBus};

	fn combined(bus: &MockBus) -> Grove<crate::mock::MockChannel> {
		let rgb = bus.channel(Channel::Rgb).ok();
		let lcd = bus.channel(Channel::Lcd).ok();
		let grove = Grove::new("grove", Variant::Combined, rgb, lcd);
		grove.init(&InitOptions::default()).unwrap();
		bus.clear_log();
		grove
	}

	#[test]
	fn init_sequence() {
		let bus = MockBus::new();
		let grove = Grove::new(
			"grove",
			Variant::Combined,
			bus.channel(Channel::Rgb).ok(),
			bus.channel(Channel::Lcd).ok(),
		);
		assert_eq!(grove.lifecycle(), Lifecycle::Created);

		grove.init(&InitOptions::default()).unwrap();
		assert_eq!(grove.lifecycle(), Lifecycle::Visible);
		assert_eq!(
			bus.writes(),
			vec![
				vec![0x00, 0x00],
				vec![0x01, 0x00],
				vec![0x08, 0xAA],
				vec![0x04, 0x00],
				vec![0x03, 0xFF],
				vec![0x02, 0x00],
				vec![0x80, 0x01],
				vec![0x80, 0x02],
				vec![0x80, 0x0C],
				vec![0x80, 0x28],
				vec![0x80, 0x80],
				b"@Init".to_vec(),
			]
		);
		assert_eq!(grove.color().unwrap(), Rgb::GREEN);
		assert_eq!(grove.read_lcd().unwrap(), "Init\n");
	}

	#[test]
	fn init_is_bounded() {
		let bus = MockBus::new();
		bus.break_channel(Channel::Rgb);
		let grove = Grove::new("grove", Variant::Rgb, bus.channel(Channel::Rgb).ok(), None);

		let err = grove
			.init(&InitOptions {
				retries: 2,
				retry_delay: Duration::ZERO,
				..Default::default()
			})
			.unwrap_err();
		assert!(matches!(err, Error::Init { attempts: 3, .. }));
		assert!(err.is_bus_failure());
		assert_eq!(grove.lifecycle(), Lifecycle::Initializing);

		// each attempt stops at its first write
		assert_eq!(bus.writes().len(), 3);
	}

	#[test]
	fn init_retry_recovers() {
		let bus = MockBus::new();
		let grove = Grove::new("grove", Variant::Rgb, bus.channel(Channel::Rgb).ok(), None);
		bus.fail_nth(2);

		grove
			.init(&InitOptions {
				retries: 1,
				retry_delay: Duration::ZERO,
				..Default::default()
			})
			.unwrap();
		assert!(grove.is_visible());
	}

	#[test]
	fn set_color_then_get() {
		let bus = MockBus::new();
		let grove = combined(&bus);
		grove.set_color(Rgb::new(0x12, 0x34, 0x56)).unwrap();
		assert_eq!(grove.color().unwrap(), Rgb::new(0x12, 0x34, 0x56));
		assert_eq!(
			bus.writes(),
			vec![vec![0x04, 0x12], vec![0x03, 0x34], vec![0x02, 0x56]]
		);
	}

	#[test]
	fn failed_set_color_keeps_cache() {
		let bus = MockBus::new();
		let grove = combined(&bus);
		bus.fail_nth(1);

		assert!(grove.set_color(Rgb::new(1, 2, 3)).is_err());
		assert_eq!(grove.color().unwrap(), Rgb::GREEN);
		assert_eq!(bus.writes(), vec![vec![0x04, 1], vec![0x03, 2]]);
	}

	#[test]
	fn cursor_positions() {
		assert_eq!(Line::First.cursor(0), 0x80);
		assert_eq!(Line::First.cursor(4), 0x84);
		assert_eq!(Line::Second.cursor(0), 0xC0);
		assert_eq!(Line::Second.cursor(4), 0xC4);
	}

	#[test]
	fn write_second_line() {
		let bus = MockBus::new();
		let grove = combined(&bus);
		grove.write_line(Line::Second, 4, "Anna").unwrap();
		assert_eq!(bus.writes(), vec![vec![0x80, 0xC4], b"@Anna".to_vec()]);
		assert_eq!(grove.read_lcd().unwrap(), "Init\nAnna");
	}

	#[test]
	fn position_out_of_row() {
		let bus = MockBus::new();
		let grove = combined(&bus);
		assert!(matches!(
			grove.write_line(Line::First, 0x28, "x"),
			Err(Error::InvalidPosition(0x28))
		));
		assert!(bus.writes().is_empty());
	}

	#[test]
	fn failed_cursor_write_keeps_cache() {
		let bus = MockBus::new();
		let grove = combined(&bus);
		bus.fail_nth(0);

		assert!(grove.write_line(Line::First, 0, "Hallo").is_err());
		assert_eq!(grove.read_lcd().unwrap(), "Init\n");
		// text transaction never issued
		assert_eq!(bus.writes(), vec![vec![0x80, 0x80]]);
	}

	#[test]
	fn failed_text_write_keeps_cache() {
		let bus = MockBus::new();
		let grove = combined(&bus);
		bus.fail_nth(1);

		assert!(grove.write_line(Line::First, 0, "Hallo").is_err());
		assert_eq!(grove.read_lcd().unwrap(), "Init\n");
		assert_eq!(bus.writes(), vec![vec![0x80, 0x80], b"@Hallo".to_vec()]);
	}

	#[test]
	fn failed_clear_keeps_cache() {
		let bus = MockBus::new();
		let grove = combined(&bus);
		grove.write_line(Line::Second, 4, "Anna").unwrap();
		bus.fail_nth(0);

		assert!(grove.clear().is_err());
		assert_eq!(grove.read_lcd().unwrap(), "Init\nAnna");
	}

	#[test]
	fn lifecycle_is_readable_while_bus_is_busy() {
		let bus = MockBus::new().with_delay(Duration::from_millis(50));
		let grove = Grove::new("grove", Variant::Rgb, bus.channel(Channel::Rgb).ok(), None);

		std::thread::scope(|s| {
			s.spawn(|| grove.set_color(Rgb::new(1, 2, 3)).unwrap());
			std::thread::sleep(Duration::from_millis(20));

			let started = std::time::Instant::now();
			assert_eq!(grove.lifecycle(), Lifecycle::Created);
			assert!(started.elapsed() < Duration::from_millis(50));
		});
	}

	#[test]
	fn non_ascii_is_replaced() {
		assert_eq!(visible_text("Grüße"), "Gr??e");
		assert_eq!(visible_text("0123456789abcdefXYZ"), "0123456789abcdef");
	}

	#[test]
	fn variants_gate_operations() {
		let bus = MockBus::new();
		let lcd_only = Grove::new("lcd", Variant::Lcd, None, bus.channel(Channel::Lcd).ok());
		lcd_only.init(&InitOptions::default()).unwrap();
		assert!(matches!(
			lcd_only.set_color(Rgb::GREEN),
			Err(Error::NotSupported(Capability::Channel(Channel::Rgb)))
		));
		assert!(matches!(
			lcd_only.color(),
			Err(Error::NotSupported(Capability::Channel(Channel::Rgb)))
		));

		let rgb_only = Grove::new("rgb", Variant::Rgb, bus.channel(Channel::Rgb).ok(), None);
		rgb_only.init(&InitOptions::default()).unwrap();
		assert!(matches!(
			rgb_only.clear(),
			Err(Error::NotSupported(Capability::Channel(Channel::Lcd)))
		));
		assert!(rgb_only.line_size().is_err());
	}

	#[test]
	fn removed_device_refuses() {
		let bus = MockBus::new();
		let grove = combined(&bus);
		grove.release();
		assert!(!grove.has(Channel::Rgb));
		assert!(matches!(grove.color(), Err(Error::Removed)));
		assert!(matches!(grove.clear(), Err(Error::Removed)));
		assert!(bus.writes().is_empty());
	}

	#[test]
	fn file_write_color() {
		let bus = MockBus::new();
		let grove = combined(&bus);
		assert_eq!(grove.file_write(b"r10 g20 b30\n").unwrap(), 12);
		assert_eq!(grove.color().unwrap(), Rgb::new(10, 20, 30));
	}

	#[test]
	fn file_write_rejects_garbage() {
		let bus = MockBus::new();
		let grove = combined(&bus);
		assert!(matches!(
			grove.file_write(b"hello"),
			Err(Error::InvalidColor { .. })
		));
		assert!(bus.writes().is_empty());
		assert_eq!(grove.color().unwrap(), Rgb::GREEN);
	}

	#[test]
	fn file_write_text_on_lcd() {
		let bus = MockBus::new();
		let grove = Grove::new("lcd", Variant::Lcd, None, bus.channel(Channel::Lcd).ok());
		grove.init(&InitOptions::default()).unwrap();
		bus.clear_log();

		grove.file_write(b"hello\n").unwrap();
		assert_eq!(
			bus.writes(),
			vec![vec![0x80, 0x01], vec![0x80, 0x02], b"@hello".to_vec()]
		);
		assert_eq!(grove.read_lcd().unwrap(), "hello\n ");
	}

	#[test]
	fn file_read_slices() {
		let bus = MockBus::new();
		let grove = Grove::new("rgb", Variant::Rgb, bus.channel(Channel::Rgb).ok(), None);
		grove.init(&InitOptions::default()).unwrap();

		let all = grove.file_read(0, 4096).unwrap();
		assert_eq!(
			String::from_utf8(all).unwrap(),
			"Grove LCD RGB Status:\nRed: 0\nGreen: ff\nBlue: 0\n"
		);
		assert_eq!(grove.file_read(0, 5).unwrap(), b"Grove");
		assert_eq!(grove.file_read(6, 3).unwrap(), b"LCD");
		assert!(grove.file_read(4096, 10).unwrap().is_empty());
	}
}
