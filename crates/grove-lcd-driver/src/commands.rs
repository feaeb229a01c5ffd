use crate::sequence::Cmd;

/// RGB backlight registers.
///
/// This is the subset of the PCA9633 register map the Grove module needs. Descriptions are from
/// [the datasheet for the PCA9633 chip][PCA9633].
///
/// [PCA9633]: https://www.nxp.com/docs/en/data-sheet/PCA9633.pdf
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum RgbRegister {
	/// Mode register 1 (MODE1).
	///
	/// Writing 0 clears the SLEEP bit and turns the oscillator on.
	Mode1 = 0x00,

	/// Mode register 2 (MODE2).
	///
	/// Writing 0 selects open-drain outputs, not inverted, updated on STOP.
	Mode2 = 0x01,

	/// Brightness of LED0 (PWM0), wired to the blue channel.
	Blue = 0x02,

	/// Brightness of LED1 (PWM1), wired to the green channel.
	Green = 0x03,

	/// Brightness of LED2 (PWM2), wired to the red channel.
	Red = 0x04,

	/// LED output state (LEDOUT).
	///
	/// 2 bits per output:
	/// - 0b00: off
	/// - 0b01: fully on
	/// - 0b10: individual brightness from PWMx
	/// - 0b11: individual and group dimming
	LedOutput = 0x08,
}

impl RgbRegister {
	/// A command writing `value` to this register.
	pub const fn set(self, value: u8) -> Cmd {
		Cmd::new(self as u8, value)
	}
}

/// LEDOUT value putting all four outputs under individual PWM control.
pub const LED_OUTPUT_PWM: u8 = 0b10_10_10_10;

/// Control byte announcing an instruction for the LCD controller.
pub const LCD_COMMAND: u8 = 0x80;

/// Control byte announcing display data for the LCD controller.
///
/// Everything after it in the same transaction is written to DDRAM at the cursor, which
/// auto-increments. It's also the ASCII code for `@`.
pub const LCD_DATA: u8 = 0x40;

/// DDRAM base address of the first row.
pub const ROW_ONE: u8 = 0x80;

/// DDRAM base address of the second row.
pub const ROW_TWO: u8 = 0xC0;

/// Last valid DDRAM column within a row.
pub const MAX_COLUMN: u8 = 0x27;

/// LCD controller instructions.
///
/// Subset of the HD44780 instruction set, just enough to bring the display up.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum LcdInstruction {
	/// Clear the display and put the cursor back at the first column of the first row.
	ClearDisplay = 0x01,

	/// Put the cursor back at the start, undoing any display shift.
	ReturnHome = 0x02,

	/// Display control: display on, cursor off, blink off.
	DisplayOnNoCursor = 0x0C,

	/// Function set: 4-bit bus, two lines, 5x8 font.
	TwoLines = 0x28,
}

impl LcdInstruction {
	/// This instruction as a command for the sequencer.
	pub const fn cmd(self) -> Cmd {
		Cmd::new(LCD_COMMAND, self as u8)
	}
}
