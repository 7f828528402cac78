//! Smart Battery System (SBS) register addresses, maintenance command
//! constants and unit conversions.
//!
//! Everything in this module is pure: raw 16-bit register words go in,
//! display-ready physical quantities come out. No bus I/O happens here.

use std::fmt;

/// Errors for values that fail protocol-level validation.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// The value does not fit into a 7-bit bus address.
    #[error("device address 0x{0:02X} is not a valid 7-bit bus address")]
    AddressOutOfRange(u8),
}

/// First half of the vendor unseal key, transmitted high byte first.
pub const UNSEAL_KEY_1: u16 = 0xCCDF;
/// Second half of the vendor unseal key, transmitted high byte first.
pub const UNSEAL_KEY_2: u16 = 0x7EE0;
/// Single-byte command that clears the permanent-failure flag.
/// The pack must be unsealed for the controller to accept it.
pub const CLEAR_PF_COMMAND: u8 = 0x42;

/// Standard and common non-standard SBS command codes.
///
/// All registers except [`Register::PackSerial`] read as 16-bit words;
/// `PackSerial` reads as a length-prefixed string.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum Register {
    BatteryMode = 0x03,
    Temperature = 0x08,
    Voltage = 0x09,
    Current = 0x0A,
    RelativeStateOfCharge = 0x0D,
    AbsoluteStateOfCharge = 0x0E,
    RemainingCapacity = 0x0F,
    FullChargeCapacity = 0x10,
    TimeToFull = 0x13,
    ChargingCurrent = 0x14,
    ChargingVoltage = 0x15,
    BatteryStatus = 0x16,
    CycleCount = 0x17,
    DesignCapacity = 0x18,
    DesignVoltage = 0x19,
    SpecificationInfo = 0x1A,
    ManufactureDate = 0x1B,
    SerialNumber = 0x1C,
    CellVoltage2 = 0x3E,
    CellVoltage1 = 0x3F,
    StateOfHealth = 0x4F,
    /// Vendor serial number string register.
    PackSerial = 0xD8,
}

impl Register {
    /// The command byte written on the bus to select this register.
    pub const fn code(self) -> u8 {
        self as u8
    }
}

/// A 7-bit bus address identifying the target battery pack.
///
/// Displays as two uppercase hex digits with a `0x` prefix, zero-padded
/// below 0x10 (`0x0B`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// Highest valid 7-bit address.
    pub const MAX: u8 = 0x7F;
}

impl TryFrom<u8> for DeviceAddress {
    type Error = Error;

    fn try_from(value: u8) -> std::result::Result<Self, Self::Error> {
        if value > Self::MAX {
            Err(Error::AddressOutOfRange(value))
        } else {
            Ok(DeviceAddress(value))
        }
    }
}

impl Default for DeviceAddress {
    /// The fixed address SBS battery packs respond on.
    fn default() -> Self {
        DeviceAddress(0x0B)
    }
}

impl std::ops::Deref for DeviceAddress {
    type Target = u8;
    fn deref(&self) -> &Self::Target {
        &self.0
    }
}

impl fmt::Display for DeviceAddress {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0x{:02X}", self.0)
    }
}

/// A voltage register value, stored as raw millivolts.
///
/// Displays in volts with exactly three decimals (`16.384`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Voltage(u16);

impl Voltage {
    pub const fn decode(raw: u16) -> Self {
        Voltage(raw)
    }

    pub const fn millivolts(&self) -> u16 {
        self.0
    }

    pub fn volts(&self) -> f64 {
        self.0 as f64 / 1000.0
    }
}

impl fmt::Display for Voltage {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{:03}", self.0 / 1000, self.0 % 1000)
    }
}

/// A temperature register value, stored as raw tenths of a Kelvin.
///
/// Displays in degrees Celsius with one decimal. The conversion always
/// lands on a half-hundredth, which is truncated rather than rounded up
/// (2981 raw → 24.95 °C → `24.9`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Temperature(u16);

impl Temperature {
    pub const fn decode(raw: u16) -> Self {
        Temperature(raw)
    }

    pub const fn deci_kelvin(&self) -> u16 {
        self.0
    }

    pub fn celsius(&self) -> f64 {
        self.0 as f64 / 10.0 - 273.15
    }
}

impl fmt::Display for Temperature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        // Hundredths of a degree stay exact in integer arithmetic.
        let centi = self.0 as i32 * 10 - 27315;
        let deci = centi / 10;
        let sign = if deci < 0 { "-" } else { "" };
        let deci = deci.abs();
        write!(f, "{}{}.{}", sign, deci / 10, deci % 10)
    }
}

/// A signed current register value in milliamps.
///
/// Charge currents are positive, discharge currents negative.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Current(i16);

impl Current {
    pub const fn decode(raw: u16) -> Self {
        Current(raw as i16)
    }

    pub const fn milliamps(&self) -> i16 {
        self.0
    }
}

impl fmt::Display for Current {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The packed manufacture date register.
///
/// Day occupies bits 0-4, month bits 5-8, year-offset-from-1980 bits 9-15.
/// Displays as `D.M.Y`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ManufactureDate {
    pub day: u8,
    pub month: u8,
    pub year: u16,
}

impl ManufactureDate {
    pub const fn decode(raw: u16) -> Self {
        ManufactureDate {
            day: (raw & 0x1F) as u8,
            month: ((raw >> 5) & 0x0F) as u8,
            year: 1980 + ((raw >> 9) & 0x7F),
        }
    }
}

impl fmt::Display for ManufactureDate {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}.{}.{}", self.day, self.month, self.year)
    }
}

/// The BatteryMode register, reproduced bit-exact as a binary pattern.
///
/// Flag semantics are deliberately not decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryMode(u16);

impl BatteryMode {
    pub const fn decode(raw: u16) -> Self {
        BatteryMode(raw)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for BatteryMode {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0b{:b}", self.0)
    }
}

/// The BatteryStatus register, reproduced bit-exact as a binary pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatteryStatus(u16);

impl BatteryStatus {
    pub const fn decode(raw: u16) -> Self {
        BatteryStatus(raw)
    }

    pub const fn bits(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for BatteryStatus {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "0b{:b}", self.0)
    }
}
