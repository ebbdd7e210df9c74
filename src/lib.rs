//! Driver for the Microchip MCP4728 quad channel 12-bit I2C DAC
//!
//! The driver owns the I2C bus handle, the ~LDAC pin and a delay source.
//! Channel values are written as raw 12-bit codes or as voltages converted
//! with the configured full scale (4.096V with the internal reference and
//! x2 gain, i.e. 1mV per LSB). The ~LDAC pin is used to commit staged values
//! on all channels at once and to run the address reprogramming handshake.
//!
//! ```no_run
//! # use embedded_hal::{i2c::I2c, digital::OutputPin, delay::DelayNs};
//! # fn demo<I: I2c, P: OutputPin, D: DelayNs>(i2c: I, ldac: P, delay: D) {
//! use mcp4728::{Channel, DeviceAddress, Mcp4728};
//!
//! let mut dac = Mcp4728::new(i2c, ldac, delay, DeviceAddress::DEFAULT);
//! dac.set_channel(Channel::A, 2048).ok();
//! dac.set_channel_voltage(Channel::B, 1.25).ok();
//! # }
//! ```
//!
//! Sharing: every operation takes `&mut self`, so the address change
//! sequence can never interleave with another transaction issued through the
//! same driver. Put the whole driver behind one mutex when it is used from
//! several contexts; share only the bus with `embedded-hal-bus` devices.

#![deny(unsafe_code, missing_docs)]
#![cfg_attr(not(test), no_std)]

use bitfield_struct::bitfield;

mod command;
mod driver;
#[cfg(feature = "readback")]
mod readback;
pub mod timing;

pub use command::RegisterFrame;
pub use driver::{AllChannelsError, AllChannelsReport, ChannelOutcome, OnFailure};
#[cfg(feature = "readback")]
pub use readback::{ChannelState, RegisterRecord, Registers};

/// MCP4728 DAC with its bus, ~LDAC pin and delay source
pub struct Mcp4728<I2C, LDAC, D> {
    i2c: I2C,
    ldac: LDAC,
    delay: D,
    address: DeviceAddress,
    cfg: Config,
}

/// Errors for this crate
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum Error<E, P> {
    /// I2C transaction failed (NACK, arbitration loss, bus error)
    Bus(E),
    /// ~LDAC pin could not be driven
    Pin(P),
    /// Argument outside the valid domain, nothing was sent
    Range(RangeError),
    /// The address reprogramming sequence failed part way
    AddressChange(AddressChangeError<E, P>),
}

impl<E, P> From<RangeError> for Error<E, P> {
    fn from(err: RangeError) -> Self {
        Error::Range(err)
    }
}

/// Arguments rejected before any bus transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum RangeError {
    /// Code does not fit in 12 bits
    Code(u16),
    /// Voltage is negative, NaN or above the full scale
    Voltage,
    /// Address code is not one of 0..=7
    AddressCode(u8),
    /// 7-bit bus address is not one of 0x60..=0x67
    BusAddress(u8),
    /// Number of channel updates does not fit the command
    UpdateCount(usize),
}

/// Failure during [`Mcp4728::change_address`]
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressChangeError<E, P> {
    /// The address frame was not acknowledged, ~LDAC is back high
    Bus(E),
    /// The address frame was not acknowledged and ~LDAC could not be
    /// returned high
    BusUnreleased(E, P),
    /// ~LDAC could not be driven at the given step
    Pin(AddressChangeStep, P),
}

/// Steps of the address reprogramming sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AddressChangeStep {
    /// Driving ~LDAC low before the frame
    AssertLdac,
    /// Toggling ~LDAC through the latch pattern
    LatchPattern,
    /// Returning ~LDAC to its idle high level
    ReleaseLdac,
}

/// Dac Channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Channel {
    /// DAC Channel A
    A = 0,
    /// DAC Channel B
    B = 1,
    /// DAC Channel C
    C = 2,
    /// DAC Channel D
    D = 3,
}

impl Channel {
    /// All channels in register order
    pub const ALL: [Channel; 4] = [Channel::A, Channel::B, Channel::C, Channel::D];

    #[cfg(feature = "readback")]
    pub(crate) const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0 => Channel::A,
            1 => Channel::B,
            2 => Channel::C,
            _ => Channel::D,
        }
    }
}

/// 12-bit DAC code
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct OutputValue(u16);

impl OutputValue {
    /// Largest valid code
    pub const MAX: u16 = 0x0FFF;
    /// Number of steps over the full scale
    pub const STEPS: f32 = 4096.0;

    /// Checked constructor, codes above 4095 are rejected
    pub const fn new(code: u16) -> Result<Self, RangeError> {
        if code > Self::MAX {
            Err(RangeError::Code(code))
        } else {
            Ok(Self(code))
        }
    }

    /// Saturates codes above 4095 to full scale
    pub const fn saturating(code: u16) -> Self {
        if code > Self::MAX {
            Self(Self::MAX)
        } else {
            Self(code)
        }
    }

    /// Convert a voltage to the nearest code for the given full scale.
    ///
    /// Voltages that round to a code above 4095, negative voltages and NaN
    /// are rejected.
    pub fn from_volts(volts: f32, full_scale: f32) -> Result<Self, RangeError> {
        if !(volts >= 0.0) || !(full_scale > 0.0) {
            return Err(RangeError::Voltage);
        }
        let code = volts / full_scale * Self::STEPS + 0.5;
        if code >= (Self::MAX as f32) + 1.0 {
            return Err(RangeError::Voltage);
        }
        Ok(Self(code as u16))
    }

    /// Like [`OutputValue::from_volts`] but clamps into 0..=4095
    pub fn from_volts_clamped(volts: f32, full_scale: f32) -> Self {
        if !(volts > 0.0) || !(full_scale > 0.0) {
            return Self(0);
        }
        let code = volts / full_scale * Self::STEPS + 0.5;
        if code >= Self::MAX as f32 {
            Self(Self::MAX)
        } else {
            Self(code as u16)
        }
    }

    /// Nominal output voltage of this code for the given full scale
    pub fn to_volts(self, full_scale: f32) -> f32 {
        self.0 as f32 * full_scale / Self::STEPS
    }

    /// Raw 12-bit code
    pub const fn code(self) -> u16 {
        self.0
    }
}

impl TryFrom<u16> for OutputValue {
    type Error = RangeError;

    fn try_from(code: u16) -> Result<Self, Self::Error> {
        Self::new(code)
    }
}

impl From<OutputValue> for u16 {
    fn from(value: OutputValue) -> Self {
        value.0
    }
}

/// I2C address of the device, the fixed `0b1100` base plus a 3-bit code
/// stored in EEPROM.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct DeviceAddress(u8);

impl DeviceAddress {
    /// Fixed upper four bits of the 7-bit address
    pub const BASE: u8 = 0b1100_000;
    /// Factory default, 0x60
    pub const DEFAULT: Self = Self(0);
    /// All eight hardware supported addresses
    pub const ALL: [Self; 8] = [
        Self(0),
        Self(1),
        Self(2),
        Self(3),
        Self(4),
        Self(5),
        Self(6),
        Self(7),
    ];

    /// From the user selectable 3-bit code (A2 A1 A0)
    pub const fn from_code(code: u8) -> Result<Self, RangeError> {
        if code > 0b111 {
            Err(RangeError::AddressCode(code))
        } else {
            Ok(Self(code))
        }
    }

    /// From a full 7-bit bus address
    pub const fn from_bus_address(address: u8) -> Result<Self, RangeError> {
        if address & !0b111 != Self::BASE {
            Err(RangeError::BusAddress(address))
        } else {
            Ok(Self(address & 0b111))
        }
    }

    /// 3-bit code (A2 A1 A0)
    pub const fn code(self) -> u8 {
        self.0
    }

    /// 7-bit bus address
    pub const fn bus_address(self) -> u8 {
        Self::BASE | self.0
    }
}

impl Default for DeviceAddress {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl TryFrom<u8> for DeviceAddress {
    type Error = RangeError;

    /// Accepts a 7-bit bus address
    fn try_from(address: u8) -> Result<Self, Self::Error> {
        Self::from_bus_address(address)
    }
}

/// Voltage reference selection (VREF bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum VoltageReference {
    /// Full scale is the supply voltage, gain is ignored
    Vdd = 0,
    /// Internal 2.048V band-gap
    Internal = 1,
}

impl VoltageReference {
    /// Internal reference voltage
    pub const INTERNAL_VOLTS: f32 = 2.048;

    #[cfg(feature = "readback")]
    pub(crate) const fn from_bit(bit: bool) -> Self {
        if bit {
            Self::Internal
        } else {
            Self::Vdd
        }
    }
}

/// Output amplifier gain (Gx bit), only used with the internal reference
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum Gain {
    /// Gain of 1
    X1 = 0,
    /// Gain of 2
    X2 = 1,
}

impl Gain {
    #[cfg(feature = "readback")]
    pub(crate) const fn from_bit(bit: bool) -> Self {
        if bit {
            Self::X2
        } else {
            Self::X1
        }
    }
}

/// Power down selection (PD1 PD0 bits)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum PowerDown {
    /// Output enabled
    #[default]
    Normal = 0b00,
    /// Output off, 1k to ground
    Pulldown1k = 0b01,
    /// Output off, 100k to ground
    Pulldown100k = 0b10,
    /// Output off, 500k to ground
    Pulldown500k = 0b11,
}

impl PowerDown {
    #[cfg(feature = "readback")]
    pub(crate) const fn from_bits(bits: u8) -> Self {
        match bits & 0b11 {
            0b00 => Self::Normal,
            0b01 => Self::Pulldown1k,
            0b10 => Self::Pulldown100k,
            _ => Self::Pulldown500k,
        }
    }
}

/// When a channel write reaches the output (UDAC bit)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
#[repr(u8)]
pub enum UpdateMode {
    /// Output follows the write as soon as it is acknowledged
    #[default]
    Immediate = 0,
    /// Write is staged in the input register until ~LDAC is pulsed low
    OnLdacPulse = 1,
}

/// Driver configuration.
///
/// The defaults (internal reference, x2 gain) give a 4.096V full scale.
/// The reference and gain are pushed to the device with every channel write.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Config {
    /// Voltage reference for all channels
    pub reference: VoltageReference,
    /// Gain for all channels
    pub gain: Gain,
    /// Supply voltage, the full scale when `reference` is `Vdd`
    pub vdd: f32,
    /// Update mode of [`Mcp4728::set_all_channels`]
    pub update: UpdateMode,
    /// Power down bits sent with every channel write
    pub power_down: PowerDown,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            reference: VoltageReference::Internal,
            gain: Gain::X2,
            vdd: 5.0,
            update: UpdateMode::Immediate,
            power_down: PowerDown::Normal,
        }
    }
}

impl Config {
    /// Set the voltage reference
    pub fn with_reference(mut self, reference: VoltageReference) -> Self {
        self.reference = reference;
        self
    }
    /// Set the gain
    pub fn with_gain(mut self, gain: Gain) -> Self {
        self.gain = gain;
        self
    }
    /// Set the supply voltage
    pub fn with_vdd(mut self, vdd: f32) -> Self {
        self.vdd = vdd;
        self
    }
    /// Set the update mode for multi channel writes
    pub fn with_update_mode(mut self, update: UpdateMode) -> Self {
        self.update = update;
        self
    }
    /// Set the power down bits
    pub fn with_power_down(mut self, power_down: PowerDown) -> Self {
        self.power_down = power_down;
        self
    }

    /// Output voltage that code 4096 would correspond to
    pub fn full_scale_volts(&self) -> f32 {
        match (self.reference, self.gain) {
            (VoltageReference::Vdd, _) => self.vdd,
            (VoltageReference::Internal, Gain::X1) => VoltageReference::INTERNAL_VOLTS,
            (VoltageReference::Internal, Gain::X2) => 2.0 * VoltageReference::INTERNAL_VOLTS,
        }
    }
}

/// Command byte of the multi, sequential and single write commands
#[bitfield(u8)]
struct WriteCommand {
    /// Set to stage the value until ~LDAC is pulsed
    udac: bool,
    #[bits(2)]
    channel: u8,
    #[bits(5)]
    opcode: u8,
}

/// Upper data byte of the multi, sequential and single write commands
#[bitfield(u8)]
struct DataHigh {
    #[bits(4)]
    msb: u8,
    gain: bool,
    #[bits(2)]
    power_down: u8,
    vref: bool,
}

/// Upper data byte of the fast write command
#[bitfield(u8)]
struct FastDataHigh {
    #[bits(4)]
    msb: u8,
    #[bits(2)]
    power_down: u8,
    #[bits(2)]
    _command: u8,
}

/// Per channel select byte of the vref and gain commands
#[bitfield(u8)]
struct SelectAll {
    d: bool,
    c: bool,
    b: bool,
    a: bool,
    #[bits(1)]
    _unused: bool,
    #[bits(3)]
    opcode: u8,
}

/// Bytes 2 to 4 of the address reprogramming frame
#[bitfield(u8)]
struct AddressByte {
    #[bits(2)]
    step: u8,
    #[bits(3)]
    address: u8,
    #[bits(3)]
    opcode: u8,
}
