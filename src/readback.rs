//! Decoding of the 24 byte register readback
use bitfield_struct::bitfield;

use crate::{Channel, Config, DataHigh, Gain, OutputValue, PowerDown, VoltageReference};

/// Bytes returned by a full read, input register and EEPROM for each channel
pub(crate) const READBACK_LEN: usize = 24;

#[bitfield(u8)]
struct Status {
    #[bits(3)]
    address: u8,
    #[bits(1)]
    _zero: bool,
    #[bits(2)]
    channel: u8,
    power_on_reset: bool,
    ready: bool,
}

/// One 3-byte register record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterRecord {
    /// RDY/~BSY, cleared while an EEPROM write is in progress
    pub ready: bool,
    /// POR bit, set once the device is powered up
    pub power_on_reset: bool,
    /// Channel the record belongs to
    pub channel: Channel,
    /// Address bits A2 A1 A0 currently in use
    pub address_code: u8,
    /// Voltage reference bit
    pub reference: VoltageReference,
    /// Power down bits
    pub power_down: PowerDown,
    /// Gain bit
    pub gain: Gain,
    /// 12-bit code
    pub value: OutputValue,
}

impl RegisterRecord {
    fn parse(bytes: &[u8]) -> Self {
        let status = Status::from(bytes[0]);
        let high = DataHigh::from(bytes[1]);
        let code = u16::from_be_bytes([high.msb(), bytes[2]]);
        Self {
            ready: status.ready(),
            power_on_reset: status.power_on_reset(),
            channel: Channel::from_bits(status.channel()),
            address_code: status.address(),
            reference: VoltageReference::from_bit(high.vref()),
            power_down: PowerDown::from_bits(high.power_down()),
            gain: Gain::from_bit(high.gain()),
            value: OutputValue::saturating(code),
        }
    }

    /// Nominal output voltage, `vdd` is used with the Vdd reference
    pub fn volts(&self, vdd: f32) -> f32 {
        let full_scale = Config::default()
            .with_reference(self.reference)
            .with_gain(self.gain)
            .with_vdd(vdd)
            .full_scale_volts();
        self.value.to_volts(full_scale)
    }
}

/// Input register and EEPROM contents of a channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct ChannelState {
    /// DAC input register
    pub input: RegisterRecord,
    /// Non volatile copy loaded at power up
    pub eeprom: RegisterRecord,
}

/// Full readback of the device
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct Registers {
    /// Channels A to D
    pub channels: [ChannelState; 4],
}

impl Registers {
    pub(crate) fn parse(bytes: &[u8; READBACK_LEN]) -> Self {
        let channel = |i: usize| ChannelState {
            input: RegisterRecord::parse(&bytes[6 * i..6 * i + 3]),
            eeprom: RegisterRecord::parse(&bytes[6 * i + 3..6 * i + 6]),
        };
        Self {
            channels: [channel(0), channel(1), channel(2), channel(3)],
        }
    }

    /// State of one channel
    pub fn channel(&self, channel: Channel) -> &ChannelState {
        &self.channels[channel as usize]
    }
}
