//! Register frames, the exact bytes written after the address byte
use crate::{
    AddressByte, Channel, Config, DataHigh, DeviceAddress, FastDataHigh, Gain, OutputValue,
    PowerDown, RangeError, SelectAll, UpdateMode, VoltageReference, WriteCommand,
};

/// General call address, all devices on the bus respond
pub(crate) const GENERAL_CALL: u8 = 0x00;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Opcode {
    MultiWrite = 0b01000,
    SequentialWrite = 0b01010,
    SingleWrite = 0b01011,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum Select {
    VoltageReference = 0b100,
    PowerDown = 0b101,
    Gain = 0b110,
}

/// Address frame bytes carry this in their upper three bits
const ADDRESS_OPCODE: u8 = 0b011;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
enum AddressStep {
    Current = 0b01,
    New = 0b10,
    Confirm = 0b11,
}

/// General call commands, sent to [`GENERAL_CALL`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub(crate) enum GeneralCall {
    Reset = 0b0000_0110,
    SoftwareUpdate = 0b0000_1000,
    WakeUp = 0b0000_1001,
}

/// Longest frame is a multi write of all four channels
const MAX_FRAME: usize = 12;

/// Bytes of one bus write, built and sent immediately
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct RegisterFrame {
    buf: [u8; MAX_FRAME],
    len: usize,
}

impl RegisterFrame {
    fn empty() -> Self {
        Self {
            buf: [0; MAX_FRAME],
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        self.buf[self.len] = byte;
        self.len += 1;
    }

    fn push_data(&mut self, value: OutputValue, cfg: &Config) {
        let [msb, lsb] = value.code().to_be_bytes();
        self.push(
            DataHigh::new()
                .with_msb(msb)
                .with_gain(cfg.gain == Gain::X2)
                .with_power_down(cfg.power_down as u8)
                .with_vref(cfg.reference == VoltageReference::Internal)
                .into(),
        );
        self.push(lsb);
    }

    /// Bytes to put on the bus
    pub fn as_bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }

    /// Number of bytes
    pub fn len(&self) -> usize {
        self.len
    }

    /// True when the frame has no bytes
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Multi write of a single channel: `0 1 0 0 0 DAC1 DAC0 ~UDAC`, then the
    /// two data bytes. Only the input register is written, EEPROM is left
    /// alone.
    pub fn single_channel(
        channel: Channel,
        value: OutputValue,
        update: UpdateMode,
        cfg: &Config,
    ) -> Self {
        let mut frame = Self::empty();
        frame.push(command_byte(Opcode::MultiWrite, channel, update));
        frame.push_data(value, cfg);
        frame
    }

    /// Multi write of one to four channels in one transaction
    pub fn multi_write(
        updates: &[(Channel, OutputValue)],
        update: UpdateMode,
        cfg: &Config,
    ) -> Result<Self, RangeError> {
        if updates.is_empty() || updates.len() > 4 {
            return Err(RangeError::UpdateCount(updates.len()));
        }
        let mut frame = Self::empty();
        for &(channel, value) in updates {
            frame.push(command_byte(Opcode::MultiWrite, channel, update));
            frame.push_data(value, cfg);
        }
        Ok(frame)
    }

    /// Sequential write from `start` through channel D, also programs EEPROM
    pub fn sequential_write(
        start: Channel,
        values: &[OutputValue],
        update: UpdateMode,
        cfg: &Config,
    ) -> Result<Self, RangeError> {
        if values.len() != 4 - start as usize {
            return Err(RangeError::UpdateCount(values.len()));
        }
        let mut frame = Self::empty();
        frame.push(command_byte(Opcode::SequentialWrite, start, update));
        for &value in values {
            frame.push_data(value, cfg);
        }
        Ok(frame)
    }

    /// Single write of one channel, also programs EEPROM
    pub fn single_write(
        channel: Channel,
        value: OutputValue,
        update: UpdateMode,
        cfg: &Config,
    ) -> Self {
        let mut frame = Self::empty();
        frame.push(command_byte(Opcode::SingleWrite, channel, update));
        frame.push_data(value, cfg);
        frame
    }

    /// Fast write of all four input registers, two bytes per channel
    pub fn fast_write(values: &[OutputValue; 4], power_down: PowerDown) -> Self {
        let mut frame = Self::empty();
        for value in values {
            let [msb, lsb] = value.code().to_be_bytes();
            frame.push(
                FastDataHigh::new()
                    .with_msb(msb)
                    .with_power_down(power_down as u8)
                    .into(),
            );
            frame.push(lsb);
        }
        frame
    }

    /// Voltage reference of all channels, one byte
    pub fn voltage_reference(reference: [VoltageReference; 4]) -> Self {
        let bits = reference.map(|r| r == VoltageReference::Internal);
        Self::select(Select::VoltageReference, bits)
    }

    /// Gain of all channels, one byte
    pub fn gain(gain: [Gain; 4]) -> Self {
        let bits = gain.map(|g| g == Gain::X2);
        Self::select(Select::Gain, bits)
    }

    fn select(select: Select, [a, b, c, d]: [bool; 4]) -> Self {
        let mut frame = Self::empty();
        frame.push(
            SelectAll::new()
                .with_opcode(select as u8)
                .with_a(a)
                .with_b(b)
                .with_c(c)
                .with_d(d)
                .into(),
        );
        frame
    }

    /// Power down bits of all channels, two bytes
    pub fn power_down(modes: [PowerDown; 4]) -> Self {
        let [a, b, c, d] = modes.map(|m| m as u8);
        let mut frame = Self::empty();
        frame.push((Select::PowerDown as u8) << 5 | a << 2 | b);
        frame.push(c << 6 | d << 4);
        frame
    }

    /// Address reprogramming frame: the current address bits, then the new
    /// address bits twice with the step bits telling the new and confirm
    /// bytes apart.
    pub fn address_change(current: DeviceAddress, new: DeviceAddress) -> Self {
        let mut frame = Self::empty();
        frame.push(address_byte(AddressStep::Current, current));
        frame.push(address_byte(AddressStep::New, new));
        frame.push(address_byte(AddressStep::Confirm, new));
        frame
    }

    pub(crate) fn general_call(cmd: GeneralCall) -> Self {
        let mut frame = Self::empty();
        frame.push(cmd as u8);
        frame
    }
}

fn command_byte(opcode: Opcode, channel: Channel, update: UpdateMode) -> u8 {
    WriteCommand::new()
        .with_opcode(opcode as u8)
        .with_channel(channel as u8)
        .with_udac(update == UpdateMode::OnLdacPulse)
        .into()
}

fn address_byte(step: AddressStep, address: DeviceAddress) -> u8 {
    AddressByte::new()
        .with_opcode(ADDRESS_OPCODE)
        .with_address(address.code())
        .with_step(step as u8)
        .into()
}
