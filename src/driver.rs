use embedded_hal::delay::DelayNs;
use embedded_hal::digital::OutputPin;
use embedded_hal::i2c::{Error as I2cError, ErrorKind, I2c};

use crate::command::{GeneralCall, GENERAL_CALL};
#[cfg(feature = "readback")]
use crate::readback::{Registers, READBACK_LEN};
use crate::{
    timing, AddressChangeError, AddressChangeStep, Channel, Config, DeviceAddress, Error, Gain,
    Mcp4728, OutputValue, PowerDown, RangeError, RegisterFrame, UpdateMode, VoltageReference,
};

/// What [`Mcp4728::set_all_channels`] does once a channel write fails
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum OnFailure {
    /// Stop, the remaining channels are skipped and ~LDAC is not pulsed
    Abort,
    /// Keep writing the remaining channels
    Continue,
}

/// Result of one channel write in [`Mcp4728::set_all_channels`]
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum ChannelOutcome<E> {
    /// Acknowledged by the device
    Written,
    /// The write failed with this bus error
    Failed(E),
    /// Not attempted after an earlier failure
    Skipped,
}

impl<E> ChannelOutcome<E> {
    /// True for [`ChannelOutcome::Written`]
    pub fn is_written(&self) -> bool {
        matches!(self, ChannelOutcome::Written)
    }
}

/// First failure of a [`Mcp4728::set_all_channels`] run
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub enum AllChannelsError<E, P> {
    /// Bus error of a channel write
    Channel(Channel, E),
    /// ~LDAC failed while committing the staged values
    Commit(P),
}

/// Per channel report of [`Mcp4728::set_all_channels`]
#[derive(Debug)]
#[cfg_attr(feature = "defmt", derive(defmt::Format))]
pub struct AllChannelsReport<E, P> {
    outcomes: [ChannelOutcome<E>; 4],
    committed: bool,
    commit_fault: Option<P>,
}

impl<E, P> AllChannelsReport<E, P> {
    /// Outcome of a single channel
    pub fn outcome(&self, channel: Channel) -> &ChannelOutcome<E> {
        &self.outcomes[channel as usize]
    }

    /// Outcomes of channels A to D
    pub fn outcomes(&self) -> &[ChannelOutcome<E>; 4] {
        &self.outcomes
    }

    /// Every channel was written
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(ChannelOutcome::is_written)
    }

    /// Whether ~LDAC was pulsed to move the staged values to the outputs.
    /// Always false in [`UpdateMode::Immediate`].
    pub fn committed(&self) -> bool {
        self.committed
    }

    /// Pin error of the ~LDAC pulse, when it was attempted and failed
    pub fn commit_fault(&self) -> Option<&P> {
        self.commit_fault.as_ref()
    }

    /// Channels whose write failed
    pub fn failures(&self) -> impl Iterator<Item = (Channel, &E)> {
        Channel::ALL
            .into_iter()
            .zip(self.outcomes.iter())
            .filter_map(|(channel, outcome)| match outcome {
                ChannelOutcome::Failed(err) => Some((channel, err)),
                _ => None,
            })
    }

    /// First failure, if any. Channel writes come before the commit.
    pub fn into_result(self) -> Result<(), AllChannelsError<E, P>> {
        for (channel, outcome) in Channel::ALL.into_iter().zip(self.outcomes) {
            if let ChannelOutcome::Failed(err) = outcome {
                return Err(AllChannelsError::Channel(channel, err));
            }
        }
        match self.commit_fault {
            Some(err) => Err(AllChannelsError::Commit(err)),
            None => Ok(()),
        }
    }
}

fn pin_step<E, P>(step: AddressChangeStep) -> impl FnOnce(P) -> Error<E, P> {
    move |err| Error::AddressChange(AddressChangeError::Pin(step, err))
}

impl<I2C, LDAC, D> Mcp4728<I2C, LDAC, D> {
    /// Create a driver with the default configuration (internal reference,
    /// x2 gain). ~LDAC should already idle high.
    pub fn new(i2c: I2C, ldac: LDAC, delay: D, address: DeviceAddress) -> Self {
        Self::with_config(i2c, ldac, delay, address, Config::default())
    }

    /// Create a driver with an explicit configuration, nothing is sent
    pub fn with_config(i2c: I2C, ldac: LDAC, delay: D, address: DeviceAddress, cfg: Config) -> Self {
        Self {
            i2c,
            ldac,
            delay,
            address,
            cfg,
        }
    }

    /// Destroy the driver and return the bus, pin and delay
    pub fn release(self) -> (I2C, LDAC, D) {
        (self.i2c, self.ldac, self.delay)
    }

    /// Address the driver talks to
    pub fn address(&self) -> DeviceAddress {
        self.address
    }

    /// Current configuration
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Full scale of the current configuration in volts
    pub fn full_scale_volts(&self) -> f32 {
        self.cfg.full_scale_volts()
    }

    /// Convert a voltage with the current full scale
    pub fn volts_to_code(&self, volts: f32) -> Result<OutputValue, RangeError> {
        OutputValue::from_volts(volts, self.full_scale_volts())
    }

    /// Nominal output of a code with the current full scale
    pub fn code_to_volts(&self, value: OutputValue) -> f32 {
        value.to_volts(self.full_scale_volts())
    }
}

impl<I2C, LDAC, D, E, P> Mcp4728<I2C, LDAC, D>
where
    I2C: I2c<Error = E>,
    E: I2cError,
    LDAC: OutputPin<Error = P>,
    D: DelayNs,
{
    /// Drive ~LDAC to its idle high level and push the configured reference
    /// and gain to all channels.
    pub fn init(&mut self) -> Result<(), Error<E, P>> {
        self.ldac.set_high().map_err(Error::<E, P>::Pin)?;
        let cfg = self.cfg;
        self.set_config(cfg)
    }

    /// Store a new configuration and send its reference and gain to all
    /// channels
    pub fn set_config(&mut self, cfg: Config) -> Result<(), Error<E, P>> {
        self.set_voltage_reference(cfg.reference)?;
        self.set_gain(cfg.gain)?;
        self.cfg = cfg;
        Ok(())
    }

    /// Write a 12-bit code to one channel and update its output as soon as
    /// the write is acknowledged. Only the input register changes, EEPROM
    /// is left alone.
    ///
    /// Codes above 4095 are rejected without touching the bus.
    /// ```ignore
    /// dac.set_channel(Channel::A, 2048)?; // 2.048V at 4.096V full scale
    /// ```
    pub fn set_channel(&mut self, channel: Channel, code: u16) -> Result<(), Error<E, P>> {
        let value = OutputValue::new(code)?;
        self.write_value(channel, value)
    }

    /// Write a voltage to one channel, see [`Mcp4728::set_channel`]
    pub fn set_channel_voltage(&mut self, channel: Channel, volts: f32) -> Result<(), Error<E, P>> {
        let value = self.volts_to_code(volts)?;
        self.write_value(channel, value)
    }

    fn write_value(&mut self, channel: Channel, value: OutputValue) -> Result<(), Error<E, P>> {
        let frame = RegisterFrame::single_channel(channel, value, UpdateMode::Immediate, &self.cfg);
        self.write_frame(&frame)
    }

    /// Write all four channels one after the other.
    ///
    /// Every code is checked before the first write. With
    /// [`UpdateMode::OnLdacPulse`] the values are staged and ~LDAC is pulsed
    /// once at the end so all outputs move together; a pulse is not sent
    /// when `policy` is [`OnFailure::Abort`] and a write failed, which
    /// leaves every output at its previous value.
    ///
    /// Bus failures do not turn into `Err`, they are reported per channel,
    /// and so is a failed ~LDAC pulse. `Err` is only a range error.
    pub fn set_all_channels(
        &mut self,
        codes: [u16; 4],
        policy: OnFailure,
    ) -> Result<AllChannelsReport<E, P>, Error<E, P>> {
        let mut values = [OutputValue::default(); 4];
        for (value, code) in values.iter_mut().zip(codes) {
            *value = OutputValue::new(code)?;
        }
        self.write_all(values, policy)
    }

    /// Voltage variant of [`Mcp4728::set_all_channels`]
    pub fn set_all_channels_voltage(
        &mut self,
        volts: [f32; 4],
        policy: OnFailure,
    ) -> Result<AllChannelsReport<E, P>, Error<E, P>> {
        let mut values = [OutputValue::default(); 4];
        for (value, v) in values.iter_mut().zip(volts) {
            *value = self.volts_to_code(v)?;
        }
        self.write_all(values, policy)
    }

    fn write_all(
        &mut self,
        values: [OutputValue; 4],
        policy: OnFailure,
    ) -> Result<AllChannelsReport<E, P>, Error<E, P>> {
        let update = self.cfg.update;
        let mut outcomes: [ChannelOutcome<E>; 4] =
            core::array::from_fn(|_| ChannelOutcome::Skipped);
        let mut written = 0;
        let mut failed = false;
        for (channel, value) in Channel::ALL.into_iter().zip(values) {
            let frame = RegisterFrame::single_channel(channel, value, update, &self.cfg);
            match self.i2c.write(self.address.bus_address(), frame.as_bytes()) {
                Ok(()) => {
                    outcomes[channel as usize] = ChannelOutcome::Written;
                    written += 1;
                }
                Err(err) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("mcp4728: channel {} write failed", channel);
                    outcomes[channel as usize] = ChannelOutcome::Failed(err);
                    failed = true;
                    if policy == OnFailure::Abort {
                        break;
                    }
                }
            }
        }

        let mut committed = false;
        let mut commit_fault = None;
        let aborted = failed && policy == OnFailure::Abort;
        if update == UpdateMode::OnLdacPulse && written > 0 && !aborted {
            match self.ldac_pulse() {
                Ok(()) => committed = true,
                Err(err) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("mcp4728: ldac pulse failed, staged values not committed");
                    commit_fault = Some(err);
                }
            }
        }
        Ok(AllChannelsReport {
            outcomes,
            committed,
            commit_fault,
        })
    }

    /// Fast write of all four input registers in one frame, EEPROM is not
    /// affected
    pub fn fast_write(&mut self, codes: [u16; 4]) -> Result<(), Error<E, P>> {
        let mut values = [OutputValue::default(); 4];
        for (value, code) in values.iter_mut().zip(codes) {
            *value = OutputValue::new(code)?;
        }
        let frame = RegisterFrame::fast_write(&values, self.cfg.power_down);
        self.write_frame(&frame)
    }

    /// Write one to four channels in a single transaction, using the
    /// configured update mode. EEPROM is not affected.
    pub fn multi_write(&mut self, updates: &[(Channel, u16)]) -> Result<(), Error<E, P>> {
        if updates.is_empty() || updates.len() > 4 {
            return Err(RangeError::UpdateCount(updates.len()).into());
        }
        let mut checked = [(Channel::A, OutputValue::default()); 4];
        for (slot, &(channel, code)) in checked.iter_mut().zip(updates) {
            *slot = (channel, OutputValue::new(code)?);
        }
        let frame =
            RegisterFrame::multi_write(&checked[..updates.len()], self.cfg.update, &self.cfg)?;
        self.write_frame(&frame)
    }

    /// Write `start` through channel D to the input registers and EEPROM.
    ///
    /// `codes` must hold exactly one value per channel from `start` on.
    /// Blocks for the EEPROM write time afterwards.
    pub fn sequential_write_eeprom(
        &mut self,
        start: Channel,
        codes: &[u16],
    ) -> Result<(), Error<E, P>> {
        if codes.len() != 4 - start as usize {
            return Err(RangeError::UpdateCount(codes.len()).into());
        }
        let mut values = [OutputValue::default(); 4];
        for (value, &code) in values.iter_mut().zip(codes) {
            *value = OutputValue::new(code)?;
        }
        let frame = RegisterFrame::sequential_write(
            start,
            &values[..codes.len()],
            UpdateMode::Immediate,
            &self.cfg,
        )?;
        self.write_frame(&frame)?;
        self.delay.delay_ms(timing::EEPROM_WRITE_MS);
        Ok(())
    }

    /// Write one channel to its input register and EEPROM, then wait for
    /// the EEPROM write
    pub fn single_write_eeprom(&mut self, channel: Channel, code: u16) -> Result<(), Error<E, P>> {
        let value = OutputValue::new(code)?;
        let frame = RegisterFrame::single_write(channel, value, UpdateMode::Immediate, &self.cfg);
        self.write_frame(&frame)?;
        self.delay.delay_ms(timing::EEPROM_WRITE_MS);
        Ok(())
    }

    /// Select the voltage reference of all channels
    pub fn set_voltage_reference(&mut self, reference: VoltageReference) -> Result<(), Error<E, P>> {
        self.write_frame(&RegisterFrame::voltage_reference([reference; 4]))?;
        self.cfg.reference = reference;
        Ok(())
    }

    /// Select the gain of all channels
    pub fn set_gain(&mut self, gain: Gain) -> Result<(), Error<E, P>> {
        self.write_frame(&RegisterFrame::gain([gain; 4]))?;
        self.cfg.gain = gain;
        Ok(())
    }

    /// Set the power down bits of channels A to D
    pub fn set_power_down(&mut self, modes: [PowerDown; 4]) -> Result<(), Error<E, P>> {
        self.write_frame(&RegisterFrame::power_down(modes))
    }

    /// General call reset, every device on the bus reloads its EEPROM
    pub fn general_call_reset(&mut self) -> Result<(), Error<E, P>> {
        self.general_call(GeneralCall::Reset)
    }

    /// General call wake up, every device on the bus clears its power down
    /// bits
    pub fn general_call_wake_up(&mut self) -> Result<(), Error<E, P>> {
        self.general_call(GeneralCall::WakeUp)
    }

    /// General call software update, every device on the bus moves its
    /// input registers to the outputs
    pub fn general_call_software_update(&mut self) -> Result<(), Error<E, P>> {
        self.general_call(GeneralCall::SoftwareUpdate)
    }

    fn general_call(&mut self, cmd: GeneralCall) -> Result<(), Error<E, P>> {
        let frame = RegisterFrame::general_call(cmd);
        self.i2c
            .write(GENERAL_CALL, frame.as_bytes())
            .map_err(Error::Bus)
    }

    /// Pulse ~LDAC low to move every staged input register to its output
    pub fn pulse_ldac(&mut self) -> Result<(), Error<E, P>> {
        self.ldac_pulse().map_err(Error::Pin)
    }

    fn ldac_pulse(&mut self) -> Result<(), P> {
        #[cfg(feature = "defmt")]
        defmt::trace!("mcp4728: ldac pulse");
        self.ldac.set_low()?;
        self.delay.delay_ns(timing::LDAC_PULSE_NS);
        self.ldac.set_high()
    }

    /// Whether a device acknowledges at `address`. A NACK is `Ok(false)`,
    /// any other bus error is returned.
    pub fn probe(&mut self, address: DeviceAddress) -> Result<bool, Error<E, P>> {
        let mut status = [0u8; 1];
        match self.i2c.read(address.bus_address(), &mut status) {
            Ok(()) => Ok(true),
            Err(err) if matches!(err.kind(), ErrorKind::NoAcknowledge(_)) => Ok(false),
            Err(err) => Err(Error::Bus(err)),
        }
    }

    /// Reprogram the device address stored in EEPROM.
    ///
    /// Both arguments are 3-bit address codes (A2 A1 A0). The sequence is:
    /// ~LDAC low, the address frame to the old address, the
    /// [`timing::LATCH_PATTERN`] toggles, ~LDAC back high, then the EEPROM
    /// write time. Invalid codes are rejected before ~LDAC is touched.
    ///
    /// A failure part way can leave the device at an unknown address that
    /// only a power cycle recovers. Do not retry blindly; probe both
    /// addresses first. When `old_code` is the driver's address the driver
    /// follows the device to the new one.
    pub fn change_address(&mut self, old_code: u8, new_code: u8) -> Result<(), Error<E, P>> {
        let old = DeviceAddress::from_code(old_code)?;
        let new = DeviceAddress::from_code(new_code)?;
        let frame = RegisterFrame::address_change(old, new);

        #[cfg(feature = "defmt")]
        defmt::debug!(
            "mcp4728: address {=u8:#x} -> {=u8:#x}",
            old.bus_address(),
            new.bus_address()
        );

        self.ldac
            .set_low()
            .map_err(pin_step::<E, P>(AddressChangeStep::AssertLdac))?;
        self.delay.delay_ns(timing::LDAC_ASSERT_HOLD_NS);

        if let Err(err) = self.i2c.write(old.bus_address(), frame.as_bytes()) {
            // Back to idle so later writes are not committed early
            let failure = match self.ldac.set_high() {
                Ok(()) => AddressChangeError::Bus(err),
                Err(pin) => {
                    #[cfg(feature = "defmt")]
                    defmt::warn!("mcp4728: ldac release failed after address frame error");
                    AddressChangeError::BusUnreleased(err, pin)
                }
            };
            return Err(Error::AddressChange(failure));
        }

        for (state, hold) in timing::LATCH_PATTERN {
            self.ldac
                .set_state(state)
                .map_err(pin_step::<E, P>(AddressChangeStep::LatchPattern))?;
            self.delay.delay_ns(hold);
        }

        self.ldac
            .set_high()
            .map_err(pin_step::<E, P>(AddressChangeStep::ReleaseLdac))?;
        self.delay.delay_ms(timing::EEPROM_WRITE_MS);

        if self.address == old {
            self.address = new;
        }
        Ok(())
    }

    /// Read the input registers and EEPROM of all channels
    #[cfg(feature = "readback")]
    pub fn read_registers(&mut self) -> Result<Registers, Error<E, P>> {
        let mut bytes = [0u8; READBACK_LEN];
        self.i2c
            .read(self.address.bus_address(), &mut bytes)
            .map_err(Error::<E, P>::Bus)?;
        Ok(Registers::parse(&bytes))
    }

    /// Code currently in the input register of `channel`
    #[cfg(feature = "readback")]
    pub fn read_channel(&mut self, channel: Channel) -> Result<OutputValue, Error<E, P>> {
        Ok(self.read_registers()?.channel(channel).input.value)
    }

    /// Nominal output voltages from the input registers
    #[cfg(feature = "readback")]
    pub fn read_voltages(&mut self) -> Result<[f32; 4], Error<E, P>> {
        let vdd = self.cfg.vdd;
        let regs = self.read_registers()?;
        Ok(regs.channels.map(|ch| ch.input.volts(vdd)))
    }

    /// Voltages the device will load from EEPROM at power up
    #[cfg(feature = "readback")]
    pub fn read_eeprom_voltages(&mut self) -> Result<[f32; 4], Error<E, P>> {
        let vdd = self.cfg.vdd;
        let regs = self.read_registers()?;
        Ok(regs.channels.map(|ch| ch.eeprom.volts(vdd)))
    }

    fn write_frame(&mut self, frame: &RegisterFrame) -> Result<(), Error<E, P>> {
        #[cfg(feature = "defmt")]
        defmt::trace!(
            "mcp4728 {=u8:#x}: {=[u8]:#x}",
            self.address.bus_address(),
            frame.as_bytes()
        );
        self.i2c
            .write(self.address.bus_address(), frame.as_bytes())
            .map_err(Error::Bus)
    }
}
