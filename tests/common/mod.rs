//! Simulated MCP4728 with a shared event timeline for the bus, ~LDAC and
//! the delay source.
#![allow(dead_code)]

use std::cell::RefCell;
use std::rc::Rc;

use embedded_hal::delay::DelayNs;
use embedded_hal::digital::{self, OutputPin, PinState};
use embedded_hal::i2c::{self, ErrorKind, NoAcknowledgeSource, Operation};
use mcp4728::{DeviceAddress, Mcp4728};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    Pin(PinState),
    Delay(u32),
    Write(u8, Vec<u8>),
    Read(u8),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SimRegister {
    /// VREF PD1 PD0 Gx in the upper nibble, as sent on the bus
    pub high: u8,
    pub code: u16,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SimChannel {
    pub input: SimRegister,
    pub eeprom: SimRegister,
    pub output: u16,
}

#[derive(Debug)]
pub struct SimDevice {
    pub code: u8,
    pub channels: [SimChannel; 4],
    pub ldac_low: bool,
    pending_address: Option<u8>,
    latch_edges: usize,
    writes: usize,
    /// Indices of device writes that get NACKed
    pub nack_writes: Vec<usize>,
    /// Pin transitions (counted from 0) that fail
    pub pin_faults: Vec<usize>,
    pin_sets: usize,
    pub events: Vec<Event>,
}

impl SimDevice {
    fn new(code: u8) -> Self {
        Self {
            code,
            channels: [SimChannel::default(); 4],
            ldac_low: false,
            pending_address: None,
            latch_edges: 0,
            writes: 0,
            nack_writes: Vec::new(),
            pin_faults: Vec::new(),
            pin_sets: 0,
            events: Vec::new(),
        }
    }

    fn bus_address(&self) -> u8 {
        DeviceAddress::BASE | self.code
    }

    fn commit(&mut self, ch: usize) {
        self.channels[ch].output = self.channels[ch].input.code;
    }

    fn commit_all(&mut self) {
        for ch in 0..4 {
            self.commit(ch);
        }
    }

    fn store(&mut self, ch: usize, high: u8, lsb: u8, eeprom: bool, udac: bool) {
        let reg = SimRegister {
            high: high & 0xF0,
            code: u16::from_be_bytes([high & 0x0F, lsb]),
        };
        self.channels[ch].input = reg;
        if eeprom {
            self.channels[ch].eeprom = reg;
        }
        if !udac || self.ldac_low {
            self.commit(ch);
        }
    }

    fn write(&mut self, bytes: &[u8]) {
        let Some(&first) = bytes.first() else {
            return;
        };
        match first >> 3 {
            0b01000 => {
                for chunk in bytes.chunks(3) {
                    if let [cmd, high, lsb] = *chunk {
                        self.store(((cmd >> 1) & 0b11) as usize, high, lsb, false, cmd & 1 == 1);
                    }
                }
                return;
            }
            0b01010 => {
                let start = ((first >> 1) & 0b11) as usize;
                for (i, pair) in bytes[1..].chunks(2).enumerate() {
                    if let [high, lsb] = *pair {
                        self.store(start + i, high, lsb, true, first & 1 == 1);
                    }
                }
                return;
            }
            0b01011 => {
                if let [cmd, high, lsb] = *bytes {
                    self.store(((cmd >> 1) & 0b11) as usize, high, lsb, true, cmd & 1 == 1);
                }
                return;
            }
            _ => {}
        }
        match first >> 5 {
            0b000 | 0b001 => {
                for (ch, pair) in bytes.chunks(2).enumerate().take(4) {
                    if let [high, lsb] = *pair {
                        // 0 0 PD1 PD0 D11..D8, VREF and Gx are kept
                        let keep = self.channels[ch].input.high & 0b1001_0000;
                        let pd = (high >> 4) & 0b11;
                        self.store(ch, keep | pd << 5 | (high & 0x0F), lsb, false, true);
                    }
                }
            }
            0b100 => self.select(first, 7),
            0b110 => self.select(first, 4),
            0b101 => {
                if let [b1, b2] = *bytes {
                    let modes = [(b1 >> 2) & 0b11, b1 & 0b11, b2 >> 6, (b2 >> 4) & 0b11];
                    for (ch, pd) in modes.into_iter().enumerate() {
                        let high = &mut self.channels[ch].input.high;
                        *high = (*high & !0x60) | pd << 5;
                    }
                }
            }
            0b011 => {
                if let [cur, new, confirm] = *bytes {
                    let current_ok = cur & 0b11 == 0b01 && (cur >> 2) & 0b111 == self.code;
                    let new_code = (new >> 2) & 0b111;
                    let new_ok = new & 0b11 == 0b10 && confirm == (new | 0b01);
                    if current_ok && new_ok && self.ldac_low {
                        self.pending_address = Some(new_code);
                        self.latch_edges = 0;
                    }
                }
            }
            _ => {}
        }
    }

    fn select(&mut self, byte: u8, bit: u8) {
        for ch in 0..4 {
            let set = byte & (0b1000 >> ch) != 0;
            let high = &mut self.channels[ch].input.high;
            if set {
                *high |= 1 << bit;
            } else {
                *high &= !(1 << bit);
            }
        }
    }

    fn general_call(&mut self, bytes: &[u8]) {
        match bytes {
            [0x06] => {
                for ch in self.channels.iter_mut() {
                    ch.input = ch.eeprom;
                }
                self.commit_all();
            }
            [0x09] => {
                for ch in self.channels.iter_mut() {
                    ch.input.high &= !0x60;
                }
            }
            [0x08] => self.commit_all(),
            _ => {}
        }
    }

    fn readback(&self, buf: &mut [u8]) {
        let mut bytes = Vec::with_capacity(24);
        for (ch, state) in self.channels.iter().enumerate() {
            for reg in [state.input, state.eeprom] {
                let [msb, lsb] = reg.code.to_be_bytes();
                bytes.push(0b1100_0000 | (ch as u8) << 4 | self.code);
                bytes.push(reg.high | msb);
                bytes.push(lsb);
            }
        }
        for (dst, src) in buf.iter_mut().zip(bytes) {
            *dst = src;
        }
    }

    fn set_ldac(&mut self, state: PinState) -> Result<(), PinFault> {
        let index = self.pin_sets;
        self.pin_sets += 1;
        if self.pin_faults.contains(&index) {
            return Err(PinFault);
        }
        self.events.push(Event::Pin(state));
        let low = state == PinState::Low;
        let falling = low && !self.ldac_low;
        self.ldac_low = low;
        if let Some(new_code) = self.pending_address {
            if falling {
                self.latch_edges += 1;
            } else if !low && self.latch_edges >= 2 {
                self.code = new_code;
                self.pending_address = None;
            }
        } else if falling {
            self.commit_all();
        }
        Ok(())
    }
}

/// One simulated device plus handles that all record into its timeline
#[derive(Clone)]
pub struct Bench(Rc<RefCell<SimDevice>>);

impl Bench {
    pub fn new() -> Self {
        Self::at(0)
    }

    pub fn at(code: u8) -> Self {
        Self(Rc::new(RefCell::new(SimDevice::new(code))))
    }

    pub fn bus(&self) -> SimBus {
        SimBus(self.0.clone())
    }

    pub fn ldac(&self) -> SimLdac {
        SimLdac(self.0.clone())
    }

    pub fn delay(&self) -> SimDelay {
        SimDelay(self.0.clone())
    }

    pub fn driver(&self) -> Mcp4728<SimBus, SimLdac, SimDelay> {
        let address = DeviceAddress::from_code(self.device().code).unwrap();
        Mcp4728::new(self.bus(), self.ldac(), self.delay(), address)
    }

    pub fn device(&self) -> std::cell::RefMut<'_, SimDevice> {
        self.0.borrow_mut()
    }

    pub fn events(&self) -> Vec<Event> {
        self.0.borrow().events.clone()
    }

    pub fn clear_events(&self) {
        self.0.borrow_mut().events.clear();
    }

    pub fn output(&self, ch: usize) -> u16 {
        self.0.borrow().channels[ch].output
    }
}

pub struct SimBus(Rc<RefCell<SimDevice>>);

impl i2c::ErrorType for SimBus {
    type Error = ErrorKind;
}

impl i2c::I2c for SimBus {
    fn transaction(
        &mut self,
        address: u8,
        operations: &mut [Operation<'_>],
    ) -> Result<(), Self::Error> {
        let mut dev = self.0.borrow_mut();
        let general_call = address == 0x00;
        if !general_call && address != dev.bus_address() {
            return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Address));
        }
        for op in operations {
            match op {
                Operation::Write(bytes) => {
                    dev.events.push(Event::Write(address, bytes.to_vec()));
                    if general_call {
                        dev.general_call(bytes);
                        continue;
                    }
                    let index = dev.writes;
                    dev.writes += 1;
                    if dev.nack_writes.contains(&index) {
                        return Err(ErrorKind::NoAcknowledge(NoAcknowledgeSource::Data));
                    }
                    dev.write(bytes);
                }
                Operation::Read(buf) => {
                    dev.events.push(Event::Read(address));
                    dev.readback(buf);
                }
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PinFault;

impl digital::Error for PinFault {
    fn kind(&self) -> digital::ErrorKind {
        digital::ErrorKind::Other
    }
}

pub struct SimLdac(Rc<RefCell<SimDevice>>);

impl digital::ErrorType for SimLdac {
    type Error = PinFault;
}

impl OutputPin for SimLdac {
    fn set_low(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_ldac(PinState::Low)
    }

    fn set_high(&mut self) -> Result<(), Self::Error> {
        self.0.borrow_mut().set_ldac(PinState::High)
    }
}

pub struct SimDelay(Rc<RefCell<SimDevice>>);

impl DelayNs for SimDelay {
    fn delay_ns(&mut self, ns: u32) {
        self.0.borrow_mut().events.push(Event::Delay(ns));
    }

    fn delay_us(&mut self, us: u32) {
        self.delay_ns(us * 1_000);
    }

    fn delay_ms(&mut self, ms: u32) {
        self.delay_ns(ms * 1_000_000);
    }
}
