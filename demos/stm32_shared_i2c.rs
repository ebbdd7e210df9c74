#![no_main]
#![no_std]

// Setting up entry vector/panic handler and logging
use cortex_m_rt::entry;
use defmt_rtt as _;
use panic_probe as _;
// Imports for the shared bus
use core::cell::RefCell;
use embedded_hal_bus::i2c::RefCellDevice;
// Hal imports
use hal::prelude::*;
use stm32f4xx_hal as hal;

use mcp4728::{
    AllChannelsError, Channel, Config, DeviceAddress, Mcp4728, OnFailure, UpdateMode,
};

#[entry]
fn main() -> ! {
    // Take peripherals and set up the clocks.
    let p = hal::pac::Peripherals::take().unwrap();
    let rcc = p.RCC.constrain();
    let clocks = rcc.cfgr.freeze();
    // Timer based delay, the driver uses it for the ~LDAC hold times
    let delay = p.TIM5.delay_us(&clocks);
    // I2C1 on PB8/PB9, other sensors may hang off the same bus
    let gpiob = p.GPIOB.split();
    let i2c1 = p.I2C1.i2c((gpiob.pb8, gpiob.pb9), 400.kHz(), &clocks);
    // ~LDAC must idle high, otherwise every write updates the outputs
    let gpioa = p.GPIOA.split();
    let ldac = gpioa
        .pa8
        .into_push_pull_output_in_state(hal::gpio::PinState::High);
    // I2C bus sharing using embedded-hal-bus
    let i2c_bus = RefCell::new(i2c1);

    // Stage all four channels and move them together with one ~LDAC pulse
    let cfg = Config::default().with_update_mode(UpdateMode::OnLdacPulse);
    let mut dac = Mcp4728::with_config(
        RefCellDevice::new(&i2c_bus),
        ldac,
        delay,
        DeviceAddress::DEFAULT,
        cfg,
    );
    dac.init().unwrap();

    // Move a factory fresh device off 0x60 if nothing answers at 0x61
    let target = DeviceAddress::from_code(1).unwrap();
    if !dac.probe(target).unwrap() {
        dac.change_address(0, target.code()).unwrap();
        defmt::info!("dac moved to {=u8:#x}", dac.address().bus_address());
    }

    let report = dac
        .set_all_channels_voltage([0.5, 1.0, 2.0, 4.0], OnFailure::Abort)
        .unwrap();
    match report.into_result() {
        Ok(()) => {}
        Err(AllChannelsError::Channel(channel, _)) => {
            defmt::warn!("channel {} was not written", channel)
        }
        Err(AllChannelsError::Commit(_)) => defmt::warn!("ldac pulse failed"),
    }

    let mut code: u16 = 0x000;
    loop {
        // Output a stepped voltage on channel A
        cortex_m::asm::delay(4_000_000);
        dac.set_channel(Channel::A, code).unwrap();
        code = (code + 0x100) & 0x0FFF;
    }
}
