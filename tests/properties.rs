//! Property tests for value and address validation.
mod common;

use common::{Bench, Event};
use mcp4728::{Channel, DeviceAddress, Error, OutputValue, RangeError};

fn channel(index: u8) -> Channel {
    Channel::ALL[index as usize % 4]
}

proptest::proptest! {
    /// Any 12-bit code written to any channel reads back unchanged.
    #[test]
    fn valid_codes_read_back(code in 0u16..=4095, ch in 0u8..4) {
        let bench = Bench::new();
        let mut dac = bench.driver();
        dac.set_channel(channel(ch), code).unwrap();
        assert_eq!(dac.read_channel(channel(ch)).unwrap().code(), code);
    }

    /// Codes above 4095 are rejected and nothing reaches the bus.
    #[test]
    fn out_of_range_codes_send_nothing(code in 4096u16..=u16::MAX, ch in 0u8..4) {
        let bench = Bench::new();
        let mut dac = bench.driver();
        let result = dac.set_channel(channel(ch), code);
        assert!(matches!(result, Err(Error::Range(RangeError::Code(c))) if c == code));
        assert!(bench.events().is_empty());
    }

    /// Address codes outside 0..=7 never touch ~LDAC or the bus.
    #[test]
    fn invalid_address_codes_touch_nothing(bad in 8u8..=u8::MAX, old in 0u8..8) {
        let bench = Bench::new();
        let mut dac = bench.driver();
        let result = dac.change_address(old, bad);
        assert!(matches!(result, Err(Error::Range(RangeError::AddressCode(c))) if c == bad));
        assert!(!bench.events().iter().any(|e| matches!(e, Event::Pin(_))));
        assert!(bench.events().is_empty());
    }

    /// Converting a code to volts and back lands on the same code.
    #[test]
    fn volts_conversion_is_stable(code in 0u16..=4095) {
        let value = OutputValue::new(code).unwrap();
        let volts = value.to_volts(4.096);
        assert_eq!(OutputValue::from_volts(volts, 4.096).unwrap(), value);
    }

    /// The clamped conversion never produces an invalid code.
    #[test]
    fn clamped_conversion_stays_in_range(volts in -10.0f32..10.0) {
        let value = OutputValue::from_volts_clamped(volts, 4.096);
        assert!(value.code() <= OutputValue::MAX);
    }

    /// Bus addresses round trip through the 3-bit code.
    #[test]
    fn bus_addresses(address in 0u8..0x80) {
        match DeviceAddress::from_bus_address(address) {
            Ok(dev) => {
                assert!((0x60..=0x67).contains(&address));
                assert_eq!(dev.bus_address(), address);
                assert_eq!(DeviceAddress::from_code(dev.code()), Ok(dev));
            }
            Err(err) => {
                assert!(!(0x60..=0x67).contains(&address));
                assert_eq!(err, RangeError::BusAddress(address));
            }
        }
    }
}
