//! ~LDAC hold times
//!
//! The address reprogramming handshake only works when the ~LDAC edges land
//! inside the windows the address latch expects, so every hold time the
//! driver uses is named here.
use embedded_hal::digital::PinState;

/// Minimum ~LDAC low pulse width that commits staged input registers
pub const LDAC_PULSE_NS: u32 = 1_000;

/// Time ~LDAC is held low before the address frame is written
pub const LDAC_ASSERT_HOLD_NS: u32 = 10_000;

/// High phase of one latch toggle
pub const LATCH_HIGH_NS: u32 = 100_000;

/// Low phase of one latch toggle
pub const LATCH_LOW_NS: u32 = 100_000;

/// ~LDAC levels and hold times driven after the address frame
pub const LATCH_PATTERN: [(PinState, u32); 4] = [
    (PinState::High, LATCH_HIGH_NS),
    (PinState::Low, LATCH_LOW_NS),
    (PinState::High, LATCH_HIGH_NS),
    (PinState::Low, LATCH_LOW_NS),
];

/// Worst case EEPROM write time, after address changes and EEPROM writes
pub const EEPROM_WRITE_MS: u32 = 50;

/// Sum of every ~LDAC hold in the address change sequence, excluding the
/// EEPROM wait
pub const fn address_change_hold_ns() -> u32 {
    let mut total = LDAC_ASSERT_HOLD_NS;
    let mut i = 0;
    while i < LATCH_PATTERN.len() {
        total += LATCH_PATTERN[i].1;
        i += 1;
    }
    total
}
