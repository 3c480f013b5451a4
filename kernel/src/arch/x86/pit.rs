//! Programmable interval timer
//!
//! Counter 0 in rate-generator mode. The PIT runs at 1193182 Hz; a
//! divider of 11931 gives one pulse every 10 ms, the scheduling epoch.

const PIT_COMMAND: u16 = 0x43;
const PIT_CHANNEL0: u16 = 0x40;

/// PIT input clock in Hz
pub const PIT_FREQUENCY: u32 = 1_193_182;

/// Program the 10 ms tick.
pub fn init() {
    let divider: u16 = 11931;
    // SAFETY: standard channel-0 mode-2 programming.
    unsafe {
        x86::io::outb(PIT_COMMAND, 0x34);
        x86::io::outb(PIT_CHANNEL0, (divider & 0xFF) as u8);
        x86::io::outb(PIT_CHANNEL0, (divider >> 8) as u8);
    }
}
