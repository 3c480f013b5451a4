//! 8259 PIC programming
//!
//! Remaps IRQ 0..15 onto vectors 32..47 so they stay clear of the CPU
//! exceptions, then masks everything except the timer; the keyboard is
//! polled, not interrupt driven.

const PIC1_COMMAND: u16 = 0x20;
const PIC1_DATA: u16 = 0x21;
const PIC2_COMMAND: u16 = 0xA0;
const PIC2_DATA: u16 = 0xA1;

const EOI: u8 = 0x20;

/// Initialization sequence: edge triggered, cascaded, 8086 mode,
/// vectors 32/40, all lines masked but IRQ0.
pub fn init() {
    // SAFETY: fixed ICW1..ICW4 sequence on the standard PIC ports.
    unsafe {
        x86::io::outb(PIC1_COMMAND, 0x11);
        x86::io::outb(PIC2_COMMAND, 0x11);
        x86::io::outb(PIC1_DATA, 32); // master vector base
        x86::io::outb(PIC2_DATA, 40); // slave vector base
        x86::io::outb(PIC1_DATA, 0x04); // slave on IRQ2
        x86::io::outb(PIC2_DATA, 0x02);
        x86::io::outb(PIC1_DATA, 0x01);
        x86::io::outb(PIC2_DATA, 0x01);

        x86::io::outb(PIC1_DATA, 0xFE); // only IRQ0 unmasked
        x86::io::outb(PIC2_DATA, 0xFF);
    }
}

/// Acknowledge a serviced interrupt so the PIC delivers the next one.
pub fn end_of_interrupt(irq: u8) {
    // SAFETY: EOI writes to the command ports.
    unsafe {
        if irq >= 8 {
            x86::io::outb(PIC2_COMMAND, EOI);
        }
        x86::io::outb(PIC1_COMMAND, EOI);
    }
}
