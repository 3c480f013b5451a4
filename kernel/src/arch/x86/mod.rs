//! x86-32 protected-mode machine layer
//!
//! Everything that only makes sense on the boot target: the VGA text
//! writer, the IDT and its trap entry stubs, PIC/PIT programming, the
//! TSS kernel-stack slot, the ring-transition dispatcher, and the
//! device singletons the trap gateway reaches for.

pub mod boot;
pub mod idt;
pub mod pic;
pub mod pit;
pub mod ps2;
pub mod switch;
pub mod tss;
pub mod vga;

use core::arch::asm;

use lazy_static::lazy_static;
use spin::Mutex;

use crate::drivers::disk::AtaPio;
use crate::drivers::port::X86Ports;
use ps2::Ps2Keyboard;
use vga::VgaDisplay;

static VGA: Mutex<VgaDisplay> = Mutex::new(VgaDisplay::new());

lazy_static! {
    /// The PIO disk; IDENTIFY DEVICE runs on first access (boot
    /// touches it once so the probe happens before the console).
    static ref DISK: Mutex<AtaPio<X86Ports>> = Mutex::new(AtaPio::init(X86Ports));
    /// The polled PS/2 keyboard and its scancode decoder
    static ref KEYBOARD: Mutex<Ps2Keyboard> = Mutex::new(Ps2Keyboard::new());
}

/// The text display singleton
pub fn vga() -> &'static Mutex<VgaDisplay> {
    &VGA
}

/// The disk singleton
pub fn disk() -> &'static Mutex<AtaPio<X86Ports>> {
    &DISK
}

/// The keyboard singleton
pub fn keyboard() -> &'static Mutex<Ps2Keyboard> {
    &KEYBOARD
}

/// # Safety
/// Caller must be prepared for interrupt handlers to run.
pub unsafe fn enable_interrupts() {
    // SAFETY: sti only changes the interrupt flag.
    unsafe { asm!("sti", options(nomem, nostack)) };
}

/// # Safety
/// Masking interrupts changes global machine state; pair with a
/// restore.
pub unsafe fn disable_interrupts() {
    // SAFETY: cli only changes the interrupt flag.
    unsafe { asm!("cli", options(nomem, nostack)) };
}

/// Is the interrupt flag set?
pub fn interrupts_enabled() -> bool {
    let eflags: u32;
    // SAFETY: pushfd/pop reads EFLAGS without side effects.
    unsafe { asm!("pushfd", "pop {}", out(reg) eflags) };
    eflags & 0x200 != 0
}

/// # Safety
/// Halts the CPU until the next interrupt.
pub unsafe fn hlt() {
    // SAFETY: hlt idles the CPU; execution resumes on interrupt.
    unsafe { asm!("hlt", options(nomem, nostack)) };
}

/// Faulting address of the last page fault
pub fn read_cr2() -> u32 {
    let addr: u32;
    // SAFETY: CR2 is read-only here.
    unsafe { asm!("mov {}, cr2", out(reg) addr, options(nomem, nostack)) };
    addr
}

/// Load a new paging root.
///
/// # Safety
/// `pd_phys` must be the physical address of a valid page directory
/// that maps the currently executing code.
pub unsafe fn load_cr3(pd_phys: u32) {
    // SAFETY: contract delegated to the caller.
    unsafe { asm!("mov cr3, {}", in(reg) pd_phys, options(nostack)) };
}
