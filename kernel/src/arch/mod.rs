//! Architecture layer
//!
//! [`context`] holds the typed register file and trap-frame layouts
//! and is portable (the scheduler and trap gateway are tested against
//! it on the host). Everything that touches the real machine (port
//! I/O, ring transitions, the IDT/PIC/PIT/TSS glue) lives in [`x86`]
//! and only exists on the boot target.

pub mod context;

#[cfg(all(target_arch = "x86", target_os = "none"))]
pub mod x86;

/// Segment selectors installed by the boot shim's GDT
pub const KERNEL_CODE_SELECTOR: u32 = 0x08;
pub const KERNEL_DATA_SELECTOR: u32 = 0x10;
pub const USER_CODE_SELECTOR: u32 = 0x1B;
pub const USER_DATA_SELECTOR: u32 = 0x23;

/// EFLAGS for a freshly created user context: IF set, reserved bit 1 set
pub const INITIAL_EFLAGS: u32 = 0x0202;

/// Run `f` with interrupts disabled, restoring the previous state
/// afterwards. On the host this is just `f()`; the single-threaded
/// test harness needs no masking.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    // SAFETY: flag save/restore pairs around the closure; no other
    // code observes the intermediate state on a single core.
    unsafe {
        let enabled = x86::interrupts_enabled();
        x86::disable_interrupts();
        let r = f();
        if enabled {
            x86::enable_interrupts();
        }
        r
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn without_interrupts<R>(f: impl FnOnce() -> R) -> R {
    f()
}

/// Stop the machine for good.
#[cfg(all(target_arch = "x86", target_os = "none"))]
pub fn halt() -> ! {
    // SAFETY: terminal state; nothing runs after cli+hlt.
    unsafe {
        x86::disable_interrupts();
        loop {
            x86::hlt();
        }
    }
}

#[cfg(not(all(target_arch = "x86", target_os = "none")))]
pub fn halt() -> ! {
    panic!("halt outside the boot target");
}
