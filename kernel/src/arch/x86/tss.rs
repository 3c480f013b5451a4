//! Task state segment
//!
//! Only the `esp0`/`ss0` pair matters: it tells the CPU which stack
//! to switch onto when a trap crosses from ring 3. Every process maps
//! its kernel-mode stack page at the same virtual address, so the
//! slot is written once and stays put. The boot shim's GDT carries
//! the TSS descriptor in entry 5 (selector 0x28, RPL 3 = 0x2B).

use crate::arch::KERNEL_DATA_SELECTOR;
use crate::mm::KERNEL_STACK_TOP;

#[repr(C, packed)]
struct TaskStateSegment {
    prev_tss: u32,
    esp0: u32,
    ss0: u32,
    esp1: u32,
    ss1: u32,
    esp2: u32,
    ss2: u32,
    cr3: u32,
    eip: u32,
    eflags: u32,
    eax: u32,
    ecx: u32,
    edx: u32,
    ebx: u32,
    esp: u32,
    ebp: u32,
    esi: u32,
    edi: u32,
    es: u32,
    cs: u32,
    ss: u32,
    ds: u32,
    fs: u32,
    gs: u32,
    ldt: u32,
    trap: u16,
    iomap_base: u16,
}

const TSS_ZERO: TaskStateSegment = TaskStateSegment {
    prev_tss: 0,
    esp0: 0,
    ss0: 0,
    esp1: 0,
    ss1: 0,
    esp2: 0,
    ss2: 0,
    cr3: 0,
    eip: 0,
    eflags: 0,
    eax: 0,
    ecx: 0,
    edx: 0,
    ebx: 0,
    esp: 0,
    ebp: 0,
    esi: 0,
    edi: 0,
    es: 0,
    cs: 0,
    ss: 0,
    ds: 0,
    fs: 0,
    gs: 0,
    ldt: 0,
    trap: 0,
    iomap_base: 0,
};

static TSS: spin::Mutex<TaskStateSegment> = spin::Mutex::new(TSS_ZERO);

/// TSS selector with RPL 3 so ring-3 code can be switched away from
const TSS_SELECTOR: u16 = 0x2B;

/// One GDT code/data descriptor as the boot shim lays it out
#[repr(C, packed)]
struct GdtDescriptor {
    limit_0_15: u16,
    base_0_15: u16,
    base_16_23: u8,
    access_byte: u8,
    limit_and_flag: u8,
    base_24_31: u8,
}

extern "C" {
    /// The boot shim's GDT: null, kernel code/data, user code/data,
    /// TSS.
    #[allow(non_upper_case_globals)]
    static mut gdt: [GdtDescriptor; 6];
}

/// Point GDT entry 5 at the TSS, fill the ring-0 stack slot, and load
/// the task register.
pub fn init() {
    {
        let mut tss = TSS.lock();
        tss.esp0 = KERNEL_STACK_TOP;
        tss.ss0 = KERNEL_DATA_SELECTOR;
        let base = &*tss as *const TaskStateSegment as usize as u32;
        let limit = (core::mem::size_of::<TaskStateSegment>() - 1) as u32;

        // SAFETY: entry 5 is reserved for the TSS by the boot shim's
        // GDT layout; nothing else writes it after boot.
        unsafe {
            gdt[5].base_0_15 = (base & 0xFFFF) as u16;
            gdt[5].base_16_23 = ((base >> 16) & 0xFF) as u8;
            gdt[5].base_24_31 = ((base >> 24) & 0xFF) as u8;
            gdt[5].access_byte = 0xE9; // ring-3 accessible 32-bit TSS
            gdt[5].limit_0_15 = (limit & 0xFFFF) as u16;
            gdt[5].limit_and_flag = ((limit >> 16) & 0x0F) as u8;
        }
    }

    // SAFETY: the descriptor was just installed.
    unsafe {
        core::arch::asm!("ltr {0:x}", in(reg) TSS_SELECTOR, options(nostack));
    }
}

/// Update the ring-0 stack slot (fixed per-process virtual address,
/// so this is the same value for every process).
pub fn set_kernel_stack(esp0: u32) {
    TSS.lock().esp0 = esp0;
}
