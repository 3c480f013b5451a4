//! Ring transitions
//!
//! Both switches finish a trap: they rebuild the `iret` frame from a
//! saved [`CpuContext`], restore the general registers, re-enable
//! interrupts and `iret` into the target. Neither returns.
//!
//! Field offsets into the context are fixed by its `#[repr(C)]`
//! layout: ss=0 cs=4 esp=8 ebp=12 eip=16 eflags=20 eax=24 ebx=28
//! ecx=32 edx=36 esi=40 edi=44.

use core::arch::asm;

use crate::arch::context::CpuContext;
use crate::mm::{FrameNumber, KERNEL_STACK_TOP};

/// Resume the console (same ring): restore registers, push the
/// three-word `iret` frame, and return from the interrupt.
///
/// # Safety
///
/// `ctx` must have been captured at a trap boundary of kernel code:
/// its selectors, stack and instruction pointers must describe a
/// resumable ring-0 flow.
pub unsafe fn switch_to_kernel_process(ctx: &CpuContext) -> ! {
    // SAFETY: contract delegated to the caller. ECX is the last
    // register touched before iret, as the restore order requires.
    unsafe {
        asm!(
            "mov esp, [eax + 8]",
            "push dword ptr [eax + 20]",
            "push dword ptr [eax + 4]",
            "push dword ptr [eax + 16]",
            "mov edi, [eax + 44]",
            "mov esi, [eax + 40]",
            "mov edx, [eax + 36]",
            "mov ecx, [eax + 32]",
            "mov ebx, [eax + 28]",
            "mov ebp, [eax + 12]",
            "mov eax, [eax + 24]",
            "sti",
            "iretd",
            in("eax") ctx as *const CpuContext,
            options(noreturn)
        )
    }
}

/// Enter a user process (ring change): load its paging root, point
/// the TSS ring-0 stack slot at the per-process kernel stack, restore
/// registers, push the five-word `iret` frame (SS, ESP, EFLAGS, CS,
/// EIP), switch the data selectors to user and return from the
/// interrupt.
///
/// # Safety
///
/// `ctx` must describe a resumable ring-3 flow of the process whose
/// page directory lives in `pd`, and that directory must share the
/// kernel's higher-half slots.
pub unsafe fn switch_to_user_process(ctx: &CpuContext, pd: FrameNumber) -> ! {
    super::tss::set_kernel_stack(KERNEL_STACK_TOP);

    // SAFETY: the page directory maps the kernel half (shared slots),
    // so execution continues across the CR3 load.
    unsafe {
        super::load_cr3(pd.base().as_u32());
    }

    // SAFETY: the context describes a resumable ring-3 flow; the
    // saved EAX is staged on the kernel stack because loading the
    // user data selectors clobbers AX.
    unsafe {
        asm!(
            "push dword ptr [eax + 0]",
            "push dword ptr [eax + 8]",
            "push dword ptr [eax + 20]",
            "push dword ptr [eax + 4]",
            "push dword ptr [eax + 16]",
            "mov edi, [eax + 44]",
            "mov esi, [eax + 40]",
            "mov edx, [eax + 36]",
            "mov ecx, [eax + 32]",
            "mov ebx, [eax + 28]",
            "mov ebp, [eax + 12]",
            "push dword ptr [eax + 24]",
            "mov ax, 0x23",
            "mov ds, ax",
            "mov es, ax",
            "mov fs, ax",
            "mov gs, ax",
            "pop eax",
            "iretd",
            in("eax") ctx as *const CpuContext,
            options(noreturn)
        )
    }
}
