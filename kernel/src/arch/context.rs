//! CPU context and trap-frame layouts
//!
//! The calling convention between the trap entry stubs and the
//! scheduler is captured in these two types instead of ad-hoc stack
//! offsets: [`TrapFrame`] is what an interrupt leaves on the kernel
//! stack (general registers pushed by the stub, then the CPU-pushed
//! tail), and [`CpuContext`] is the resumable register file stored in
//! a PCB. [`save_context`] maps one onto the other for either ring.

/// Privilege ring the CPU was in when the trap fired
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ring {
    Kernel,
    User,
}

/// Saved register file of a process, sufficient to resume it with an
/// interrupt-return. Field order mirrors the restore sequence in the
/// dispatcher; keep it stable.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CpuContext {
    pub ss: u32,
    pub cs: u32,
    pub esp: u32,
    pub ebp: u32,
    pub eip: u32,
    pub eflags: u32,
    pub eax: u32,
    pub ebx: u32,
    pub ecx: u32,
    pub edx: u32,
    pub esi: u32,
    pub edi: u32,
}

impl CpuContext {
    /// An all-zero register file (static initializers)
    pub const fn zeroed() -> Self {
        Self {
            ss: 0,
            cs: 0,
            esp: 0,
            ebp: 0,
            eip: 0,
            eflags: 0,
            eax: 0,
            ebx: 0,
            ecx: 0,
            edx: 0,
            esi: 0,
            edi: 0,
        }
    }
}

/// What a trap leaves on the kernel stack: the stub's `pushal` image
/// (EDI lowest), then EIP/CS/EFLAGS pushed by the CPU, then the
/// ESP/SS pair the CPU pushes only when the trap crossed from ring 3.
///
/// `esp_at_push` is PUSHA's copy of ESP as it was before the
/// instruction, i.e. the kernel stack pointer right after the CPU
/// finished pushing its tail.
#[repr(C)]
#[derive(Debug, Clone, Copy, Default)]
pub struct TrapFrame {
    pub edi: u32,
    pub esi: u32,
    pub ebp: u32,
    pub esp_at_push: u32,
    pub ebx: u32,
    pub edx: u32,
    pub ecx: u32,
    pub eax: u32,
    pub eip: u32,
    pub cs: u32,
    pub eflags: u32,
    pub user_esp: u32,
    pub user_ss: u32,
}

/// Words the CPU pushes on a same-ring interrupt (EIP, CS, EFLAGS)
const RING0_CPU_PUSHED_BYTES: u32 = 12;

/// Save an interrupted flow of control into a PCB context.
///
/// For a ring-3 trap the CPU pushed the user SS:ESP and they are taken
/// from the frame. For a ring-0 trap they were not pushed; the
/// interrupted stack pointer is recovered from PUSHA's ESP copy plus
/// the three CPU-pushed words, so resuming lands on the same stack.
pub fn save_context(ctx: &mut CpuContext, frame: &TrapFrame, from: Ring) {
    ctx.edi = frame.edi;
    ctx.esi = frame.esi;
    ctx.ebp = frame.ebp;
    ctx.ebx = frame.ebx;
    ctx.edx = frame.edx;
    ctx.ecx = frame.ecx;
    ctx.eax = frame.eax;
    ctx.eip = frame.eip;
    ctx.cs = frame.cs;
    ctx.eflags = frame.eflags;

    match from {
        Ring::User => {
            ctx.esp = frame.user_esp;
            ctx.ss = frame.user_ss;
        }
        Ring::Kernel => {
            ctx.esp = frame.esp_at_push + RING0_CPU_PUSHED_BYTES;
            ctx.ss = super::KERNEL_DATA_SELECTOR;
        }
    }
}

/// Which ring a trap came from, read off the saved code segment's
/// requested privilege level.
pub fn ring_of(frame: &TrapFrame) -> Ring {
    if frame.cs & 0x3 == 0 {
        Ring::Kernel
    } else {
        Ring::User
    }
}
