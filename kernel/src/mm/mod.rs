//! Memory management
//!
//! Two tiers, matching the machine: [`phys`] hands out 4 KiB physical
//! frames from a bitmap split into a kernel zone and a user zone, and
//! [`paging`] builds per-process page directories on top of them with
//! the kernel occupying the top gigabyte of every address space.
//! [`physmap`] is the kernel's window onto frame contents and
//! [`user`] validates and copies through a caller's mappings.

pub mod paging;
pub mod phys;
pub mod physmap;
pub mod user;

pub use paging::AddressSpace;
pub use phys::{FrameAllocator, Zone, FRAME_ALLOCATOR};
pub use physmap::PhysMap;

use bitflags::bitflags;

/// Size of a page / physical frame (4 KiB)
pub const FRAME_SIZE: u32 = 4096;

/// Bottom of the kernel half of every virtual address space
pub const KERNEL_BASE: u32 = 0xC000_0000;

/// Fixed logical address where shared-memory objects attach
pub const SHM_BEGIN: u32 = 0x8000_0000;

/// Per-process kernel-mode stack page (the TSS `esp0` slot points at
/// its last byte)
pub const KERNEL_STACK_PAGE: u32 = 0xBFBF_F000;
pub const KERNEL_STACK_TOP: u32 = 0xBFBF_FFFF;

/// Frame 256 is the bitmap home, 257 the kernel page directory, 258 the
/// kernel page table for the higher half; everything below is the
/// BIOS/boot/kernel image.
pub const BITMAP_FRAME: u32 = 256;
pub const KERNEL_PD_FRAME: u32 = 257;
pub const KERNEL_PT_FRAME: u32 = 258;

/// Page-directory slot that maps the higher half (0xC0000000 >> 22)
pub const KERNEL_PDE_SLOT: u32 = 768;

/// Entries per page directory / page table
pub const TABLE_ENTRIES: u32 = 1024;

/// A virtual (logical) address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct VirtAddr(pub u32);

impl VirtAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    /// Index into the page directory (top 10 bits)
    pub const fn pd_index(&self) -> u32 {
        self.0 >> 22
    }

    /// Index into the page table (next 10 bits)
    pub const fn pt_index(&self) -> u32 {
        (self.0 >> 12) & 0x3FF
    }

    pub const fn page_offset(&self) -> u32 {
        self.0 & 0xFFF
    }

    pub const fn is_page_aligned(&self) -> bool {
        self.0 & 0xFFF == 0
    }

    pub const fn offset(&self, bytes: u32) -> Self {
        Self(self.0 + bytes)
    }

    pub const fn is_user(&self) -> bool {
        self.0 < KERNEL_BASE
    }
}

impl core::fmt::Display for VirtAddr {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{:#010x}", self.0)
    }
}

/// A physical address
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct PhysAddr(pub u32);

impl PhysAddr {
    pub const fn new(addr: u32) -> Self {
        Self(addr)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub const fn frame(&self) -> FrameNumber {
        FrameNumber(self.0 / FRAME_SIZE)
    }

    pub const fn offset(&self, bytes: u32) -> Self {
        Self(self.0 + bytes)
    }
}

/// A physical frame number
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct FrameNumber(pub u32);

impl FrameNumber {
    pub const fn new(num: u32) -> Self {
        Self(num)
    }

    pub const fn as_u32(&self) -> u32 {
        self.0
    }

    pub const fn base(&self) -> PhysAddr {
        PhysAddr(self.0 * FRAME_SIZE)
    }
}

bitflags! {
    /// Page directory / page table entry flag bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct PageFlags: u32 {
        const PRESENT       = 1 << 0;
        const WRITABLE      = 1 << 1;
        const USER          = 1 << 2;
        const WRITE_THROUGH = 1 << 3;
        const NO_CACHE      = 1 << 4;
        const ACCESSED      = 1 << 5;
        const DIRTY         = 1 << 6;
        const GLOBAL        = 1 << 8;
    }
}

/// Mask selecting the frame base address inside a PDE/PTE
pub const ENTRY_ADDR_MASK: u32 = 0xFFFF_F000;

/// Number of 4 KiB frames needed to hold `count` bytes
pub const fn bytes_to_frames(count: u32) -> u32 {
    count.div_ceil(FRAME_SIZE)
}
