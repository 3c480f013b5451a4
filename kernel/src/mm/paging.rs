//! Logical (paged) memory manager
//!
//! Every process owns a page directory whose slot 768 is copied from
//! the kernel's, so the top gigabyte of each address space is the same
//! higher-half view of the first 4 MiB of physical memory. User
//! mappings are built from user-zone frames with intermediate page
//! tables taken from the kernel zone; all table walks go through the
//! [`PhysMap`] window.

use super::{
    bytes_to_frames, FrameNumber, PageFlags, PhysAddr, PhysMap, VirtAddr, ENTRY_ADDR_MASK,
    FRAME_SIZE, KERNEL_BASE, KERNEL_PDE_SLOT, KERNEL_PD_FRAME, KERNEL_PT_FRAME,
    KERNEL_STACK_PAGE, TABLE_ENTRIES,
};
use crate::error::KernelError;
use crate::mm::phys::{FrameAllocator, Zone};

/// Pages given to every process for its user stack (16 KiB ending just
/// below the kernel base)
pub const USER_STACK_PAGES: u32 = 4;

/// First byte of the user stack region
pub const USER_STACK_BASE: u32 = KERNEL_BASE - USER_STACK_PAGES * FRAME_SIZE;

/// Initial user stack pointer, a few bytes below the kernel base
pub const USER_STACK_START: u32 = KERNEL_BASE - 16;

/// Set up the kernel page directory (frame 257) and the single kernel
/// page table (frame 258) that maps the higher half onto physical
/// 0..4 MiB, global and kernel-only. The boot code loads the paging
/// root afterwards.
pub fn init_kernel_pages(phys: &PhysMap) {
    let pd = FrameNumber::new(KERNEL_PD_FRAME);
    let pt = FrameNumber::new(KERNEL_PT_FRAME);

    phys.zero_frame(pd);
    let pde = pt.base().as_u32() | (PageFlags::PRESENT | PageFlags::WRITABLE).bits();
    phys.write_u32(pd.base().offset(KERNEL_PDE_SLOT * 4), pde);

    for i in 0..TABLE_ENTRIES {
        let pte = (i * FRAME_SIZE)
            | (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::GLOBAL).bits();
        phys.write_u32(pt.base().offset(i * 4), pte);
    }
}

/// Grow the higher-half direct map past the first 4 MiB so the kernel
/// can reach every managed frame (program loading, shared-memory
/// backing, user-pointer walks) regardless of which paging root is
/// active. One extra kernel-zone page table per additional 4 MiB.
pub fn extend_kernel_map(
    total_frames: u32,
    frames: &mut FrameAllocator,
    phys: &PhysMap,
) -> Result<(), KernelError> {
    let kernel_pd = FrameNumber::new(KERNEL_PD_FRAME).base();
    let mut mapped = TABLE_ENTRIES; // first 4 MiB, covered at init
    let mut slot = KERNEL_PDE_SLOT + 1;

    while mapped < total_frames {
        let table = frames.alloc_frames(1, Zone::Kernel)?;
        for i in 0..TABLE_ENTRIES {
            let pte = ((mapped + i) * FRAME_SIZE)
                | (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::GLOBAL).bits();
            phys.write_u32(table.base().offset(i * 4), pte);
        }
        let pde = table.base().as_u32() | (PageFlags::PRESENT | PageFlags::WRITABLE).bits();
        phys.write_u32(kernel_pd.offset(slot * 4), pde);
        mapped += TABLE_ENTRIES;
        slot += 1;
    }
    Ok(())
}

/// Allocate `n_pages` zeroed kernel pages and return their higher-half
/// address. Kernel allocations come from the first 4 MiB, which the
/// kernel page table already maps, so no table update is needed.
pub fn alloc_kernel_pages(
    n_pages: u32,
    frames: &mut FrameAllocator,
    phys: &PhysMap,
) -> Result<VirtAddr, KernelError> {
    let base = frames.alloc_frames(n_pages, Zone::Kernel)?;
    phys.zero_frames(base, n_pages);
    Ok(VirtAddr::new(base.base().as_u32() + KERNEL_BASE))
}

/// Release kernel pages previously handed out by [`alloc_kernel_pages`].
pub fn free_kernel_pages(addr: VirtAddr, n_pages: u32, frames: &mut FrameAllocator) {
    let pa = PhysAddr::new(addr.as_u32() - KERNEL_BASE);
    frames.dealloc_frames(pa.frame(), n_pages);
}

/// A process's page directory and the operations on it.
///
/// The handle is just the directory's frame number; the directory and
/// its page tables live in physical frames and are read and written
/// through the window.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AddressSpace {
    pd: FrameNumber,
}

impl AddressSpace {
    /// Build a fresh address space: a zeroed page directory sharing
    /// the kernel's higher-half slots (768 and any direct-map slots
    /// above it), so ring-0 code keeps its view of physical memory
    /// whichever paging root is loaded.
    pub fn new(frames: &mut FrameAllocator, phys: &PhysMap) -> Result<Self, KernelError> {
        let pd = frames.alloc_frames(1, Zone::Kernel)?;
        phys.zero_frame(pd);

        let kernel_pd = FrameNumber::new(KERNEL_PD_FRAME).base();
        for slot in KERNEL_PDE_SLOT..TABLE_ENTRIES {
            let pde = phys.read_u32(kernel_pd.offset(slot * 4));
            if pde != 0 {
                phys.write_u32(pd.base().offset(slot * 4), pde);
            }
        }

        Ok(Self { pd })
    }

    /// Wrap an existing page-directory frame (the kernel's own
    /// directory, or a test fixture).
    pub const fn from_pd_frame(pd: FrameNumber) -> Self {
        Self { pd }
    }

    /// The frame holding the page directory (the paging root loaded
    /// into CR3 on a switch to this process).
    pub fn pd_frame(&self) -> FrameNumber {
        self.pd
    }

    fn pde_addr(&self, index: u32) -> PhysAddr {
        self.pd.base().offset(index * 4)
    }

    fn read_pde(&self, index: u32, phys: &PhysMap) -> u32 {
        phys.read_u32(self.pde_addr(index))
    }

    /// Walk the directory and table for `va`; returns the physical
    /// address and the page's flags if the page is mapped.
    pub fn lookup(&self, va: VirtAddr, phys: &PhysMap) -> Option<(PhysAddr, PageFlags)> {
        let pde = self.read_pde(va.pd_index(), phys);
        if pde & PageFlags::PRESENT.bits() == 0 {
            return None;
        }
        let pt_base = PhysAddr::new(pde & ENTRY_ADDR_MASK);
        let pte = phys.read_u32(pt_base.offset(va.pt_index() * 4));
        if pte & PageFlags::PRESENT.bits() == 0 {
            return None;
        }
        let pa = PhysAddr::new((pte & ENTRY_ADDR_MASK) | va.page_offset());
        Some((pa, PageFlags::from_bits_truncate(pte & !ENTRY_ADDR_MASK)))
    }

    /// Physical address backing `va`, if mapped.
    pub fn translate(&self, va: VirtAddr, phys: &PhysMap) -> Option<PhysAddr> {
        self.lookup(va, phys).map(|(pa, _)| pa)
    }

    /// Map `n_pages` freshly allocated user-zone pages at `base`.
    ///
    /// Intermediate page tables are created from the kernel zone as
    /// needed; a mapping that overwrites an existing one frees the old
    /// frame first; the new pages are zeroed. On failure nothing
    /// stays allocated.
    pub fn map_user_pages(
        &self,
        n_pages: u32,
        base: VirtAddr,
        flags: PageFlags,
        frames: &mut FrameAllocator,
        phys: &PhysMap,
    ) -> Result<VirtAddr, KernelError> {
        if n_pages == 0 {
            return Err(KernelError::BadSize { size: 0 });
        }
        if !base.is_page_aligned() {
            return Err(KernelError::MisalignedAddress { addr: base.as_u32() });
        }
        if !base.is_user() || (KERNEL_BASE - base.as_u32()) / FRAME_SIZE < n_pages {
            return Err(KernelError::RangeOverlapsKernel {
                base: base.as_u32(),
                pages: n_pages,
            });
        }

        let user_frames = frames.alloc_frames(n_pages, Zone::User)?;

        // One page table covers 1024 pages; some of these may go back
        // if the walk lands in directories that already have tables.
        let n_pde = n_pages.div_ceil(TABLE_ENTRIES);
        let pt_frames = match frames.alloc_frames(n_pde, Zone::Kernel) {
            Ok(f) => f,
            Err(e) => {
                frames.dealloc_frames(user_frames, n_pages);
                return Err(e);
            }
        };
        let mut pt_used = 0u32;

        let mut pd_entry = base.pd_index();
        let mut pt_entry = base.pt_index();

        for i in 0..n_pages {
            let mut pde = self.read_pde(pd_entry, phys);
            if pde & PageFlags::PRESENT.bits() == 0 {
                let table = FrameNumber::new(pt_frames.as_u32() + pt_used);
                phys.zero_frame(table);
                pde = table.base().as_u32()
                    | (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER).bits();
                phys.write_u32(self.pde_addr(pd_entry), pde);
                pt_used += 1;
            }

            let pt_base = PhysAddr::new(pde & ENTRY_ADDR_MASK);
            let pte_addr = pt_base.offset(pt_entry * 4);
            let old = phys.read_u32(pte_addr);
            if old & PageFlags::PRESENT.bits() != 0 {
                frames.dealloc_frames(PhysAddr::new(old & ENTRY_ADDR_MASK).frame(), 1);
            }

            let frame = FrameNumber::new(user_frames.as_u32() + i);
            phys.write_u32(pte_addr, frame.base().as_u32() | flags.bits() | PageFlags::PRESENT.bits());

            pt_entry += 1;
            if pt_entry == TABLE_ENTRIES {
                pd_entry += 1;
                pt_entry = 0;
            }
        }

        // Return table frames that turned out not to be needed
        if pt_used != n_pde {
            frames.dealloc_frames(
                FrameNumber::new(pt_frames.as_u32() + pt_used),
                n_pde - pt_used,
            );
        }

        phys.zero_frames(user_frames, n_pages);
        Ok(base)
    }

    /// Map `n_pages` EXISTING frames (a shared-memory object's backing)
    /// at `base`. Creates a page table if needed; page-table slots that
    /// are already mapped are left untouched.
    pub fn map_existing_frames(
        &self,
        n_pages: u32,
        base: VirtAddr,
        first_frame: FrameNumber,
        flags: PageFlags,
        frames: &mut FrameAllocator,
        phys: &PhysMap,
    ) -> Result<(), KernelError> {
        let mut pd_entry = base.pd_index();
        let mut pt_entry = base.pt_index();

        for i in 0..n_pages {
            let mut pde = self.read_pde(pd_entry, phys);
            if pde & PageFlags::PRESENT.bits() == 0 {
                let table = frames.alloc_frames(1, Zone::Kernel)?;
                phys.zero_frame(table);
                pde = table.base().as_u32()
                    | (PageFlags::PRESENT | PageFlags::WRITABLE | PageFlags::USER).bits();
                phys.write_u32(self.pde_addr(pd_entry), pde);
            }

            let pt_base = PhysAddr::new(pde & ENTRY_ADDR_MASK);
            let pte_addr = pt_base.offset(pt_entry * 4);
            if phys.read_u32(pte_addr) & PageFlags::PRESENT.bits() == 0 {
                let frame = FrameNumber::new(first_frame.as_u32() + i);
                phys.write_u32(
                    pte_addr,
                    frame.base().as_u32() | flags.bits() | PageFlags::PRESENT.bits(),
                );
            }

            pt_entry += 1;
            if pt_entry == TABLE_ENTRIES {
                pd_entry += 1;
                pt_entry = 0;
            }
        }
        Ok(())
    }

    /// Clear the page-table entries for `n_pages` at `base` without
    /// freeing the frames they pointed at (shared-memory detach; the
    /// object registry decides when the backing is reclaimed).
    pub fn unmap_keep_frames(&self, base: VirtAddr, n_pages: u32, phys: &PhysMap) {
        let mut pd_entry = base.pd_index();
        let mut pt_entry = base.pt_index();

        for _ in 0..n_pages {
            let pde = self.read_pde(pd_entry, phys);
            if pde & PageFlags::PRESENT.bits() != 0 {
                let pt_base = PhysAddr::new(pde & ENTRY_ADDR_MASK);
                phys.write_u32(pt_base.offset(pt_entry * 4), 0);
            }
            pt_entry += 1;
            if pt_entry == TABLE_ENTRIES {
                pd_entry += 1;
                pt_entry = 0;
            }
        }
    }

    /// Free the frame backing `va`; if `va` is a user address the
    /// page-table entry is cleared as well.
    pub fn unmap_page(&self, va: VirtAddr, frames: &mut FrameAllocator, phys: &PhysMap) {
        let pde = self.read_pde(va.pd_index(), phys);
        if pde & PageFlags::PRESENT.bits() == 0 {
            return;
        }
        let pt_base = PhysAddr::new(pde & ENTRY_ADDR_MASK);
        let pte_addr = pt_base.offset(va.pt_index() * 4);
        let pte = phys.read_u32(pte_addr);
        if pte & PageFlags::PRESENT.bits() == 0 {
            return;
        }
        frames.dealloc_frames(PhysAddr::new(pte & ENTRY_ADDR_MASK).frame(), 1);
        if va.is_user() {
            phys.write_u32(pte_addr, 0);
        }
    }

    /// Walk every user page-directory entry, free each mapped frame,
    /// free each page table, and clear the entries.
    pub fn dealloc_all_pages(&self, frames: &mut FrameAllocator, phys: &PhysMap) {
        for pd_entry in 0..KERNEL_PDE_SLOT {
            let pde = self.read_pde(pd_entry, phys);
            if pde & PageFlags::PRESENT.bits() == 0 {
                continue;
            }
            let pt_base = PhysAddr::new(pde & ENTRY_ADDR_MASK);
            for i in 0..TABLE_ENTRIES {
                let pte = phys.read_u32(pt_base.offset(i * 4));
                if pte & PageFlags::PRESENT.bits() != 0 {
                    frames.dealloc_frames(PhysAddr::new(pte & ENTRY_ADDR_MASK).frame(), 1);
                }
            }
            frames.dealloc_frames(pt_base.frame(), 1);
            phys.write_u32(self.pde_addr(pd_entry), 0);
        }
    }

    /// Tear the whole space down: all user mappings, then the page
    /// directory itself.
    pub fn destroy(self, frames: &mut FrameAllocator, phys: &PhysMap) {
        self.dealloc_all_pages(frames, phys);
        frames.dealloc_frames(self.pd, 1);
    }
}

/// Virtual-memory layout of a loaded program
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UserLayout {
    pub start_code: VirtAddr,
    pub end_code: VirtAddr,
    pub start_brk: VirtAddr,
    pub brk: VirtAddr,
    pub start_stack: VirtAddr,
}

/// Build the address space of a new process: code and data pages at
/// address zero, a one-page heap seed at the break, a user stack
/// ending just below the kernel base, and the per-process kernel-mode
/// stack page behind the TSS `esp0` slot.
///
/// Any intermediate failure unwinds everything already allocated.
pub fn init_logical_memory(
    code_size: u32,
    frames: &mut FrameAllocator,
    phys: &PhysMap,
) -> Result<(AddressSpace, UserLayout), KernelError> {
    let space = AddressSpace::new(frames, phys)?;
    let rw_user = PageFlags::WRITABLE | PageFlags::USER;

    let n_code = bytes_to_frames(code_size).max(1);
    let result = (|| {
        space.map_user_pages(n_code, VirtAddr::new(0), rw_user, frames, phys)?;
        let end_code = VirtAddr::new(n_code * FRAME_SIZE);

        // Heap seed: one page at the break, room for brk to grow into
        space.map_user_pages(1, end_code, rw_user, frames, phys)?;

        space.map_user_pages(
            USER_STACK_PAGES,
            VirtAddr::new(USER_STACK_BASE),
            rw_user,
            frames,
            phys,
        )?;

        // Kernel-mode stack: mapped writable but NOT user accessible;
        // the CPU switches onto it at every ring crossing.
        space.map_user_pages(
            1,
            VirtAddr::new(KERNEL_STACK_PAGE),
            PageFlags::WRITABLE,
            frames,
            phys,
        )?;

        Ok(UserLayout {
            start_code: VirtAddr::new(0),
            end_code,
            start_brk: end_code,
            brk: end_code,
            start_stack: VirtAddr::new(USER_STACK_START),
        })
    })();

    match result {
        Ok(layout) => Ok((space, layout)),
        Err(e) => {
            space.destroy(frames, phys);
            Err(e)
        }
    }
}
