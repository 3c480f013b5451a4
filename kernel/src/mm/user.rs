//! User-memory access for system calls
//!
//! Pointer arguments arrive in untrusted registers. Every access is
//! validated and performed through the CALLER's address space, one
//! page at a time, never through the kernel's own mapping.

use super::{AddressSpace, PageFlags, PhysMap, VirtAddr, FRAME_SIZE};
use crate::error::KernelError;

/// Resolve one user byte range to its physical home, checking that the
/// page is mapped and user accessible.
fn user_page(
    space: &AddressSpace,
    phys: &PhysMap,
    va: VirtAddr,
) -> Result<super::PhysAddr, KernelError> {
    if !va.is_user() {
        return Err(KernelError::BadUserAddress { addr: va.as_u32() });
    }
    let (pa, flags) = space
        .lookup(va, phys)
        .ok_or(KernelError::BadUserAddress { addr: va.as_u32() })?;
    if !flags.contains(PageFlags::USER) {
        return Err(KernelError::BadUserAddress { addr: va.as_u32() });
    }
    Ok(pa)
}

/// Check that `[addr, addr + len)` lies entirely within the caller's
/// mapped user region.
pub fn validate_range(
    space: &AddressSpace,
    phys: &PhysMap,
    addr: u32,
    len: u32,
) -> Result<(), KernelError> {
    if len == 0 {
        return Ok(());
    }
    let end = addr
        .checked_add(len - 1)
        .ok_or(KernelError::BadUserAddress { addr })?;
    let mut page = addr & !(FRAME_SIZE - 1);
    loop {
        user_page(space, phys, VirtAddr::new(page))?;
        if page + (FRAME_SIZE - 1) >= end {
            return Ok(());
        }
        page += FRAME_SIZE;
    }
}

/// Copy bytes out of the caller's address space.
pub fn copy_from_user(
    space: &AddressSpace,
    phys: &PhysMap,
    addr: u32,
    buf: &mut [u8],
) -> Result<(), KernelError> {
    let mut va = addr;
    let mut done = 0usize;
    while done < buf.len() {
        let pa = user_page(space, phys, VirtAddr::new(va))?;
        let in_page = (FRAME_SIZE - (va & (FRAME_SIZE - 1))) as usize;
        let chunk = in_page.min(buf.len() - done);
        phys.read(pa, &mut buf[done..done + chunk]);
        done += chunk;
        va = va
            .checked_add(chunk as u32)
            .ok_or(KernelError::BadUserAddress { addr: va })?;
    }
    Ok(())
}

/// Copy bytes into the caller's address space.
pub fn copy_to_user(
    space: &AddressSpace,
    phys: &PhysMap,
    addr: u32,
    data: &[u8],
) -> Result<(), KernelError> {
    let mut va = addr;
    let mut done = 0usize;
    while done < data.len() {
        let pa = user_page(space, phys, VirtAddr::new(va))?;
        let in_page = (FRAME_SIZE - (va & (FRAME_SIZE - 1))) as usize;
        let chunk = in_page.min(data.len() - done);
        phys.write(pa, &data[done..done + chunk]);
        done += chunk;
        va = va
            .checked_add(chunk as u32)
            .ok_or(KernelError::BadUserAddress { addr: va })?;
    }
    Ok(())
}

/// Read a 32-bit word from the caller (syscall argument slots).
pub fn read_u32(space: &AddressSpace, phys: &PhysMap, addr: u32) -> Result<u32, KernelError> {
    let mut bytes = [0u8; 4];
    copy_from_user(space, phys, addr, &mut bytes)?;
    Ok(u32::from_le_bytes(bytes))
}

/// Read a NUL-terminated string into `out`; returns its length.
/// Strings longer than `out` are an error, not a truncation, so a
/// malformed pointer cannot leak unbounded reads.
pub fn read_cstr(
    space: &AddressSpace,
    phys: &PhysMap,
    addr: u32,
    out: &mut [u8],
) -> Result<usize, KernelError> {
    let mut va = addr;
    for i in 0..out.len() {
        let mut byte = [0u8; 1];
        copy_from_user(space, phys, va, &mut byte)?;
        if byte[0] == 0 {
            return Ok(i);
        }
        out[i] = byte[0];
        va = va
            .checked_add(1)
            .ok_or(KernelError::BadUserAddress { addr: va })?;
    }
    Err(KernelError::BadSize {
        size: out.len() as u32,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::paging::init_kernel_pages;
    use crate::mm::phys::FrameAllocator;

    fn setup() -> (FrameAllocator, PhysMap, AddressSpace) {
        let mut frames = FrameAllocator::empty();
        frames.init(2048 * FRAME_SIZE);
        let phys = PhysMap::host_backed(2048);
        init_kernel_pages(&phys);
        let space = AddressSpace::new(&mut frames, &phys).expect("space");
        space
            .map_user_pages(
                2,
                VirtAddr::new(0),
                PageFlags::WRITABLE | PageFlags::USER,
                &mut frames,
                &phys,
            )
            .expect("two user pages");
        (frames, phys, space)
    }

    #[test]
    fn round_trip_through_user_pages() {
        let (_f, phys, space) = setup();
        copy_to_user(&space, &phys, 100, b"hello sos").expect("write");
        let mut buf = [0u8; 9];
        copy_from_user(&space, &phys, 100, &mut buf).expect("read");
        assert_eq!(&buf, b"hello sos");
    }

    #[test]
    fn copies_span_page_boundaries() {
        let (_f, phys, space) = setup();
        let addr = FRAME_SIZE - 3;
        copy_to_user(&space, &phys, addr, b"boundary").expect("write");
        let mut buf = [0u8; 8];
        copy_from_user(&space, &phys, addr, &mut buf).expect("read");
        assert_eq!(&buf, b"boundary");
    }

    #[test]
    fn unmapped_addresses_are_rejected() {
        let (_f, phys, space) = setup();
        let mut buf = [0u8; 4];
        assert!(matches!(
            copy_from_user(&space, &phys, 5 * FRAME_SIZE, &mut buf),
            Err(KernelError::BadUserAddress { .. })
        ));
        assert!(validate_range(&space, &phys, 0, 2 * FRAME_SIZE).is_ok());
        assert!(validate_range(&space, &phys, FRAME_SIZE, FRAME_SIZE + 1).is_err());
    }

    #[test]
    fn kernel_half_is_never_user_accessible() {
        let (_f, phys, space) = setup();
        let mut buf = [0u8; 1];
        assert!(copy_from_user(&space, &phys, crate::mm::KERNEL_BASE, &mut buf).is_err());
        assert!(copy_from_user(&space, &phys, crate::mm::KERNEL_BASE + 100, &mut buf).is_err());
    }

    #[test]
    fn supervisor_only_pages_are_rejected() {
        let (mut frames, phys, space) = setup();
        space
            .map_user_pages(
                1,
                VirtAddr::new(0x10000),
                PageFlags::WRITABLE,
                &mut frames,
                &phys,
            )
            .expect("supervisor page");
        let mut buf = [0u8; 1];
        assert!(copy_from_user(&space, &phys, 0x10000, &mut buf).is_err());
    }

    #[test]
    fn cstr_reads_stop_at_nul() {
        let (_f, phys, space) = setup();
        copy_to_user(&space, &phys, 200, b"fmt%d\0junk").expect("write");
        let mut out = [0u8; 32];
        let len = read_cstr(&space, &phys, 200, &mut out).expect("cstr");
        assert_eq!(&out[..len], b"fmt%d");

        // Unterminated string hitting the cap is an error
        let mut tiny = [0u8; 3];
        assert!(read_cstr(&space, &phys, 200, &mut tiny).is_err());
    }
}
