//! Kernel window onto physical memory
//!
//! Paging code reads and writes frame contents (page directories, page
//! tables, zero fills, program loading) through this window rather
//! than through raw physical pointers. On the boot target the window
//! is the higher-half direct map; host tests back it with a heap
//! arena, which is what makes the whole memory manager exercisable
//! off-target.

use spin::Once;

use super::{FrameNumber, PhysAddr, FRAME_SIZE};

/// A linear mapping of managed physical memory into the kernel's
/// address space.
pub struct PhysMap {
    base: *mut u8,
    frames: u32,
}

// SAFETY: the window describes memory that is only ever mutated with
// interrupts disabled on a single core; the raw pointer is a fixed
// mapping, not shared ownership.
unsafe impl Send for PhysMap {}
// SAFETY: as above; all access goes through the checked accessors.
unsafe impl Sync for PhysMap {}

impl PhysMap {
    /// Build a window over `frames` frames of physical memory mapped
    /// linearly starting at `base`.
    ///
    /// # Safety
    ///
    /// `base..base + frames * 4096` must be mapped, writable and not
    /// aliased by any Rust reference for the lifetime of the window.
    pub unsafe fn new(base: *mut u8, frames: u32) -> Self {
        Self { base, frames }
    }

    /// A window backed by leaked host memory. Test support only.
    #[cfg(not(target_os = "none"))]
    pub fn host_backed(frames: u32) -> Self {
        extern crate alloc;
        let bytes = frames as usize * FRAME_SIZE as usize;
        let arena = alloc::vec![0u8; bytes].leak();
        // SAFETY: the leaked arena is exactly `frames` frames long,
        // writable, and never reclaimed.
        unsafe { Self::new(arena.as_mut_ptr(), frames) }
    }

    /// Number of frames the window covers
    pub fn frames(&self) -> u32 {
        self.frames
    }

    pub fn contains(&self, frame: FrameNumber) -> bool {
        frame.as_u32() < self.frames
    }

    fn ptr(&self, pa: PhysAddr, len: usize) -> *mut u8 {
        let end = pa.as_u32() as usize + len;
        assert!(
            end <= self.frames as usize * FRAME_SIZE as usize,
            "physical access {:#010x}+{} outside the mapped window",
            pa.as_u32(),
            len
        );
        // SAFETY: the bounds check above keeps the offset inside the
        // window established by `new`.
        unsafe { self.base.add(pa.as_u32() as usize) }
    }

    /// Copy bytes out of physical memory.
    pub fn read(&self, pa: PhysAddr, buf: &mut [u8]) {
        let src = self.ptr(pa, buf.len());
        // SAFETY: `ptr` bounds-checked the source range; `buf` is a
        // live exclusive destination.
        unsafe { core::ptr::copy_nonoverlapping(src, buf.as_mut_ptr(), buf.len()) };
    }

    /// Copy bytes into physical memory.
    pub fn write(&self, pa: PhysAddr, buf: &[u8]) {
        let dst = self.ptr(pa, buf.len());
        // SAFETY: `ptr` bounds-checked the destination range.
        unsafe { core::ptr::copy_nonoverlapping(buf.as_ptr(), dst, buf.len()) };
    }

    /// Read one 32-bit little-endian word (page-table entries).
    pub fn read_u32(&self, pa: PhysAddr) -> u32 {
        let mut bytes = [0u8; 4];
        self.read(pa, &mut bytes);
        u32::from_le_bytes(bytes)
    }

    /// Write one 32-bit little-endian word.
    pub fn write_u32(&self, pa: PhysAddr, value: u32) {
        self.write(pa, &value.to_le_bytes());
    }

    /// Zero a whole frame.
    pub fn zero_frame(&self, frame: FrameNumber) {
        let dst = self.ptr(frame.base(), FRAME_SIZE as usize);
        // SAFETY: `ptr` bounds-checked one whole frame.
        unsafe { core::ptr::write_bytes(dst, 0, FRAME_SIZE as usize) };
    }

    /// Zero `n` consecutive frames.
    pub fn zero_frames(&self, first: FrameNumber, n: u32) {
        for i in 0..n {
            self.zero_frame(FrameNumber(first.as_u32() + i));
        }
    }
}

/// The kernel's physical window, published once at boot.
pub static PHYS_MAP: Once<PhysMap> = Once::new();

/// The published window. Panics before boot-time initialization.
pub fn phys_map() -> &'static PhysMap {
    PHYS_MAP.get().expect("physical window not initialized")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_back_what_was_written() {
        let map = PhysMap::host_backed(4);
        map.write(PhysAddr::new(0x1234), b"sos");
        let mut buf = [0u8; 3];
        map.read(PhysAddr::new(0x1234), &mut buf);
        assert_eq!(&buf, b"sos");
    }

    #[test]
    fn word_access_is_little_endian() {
        let map = PhysMap::host_backed(1);
        map.write_u32(PhysAddr::new(8), 0xDEAD_BEEF);
        assert_eq!(map.read_u32(PhysAddr::new(8)), 0xDEAD_BEEF);
        let mut bytes = [0u8; 4];
        map.read(PhysAddr::new(8), &mut bytes);
        assert_eq!(bytes, [0xEF, 0xBE, 0xAD, 0xDE]);
    }

    #[test]
    fn zero_frame_clears_every_byte() {
        let map = PhysMap::host_backed(2);
        map.write(PhysAddr::new(4096), &[0xAA; 64]);
        map.zero_frame(FrameNumber(1));
        let mut buf = [0xFFu8; 64];
        map.read(PhysAddr::new(4096), &mut buf);
        assert!(buf.iter().all(|&b| b == 0));
    }
}
