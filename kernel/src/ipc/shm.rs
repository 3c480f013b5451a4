//! Shared-memory object registry
//!
//! Up to 256 objects keyed 0..255, each a contiguous run of user-zone
//! frames of at most 4 MiB, reference counted. Every attachment maps
//! the frames at the fixed logical address `SHM_BEGIN` in the
//! attaching process; a process may hold one attachment at a time.
//! The backing frames are freed when the last reference detaches.

use spin::Mutex as SpinMutex;

use crate::error::KernelError;
use crate::mm::phys::FrameAllocator;
use crate::mm::{bytes_to_frames, FrameNumber, PageFlags, PhysMap, VirtAddr, SHM_BEGIN};
use crate::process::{ProcessTable, Slot};

/// Number of shared-memory keys
pub const SHMEM_MAX: usize = 256;

/// Largest shared-memory object (one full page table)
pub const SHM_MAX_BYTES: u32 = 0x40_0000;

/// Attach-mode bits as user programs pass them in `ecx`
pub const SHM_READ_ONLY: u32 = 0x0000_0000;
pub const SHM_READ_WRITE: u32 = 0x0000_0002;

#[derive(Debug, Clone, Copy)]
struct ShmEntry {
    refs: u32,
    base: FrameNumber,
    size: u32,
}

impl ShmEntry {
    const fn empty() -> Self {
        Self {
            refs: 0,
            base: FrameNumber::new(0),
            size: 0,
        }
    }
}

/// The registry mapping keys to frame ranges
pub struct ShmTable {
    entries: [ShmEntry; SHMEM_MAX],
}

impl ShmTable {
    pub const fn new() -> Self {
        Self {
            entries: [ShmEntry::empty(); SHMEM_MAX],
        }
    }

    /// Create the object behind `key`: allocate and map `size` bytes
    /// of user-zone frames at `SHM_BEGIN` in the caller, read-write.
    /// Returns the attach address.
    pub fn create(
        &mut self,
        key: u8,
        size: u32,
        slot: Slot,
        table: &mut ProcessTable,
        frames: &mut FrameAllocator,
        phys: &PhysMap,
    ) -> Result<u32, KernelError> {
        if size == 0 || size > SHM_MAX_BYTES {
            return Err(KernelError::BadSize { size });
        }
        if self.entries[key as usize].refs != 0 {
            return Err(KernelError::KeyInUse { key });
        }
        let p = table.get_mut(slot).expect("creating process alive");
        if p.shm.attached {
            return Err(KernelError::AlreadyAttached);
        }

        let n_pages = bytes_to_frames(size);
        let space = p.mem.space;
        space.map_user_pages(
            n_pages,
            VirtAddr::new(SHM_BEGIN),
            PageFlags::WRITABLE | PageFlags::USER,
            frames,
            phys,
        )?;

        // The attach address's own mapping tells us which frames back
        // the object; other attachments reuse them.
        let base = space
            .translate(VirtAddr::new(SHM_BEGIN), phys)
            .expect("attach region just mapped")
            .frame();

        self.entries[key as usize] = ShmEntry {
            refs: 1,
            base,
            size,
        };
        p.shm.attached = true;
        p.shm.key = key;
        Ok(SHM_BEGIN)
    }

    /// Attach to an existing object with the requested mode, mapping
    /// its frames at `SHM_BEGIN` in the caller. Page-table slots the
    /// caller already has mapped there are left untouched.
    pub fn attach(
        &mut self,
        key: u8,
        mode: u32,
        slot: Slot,
        table: &mut ProcessTable,
        frames: &mut FrameAllocator,
        phys: &PhysMap,
    ) -> Result<u32, KernelError> {
        let entry = self.entries[key as usize];
        if entry.refs == 0 {
            return Err(KernelError::NoSuchKey { key });
        }
        let p = table.get_mut(slot).expect("attaching process alive");
        if p.shm.attached {
            return Err(KernelError::AlreadyAttached);
        }

        let mut flags = PageFlags::USER;
        if mode & SHM_READ_WRITE != 0 {
            flags |= PageFlags::WRITABLE;
        }

        let n_pages = bytes_to_frames(entry.size);
        p.mem
            .space
            .map_existing_frames(n_pages, VirtAddr::new(SHM_BEGIN), entry.base, flags, frames, phys)?;

        self.entries[key as usize].refs += 1;
        p.shm.attached = true;
        p.shm.key = key;
        Ok(SHM_BEGIN)
    }

    /// Drop the caller's attachment: clear its page-table entries,
    /// decrement the reference count, and free the backing frames when
    /// it reaches zero. A process without an attachment is a no-op.
    pub fn detach(
        &mut self,
        slot: Slot,
        table: &mut ProcessTable,
        frames: &mut FrameAllocator,
        phys: &PhysMap,
    ) {
        let Some(p) = table.get_mut(slot) else { return };
        if !p.shm.attached {
            return;
        }
        let key = p.shm.key as usize;
        p.shm.attached = false;

        let n_pages = bytes_to_frames(self.entries[key].size);
        p.mem
            .space
            .unmap_keep_frames(VirtAddr::new(SHM_BEGIN), n_pages, phys);

        self.entries[key].refs -= 1;
        if self.entries[key].refs == 0 {
            frames.dealloc_frames(self.entries[key].base, n_pages);
        }
    }

    /// Live references on `key`
    pub fn refs(&self, key: u8) -> u32 {
        self.entries[key as usize].refs
    }

    /// Backing frames of `key`, if the object exists
    pub fn base(&self, key: u8) -> Option<FrameNumber> {
        let e = self.entries[key as usize];
        (e.refs != 0).then_some(e.base)
    }
}

impl Default for ShmTable {
    fn default() -> Self {
        Self::new()
    }
}

/// Global shared-memory registry
pub static SHM_OBJECTS: SpinMutex<ShmTable> = SpinMutex::new(ShmTable::new());

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mm::paging::{init_kernel_pages, init_logical_memory};
    use crate::mm::FRAME_SIZE;
    use crate::process::{DiskImage, MemoryDescriptor, Process};

    struct Fixture {
        table: ProcessTable,
        frames: FrameAllocator,
        phys: PhysMap,
        shm: ShmTable,
    }

    impl Fixture {
        fn new(n_procs: usize) -> (Self, alloc::vec::Vec<Slot>) {
            let mut frames = FrameAllocator::empty();
            frames.init(3072 * FRAME_SIZE);
            let phys = PhysMap::host_backed(3072);
            init_kernel_pages(&phys);

            let mut table = ProcessTable::new();
            let mut slots = alloc::vec::Vec::new();
            for _ in 0..n_procs {
                let (space, layout) =
                    init_logical_memory(FRAME_SIZE, &mut frames, &phys).expect("image");
                let pid = table.alloc_pid();
                let p = Process::new(
                    pid,
                    MemoryDescriptor::new(space, layout),
                    DiskImage { lba: 0, n_sectors: 1 },
                );
                slots.push(table.insert(p).expect("insert"));
            }
            (
                Self {
                    table,
                    frames,
                    phys,
                    shm: ShmTable::new(),
                },
                slots,
            )
        }

        fn create(&mut self, key: u8, size: u32, slot: Slot) -> Result<u32, KernelError> {
            self.shm
                .create(key, size, slot, &mut self.table, &mut self.frames, &self.phys)
        }

        fn attach(&mut self, key: u8, mode: u32, slot: Slot) -> Result<u32, KernelError> {
            self.shm
                .attach(key, mode, slot, &mut self.table, &mut self.frames, &self.phys)
        }

        fn detach(&mut self, slot: Slot) {
            self.shm
                .detach(slot, &mut self.table, &mut self.frames, &self.phys);
        }

        fn space_of(&self, slot: Slot) -> crate::mm::AddressSpace {
            self.table.get(slot).expect("alive").mem.space
        }
    }

    #[test]
    fn create_maps_the_object_at_the_fixed_base() {
        let (mut fx, s) = Fixture::new(1);
        let addr = fx.create(36, 64, s[0]).expect("create");
        assert_eq!(addr, SHM_BEGIN);
        assert_eq!(fx.shm.refs(36), 1);
        assert!(fx.table.get(s[0]).expect("alive").shm.attached);

        let pa = fx
            .space_of(s[0])
            .translate(VirtAddr::new(SHM_BEGIN), &fx.phys)
            .expect("mapped");
        assert_eq!(Some(pa.frame()), fx.shm.base(36));
    }

    #[test]
    fn size_limits_are_enforced() {
        let (mut fx, s) = Fixture::new(1);
        assert!(matches!(
            fx.create(1, 0, s[0]),
            Err(KernelError::BadSize { .. })
        ));
        assert!(matches!(
            fx.create(1, SHM_MAX_BYTES + 1, s[0]),
            Err(KernelError::BadSize { .. })
        ));
        fx.create(1, SHM_MAX_BYTES, s[0])
            .expect("exactly 4 MiB is allowed");
        assert_eq!(fx.shm.refs(1), 1);
    }

    #[test]
    fn a_key_in_use_cannot_be_recreated() {
        let (mut fx, s) = Fixture::new(2);
        fx.create(7, 4096, s[0]).expect("create");
        assert!(matches!(
            fx.create(7, 4096, s[1]),
            Err(KernelError::KeyInUse { key: 7 })
        ));
    }

    #[test]
    fn one_attachment_per_process() {
        let (mut fx, s) = Fixture::new(1);
        fx.create(1, 4096, s[0]).expect("create");
        assert!(matches!(
            fx.create(2, 4096, s[0]),
            Err(KernelError::AlreadyAttached)
        ));
    }

    #[test]
    fn attachments_share_the_same_frames() {
        let (mut fx, s) = Fixture::new(2);
        fx.create(36, 2 * FRAME_SIZE, s[0]).expect("create");
        let addr = fx.attach(36, SHM_READ_WRITE, s[1]).expect("attach");
        assert_eq!(addr, SHM_BEGIN);
        assert_eq!(fx.shm.refs(36), 2);

        // Writing through one mapping is visible through the other
        let pa0 = fx
            .space_of(s[0])
            .translate(VirtAddr::new(SHM_BEGIN + FRAME_SIZE + 8), &fx.phys)
            .expect("pa0");
        let pa1 = fx
            .space_of(s[1])
            .translate(VirtAddr::new(SHM_BEGIN + FRAME_SIZE + 8), &fx.phys)
            .expect("pa1");
        assert_eq!(pa0, pa1);
    }

    #[test]
    fn read_only_attachments_drop_the_write_bit() {
        let (mut fx, s) = Fixture::new(2);
        fx.create(5, 4096, s[0]).expect("create");
        fx.attach(5, SHM_READ_ONLY, s[1]).expect("attach");
        let (_, flags) = fx
            .space_of(s[1])
            .lookup(VirtAddr::new(SHM_BEGIN), &fx.phys)
            .expect("mapped");
        assert!(!flags.contains(PageFlags::WRITABLE));
        assert!(flags.contains(PageFlags::USER));
    }

    #[test]
    fn attach_to_a_missing_key_fails() {
        let (mut fx, s) = Fixture::new(1);
        assert!(matches!(
            fx.attach(9, SHM_READ_WRITE, s[0]),
            Err(KernelError::NoSuchKey { key: 9 })
        ));
    }

    #[test]
    fn frames_are_freed_only_with_the_last_detach() {
        let (mut fx, s) = Fixture::new(2);
        fx.create(36, 2 * FRAME_SIZE, s[0]).expect("create");
        fx.attach(36, SHM_READ_WRITE, s[1]).expect("attach");
        let base = fx.shm.base(36).expect("base");

        fx.detach(s[0]);
        assert_eq!(fx.shm.refs(36), 1);
        assert!(!fx.frames.is_free(base), "still referenced");
        assert!(fx
            .space_of(s[0])
            .translate(VirtAddr::new(SHM_BEGIN), &fx.phys)
            .is_none());

        fx.detach(s[1]);
        assert_eq!(fx.shm.refs(36), 0);
        assert!(fx.frames.is_free(base), "backing reclaimed");
        assert!(fx.frames.is_free(FrameNumber::new(base.as_u32() + 1)));
    }

    #[test]
    fn detach_without_attachment_is_a_no_op() {
        let (mut fx, s) = Fixture::new(1);
        fx.detach(s[0]);
        assert!(!fx.table.get(s[0]).expect("alive").shm.attached);
    }

    #[test]
    fn create_after_full_teardown_reuses_the_key() {
        let (mut fx, s) = Fixture::new(1);
        fx.create(36, 4096, s[0]).expect("create");
        fx.detach(s[0]);
        assert_eq!(fx.shm.refs(36), 0);
        fx.create(36, 8192, s[0]).expect("recreate");
        assert_eq!(fx.shm.refs(36), 1);
    }
}
