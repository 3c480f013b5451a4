//! Shared-memory integration tests
//!
//! The full producer/consumer scenario over a shared ring buffer
//! guarded by two counting semaphores and a mutex, plus the
//! reclamation rules, all through the service interface.

mod common;

use common::{nr, Kernel};
use sos_kernel::mm::{VirtAddr, SHM_BEGIN};
use sos_kernel::process::Slot;
use sos_kernel::ProcessState;

const SHM_READ_WRITE: u32 = 2;

fn kernel_with_processes(n: u32) -> (Kernel, Vec<Slot>) {
    let mut k = Kernel::boot_default();
    let mut slots = Vec::new();
    for i in 0..n {
        let pid = k.spawn(i, 1);
        slots.push(k.slot_of(pid));
    }
    for &slot in &slots {
        assert_eq!(k.schedule_user(), slot);
        k.tick_to_console();
    }
    (k, slots)
}

/// Read/write one byte of a process's view of the attach region
fn shm_read(k: &Kernel, slot: Slot, offset: u32) -> u8 {
    let space = k.table.get(slot).expect("alive").mem.space;
    let pa = space
        .translate(VirtAddr::new(SHM_BEGIN + offset), &k.phys)
        .expect("attached");
    let mut b = [0u8; 1];
    k.phys.read(pa, &mut b);
    b[0]
}

fn shm_write(k: &Kernel, slot: Slot, offset: u32, value: u8) {
    let space = k.table.get(slot).expect("alive").mem.space;
    let pa = space
        .translate(VirtAddr::new(SHM_BEGIN + offset), &k.phys)
        .expect("attached");
    k.phys.write(pa, &[value]);
}

#[test]
fn create_returns_the_fixed_attach_address() {
    let (mut k, s) = kernel_with_processes(1);
    let addr = k.syscall(s[0], nr::SHM_CREATE, 36, 64);
    assert_eq!(addr, SHM_BEGIN);
    assert_eq!(k.shm.refs(36), 1);
}

#[test]
fn invalid_requests_return_zero_with_no_side_effects(){
    let (mut k, s) = kernel_with_processes(2);
    let free_before = k.frames.free_bytes();

    assert_eq!(k.syscall(s[0], nr::SHM_CREATE, 1, 0), 0, "zero size");
    assert_eq!(k.syscall(s[0], nr::SHM_CREATE, 1, 0x40_0001), 0, "over 4 MiB");
    assert_eq!(k.syscall(s[0], nr::SHM_ATTACH, 1, SHM_READ_WRITE), 0, "no object");
    assert_eq!(k.frames.free_bytes(), free_before);

    // Double attach
    assert_eq!(k.syscall(s[0], nr::SHM_CREATE, 1, 64), SHM_BEGIN);
    assert_eq!(k.syscall(s[0], nr::SHM_CREATE, 2, 64), 0, "already attached");
    assert_eq!(k.syscall(s[1], nr::SHM_CREATE, 1, 64), 0, "key in use");
}

#[test]
fn writes_are_visible_across_attachments() {
    let (mut k, s) = kernel_with_processes(2);
    assert_eq!(k.syscall(s[0], nr::SHM_CREATE, 36, 64), SHM_BEGIN);
    assert_eq!(k.syscall(s[1], nr::SHM_ATTACH, 36, SHM_READ_WRITE), SHM_BEGIN);

    shm_write(&k, s[0], 5, 0x7E);
    assert_eq!(shm_read(&k, s[1], 5), 0x7E);
}

#[test]
fn detach_frees_the_frames_only_at_the_last_reference() {
    let (mut k, s) = kernel_with_processes(2);

    k.syscall(s[0], nr::SHM_CREATE, 9, 4096);
    let base = k.shm.base(9).expect("object live");
    k.syscall(s[1], nr::SHM_ATTACH, 9, SHM_READ_WRITE);

    k.syscall(s[0], nr::SHM_DETACH, 0, 0);
    assert_eq!(k.shm.refs(9), 1);
    assert!(!k.frames.is_free(base));
    // The detached view is gone even while the object lives on
    let space = k.table.get(s[0]).expect("alive").mem.space;
    assert!(space.translate(VirtAddr::new(SHM_BEGIN), &k.phys).is_none());

    k.syscall(s[1], nr::SHM_DETACH, 0, 0);
    assert_eq!(k.shm.refs(9), 0);
    assert!(k.frames.is_free(base));
}

/// The classic bounded-buffer run: a five-slot ring in shared memory,
/// `empty` starting at 5, `full` at 0, a mutex guarding the indices.
/// The producer fills all five slots, blocks on the sixth `down`, and
/// resumes only after the consumer frees a slot.
#[test]
fn producer_consumer_over_shared_memory() {
    const BUFFER_SIZE: u32 = 5;
    let (mut k, s) = kernel_with_processes(2);
    let (producer, consumer) = (s[0], s[1]);

    assert_eq!(k.syscall(producer, nr::SHM_CREATE, 36, 64), SHM_BEGIN);
    let empty = k.syscall(producer, nr::SEM_CREATE, BUFFER_SIZE, 0);
    let full = k.syscall(producer, nr::SEM_CREATE, 0, 0);
    let guard = k.syscall(producer, nr::MUTEX_CREATE, 0, 0);
    assert!(empty != 0 && full != 0 && guard != 0);
    assert_eq!(k.syscall(consumer, nr::SHM_ATTACH, 36, SHM_READ_WRITE), SHM_BEGIN);

    let mut produced = 0u8;
    let mut write_index = 0u32;

    // Five items fit without blocking
    for _ in 0..BUFFER_SIZE {
        k.syscall(producer, nr::SEM_DOWN, empty, 0);
        assert_eq!(k.state_of(producer), ProcessState::Ready);
        k.syscall(producer, nr::MUTEX_LOCK, guard, 0);
        produced += 1;
        shm_write(&k, producer, write_index % BUFFER_SIZE, produced);
        write_index += 1;
        k.syscall(producer, nr::MUTEX_UNLOCK, guard, 0);
        k.syscall(producer, nr::SEM_UP, full, 0);
    }

    // The sixth down blocks: the buffer is full
    k.syscall(producer, nr::SEM_DOWN, empty, 0);
    assert_eq!(k.state_of(producer), ProcessState::Waiting);

    // Consumer takes one item
    k.syscall(consumer, nr::SEM_DOWN, full, 0);
    assert_eq!(k.state_of(consumer), ProcessState::Ready);
    k.syscall(consumer, nr::MUTEX_LOCK, guard, 0);
    assert_eq!(shm_read(&k, consumer, 0), 1, "oldest item first");
    k.syscall(consumer, nr::MUTEX_UNLOCK, guard, 0);
    k.syscall(consumer, nr::SEM_UP, empty, 0);

    // The producer was woken by that up and writes item six, which
    // wraps onto the freed slot
    assert_eq!(k.state_of(producer), ProcessState::Ready);
    k.syscall(producer, nr::MUTEX_LOCK, guard, 0);
    produced += 1;
    shm_write(&k, producer, write_index % BUFFER_SIZE, produced);
    k.syscall(producer, nr::MUTEX_UNLOCK, guard, 0);
    k.syscall(producer, nr::SEM_UP, full, 0);

    // No lost updates: slots hold items 6,2,3,4,5
    let expect = [6u8, 2, 3, 4, 5];
    for (i, &want) in expect.iter().enumerate() {
        assert_eq!(shm_read(&k, consumer, i as u32), want, "slot {i}");
    }
    assert_eq!(k.semaphores.value(full as u8), Some(5));
    assert_eq!(k.semaphores.value(empty as u8), Some(0));
}

#[test]
fn death_while_attached_detaches() {
    let (mut k, s) = kernel_with_processes(2);
    k.syscall(s[0], nr::SHM_CREATE, 12, 4096);
    k.syscall(s[1], nr::SHM_ATTACH, 12, SHM_READ_WRITE);
    let base = k.shm.base(12).expect("live");

    sos_kernel::trap::terminate_process(
        s[1],
        &mut k.table,
        &mut k.mutexes,
        &mut k.semaphores,
        &mut k.shm,
        &mut k.frames,
        &k.phys,
    );
    assert_eq!(k.shm.refs(12), 1, "creator still attached");

    sos_kernel::trap::terminate_process(
        s[0],
        &mut k.table,
        &mut k.mutexes,
        &mut k.semaphores,
        &mut k.shm,
        &mut k.frames,
        &k.phys,
    );
    assert_eq!(k.shm.refs(12), 0);
    assert!(k.frames.is_free(base), "backing reclaimed at zero refs");
}
