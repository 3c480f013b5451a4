//! Bounded-buffer producer
//!
//! Creates the shared ring buffer plus its semaphores and mutexes,
//! then feeds a text through it one character at a time. A NUL slot
//! is the end signal for consumers. Run the consumer with `run`
//! while this is producing.

#![no_std]
#![no_main]

use sos::{exit, mcreate, mlock, munlock, printf, screate, sdown, smcreate, smdetach, sup};

const SM_KEY: u8 = 36;
const BUFFER_SIZE: usize = 5;

/// Layout of the shared region; the consumer sees the same struct.
#[repr(C)]
struct SharedData {
    slot: [u8; BUFFER_SIZE],
    r#in: u32,
    out: u32,
    n_consumers: u32,
    mx_buffer: u8,
    sem_empty: u8,
    sem_full: u8,
    sem_done: u8,
}

const TEXT: &[u8] = b"It looked like a good thing: but wait till I tell you.\n";

#[no_mangle]
pub extern "C" fn _start() -> ! {
    main();
    exit()
}

fn main() {
    let shared = smcreate(SM_KEY, core::mem::size_of::<SharedData>() as u32);
    if shared.is_null() {
        printf(b"Unable to create shared memory area.\n\0", &[]);
        return;
    }
    // SAFETY: the kernel mapped the object read-write at this address.
    let b = unsafe { &mut *(shared as *mut SharedData) };

    b.sem_empty = screate(BUFFER_SIZE as u8);
    b.sem_full = screate(0);
    b.sem_done = screate(0);
    if b.sem_empty == 0 || b.sem_full == 0 || b.sem_done == 0 {
        smdetach();
        printf(b"Unable to create semaphore objects.\n\0", &[]);
        return;
    }

    b.mx_buffer = mcreate();
    if b.mx_buffer == 0 {
        smdetach();
        printf(b"Unable to create mutex objects.\n\0", &[]);
        return;
    }

    b.r#in = 0;
    b.out = 0;
    b.n_consumers = 0;
    printf(b"Producing items...consumers can run now.\n\0", &[]);

    for &c in TEXT {
        sos::sleep(50); // simulation: producing the next item
        sdown(b.sem_empty);
        b.slot[b.r#in as usize] = c;
        b.r#in = (b.r#in + 1) % BUFFER_SIZE as u32;
        sup(b.sem_full);
    }

    printf(b"\nDone producing...waiting for consumers to end.\n\0", &[]);

    loop {
        mlock(b.mx_buffer);
        let alive = b.n_consumers;
        munlock(b.mx_buffer);
        if alive == 0 {
            break;
        }
        sdown(b.sem_empty);
        b.slot[b.r#in as usize] = 0; // end signal
        b.r#in = (b.r#in + 1) % BUFFER_SIZE as u32;
        sup(b.sem_full);
        sdown(b.sem_done);
    }

    printf(b"\nShutters down!\n\0", &[]);

    sos::sdestroy(b.sem_full);
    sos::sdestroy(b.sem_empty);
    sos::sdestroy(b.sem_done);
    sos::mdestroy(b.mx_buffer);
    smdetach();
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    exit()
}
