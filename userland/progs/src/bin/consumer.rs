//! Bounded-buffer consumer
//!
//! Attaches to the producer's shared ring, registers itself, and
//! echoes characters until the NUL end signal arrives.

#![no_std]
#![no_main]

use sos::{exit, mlock, munlock, printf, sdown, smattach, smdetach, sup, SM_READ_WRITE};

const SM_KEY: u8 = 36;
const BUFFER_SIZE: usize = 5;

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

#[no_mangle]
pub extern "C" fn _start() -> ! {
    main();
    exit()
}

fn main() {
    let shared = smattach(SM_KEY, SM_READ_WRITE);
    if shared.is_null() {
        printf(b"Run the producer first.\n\0", &[]);
        return;
    }
    // SAFETY: the kernel mapped the producer's object at this address.
    let b = unsafe { &mut *(shared as *mut SharedData) };

    mlock(b.mx_buffer);
    b.n_consumers += 1;
    munlock(b.mx_buffer);

    loop {
        sdown(b.sem_full);
        mlock(b.mx_buffer);
        let c = b.slot[b.out as usize];
        b.out = (b.out + 1) % BUFFER_SIZE as u32;
        munlock(b.mx_buffer);

        if c == 0 {
            break; // end signal
        }
        printf(b"%c\0", &[u32::from(c)]);
        sup(b.sem_empty);
    }

    mlock(b.mx_buffer);
    b.n_consumers -= 1;
    munlock(b.mx_buffer);
    sup(b.sem_done);
    smdetach();
}

#[panic_handler]
fn panic(_info: &core::panic::PanicInfo) -> ! {
    exit()
}
