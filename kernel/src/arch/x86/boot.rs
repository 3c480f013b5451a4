//! Kernel initialization and the console loop
//!
//! The boot shim switches to 32-bit protected mode, sets up the GDT
//! and calls [`kernel_main`] with the memory size it probed. From
//! here: devices, physical and logical memory, traps, timer, then
//! the console, which runs with interrupts enabled and gets half of
//! every scheduling round.

use crate::console::{self, ShellEnv, COMMAND_MAX};
use crate::drivers::disk::Disk;
use crate::drivers::display::{Color, TextDisplay};
use crate::drivers::keyboard::KeySource;
use crate::mm::paging;
use crate::mm::physmap::{phys_map, PhysMap, PHYS_MAP};
use crate::mm::{FRAME_ALLOCATOR, FRAME_SIZE, KERNEL_BASE, KERNEL_PD_FRAME};
use crate::process::PROCESS_TABLE;
use crate::sched::SCHEDULER;
use crate::time;

/// Kernel pages handed to the heap allocator (256 KiB)
const HEAP_PAGES: u32 = 64;

/// Entry point called by the boot shim.
///
/// `total_memory_kb` is the probed RAM size in KiB.
#[no_mangle]
pub extern "C" fn kernel_main(total_memory_kb: u32) -> ! {
    let total_bytes = total_memory_kb.saturating_mul(1024);

    super::vga().lock().clear();
    crate::log_service::init();

    // Probe the disk now rather than at the first command
    let disk_sectors = super::disk().lock().total_sectors();

    let total_frames = {
        let mut frames = FRAME_ALLOCATOR.lock();
        frames.init(total_bytes);
        frames.total_frames()
    };

    // The higher-half window over every managed frame. The first
    // 4 MiB is mapped by the boot tables already; the rest of the
    // direct map is built right below.
    let phys = PHYS_MAP.call_once(|| {
        // SAFETY: the boot shim maps KERNEL_BASE.. onto physical 0..
        // before jumping here, and `extend_kernel_map` widens that
        // mapping to the full range before anything touches it.
        unsafe { PhysMap::new(KERNEL_BASE as *mut u8, total_frames) }
    });

    {
        let mut frames = FRAME_ALLOCATOR.lock();
        paging::init_kernel_pages(phys);
        // SAFETY: the kernel page directory maps the code executing
        // this line (higher half, global).
        unsafe {
            super::load_cr3(KERNEL_PD_FRAME * FRAME_SIZE);
        }
        paging::extend_kernel_map(total_frames, &mut frames, phys)
            .expect("kernel direct map must cover managed RAM");

        let heap = paging::alloc_kernel_pages(HEAP_PAGES, &mut frames, phys)
            .expect("kernel heap region");
        // SAFETY: the region was just allocated, is mapped and unused.
        unsafe {
            crate::get_allocator()
                .lock()
                .init(heap.as_u32() as *mut u8, (HEAP_PAGES * FRAME_SIZE) as usize);
        }
    }

    super::tss::init();
    super::idt::init();
    super::pic::init();
    super::pit::init();

    log::info!(
        "SOS kernel up: {} KiB RAM, {} frames, {} disk sectors",
        total_memory_kb,
        total_frames,
        disk_sectors
    );

    // SAFETY: traps and the timer are fully installed.
    unsafe { super::enable_interrupts() };

    start_console()
}

/// Key source for the console. Each poll runs as its own critical
/// section so no device lock is ever held across the blocking wait;
/// the timer keeps preempting between polls and the CPU sleeps until
/// the next interrupt when no key is pending.
struct ConsoleKeys;

impl KeySource for ConsoleKeys {
    fn getc(&mut self) -> u8 {
        loop {
            let key = crate::arch::without_interrupts(|| super::keyboard().lock().try_getc());
            if let Some(c) = key {
                return c;
            }
            // SAFETY: interrupts are enabled here; the next tick wakes
            // the poll loop.
            unsafe { super::hlt() };
        }
    }
}

/// Display handle for the console's line editor: one lock per
/// character, never held while blocked on input.
struct ConsoleScreen;

impl TextDisplay for ConsoleScreen {
    fn put_char(&mut self, c: u8) {
        crate::arch::without_interrupts(|| super::vga().lock().put_char(c));
    }

    fn set_color(&mut self, fg: Color, bg: Color) {
        crate::arch::without_interrupts(|| super::vga().lock().set_color(fg, bg));
    }

    fn clear(&mut self) {
        crate::arch::without_interrupts(|| super::vga().lock().clear());
    }
}

/// The console: read commands, run them, never return (shutdown
/// halts).
fn start_console() -> ! {
    let mut buffer = [0u8; COMMAND_MAX];

    loop {
        let len = console::read_command(&mut ConsoleKeys, &mut ConsoleScreen, &mut buffer);
        let line = core::str::from_utf8(&buffer[..len]).unwrap_or("");

        // Commands mutate scheduler and memory state shared with the
        // trap gateway; each runs as one critical section.
        let outcome = crate::arch::without_interrupts(|| {
            let mut table = PROCESS_TABLE.lock();
            let mut sched = SCHEDULER.lock();
            let mut frames = FRAME_ALLOCATOR.lock();
            let mut disk = super::disk().lock();
            let mut display = super::vga().lock();
            let mut env = ShellEnv {
                disk: &mut *disk,
                display: &mut *display,
                table: &mut table,
                sched: &mut sched,
                frames: &mut frames,
                phys: phys_map(),
                uptime_ms: time::uptime_ms(),
            };
            console::process_command(line, &mut env)
        });

        if outcome == console::ShellOutcome::Shutdown {
            crate::arch::halt();
        }
    }
}
