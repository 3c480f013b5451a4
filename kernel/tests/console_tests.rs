//! Console integration tests
//!
//! The command processor and line editor against scripted keys, a
//! capture display and an image disk.

mod common;

use common::Kernel;
use sos_kernel::console::{self, ShellOutcome, COMMAND_MAX};
use sos_kernel::drivers::disk::testing::ImageDisk;
use sos_kernel::drivers::disk::SECTOR_SIZE;
use sos_kernel::drivers::display::testing::CaptureDisplay;
use sos_kernel::drivers::keyboard::testing::ScriptedKeys;

#[test]
fn help_and_unknown_commands() {
    let mut k = Kernel::boot_default();
    k.run_command("help");
    assert!(k.display.text.contains("You are running a really Simple-OS.\n"));

    k.run_command("help me");
    assert!(k.display.text.contains("No such help available.\n"));

    k.run_command("frobnicate");
    assert!(k.display.text.contains("frobnicate: Command not found.\n"));
}

#[test]
fn uptime_prints_milliseconds_since_boot() {
    let mut k = Kernel::boot_default();
    k.now = 123; // epochs
    k.run_command("uptime");
    assert!(k.display.text.contains("1230\n"));

    k.run_command("uptime now");
    assert!(k.display.text.contains("uptime: What to do with the arguments?\n"));
}

#[test]
fn cls_clears_the_screen() {
    let mut k = Kernel::boot_default();
    k.run_command("help");
    assert!(!k.display.text.is_empty());
    k.run_command("cls");
    assert_eq!(k.display.cleared, 1);
    assert!(k.display.text.is_empty());
}

#[test]
fn shutdown_stops_the_loop() {
    let mut k = Kernel::boot_default();
    assert_eq!(k.run_command("shutdown"), ShellOutcome::Shutdown);
    assert!(k
        .display
        .text
        .contains("You really had to do that...SYSTEM HALTED!!\n"));

    assert_eq!(k.run_command("shutdown -f"), ShellOutcome::Continue);
}

#[test]
fn diskdump_prints_hex_pairs_sixteen_per_line() {
    // Sector 0 bytes are 0x00, 0x01, 0x02, ... per the pattern
    let mut k = Kernel::boot_default();
    k.run_command("diskdump 0 1");

    let lines: Vec<&str> = k.display.lines().collect();
    assert_eq!(lines[0], "00 01 02 03 04 05 06 07 08 09 0a 0b 0c 0d 0e 0f ");
    assert_eq!(
        lines[1],
        "10 11 12 13 14 15 16 17 18 19 1a 1b 1c 1d 1e 1f "
    );
    // 512 bytes / 16 per line = 32 hex lines, then the blank sector
    // separator
    assert_eq!(lines.len(), 33);
    assert_eq!(lines[32], "");

    let hex_pairs = k.display.text.matches(' ').count();
    assert_eq!(hex_pairs, 512, "one trailing space per byte");
}

#[test]
fn diskdump_validates_its_arguments() {
    let mut k = Kernel::boot_default();
    k.run_command("diskdump");
    assert!(k
        .display
        .text
        .contains("Usage: diskdump [start LBA] [sector count]\n"));

    k.run_command("diskdump ten 1");
    assert!(k.display.text.contains("diskdump: Invalid start LBA.\n"));

    k.run_command("diskdump 0");
    assert!(k.display.text.matches("Usage: diskdump").count() == 2);

    k.run_command("diskdump 0 x");
    assert!(k.display.text.contains("diskdump: Invalid sector count.\n"));

    // Patterned test disk has 64 sectors
    k.run_command("diskdump 64 1");
    assert!(k.display.text.contains("diskdump: LBA out of range.\n"));
}

#[test]
fn run_queues_a_new_process() {
    let mut k = Kernel::boot_default();
    k.run_command("run 3 2");
    k.run_command("ps");
    assert!(k.display.text.contains("\tN\t(3,2)"));

    k.run_command("run");
    assert!(k
        .display
        .text
        .contains("Usage: run [start LBA] [sector count]\n"));

    k.run_command("run 3 0");
    assert!(k.display.text.contains("run: Invalid sector count.\n"));

    k.run_command("run x 1");
    assert!(k.display.text.contains("run: Invalid start LBA.\n"));
}

#[test]
fn ps_with_no_processes_says_so() {
    let mut k = Kernel::boot_default();
    k.run_command("ps");
    assert!(k.display.text.contains("ps: No running processes.\n"));
}

#[test]
fn line_editor_echoes_and_handles_backspace() {
    let mut keys = ScriptedKeys::new(b"pss\x08\x0D"); // "pss", backspace, return
    let mut display = CaptureDisplay::new();
    let mut buffer = [0u8; COMMAND_MAX];

    let len = console::read_command(&mut keys, &mut display, &mut buffer);
    assert_eq!(&buffer[..len], b"ps");
    // Prompt, three echoes, the backspace echo, final newline
    assert_eq!(display.text, "% pss\u{8}\n");
}

#[test]
fn line_editor_ignores_tabs_and_arrows() {
    let mut keys = ScriptedKeys::new(&[b'p', 0x09, 0x1C, 0x1D, b's', 0x0D]);
    let mut display = CaptureDisplay::new();
    let mut buffer = [0u8; COMMAND_MAX];

    let len = console::read_command(&mut keys, &mut display, &mut buffer);
    assert_eq!(&buffer[..len], b"ps");
}

#[test]
fn user_printf_renders_through_the_caller_address_space() {
    let mut k = Kernel::boot_default();
    let pid = k.spawn(0, 2);
    let slot = k.slot_of(pid);
    k.schedule_user();

    // Stage the format string and the argument slots where the
    // program would have them
    let space = k.table.get(slot).expect("alive").mem.space;
    sos_kernel::mm::user::copy_to_user(&space, &k.phys, 0x600, b"value=%d hex=%x %s!\0")
        .expect("format");
    sos_kernel::mm::user::copy_to_user(&space, &k.phys, 0x700, b"done\0").expect("string");
    let args: [u32; 3] = [7, 0xAB, 0x700];
    for (i, a) in args.iter().enumerate() {
        sos_kernel::mm::user::copy_to_user(&space, &k.phys, 0x680 + 4 * i as u32, &a.to_le_bytes())
            .expect("arg");
    }

    let ret = k.syscall(slot, common::nr::PRINTF, 0x600, 0x680);
    assert_eq!(ret, 1);
    assert!(k.display.text.contains("value=7 hex=ab done!"));
}

#[test]
fn printf_with_a_wild_pointer_prints_nothing() {
    let mut k = Kernel::boot_default();
    let pid = k.spawn(0, 1);
    let slot = k.slot_of(pid);
    k.schedule_user();

    let before = k.display.text.clone();
    let ret = k.syscall(slot, common::nr::PRINTF, 0xDEAD_BEEF, 0);
    assert_eq!(ret, 0);
    assert_eq!(k.display.text, before, "no side effects");
    assert_eq!(
        k.state_of(k.slot_of(pid)),
        sos_kernel::ProcessState::Ready,
        "caller continues with the error in edx"
    );
}

#[test]
fn getc_returns_the_next_key_code() {
    let mut k = Kernel::boot_default();
    let pid = k.spawn(0, 1);
    let slot = k.slot_of(pid);
    k.schedule_user();

    k.keys = ScriptedKeys::new(b"z");
    let ret = k.syscall(slot, common::nr::GETC, 0, 0);
    assert_eq!(ret, u32::from(b'z'));
}

#[test]
fn a_full_session_reads_commands_until_shutdown() {
    let mut k = Kernel::boot(ImageDisk::patterned(8));
    let script = ScriptedKeys::typing("help");
    let mut keys = script;
    let mut buffer = [0u8; COMMAND_MAX];
    let len = {
        let mut display = CaptureDisplay::new();
        console::read_command(&mut keys, &mut display, &mut buffer)
    };
    let line = core::str::from_utf8(&buffer[..len]).expect("ascii");
    assert_eq!(line, "help");
    assert_eq!(k.run_command(line), ShellOutcome::Continue);

    // Sector sanity for the session's disk
    let mut sector = [0u8; SECTOR_SIZE];
    use sos_kernel::drivers::disk::Disk;
    k.disk.read(1, 1, &mut sector).expect("read");
    assert_eq!(sector[0], 1);
}
