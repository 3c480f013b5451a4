//! The SOS console
//!
//! Reads commands and processes them. The console runs in kernel mode
//! (it is the PID-0 pseudo-process the scheduler alternates with);
//! programs it launches run in user mode. The command loop itself
//! lives in the boot code; this module is the line editor and the
//! command processor, both driven through the collaborator traits so
//! the whole surface is testable.

use core::fmt::Write;

use crate::drivers::disk::{Disk, DiskError, SECTOR_SIZE};
use crate::drivers::display::{puts, Out, TextDisplay};
use crate::drivers::keyboard::{keys, KeySource};
use crate::error::KernelError;
use crate::mm::phys::FrameAllocator;
use crate::mm::PhysMap;
use crate::process::ProcessTable;
use crate::sched::Scheduler;

/// Longest accepted command line
pub const COMMAND_MAX: usize = 512;

/// The command prompt
pub const PROMPT: &str = "% ";

/// What the command loop should do next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShellOutcome {
    Continue,
    /// `shutdown` was issued; halt the machine
    Shutdown,
}

/// Everything a command may touch
pub struct ShellEnv<'a> {
    pub disk: &'a mut dyn Disk,
    pub display: &'a mut dyn TextDisplay,
    pub table: &'a mut ProcessTable,
    pub sched: &'a mut Scheduler,
    pub frames: &'a mut FrameAllocator,
    pub phys: &'a PhysMap,
    pub uptime_ms: u32,
}

/// Read one command line: echo printable keys, honor backspace, drop
/// tabs and arrows, stop at return. Returns the line length.
pub fn read_command(
    keysrc: &mut dyn KeySource,
    display: &mut dyn TextDisplay,
    buffer: &mut [u8; COMMAND_MAX],
) -> usize {
    puts(display, PROMPT);
    let mut len = 0usize;

    loop {
        let c = keysrc.getc();
        match c {
            keys::RETURN => break,
            keys::BACKSPACE => {
                if len > 0 {
                    display.put_char(keys::BACKSPACE);
                    len -= 1;
                    buffer[len] = 0;
                }
            }
            // TODO: autocomplete on TAB, history on the arrow keys
            keys::TAB | keys::UP | keys::DOWN | keys::LEFT | keys::RIGHT => {}
            _ => {
                if len < COMMAND_MAX {
                    display.put_char(c);
                    buffer[len] = c;
                    len += 1;
                }
            }
        }
    }

    display.put_char(b'\n');
    len
}

fn first_token(s: &str) -> (&str, &str) {
    match s.find(' ') {
        Some(i) => (&s[..i], &s[i + 1..]),
        None => (s, ""),
    }
}

fn is_pos_number(s: &str) -> bool {
    !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit())
}

fn parse_number(s: &str) -> Option<u32> {
    if !is_pos_number(s) {
        return None;
    }
    s.parse().ok()
}

/// Process one command line.
pub fn process_command(line: &str, env: &mut ShellEnv<'_>) -> ShellOutcome {
    let (cmd, args) = first_token(line);

    match cmd {
        "help" => {
            if !args.is_empty() {
                puts(env.display, "No such help available.\n");
            } else {
                puts(env.display, "You are running a really Simple-OS.\n");
            }
        }
        "cls" => {
            if !args.is_empty() {
                puts(env.display, "cls: What to do with the arguments?\n");
            } else {
                env.display.clear();
            }
        }
        "uptime" => {
            if !args.is_empty() {
                puts(env.display, "uptime: What to do with the arguments?\n");
            } else {
                let _ = writeln!(Out(env.display), "{}", env.uptime_ms);
            }
        }
        "ps" => {
            if !args.is_empty() {
                puts(env.display, "ps: What to do with the arguments?\n");
            } else {
                command_ps(env);
            }
        }
        "shutdown" => {
            if !args.is_empty() {
                puts(env.display, "shutdown: What to do with the arguments?\n");
            } else {
                puts(env.display, "You really had to do that...SYSTEM HALTED!!\n");
                return ShellOutcome::Shutdown;
            }
        }
        "diskdump" => command_diskdump(args, env),
        "run" => command_run(args, env),
        "" => {}
        _ => {
            let _ = writeln!(Out(env.display), "{}: Command not found.", cmd);
        }
    }
    ShellOutcome::Continue
}

/// `ps`: one row per ring member, in scheduling order.
fn command_ps(env: &mut ShellEnv<'_>) {
    if env.sched.ring.is_empty() {
        puts(env.display, "ps: No running processes.\n");
        return;
    }

    puts(env.display, "PID\tState\tImage\n");
    for slot in env.sched.ring.members(env.table) {
        let p = env.table.get(slot).expect("ring member alive");
        let _ = writeln!(
            Out(env.display),
            "{}\t{}\t({},{})",
            p.pid,
            p.state.letter(),
            p.disk.lba,
            p.disk.n_sectors
        );
    }
}

/// `diskdump <LBA> <count>`: hex-dump sectors, 16 bytes per line.
fn command_diskdump(args: &str, env: &mut ShellEnv<'_>) {
    let (first, rest) = first_token(args);
    if first.is_empty() {
        puts(env.display, "Usage: diskdump [start LBA] [sector count]\n");
        return;
    }
    let Some(mut lba) = parse_number(first) else {
        puts(env.display, "diskdump: Invalid start LBA.\n");
        return;
    };

    let (second, _) = first_token(rest);
    if second.is_empty() {
        puts(env.display, "Usage: diskdump [start LBA] [sector count]\n");
        return;
    }
    let Some(mut n_sectors) = parse_number(second) else {
        puts(env.display, "diskdump: Invalid sector count.\n");
        return;
    };

    let mut sector = [0u8; SECTOR_SIZE];
    while n_sectors > 0 {
        match env.disk.read(lba, 1, &mut sector) {
            Ok(()) => {}
            Err(DiskError::LbaOutOfRange) | Err(DiskError::SectorCountTooBig) => {
                puts(env.display, "diskdump: LBA out of range.\n");
                return;
            }
            Err(_) => {
                puts(env.display, "diskdump: Disk read error.\n");
                return;
            }
        }
        for (i, byte) in sector.iter().enumerate() {
            let _ = write!(Out(env.display), "{:02x} ", byte);
            if (i + 1) % 16 == 0 {
                env.display.put_char(b'\n');
            }
        }
        puts(env.display, "\n");
        n_sectors -= 1;
        lba += 1;
    }
}

/// `run <LBA> <count>`: launch the program stored in those sectors as
/// a background process.
fn command_run(args: &str, env: &mut ShellEnv<'_>) {
    let (first, rest) = first_token(args);
    if first.is_empty() {
        puts(env.display, "Usage: run [start LBA] [sector count]\n");
        return;
    }
    let Some(lba) = parse_number(first) else {
        puts(env.display, "run: Invalid start LBA.\n");
        return;
    };

    let (second, _) = first_token(rest);
    if second.is_empty() {
        puts(env.display, "Usage: run [start LBA] [sector count]\n");
        return;
    }
    let n_sectors = match parse_number(second) {
        Some(n) if n > 0 => n,
        _ => {
            puts(env.display, "run: Invalid sector count.\n");
            return;
        }
    };

    // The ring is shared with the trap gateway; queueing happens with
    // interrupts off.
    let spawned = crate::arch::without_interrupts(|| {
        env.sched
            .spawn_program(lba, n_sectors, env.table, env.frames, env.phys)
    });
    match spawned {
        Ok(_pid) => {}
        Err(KernelError::OutOfFrames { .. }) | Err(KernelError::OutOfSlots { .. }) => {
            puts(env.display, "run: Not enough memory.\n");
        }
        Err(_) => {
            puts(env.display, "run: Invalid sector count.\n");
        }
    }
}
