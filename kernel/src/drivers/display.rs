//! Character-sink interface of the text display
//!
//! The console and the printf service write through this trait; the
//! VGA text-mode implementation lives in `arch::x86::vga`. Colors are
//! the classic 16-entry attribute palette.

use core::fmt;

/// Text-mode attribute colors
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Color {
    Black = 0x0,
    Blue = 0x1,
    Green = 0x2,
    Cyan = 0x3,
    Red = 0x4,
    Magenta = 0x5,
    Brown = 0x6,
    LightGray = 0x7,
    DarkGray = 0x8,
    LightBlue = 0x9,
    LightGreen = 0xA,
    LightCyan = 0xB,
    LightRed = 0xC,
    LightMagenta = 0xD,
    Yellow = 0xE,
    White = 0xF,
}

/// The character sink the kernel core writes through
pub trait TextDisplay {
    fn put_char(&mut self, c: u8);

    fn set_color(&mut self, fg: Color, bg: Color);

    fn clear(&mut self);

    /// Redraw the uptime clock; the timer tick calls this once per
    /// epoch. Sinks without a clock area ignore it.
    fn update_clock(&mut self, _uptime_ms: u32) {}
}

/// Write a string through a sink.
pub fn puts(display: &mut dyn TextDisplay, s: &str) {
    for b in s.bytes() {
        display.put_char(b);
    }
}

/// Write raw bytes through a sink (rendered user output).
pub fn puts_bytes(display: &mut dyn TextDisplay, bytes: &[u8]) {
    for &b in bytes {
        display.put_char(b);
    }
}

/// `core::fmt` adapter over a sink, so callers can use `write!`.
pub struct Out<'a>(pub &'a mut dyn TextDisplay);

impl fmt::Write for Out<'_> {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        puts(self.0, s);
        Ok(())
    }
}

/// A sink that records everything written to it. Test support only.
#[cfg(not(target_os = "none"))]
pub mod testing {
    extern crate alloc;
    use alloc::string::String;
    use alloc::vec::Vec;

    use super::{Color, TextDisplay};

    /// Captures output and color changes for assertions
    #[derive(Default)]
    pub struct CaptureDisplay {
        pub text: String,
        pub color_changes: Vec<(Color, Color)>,
        pub cleared: usize,
    }

    impl CaptureDisplay {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn lines(&self) -> impl Iterator<Item = &str> {
            self.text.lines()
        }
    }

    impl TextDisplay for CaptureDisplay {
        fn put_char(&mut self, c: u8) {
            self.text.push(c as char);
        }

        fn set_color(&mut self, fg: Color, bg: Color) {
            self.color_changes.push((fg, bg));
        }

        fn clear(&mut self) {
            self.cleared += 1;
            self.text.clear();
        }
    }
}
