//! PS/2 keyboard, polled
//!
//! Reads scancodes straight off port 0x60 when the controller status
//! says a byte is pending, and feeds them through the `pc-keyboard`
//! set-1 decoder. Decoded keys are mapped onto the kernel's key
//! codes.

use pc_keyboard::{layouts::Us104Key, DecodedKey, HandleControl, KeyCode, Keyboard, ScancodeSet1};

use crate::drivers::keyboard::{keys, KeySource};

const STATUS_PORT: u16 = 0x64;
const DATA_PORT: u16 = 0x60;

/// The polled keyboard state
pub struct Ps2Keyboard {
    decoder: Keyboard<Us104Key, ScancodeSet1>,
}

impl Ps2Keyboard {
    pub fn new() -> Self {
        Self {
            decoder: Keyboard::new(
                ScancodeSet1::new(),
                Us104Key,
                HandleControl::MapLettersToUnicode,
            ),
        }
    }

    fn poll_scancode(&mut self) -> Option<u8> {
        // SAFETY: status bit 0 says a data byte is pending on 0x60.
        unsafe {
            if x86::io::inb(STATUS_PORT) & 0x01 != 0 {
                Some(x86::io::inb(DATA_PORT))
            } else {
                None
            }
        }
    }

    fn map_key(key: DecodedKey) -> Option<u8> {
        match key {
            DecodedKey::Unicode(c) => match c {
                '\n' => Some(keys::RETURN),
                '\x08' => Some(keys::BACKSPACE),
                '\t' => Some(keys::TAB),
                c if c.is_ascii() && c as u32 >= 0x20 => Some(c as u8),
                _ => None,
            },
            DecodedKey::RawKey(code) => match code {
                KeyCode::ArrowUp => Some(keys::UP),
                KeyCode::ArrowDown => Some(keys::DOWN),
                KeyCode::ArrowLeft => Some(keys::LEFT),
                KeyCode::ArrowRight => Some(keys::RIGHT),
                KeyCode::Escape => Some(keys::ESCAPE),
                _ => None,
            },
        }
    }
}

impl Ps2Keyboard {
    /// One poll step: returns a decoded key if a scancode was pending
    /// and completed a key press. The console uses this so it never
    /// holds the keyboard lock across a blocking wait.
    pub fn try_getc(&mut self) -> Option<u8> {
        let scancode = self.poll_scancode()?;
        let event = self.decoder.add_byte(scancode).ok().flatten()?;
        let key = self.decoder.process_keyevent(event)?;
        Self::map_key(key)
    }
}

impl Default for Ps2Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl KeySource for Ps2Keyboard {
    fn getc(&mut self) -> u8 {
        loop {
            let Some(scancode) = self.poll_scancode() else {
                core::hint::spin_loop();
                continue;
            };
            if let Ok(Some(event)) = self.decoder.add_byte(scancode) {
                if let Some(key) = self.decoder.process_keyevent(event) {
                    if let Some(mapped) = Self::map_key(key) {
                        return mapped;
                    }
                }
            }
        }
    }
}
