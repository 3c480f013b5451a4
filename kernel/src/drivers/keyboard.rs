//! Key-source interface of the PS/2 keyboard
//!
//! The console's line editor and the `getc` service consume decoded
//! key codes; control keys use the code points below. Scancode
//! decoding itself happens in the bare-metal driver
//! (`arch::x86::ps2`).

/// Key codes for non-printing keys (printable keys are their ASCII)
pub mod keys {
    pub const RETURN: u8 = 0x0D;
    pub const ESCAPE: u8 = 0x1B;
    pub const BACKSPACE: u8 = 0x08;
    pub const TAB: u8 = 0x09;
    pub const UP: u8 = 0x1C;
    pub const DOWN: u8 = 0x1D;
    pub const LEFT: u8 = 0x1E;
    pub const RIGHT: u8 = 0x1F;
}

/// Blocking source of decoded key codes
pub trait KeySource {
    /// Wait for and return the next key
    fn getc(&mut self) -> u8;
}

/// A key source that replays a fixed script. Test support only.
#[cfg(not(target_os = "none"))]
pub mod testing {
    extern crate alloc;
    use alloc::collections::VecDeque;

    use super::KeySource;

    /// Replays bytes; panics if the console reads past the script,
    /// which in a test means the shell failed to stop at `shutdown`.
    pub struct ScriptedKeys {
        script: VecDeque<u8>,
    }

    impl ScriptedKeys {
        pub fn new(script: &[u8]) -> Self {
            Self {
                script: script.iter().copied().collect(),
            }
        }

        /// Convenience: a script typing `line`, then Return
        pub fn typing(line: &str) -> Self {
            let mut script: alloc::vec::Vec<u8> = line.bytes().collect();
            script.push(super::keys::RETURN);
            Self::new(&script)
        }
    }

    impl KeySource for ScriptedKeys {
        fn getc(&mut self) -> u8 {
            self.script.pop_front().expect("scripted keys exhausted")
        }
    }
}
