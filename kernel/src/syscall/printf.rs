//! User printf rendering
//!
//! Interprets a format string living in the CALLER's address space
//! with its arguments on the caller's stack (a pointer to the first
//! 32-bit argument slot). Everything is validated and fetched through
//! the caller's page tables; rendering goes into a fixed kernel
//! buffer first so a fault halfway produces no output at all.

use core::fmt::{self, Write};

use crate::error::KernelError;
use crate::mm::{user, AddressSpace, PhysMap};

/// Longest format string a program may pass
pub const FORMAT_MAX: usize = 512;

/// Upper bound on one rendered message
pub const RENDER_MAX: usize = 1024;

/// Fixed-capacity render target; overlong output is truncated.
pub struct RenderBuf {
    buf: [u8; RENDER_MAX],
    len: usize,
}

impl RenderBuf {
    pub const fn new() -> Self {
        Self {
            buf: [0; RENDER_MAX],
            len: 0,
        }
    }

    fn push(&mut self, byte: u8) {
        if self.len < RENDER_MAX {
            self.buf[self.len] = byte;
            self.len += 1;
        }
    }

    fn push_bytes(&mut self, bytes: &[u8]) {
        for &b in bytes {
            self.push(b);
        }
    }

    pub fn bytes(&self) -> &[u8] {
        &self.buf[..self.len]
    }
}

impl Default for RenderBuf {
    fn default() -> Self {
        Self::new()
    }
}

impl Write for RenderBuf {
    fn write_str(&mut self, s: &str) -> fmt::Result {
        self.push_bytes(s.as_bytes());
        Ok(())
    }
}

/// Render the caller's format string and arguments into `out`.
///
/// Specifiers: `%d` `%u` `%x` `%c` `%s` `%%`; anything else prints
/// literally. Each value specifier consumes one 32-bit slot at the
/// argument pointer. Any invalid pointer aborts with no partial
/// output reaching the display.
pub fn render(
    space: &AddressSpace,
    phys: &PhysMap,
    format_ptr: u32,
    args_ptr: u32,
    out: &mut RenderBuf,
) -> Result<(), KernelError> {
    let mut format = [0u8; FORMAT_MAX];
    let len = user::read_cstr(space, phys, format_ptr, &mut format)?;

    let mut argp = args_ptr;
    let mut next_arg = |argp: &mut u32| -> Result<u32, KernelError> {
        let v = user::read_u32(space, phys, *argp)?;
        *argp = argp
            .checked_add(4)
            .ok_or(KernelError::BadUserAddress { addr: *argp })?;
        Ok(v)
    };

    let mut i = 0;
    while i < len {
        let c = format[i];
        if c != b'%' {
            out.push(c);
            i += 1;
            continue;
        }
        i += 1;
        if i >= len {
            out.push(b'%');
            break;
        }
        match format[i] {
            b'd' => {
                let v = next_arg(&mut argp)? as i32;
                let _ = write!(out, "{}", v);
            }
            b'u' => {
                let v = next_arg(&mut argp)?;
                let _ = write!(out, "{}", v);
            }
            b'x' => {
                let v = next_arg(&mut argp)?;
                let _ = write!(out, "{:x}", v);
            }
            b'c' => {
                let v = next_arg(&mut argp)?;
                out.push(v as u8);
            }
            b's' => {
                let ptr = next_arg(&mut argp)?;
                let mut s = [0u8; FORMAT_MAX];
                let n = user::read_cstr(space, phys, ptr, &mut s)?;
                out.push_bytes(&s[..n]);
            }
            b'%' => out.push(b'%'),
            other => {
                out.push(b'%');
                out.push(other);
            }
        }
        i += 1;
    }
    Ok(())
}
