//! Device collaborators
//!
//! The core consumes four narrow interfaces: a block source
//! ([`disk::Disk`]), a key source ([`keyboard::KeySource`]), a
//! character sink ([`display::TextDisplay`]) and raw port I/O
//! ([`port::PortIo`]). The bare-metal implementations live here too;
//! host tests substitute scripted doubles.

pub mod disk;
pub mod display;
pub mod keyboard;
pub mod port;
