//! ATA PIO disk driver
//!
//! LBA28 addressing on the primary bus, polled. The core consumes the
//! [`Disk`] trait only: one read operation where a sector count of
//! zero means 256. The real driver identifies the drive at init to
//! learn how many sectors are addressable; reads past that bound fail
//! without touching the buffer.

use bitflags::bitflags;

use super::port::PortIo;

/// Bytes per sector
pub const SECTOR_SIZE: usize = 512;

/// Largest sector count one READ SECTORS command can move
pub const MAX_SECTORS_PER_READ: usize = 256;

/// Disk status outcomes the core distinguishes
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiskError {
    /// No drive answered the IDENTIFY command
    NoDisk,
    /// Requested LBA is at or past the end of the disk
    LbaOutOfRange,
    /// LBA is valid but the run extends past the end
    SectorCountTooBig,
    /// Drive raised ERR
    Controller,
    /// Drive raised DF (drive fault)
    DriveFault,
}

bitflags! {
    /// ATA status register bits
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AtaStatus: u8 {
        /// An error occurred; send a new command to clear
        const ERR = 1 << 0;
        /// Drive has PIO data to transfer or accepts PIO data
        const DRQ = 1 << 3;
        /// Drive fault (does not set ERR)
        const DF  = 1 << 5;
        /// Clear when spun down or after an error
        const RDY = 1 << 6;
        /// Drive is preparing to send/receive; wait for it to clear
        const BSY = 1 << 7;
    }
}

/// Number of sectors a raw count byte requests (0 means 256)
pub fn sectors_requested(n_sectors: u8) -> usize {
    if n_sectors == 0 {
        MAX_SECTORS_PER_READ
    } else {
        n_sectors as usize
    }
}

/// The block-source interface the kernel core consumes
pub trait Disk {
    /// Total LBA28-addressable sectors
    fn total_sectors(&self) -> u32;

    /// Read sectors starting at `lba` into `buffer`.
    /// `n_sectors == 0` requests 256. On error the buffer is
    /// untouched.
    fn read(&mut self, lba: u32, n_sectors: u8, buffer: &mut [u8]) -> Result<(), DiskError>;
}

// Primary ATA bus register ports
const PORT_DATA: u16 = 0x1F0;
const PORT_FEATURES: u16 = 0x1F1;
const PORT_SECTOR_COUNT: u16 = 0x1F2;
const PORT_LBA_LO: u16 = 0x1F3;
const PORT_LBA_MID: u16 = 0x1F4;
const PORT_LBA_HI: u16 = 0x1F5;
const PORT_DRIVE: u16 = 0x1F6;
const PORT_COMMAND: u16 = 0x1F7;

const CMD_IDENTIFY: u8 = 0xEC;
const CMD_READ_SECTORS: u8 = 0x20;

/// Polled PIO driver over a port space
pub struct AtaPio<P: PortIo> {
    ports: P,
    total_sectors: u32,
}

impl<P: PortIo> AtaPio<P> {
    /// Identify the master drive on the primary bus and record how
    /// many sectors it exposes. A missing or failing drive yields a
    /// zero-sector disk: every read then reports out-of-range.
    pub fn init(mut ports: P) -> Self {
        let total_sectors = Self::identify(&mut ports).unwrap_or(0);
        Self {
            ports,
            total_sectors,
        }
    }

    fn identify(ports: &mut P) -> Option<u32> {
        ports.write_u8(PORT_DRIVE, 0xA0); // select master
        ports.write_u8(PORT_SECTOR_COUNT, 0);
        ports.write_u8(PORT_LBA_LO, 0);
        ports.write_u8(PORT_LBA_MID, 0);
        ports.write_u8(PORT_LBA_HI, 0);
        ports.write_u8(PORT_COMMAND, CMD_IDENTIFY);

        let mut status = AtaStatus::from_bits_truncate(ports.read_u8(PORT_COMMAND));
        if status.is_empty() {
            return None; // no drive
        }
        while status.contains(AtaStatus::BSY) {
            status = AtaStatus::from_bits_truncate(ports.read_u8(PORT_COMMAND));
        }
        loop {
            if status.contains(AtaStatus::DRQ) || status.contains(AtaStatus::ERR) {
                break;
            }
            status = AtaStatus::from_bits_truncate(ports.read_u8(PORT_COMMAND));
        }
        if status.contains(AtaStatus::ERR) {
            return None;
        }

        // 256 words of identify data; words 60:61 hold the LBA28 count
        let mut data = [0u16; 256];
        for word in data.iter_mut() {
            *word = ports.read_u16(PORT_DATA);
        }
        Some(u32::from(data[60]) | (u32::from(data[61]) << 16))
    }

    fn wait_data_ready(&mut self) -> Result<(), DiskError> {
        let mut status = AtaStatus::from_bits_truncate(self.ports.read_u8(PORT_COMMAND));
        while status.contains(AtaStatus::BSY) {
            status = AtaStatus::from_bits_truncate(self.ports.read_u8(PORT_COMMAND));
        }
        loop {
            if status.contains(AtaStatus::ERR) {
                return Err(DiskError::Controller);
            }
            if status.contains(AtaStatus::DF) {
                return Err(DiskError::DriveFault);
            }
            if status.contains(AtaStatus::DRQ) {
                return Ok(());
            }
            status = AtaStatus::from_bits_truncate(self.ports.read_u8(PORT_COMMAND));
        }
    }
}

impl<P: PortIo> Disk for AtaPio<P> {
    fn total_sectors(&self) -> u32 {
        self.total_sectors
    }

    fn read(&mut self, lba: u32, n_sectors: u8, buffer: &mut [u8]) -> Result<(), DiskError> {
        let count = sectors_requested(n_sectors);

        if lba >= self.total_sectors {
            return Err(DiskError::LbaOutOfRange);
        }
        if lba as u64 + count as u64 > u64::from(self.total_sectors) {
            return Err(DiskError::SectorCountTooBig);
        }
        assert!(buffer.len() >= count * SECTOR_SIZE, "read buffer too small");

        // LBA mode (bit 6), bits 7 and 5 always set, top LBA nibble
        self.ports
            .write_u8(PORT_DRIVE, 0xE0 | ((lba >> 24) & 0x0F) as u8);
        self.ports.write_u8(PORT_FEATURES, 0x00);
        self.ports.write_u8(PORT_SECTOR_COUNT, n_sectors);
        self.ports.write_u8(PORT_LBA_LO, lba as u8);
        self.ports.write_u8(PORT_LBA_MID, (lba >> 8) as u8);
        self.ports.write_u8(PORT_LBA_HI, (lba >> 16) as u8);
        self.ports.write_u8(PORT_COMMAND, CMD_READ_SECTORS);

        for sector in 0..count {
            self.wait_data_ready()?;
            let base = sector * SECTOR_SIZE;
            for i in 0..SECTOR_SIZE / 2 {
                let word = self.ports.read_u16(PORT_DATA);
                buffer[base + 2 * i] = word as u8;
                buffer[base + 2 * i + 1] = (word >> 8) as u8;
            }
            // 400ns settle: four status reads
            for _ in 0..4 {
                self.ports.read_u8(PORT_COMMAND);
            }
        }
        Ok(())
    }
}

/// In-memory disk image. Test support only.
#[cfg(not(target_os = "none"))]
pub mod testing {
    extern crate alloc;
    use alloc::vec::Vec;

    use super::{Disk, DiskError, SECTOR_SIZE};

    /// A disk backed by a byte vector, one sector per 512 bytes
    pub struct ImageDisk {
        image: Vec<u8>,
    }

    impl ImageDisk {
        pub fn new(image: Vec<u8>) -> Self {
            assert!(image.len() % SECTOR_SIZE == 0, "image must be whole sectors");
            Self { image }
        }

        /// A disk of `sectors` sectors where byte `i` of sector `s`
        /// is `(s + i) as u8`, handy for checking offsets.
        pub fn patterned(sectors: u32) -> Self {
            let mut image = Vec::with_capacity(sectors as usize * SECTOR_SIZE);
            for s in 0..sectors {
                for i in 0..SECTOR_SIZE {
                    image.push((s as usize + i) as u8);
                }
            }
            Self::new(image)
        }
    }

    impl Disk for ImageDisk {
        fn total_sectors(&self) -> u32 {
            (self.image.len() / SECTOR_SIZE) as u32
        }

        fn read(&mut self, lba: u32, n_sectors: u8, buffer: &mut [u8]) -> Result<(), DiskError> {
            let count = super::sectors_requested(n_sectors);
            if lba >= self.total_sectors() {
                return Err(DiskError::LbaOutOfRange);
            }
            if lba as u64 + count as u64 > u64::from(self.total_sectors()) {
                return Err(DiskError::SectorCountTooBig);
            }
            let start = lba as usize * SECTOR_SIZE;
            let len = count * SECTOR_SIZE;
            buffer[..len].copy_from_slice(&self.image[start..start + len]);
            Ok(())
        }
    }
}
