//! Placement of the header block, the EFI image and the padding
//!
//! ```text
//! 0x0000  ROM header
//! 0x001c  PCI data structure
//! 0x0038  0xff up to the next sector boundary
//! 0x0200  EFI image (payload)
//!   ...   0x00 up to the next sector boundary
//! ```

use log::debug;

use crate::{
    SECTOR_SIZE,
    error::RomError,
    header::ROM_HEADER_SIZE,
    pcir::PCIR_SIZE,
};

/// The PCI data structure directly follows the ROM header.
pub const PCIR_OFFSET: usize = ROM_HEADER_SIZE;
pub const HEADER_BLOCK_SIZE: usize = ROM_HEADER_SIZE + PCIR_SIZE;
/// The EFI image starts at the first sector boundary after the headers.
pub const EFI_IMAGE_OFFSET: usize = HEADER_BLOCK_SIZE.div_ceil(SECTOR_SIZE) * SECTOR_SIZE;

const _: () = assert!(PCIR_OFFSET + PCIR_SIZE == HEADER_BLOCK_SIZE);
const _: () = assert!(PCIR_OFFSET % 4 == 0);
const _: () = assert!(EFI_IMAGE_OFFSET <= u16::MAX as usize);

/// Sizes of one ROM image, derived from the payload length alone
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Layout {
    pub payload_len: u64,
    /// EFI image offset plus payload, before rounding up
    pub total_size: u64,
    pub sectors: u16,
}

impl Layout {
    pub fn new(payload_len: u64) -> Result<Self, RomError> {
        let total_size = EFI_IMAGE_OFFSET as u64 + payload_len;
        let sectors = total_size.div_ceil(SECTOR_SIZE as u64);
        let Ok(s) = u16::try_from(sectors) else {
            return Err(RomError::PayloadTooLarge {
                len: payload_len,
                sectors,
            });
        };
        debug!("Payload:          0x{payload_len:08x} bytes");
        debug!("EFI image offset: 0x{EFI_IMAGE_OFFSET:08x}");
        debug!("Total size:       0x{total_size:08x} ({s} sectors)");
        Ok(Self {
            payload_len,
            total_size,
            sectors: s,
        })
    }

    pub fn efi_image_offset(&self) -> u16 {
        EFI_IMAGE_OFFSET as u16
    }

    /// Length of the output, a whole number of sectors
    pub fn rom_len(&self) -> u64 {
        self.sectors as u64 * SECTOR_SIZE as u64
    }

    /// Number of 0xff bytes between the headers and the EFI image
    pub fn header_padding(&self) -> u64 {
        (EFI_IMAGE_OFFSET - HEADER_BLOCK_SIZE) as u64
    }

    /// Number of 0x00 bytes after the EFI image
    pub fn trailing_padding(&self) -> u64 {
        self.rom_len() - self.total_size
    }
}

#[test]
fn fixed_offsets() {
    assert_eq!(PCIR_OFFSET, 28);
    assert_eq!(HEADER_BLOCK_SIZE, 56);
    assert_eq!(EFI_IMAGE_OFFSET, 512);
}

#[test]
fn empty_payload() {
    let l = Layout::new(0).unwrap();
    assert_eq!(l.sectors, 1);
    assert_eq!(l.rom_len(), 512);
    assert_eq!(l.header_padding(), 456);
    assert_eq!(l.trailing_padding(), 0);
}

#[test]
fn small_payload() {
    let l = Layout::new(10).unwrap();
    assert_eq!(l.total_size, 522);
    assert_eq!(l.sectors, 2);
    assert_eq!(l.rom_len(), 1024);
    assert_eq!(l.trailing_padding(), 502);
}

#[test]
fn sector_aligned_payload() {
    let l = Layout::new(512).unwrap();
    assert_eq!(l.sectors, 2);
    assert_eq!(l.trailing_padding(), 0);
    let l = Layout::new(468).unwrap();
    assert_eq!(l.sectors, 2);
    assert_eq!(l.trailing_padding(), 44);
}

#[test]
fn rom_len_is_whole_sectors() {
    for n in [1, 100, 511, 513, 1000, 4096, 65_000, 1 << 20] {
        let l = Layout::new(n).unwrap();
        assert_eq!(l.rom_len() % 512, 0);
        assert_eq!(l.rom_len(), (512 + n).div_ceil(512) * 512);
        assert!(l.trailing_padding() < 512);
    }
}

#[test]
fn largest_payload() {
    let max = 0xffff * 512 - 512;
    assert_eq!(Layout::new(max).unwrap().sectors, 0xffff);
    assert!(matches!(
        Layout::new(max + 1),
        Err(RomError::PayloadTooLarge {
            sectors: 0x10000,
            ..
        })
    ));
}
