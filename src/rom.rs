//! Reading back EFI option ROM images
//!
//! Only the first image of a ROM is considered, and the EFI image itself
//! is not inspected.

use core::fmt::{self, Display};

use thiserror::Error;
use zerocopy::FromBytes;

use crate::{
    SECTOR_SIZE,
    error::ParseError,
    header::{EFI_SIGNATURE, ROM_HEADER_SIZE, RomHeader, SIGNATURE},
    pcir::{CodeType, PCIR_SIGNATURE, PCIR_SIZE, Pcir},
};

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OptionRom {
    pub header: RomHeader,
    pub pcir: Pcir,
    /// Length of the data the ROM was parsed from
    pub len: usize,
}

/// Violations of the layout rules for a single-image EFI ROM
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum Problem {
    #[error("init size {initialization_size} differs from image length {image_length}")]
    SizeMismatch {
        initialization_size: u16,
        image_length: u16,
    },
    #[error("image length of {sectors} sectors does not match {len} bytes of data")]
    LengthMismatch { sectors: u16, len: usize },
    #[error("PCIR offset 0x{0:04x} is not 4-byte aligned")]
    PcirMisaligned(u16),
    #[error("PCIR length is {0}, expected 28")]
    PcirLength(u16),
    #[error("EFI image offset 0x{0:04x} is not sector aligned")]
    ImageMisaligned(u16),
    #[error("code type 0x{0:02x} is not an EFI image")]
    NotEfi(u8),
    #[error("last image indicator is not set")]
    NotLastImage,
}

impl OptionRom {
    pub fn parse(data: &[u8]) -> Result<Self, ParseError> {
        let len = data.len();
        let (header, _) = RomHeader::read_from_prefix(data).map_err(|_| ParseError::TooShort {
            len,
            need: ROM_HEADER_SIZE,
        })?;
        let s = header.signature.get();
        if s != SIGNATURE {
            return Err(ParseError::BadSignature(s));
        }
        let s = header.efi_signature.get();
        if s != EFI_SIGNATURE {
            return Err(ParseError::BadEfiSignature(s));
        }

        let offset = header.pcir_offset.get() as usize;
        let Some((pcir, _)) = data.get(offset..).and_then(|d| Pcir::read_from_prefix(d).ok())
        else {
            return Err(ParseError::PcirOutOfBounds { offset, len });
        };
        if pcir.signature.get() != PCIR_SIGNATURE {
            return Err(ParseError::BadPcirSignature(pcir.signature.get().to_le_bytes()));
        }

        let offset = header.efi_image_header_offset.get() as usize;
        if offset > len {
            return Err(ParseError::ImageOutOfBounds { offset, len });
        }
        Ok(Self { header, pcir, len })
    }

    /// The EFI image including trailing padding
    pub fn image<'a>(&self, data: &'a [u8]) -> &'a [u8] {
        let o = self.header.efi_image_header_offset.get() as usize;
        &data[o.min(data.len())..]
    }

    pub fn check(&self) -> Vec<Problem> {
        let mut problems = Vec::new();
        let h = &self.header;
        let p = &self.pcir;

        let initialization_size = h.initialization_size.get();
        let image_length = p.image_length.get();
        if initialization_size != image_length {
            problems.push(Problem::SizeMismatch {
                initialization_size,
                image_length,
            });
        }
        if p.image_size() != self.len {
            problems.push(Problem::LengthMismatch {
                sectors: image_length,
                len: self.len,
            });
        }
        let o = h.pcir_offset.get();
        if o % 4 != 0 {
            problems.push(Problem::PcirMisaligned(o));
        }
        let l = p.length.get();
        if l as usize != PCIR_SIZE {
            problems.push(Problem::PcirLength(l));
        }
        let o = h.efi_image_header_offset.get();
        if o as usize % SECTOR_SIZE != 0 {
            problems.push(Problem::ImageMisaligned(o));
        }
        if p.code_type() != Some(CodeType::Efi) {
            problems.push(Problem::NotEfi(p.code_type));
        }
        if !p.indicator.last_image() {
            problems.push(Problem::NotLastImage);
        }
        problems
    }
}

impl Display for OptionRom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let h = self.header;
        let o = h.pcir_offset.get();
        let p = self.pcir;
        write!(f, "ROM header @ 0x0000:\n{h}\nPCIR @ 0x{o:04x}:\n{p}")
    }
}

#[cfg(test)]
use crate::{
    builder::{ROM_UNPADDED, RomBuilder},
    layout::Layout,
};
#[cfg(test)]
use zerocopy::little_endian::U16;

#[test]
fn round_trip() {
    let payload = [0x4d, 0x5a, 1, 2, 3];
    let rom = RomBuilder::new(0x10de, 0x2204).build(&payload).unwrap();
    let parsed = OptionRom::parse(&rom).unwrap();
    let layout = Layout::new(payload.len() as u64).unwrap();
    assert_eq!(parsed.header.initialization_size.get(), layout.sectors);
    assert_eq!(parsed.pcir.image_length.get(), layout.sectors);
    assert_eq!(parsed.pcir.vendor_id.get(), 0x10de);
    assert_eq!(parsed.pcir.device_id.get(), 0x2204);
    assert_eq!(rom.len().div_ceil(SECTOR_SIZE), layout.sectors as usize);
    assert_eq!(&parsed.image(&rom)[..5], &payload);
    assert!(parsed.check().is_empty());
}

#[test]
fn reference_rom_is_not_padded() {
    let parsed = OptionRom::parse(ROM_UNPADDED).unwrap();
    assert_eq!(
        parsed.check(),
        vec![Problem::LengthMismatch {
            sectors: 3,
            len: ROM_UNPADDED.len()
        }]
    );
}

#[test]
fn too_short() {
    assert_eq!(
        OptionRom::parse(&[0x55, 0xaa]),
        Err(ParseError::TooShort { len: 2, need: 28 })
    );
}

#[test]
fn bad_signatures() {
    let rom = RomBuilder::new(1, 2).build(&[]).unwrap();

    let mut r = rom.clone();
    r[0] = 0;
    assert_eq!(OptionRom::parse(&r), Err(ParseError::BadSignature(0xaa00)));

    let mut r = rom.clone();
    r[4] = 0;
    assert_eq!(OptionRom::parse(&r), Err(ParseError::BadEfiSignature(0x0e00)));

    let mut r = rom.clone();
    r[28..32].copy_from_slice(b"RICP");
    assert_eq!(
        OptionRom::parse(&r),
        Err(ParseError::BadPcirSignature(*b"RICP"))
    );

    assert_eq!(
        OptionRom::parse(&rom[..40]),
        Err(ParseError::PcirOutOfBounds { offset: 28, len: 40 })
    );
    assert_eq!(
        OptionRom::parse(&rom[..100]),
        Err(ParseError::ImageOutOfBounds {
            offset: 512,
            len: 100
        })
    );
}

#[test]
fn check_reports_problems() {
    let rom = RomBuilder::new(1, 2).build(&[0; 600]).unwrap();
    let mut parsed = OptionRom::parse(&rom).unwrap();
    parsed.header.initialization_size = U16::new(4);
    parsed.pcir.length = U16::new(24);
    parsed.pcir.code_type = 0;
    parsed.pcir.indicator.set_last_image(false);
    let problems = parsed.check();
    assert_eq!(
        problems,
        vec![
            Problem::SizeMismatch {
                initialization_size: 4,
                image_length: 3
            },
            Problem::PcirLength(24),
            Problem::NotEfi(0),
            Problem::NotLastImage,
        ]
    );
}
