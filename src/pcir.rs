//! PCI Data Structure (PCIR)
//!
//! See the PCI Firmware Specification 3.0, section 5.1.2.
//! The structure identifies the device a ROM image belongs to and describes
//! the image: its length, code type, and whether more images follow.

use core::fmt::{self, Display};

use bitfield_struct::bitfield;
use strum::{Display as StrDisplay, FromRepr};
use zerocopy::little_endian::{U16, U32};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes};

use crate::{SECTOR_SIZE, describe, id::vendor_name};

// NOTE: This is the LE representation.
pub const PCIR_SIGNATURE: u32 = u32::from_le_bytes(*b"PCIR");
pub const PCIR_MAGIC_BYTES: &[u8] = b"PCIR";

/// PCI Data Structure revision for PCI Firmware Specification 3.0
pub const REVISION_3_0: u8 = 3;

#[derive(StrDisplay, FromRepr, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u8)]
pub enum CodeType {
    #[strum(to_string = "PC-AT compatible")]
    PcAt = 0x00,
    #[strum(to_string = "Open Firmware")]
    OpenFirmware = 0x01,
    #[strum(to_string = "Hewlett-Packard PA RISC")]
    PaRisc = 0x02,
    #[strum(to_string = "EFI image")]
    Efi = 0x03,
}

#[bitfield(u8)]
#[derive(Immutable, IntoBytes, FromBytes, PartialEq, Eq)]
pub struct Indicator {
    #[bits(7)]
    _0: u8,
    /// No further images follow in this ROM
    pub last_image: bool,
}

#[derive(Immutable, IntoBytes, FromBytes, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct Pcir {
    pub signature: U32,
    pub vendor_id: U16,
    pub device_id: U16,
    pub device_list_offset: U16,
    pub length: U16,
    pub revision: u8,
    pub class_code: [u8; 3],
    /// Size of this image in units of 512 bytes
    pub image_length: U16,
    pub code_revision: U16,
    pub code_type: u8,
    pub indicator: Indicator,
    pub max_runtime_image_length: U16,
    pub config_utility_code_header_offset: U16,
    pub dmtfclp_entry_point_offset: U16,
}

pub const PCIR_SIZE: usize = size_of::<Pcir>();

const _: () = assert!(PCIR_SIZE == 0x1c);

impl Pcir {
    /// Data structure for a single EFI image, which is thus the last one.
    pub fn new(vendor_id: u16, device_id: u16, image_length: u16) -> Self {
        Self {
            signature: U32::new(PCIR_SIGNATURE),
            vendor_id: U16::new(vendor_id),
            device_id: U16::new(device_id),
            device_list_offset: U16::ZERO,
            length: U16::new(PCIR_SIZE as u16),
            revision: REVISION_3_0,
            class_code: [0; 3],
            image_length: U16::new(image_length),
            code_revision: U16::ZERO,
            code_type: CodeType::Efi as u8,
            indicator: Indicator::new().with_last_image(true),
            max_runtime_image_length: U16::ZERO,
            config_utility_code_header_offset: U16::ZERO,
            dmtfclp_entry_point_offset: U16::ZERO,
        }
    }

    pub fn code_type(&self) -> Option<CodeType> {
        CodeType::from_repr(self.code_type)
    }

    pub fn image_size(&self) -> usize {
        self.image_length.get() as usize * SECTOR_SIZE
    }
}

fn vendor(id: u16) -> String {
    match vendor_name(id) {
        Some(n) => format!("{id:04x} ({n})"),
        None => format!("{id:04x}"),
    }
}

impl Display for Pcir {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let vi = format!("  Vendor:           {}", vendor(self.vendor_id.get()));
        let di = format!("  Device:           {:04x}", self.device_id.get());
        let ln = format!("  Length:           {}", self.length.get());
        let rv = format!("  Revision:         {}", self.revision);
        let cc = format!("  Class code:       {:02x?}", self.class_code);
        let il = self.image_length.get();
        let sz = self.image_size();
        let il = format!("  Image length:     {il} sectors (0x{sz:08x})");
        let ct = describe(self.code_type(), self.code_type as u16);
        let ct = format!("  Code type:        {ct}");
        let last = self.indicator.last_image();
        let li = format!("  Last image:       {last}");
        write!(f, "{vi}\n{di}\n{ln}\n{rv}\n{cc}\n{il}\n{ct}\n{li}")
    }
}

#[cfg(test)]
use zerocopy::{FromBytes, IntoBytes};

#[test]
fn pcir_layout() {
    let p = Pcir::new(0x8086, 0x1000, 2);
    let b = p.as_bytes();
    assert_eq!(b.len(), 28);
    assert_eq!(&b[0x00..0x04], PCIR_MAGIC_BYTES);
    assert_eq!(&b[0x04..0x06], &[0x86, 0x80]);
    assert_eq!(&b[0x06..0x08], &[0x00, 0x10]);
    assert_eq!(&b[0x08..0x0a], &[0, 0]);
    assert_eq!(&b[0x0a..0x0c], &[0x1c, 0x00]);
    assert_eq!(b[0x0c], 3);
    assert_eq!(&b[0x0d..0x10], &[0; 3]);
    assert_eq!(&b[0x10..0x12], &[0x02, 0x00]);
    assert_eq!(&b[0x12..0x14], &[0, 0]);
    assert_eq!(b[0x14], 0x03);
    assert_eq!(b[0x15], 0x80);
    assert_eq!(&b[0x16..0x1c], &[0; 6]);
}

#[test]
fn indicator_bits() {
    assert_eq!(Indicator::new().with_last_image(true).into_bits(), 0x80);
    assert!(!Indicator::from_bits(0x7f).last_image());
}

#[test]
fn pcir_read_back() {
    let p = Pcir::new(0x1af4, 0x1050, 0x40);
    let (parsed, _) = Pcir::read_from_prefix(p.as_bytes()).unwrap();
    assert_eq!(parsed, p);
    assert_eq!(parsed.code_type(), Some(CodeType::Efi));
    assert_eq!(parsed.image_size(), 0x8000);
    assert!(parsed.to_string().contains("1af4 (Red Hat)"));
}
