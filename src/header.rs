//! PCI expansion ROM header, EFI flavor
//!
//! For reference, see the PCI Firmware Specification 3.0, section 5.1,
//! and the UEFI Specification, section "EFI PCI Option ROM".
//! The legacy header starts with 0xAA55; an EFI image additionally carries
//! the EFI signature, the PE/COFF subsystem and machine type of the driver
//! and the offset of the image itself.
//!
//! | Offset | Size | Field                   |
//! | ------ | ---- | ----------------------- |
//! | 0x00   | 2    | Signature (0xAA55)      |
//! | 0x02   | 2    | Initialization size     |
//! | 0x04   | 4    | EFI signature (0x0EF1)  |
//! | 0x08   | 2    | EFI subsystem           |
//! | 0x0a   | 2    | EFI machine type        |
//! | 0x0c   | 2    | Compression type        |
//! | 0x0e   | 8    | Reserved                |
//! | 0x16   | 2    | EFI image header offset |
//! | 0x18   | 2    | PCIR offset             |
//! | 0x1a   | 2    | Alignment for the PCIR  |

use core::fmt::{self, Display};

use strum::{Display as StrDisplay, FromRepr};
use zerocopy::little_endian::{U16, U32};
use zerocopy_derive::{FromBytes, Immutable, IntoBytes};

use crate::{SECTOR_SIZE, describe};

pub const SIGNATURE: u16 = 0xaa55;
pub const EFI_SIGNATURE: u32 = 0x0ef1;

/// PE/COFF subsystem of the embedded image
#[derive(StrDisplay, FromRepr, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Subsystem {
    #[strum(to_string = "EFI application")]
    Application = 0x0a,
    #[strum(to_string = "EFI boot service driver")]
    BootServiceDriver = 0x0b,
    #[strum(to_string = "EFI runtime driver")]
    RuntimeDriver = 0x0c,
}

#[derive(StrDisplay, FromRepr, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum MachineType {
    #[strum(to_string = "IA-32")]
    Ia32 = 0x014c,
    #[strum(to_string = "Itanium")]
    Ia64 = 0x0200,
    #[strum(to_string = "EFI byte code")]
    Ebc = 0x0ebc,
    #[strum(to_string = "x86-64")]
    X64 = 0x8664,
    #[strum(to_string = "ARM")]
    Arm = 0x01c2,
    #[strum(to_string = "AArch64")]
    Aarch64 = 0xaa64,
}

#[derive(StrDisplay, FromRepr, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(u16)]
pub enum Compression {
    #[strum(to_string = "uncompressed")]
    Uncompressed = 0,
    #[strum(to_string = "EFI compressed")]
    Efi = 1,
}

#[derive(Immutable, IntoBytes, FromBytes, Clone, Copy, Debug, PartialEq, Eq)]
#[repr(C)]
pub struct RomHeader {
    pub signature: U16,
    /// Size of the whole image in units of 512 bytes
    pub initialization_size: U16,
    pub efi_signature: U32,
    pub efi_subsystem: U16,
    pub efi_machine_type: U16,
    pub efi_compression_type: U16,
    pub reserved: [u8; 8],
    pub efi_image_header_offset: U16,
    pub pcir_offset: U16,
    // The PCI data structure must be 4-byte aligned.
    pub pcir_alignment: [u8; 2],
}

pub const ROM_HEADER_SIZE: usize = size_of::<RomHeader>();

const _: () = assert!(ROM_HEADER_SIZE == 0x1c);
const _: () = assert!(ROM_HEADER_SIZE % 4 == 0);

impl RomHeader {
    /// Header for an uncompressed x86-64 boot service driver, with the PCI
    /// data structure directly following.
    pub fn new(initialization_size: u16, efi_image_header_offset: u16) -> Self {
        Self {
            signature: U16::new(SIGNATURE),
            initialization_size: U16::new(initialization_size),
            efi_signature: U32::new(EFI_SIGNATURE),
            efi_subsystem: U16::new(Subsystem::BootServiceDriver as u16),
            efi_machine_type: U16::new(MachineType::X64 as u16),
            efi_compression_type: U16::new(Compression::Uncompressed as u16),
            reserved: [0; 8],
            efi_image_header_offset: U16::new(efi_image_header_offset),
            pcir_offset: U16::new(ROM_HEADER_SIZE as u16),
            pcir_alignment: [0; 2],
        }
    }

    pub fn subsystem(&self) -> Option<Subsystem> {
        Subsystem::from_repr(self.efi_subsystem.get())
    }

    pub fn machine_type(&self) -> Option<MachineType> {
        MachineType::from_repr(self.efi_machine_type.get())
    }

    pub fn compression(&self) -> Option<Compression> {
        Compression::from_repr(self.efi_compression_type.get())
    }

    /// Image size in bytes as announced by the header
    pub fn image_size(&self) -> usize {
        self.initialization_size.get() as usize * SECTOR_SIZE
    }
}

impl Display for RomHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let sg = format!("  Signature:        {:04x}", self.signature.get());
        let is = self.initialization_size.get();
        let sz = self.image_size();
        let is = format!("  Init size:        {is} sectors (0x{sz:08x})");
        let es = format!("  EFI signature:    {:08x}", self.efi_signature.get());
        let ss = describe(self.subsystem(), self.efi_subsystem.get());
        let ss = format!("  Subsystem:        {ss}");
        let mt = describe(self.machine_type(), self.efi_machine_type.get());
        let mt = format!("  Machine type:     {mt}");
        let ct = describe(self.compression(), self.efi_compression_type.get());
        let ct = format!("  Compression:      {ct}");
        let io = format!("  EFI image offset: 0x{:04x}", self.efi_image_header_offset.get());
        let po = format!("  PCIR offset:      0x{:04x}", self.pcir_offset.get());
        write!(f, "{sg}\n{is}\n{es}\n{ss}\n{mt}\n{ct}\n{io}\n{po}")
    }
}

#[cfg(test)]
use zerocopy::{FromBytes, IntoBytes};

#[test]
fn header_layout() {
    let h = RomHeader::new(3, 0x200);
    let b = h.as_bytes();
    assert_eq!(b.len(), 28);
    assert_eq!(&b[0x00..0x02], &[0x55, 0xaa]);
    assert_eq!(&b[0x02..0x04], &[0x03, 0x00]);
    assert_eq!(&b[0x04..0x08], &[0xf1, 0x0e, 0x00, 0x00]);
    assert_eq!(&b[0x08..0x0a], &[0x0b, 0x00]);
    assert_eq!(&b[0x0a..0x0c], &[0x64, 0x86]);
    assert_eq!(&b[0x0c..0x16], &[0; 10]);
    assert_eq!(&b[0x16..0x18], &[0x00, 0x02]);
    assert_eq!(&b[0x18..0x1a], &[0x1c, 0x00]);
    assert_eq!(&b[0x1a..0x1c], &[0, 0]);
}

#[test]
fn header_read_back() {
    let h = RomHeader::new(7, 0x200);
    let (parsed, rest) = RomHeader::read_from_prefix(h.as_bytes()).unwrap();
    assert!(rest.is_empty());
    assert_eq!(parsed, h);
    assert_eq!(parsed.subsystem(), Some(Subsystem::BootServiceDriver));
    assert_eq!(parsed.machine_type(), Some(MachineType::X64));
    assert_eq!(parsed.compression(), Some(Compression::Uncompressed));
    assert_eq!(parsed.image_size(), 7 * 512);
}

#[test]
fn unknown_machine_type() {
    let mut h = RomHeader::new(1, 0x200);
    h.efi_machine_type = U16::new(0x5064);
    assert_eq!(h.machine_type(), None);
    assert!(h.to_string().contains("unknown (0x5064)"));
}
