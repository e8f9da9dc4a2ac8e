//! Errors for building and inspecting option ROMs

use std::{io, path::PathBuf};

use strum::Display as StrDisplay;
use thiserror::Error;

/// Failure to read a PCI vendor or device ID from hexadecimal text
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum IdError {
    #[error("'{0}' is not a hexadecimal number")]
    Malformed(String),
    #[error("0x{0:x} does not fit in 16 bits")]
    ValueOutOfRange(u64),
}

/// The step of the output that was being written when the sink failed.
#[derive(StrDisplay, Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    #[strum(to_string = "header")]
    Header,
    #[strum(to_string = "padding")]
    Padding,
    #[strum(to_string = "payload")]
    Payload,
    #[strum(to_string = "trailing padding")]
    TrailingPadding,
    #[strum(to_string = "flush")]
    Flush,
}

impl Phase {
    pub(crate) fn failed(self) -> impl FnOnce(io::Error) -> RomError {
        move |source| RomError::WriteFailed {
            phase: self,
            source,
        }
    }
}

#[derive(Debug, Error)]
pub enum RomError {
    #[error("cannot read input {}: {source}", path.display())]
    InputUnavailable { path: PathBuf, source: io::Error },
    #[error("cannot create output {}: {source}", path.display())]
    OutputUnavailable { path: PathBuf, source: io::Error },
    #[error("cannot determine payload length: {0}")]
    PayloadLengthUnknown(io::Error),
    #[error("payload of {len} bytes needs {sectors} sectors, at most 65535 fit into a ROM")]
    PayloadTooLarge { len: u64, sectors: u64 },
    #[error("cannot read payload: {0}")]
    PayloadUnreadable(io::Error),
    #[error("payload ended after {copied} of {expected} bytes")]
    PayloadTruncated { expected: u64, copied: u64 },
    #[error("write failed during {phase}: {source}")]
    WriteFailed { phase: Phase, source: io::Error },
}

/// Reasons why a blob cannot be decoded as an EFI option ROM
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ParseError {
    #[error("image too short, got {len} bytes, need at least {need}")]
    TooShort { len: usize, need: usize },
    #[error("ROM signature not as expected, got {0:04x}, wanted aa55")]
    BadSignature(u16),
    #[error("EFI signature not as expected, got {0:08x}, wanted 00000ef1")]
    BadEfiSignature(u32),
    #[error("PCI data structure at {offset:04x} out of bounds for {len} bytes")]
    PcirOutOfBounds { offset: usize, len: usize },
    #[error("PCI data structure signature not as expected, got {0:02x?}")]
    BadPcirSignature([u8; 4]),
    #[error("EFI image at {offset:04x} out of bounds for {len} bytes")]
    ImageOutOfBounds { offset: usize, len: usize },
}
