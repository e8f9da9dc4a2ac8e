#![doc = include_str!("../README.md")]

use core::fmt::Display;

pub mod builder;
pub mod error;
pub mod header;
pub mod id;
pub mod layout;
pub mod pcir;
pub mod rom;

pub use builder::RomBuilder;
pub use error::{IdError, ParseError, RomError};
pub use layout::Layout;
pub use rom::OptionRom;

// An empty byte in a NOR flash is all-1's.
pub const EMPTY: u8 = 0xff;

/// ROM sizes are counted in units of 512 bytes.
pub const SECTOR_SIZE: usize = 512;

/// Name a coded field if we know it, always with the raw value.
pub(crate) fn describe<T: Display>(known: Option<T>, raw: u16) -> String {
    match known {
        Some(v) => format!("{v} (0x{raw:04x})"),
        None => format!("unknown (0x{raw:04x})"),
    }
}
