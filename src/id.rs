//! PCI vendor and device IDs
//!
//! IDs are given in hexadecimal, as printed by `lspci -nn`.
//! The vendor names are only used to annotate output, see
//! <https://pcisig.com/membership/member-companies> for the full registry.

use phf::phf_map;

use crate::error::IdError;

/// Parse a 16-bit PCI ID from hex text, with or without a `0x` prefix.
pub fn parse_id(text: &str) -> Result<u16, IdError> {
    let t = text.trim();
    let digits = t
        .strip_prefix("0x")
        .or_else(|| t.strip_prefix("0X"))
        .unwrap_or(t);
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_hexdigit()) {
        return Err(IdError::Malformed(text.to_string()));
    }
    // Leading zeros do not count towards the width.
    let significant = digits.trim_start_matches('0');
    if significant.len() > 4 {
        let value = u64::from_str_radix(significant, 16).unwrap_or(u64::MAX);
        return Err(IdError::ValueOutOfRange(value));
    }
    u16::from_str_radix(digits, 16).map_err(|_| IdError::Malformed(text.to_string()))
}

static VENDORS: phf::Map<u16, &'static str> = phf_map! {
    0x1002u16 => "AMD/ATI",
    0x1022u16 => "AMD",
    0x102bu16 => "Matrox",
    0x10deu16 => "NVIDIA",
    0x10ecu16 => "Realtek",
    0x1234u16 => "QEMU",
    0x14e4u16 => "Broadcom",
    0x15adu16 => "VMware",
    0x15b3u16 => "Mellanox",
    0x1af4u16 => "Red Hat",
    0x1b36u16 => "Red Hat (QEMU)",
    0x1d0fu16 => "Amazon",
    0x8086u16 => "Intel",
};

pub fn vendor_name(vendor_id: u16) -> Option<&'static str> {
    VENDORS.get(&vendor_id).copied()
}

#[test]
fn parse_plain_and_prefixed() {
    assert_eq!(parse_id("8086"), Ok(0x8086));
    assert_eq!(parse_id("0x8086"), Ok(0x8086));
    assert_eq!(parse_id("0X1af4"), Ok(0x1af4));
    assert_eq!(parse_id(" ffff "), Ok(0xffff));
    assert_eq!(parse_id("0"), Ok(0));
    assert_eq!(parse_id("0000abcd"), Ok(0xabcd));
}

#[test]
fn parse_out_of_range() {
    assert_eq!(parse_id("0x10000"), Err(IdError::ValueOutOfRange(0x10000)));
    assert_eq!(
        parse_id("ffffffffffffffffff"),
        Err(IdError::ValueOutOfRange(u64::MAX))
    );
}

#[test]
fn parse_malformed() {
    assert!(matches!(parse_id(""), Err(IdError::Malformed(_))));
    assert!(matches!(parse_id("0x"), Err(IdError::Malformed(_))));
    assert!(matches!(parse_id("intel"), Err(IdError::Malformed(_))));
    assert!(matches!(parse_id("-1"), Err(IdError::Malformed(_))));
}

#[test]
fn known_vendors() {
    assert_eq!(vendor_name(0x8086), Some("Intel"));
    assert_eq!(vendor_name(0xdead), None);
}
