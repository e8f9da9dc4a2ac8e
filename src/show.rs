use log::{error, info};

use efi_optrom::OptionRom;

pub fn show(rom: &OptionRom, data: &[u8], verbose: bool) {
    if verbose {
        println!("{rom:#02x?}");
    }
    println!("{rom}");
    let image = rom.image(data);
    let o = rom.header.efi_image_header_offset.get();
    let l = image.len();
    println!("EFI image @ 0x{o:04x}: 0x{l:08x} bytes incl. padding");
    if let Some(sig) = image.get(..2) {
        println!("  First bytes:      {sig:02x?}");
    }
}

/// Returns whether the ROM passed all checks.
pub fn check(rom: &OptionRom) -> bool {
    let problems = rom.check();
    for p in &problems {
        error!("{p}");
    }
    if problems.is_empty() {
        info!("No problems found");
    }
    problems.is_empty()
}
