//! Tool to build PCI option ROMs from UEFI drivers
//!
//! Platform firmware scans PCI expansion ROMs for images with a matching
//! vendor and device ID and loads EFI drivers found therein. This tool puts
//! the headers in front of a driver so that it can be loaded like that,
//! e.g. through QEMU's `romfile` option or by flashing it to a device.

use std::{
    fs,
    path::{Path, PathBuf},
    process::ExitCode,
};

use clap::{Parser, Subcommand};
use log::{debug, error, info};

mod show;

use efi_optrom::{
    OptionRom, RomBuilder,
    id::{parse_id, vendor_name},
};

#[derive(Subcommand, Debug)]
enum Command {
    /// Wrap a DXE driver into an option ROM
    Build {
        /// PCI vendor ID (hex)
        #[clap(long, short, value_parser = parse_id)]
        vendor: u16,
        /// PCI device ID (hex)
        #[clap(long, short, value_parser = parse_id)]
        device: u16,
        /// DXE driver to embed
        #[clap(long, short)]
        input: PathBuf,
        /// File to write the ROM to
        #[clap(long, short)]
        output: PathBuf,
    },
    /// Display the headers of an option ROM
    Show {
        /// File to read
        file_name: PathBuf,
    },
    /// Check an option ROM for consistency
    Check {
        /// File to read
        file_name: PathBuf,
    },
}

/// Build and inspect PCI option ROMs
#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Command to run
    #[command(subcommand)]
    cmd: Command,
    #[clap(long, action)]
    verbose: bool,
}

fn read_rom(file_name: &Path) -> Option<(OptionRom, Vec<u8>)> {
    let f = file_name.display();
    info!("Reading {f}...");
    let data = match fs::read(file_name) {
        Ok(d) => d,
        Err(e) => {
            error!("Cannot read {f}: {e}");
            return None;
        }
    };
    match OptionRom::parse(&data) {
        Ok(rom) => Some((rom, data)),
        Err(e) => {
            error!("{f} is not an EFI option ROM: {e}");
            None
        }
    }
}

fn main() -> ExitCode {
    // Default to log level "info". Otherwise, you get no "regular" logs.
    let env = env_logger::Env::default().default_filter_or("info");
    env_logger::Builder::from_env(env).init();

    let Cli { cmd, verbose } = Cli::parse();
    match cmd {
        Command::Build {
            vendor,
            device,
            input,
            output,
        } => {
            if let Some(n) = vendor_name(vendor) {
                debug!("Vendor {vendor:04x} is {n}");
            }
            match RomBuilder::new(vendor, device).build_file(&input, &output) {
                Ok(layout) => {
                    let s = layout.sectors;
                    info!("Done, {} has {s} sectors", output.display());
                    ExitCode::SUCCESS
                }
                Err(e) => {
                    error!("{e}");
                    ExitCode::FAILURE
                }
            }
        }
        Command::Show { file_name } => match read_rom(&file_name) {
            Some((rom, data)) => {
                show::show(&rom, &data, verbose);
                ExitCode::SUCCESS
            }
            None => ExitCode::FAILURE,
        },
        Command::Check { file_name } => match read_rom(&file_name) {
            Some((rom, _)) if show::check(&rom) => ExitCode::SUCCESS,
            _ => ExitCode::FAILURE,
        },
    }
}
