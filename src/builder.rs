//! Serialize an EFI driver into a PCI option ROM
//!
//! The headers depend on the final image size, so the payload length must
//! be known before anything is written. Output is produced strictly in
//! order: headers, 0xff fill, payload, 0x00 fill.

use std::{
    fs::File,
    io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write},
    path::Path,
};

use log::{debug, info};
use zerocopy::IntoBytes;

use crate::{
    EMPTY,
    error::{Phase, RomError},
    header::RomHeader,
    layout::Layout,
    pcir::Pcir,
};

/// Measure what is left to read from `payload`, keeping its position.
pub fn payload_len<R: Seek>(payload: &mut R) -> Result<u64, RomError> {
    let measure = |r: &mut R| -> io::Result<u64> {
        let start = r.stream_position()?;
        let end = r.seek(SeekFrom::End(0))?;
        r.seek(SeekFrom::Start(start))?;
        Ok(end.saturating_sub(start))
    };
    measure(payload).map_err(RomError::PayloadLengthUnknown)
}

fn fill<W: Write>(sink: &mut W, byte: u8, count: u64) -> io::Result<()> {
    let copied = io::copy(&mut io::repeat(byte).take(count), sink)?;
    debug_assert_eq!(copied, count);
    Ok(())
}

// Read errors stay apart from write errors, so a bad input is not blamed
// on the sink.
fn copy_payload<R: Read, W: Write>(
    payload: R,
    sink: &mut W,
    len: u64,
) -> Result<u64, RomError> {
    let mut src = payload.take(len);
    let mut buf = [0u8; 0x2000];
    let mut copied = 0;
    loop {
        let n = match src.read(&mut buf) {
            Ok(0) => return Ok(copied),
            Ok(n) => n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(RomError::PayloadUnreadable(e)),
        };
        sink.write_all(&buf[..n]).map_err(Phase::Payload.failed())?;
        copied += n as u64;
    }
}

/// Open a regular file and get its length from the metadata.
fn open_input(input: &Path) -> io::Result<(File, u64)> {
    let f = File::open(input)?;
    let m = f.metadata()?;
    if !m.is_file() {
        return Err(io::Error::new(io::ErrorKind::InvalidInput, "not a regular file"));
    }
    Ok((f, m.len()))
}

#[derive(Clone, Copy, Debug)]
pub struct RomBuilder {
    pub vendor_id: u16,
    pub device_id: u16,
}

impl RomBuilder {
    pub fn new(vendor_id: u16, device_id: u16) -> Self {
        Self {
            vendor_id,
            device_id,
        }
    }

    pub fn header(&self, layout: &Layout) -> RomHeader {
        RomHeader::new(layout.sectors, layout.efi_image_offset())
    }

    pub fn pcir(&self, layout: &Layout) -> Pcir {
        Pcir::new(self.vendor_id, self.device_id, layout.sectors)
    }

    /// Write the full ROM for a payload of `layout.payload_len` bytes.
    /// The sink is flushed before returning successfully.
    pub fn write<R: Read, W: Write>(
        &self,
        layout: &Layout,
        payload: R,
        mut sink: W,
    ) -> Result<(), RomError> {
        let header = self.header(layout);
        let pcir = self.pcir(layout);

        sink.write_all(header.as_bytes())
            .and_then(|_| sink.write_all(pcir.as_bytes()))
            .map_err(Phase::Header.failed())?;
        fill(&mut sink, EMPTY, layout.header_padding()).map_err(Phase::Padding.failed())?;

        let expected = layout.payload_len;
        let copied = copy_payload(payload, &mut sink, expected)?;
        if copied != expected {
            return Err(RomError::PayloadTruncated { expected, copied });
        }

        fill(&mut sink, 0, layout.trailing_padding()).map_err(Phase::TrailingPadding.failed())?;
        sink.flush().map_err(Phase::Flush.failed())?;
        Ok(())
    }

    /// Measure the payload, then write the ROM.
    pub fn write_from<R: Read + Seek, W: Write>(
        &self,
        mut payload: R,
        sink: W,
    ) -> Result<Layout, RomError> {
        let len = payload_len(&mut payload)?;
        let layout = Layout::new(len)?;
        self.write(&layout, payload, sink)?;
        Ok(layout)
    }

    /// Build the ROM in memory.
    pub fn build(&self, payload: &[u8]) -> Result<Vec<u8>, RomError> {
        let layout = Layout::new(payload.len() as u64)?;
        let mut rom = Vec::with_capacity(layout.rom_len() as usize);
        self.write(&layout, payload, &mut rom)?;
        Ok(rom)
    }

    /// Build a ROM file from a DXE driver file.
    ///
    /// The input is measured before the output is created, so that a bad
    /// input leaves the output untouched. A partially written output is not
    /// removed on failure.
    pub fn build_file(&self, input: &Path, output: &Path) -> Result<Layout, RomError> {
        let v = self.vendor_id;
        let d = self.device_id;
        info!(
            "Building ROM for {v:04X}:{d:04X} using {} to {}",
            input.display(),
            output.display()
        );
        let unavailable = |source: io::Error| RomError::InputUnavailable {
            path: input.to_path_buf(),
            source,
        };
        let (payload, len) = open_input(input).map_err(unavailable)?;
        let layout = Layout::new(len)?;

        let out = File::create(output).map_err(|source| RomError::OutputUnavailable {
            path: output.to_path_buf(),
            source,
        })?;
        self.write(&layout, BufReader::new(payload), BufWriter::new(out))
            .map_err(|e| match e {
                RomError::PayloadUnreadable(source) => unavailable(source),
                e => e,
            })?;
        let s = layout.sectors;
        let l = layout.rom_len();
        debug!("Wrote {l} bytes ({s} sectors)");
        Ok(layout)
    }
}

#[cfg(test)]
static DXE: &[u8] = include_bytes!("../tests/dxe.efi");

// Built from tests/dxe.efi for 8086:1000 by an earlier tool, which did not
// pad the end of the image to a full sector.
#[cfg(test)]
pub(crate) static ROM_UNPADDED: &[u8] = include_bytes!("../tests/8086_1000.rom");

#[test]
fn ten_byte_payload() {
    let rom = RomBuilder::new(0x8086, 0x1000).build(&[0x42; 10]).unwrap();
    assert_eq!(rom.len(), 1024);
    assert_eq!(&rom[0..2], &[0x55, 0xaa]);
    assert_eq!(&rom[28..32], b"PCIR");
    assert!(rom[56..512].iter().all(|b| *b == EMPTY));
    assert_eq!(&rom[512..522], &[0x42; 10]);
    assert!(rom[522..].iter().all(|b| *b == 0));
}

#[test]
fn matches_reference_rom() {
    let rom = RomBuilder::new(0x8086, 0x1000).build(DXE).unwrap();
    let n = ROM_UNPADDED.len();
    assert_eq!(rom.len(), n.div_ceil(512) * 512);
    assert_eq!(&rom[..n], ROM_UNPADDED);
    assert!(rom[n..].iter().all(|b| *b == 0));
}

#[test]
fn layout_properties() {
    let b = RomBuilder::new(0x1af4, 0xffff);
    for n in [0usize, 1, 10, 455, 456, 468, 511, 512, 513, 1500, 4096] {
        let payload: Vec<u8> = (0..n).map(|i| (i % 251) as u8 + 1).collect();
        let rom = b.build(&payload).unwrap();
        assert_eq!(rom.len(), (512 + n).div_ceil(512) * 512, "payload of {n}");
        assert_eq!(rom[2..4], rom[28 + 0x10..28 + 0x12]);
        assert_eq!(u16::from_le_bytes([rom[2], rom[3]]) as usize * 512, rom.len());
        assert_eq!(&rom[0x18..0x1a], &[28, 0]);
        assert!(rom[56..512].iter().all(|b| *b == EMPTY));
        assert_eq!(&rom[512..512 + n], &payload[..]);
        assert!(rom[512 + n..].iter().all(|b| *b == 0));
    }
}

#[test]
fn write_from_seekable() {
    let mut src = io::Cursor::new(vec![0xa5u8; 700]);
    src.set_position(100);
    let mut out = Vec::new();
    let layout = RomBuilder::new(1, 2).write_from(&mut src, &mut out).unwrap();
    assert_eq!(layout.payload_len, 600);
    assert_eq!(out.len(), 1536);
    assert_eq!(&out[512..1112], &[0xa5; 600][..]);
}

#[test]
fn truncated_payload() {
    let layout = Layout::new(100).unwrap();
    let mut out = Vec::new();
    let res = RomBuilder::new(1, 2).write(&layout, &[0u8; 40][..], &mut out);
    assert!(matches!(
        res,
        Err(RomError::PayloadTruncated {
            expected: 100,
            copied: 40
        })
    ));
}

#[test]
fn sink_full() {
    let layout = Layout::new(10).unwrap();
    let b = RomBuilder::new(1, 2);

    let mut buf = [0u8; 40];
    let res = b.write(&layout, &[0u8; 10][..], &mut buf[..]);
    assert!(matches!(
        res,
        Err(RomError::WriteFailed {
            phase: Phase::Header,
            ..
        })
    ));

    let mut buf = [0u8; 100];
    let res = b.write(&layout, &[0u8; 10][..], &mut buf[..]);
    assert!(matches!(
        res,
        Err(RomError::WriteFailed {
            phase: Phase::Padding,
            ..
        })
    ));

    let mut buf = [0u8; 515];
    let res = b.write(&layout, &[0u8; 10][..], &mut buf[..]);
    assert!(matches!(
        res,
        Err(RomError::WriteFailed {
            phase: Phase::Payload,
            ..
        })
    ));

    let mut buf = [0u8; 600];
    let res = b.write(&layout, &[0u8; 10][..], &mut buf[..]);
    assert!(matches!(
        res,
        Err(RomError::WriteFailed {
            phase: Phase::TrailingPadding,
            ..
        })
    ));
}

#[test]
fn file_to_file() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("driver.efi");
    let output = dir.path().join("driver.rom");
    std::fs::write(&input, DXE).unwrap();

    let layout = RomBuilder::new(0x8086, 0x1000)
        .build_file(&input, &output)
        .unwrap();
    let rom = std::fs::read(&output).unwrap();
    assert_eq!(rom.len() as u64, layout.rom_len());
    assert_eq!(&rom[..ROM_UNPADDED.len()], ROM_UNPADDED);
}

#[test]
fn missing_input_leaves_output_alone() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("missing.efi");
    let output = dir.path().join("out.rom");

    let res = RomBuilder::new(1, 2).build_file(&input, &output);
    assert!(matches!(res, Err(RomError::InputUnavailable { .. })));
    assert!(!output.exists());
}

#[test]
fn output_in_missing_dir() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("driver.efi");
    std::fs::write(&input, [0u8; 4]).unwrap();
    let output = dir.path().join("nope").join("out.rom");

    let res = RomBuilder::new(1, 2).build_file(&input, &output);
    assert!(matches!(res, Err(RomError::OutputUnavailable { .. })));
}

#[cfg(test)]
struct Broken;

#[cfg(test)]
fn broken() -> io::Error {
    io::Error::other("broken")
}

#[cfg(test)]
impl Read for Broken {
    fn read(&mut self, _: &mut [u8]) -> io::Result<usize> {
        Err(broken())
    }
}

#[cfg(test)]
impl Seek for Broken {
    fn seek(&mut self, _: SeekFrom) -> io::Result<u64> {
        Err(broken())
    }
}

#[cfg(test)]
impl Write for Broken {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        Ok(buf.len())
    }
    fn flush(&mut self) -> io::Result<()> {
        Err(broken())
    }
}

#[test]
fn unmeasurable_payload() {
    let mut out = Vec::new();
    let res = RomBuilder::new(1, 2).write_from(Broken, &mut out);
    assert!(matches!(res, Err(RomError::PayloadLengthUnknown(_))));
    assert!(out.is_empty());
}

#[test]
fn unreadable_payload_is_not_a_write_failure() {
    let layout = Layout::new(10).unwrap();
    let mut out = Vec::new();
    let res = RomBuilder::new(1, 2).write(&layout, Broken, &mut out);
    assert!(matches!(res, Err(RomError::PayloadUnreadable(_))));
    // Headers and fill went out before the payload failed.
    assert_eq!(out.len(), 512);
}

#[test]
fn flush_fails() {
    let layout = Layout::new(10).unwrap();
    let res = RomBuilder::new(1, 2).write(&layout, &[0u8; 10][..], Broken);
    assert!(matches!(
        res,
        Err(RomError::WriteFailed {
            phase: Phase::Flush,
            ..
        })
    ));
}

#[test]
fn directory_as_input() {
    let dir = tempfile::tempdir().unwrap();
    let output = dir.path().join("out.rom");
    std::fs::write(&output, b"previous").unwrap();

    let res = RomBuilder::new(1, 2).build_file(dir.path(), &output);
    match res {
        Err(RomError::InputUnavailable { path, .. }) => assert_eq!(path, dir.path()),
        r => panic!("expected InputUnavailable, got {r:?}"),
    }
    assert_eq!(std::fs::read(&output).unwrap(), b"previous");
}
