use assert_cmd::cargo::cargo_bin_cmd;
use predicates::prelude::*;
use tempfile::tempdir;

static DXE: &[u8] = include_bytes!("dxe.efi");

#[test]
fn build_show_check() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("driver.efi");
    let output = dir.path().join("driver.rom");
    std::fs::write(&input, DXE).unwrap();

    cargo_bin_cmd!("efi_optrom")
        .args(["build", "-v", "8086", "-d", "0x1000", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .success()
        .stderr(predicate::str::contains("Building ROM for 8086:1000"));

    let rom = std::fs::read(&output).unwrap();
    assert_eq!(rom.len(), 1536);
    assert_eq!(&rom[0..2], &[0x55, 0xaa]);
    assert_eq!(&rom[512..512 + DXE.len()], DXE);

    cargo_bin_cmd!("efi_optrom")
        .arg("show")
        .arg(&output)
        .assert()
        .success()
        .stdout(predicate::str::contains("8086 (Intel)"))
        .stdout(predicate::str::contains("EFI image (0x0003)"));

    cargo_bin_cmd!("efi_optrom")
        .arg("check")
        .arg(&output)
        .assert()
        .success();
}

#[test]
fn vendor_out_of_range() {
    let dir = tempdir().unwrap();
    let input = dir.path().join("driver.efi");
    let output = dir.path().join("driver.rom");
    std::fs::write(&input, DXE).unwrap();

    cargo_bin_cmd!("efi_optrom")
        .args(["build", "-v", "0x10000", "-d", "1000", "-i"])
        .arg(&input)
        .arg("-o")
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--vendor"))
        .stderr(predicate::str::contains("does not fit in 16 bits"));
    assert!(!output.exists());
}

#[test]
fn malformed_device() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("driver.rom");

    cargo_bin_cmd!("efi_optrom")
        .args(["build", "-v", "8086", "-d", "gpu", "-i", "x.efi", "-o"])
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("--device"));
    assert!(!output.exists());
}

#[test]
fn missing_input() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("driver.rom");

    cargo_bin_cmd!("efi_optrom")
        .args(["build", "-v", "8086", "-d", "1000", "-i"])
        .arg(dir.path().join("missing.efi"))
        .arg("-o")
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("missing.efi"));
    assert!(!output.exists());
}

#[test]
fn check_unpadded_reference() {
    cargo_bin_cmd!("efi_optrom")
        .args(["check", "tests/8086_1000.rom"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("does not match 1285 bytes"));
}

#[test]
fn show_not_a_rom() {
    cargo_bin_cmd!("efi_optrom")
        .args(["show", "tests/dxe.efi"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not an EFI option ROM"));
}

#[test]
fn directory_as_input() {
    let dir = tempdir().unwrap();
    let output = dir.path().join("driver.rom");

    cargo_bin_cmd!("efi_optrom")
        .args(["build", "-v", "8086", "-d", "1000", "-i"])
        .arg(dir.path())
        .arg("-o")
        .arg(&output)
        .assert()
        .failure()
        .stderr(predicate::str::contains("cannot read input"));
    assert!(!output.exists());
}
