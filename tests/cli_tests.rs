use assert_cmd::prelude::*;
use sha2::Digest;
use sha2::Sha256;
use std::fs::File;
use std::io;
use std::path::Path;
use std::process::Command;
use tempfile::tempdir;

fn hash_file(path: &Path) -> Result<Vec<u8>, Box<dyn std::error::Error>> {
    let mut file = File::open(path)?;
    let mut sha256 = Sha256::new();
    io::copy(&mut file, &mut sha256)?;
    Ok(sha256.finalize().to_vec())
}

#[test]
fn deterministic_generation() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let mut hashes = vec![];

    // ensure the generation is deterministic
    for name in ["first.pcap", "second.pcap"] {
        let file_path = dir.path().join(name);
        let mut cmd = Command::cargo_bin("pcapforge")?;
        cmd.arg("random")
            .arg("-o")
            .arg(&file_path)
            .arg("-n")
            .arg("200")
            .arg("-s")
            .arg("0")
            .arg("-t")
            .arg("0");
        cmd.assert().success();
        hashes.push(hash_file(&file_path)?);
    }
    assert_eq!(hashes[0], hashes[1]);
    Ok(())
}

#[test]
fn transfer_then_inspect() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file_path = dir.path().join("transfer.pcap");

    let mut cmd = Command::cargo_bin("pcapforge")?;
    cmd.arg("transfer")
        .arg("-o")
        .arg(&file_path)
        .arg("--content")
        .arg("hello")
        .arg("--name")
        .arg("greeting.txt")
        .arg("-s")
        .arg("7")
        .arg("-t")
        .arg("2024-03-01T12:00:00Z");
    cmd.assert().success();

    let mut cmd = Command::cargo_bin("pcapforge")?;
    let output = cmd.arg("inspect").arg("-i").arg(&file_path).output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    // handshake, header, one chunk, end of file, teardown
    assert!(stdout.contains("packets:     13"));
    assert!(stdout.contains("flows:       1"));
    assert!(stdout.contains("handshakes:  1"));
    assert!(stdout.contains("inversions:  0"));
    Ok(())
}

#[test]
fn transfer_with_background() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file_path = dir.path().join("mixed.pcap");
    let content_path = dir.path().join("secret.txt");
    std::fs::write(&content_path, vec![b'x'; 2000])?;

    let mut cmd = Command::cargo_bin("pcapforge")?;
    cmd.arg("transfer")
        .arg("-o")
        .arg(&file_path)
        .arg("-f")
        .arg(&content_path)
        .arg("--background-before")
        .arg("30")
        .arg("--background-after")
        .arg("30")
        .arg("--order")
        .arg("strict")
        .arg("-s")
        .arg("3")
        .arg("-t")
        .arg("1700000000");
    cmd.assert().success();

    let mut cmd = Command::cargo_bin("pcapforge")?;
    let output = cmd.arg("inspect").arg("-i").arg(&file_path).output()?;
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout)?;
    assert!(stdout.contains("inversions:  0"));
    assert!(!stdout.contains("flows:       1\n"));
    Ok(())
}

#[test]
fn invalid_arguments() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;

    // no content to transfer
    let mut cmd = Command::cargo_bin("pcapforge")?;
    cmd.arg("transfer").arg("-o").arg(dir.path().join("a.pcap"));
    cmd.assert().failure();

    let mut cmd = Command::cargo_bin("pcapforge")?;
    cmd.arg("random")
        .arg("-o")
        .arg(dir.path().join("b.pcap"))
        .arg("-n")
        .arg("0")
        .arg("-t")
        .arg("0");
    cmd.assert().failure();
    assert!(!dir.path().join("b.pcap").exists());

    let mut cmd = Command::cargo_bin("pcapforge")?;
    cmd.arg("transfer")
        .arg("-o")
        .arg(dir.path().join("c.pcap"))
        .arg("--content")
        .arg("x")
        .arg("--client-mac")
        .arg("not-a-mac");
    cmd.assert().failure();

    let mut cmd = Command::cargo_bin("pcapforge")?;
    cmd.arg("inspect").arg("-i").arg(dir.path().join("missing.pcap"));
    cmd.assert().failure();
    Ok(())
}

#[test]
fn errors_are_reported_without_panic() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let file_path = dir.path().join("existing.pcap");
    std::fs::write(&file_path, b"previous capture")?;

    // chunks too large for an IPv4 packet
    let mut cmd = Command::cargo_bin("pcapforge")?;
    cmd.arg("transfer")
        .arg("-o")
        .arg(&file_path)
        .arg("--content")
        .arg("x")
        .arg("--chunk-size")
        .arg("70000")
        .arg("-t")
        .arg("0");
    cmd.assert().code(1);
    assert_eq!(std::fs::read(&file_path)?, b"previous capture");

    // gaps so large that the timestamps overflow
    let config_path = dir.path().join("huge.toml");
    std::fs::write(&config_path, "[random]\njitter = [1e18, 1e18]\n")?;
    let mut cmd = Command::cargo_bin("pcapforge")?;
    cmd.arg("random")
        .arg("-o")
        .arg(&file_path)
        .arg("-c")
        .arg(&config_path)
        .arg("-n")
        .arg("50")
        .arg("-s")
        .arg("0")
        .arg("-t")
        .arg("0");
    cmd.assert().code(1);
    assert_eq!(std::fs::read(&file_path)?, b"previous capture");

    // start time beyond the pcap timestamp range
    let mut cmd = Command::cargo_bin("pcapforge")?;
    cmd.arg("random")
        .arg("-o")
        .arg(&file_path)
        .arg("-t")
        .arg("1e19");
    cmd.assert().code(1);
    Ok(())
}
