// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::path::Path;
use tempfile::tempdir;

fn write_config(dir: &Path, extra: &str) -> std::path::PathBuf {
    let config = format!(
        "schema_version: \"1.0\"\n\
         mmio:\n  path: {regs:?}\n  size: \"4KiB\"\n  create: true\n\
         block:\n  image: {disk:?}\n  create_size: \"64KiB\"\n  max_request_sectors: 16\n\
         {extra}",
        regs = dir.join("regs.shm"),
        disk = dir.join("disk.img"),
        extra = extra,
    );
    let path = dir.join("bridge.yaml");
    fs::write(&path, config).unwrap();
    path
}

#[test]
#[allow(deprecated)]
fn test_layout_prints_default_map() -> Result<(), Box<dyn std::error::Error>> {
    let output = Command::cargo_bin("fabriclink")?.arg("layout").output()?;
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json["blk_req_valid"]["offset"], 0);
    assert_eq!(json["blk_nsectors_lo"]["offset"], 0x38);
    assert_eq!(json["blk_resp_window"]["offset"], 0x400);
    assert_eq!(json["blk_resp_window"]["len"], 512);
    Ok(())
}

#[test]
#[allow(deprecated)]
fn test_layout_applies_overrides() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = write_config(dir.path(), "registers:\n  net_mac_lo: 128\n  net_mac_hi: 132\n");

    let output = Command::cargo_bin("fabriclink")?
        .args(["layout", "--config"])
        .arg(&config)
        .output()?;
    assert!(output.status.success());

    let json: serde_json::Value = serde_json::from_slice(&output.stdout)?;
    assert_eq!(json["net_mac_lo"]["offset"], 0x80);
    assert_eq!(json["net_mac_hi"]["offset"], 0x84);
    Ok(())
}

#[test]
#[allow(deprecated)]
fn test_layout_rejects_overlap() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = write_config(dir.path(), "registers:\n  blk_req_tag: 0\n");

    Command::cargo_bin("fabriclink")?
        .args(["layout", "--config"])
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("overlaps"));
    Ok(())
}

#[test]
#[allow(deprecated)]
fn test_run_publishes_geometry() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = write_config(dir.path(), "");

    let output = Command::cargo_bin("fabriclink")?
        .args(["run", "--max-ticks", "5", "--json", "--config"])
        .arg(&config)
        .output()?;
    assert!(
        output.status.success(),
        "stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );

    let stdout = String::from_utf8_lossy(&output.stdout);
    let line = stdout
        .lines()
        .rfind(|l| l.starts_with('{'))
        .expect("no JSON report on stdout");
    let json: serde_json::Value = serde_json::from_str(line)?;
    assert_eq!(json["status"], "finished");
    assert_eq!(json["ticks"], 5);
    assert_eq!(json["block_reads"], 0);

    // 64 KiB image is 128 sectors.
    let regs = fs::read(dir.path().join("regs.shm"))?;
    assert_eq!(regs.len(), 4096);
    assert_eq!(&regs[0x38..0x3C], &128u32.to_le_bytes());
    assert_eq!(&regs[0x40..0x44], &16u32.to_le_bytes());
    assert_eq!(fs::metadata(dir.path().join("disk.img"))?.len(), 65536);
    Ok(())
}

#[test]
#[allow(deprecated)]
fn test_run_serves_staged_read() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = write_config(dir.path(), "");
    let mut disk = vec![0u8; 65536];
    disk[512..1024].fill(0xC3);
    fs::write(dir.path().join("disk.img"), &disk)?;

    // Stage a one-sector read of sector 1, tag 42, before the bridge starts.
    let mut regs = vec![0u8; 4096];
    for (offset, value) in [(0x004, 42u32), (0x008, 1), (0x010, 1), (0x014, 0), (0x000, 1)] {
        regs[offset..offset + 4].copy_from_slice(&value.to_le_bytes());
    }
    fs::write(dir.path().join("regs.shm"), &regs)?;

    Command::cargo_bin("fabriclink")?
        .args(["run", "--max-ticks", "1", "--config"])
        .arg(&config)
        .assert()
        .success();

    let regs = fs::read(dir.path().join("regs.shm"))?;
    let word = |offset: usize| u32::from_le_bytes(regs[offset..offset + 4].try_into().unwrap());
    assert_eq!(word(0x000), 0, "request not acknowledged");
    assert_eq!(word(0x024), 1);
    assert_eq!(word(0x028), 42);
    assert_eq!(word(0x030), 1);
    assert_eq!(word(0x034), 42);
    assert!(regs[0x400..0x600].iter().all(|&b| b == 0xC3));
    Ok(())
}

#[test]
#[allow(deprecated)]
fn test_run_protocol_error_exits_3() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = write_config(dir.path(), "");
    let mut regs = vec![0u8; 4096];
    // Request with direction code 5.
    regs[0x010..0x014].copy_from_slice(&1u32.to_le_bytes());
    regs[0x014..0x018].copy_from_slice(&5u32.to_le_bytes());
    regs[0x000..0x004].copy_from_slice(&1u32.to_le_bytes());
    fs::write(dir.path().join("regs.shm"), &regs)?;

    Command::cargo_bin("fabriclink")?
        .args(["run", "--max-ticks", "10", "--json", "--config"])
        .arg(&config)
        .assert()
        .code(3)
        .stdout(predicate::str::contains("\"status\":\"error\""))
        .stderr(predicate::str::contains("Invalid block direction code 5"));
    Ok(())
}

#[test]
#[allow(deprecated)]
fn test_missing_config_exits_2() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    Command::cargo_bin("fabriclink")?
        .args(["run", "--config"])
        .arg(dir.path().join("nope.yaml"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Failed to read bridge config"));
    Ok(())
}

#[test]
#[allow(deprecated)]
fn test_bad_mac_exits_2() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = write_config(
        dir.path(),
        "network:\n  mac: \"02:00:00:00:00\"\n  bind: \"127.0.0.1:0\"\n  peer: \"127.0.0.1:9\"\n",
    );
    Command::cargo_bin("fabriclink")?
        .args(["run", "--max-ticks", "1", "--config"])
        .arg(&config)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("network.mac"));
    Ok(())
}

#[test]
#[allow(deprecated)]
fn test_run_with_network_attached() -> Result<(), Box<dyn std::error::Error>> {
    let dir = tempdir()?;
    let config = write_config(
        dir.path(),
        "network:\n  mac: \"02:00:00:00:00:07\"\n  bind: \"127.0.0.1:0\"\n  peer: \"127.0.0.1:9\"\n",
    );
    Command::cargo_bin("fabriclink")?
        .args(["run", "--max-ticks", "3", "--config"])
        .arg(&config)
        .assert()
        .success();

    let regs = fs::read(dir.path().join("regs.shm"))?;
    assert_eq!(&regs[0x078..0x07C], &[0x02, 0, 0, 0]);
    assert_eq!(&regs[0x07C..0x080], &[0, 0x07, 0, 0]);
    Ok(())
}
