// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

pub const SCHEMA_VERSION: &str = "1.0";

/// Default schema version for YAML configs
fn default_schema_version() -> String {
    SCHEMA_VERSION.to_string()
}

fn default_region_size() -> String {
    "4KiB".to_string()
}

fn default_max_request_sectors() -> u32 {
    64
}

fn default_handshake_spins() -> u64 {
    1_000_000
}

/// Where the FPGA control region lives in the host address space.
#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct MmioConfig {
    /// Device node (`/dev/mem`, a UIO node) or a plain file for shared-memory co-simulation.
    pub path: String,
    /// Byte offset of the region inside `path` (physical base address for `/dev/mem`).
    #[serde(default)]
    pub base: u64,
    #[serde(default = "default_region_size")]
    pub size: String, // e.g. "4KiB"
    /// Create and size `path` if it does not exist. Only meaningful for plain files.
    #[serde(default)]
    pub create: bool,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BlockConfig {
    /// Disk image backing the target's block device.
    pub image: String,
    /// Create the image with this size when it is missing, e.g. "64MB".
    #[serde(default)]
    pub create_size: Option<String>,
    #[serde(default = "default_max_request_sectors")]
    pub max_request_sectors: u32,
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    /// MAC address handed to the target, `aa:bb:cc:dd:ee:ff`.
    pub mac: String,
    /// Local UDP address inbound frames arrive on.
    pub bind: String,
    /// UDP address outbound frames are sent to.
    pub peer: String,
}

impl NetworkConfig {
    pub fn mac_bytes(&self) -> Result<[u8; 6]> {
        parse_mac(&self.mac)
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BridgeLimits {
    /// Upper bound on register polls while waiting for one handshake flag.
    #[serde(default = "default_handshake_spins")]
    pub handshake_spins: u64,
    /// Sleep between ticks that did no work. 0 means busy polling.
    #[serde(default)]
    pub idle_sleep_us: u64,
    #[serde(default)]
    pub max_ticks: Option<u64>,
}

impl Default for BridgeLimits {
    fn default() -> Self {
        Self {
            handshake_spins: default_handshake_spins(),
            idle_sleep_us: 0,
            max_ticks: None,
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
#[serde(deny_unknown_fields)]
pub struct BridgeConfig {
    #[serde(default = "default_schema_version")]
    pub schema_version: String,
    pub mmio: MmioConfig,
    pub block: BlockConfig,
    #[serde(default)]
    pub network: Option<NetworkConfig>,
    /// Register slot name -> byte offset, overriding the default layout.
    #[serde(default)]
    pub registers: BTreeMap<String, u64>,
    #[serde(default)]
    pub limits: BridgeLimits,
}

impl BridgeConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read bridge config at {:?}", path))?;
        let config = Self::from_yaml(&content)
            .with_context(|| format!("Invalid bridge config {:?}", path))?;
        tracing::debug!("Loaded bridge config from {:?}", path);
        Ok(config)
    }

    pub fn from_yaml(yaml: &str) -> Result<Self> {
        let config: Self =
            serde_yaml::from_str(yaml).context("Failed to parse Bridge Config YAML")?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.schema_version != SCHEMA_VERSION {
            bail!(
                "Unsupported schema_version '{}' (expected \"{}\")",
                self.schema_version,
                SCHEMA_VERSION
            );
        }

        if self.mmio.path.trim().is_empty() {
            bail!("mmio.path must not be empty");
        }
        if self.region_size()? == 0 {
            bail!("mmio.size must be greater than zero");
        }

        if self.block.image.trim().is_empty() {
            bail!("block.image must not be empty");
        }
        if self.block.max_request_sectors == 0 {
            bail!("block.max_request_sectors must be greater than zero");
        }
        if let Some(size) = &self.block.create_size {
            if parse_size(size)? == 0 {
                bail!("block.create_size must be greater than zero");
            }
        }

        if let Some(net) = &self.network {
            net.mac_bytes()
                .with_context(|| format!("network.mac '{}' is not a MAC address", net.mac))?;
        }

        if self.limits.handshake_spins == 0 {
            bail!("limits.handshake_spins must be greater than zero");
        }

        Ok(())
    }

    pub fn region_size(&self) -> Result<u64> {
        parse_size(&self.mmio.size)
    }
}

pub fn parse_size(size_str: &str) -> Result<u64> {
    use human_size::{Byte, Size, SpecificSize};
    let s: Size = size_str
        .parse()
        .map_err(|e| anyhow::anyhow!("Invalid size format: {}", e))?;
    let bytes: SpecificSize<Byte> = s.into();
    Ok(bytes.value() as u64)
}

/// Parses `aa:bb:cc:dd:ee:ff`, or the same with `-` used throughout.
pub fn parse_mac(s: &str) -> Result<[u8; 6]> {
    let s = s.trim();
    let sep = if s.contains(':') { ':' } else { '-' };
    if s.contains(':') && s.contains('-') {
        bail!("octets must all use the same separator");
    }
    let parts: Vec<&str> = s.split(sep).collect();
    if parts.len() != 6 {
        bail!("expected 6 octets, found {}", parts.len());
    }
    let mut mac = [0u8; 6];
    for (byte, part) in mac.iter_mut().zip(parts) {
        // from_str_radix alone would take a sign.
        if part.len() != 2 || !part.bytes().all(|b| b.is_ascii_hexdigit()) {
            bail!("octet '{}' must be two hex digits", part);
        }
        *byte = u8::from_str_radix(part, 16)
            .with_context(|| format!("octet '{}' is not hexadecimal", part))?;
    }
    Ok(mac)
}
