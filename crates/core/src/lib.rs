// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

pub mod block;
pub mod driver;
pub mod host;
pub mod metrics;
pub mod net;
pub mod regs;
pub mod transport;

pub use block::{BlockBackend, BlockData, BlockRequest, Direction, SECTOR_SIZE};
pub use driver::{Driver, DriverLimits, TickReport};
pub use host::{Detached, TargetHost};
pub use metrics::DriverStats;
pub use net::{Flit, MacAddress, NetworkSink, NetworkSource};
pub use regs::{RegisterMap, Slot};
pub use transport::RegisterTransport;

use std::path::PathBuf;

/// The target and the host have lost sync. There is no recovery procedure for
/// any of these; the session ends.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ProtocolError {
    #[error("Flag register {register} holds {value:#x}, expected 0 or 1")]
    BadFlag { register: &'static str, value: u32 },
    #[error("Invalid block direction code {0}")]
    InvalidDirection(u32),
    #[error("Request tag {tag} asks for {len} sectors, limit is {max}")]
    RequestTooLong { tag: u32, len: u32, max: u32 },
    #[error("Request tag {tag} covers {len} sectors from {sector}, device has {nsectors}")]
    SectorOutOfRange {
        tag: u32,
        sector: u64,
        len: u32,
        nsectors: u64,
    },
    #[error("Data chunk (tag {tag}, seq {seq}) does not match expected (tag {expected_tag}, seq {expected_seq})")]
    ChunkMismatch {
        tag: u32,
        seq: u32,
        expected_tag: u32,
        expected_seq: u32,
    },
    #[error("Invalid flit control word {0:#x}")]
    InvalidFlit(u32),
    #[error("Gave up on {register} after {spins} polls")]
    HandshakeTimeout { register: &'static str, spins: u64 },
}

#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("Failed to map control region {path:?}: {source}")]
    Map {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Register access at {offset:#x} outside the {size:#x}-byte control region")]
    OutOfBounds { offset: u64, size: u64 },
    #[error("Misaligned register access at {0:#x}")]
    Misaligned(u64),
    #[error("Invalid register map: {0}")]
    RegisterMap(String),
    #[error("Network already attached, the MAC address is write-once")]
    NetworkAlreadyAttached,
    #[error("Protocol violation: {0}")]
    Protocol(#[from] ProtocolError),
    #[error("Block backend failed at sector {sector}: {source}")]
    Backend {
        sector: u64,
        #[source]
        source: std::io::Error,
    },
    #[error("Block backend returned {actual} bytes at sector {sector}, expected {expected}")]
    ShortTransfer {
        sector: u64,
        expected: usize,
        actual: usize,
    },
    #[error("Network endpoint failed: {0}")]
    Network(#[source] std::io::Error),
    #[error("Session already terminated by an earlier error")]
    Terminated,
}

pub type BridgeResult<T> = Result<T, BridgeError>;
