// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use serde::Serialize;

/// Counters kept by the driver for diagnostics. They never influence the
/// protocol.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct DriverStats {
    pub ticks: u64,
    pub block_reads: u64,
    pub block_writes: u64,
    pub sectors_read: u64,
    pub sectors_written: u64,
    pub flits_out: u64,
    pub flits_in: u64,
}

impl DriverStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn block_requests(&self) -> u64 {
        self.block_reads + self.block_writes
    }
}
