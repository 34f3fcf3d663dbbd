// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod backend;

pub use backend::{FileBackend, MemBackend};

use crate::regs::RegisterMap;
use crate::transport::RegisterTransport;
use crate::{BridgeResult, ProtocolError};
use serde::Serialize;
use std::io;

pub const SECTOR_SIZE: usize = 512;

/// Sector-addressable storage behind the target's block device.
pub trait BlockBackend {
    /// Capacity in sectors.
    fn nsectors(&self) -> u64;
    /// Returns `count * SECTOR_SIZE` bytes starting at `sector`.
    fn read(&mut self, sector: u64, count: u32) -> io::Result<Vec<u8>>;
    /// `data` is exactly `count * SECTOR_SIZE` bytes.
    fn write(&mut self, sector: u64, count: u32, data: &[u8]) -> io::Result<()>;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    Read,
    Write,
}

impl Direction {
    pub fn from_code(code: u32) -> Result<Self, ProtocolError> {
        match code {
            0 => Ok(Direction::Read),
            1 => Ok(Direction::Write),
            other => Err(ProtocolError::InvalidDirection(other)),
        }
    }

    pub fn code(self) -> u32 {
        match self {
            Direction::Read => 0,
            Direction::Write => 1,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct BlockRequest {
    pub tag: u32,
    pub sector: u64,
    /// Sectors.
    pub len: u32,
    pub direction: Direction,
}

impl BlockRequest {
    /// Decodes the raw request words: tag, sector lo, sector hi, length, direction.
    pub fn from_words(words: [u32; 5]) -> Result<Self, ProtocolError> {
        let [tag, sector_lo, sector_hi, len, dir] = words;
        Ok(Self {
            tag,
            sector: ((sector_hi as u64) << 32) | sector_lo as u64,
            len,
            direction: Direction::from_code(dir)?,
        })
    }

    pub fn to_words(&self) -> [u32; 5] {
        [
            self.tag,
            self.sector as u32,
            (self.sector >> 32) as u32,
            self.len,
            self.direction.code(),
        ]
    }

    pub fn byte_len(&self) -> usize {
        self.len as usize * SECTOR_SIZE
    }
}

/// One sector of payload, tagged with its request and position in the stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BlockData {
    pub tag: u32,
    pub seq: u32,
    pub data: Vec<u8>,
}

/// Takes the pending request off the register interface, if any, and
/// acknowledges it by clearing `blk_req_valid`.
pub fn try_read_request<R: RegisterTransport + ?Sized>(
    regs: &mut R,
    map: &RegisterMap,
) -> BridgeResult<Option<BlockRequest>> {
    if !regs.read_flag(map.blk_req_valid)? {
        return Ok(None);
    }
    let words = [
        regs.read_reg(map.blk_req_tag)?,
        regs.read_reg(map.blk_req_sector_lo)?,
        regs.read_reg(map.blk_req_sector_hi)?,
        regs.read_reg(map.blk_req_len)?,
        regs.read_reg(map.blk_req_dir)?,
    ];
    let request = BlockRequest::from_words(words)?;
    regs.write_reg(map.blk_req_valid, 0)?;
    Ok(Some(request))
}

/// Takes the pending write chunk, if any, and clears `blk_data_valid`.
pub fn try_read_data<R: RegisterTransport + ?Sized>(
    regs: &mut R,
    map: &RegisterMap,
) -> BridgeResult<Option<BlockData>> {
    if !regs.read_flag(map.blk_data_valid)? {
        return Ok(None);
    }
    let tag = regs.read_reg(map.blk_data_tag)?;
    let seq = regs.read_reg(map.blk_data_seq)?;
    let mut data = vec![0u8; SECTOR_SIZE];
    regs.read_window(map.blk_data_window, &mut data)?;
    regs.write_reg(map.blk_data_valid, 0)?;
    Ok(Some(BlockData { tag, seq, data }))
}

/// Publishes one read chunk. The caller must have seen `blk_resp_valid` clear.
pub fn write_response<R: RegisterTransport + ?Sized>(
    regs: &mut R,
    map: &RegisterMap,
    chunk: &BlockData,
) -> BridgeResult<()> {
    regs.write_window(map.blk_resp_window, &chunk.data)?;
    regs.write_reg(map.blk_resp_tag, chunk.tag)?;
    regs.write_reg(map.blk_resp_seq, chunk.seq)?;
    regs.write_reg(map.blk_resp_valid, 1)
}

/// Signals that request `tag` is finished. The caller must have seen
/// `blk_cpl_valid` clear.
pub fn write_completion<R: RegisterTransport + ?Sized>(
    regs: &mut R,
    map: &RegisterMap,
    tag: u32,
) -> BridgeResult<()> {
    regs.write_reg(map.blk_cpl_tag, tag)?;
    regs.write_reg(map.blk_cpl_valid, 1)
}

/// Advertises the device geometry to the target.
pub fn write_geometry<R: RegisterTransport + ?Sized>(
    regs: &mut R,
    map: &RegisterMap,
    nsectors: u64,
    max_request_len: u32,
) -> BridgeResult<()> {
    regs.write_reg(map.blk_nsectors_lo, nsectors as u32)?;
    regs.write_reg(map.blk_nsectors_hi, (nsectors >> 32) as u32)?;
    regs.write_reg(map.blk_max_req_len, max_request_len)
}
