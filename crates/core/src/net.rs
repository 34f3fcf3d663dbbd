// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::regs::RegisterMap;
use crate::transport::RegisterTransport;
use crate::{BridgeResult, ProtocolError};
use std::collections::VecDeque;
use std::fmt;
use std::io;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

pub const FLIT_BYTES: usize = 8;

const KEEP_SHIFT: u32 = 8;
const FULL_KEEP: u8 = 0xFF;

bitflags::bitflags! {
    /// Flag bits of the flit control word. Bits 8..15 carry the keep mask.
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct FlitFlags: u32 {
        /// More flits of the same frame follow.
        const MORE = 1 << 0;
    }
}

/// Fixed-size unit of network payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Flit {
    pub data: [u8; FLIT_BYTES],
    /// Valid payload bytes, contiguous from byte 0.
    pub keep: u8,
    pub more: bool,
}

impl Flit {
    /// Builds a flit from up to `FLIT_BYTES` bytes. `None` for an empty or
    /// oversized chunk.
    pub fn from_payload(payload: &[u8], more: bool) -> Option<Self> {
        if payload.is_empty() || payload.len() > FLIT_BYTES {
            return None;
        }
        let mut data = [0u8; FLIT_BYTES];
        data[..payload.len()].copy_from_slice(payload);
        Some(Self {
            data,
            keep: ((1u16 << payload.len()) - 1) as u8,
            more,
        })
    }

    pub fn payload(&self) -> &[u8] {
        &self.data[..self.keep.count_ones() as usize]
    }

    /// Decodes data lo, data hi and the control word.
    pub fn from_words(lo: u32, hi: u32, ctrl: u32) -> Result<Self, ProtocolError> {
        let flags = FlitFlags::from_bits_retain(ctrl & 0xFF);
        let keep = ((ctrl >> KEEP_SHIFT) & 0xFF) as u8;
        let unknown_bits = ctrl & !(FlitFlags::all().bits() | (0xFF << KEEP_SHIFT));
        let more = flags.contains(FlitFlags::MORE);

        let contiguous = keep != 0 && ((keep as u16 + 1) & keep as u16) == 0;
        if unknown_bits != 0 || !contiguous || (more && keep != FULL_KEEP) {
            return Err(ProtocolError::InvalidFlit(ctrl));
        }

        let mut data = [0u8; FLIT_BYTES];
        data[..4].copy_from_slice(&lo.to_le_bytes());
        data[4..].copy_from_slice(&hi.to_le_bytes());
        Ok(Self { data, keep, more })
    }

    pub fn to_words(&self) -> [u32; 3] {
        let mut flags = FlitFlags::empty();
        flags.set(FlitFlags::MORE, self.more);
        [
            u32::from_le_bytes([self.data[0], self.data[1], self.data[2], self.data[3]]),
            u32::from_le_bytes([self.data[4], self.data[5], self.data[6], self.data[7]]),
            flags.bits() | ((self.keep as u32) << KEEP_SHIFT),
        ]
    }
}

/// Splits a frame into flits. Every flit but the last is full.
pub fn split_frame(frame: &[u8]) -> Vec<Flit> {
    let count = frame.len().div_ceil(FLIT_BYTES);
    frame
        .chunks(FLIT_BYTES)
        .enumerate()
        .filter_map(|(i, chunk)| Flit::from_payload(chunk, i + 1 < count))
        .collect()
}

/// Collects flits until one without the continuation flag closes the frame.
#[derive(Debug, Default)]
pub struct FrameAssembler {
    buf: Vec<u8>,
}

impl FrameAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, flit: &Flit) -> Option<Vec<u8>> {
        self.buf.extend_from_slice(flit.payload());
        if flit.more {
            None
        } else {
            Some(std::mem::take(&mut self.buf))
        }
    }

    /// Bytes of a frame still waiting for its last flit.
    pub fn pending(&self) -> usize {
        self.buf.len()
    }
}

/// 48-bit MAC address handed to the target once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MacAddress(pub [u8; 6]);

impl MacAddress {
    /// Register words: bytes 0..4 and bytes 4..6, both little endian.
    pub fn to_words(&self) -> [u32; 2] {
        let b = self.0;
        [
            u32::from_le_bytes([b[0], b[1], b[2], b[3]]),
            u32::from_le_bytes([b[4], b[5], 0, 0]),
        ]
    }
}

impl FromStr for MacAddress {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        fabriclink_config::parse_mac(value)
            .map(MacAddress)
            .map_err(|e| format!("invalid MAC address '{}': {}", value, e))
    }
}

impl fmt::Display for MacAddress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let b = self.0;
        write!(
            f,
            "{:02x}:{:02x}:{:02x}:{:02x}:{:02x}:{:02x}",
            b[0], b[1], b[2], b[3], b[4], b[5]
        )
    }
}

/// Host-side destination for flits the target emits.
pub trait NetworkSink {
    fn send(&mut self, flit: Flit) -> io::Result<()>;
}

/// Host-side origin of flits for the target. Only asked for a flit when the
/// target can take it, so nothing is ever withheld inside the driver.
pub trait NetworkSource {
    fn next_flit(&mut self) -> io::Result<Option<Flit>>;
}

/// In-memory flit FIFO, usable as either end of the link.
///
/// Clones share the same queue, so one clone can be handed to the driver
/// while the other is inspected or fed.
#[derive(Debug, Clone, Default)]
pub struct FlitQueue {
    inner: Arc<Mutex<VecDeque<Flit>>>,
}

impl FlitQueue {
    pub fn new() -> Self {
        Self::default()
    }

    // A panic in another holder leaves the queue itself intact.
    fn queue(&self) -> MutexGuard<'_, VecDeque<Flit>> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn push(&self, flit: Flit) {
        self.queue().push_back(flit);
    }

    pub fn pop(&self) -> Option<Flit> {
        self.queue().pop_front()
    }

    pub fn len(&self) -> usize {
        self.queue().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn drain(&self) -> Vec<Flit> {
        self.queue().drain(..).collect()
    }
}

impl NetworkSink for FlitQueue {
    fn send(&mut self, flit: Flit) -> io::Result<()> {
        self.push(flit);
        Ok(())
    }
}

impl NetworkSource for FlitQueue {
    fn next_flit(&mut self) -> io::Result<Option<Flit>> {
        Ok(self.pop())
    }
}

/// Takes the target's pending outbound flit, if any, and clears `net_out_valid`.
pub fn try_read_outbound_flit<R: RegisterTransport + ?Sized>(
    regs: &mut R,
    map: &RegisterMap,
) -> BridgeResult<Option<Flit>> {
    if !regs.read_flag(map.net_out_valid)? {
        return Ok(None);
    }
    let flit = Flit::from_words(
        regs.read_reg(map.net_out_data_lo)?,
        regs.read_reg(map.net_out_data_hi)?,
        regs.read_reg(map.net_out_ctrl)?,
    )?;
    regs.write_reg(map.net_out_valid, 0)?;
    Ok(Some(flit))
}

/// True when the target accepts a flit and has consumed the previous one.
pub fn inbound_ready<R: RegisterTransport + ?Sized>(
    regs: &R,
    map: &RegisterMap,
) -> BridgeResult<bool> {
    Ok(regs.read_flag(map.net_in_ready)? && !regs.read_flag(map.net_in_valid)?)
}

/// Publishes one inbound flit. The caller must have checked [`inbound_ready`].
pub fn write_inbound_flit<R: RegisterTransport + ?Sized>(
    regs: &mut R,
    map: &RegisterMap,
    flit: &Flit,
) -> BridgeResult<()> {
    let [lo, hi, ctrl] = flit.to_words();
    regs.write_reg(map.net_in_data_lo, lo)?;
    regs.write_reg(map.net_in_data_hi, hi)?;
    regs.write_reg(map.net_in_ctrl, ctrl)?;
    regs.write_reg(map.net_in_valid, 1)
}

pub fn write_mac_address<R: RegisterTransport + ?Sized>(
    regs: &mut R,
    map: &RegisterMap,
    mac: MacAddress,
) -> BridgeResult<()> {
    let [lo, hi] = mac.to_words();
    regs.write_reg(map.net_mac_lo, lo)?;
    regs.write_reg(map.net_mac_hi, hi)
}
