// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

mod mmap;

pub use mmap::MmapRegion;

use crate::regs::Slot;
use crate::{BridgeError, BridgeResult, ProtocolError};

pub const WORD_BYTES: u64 = 4;

/// Word-granular access to the control region the FPGA exposes.
///
/// Implementations own the region exclusively. Offsets are byte offsets and
/// must be word aligned; anything outside the region is a configuration
/// error, not a runtime condition.
pub trait RegisterTransport {
    /// Size of the region in bytes.
    fn size(&self) -> u64;
    fn read(&self, offset: u64) -> BridgeResult<u32>;
    fn write(&mut self, offset: u64, value: u32) -> BridgeResult<()>;

    fn read_reg(&self, slot: Slot) -> BridgeResult<u32> {
        self.read(slot.offset)
    }

    fn write_reg(&mut self, slot: Slot, value: u32) -> BridgeResult<()> {
        self.write(slot.offset, value)
    }

    /// Reads a level-triggered handshake flag. Anything but 0 or 1 means the
    /// two sides disagree about the layout.
    fn read_flag(&self, slot: Slot) -> BridgeResult<bool> {
        match self.read(slot.offset)? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(ProtocolError::BadFlag {
                register: slot.name,
                value,
            }
            .into()),
        }
    }

    /// Copies `buf.len()` bytes out of a window, one little-endian word at a time.
    fn read_window(&self, slot: Slot, buf: &mut [u8]) -> BridgeResult<()> {
        check_window(slot, buf.len())?;
        for (i, chunk) in buf.chunks_mut(WORD_BYTES as usize).enumerate() {
            let word = self.read(slot.offset + i as u64 * WORD_BYTES)?.to_le_bytes();
            chunk.copy_from_slice(&word[..chunk.len()]);
        }
        Ok(())
    }

    fn write_window(&mut self, slot: Slot, data: &[u8]) -> BridgeResult<()> {
        check_window(slot, data.len())?;
        for (i, chunk) in data.chunks(WORD_BYTES as usize).enumerate() {
            let mut word = [0u8; WORD_BYTES as usize];
            word[..chunk.len()].copy_from_slice(chunk);
            self.write(
                slot.offset + i as u64 * WORD_BYTES,
                u32::from_le_bytes(word),
            )?;
        }
        Ok(())
    }
}

fn check_window(slot: Slot, len: usize) -> BridgeResult<()> {
    if len as u64 > slot.len {
        return Err(BridgeError::OutOfBounds {
            offset: slot.offset + len as u64,
            size: slot.offset + slot.len,
        });
    }
    Ok(())
}

/// Validates a single word access against a region of `size` bytes.
pub(crate) fn check_word_access(offset: u64, size: u64) -> BridgeResult<()> {
    if offset % WORD_BYTES != 0 {
        return Err(BridgeError::Misaligned(offset));
    }
    match offset.checked_add(WORD_BYTES) {
        Some(end) if end <= size => Ok(()),
        _ => Err(BridgeError::OutOfBounds { offset, size }),
    }
}

/// A control region held in host memory. Used when no FPGA is attached.
#[derive(Debug, Clone)]
pub struct MemRegion {
    words: Vec<u32>,
}

impl MemRegion {
    /// Creates a zeroed region. `size` is rounded down to whole words.
    pub fn new(size: u64) -> Self {
        Self {
            words: vec![0; (size / WORD_BYTES) as usize],
        }
    }
}

impl RegisterTransport for MemRegion {
    fn size(&self) -> u64 {
        self.words.len() as u64 * WORD_BYTES
    }

    fn read(&self, offset: u64) -> BridgeResult<u32> {
        check_word_access(offset, self.size())?;
        Ok(self.words[(offset / WORD_BYTES) as usize])
    }

    fn write(&mut self, offset: u64, value: u32) -> BridgeResult<()> {
        check_word_access(offset, self.size())?;
        self.words[(offset / WORD_BYTES) as usize] = value;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(name: &'static str, offset: u64, len: u64) -> Slot {
        Slot { name, offset, len }
    }

    #[test]
    fn test_mem_region_read_write() {
        let mut region = MemRegion::new(64);
        assert_eq!(region.size(), 64);

        region.write(0x00, 0xDEAD_BEEF).unwrap();
        region.write(0x3C, 7).unwrap(); // Last word

        assert_eq!(region.read(0x00).unwrap(), 0xDEAD_BEEF);
        assert_eq!(region.read(0x3C).unwrap(), 7);
        assert_eq!(region.read(0x04).unwrap(), 0);
    }

    #[test]
    fn test_mem_region_rejects_bad_offsets() {
        let mut region = MemRegion::new(64);

        assert!(matches!(
            region.read(0x40),
            Err(BridgeError::OutOfBounds { offset: 0x40, size: 64 })
        ));
        assert!(matches!(
            region.write(0x02, 1),
            Err(BridgeError::Misaligned(0x02))
        ));
        assert!(matches!(
            region.read(u64::MAX - 3),
            Err(BridgeError::OutOfBounds { .. })
        ));
    }

    #[test]
    fn test_read_flag_rejects_garbage() {
        let mut region = MemRegion::new(16);
        let flag = slot("test_valid", 0x4, 4);

        assert!(!region.read_flag(flag).unwrap());
        region.write(0x4, 1).unwrap();
        assert!(region.read_flag(flag).unwrap());

        region.write(0x4, 0xFFFF_FFFF).unwrap();
        match region.read_flag(flag) {
            Err(BridgeError::Protocol(ProtocolError::BadFlag { register, value })) => {
                assert_eq!(register, "test_valid");
                assert_eq!(value, 0xFFFF_FFFF);
            }
            other => panic!("expected BadFlag, got {:?}", other),
        }
    }

    #[test]
    fn test_window_is_little_endian() {
        let mut region = MemRegion::new(32);
        let window = slot("test_window", 0x10, 16);

        region.write_window(window, &[1, 2, 3, 4, 5, 6]).unwrap();
        assert_eq!(region.read(0x10).unwrap(), 0x0403_0201);
        assert_eq!(region.read(0x14).unwrap(), 0x0000_0605);

        let mut out = [0u8; 6];
        region.read_window(window, &mut out).unwrap();
        assert_eq!(out, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_window_overflow_is_rejected() {
        let mut region = MemRegion::new(64);
        let window = slot("test_window", 0x10, 8);
        assert!(region.write_window(window, &[0u8; 12]).is_err());
        // Nothing past the window may have been touched.
        assert_eq!(region.read(0x18).unwrap(), 0);
    }
}
