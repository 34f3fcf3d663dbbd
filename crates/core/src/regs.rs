// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::block::SECTOR_SIZE;
use crate::transport::WORD_BYTES;
use crate::{BridgeError, BridgeResult};
use serde::Serialize;
use std::collections::BTreeMap;

/// A named location in the control region.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Slot {
    pub name: &'static str,
    pub offset: u64,
    /// Bytes covered. One word for registers, a whole sector for data windows.
    pub len: u64,
}

const fn word(name: &'static str, offset: u64) -> Slot {
    Slot {
        name,
        offset,
        len: WORD_BYTES,
    }
}

const fn window(name: &'static str, offset: u64) -> Slot {
    Slot {
        name,
        offset,
        len: SECTOR_SIZE as u64,
    }
}

/// Layout of the control region shared with the target.
///
/// Flags named `*_valid` are set by the producer and cleared by the consumer.
/// `net_in_ready` is owned by the target. Geometry and MAC slots are written
/// by the host once per session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegisterMap {
    pub blk_req_valid: Slot,
    pub blk_req_tag: Slot,
    pub blk_req_sector_lo: Slot,
    pub blk_req_sector_hi: Slot,
    pub blk_req_len: Slot,
    pub blk_req_dir: Slot,
    pub blk_data_valid: Slot,
    pub blk_data_tag: Slot,
    pub blk_data_seq: Slot,
    pub blk_resp_valid: Slot,
    pub blk_resp_tag: Slot,
    pub blk_resp_seq: Slot,
    pub blk_cpl_valid: Slot,
    pub blk_cpl_tag: Slot,
    pub blk_nsectors_lo: Slot,
    pub blk_nsectors_hi: Slot,
    pub blk_max_req_len: Slot,

    pub net_out_valid: Slot,
    pub net_out_data_lo: Slot,
    pub net_out_data_hi: Slot,
    pub net_out_ctrl: Slot,
    pub net_in_ready: Slot,
    pub net_in_valid: Slot,
    pub net_in_data_lo: Slot,
    pub net_in_data_hi: Slot,
    pub net_in_ctrl: Slot,
    pub net_mac_lo: Slot,
    pub net_mac_hi: Slot,

    pub blk_data_window: Slot,
    pub blk_resp_window: Slot,
}

impl Default for RegisterMap {
    fn default() -> Self {
        Self {
            blk_req_valid: word("blk_req_valid", 0x000),
            blk_req_tag: word("blk_req_tag", 0x004),
            blk_req_sector_lo: word("blk_req_sector_lo", 0x008),
            blk_req_sector_hi: word("blk_req_sector_hi", 0x00C),
            blk_req_len: word("blk_req_len", 0x010),
            blk_req_dir: word("blk_req_dir", 0x014),
            blk_data_valid: word("blk_data_valid", 0x018),
            blk_data_tag: word("blk_data_tag", 0x01C),
            blk_data_seq: word("blk_data_seq", 0x020),
            blk_resp_valid: word("blk_resp_valid", 0x024),
            blk_resp_tag: word("blk_resp_tag", 0x028),
            blk_resp_seq: word("blk_resp_seq", 0x02C),
            blk_cpl_valid: word("blk_cpl_valid", 0x030),
            blk_cpl_tag: word("blk_cpl_tag", 0x034),
            blk_nsectors_lo: word("blk_nsectors_lo", 0x038),
            blk_nsectors_hi: word("blk_nsectors_hi", 0x03C),
            blk_max_req_len: word("blk_max_req_len", 0x040),

            net_out_valid: word("net_out_valid", 0x050),
            net_out_data_lo: word("net_out_data_lo", 0x054),
            net_out_data_hi: word("net_out_data_hi", 0x058),
            net_out_ctrl: word("net_out_ctrl", 0x05C),
            net_in_ready: word("net_in_ready", 0x060),
            net_in_valid: word("net_in_valid", 0x064),
            net_in_data_lo: word("net_in_data_lo", 0x068),
            net_in_data_hi: word("net_in_data_hi", 0x06C),
            net_in_ctrl: word("net_in_ctrl", 0x070),
            net_mac_lo: word("net_mac_lo", 0x078),
            net_mac_hi: word("net_mac_hi", 0x07C),

            blk_data_window: window("blk_data_window", 0x200),
            blk_resp_window: window("blk_resp_window", 0x400),
        }
    }
}

impl RegisterMap {
    /// Default layout with `overrides` (slot name -> byte offset) applied.
    pub fn with_overrides(overrides: &BTreeMap<String, u64>) -> BridgeResult<Self> {
        let mut map = Self::default();
        for (name, offset) in overrides {
            let slot = map.slot_mut(name).ok_or_else(|| {
                BridgeError::RegisterMap(format!("unknown register '{}'", name))
            })?;
            slot.offset = *offset;
        }
        Ok(map)
    }

    pub fn slots(&self) -> [Slot; 30] {
        [
            self.blk_req_valid,
            self.blk_req_tag,
            self.blk_req_sector_lo,
            self.blk_req_sector_hi,
            self.blk_req_len,
            self.blk_req_dir,
            self.blk_data_valid,
            self.blk_data_tag,
            self.blk_data_seq,
            self.blk_resp_valid,
            self.blk_resp_tag,
            self.blk_resp_seq,
            self.blk_cpl_valid,
            self.blk_cpl_tag,
            self.blk_nsectors_lo,
            self.blk_nsectors_hi,
            self.blk_max_req_len,
            self.net_out_valid,
            self.net_out_data_lo,
            self.net_out_data_hi,
            self.net_out_ctrl,
            self.net_in_ready,
            self.net_in_valid,
            self.net_in_data_lo,
            self.net_in_data_hi,
            self.net_in_ctrl,
            self.net_mac_lo,
            self.net_mac_hi,
            self.blk_data_window,
            self.blk_resp_window,
        ]
    }

    fn slot_mut(&mut self, name: &str) -> Option<&mut Slot> {
        let slot = match name {
            "blk_req_valid" => &mut self.blk_req_valid,
            "blk_req_tag" => &mut self.blk_req_tag,
            "blk_req_sector_lo" => &mut self.blk_req_sector_lo,
            "blk_req_sector_hi" => &mut self.blk_req_sector_hi,
            "blk_req_len" => &mut self.blk_req_len,
            "blk_req_dir" => &mut self.blk_req_dir,
            "blk_data_valid" => &mut self.blk_data_valid,
            "blk_data_tag" => &mut self.blk_data_tag,
            "blk_data_seq" => &mut self.blk_data_seq,
            "blk_resp_valid" => &mut self.blk_resp_valid,
            "blk_resp_tag" => &mut self.blk_resp_tag,
            "blk_resp_seq" => &mut self.blk_resp_seq,
            "blk_cpl_valid" => &mut self.blk_cpl_valid,
            "blk_cpl_tag" => &mut self.blk_cpl_tag,
            "blk_nsectors_lo" => &mut self.blk_nsectors_lo,
            "blk_nsectors_hi" => &mut self.blk_nsectors_hi,
            "blk_max_req_len" => &mut self.blk_max_req_len,
            "net_out_valid" => &mut self.net_out_valid,
            "net_out_data_lo" => &mut self.net_out_data_lo,
            "net_out_data_hi" => &mut self.net_out_data_hi,
            "net_out_ctrl" => &mut self.net_out_ctrl,
            "net_in_ready" => &mut self.net_in_ready,
            "net_in_valid" => &mut self.net_in_valid,
            "net_in_data_lo" => &mut self.net_in_data_lo,
            "net_in_data_hi" => &mut self.net_in_data_hi,
            "net_in_ctrl" => &mut self.net_in_ctrl,
            "net_mac_lo" => &mut self.net_mac_lo,
            "net_mac_hi" => &mut self.net_mac_hi,
            "blk_data_window" => &mut self.blk_data_window,
            "blk_resp_window" => &mut self.blk_resp_window,
            _ => return None,
        };
        Some(slot)
    }

    /// Checks every slot is word aligned, inside a region of `region_size`
    /// bytes, and that no two slots share a byte.
    pub fn validate(&self, region_size: u64) -> BridgeResult<()> {
        let mut slots = self.slots();
        for slot in &slots {
            if slot.offset % WORD_BYTES != 0 {
                return Err(BridgeError::RegisterMap(format!(
                    "{} at {:#x} is not word aligned",
                    slot.name, slot.offset
                )));
            }
            let end = slot.offset.checked_add(slot.len);
            if end.map_or(true, |end| end > region_size) {
                return Err(BridgeError::RegisterMap(format!(
                    "{} at {:#x} does not fit in the {:#x}-byte region",
                    slot.name, slot.offset, region_size
                )));
            }
        }

        slots.sort_by_key(|s| s.offset);
        for pair in slots.windows(2) {
            let (a, b) = (pair[0], pair[1]);
            if a.offset + a.len > b.offset {
                return Err(BridgeError::RegisterMap(format!(
                    "{} at {:#x} overlaps {} at {:#x}",
                    a.name, a.offset, b.name, b.offset
                )));
            }
        }
        Ok(())
    }

    /// Smallest region that holds every slot.
    pub fn span(&self) -> u64 {
        self.slots()
            .iter()
            .map(|s| s.offset + s.len)
            .max()
            .unwrap_or(0)
    }
}
