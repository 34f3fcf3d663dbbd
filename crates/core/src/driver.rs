// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use crate::block::{self, BlockBackend, BlockData, BlockRequest, Direction, SECTOR_SIZE};
use crate::host::TargetHost;
use crate::metrics::DriverStats;
use crate::net::{self, MacAddress, NetworkSink, NetworkSource};
use crate::regs::{RegisterMap, Slot};
use crate::transport::RegisterTransport;
use crate::{BridgeError, BridgeResult, ProtocolError};
use fabriclink_config::BridgeConfig;
use serde::Serialize;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DriverLimits {
    /// Register polls spent on a single handshake flag before giving up.
    pub handshake_spins: u64,
    /// Largest request, in sectors, the target may issue.
    pub max_request_sectors: u32,
}

impl Default for DriverLimits {
    fn default() -> Self {
        Self {
            handshake_spins: 1_000_000,
            max_request_sectors: 64,
        }
    }
}

impl DriverLimits {
    pub fn from_config(config: &BridgeConfig) -> Self {
        Self {
            handshake_spins: config.limits.handshake_spins,
            max_request_sectors: config.block.max_request_sectors,
        }
    }
}

/// What a single tick got done.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TickReport {
    pub block: Option<BlockRequest>,
    pub flit_out: bool,
    pub flit_in: bool,
}

impl TickReport {
    pub fn is_idle(&self) -> bool {
        self.block.is_none() && !self.flit_out && !self.flit_in
    }
}

struct NetPort {
    sink: Box<dyn NetworkSink + Send>,
    source: Box<dyn NetworkSource + Send>,
    mac: MacAddress,
}

/// Services the target's block and network requests through the register
/// interface, one unit of work per subsystem per tick.
///
/// The driver owns the register region, the target-host interface and the
/// block backend for the whole session; they are released together.
pub struct Driver<R: RegisterTransport, H: TargetHost, B: BlockBackend> {
    regs: R,
    map: RegisterMap,
    host: H,
    backend: B,
    net: Option<NetPort>,
    limits: DriverLimits,
    nsectors: u64,
    enabled: bool,
    stats: DriverStats,
}

impl<R: RegisterTransport, H: TargetHost, B: BlockBackend> Driver<R, H, B> {
    /// Validates `map` against the region and publishes the block device
    /// geometry to the target.
    pub fn new(
        mut regs: R,
        map: RegisterMap,
        host: H,
        backend: B,
        limits: DriverLimits,
    ) -> BridgeResult<Self> {
        map.validate(regs.size())?;
        if limits.handshake_spins == 0 || limits.max_request_sectors == 0 {
            return Err(BridgeError::RegisterMap(
                "handshake_spins and max_request_sectors must be non-zero".to_string(),
            ));
        }

        let nsectors = backend.nsectors();
        block::write_geometry(&mut regs, &map, nsectors, limits.max_request_sectors)?;
        info!(
            "Block device: {} sectors of {} bytes, max request {} sectors",
            nsectors, SECTOR_SIZE, limits.max_request_sectors
        );

        Ok(Self {
            regs,
            map,
            host,
            backend,
            net: None,
            limits,
            nsectors,
            enabled: true,
            stats: DriverStats::new(),
        })
    }

    /// Hands the target its MAC address and starts forwarding flits.
    /// The MAC registers are write-once, so this may only happen once.
    pub fn attach_network(
        &mut self,
        sink: Box<dyn NetworkSink + Send>,
        source: Box<dyn NetworkSource + Send>,
        mac: MacAddress,
    ) -> BridgeResult<()> {
        if self.net.is_some() {
            return Err(BridgeError::NetworkAlreadyAttached);
        }
        net::write_mac_address(&mut self.regs, &self.map, mac)?;
        info!("Network attached, MAC {}", mac);
        self.net = Some(NetPort { sink, source, mac });
        Ok(())
    }

    /// Runs one poll iteration: target-host step, block service, outbound
    /// flit, inbound flit, in that order. Any error ends the session.
    pub fn tick(&mut self) -> BridgeResult<TickReport> {
        if !self.enabled {
            return Err(BridgeError::Terminated);
        }
        let result = self.poll_once();
        if let Err(e) = &result {
            warn!("Session terminated: {}", e);
            self.enabled = false;
        }
        result
    }

    fn poll_once(&mut self) -> BridgeResult<TickReport> {
        self.stats.ticks += 1;
        self.host.step();

        let mut report = TickReport::default();

        if let Some(req) = block::try_read_request(&mut self.regs, &self.map)? {
            self.serve_request(&req)?;
            report.block = Some(req);
        }

        if let Some(port) = self.net.as_mut() {
            if let Some(flit) = net::try_read_outbound_flit(&mut self.regs, &self.map)? {
                debug!("Flit out: {} bytes, more={}", flit.payload().len(), flit.more);
                port.sink.send(flit).map_err(BridgeError::Network)?;
                self.stats.flits_out += 1;
                report.flit_out = true;
            }

            if net::inbound_ready(&self.regs, &self.map)? {
                if let Some(flit) = port.source.next_flit().map_err(BridgeError::Network)? {
                    debug!("Flit in: {} bytes, more={}", flit.payload().len(), flit.more);
                    net::write_inbound_flit(&mut self.regs, &self.map, &flit)?;
                    self.stats.flits_in += 1;
                    report.flit_in = true;
                }
            }
        }

        Ok(report)
    }

    fn serve_request(&mut self, req: &BlockRequest) -> BridgeResult<()> {
        if req.len > self.limits.max_request_sectors {
            return Err(ProtocolError::RequestTooLong {
                tag: req.tag,
                len: req.len,
                max: self.limits.max_request_sectors,
            }
            .into());
        }
        let in_range = req
            .sector
            .checked_add(req.len as u64)
            .is_some_and(|end| end <= self.nsectors);
        if !in_range {
            return Err(ProtocolError::SectorOutOfRange {
                tag: req.tag,
                sector: req.sector,
                len: req.len,
                nsectors: self.nsectors,
            }
            .into());
        }

        debug!(
            "Block {:?} tag={} sector={} len={}",
            req.direction, req.tag, req.sector, req.len
        );
        match req.direction {
            Direction::Read => self.serve_read(req)?,
            Direction::Write => self.serve_write(req)?,
        }

        let cpl_valid = self.map.blk_cpl_valid;
        self.wait_clear(cpl_valid)?;
        block::write_completion(&mut self.regs, &self.map, req.tag)
    }

    fn serve_read(&mut self, req: &BlockRequest) -> BridgeResult<()> {
        self.stats.block_reads += 1;
        if req.len == 0 {
            return Ok(());
        }

        let data = self
            .backend
            .read(req.sector, req.len)
            .map_err(|source| BridgeError::Backend {
                sector: req.sector,
                source,
            })?;
        if data.len() != req.byte_len() {
            return Err(BridgeError::ShortTransfer {
                sector: req.sector,
                expected: req.byte_len(),
                actual: data.len(),
            });
        }

        let resp_valid = self.map.blk_resp_valid;
        for (seq, chunk) in data.chunks(SECTOR_SIZE).enumerate() {
            self.wait_clear(resp_valid)?;
            let chunk = BlockData {
                tag: req.tag,
                seq: seq as u32,
                data: chunk.to_vec(),
            };
            block::write_response(&mut self.regs, &self.map, &chunk)?;
        }
        self.stats.sectors_read += req.len as u64;
        Ok(())
    }

    fn serve_write(&mut self, req: &BlockRequest) -> BridgeResult<()> {
        self.stats.block_writes += 1;
        if req.len == 0 {
            return Ok(());
        }

        let data_valid = self.map.blk_data_valid;
        let mut payload = Vec::with_capacity(req.byte_len());
        for seq in 0..req.len {
            let chunk = self.spin(data_valid, |regs, map| block::try_read_data(regs, map))?;
            if chunk.tag != req.tag || chunk.seq != seq {
                return Err(ProtocolError::ChunkMismatch {
                    tag: chunk.tag,
                    seq: chunk.seq,
                    expected_tag: req.tag,
                    expected_seq: seq,
                }
                .into());
            }
            payload.extend_from_slice(&chunk.data);
        }

        self.backend
            .write(req.sector, req.len, &payload)
            .map_err(|source| BridgeError::Backend {
                sector: req.sector,
                source,
            })?;
        self.stats.sectors_written += req.len as u64;
        Ok(())
    }

    /// Waits for the target to consume whatever the host last posted at `flag`.
    fn wait_clear(&mut self, flag: Slot) -> BridgeResult<()> {
        self.spin(flag, |regs, _| Ok((!regs.read_flag(flag)?).then_some(())))
    }

    /// Polls `f` until it yields a value, at most `handshake_spins` times.
    fn spin<T>(
        &mut self,
        flag: Slot,
        mut f: impl FnMut(&mut R, &RegisterMap) -> BridgeResult<Option<T>>,
    ) -> BridgeResult<T> {
        for _ in 0..self.limits.handshake_spins {
            if let Some(value) = f(&mut self.regs, &self.map)? {
                return Ok(value);
            }
            std::hint::spin_loop();
        }
        Err(ProtocolError::HandshakeTimeout {
            register: flag.name,
            spins: self.limits.handshake_spins,
        }
        .into())
    }

    pub fn stats(&self) -> &DriverStats {
        &self.stats
    }

    pub fn map(&self) -> &RegisterMap {
        &self.map
    }

    pub fn mac(&self) -> Option<MacAddress> {
        self.net.as_ref().map(|port| port.mac)
    }

    /// False once a tick has failed.
    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn regs(&self) -> &R {
        &self.regs
    }

    /// Hook for test fixtures that play the target side of the region.
    /// Writes through it bypass the handshakes the driver relies on.
    #[doc(hidden)]
    pub fn regs_mut(&mut self) -> &mut R {
        &mut self.regs
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn host(&self) -> &H {
        &self.host
    }

    /// Ends the session, handing back the region, interface and backend.
    pub fn into_parts(self) -> (R, H, B) {
        (self.regs, self.host, self.backend)
    }
}
