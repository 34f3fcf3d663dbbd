// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

//! UDP network link. One datagram carries one Ethernet frame in each direction.

use anyhow::{Context, Result};
use fabriclink_core::net::{split_frame, FrameAssembler};
use fabriclink_core::{Flit, NetworkSink, NetworkSource};
use std::collections::VecDeque;
use std::io;
use std::net::{SocketAddr, ToSocketAddrs, UdpSocket};
use tracing::{debug, warn};

/// Largest datagram in either direction. The kernel truncates bigger ones.
const MAX_DATAGRAM: usize = 65535;

/// Binds `bind` and returns the two ends of the link, both sharing the socket.
pub fn open(bind: &str, peer: &str) -> Result<(UdpSink, UdpSource)> {
    let socket =
        UdpSocket::bind(bind).with_context(|| format!("Failed to bind UDP socket {}", bind))?;
    socket
        .set_nonblocking(true)
        .context("Failed to make UDP socket non-blocking")?;
    let peer = peer
        .to_socket_addrs()
        .with_context(|| format!("Invalid UDP peer address {}", peer))?
        .next()
        .with_context(|| format!("UDP peer {} did not resolve", peer))?;

    tracing::info!(
        "UDP link {} -> {}",
        socket.local_addr().context("UDP socket has no local address")?,
        peer
    );

    let sink = UdpSink {
        socket: socket.try_clone().context("Failed to clone UDP socket")?,
        peer,
        assembler: FrameAssembler::new(),
    };
    let source = UdpSource {
        socket,
        pending: VecDeque::new(),
        buf: vec![0; MAX_DATAGRAM],
    };
    Ok((sink, source))
}

/// Reassembles outbound flits and sends each complete frame to the peer.
pub struct UdpSink {
    socket: UdpSocket,
    peer: SocketAddr,
    assembler: FrameAssembler,
}

impl NetworkSink for UdpSink {
    fn send(&mut self, flit: Flit) -> io::Result<()> {
        if self.assembler.pending() + flit.payload().len() > MAX_DATAGRAM {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("outbound frame exceeds {} bytes", MAX_DATAGRAM),
            ));
        }
        let Some(frame) = self.assembler.push(&flit) else {
            return Ok(());
        };
        match self.socket.send_to(&frame, self.peer) {
            Ok(_) => {
                debug!("Sent {} byte frame to {}", frame.len(), self.peer);
                Ok(())
            }
            // Datagrams are lossy anyway. A full send buffer drops the frame.
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => {
                warn!("Send buffer full, dropped {} byte frame", frame.len());
                Ok(())
            }
            Err(e) => Err(e),
        }
    }
}

/// Splits received datagrams into flits, handed out one at a time.
pub struct UdpSource {
    socket: UdpSocket,
    pending: VecDeque<Flit>,
    buf: Vec<u8>,
}

impl NetworkSource for UdpSource {
    fn next_flit(&mut self) -> io::Result<Option<Flit>> {
        if self.pending.is_empty() {
            match self.socket.recv_from(&mut self.buf) {
                Ok((len, from)) => {
                    debug!("Received {} byte frame from {}", len, from);
                    self.pending.extend(split_frame(&self.buf[..len]));
                }
                Err(e) if e.kind() == io::ErrorKind::WouldBlock => return Ok(None),
                Err(e) => return Err(e),
            }
        }
        Ok(self.pending.pop_front())
    }
}
