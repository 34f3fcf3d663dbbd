// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

/// The channel that loads programs and carries console/debug traffic between
/// host and target. The driver only gives it a chance to make progress once
/// per tick.
pub trait TargetHost {
    fn step(&mut self);
}

/// No target-host interface attached.
#[derive(Debug, Default, Clone, Copy)]
pub struct Detached;

impl TargetHost for Detached {
    fn step(&mut self) {}
}

impl<F: FnMut()> TargetHost for F {
    fn step(&mut self) {
        self()
    }
}
