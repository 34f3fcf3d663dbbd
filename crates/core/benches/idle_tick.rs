// FabricLink - Host-side FPGA I/O Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use fabriclink_core::block::MemBackend;
use fabriclink_core::net::FlitQueue;
use fabriclink_core::transport::MemRegion;
use fabriclink_core::{
    BlockRequest, Detached, Direction, Driver, DriverLimits, MacAddress, RegisterMap,
    RegisterTransport,
};

fn bench_idle_tick(c: &mut Criterion) {
    let mut driver = Driver::new(
        MemRegion::new(4096),
        RegisterMap::default(),
        Detached,
        MemBackend::new(64),
        DriverLimits::default(),
    )
    .unwrap();
    let queue = FlitQueue::new();
    driver
        .attach_network(
            Box::new(queue.clone()),
            Box::new(queue),
            MacAddress([2, 0, 0, 0, 0, 1]),
        )
        .unwrap();

    c.bench_function("idle_tick", |b| {
        b.iter(|| black_box(driver.tick().unwrap()))
    });
}

fn bench_zero_length_read(c: &mut Criterion) {
    let map = RegisterMap::default();
    let mut driver = Driver::new(
        MemRegion::new(4096),
        map.clone(),
        Detached,
        MemBackend::new(64),
        DriverLimits::default(),
    )
    .unwrap();
    let [tag, lo, hi, len, dir] = BlockRequest {
        tag: 1,
        sector: 0,
        len: 0,
        direction: Direction::Read,
    }
    .to_words();

    c.bench_function("zero_length_read", |b| {
        b.iter(|| {
            let regs = driver.regs_mut();
            regs.write_reg(map.blk_req_tag, tag).unwrap();
            regs.write_reg(map.blk_req_sector_lo, lo).unwrap();
            regs.write_reg(map.blk_req_sector_hi, hi).unwrap();
            regs.write_reg(map.blk_req_len, len).unwrap();
            regs.write_reg(map.blk_req_dir, dir).unwrap();
            regs.write_reg(map.blk_req_valid, 1).unwrap();
            // Nobody consumes completions here.
            regs.write_reg(map.blk_cpl_valid, 0).unwrap();
            black_box(driver.tick().unwrap())
        })
    });
}

criterion_group!(benches, bench_idle_tick, bench_zero_length_read);
criterion_main!(benches);
