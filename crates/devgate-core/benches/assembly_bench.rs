//! Criterion benchmarks for host validation and record assembly.
//!
//! Both run on the request path: the validator gates every proxied call and
//! every stream open, and fragment merging runs on every mDNS announcement.
//!
//! Run with:
//! ```bash
//! cargo bench --package devgate-core --bench assembly_bench
//! ```

use std::net::Ipv4Addr;

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use devgate_core::host::is_valid_host;
use devgate_core::record::{DeviceRecord, Fragment};

/// Representative host strings: valid, invalid shape, out-of-range.
const BENCH_HOSTS: &[&str] = &[
    "127.0.0.1:8080",
    "192.168.4.7:6100",
    "255.255.255.255:65535",
    "256.1.1.1:80",
    "localhost:80",
    "10.0.0.1",
    "10.0.0.1:0",
    "[::1]:8080",
];

fn bench_is_valid_host(c: &mut Criterion) {
    c.bench_function("is_valid_host/mixed", |b| {
        b.iter(|| {
            for host in BENCH_HOSTS {
                black_box(is_valid_host(black_box(host)));
            }
        })
    });
}

fn bench_fragment_assembly(c: &mut Criterion) {
    let fragments = [
        Fragment::Announcement {
            name: "lamp".to_string(),
        },
        Fragment::AddressResolution {
            name: "lamp".to_string(),
            host: "lamp.local.".to_string(),
            address: Ipv4Addr::new(192, 168, 4, 7),
        },
        Fragment::ServiceLocation {
            name: "lamp".to_string(),
            port: 6100,
        },
        Fragment::Attributes {
            name: "lamp".to_string(),
            entries: vec![
                "version=2025.7.0".to_string(),
                "api_version=1".to_string(),
                "ota".to_string(),
            ],
        },
    ];

    c.bench_function("device_record/absorb_full_set", |b| {
        b.iter(|| {
            let mut record = DeviceRecord::new("lamp");
            for fragment in &fragments {
                record.absorb(black_box(fragment));
            }
            black_box(record.is_complete())
        })
    });
}

criterion_group!(benches, bench_is_valid_host, bench_fragment_assembly);
criterion_main!(benches);
