use criterion::{black_box, criterion_group, criterion_main, Criterion};
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use pacengine::net::{is_in_net_ex, masked_equal, NetworkMask};

fn bench_is_in_net_ex(c: &mut Criterion) {
    c.bench_function("is_in_net_ex_v4_hit", |b| {
        b.iter(|| black_box(is_in_net_ex(black_box("10.20.30.40"), black_box("10.20.0.0/16"))));
    });

    c.bench_function("is_in_net_ex_v6_miss", |b| {
        b.iter(|| {
            black_box(is_in_net_ex(
                black_box("2001:db8:8000::1"),
                black_box("2001:db8::/33"),
            ))
        });
    });

    c.bench_function("is_in_net_ex_malformed", |b| {
        b.iter(|| black_box(is_in_net_ex(black_box("www.example.com"), black_box("10.0.0.0/8"))));
    });
}

fn bench_masked_equal(c: &mut Criterion) {
    let addr = IpAddr::V4(Ipv4Addr::new(192, 168, 10, 77));
    let net = IpAddr::V4(Ipv4Addr::new(192, 168, 10, 0));
    let mask = IpAddr::V4(Ipv4Addr::new(255, 255, 255, 0));

    c.bench_function("masked_equal_v4", |b| {
        b.iter(|| black_box(masked_equal(black_box(addr), black_box(net), black_box(mask))));
    });

    let addr6 = IpAddr::V6("2001:db8:1:2::77".parse::<Ipv6Addr>().unwrap());
    let net6 = IpAddr::V6("2001:db8:1::".parse::<Ipv6Addr>().unwrap());
    let mask6 = IpAddr::V6("ffff:ffff:ffff::".parse::<Ipv6Addr>().unwrap());

    c.bench_function("masked_equal_v6", |b| {
        b.iter(|| black_box(masked_equal(black_box(addr6), black_box(net6), black_box(mask6))));
    });
}

fn bench_network_mask_contains(c: &mut Criterion) {
    let networks: Vec<NetworkMask> = (0u8..=255)
        .map(|i| format!("{}.0.0.0/8", i).parse().unwrap())
        .collect();
    let target = IpAddr::V4(Ipv4Addr::new(200, 1, 2, 3));

    c.bench_function("network_mask_contains_scan_256", |b| {
        b.iter(|| black_box(networks.iter().filter(|n| n.contains(black_box(target))).count()));
    });
}

criterion_group!(
    benches,
    bench_is_in_net_ex,
    bench_masked_equal,
    bench_network_mask_contains
);
criterion_main!(benches);
