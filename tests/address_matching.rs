//! 点分掩码与 CIDR 两种写法的等价性（随机样本）

use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};

use rand::Rng;

use pacengine::net::{is_in_net_ex, masked_equal, NetworkMask};
use pacengine::{Engine, ResolverVariant};

fn v4_mask(prefix: u8) -> Ipv4Addr {
    let bits = if prefix == 0 { 0 } else { u32::MAX << (32 - prefix as u32) };
    Ipv4Addr::from(bits)
}

fn v6_mask(prefix: u8) -> Ipv6Addr {
    let bits = if prefix == 0 { 0 } else { u128::MAX << (128 - prefix as u32) };
    Ipv6Addr::from(bits)
}

#[test]
fn ipv4_dotted_mask_agrees_with_cidr() {
    let mut rng = rand::thread_rng();
    for _ in 0..2000 {
        let addr = Ipv4Addr::from(rng.gen::<u32>());
        let prefix: u8 = rng.gen_range(0..=32);
        // 一半样本让网络号与地址共享前缀，保证两种结果都能覆盖到
        let net = if rng.gen_bool(0.5) {
            Ipv4Addr::from(u32::from(addr) ^ rng.gen_range(0..=255u32))
        } else {
            Ipv4Addr::from(rng.gen::<u32>())
        };
        let dotted = masked_equal(IpAddr::V4(addr), IpAddr::V4(net), IpAddr::V4(v4_mask(prefix)));
        let cidr = is_in_net_ex(&addr.to_string(), &format!("{}/{}", net, prefix));
        assert_eq!(dotted, cidr, "{} in {}/{}", addr, net, prefix);
    }
}

#[test]
fn ipv6_dotted_mask_agrees_with_cidr() {
    let mut rng = rand::thread_rng();
    for _ in 0..2000 {
        let addr = Ipv6Addr::from(rng.gen::<u128>());
        let prefix: u8 = rng.gen_range(0..=128);
        let net = if rng.gen_bool(0.5) {
            Ipv6Addr::from(u128::from(addr) ^ rng.gen_range(0..=0xffffu128))
        } else {
            Ipv6Addr::from(rng.gen::<u128>())
        };
        let dotted = masked_equal(IpAddr::V6(addr), IpAddr::V6(net), IpAddr::V6(v6_mask(prefix)));
        let network = NetworkMask::new(IpAddr::V6(net), prefix).unwrap();
        assert_eq!(dotted, network.contains(IpAddr::V6(addr)), "{} in {}", addr, network);
        assert_eq!(dotted, is_in_net_ex(&addr.to_string(), &network.to_string()));
    }
}

#[test]
fn families_never_mix() {
    let mut rng = rand::thread_rng();
    for _ in 0..200 {
        let v4 = Ipv4Addr::from(rng.gen::<u32>());
        let v6 = Ipv6Addr::from(rng.gen::<u128>());
        assert!(!is_in_net_ex(&v4.to_string(), "::/0"));
        assert!(!is_in_net_ex(&v6.to_string(), "0.0.0.0/0"));
        assert!(!masked_equal(
            IpAddr::V4(v4),
            IpAddr::V6(v6),
            IpAddr::V6(Ipv6Addr::UNSPECIFIED)
        ));
    }
}

#[test]
fn script_predicates_agree() {
    let engine = Engine::new();
    engine.init().unwrap();
    engine.set_dns_resolver_variant(ResolverVariant::None).unwrap();
    engine
        .parse_script(
            "function FindProxyForURL(url, host) { \
               var p = host.split('|'); \
               return isInNet(p[0], p[1], p[2]) + ',' + isInNetEx(p[0], p[1] + '/' + p[3]); }",
        )
        .unwrap();

    let mut rng = rand::thread_rng();
    for _ in 0..50 {
        let addr = Ipv4Addr::from(rng.gen::<u32>());
        let prefix: u8 = rng.gen_range(0..=32);
        let net = Ipv4Addr::from(u32::from(addr) ^ rng.gen_range(0..=0xffffu32));
        let host = format!("{}|{}|{}|{}", addr, net, v4_mask(prefix), prefix);
        let out = engine.find_proxy("http://masks/", Some(&host)).unwrap();
        let (dotted, cidr) = out.split_once(',').unwrap();
        assert_eq!(dotted, cidr, "{}", host);
    }
    engine.cleanup().unwrap();
}
