//! 地址匹配：IPv4/IPv6 字面量解析、CIDR 与点分掩码比较
//!
//! 所有函数均为纯函数，不涉及 DNS；不同地址族之间从不互相转换。

mod cidr;

use std::net::IpAddr;

pub use cidr::{apply_mask, masked_equal, NetworkMask};

use crate::common::{PacError, Result};

/// 解析 IP 字面量（不接受主机名、端口或方括号）
pub fn parse_ip(text: &str) -> Result<IpAddr> {
    text.parse::<IpAddr>()
        .map_err(|e| PacError::AddrParse(format!("'{}': {}", text, e)))
}

/// 解析 "net/len" 形式的 CIDR
pub fn parse_cidr(text: &str) -> Result<NetworkMask> {
    text.parse()
}

/// 地址是否落在网络内；地址族不同时为 false
pub fn address_in_network(addr: IpAddr, network: &NetworkMask) -> bool {
    network.contains(addr)
}

/// 同族且数值相等
pub fn addresses_equal(a: IpAddr, b: IpAddr) -> bool {
    match (a, b) {
        (IpAddr::V4(a), IpAddr::V4(b)) => a == b,
        (IpAddr::V6(a), IpAddr::V6(b)) => a == b,
        _ => false,
    }
}

/// `isInNetEx` 的地址层实现：`addr` 为 IP 字面量，`cidr` 为 "net/len"。
///
/// 任一操作数无法解析时返回 false，不报错。
pub fn is_in_net_ex(addr: &str, cidr: &str) -> bool {
    match (parse_ip(addr), parse_cidr(cidr)) {
        (Ok(ip), Ok(net)) => net.contains(ip),
        _ => false,
    }
}
