pub mod blocking;
pub mod resolver;

use std::net::{IpAddr, SocketAddr};

use anyhow::Result;
use async_trait::async_trait;
use hickory_resolver::config::Protocol;

pub use crate::config::types::ResolverVariant;
pub use blocking::BlockingResolver;
pub use resolver::{build_resolver, name_candidates, LiteralResolver, PluggableResolver, SystemResolver};

/// DNS 解析器 trait
#[async_trait]
pub trait DnsResolver: Send + Sync {
    /// 将域名解析为 IP 地址列表；解析不到时返回 Err
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>>;
}

/// 一个已解析的 nameserver 条目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServerTarget {
    pub socket_addr: SocketAddr,
    pub protocol: Protocol,
    pub tls_dns_name: Option<String>,
}

/// 解析 nameserver 配置字符串。
///
/// 支持 "ip"、"ip:port"、"[v6]"、"[v6]:port"，以及 `tls://`、`quic://`、
/// `https://` 前缀（主机部分须为 IP 字面量）。
pub fn parse_server(address: &str) -> crate::common::Result<ServerTarget> {
    let bad = |why: &str| {
        crate::common::PacError::ResolverConfig(format!("invalid DNS server '{}': {}", address, why))
    };

    if let Some(rest) = address.strip_prefix("tls://") {
        let (ip, port) = parse_ip_port(rest, 853).ok_or_else(|| bad("expected ip[:port]"))?;
        return Ok(ServerTarget {
            socket_addr: SocketAddr::new(ip, port),
            protocol: Protocol::Tls,
            tls_dns_name: Some(ip.to_string()),
        });
    }
    if let Some(rest) = address.strip_prefix("quic://") {
        let (ip, port) = parse_ip_port(rest, 853).ok_or_else(|| bad("expected ip[:port]"))?;
        return Ok(ServerTarget {
            socket_addr: SocketAddr::new(ip, port),
            protocol: Protocol::Quic,
            tls_dns_name: Some(ip.to_string()),
        });
    }
    if address.starts_with("https://") {
        let parsed = url::Url::parse(address).map_err(|e| bad(&e.to_string()))?;
        let host = parsed
            .host_str()
            .ok_or_else(|| bad("missing host"))?
            .trim_start_matches('[')
            .trim_end_matches(']');
        let ip: IpAddr = host.parse().map_err(|_| bad("host must be an IP address"))?;
        return Ok(ServerTarget {
            socket_addr: SocketAddr::new(ip, parsed.port().unwrap_or(443)),
            protocol: Protocol::Https,
            tls_dns_name: Some(ip.to_string()),
        });
    }

    let (ip, port) = parse_ip_port(address, 53).ok_or_else(|| bad("expected ip[:port]"))?;
    Ok(ServerTarget {
        socket_addr: SocketAddr::new(ip, port),
        protocol: Protocol::Udp,
        tls_dns_name: None,
    })
}

/// 解析 "ip" 或 "ip:port" 或 "[ipv6]" 或 "[ipv6]:port" 格式
fn parse_ip_port(s: &str, default_port: u16) -> Option<(IpAddr, u16)> {
    if let Ok(ip) = s.parse::<IpAddr>() {
        return Some((ip, default_port));
    }
    if let Ok(addr) = s.parse::<SocketAddr>() {
        return Some((addr.ip(), addr.port()));
    }
    let stripped = s.strip_prefix('[')?.strip_suffix(']')?;
    stripped.parse::<IpAddr>().ok().map(|ip| (ip, default_port))
}
