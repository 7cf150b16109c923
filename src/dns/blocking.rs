//! 同步解析门面：脚本宿主函数在 JS 调用栈里同步调用 DNS，
//! 这里把异步解析器放到会话自己的 current-thread runtime 上 `block_on`。

use std::net::{IpAddr, Ipv4Addr, SocketAddr, UdpSocket};
use std::sync::Arc;
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::debug;

use crate::common::Result;
use crate::config::types::{DnsConfig, ResolverVariant};

use super::{build_resolver, DnsResolver};

/// 本机地址探测用的目标；UDP connect 不发包，只让内核选出口地址
const ROUTE_V4: &str = "8.8.8.8:53";
const ROUTE_V6: &str = "[2001:4860:4860::8888]:53";

pub struct BlockingResolver {
    variant: ResolverVariant,
    resolver: Arc<dyn DnsResolver>,
    runtime: Arc<Runtime>,
    deadline: Duration,
}

impl BlockingResolver {
    /// 按配置构建。Pluggable 且没有 server 时返回 ResolverConfig 错误。
    pub fn new(config: &DnsConfig, runtime: Arc<Runtime>) -> Result<Self> {
        let resolver = {
            let _guard = runtime.enter();
            build_resolver(config)?
        };
        let per_query = Duration::from_millis(config.timeout_ms);
        // Pluggable 会逐个尝试候选名，每个候选名单独计时
        let deadline = match config.variant {
            ResolverVariant::Pluggable => per_query * (config.search_domains.len() as u32 + 1),
            _ => per_query,
        };
        Ok(Self {
            variant: config.variant,
            resolver,
            runtime,
            deadline,
        })
    }

    /// 直接指定解析器实现（测试中注入 mock 用）
    pub fn from_parts(
        variant: ResolverVariant,
        resolver: Arc<dyn DnsResolver>,
        runtime: Arc<Runtime>,
        deadline: Duration,
    ) -> Self {
        Self {
            variant,
            resolver,
            runtime,
            deadline,
        }
    }

    pub fn variant(&self) -> ResolverVariant {
        self.variant
    }

    /// 解析出的全部地址：IPv4 在前、IPv6 在后、去重；空表示解析失败。
    ///
    /// 不能在 async runtime 的工作线程里调用。
    pub fn resolve_all(&self, host: &str) -> Vec<IpAddr> {
        if let Ok(ip) = host.parse::<IpAddr>() {
            return vec![ip];
        }
        if self.variant == ResolverVariant::None || host.is_empty() {
            return Vec::new();
        }

        // 计时器必须在 runtime 内创建
        let deadline = self.deadline;
        let lookup = async { tokio::time::timeout(deadline, self.resolver.resolve(host)).await };
        let addrs = match self.runtime.block_on(lookup) {
            Ok(Ok(addrs)) => addrs,
            Ok(Err(e)) => {
                debug!(host = host, error = %e, "DNS lookup failed");
                return Vec::new();
            }
            Err(_) => {
                debug!(host = host, timeout_ms = self.deadline.as_millis() as u64, "DNS lookup timed out");
                return Vec::new();
            }
        };
        order_addresses(addrs)
    }

    /// 首选地址（IPv4 优先）
    pub fn resolve_first(&self, host: &str) -> Option<IpAddr> {
        self.resolve_all(host).into_iter().next()
    }

    /// 本机地址：IPv4 在前；探测不到时回退 127.0.0.1。
    ///
    /// DNS 被禁用时不做探测，直接回退。
    pub fn local_addresses(&self) -> Vec<IpAddr> {
        let fallback = vec![IpAddr::V4(Ipv4Addr::LOCALHOST)];
        if self.variant == ResolverVariant::None {
            return fallback;
        }
        let found: Vec<IpAddr> = [("0.0.0.0:0", ROUTE_V4), ("[::]:0", ROUTE_V6)]
            .iter()
            .filter_map(|(bind, target)| route_local_address(bind, target))
            .collect();
        if found.is_empty() {
            fallback
        } else {
            order_addresses(found)
        }
    }
}

fn route_local_address(bind: &str, target: &str) -> Option<IpAddr> {
    let target: SocketAddr = target.parse().ok()?;
    let socket = UdpSocket::bind(bind).ok()?;
    socket.connect(target).ok()?;
    let ip = socket.local_addr().ok()?.ip();
    if ip.is_unspecified() {
        None
    } else {
        Some(ip)
    }
}

fn order_addresses(addrs: Vec<IpAddr>) -> Vec<IpAddr> {
    let mut ordered: Vec<IpAddr> = Vec::with_capacity(addrs.len());
    for ip in addrs.iter().filter(|a| a.is_ipv4()).chain(addrs.iter().filter(|a| a.is_ipv6())) {
        if !ordered.contains(ip) {
            ordered.push(*ip);
        }
    }
    ordered
}
