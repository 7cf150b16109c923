use std::net::IpAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use hickory_resolver::config::{
    LookupIpStrategy, NameServerConfig, NameServerConfigGroup, Protocol, ResolverConfig,
    ResolverOpts,
};
use hickory_resolver::TokioAsyncResolver;
use tracing::{debug, info};

use crate::common::PacError;
use crate::config::types::{DnsConfig, ResolverVariant};

use super::{parse_server, DnsResolver, ServerTarget};

/// 系统 DNS 解析器（使用 tokio::net::lookup_host）
pub struct SystemResolver;

#[async_trait]
impl DnsResolver for SystemResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        let addrs: Vec<IpAddr> = tokio::net::lookup_host(format!("{}:0", host))
            .await?
            .map(|a| a.ip())
            .collect();
        if addrs.is_empty() {
            anyhow::bail!("DNS resolution failed: no addresses for {}", host);
        }
        debug!(host = host, count = addrs.len(), "system DNS resolved");
        Ok(addrs)
    }
}

/// 禁用 DNS：只认 IP 字面量
pub struct LiteralResolver;

#[async_trait]
impl DnsResolver for LiteralResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        match host.parse::<IpAddr>() {
            Ok(ip) => Ok(vec![ip]),
            Err(_) => anyhow::bail!("DNS disabled: {} is not an IP literal", host),
        }
    }
}

/// 基于 hickory-resolver 的可配置解析器（自定义 nameserver + search domain）
pub struct PluggableResolver {
    resolver: TokioAsyncResolver,
    search_domains: Vec<String>,
    timeout: Duration,
}

impl PluggableResolver {
    /// 需要在 tokio runtime 上下文内调用
    pub fn new(servers: &[String], search_domains: &[String], timeout: Duration) -> crate::common::Result<Self> {
        if servers.is_empty() {
            return Err(PacError::ResolverConfig(
                "pluggable resolver requires at least one DNS server".into(),
            ));
        }

        let mut nameservers = Vec::new();
        for server in servers {
            nameservers.extend(nameserver_configs(&parse_server(server)?));
        }
        let group = NameServerConfigGroup::from(nameservers);

        let mut opts = ResolverOpts::default();
        opts.use_hosts_file = false;
        opts.ip_strategy = LookupIpStrategy::Ipv4AndIpv6;
        opts.timeout = timeout;
        // 候选名由 name_candidates 生成，不再让 hickory 追加 search 列表
        opts.ndots = 0;

        let config = ResolverConfig::from_parts(None, vec![], group);
        let resolver = TokioAsyncResolver::tokio(config, opts);
        info!(
            servers = servers.len(),
            search_domains = search_domains.len(),
            "pluggable DNS resolver created"
        );
        Ok(Self {
            resolver,
            search_domains: search_domains.to_vec(),
            timeout,
        })
    }
}

#[async_trait]
impl DnsResolver for PluggableResolver {
    async fn resolve(&self, host: &str) -> Result<Vec<IpAddr>> {
        for candidate in name_candidates(host, &self.search_domains) {
            let fqdn = if candidate.ends_with('.') {
                candidate
            } else {
                format!("{}.", candidate)
            };
            match tokio::time::timeout(self.timeout, self.resolver.lookup_ip(fqdn.as_str())).await {
                Ok(Ok(response)) => {
                    let addrs: Vec<IpAddr> = response.iter().collect();
                    if !addrs.is_empty() {
                        debug!(host = host, name = fqdn.as_str(), count = addrs.len(), "pluggable DNS resolved");
                        return Ok(addrs);
                    }
                }
                Ok(Err(e)) => debug!(name = fqdn.as_str(), error = %e, "pluggable DNS candidate failed"),
                Err(_) => debug!(name = fqdn.as_str(), "pluggable DNS candidate timed out"),
            }
        }
        anyhow::bail!("DNS resolution failed: no addresses for {}", host)
    }
}

/// 生成依次尝试的查询名。
///
/// - 以 `.` 结尾：只查询该名字本身
/// - 不含 `.`：先逐个拼接 search domain，最后查询裸名
/// - 含 `.`：先查询该名字，再逐个拼接 search domain
pub fn name_candidates(host: &str, search_domains: &[String]) -> Vec<String> {
    if host.ends_with('.') {
        return vec![host.to_string()];
    }
    let suffixed = search_domains
        .iter()
        .map(|d| d.trim_start_matches('.'))
        .filter(|d| !d.is_empty())
        .map(|d| format!("{}.{}", host, d));

    if host.contains('.') {
        std::iter::once(host.to_string()).chain(suffixed).collect()
    } else {
        suffixed.chain(std::iter::once(host.to_string())).collect()
    }
}

fn nameserver_configs(target: &ServerTarget) -> Vec<NameServerConfig> {
    let make = |protocol: Protocol| NameServerConfig {
        socket_addr: target.socket_addr,
        protocol,
        tls_dns_name: target.tls_dns_name.clone(),
        trust_negative_responses: true,
        tls_config: None,
        bind_addr: None,
    };
    match target.protocol {
        // 明文 DNS 同时注册 UDP 与 TCP（截断响应回退到 TCP）
        Protocol::Udp => vec![make(Protocol::Udp), make(Protocol::Tcp)],
        other => vec![make(other)],
    }
}

/// 根据配置构建 DNS 解析器
pub fn build_resolver(config: &DnsConfig) -> crate::common::Result<Arc<dyn DnsResolver>> {
    let resolver: Arc<dyn DnsResolver> = match config.variant {
        ResolverVariant::System => Arc::new(SystemResolver),
        ResolverVariant::None => Arc::new(LiteralResolver),
        ResolverVariant::Pluggable => Arc::new(PluggableResolver::new(
            &config.servers,
            &config.search_domains,
            Duration::from_millis(config.timeout_ms),
        )?),
    };
    Ok(resolver)
}
