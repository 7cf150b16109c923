use std::fmt;
use std::net::IpAddr;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::common::{PacError, Result};

/// 引擎会话配置；每次 init 都重置为默认值
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct EngineConfig {
    /// 覆盖 myIpAddress() 的返回值
    #[serde(default)]
    pub my_ip: Option<IpAddr>,
    #[serde(default = "default_true")]
    pub microsoft_extensions: bool,
    #[serde(default)]
    pub dns: DnsConfig,
    #[serde(default)]
    pub limits: LimitsConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            my_ip: None,
            microsoft_extensions: true,
            dns: DnsConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

impl EngineConfig {
    pub fn validate(&self) -> Result<()> {
        for server in &self.dns.servers {
            crate::dns::parse_server(server)?;
        }
        if self.dns.timeout_ms == 0 {
            return Err(PacError::ResolverConfig(
                "dns timeout must be greater than zero".into(),
            ));
        }
        if self.limits.loop_iterations == 0 || self.limits.recursion == 0 {
            return Err(PacError::Other(anyhow::anyhow!(
                "runtime limits must be greater than zero"
            )));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct DnsConfig {
    #[serde(default)]
    pub variant: ResolverVariant,
    /// "ip"、"ip:port" 或 "[v6]:port"，按顺序尝试
    #[serde(default)]
    pub servers: Vec<String>,
    #[serde(default)]
    pub search_domains: Vec<String>,
    #[serde(default = "default_dns_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for DnsConfig {
    fn default() -> Self {
        Self {
            variant: ResolverVariant::default(),
            servers: Vec::new(),
            search_domains: Vec::new(),
            timeout_ms: default_dns_timeout_ms(),
        }
    }
}

/// 脚本失控保护
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub struct LimitsConfig {
    #[serde(default = "default_loop_iterations")]
    pub loop_iterations: u64,
    #[serde(default = "default_recursion")]
    pub recursion: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            loop_iterations: default_loop_iterations(),
            recursion: default_recursion(),
        }
    }
}

/// DNS 解析策略
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ResolverVariant {
    /// 平台解析器
    #[default]
    #[serde(alias = "getaddrinfo")]
    System,
    /// 自定义 nameserver / search domain
    #[serde(alias = "c-ares")]
    Pluggable,
    /// 只接受 IP 字面量
    None,
}

impl ResolverVariant {
    pub fn as_str(self) -> &'static str {
        match self {
            ResolverVariant::System => "system",
            ResolverVariant::Pluggable => "pluggable",
            ResolverVariant::None => "none",
        }
    }
}

impl fmt::Display for ResolverVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResolverVariant {
    type Err = PacError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "system" | "getaddrinfo" => Ok(ResolverVariant::System),
            "pluggable" | "c-ares" | "cares" => Ok(ResolverVariant::Pluggable),
            "none" => Ok(ResolverVariant::None),
            other => Err(PacError::ResolverConfig(format!(
                "unknown resolver variant '{}'",
                other
            ))),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_dns_timeout_ms() -> u64 {
    5000
}

fn default_loop_iterations() -> u64 {
    1_000_000
}

fn default_recursion() -> usize {
    512
}
