//! 引擎生命周期：Uninitialized ⇄ Ready
//!
//! 所有操作都在同一把锁内完成，`Engine` 可以在线程间共享。
//! 求值期间的 DNS 查询在会话自带的 current-thread runtime 上阻塞执行，
//! 因此不要在 async runtime 的工作线程里直接调用（用 `spawn_blocking`）。
//!
//! setter 只改会话配置；下一次 parse / find_proxy 前把配置同步进共享的 [`HostEnv`]，
//! 已加载的脚本上下文不受影响。解析器只在 DNS 配置变化时重建。

use std::net::IpAddr;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use tokio::runtime::Runtime;
use tracing::{debug, info, warn};

use crate::common::{PacError, Result};
use crate::config::types::{DnsConfig, EngineConfig, LimitsConfig, ResolverVariant};
use crate::dns::{self, BlockingResolver};
use crate::net;
use crate::script::{HostEnv, ScriptHost};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EngineState {
    Uninitialized,
    Ready,
}

struct Session {
    config: EngineConfig,
    // 先于 env / runtime 释放：脚本线程持有 env 的句柄
    script: Option<ScriptHost>,
    env: Arc<HostEnv>,
    /// env 里解析器所依据的 DNS 配置
    resolver_dns: DnsConfig,
    runtime: Arc<Runtime>,
}

impl Session {
    fn new() -> Result<Self> {
        let runtime = Arc::new(
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .thread_name("pacengine-dns")
                .build()?,
        );
        let config = EngineConfig::default();
        let lookup = BlockingResolver::new(&config.dns, Arc::clone(&runtime))?;
        let env = Arc::new(HostEnv::new(lookup, config.my_ip, config.microsoft_extensions));
        Ok(Self {
            resolver_dns: config.dns.clone(),
            config,
            script: None,
            env,
            runtime,
        })
    }

    /// 把会话配置同步进宿主函数环境
    fn sync_env(&mut self) -> Result<()> {
        if self.resolver_dns != self.config.dns {
            let lookup = BlockingResolver::new(&self.config.dns, Arc::clone(&self.runtime))?;
            self.env.set_lookup(lookup);
            self.resolver_dns = self.config.dns.clone();
            debug!(variant = %self.config.dns.variant, "DNS resolver rebuilt");
        }
        self.env.set_my_ip(self.config.my_ip);
        self.env.set_microsoft_extensions(self.config.microsoft_extensions);
        Ok(())
    }

    fn load(&mut self, source: &str) -> Result<()> {
        self.sync_env()?;
        let compiled = ScriptHost::compile(source, &self.env, &self.config.limits)?;
        self.script = Some(compiled);
        Ok(())
    }
}

/// 一个 PAC 求值会话的句柄
pub struct Engine {
    session: Mutex<Option<Session>>,
}

impl Default for Engine {
    fn default() -> Self {
        Self::new()
    }
}

impl Engine {
    pub const fn new() -> Self {
        Self {
            session: Mutex::new(None),
        }
    }

    fn lock(&self) -> MutexGuard<'_, Option<Session>> {
        self.session.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn with_session<T>(&self, op: &str, f: impl FnOnce(&mut Session) -> Result<T>) -> Result<T> {
        let mut guard = self.lock();
        match guard.as_mut() {
            Some(session) => f(session),
            None => Err(PacError::State(format!("{}: engine is not initialized", op))),
        }
    }

    pub fn state(&self) -> EngineState {
        if self.lock().is_some() {
            EngineState::Ready
        } else {
            EngineState::Uninitialized
        }
    }

    pub fn is_ready(&self) -> bool {
        self.state() == EngineState::Ready
    }

    /// 新建会话；已初始化时报 StateError
    pub fn init(&self) -> Result<()> {
        let mut guard = self.lock();
        if guard.is_some() {
            return Err(PacError::State("init: engine is already initialized".into()));
        }
        *guard = Some(Session::new()?);
        info!("PAC engine initialized");
        Ok(())
    }

    /// 编译脚本；失败时保留之前已加载的脚本
    pub fn parse_script(&self, script: &str) -> Result<()> {
        self.with_session("parse_script", |session| session.load(script))
    }

    pub fn parse_file(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        self.with_session("parse_file", |session| {
            let script = std::fs::read_to_string(path)?;
            debug!(path = %path.display(), "PAC file loaded");
            session.load(&script)
        })
    }

    /// 求值 `FindProxyForURL(url, host)`，返回原始字符串。
    ///
    /// `host` 省略时从 URL 的 authority 提取。
    pub fn find_proxy(&self, url: &str, host: Option<&str>) -> Result<String> {
        self.with_session("find_proxy", |session| {
            if session.script.is_none() {
                return Err(PacError::State("find_proxy: no PAC script has been parsed".into()));
            }
            if url.is_empty() {
                return Err(PacError::InvalidUrl("URL not defined".into()));
            }
            let host = match host {
                Some("") => return Err(PacError::InvalidUrl("host not defined".into())),
                Some(h) => h.to_string(),
                None => extract_host(url)?,
            };

            session.sync_env()?;
            let script = session
                .script
                .as_ref()
                .ok_or_else(|| PacError::State("find_proxy: no PAC script has been parsed".into()))?;
            match script.evaluate(url, &host, &session.config.limits) {
                Ok(decision) => Ok(decision),
                Err(e) => {
                    warn!(url = url, host = host.as_str(), error = %e, "PAC evaluation failed");
                    Err(e)
                }
            }
        })
    }

    /// 丢弃会话；未初始化时报 StateError
    pub fn cleanup(&self) -> Result<()> {
        let mut guard = self.lock();
        if guard.take().is_none() {
            return Err(PacError::State("cleanup: engine is not initialized".into()));
        }
        info!("PAC engine cleaned up");
        Ok(())
    }

    pub fn set_my_ip(&self, ip: &str) -> Result<()> {
        self.with_session("set_my_ip", |session| {
            let parsed: IpAddr = net::parse_ip(ip)?;
            session.config.my_ip = Some(parsed);
            Ok(())
        })
    }

    pub fn enable_microsoft_extensions(&self) -> Result<()> {
        self.with_session("enable_microsoft_extensions", |session| {
            session.config.microsoft_extensions = true;
            Ok(())
        })
    }

    pub fn disable_microsoft_extensions(&self) -> Result<()> {
        self.with_session("disable_microsoft_extensions", |session| {
            session.config.microsoft_extensions = false;
            Ok(())
        })
    }

    pub fn set_dns_resolver_variant(&self, variant: ResolverVariant) -> Result<()> {
        self.with_session("set_dns_resolver_variant", |session| {
            debug!(variant = %variant, "DNS resolver variant set");
            session.config.dns.variant = variant;
            Ok(())
        })
    }

    /// 每个条目须为 "ip"、"ip:port" 或 "[v6]:port"（也接受 tls:// 等前缀）
    pub fn set_dns_servers<I, S>(&self, servers: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let servers: Vec<String> = servers.into_iter().map(Into::into).collect();
        self.with_session("set_dns_servers", |session| {
            for server in &servers {
                dns::parse_server(server)?;
            }
            session.config.dns.servers = servers;
            Ok(())
        })
    }

    pub fn set_dns_search_domains<I, S>(&self, domains: I) -> Result<()>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let domains: Vec<String> = domains.into_iter().map(Into::into).collect();
        self.with_session("set_dns_search_domains", |session| {
            session.config.dns.search_domains = domains;
            Ok(())
        })
    }

    pub fn set_dns_timeout(&self, timeout: Duration) -> Result<()> {
        let timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self.with_session("set_dns_timeout", |session| {
            if timeout_ms == 0 {
                return Err(PacError::ResolverConfig(
                    "dns timeout must be greater than zero".into(),
                ));
            }
            session.config.dns.timeout_ms = timeout_ms;
            Ok(())
        })
    }

    pub fn set_runtime_limits(&self, limits: LimitsConfig) -> Result<()> {
        self.with_session("set_runtime_limits", |session| {
            session.config.limits = limits;
            Ok(())
        })
    }

    /// 用一份完整配置替换当前会话配置（已加载的脚本保留）
    pub fn apply_config(&self, config: EngineConfig) -> Result<()> {
        self.with_session("apply_config", |session| {
            config.validate()?;
            session.config = config;
            Ok(())
        })
    }

    /// 当前会话配置的快照
    pub fn config(&self) -> Result<EngineConfig> {
        self.with_session("config", |session| Ok(session.config.clone()))
    }
}

/// 从 URL 的 authority 中原样切出主机名（不做大小写、IDNA 或数字形式的规范化）。
///
/// 跳过 userinfo，IPv6 去掉方括号；没有 `scheme://` 或主机为空时报 InvalidUrl。
pub fn extract_host(url: &str) -> Result<String> {
    let invalid = |why: &str| PacError::InvalidUrl(format!("'{}': {}", url, why));

    let (scheme, rest) = url.split_once("://").ok_or_else(|| invalid("missing scheme"))?;
    let scheme_ok = scheme.starts_with(|c: char| c.is_ascii_alphabetic())
        && scheme
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if !scheme_ok {
        return Err(invalid("invalid scheme"));
    }

    let authority = rest
        .split(|c| matches!(c, '/' | '?' | '#'))
        .next()
        .unwrap_or_default();
    let host_port = authority.rsplit_once('@').map_or(authority, |(_, h)| h);
    let host = match host_port.strip_prefix('[') {
        Some(bracketed) => bracketed
            .split_once(']')
            .map(|(h, _)| h)
            .ok_or_else(|| invalid("unterminated IPv6 literal"))?,
        None => host_port.split(':').next().unwrap_or_default(),
    };
    if host.is_empty() {
        return Err(invalid("no host in URL"));
    }
    Ok(host.to_string())
}
