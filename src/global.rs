//! 进程级默认引擎
//!
//! 为只需要一个会话的调用方（命令行工具、一次性查询）提供与 [`Engine`] 同名的自由函数。
//! 需要多个并存会话时直接创建 [`Engine`]。

use std::path::Path;
use std::time::Duration;

use tracing::debug;

use crate::common::Result;
use crate::config::types::{EngineConfig, LimitsConfig, ResolverVariant};
use crate::engine::{Engine, EngineState};

static DEFAULT_ENGINE: Engine = Engine::new();

pub fn default_engine() -> &'static Engine {
    &DEFAULT_ENGINE
}

pub fn state() -> EngineState {
    DEFAULT_ENGINE.state()
}

pub fn init() -> Result<()> {
    DEFAULT_ENGINE.init()
}

pub fn parse_script(script: &str) -> Result<()> {
    DEFAULT_ENGINE.parse_script(script)
}

pub fn parse_file(path: impl AsRef<Path>) -> Result<()> {
    DEFAULT_ENGINE.parse_file(path)
}

pub fn find_proxy(url: &str, host: Option<&str>) -> Result<String> {
    DEFAULT_ENGINE.find_proxy(url, host)
}

pub fn cleanup() -> Result<()> {
    DEFAULT_ENGINE.cleanup()
}

pub fn set_my_ip(ip: &str) -> Result<()> {
    DEFAULT_ENGINE.set_my_ip(ip)
}

pub fn enable_microsoft_extensions() -> Result<()> {
    DEFAULT_ENGINE.enable_microsoft_extensions()
}

pub fn disable_microsoft_extensions() -> Result<()> {
    DEFAULT_ENGINE.disable_microsoft_extensions()
}

pub fn set_dns_resolver_variant(variant: ResolverVariant) -> Result<()> {
    DEFAULT_ENGINE.set_dns_resolver_variant(variant)
}

pub fn set_dns_servers<I, S>(servers: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    DEFAULT_ENGINE.set_dns_servers(servers)
}

pub fn set_dns_search_domains<I, S>(domains: I) -> Result<()>
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    DEFAULT_ENGINE.set_dns_search_domains(domains)
}

pub fn set_dns_timeout(timeout: Duration) -> Result<()> {
    DEFAULT_ENGINE.set_dns_timeout(timeout)
}

pub fn set_runtime_limits(limits: LimitsConfig) -> Result<()> {
    DEFAULT_ENGINE.set_runtime_limits(limits)
}

pub fn apply_config(config: EngineConfig) -> Result<()> {
    DEFAULT_ENGINE.apply_config(config)
}

/// 一次性求值：必要时初始化默认引擎，加载脚本文件，求值，
/// 若引擎是本函数初始化的则随后清理（无论成功与否）。
pub fn just_find_proxy(path: impl AsRef<Path>, url: &str, host: Option<&str>) -> Result<String> {
    let initialized_here = if DEFAULT_ENGINE.is_ready() {
        false
    } else {
        DEFAULT_ENGINE.init()?;
        true
    };

    let result = DEFAULT_ENGINE
        .parse_file(path)
        .and_then(|_| DEFAULT_ENGINE.find_proxy(url, host));

    if initialized_here {
        DEFAULT_ENGINE.cleanup()?;
        debug!("default engine cleaned up after one-shot query");
    }
    result
}
