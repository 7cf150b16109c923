pub mod types;

use std::path::Path;
use std::sync::OnceLock;

use regex::{Captures, Regex};

use crate::common::{PacError, Result};

pub use types::{DnsConfig, EngineConfig, LimitsConfig, ResolverVariant};

/// 从 YAML 文件加载引擎配置（支持 `${VAR}` / `${VAR:-default}` 环境变量展开）
pub fn load_config(path: impl AsRef<Path>) -> Result<EngineConfig> {
    let path = path.as_ref();
    let raw = std::fs::read_to_string(path)?;
    let config = parse_config(&raw)?;
    tracing::debug!(path = %path.display(), "engine config loaded");
    Ok(config)
}

/// 解析 YAML 文本；空文档得到默认配置
pub fn parse_config(content: &str) -> Result<EngineConfig> {
    let expanded = expand_env_vars(content);
    if expanded.trim().is_empty() {
        return Ok(EngineConfig::default());
    }
    let config: EngineConfig = serde_yml::from_str(&expanded)
        .map_err(|e| PacError::Other(anyhow::anyhow!("invalid engine config: {}", e)))?;
    config.validate()?;
    Ok(config)
}

/// 未定义的变量展开为空串，除非给出了默认值
pub fn expand_env_vars(input: &str) -> String {
    static ENV_REF: OnceLock<Option<Regex>> = OnceLock::new();
    let Some(re) = ENV_REF
        .get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)(?::-([^}]*))?\}").ok())
    else {
        return input.to_string();
    };
    re.replace_all(input, |caps: &Captures| {
        let default = caps.get(2).map(|m| m.as_str());
        match (std::env::var(&caps[1]), default) {
            (Ok(val), Some(d)) if val.is_empty() => d.to_string(),
            (Ok(val), _) => val,
            (Err(_), Some(d)) => d.to_string(),
            (Err(_), None) => String::new(),
        }
    })
    .into_owned()
}
