//! PAC 返回值解析："PROXY a:3128; SOCKS b:1080; DIRECT" → 有序候选列表

use std::fmt;
use std::str::FromStr;

use crate::common::{PacError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProxyKind {
    Direct,
    Proxy,
    Http,
    Https,
    Socks,
    Socks4,
    Socks5,
}

impl ProxyKind {
    pub fn as_str(self) -> &'static str {
        match self {
            ProxyKind::Direct => "DIRECT",
            ProxyKind::Proxy => "PROXY",
            ProxyKind::Http => "HTTP",
            ProxyKind::Https => "HTTPS",
            ProxyKind::Socks => "SOCKS",
            ProxyKind::Socks4 => "SOCKS4",
            ProxyKind::Socks5 => "SOCKS5",
        }
    }

    fn from_keyword(keyword: &str) -> Option<Self> {
        let kind = match keyword.to_ascii_uppercase().as_str() {
            "DIRECT" => ProxyKind::Direct,
            "PROXY" => ProxyKind::Proxy,
            "HTTP" => ProxyKind::Http,
            "HTTPS" => ProxyKind::Https,
            "SOCKS" => ProxyKind::Socks,
            "SOCKS4" => ProxyKind::Socks4,
            "SOCKS5" => ProxyKind::Socks5,
            _ => return None,
        };
        Some(kind)
    }
}

/// 单个候选；DIRECT 没有 host/port
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyCandidate {
    pub kind: ProxyKind,
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl ProxyCandidate {
    pub fn direct() -> Self {
        Self {
            kind: ProxyKind::Direct,
            host: None,
            port: None,
        }
    }

    pub fn is_direct(&self) -> bool {
        self.kind == ProxyKind::Direct
    }

    /// "host:port"，IPv6 主机带方括号
    pub fn authority(&self) -> Option<String> {
        match (&self.host, self.port) {
            (Some(host), Some(port)) if host.contains(':') => Some(format!("[{}]:{}", host, port)),
            (Some(host), Some(port)) => Some(format!("{}:{}", host, port)),
            _ => None,
        }
    }
}

impl FromStr for ProxyCandidate {
    type Err = PacError;

    fn from_str(segment: &str) -> Result<Self> {
        let malformed = |why: &str| PacError::MalformedDecision(format!("'{}': {}", segment, why));

        let mut parts = segment.split_whitespace();
        let keyword = parts.next().ok_or_else(|| malformed("empty entry"))?;
        let kind = ProxyKind::from_keyword(keyword).ok_or_else(|| malformed("unknown keyword"))?;
        let target = parts.next();
        if parts.next().is_some() {
            return Err(malformed("unexpected trailing text"));
        }

        if kind == ProxyKind::Direct {
            return match target {
                None => Ok(Self::direct()),
                Some(_) => Err(malformed("DIRECT takes no address")),
            };
        }

        let target = target.ok_or_else(|| malformed("missing host:port"))?;
        let (host, port) = target
            .rsplit_once(':')
            .ok_or_else(|| malformed("missing port"))?;
        let host = host
            .strip_prefix('[')
            .and_then(|h| h.strip_suffix(']'))
            .unwrap_or(host);
        if host.is_empty() {
            return Err(malformed("missing host"));
        }
        if host.contains(':') && !target.starts_with('[') {
            return Err(malformed("IPv6 host must be bracketed"));
        }
        let port: u16 = port.parse().map_err(|_| malformed("invalid port"))?;

        Ok(Self {
            kind,
            host: Some(host.to_string()),
            port: Some(port),
        })
    }
}

impl fmt::Display for ProxyCandidate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.authority() {
            Some(authority) => write!(f, "{} {}", self.kind.as_str(), authority),
            None => f.write_str(self.kind.as_str()),
        }
    }
}

/// 有序候选列表，顺序即回退顺序
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProxyDecision {
    candidates: Vec<ProxyCandidate>,
}

impl ProxyDecision {
    /// 空段（如结尾多余的 `;`）被忽略；整串为空时报错
    pub fn parse(raw: &str) -> Result<Self> {
        let candidates = raw
            .split(';')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(ProxyCandidate::from_str)
            .collect::<Result<Vec<_>>>()?;
        if candidates.is_empty() {
            return Err(PacError::MalformedDecision(format!(
                "'{}': no proxy entries",
                raw
            )));
        }
        Ok(Self { candidates })
    }

    pub fn candidates(&self) -> &[ProxyCandidate] {
        &self.candidates
    }

    pub fn first(&self) -> Option<&ProxyCandidate> {
        self.candidates.first()
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }
}

impl FromStr for ProxyDecision {
    type Err = PacError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

impl fmt::Display for ProxyDecision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (i, candidate) in self.candidates.iter().enumerate() {
            if i > 0 {
                f.write_str("; ")?;
            }
            write!(f, "{}", candidate)?;
        }
        Ok(())
    }
}

impl<'a> IntoIterator for &'a ProxyDecision {
    type Item = &'a ProxyCandidate;
    type IntoIter = std::slice::Iter<'a, ProxyCandidate>;

    fn into_iter(self) -> Self::IntoIter {
        self.candidates.iter()
    }
}
