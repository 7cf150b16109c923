use std::fmt;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::str::FromStr;

use ipnet::IpNet;

use crate::common::{PacError, Result};

/// CIDR 网络：保留原始基地址（不做归一化），匹配时按前缀长度比较
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetworkMask {
    base: IpAddr,
    net: IpNet,
}

impl NetworkMask {
    /// 前缀超出地址族宽度时报 AddrParse
    pub fn new(base: IpAddr, prefix_len: u8) -> Result<Self> {
        let net = IpNet::new(base, prefix_len).map_err(|_| {
            PacError::AddrParse(format!("prefix length {} out of range for {}", prefix_len, base))
        })?;
        Ok(Self { base, net })
    }

    pub fn base(&self) -> IpAddr {
        self.base
    }

    pub fn prefix_len(&self) -> u8 {
        self.net.prefix_len()
    }

    /// 前缀 0 时同族地址全部命中；前缀满宽度时退化为相等比较
    pub fn contains(&self, addr: IpAddr) -> bool {
        self.net.contains(&addr)
    }
}

impl FromStr for NetworkMask {
    type Err = PacError;

    fn from_str(s: &str) -> Result<Self> {
        let (addr, len) = s
            .split_once('/')
            .ok_or_else(|| PacError::AddrParse(format!("'{}': missing prefix length", s)))?;
        let base = super::parse_ip(addr)?;
        let prefix_len: u8 = len
            .parse()
            .map_err(|_| PacError::AddrParse(format!("'{}': invalid prefix length", s)))?;
        Self::new(base, prefix_len)
    }
}

impl fmt::Display for NetworkMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.base, self.net.prefix_len())
    }
}

/// 用点分（或 IPv6 文本）掩码对地址做按位与
pub fn apply_mask(addr: IpAddr, mask: IpAddr) -> Result<IpAddr> {
    match (addr, mask) {
        (IpAddr::V4(a), IpAddr::V4(m)) => {
            Ok(IpAddr::V4(Ipv4Addr::from(u32::from(a) & u32::from(m))))
        }
        (IpAddr::V6(a), IpAddr::V6(m)) => {
            Ok(IpAddr::V6(Ipv6Addr::from(u128::from(a) & u128::from(m))))
        }
        _ => Err(PacError::AddrParse(format!(
            "mask {} does not match address family of {}",
            mask, addr
        ))),
    }
}

/// `(addr & mask) == (net & mask)`；任意两者地址族不同则为 false
pub fn masked_equal(addr: IpAddr, net: IpAddr, mask: IpAddr) -> bool {
    match (apply_mask(addr, mask), apply_mask(net, mask)) {
        (Ok(a), Ok(n)) => a == n,
        _ => false,
    }
}
