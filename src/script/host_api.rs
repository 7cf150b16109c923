//! 暴露给 PAC 脚本的宿主函数表
//!
//! 只有 [`HostFunction::ALL`] 中的函数会被注入全局命名空间；
//! Microsoft 扩展函数仅在开启时存在，关闭时从全局对象删除，脚本里 `typeof` 为 "undefined"。

use std::net::IpAddr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use boa_engine::{Context, JsNativeError, JsResult, JsString, JsValue, NativeFunction};
use boa_gc::{Finalize, Trace};
use regex::Regex;
use tracing::{debug, trace};

use crate::dns::BlockingResolver;
use crate::net;

use super::calendar::{self, Now};

/// 宿主函数可见的会话环境。
///
/// 脚本上下文持有它的共享句柄；会话的 setter 原地更新，无需重新 parse。
pub struct HostEnv {
    lookup: RwLock<Arc<BlockingResolver>>,
    my_ip: RwLock<Option<IpAddr>>,
    microsoft_extensions: AtomicBool,
    misuse: Mutex<Option<String>>,
}

impl HostEnv {
    pub fn new(lookup: BlockingResolver, my_ip: Option<IpAddr>, microsoft_extensions: bool) -> Self {
        Self {
            lookup: RwLock::new(Arc::new(lookup)),
            my_ip: RwLock::new(my_ip),
            microsoft_extensions: AtomicBool::new(microsoft_extensions),
            misuse: Mutex::new(None),
        }
    }

    pub fn microsoft_extensions(&self) -> bool {
        self.microsoft_extensions.load(Ordering::SeqCst)
    }

    pub fn set_microsoft_extensions(&self, enabled: bool) {
        self.microsoft_extensions.store(enabled, Ordering::SeqCst);
    }

    pub fn set_my_ip(&self, ip: Option<IpAddr>) {
        *self.my_ip.write().unwrap_or_else(|e| e.into_inner()) = ip;
    }

    pub fn set_lookup(&self, lookup: BlockingResolver) {
        *self.lookup.write().unwrap_or_else(|e| e.into_inner()) = Arc::new(lookup);
    }

    /// 当前解析器；取出后再查询，查询期间不持锁
    fn lookup(&self) -> Arc<BlockingResolver> {
        Arc::clone(&self.lookup.read().unwrap_or_else(|e| e.into_inner()))
    }

    /// 取出并清空最近一次宿主函数误用记录
    pub fn take_misuse(&self) -> Option<String> {
        self.misuse.lock().unwrap_or_else(|e| e.into_inner()).take()
    }

    fn record_misuse(&self, message: &str) {
        *self.misuse.lock().unwrap_or_else(|e| e.into_inner()) = Some(message.to_string());
    }

    fn my_addresses(&self) -> Vec<IpAddr> {
        let my_ip = *self.my_ip.read().unwrap_or_else(|e| e.into_inner());
        match my_ip {
            Some(ip) => vec![ip],
            None => self.lookup().local_addresses(),
        }
    }
}

/// 宿主函数返回值
#[derive(Debug, Clone, PartialEq)]
pub enum HostValue {
    Bool(bool),
    Str(String),
    Number(i32),
    Null,
}

impl HostValue {
    fn into_js(self) -> JsValue {
        match self {
            HostValue::Bool(b) => JsValue::from(b),
            HostValue::Str(s) => JsValue::from(JsString::from(s.as_str())),
            HostValue::Number(n) => JsValue::from(n),
            HostValue::Null => JsValue::null(),
        }
    }
}

/// 宿主函数调用失败
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HostCallError {
    /// 参数不足
    Misuse(String),
    /// 作为普通 JS 异常抛出
    Throw(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HostFunction {
    IsPlainHostName,
    DnsDomainIs,
    LocalHostOrDomainIs,
    DnsDomainLevels,
    ShExpMatch,
    IsInNet,
    DnsResolve,
    MyIpAddress,
    IsResolvable,
    WeekdayRange,
    DateRange,
    TimeRange,
    IsInNetEx,
    DnsResolveEx,
    MyIpAddressEx,
    IsResolvableEx,
}

impl HostFunction {
    pub const ALL: [HostFunction; 16] = [
        HostFunction::IsPlainHostName,
        HostFunction::DnsDomainIs,
        HostFunction::LocalHostOrDomainIs,
        HostFunction::DnsDomainLevels,
        HostFunction::ShExpMatch,
        HostFunction::IsInNet,
        HostFunction::DnsResolve,
        HostFunction::MyIpAddress,
        HostFunction::IsResolvable,
        HostFunction::WeekdayRange,
        HostFunction::DateRange,
        HostFunction::TimeRange,
        HostFunction::IsInNetEx,
        HostFunction::DnsResolveEx,
        HostFunction::MyIpAddressEx,
        HostFunction::IsResolvableEx,
    ];

    pub fn name(self) -> &'static str {
        match self {
            HostFunction::IsPlainHostName => "isPlainHostName",
            HostFunction::DnsDomainIs => "dnsDomainIs",
            HostFunction::LocalHostOrDomainIs => "localHostOrDomainIs",
            HostFunction::DnsDomainLevels => "dnsDomainLevels",
            HostFunction::ShExpMatch => "shExpMatch",
            HostFunction::IsInNet => "isInNet",
            HostFunction::DnsResolve => "dnsResolve",
            HostFunction::MyIpAddress => "myIpAddress",
            HostFunction::IsResolvable => "isResolvable",
            HostFunction::WeekdayRange => "weekdayRange",
            HostFunction::DateRange => "dateRange",
            HostFunction::TimeRange => "timeRange",
            HostFunction::IsInNetEx => "isInNetEx",
            HostFunction::DnsResolveEx => "dnsResolveEx",
            HostFunction::MyIpAddressEx => "myIpAddressEx",
            HostFunction::IsResolvableEx => "isResolvableEx",
        }
    }

    /// 最少参数个数（同时作为 JS 函数的 length）
    pub fn arity(self) -> usize {
        match self {
            HostFunction::MyIpAddress
            | HostFunction::MyIpAddressEx
            | HostFunction::WeekdayRange
            | HostFunction::DateRange
            | HostFunction::TimeRange => 0,
            HostFunction::IsPlainHostName
            | HostFunction::DnsDomainLevels
            | HostFunction::DnsResolve
            | HostFunction::DnsResolveEx
            | HostFunction::IsResolvable
            | HostFunction::IsResolvableEx => 1,
            HostFunction::DnsDomainIs
            | HostFunction::LocalHostOrDomainIs
            | HostFunction::ShExpMatch
            | HostFunction::IsInNetEx => 2,
            HostFunction::IsInNet => 3,
        }
    }

    pub fn is_extension(self) -> bool {
        matches!(
            self,
            HostFunction::IsInNetEx
                | HostFunction::DnsResolveEx
                | HostFunction::MyIpAddressEx
                | HostFunction::IsResolvableEx
        )
    }

    pub fn call(self, env: &HostEnv, args: &[String]) -> Result<HostValue, HostCallError> {
        if args.len() < self.arity() {
            return Err(HostCallError::Misuse(format!(
                "{}() expects {} argument(s), got {}",
                self.name(),
                self.arity(),
                args.len()
            )));
        }

        let value = match self {
            HostFunction::IsPlainHostName => HostValue::Bool(!args[0].contains('.')),
            HostFunction::DnsDomainIs => HostValue::Bool(args[0].ends_with(args[1].as_str())),
            HostFunction::LocalHostOrDomainIs => {
                let (host, hostdom) = (&args[0], &args[1]);
                HostValue::Bool(host == hostdom || hostdom.starts_with(&format!("{}.", host)))
            }
            HostFunction::DnsDomainLevels => {
                HostValue::Number(args[0].matches('.').count() as i32)
            }
            HostFunction::ShExpMatch => {
                HostValue::Bool(sh_exp_match(&args[0], &args[1]).map_err(HostCallError::Throw)?)
            }
            HostFunction::IsInNet => HostValue::Bool(is_in_net(env, &args[0], &args[1], &args[2])),
            HostFunction::IsInNetEx => HostValue::Bool(is_in_net_ex(env, &args[0], &args[1])),
            // IP 字面量原样返回，不做规范化
            HostFunction::DnsResolve | HostFunction::DnsResolveEx
                if args[0].parse::<IpAddr>().is_ok() =>
            {
                HostValue::Str(args[0].clone())
            }
            HostFunction::DnsResolve => match env.lookup().resolve_first(&args[0]) {
                Some(ip) => HostValue::Str(ip.to_string()),
                None => HostValue::Null,
            },
            HostFunction::DnsResolveEx => {
                let addrs = env.lookup().resolve_all(&args[0]);
                if addrs.is_empty() {
                    HostValue::Null
                } else {
                    HostValue::Str(join_addresses(&addrs))
                }
            }
            HostFunction::MyIpAddress => {
                let first = env.my_addresses().into_iter().next();
                HostValue::Str(first.map(|ip| ip.to_string()).unwrap_or_else(|| "127.0.0.1".into()))
            }
            HostFunction::MyIpAddressEx => HostValue::Str(join_addresses(&env.my_addresses())),
            HostFunction::IsResolvable => {
                HostValue::Bool(env.lookup().resolve_first(&args[0]).is_some())
            }
            HostFunction::IsResolvableEx => {
                HostValue::Bool(!env.lookup().resolve_all(&args[0]).is_empty())
            }
            HostFunction::WeekdayRange => {
                HostValue::Bool(calendar::weekday_range(args, &Now::current()))
            }
            HostFunction::DateRange => HostValue::Bool(calendar::date_range(args, &Now::current())),
            HostFunction::TimeRange => HostValue::Bool(
                calendar::time_range(args, &Now::current()).map_err(HostCallError::Throw)?,
            ),
        };
        Ok(value)
    }
}

fn join_addresses(addrs: &[IpAddr]) -> String {
    addrs
        .iter()
        .map(|ip| ip.to_string())
        .collect::<Vec<_>>()
        .join(";")
}

/// 全串匹配：`*` 任意串，`?` 单个字符，其余字符按字面量
pub fn sh_exp_match(text: &str, pattern: &str) -> Result<bool, String> {
    let mut re = String::with_capacity(pattern.len() + 8);
    re.push_str("(?s)^");
    for c in pattern.chars() {
        match c {
            '*' => re.push_str(".*"),
            '?' => re.push('.'),
            other => re.push_str(&regex::escape(other.encode_utf8(&mut [0u8; 4]))),
        }
    }
    re.push('$');
    let compiled = Regex::new(&re).map_err(|e| format!("shExpMatch: {}", e))?;
    Ok(compiled.is_match(text))
}

fn is_in_net(env: &HostEnv, host: &str, pattern: &str, mask: &str) -> bool {
    let Some(addr) = env.lookup().resolve_first(host) else {
        return false;
    };
    match (net::parse_ip(pattern), net::parse_ip(mask)) {
        (Ok(pattern), Ok(mask)) => net::masked_equal(addr, pattern, mask),
        _ => false,
    }
}

fn is_in_net_ex(env: &HostEnv, host: &str, prefix: &str) -> bool {
    let Ok(network) = net::parse_cidr(prefix) else {
        return false;
    };
    env.lookup()
        .resolve_all(host)
        .into_iter()
        .any(|addr| network.contains(addr))
}

#[derive(Trace, Finalize)]
struct HostCapture {
    #[unsafe_ignore_trace]
    env: Arc<HostEnv>,
    #[unsafe_ignore_trace]
    function: HostFunction,
}

fn dispatch(
    _this: &JsValue,
    args: &[JsValue],
    capture: &HostCapture,
    ctx: &mut Context,
) -> JsResult<JsValue> {
    let function = capture.function;
    let mut strings = Vec::with_capacity(args.len());
    for arg in args {
        strings.push(arg.to_string(ctx)?.to_std_string_escaped());
    }
    trace!(function = function.name(), args = ?strings, "host call");

    match function.call(&capture.env, &strings) {
        Ok(value) => Ok(value.into_js()),
        Err(HostCallError::Misuse(message)) => {
            debug!(function = function.name(), "host function misuse");
            capture.env.record_misuse(&message);
            Err(JsNativeError::typ().with_message(message).into())
        }
        Err(HostCallError::Throw(message)) => Err(JsNativeError::error().with_message(message).into()),
    }
}

fn bind(context: &mut Context, env: &Arc<HostEnv>, function: HostFunction) -> JsResult<()> {
    let capture = HostCapture {
        env: Arc::clone(env),
        function,
    };
    context.register_global_builtin_callable(
        JsString::from(function.name()),
        function.arity(),
        NativeFunction::from_copy_closure_with_captures(dispatch, capture),
    )
}

/// 把宿主函数注入 context 的全局对象；扩展函数按 env 当前开关决定
pub fn register(context: &mut Context, env: &Arc<HostEnv>) -> JsResult<()> {
    for function in HostFunction::ALL.into_iter().filter(|f| !f.is_extension()) {
        bind(context, env, function)?;
    }
    if env.microsoft_extensions() {
        bind_extensions(context, env)?;
    }
    Ok(())
}

/// 在已有 context 上定义扩展函数
pub fn bind_extensions(context: &mut Context, env: &Arc<HostEnv>) -> JsResult<()> {
    for function in HostFunction::ALL.into_iter().filter(|f| f.is_extension()) {
        bind(context, env, function)?;
    }
    Ok(())
}

/// 从已有 context 的全局对象删除扩展函数
pub fn unbind_extensions(context: &mut Context) -> JsResult<()> {
    let global = context.global_object();
    for function in HostFunction::ALL.into_iter().filter(|f| f.is_extension()) {
        global.delete_property_or_throw(JsString::from(function.name()), context)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{DnsConfig, ResolverVariant};

    fn env(my_ip: Option<&str>) -> HostEnv {
        let runtime = Arc::new(
            tokio::runtime::Builder::new_current_thread()
                .enable_all()
                .build()
                .unwrap(),
        );
        let dns = DnsConfig {
            variant: ResolverVariant::None,
            ..DnsConfig::default()
        };
        let lookup = BlockingResolver::new(&dns, runtime).unwrap();
        HostEnv::new(lookup, my_ip.map(|s| s.parse().unwrap()), true)
    }

    fn call(env: &HostEnv, f: HostFunction, args: &[&str]) -> HostValue {
        let args: Vec<String> = args.iter().map(|s| s.to_string()).collect();
        f.call(env, &args).unwrap()
    }

    #[test]
    fn host_predicates() {
        let e = env(None);
        assert_eq!(call(&e, HostFunction::IsPlainHostName, &["intranet"]), HostValue::Bool(true));
        assert_eq!(call(&e, HostFunction::IsPlainHostName, &["a.b"]), HostValue::Bool(false));
        assert_eq!(
            call(&e, HostFunction::DnsDomainIs, &["www.google.com", ".google.com"]),
            HostValue::Bool(true)
        );
        assert_eq!(
            call(&e, HostFunction::DnsDomainIs, &["www.Google.com", ".google.com"]),
            HostValue::Bool(false)
        );
        assert_eq!(
            call(&e, HostFunction::LocalHostOrDomainIs, &["www", "www.google.com"]),
            HostValue::Bool(true)
        );
        assert_eq!(
            call(&e, HostFunction::LocalHostOrDomainIs, &["home", "www.google.com"]),
            HostValue::Bool(false)
        );
        assert_eq!(call(&e, HostFunction::DnsDomainLevels, &["www.a.b"]), HostValue::Number(2));
    }

    #[test]
    fn sh_exp_is_full_match_glob() {
        assert_eq!(sh_exp_match("http://home.netscape.com/people/ari/index.html", "*/ari/*"), Ok(true));
        assert_eq!(sh_exp_match("http://home.netscape.com/people/montulli/index.html", "*/ari/*"), Ok(false));
        assert_eq!(sh_exp_match("abc", "a?c"), Ok(true));
        assert_eq!(sh_exp_match("abbc", "a?c"), Ok(false));
        assert_eq!(sh_exp_match("a.c", "a.c"), Ok(true));
        assert_eq!(sh_exp_match("abc", "a.c"), Ok(false));
        assert_eq!(sh_exp_match("x(y)+z", "x(y)+z"), Ok(true));
        assert_eq!(sh_exp_match("xabc", "abc"), Ok(false));
    }

    #[test]
    fn is_in_net_with_literals() {
        let e = env(None);
        assert_eq!(
            call(&e, HostFunction::IsInNet, &["1.2.3.4", "1.0.0.0", "255.0.0.0"]),
            HostValue::Bool(true)
        );
        assert_eq!(
            call(&e, HostFunction::IsInNet, &["1.2.3.4", "1.2.3.6", "255.255.255.254"]),
            HostValue::Bool(false)
        );
        assert_eq!(
            call(&e, HostFunction::IsInNet, &["1.2.3.4", "bogus", "255.0.0.0"]),
            HostValue::Bool(false)
        );
        // DNS 关闭时主机名无法解析
        assert_eq!(
            call(&e, HostFunction::IsInNet, &["www.google.com", "0.0.0.0", "0.0.0.0"]),
            HostValue::Bool(false)
        );
        assert_eq!(
            call(&e, HostFunction::IsInNetEx, &["2001:db8::", "2001:db8::1/33"]),
            HostValue::Bool(true)
        );
    }

    #[test]
    fn dns_functions_under_disabled_resolver() {
        let e = env(None);
        assert_eq!(call(&e, HostFunction::DnsResolve, &["10.1.1.1"]), HostValue::Str("10.1.1.1".into()));
        assert_eq!(call(&e, HostFunction::DnsResolve, &["www.google.com"]), HostValue::Null);
        assert_eq!(call(&e, HostFunction::DnsResolveEx, &["www.google.com"]), HostValue::Null);
        assert_eq!(call(&e, HostFunction::IsResolvable, &["www.google.com"]), HostValue::Bool(false));
        assert_eq!(call(&e, HostFunction::IsResolvableEx, &["::1"]), HostValue::Bool(true));
    }

    #[test]
    fn literal_addresses_come_back_verbatim() {
        let e = env(None);
        for literal in ["2001:DB8::1", "2001:0db8:0000::0001", "::FFFF:1.2.3.4", "10.0.0.1"] {
            assert_eq!(
                call(&e, HostFunction::DnsResolve, &[literal]),
                HostValue::Str(literal.into())
            );
            assert_eq!(
                call(&e, HostFunction::DnsResolveEx, &[literal]),
                HostValue::Str(literal.into())
            );
        }
    }

    #[test]
    fn env_updates_in_place() {
        let e = env(None);
        e.set_my_ip(Some("198.51.100.1".parse().unwrap()));
        assert_eq!(call(&e, HostFunction::MyIpAddress, &[]), HostValue::Str("198.51.100.1".into()));
        e.set_my_ip(None);
        assert_eq!(call(&e, HostFunction::MyIpAddress, &[]), HostValue::Str("127.0.0.1".into()));
        e.set_microsoft_extensions(false);
        assert!(!e.microsoft_extensions());
    }

    #[test]
    fn my_ip_override() {
        let e = env(Some("192.0.2.10"));
        assert_eq!(call(&e, HostFunction::MyIpAddress, &[]), HostValue::Str("192.0.2.10".into()));
        assert_eq!(call(&e, HostFunction::MyIpAddressEx, &[]), HostValue::Str("192.0.2.10".into()));
        let e = env(None);
        assert_eq!(call(&e, HostFunction::MyIpAddress, &[]), HostValue::Str("127.0.0.1".into()));
    }

    #[test]
    fn too_few_arguments_is_misuse() {
        let e = env(None);
        let err = HostFunction::IsInNet
            .call(&e, &["1.2.3.4".to_string()])
            .unwrap_err();
        assert!(matches!(err, HostCallError::Misuse(_)));
        let err = HostFunction::TimeRange
            .call(&e, &["1".into(), "2".into(), "3".into()])
            .unwrap_err();
        assert!(matches!(err, HostCallError::Throw(_)));
    }

    #[test]
    fn extension_table() {
        let ext: Vec<&str> = HostFunction::ALL
            .iter()
            .filter(|f| f.is_extension())
            .map(|f| f.name())
            .collect();
        assert_eq!(ext, vec!["isInNetEx", "dnsResolveEx", "myIpAddressEx", "isResolvableEx"]);
    }
}
