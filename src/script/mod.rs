//! PAC 脚本宿主（boa_engine）
//!
//! 每份脚本在 parse 时执行一次顶层代码，之后的求值都复用同一个 boa `Context`，
//! 脚本的全局变量在调用之间保留，直到脚本被替换或会话清理。
//! `Context` 不能跨线程，因此它由一个专用线程持有，调用方通过通道提交求值请求。

pub mod calendar;
pub mod host_api;

use std::sync::Arc;
use std::thread::JoinHandle;

use boa_engine::vm::RuntimeLimits;
use boa_engine::{Context, JsError, JsObject, JsResult, JsString, JsValue, Source};
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::common::{EvaluationErrorKind, PacError, Result};
use crate::config::types::LimitsConfig;

pub use host_api::{HostEnv, HostFunction, HostValue};

const ENTRY_POINT: &str = "FindProxyForURL";
const ENTRY_POINT_EX: &str = "FindProxyForURLEx";

enum Command {
    Evaluate {
        url: String,
        host: String,
        limits: LimitsConfig,
        reply: oneshot::Sender<Result<String>>,
    },
    Shutdown,
}

/// 已加载的 PAC 脚本及其执行上下文
pub struct ScriptHost {
    commands: mpsc::UnboundedSender<Command>,
    worker: Option<JoinHandle<()>>,
    source_len: usize,
}

impl ScriptHost {
    /// 执行脚本顶层代码并确认入口函数存在，不调用入口函数
    pub fn compile(source: &str, env: &Arc<HostEnv>, limits: &LimitsConfig) -> Result<Self> {
        let (commands, inbox) = mpsc::unbounded_channel();
        let (ready_tx, ready_rx) = oneshot::channel();
        let source_owned = source.to_string();
        let env = Arc::clone(env);
        let limits = limits.clone();

        let worker = std::thread::Builder::new()
            .name("pacengine-script".into())
            .spawn(move || run_worker(source_owned, env, limits, ready_tx, inbox))?;

        let loaded = ready_rx
            .blocking_recv()
            .unwrap_or_else(|_| Err(PacError::Script("script context terminated".into())));
        if let Err(e) = loaded {
            let _ = worker.join();
            return Err(e);
        }
        Ok(Self {
            commands,
            worker: Some(worker),
            source_len: source.len(),
        })
    }

    pub fn source_len(&self) -> usize {
        self.source_len
    }

    /// 调用入口函数，返回值按 JS ToString 转成字符串
    pub fn evaluate(&self, url: &str, host: &str, limits: &LimitsConfig) -> Result<String> {
        let (reply, response) = oneshot::channel();
        self.commands
            .send(Command::Evaluate {
                url: url.to_string(),
                host: host.to_string(),
                limits: limits.clone(),
                reply,
            })
            .map_err(|_| PacError::Other(anyhow::anyhow!("script context terminated")))?;
        response
            .blocking_recv()
            .map_err(|_| PacError::Other(anyhow::anyhow!("script context terminated")))?
    }
}

impl Drop for ScriptHost {
    fn drop(&mut self) {
        let _ = self.commands.send(Command::Shutdown);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

fn run_worker(
    source: String,
    env: Arc<HostEnv>,
    limits: LimitsConfig,
    ready: oneshot::Sender<Result<()>>,
    mut inbox: mpsc::UnboundedReceiver<Command>,
) {
    let mut script = match LoadedScript::load(&source, env, &limits) {
        Ok(script) => {
            let _ = ready.send(Ok(()));
            script
        }
        Err(e) => {
            let _ = ready.send(Err(e));
            return;
        }
    };
    drop(source);

    while let Some(command) = inbox.blocking_recv() {
        match command {
            Command::Evaluate {
                url,
                host,
                limits,
                reply,
            } => {
                let _ = reply.send(script.evaluate(&url, &host, &limits));
            }
            Command::Shutdown => break,
        }
    }
    debug!("PAC script context released");
}

/// 持有 `Context` 的脚本状态，只在脚本线程里存在
struct LoadedScript {
    context: Context,
    env: Arc<HostEnv>,
    extensions_bound: bool,
}

impl LoadedScript {
    fn load(source: &str, env: Arc<HostEnv>, limits: &LimitsConfig) -> Result<Self> {
        let mut context = Context::default();
        apply_limits(&mut context, limits);
        host_api::register(&mut context, &env)
            .map_err(|e| PacError::Script(format!("failed to bind host functions: {}", e)))?;
        let extensions_bound = env.microsoft_extensions();

        env.take_misuse();
        context
            .eval(Source::from_bytes(source.as_bytes()))
            .map_err(|e| PacError::Script(e.to_string()))?;

        match entry_point(&mut context, extensions_bound) {
            Ok(Some((name, _))) => debug!(entry = name, bytes = source.len(), "PAC script compiled"),
            Ok(None) => return Err(PacError::Script(format!("{} is not defined", ENTRY_POINT))),
            Err(e) => return Err(PacError::Script(e.to_string())),
        }
        Ok(Self {
            context,
            env,
            extensions_bound,
        })
    }

    /// 让扩展函数的可见性跟上 env 当前开关
    fn sync_extensions(&mut self) -> Result<()> {
        let wanted = self.env.microsoft_extensions();
        if wanted == self.extensions_bound {
            return Ok(());
        }
        let bound = if wanted {
            host_api::bind_extensions(&mut self.context, &self.env)
        } else {
            host_api::unbind_extensions(&mut self.context)
        };
        bound.map_err(|e| PacError::Script(format!("failed to toggle extension functions: {}", e)))?;
        debug!(enabled = wanted, "extension functions toggled");
        self.extensions_bound = wanted;
        Ok(())
    }

    fn evaluate(&mut self, url: &str, host: &str, limits: &LimitsConfig) -> Result<String> {
        self.env.take_misuse();
        apply_limits(&mut self.context, limits);
        self.sync_extensions()?;

        let (name, func) = entry_point(&mut self.context, self.extensions_bound)
            .map_err(|e| classify(e, &self.env))?
            .ok_or_else(|| PacError::Script(format!("{} is not defined", ENTRY_POINT)))?;

        let args = [
            JsValue::from(JsString::from(url)),
            JsValue::from(JsString::from(host)),
        ];
        let result = func
            .call(&JsValue::undefined(), &args, &mut self.context)
            .map_err(|e| classify(e, &self.env))?;
        let decision = result
            .to_string(&mut self.context)
            .map_err(|e| classify(e, &self.env))?
            .to_std_string_escaped();

        debug!(entry = name, url = url, host = host, decision = decision.as_str(), "PAC evaluated");
        Ok(decision)
    }
}

fn apply_limits(context: &mut Context, limits: &LimitsConfig) {
    let mut runtime_limits = RuntimeLimits::default();
    runtime_limits.set_loop_iteration_limit(limits.loop_iterations);
    runtime_limits.set_recursion_limit(limits.recursion);
    context.set_runtime_limits(runtime_limits);
}

/// 扩展开启时优先 FindProxyForURLEx
fn entry_point(
    context: &mut Context,
    microsoft_extensions: bool,
) -> JsResult<Option<(&'static str, JsObject)>> {
    let candidates: &[&'static str] = if microsoft_extensions {
        &[ENTRY_POINT_EX, ENTRY_POINT]
    } else {
        &[ENTRY_POINT]
    };
    let global = context.global_object();
    for name in candidates {
        let value = global.get(JsString::from(*name), context)?;
        if let Some(func) = value.as_callable() {
            return Ok(Some((*name, func.clone())));
        }
    }
    Ok(None)
}

fn classify(err: JsError, env: &HostEnv) -> PacError {
    let runaway = err
        .as_native()
        .map(|native| format!("{:?}", native).contains("RuntimeLimit"))
        .unwrap_or(false);
    if runaway {
        return PacError::evaluation(EvaluationErrorKind::Timeout, err.to_string());
    }
    if let Some(message) = env.take_misuse() {
        return PacError::evaluation(EvaluationErrorKind::HostMisuse, message);
    }
    PacError::evaluation(EvaluationErrorKind::Exception, err.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::types::{DnsConfig, ResolverVariant};
    use crate::dns::BlockingResolver;

    fn env(extensions: bool) -> Arc<HostEnv> {
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
        Arc::new(HostEnv::new(lookup, None, extensions))
    }

    fn limits() -> LimitsConfig {
        LimitsConfig {
            loop_iterations: 10_000,
            recursion: 64,
        }
    }

    #[test]
    fn compile_and_evaluate() {
        let env = env(true);
        let script = ScriptHost::compile(
            "function FindProxyForURL(url, host) { return 'PROXY ' + host + ':3128; DIRECT'; }",
            &env,
            &limits(),
        )
        .unwrap();
        let out = script.evaluate("http://a.example/", "a.example", &limits()).unwrap();
        assert_eq!(out, "PROXY a.example:3128; DIRECT");
    }

    #[test]
    fn globals_persist_between_calls() {
        let env = env(true);
        let script = ScriptHost::compile(
            "var n = 0; function FindProxyForURL(url, host) { n++; return 'PROXY p:' + n; }",
            &env,
            &limits(),
        )
        .unwrap();
        assert_eq!(script.evaluate("http://x/", "x", &limits()).unwrap(), "PROXY p:1");
        assert_eq!(script.evaluate("http://x/", "x", &limits()).unwrap(), "PROXY p:2");
    }

    #[test]
    fn top_level_code_runs_once() {
        let env = env(true);
        let script = ScriptHost::compile(
            "var loads = (typeof loads === 'number') ? loads + 1 : 1;\n\
             function FindProxyForURL(url, host) { return String(loads); }",
            &env,
            &limits(),
        )
        .unwrap();
        for _ in 0..3 {
            assert_eq!(script.evaluate("http://x/", "x", &limits()).unwrap(), "1");
        }
    }

    #[test]
    fn syntax_error_is_script_error() {
        let err = ScriptHost::compile("function FindProxyForURL(url, host) {", &env(true), &limits())
            .err()
            .unwrap();
        assert!(matches!(err, PacError::Script(_)));
    }

    #[test]
    fn missing_entry_point_is_script_error() {
        let err = ScriptHost::compile("var x = 1;", &env(true), &limits()).err().unwrap();
        assert!(matches!(err, PacError::Script(_)));
    }

    #[test]
    fn ex_entry_point_preferred_only_with_extensions() {
        let source = "function FindProxyForURL(u, h) { return 'DIRECT'; }\n\
                      function FindProxyForURLEx(u, h) { return 'PROXY ex:1'; }";
        let env = env(true);
        let script = ScriptHost::compile(source, &env, &limits()).unwrap();
        assert_eq!(script.evaluate("http://x/", "x", &limits()).unwrap(), "PROXY ex:1");

        env.set_microsoft_extensions(false);
        assert_eq!(script.evaluate("http://x/", "x", &limits()).unwrap(), "DIRECT");

        let ex_only = "function FindProxyForURLEx(u, h) { return 'PROXY ex:1'; }";
        assert!(ScriptHost::compile(ex_only, &env, &limits()).is_err());
    }

    #[test]
    fn thrown_value_is_exception() {
        let env = env(true);
        let script = ScriptHost::compile(
            "function FindProxyForURL(url, host) { throw 'boom'; }",
            &env,
            &limits(),
        )
        .unwrap();
        match script.evaluate("http://x/", "x", &limits()).unwrap_err() {
            PacError::Evaluation { kind, message } => {
                assert_eq!(kind, EvaluationErrorKind::Exception);
                assert!(message.contains("boom"));
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn infinite_loop_trips_guard() {
        let env = env(true);
        let script = ScriptHost::compile(
            "function FindProxyForURL(url, host) { while (true) {} }",
            &env,
            &limits(),
        )
        .unwrap();
        let err = script.evaluate("http://x/", "x", &limits()).unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
        // 上下文在超限后仍可用
        let err = script.evaluate("http://x/", "x", &limits()).unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
    }

    #[test]
    fn runaway_recursion_trips_guard() {
        let env = env(true);
        let script = ScriptHost::compile(
            "function f(n) { return f(n + 1); }\nfunction FindProxyForURL(url, host) { return f(0); }",
            &env,
            &limits(),
        )
        .unwrap();
        let err = script.evaluate("http://x/", "x", &limits()).unwrap_err();
        assert!(err.is_timeout(), "{err:?}");
    }

    #[test]
    fn host_function_misuse() {
        let env = env(true);
        let script = ScriptHost::compile(
            "function FindProxyForURL(url, host) { return isInNet(host) ? 'DIRECT' : 'PROXY p:1'; }",
            &env,
            &limits(),
        )
        .unwrap();
        match script.evaluate("http://x/", "x", &limits()).unwrap_err() {
            PacError::Evaluation { kind, .. } => assert_eq!(kind, EvaluationErrorKind::HostMisuse),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn extension_functions_follow_the_toggle() {
        let source = "function FindProxyForURL(url, host) { return typeof isInNetEx + ',' + typeof dnsResolveEx + ',' + typeof isInNet; }";
        let env = env(false);
        let script = ScriptHost::compile(source, &env, &limits()).unwrap();
        assert_eq!(
            script.evaluate("http://x/", "x", &limits()).unwrap(),
            "undefined,undefined,function"
        );
        env.set_microsoft_extensions(true);
        assert_eq!(
            script.evaluate("http://x/", "x", &limits()).unwrap(),
            "function,function,function"
        );
        env.set_microsoft_extensions(false);
        assert_eq!(
            script.evaluate("http://x/", "x", &limits()).unwrap(),
            "undefined,undefined,function"
        );
    }

    #[test]
    fn null_result_stringifies() {
        let env = env(true);
        let script = ScriptHost::compile(
            "function FindProxyForURL(url, host) { return dnsResolve(host); }",
            &env,
            &limits(),
        )
        .unwrap();
        assert_eq!(script.evaluate("http://x/", "www.google.com", &limits()).unwrap(), "null");
        assert_eq!(script.evaluate("http://x/", "10.0.0.1", &limits()).unwrap(), "10.0.0.1");
    }
}
