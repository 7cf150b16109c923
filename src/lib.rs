#![allow(
    clippy::len_without_is_empty,
    clippy::manual_range_contains,
    clippy::new_without_default,
    clippy::should_implement_trait
)]

pub mod common;
pub mod config;
pub mod decision;
pub mod dns;
pub mod engine;
pub mod global;
pub mod net;
pub mod script;

pub use common::{EvaluationErrorKind, PacError, PacErrorKind};
pub use config::{EngineConfig, ResolverVariant};
pub use decision::{ProxyCandidate, ProxyDecision, ProxyKind};
pub use engine::{Engine, EngineState};

/// 库版本号
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
