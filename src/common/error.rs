use thiserror::Error;

/// Why a script evaluation failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EvaluationErrorKind {
    /// The script threw (or a builtin raised) an exception.
    Exception,
    /// The runaway-execution guard (loop/recursion limit) aborted the script.
    Timeout,
    /// A host function was called with an unusable argument list.
    HostMisuse,
}

impl EvaluationErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            EvaluationErrorKind::Exception => "exception",
            EvaluationErrorKind::Timeout => "timeout",
            EvaluationErrorKind::HostMisuse => "host misuse",
        }
    }
}

#[derive(Error, Debug)]
pub enum PacError {
    #[error("state error: {0}")]
    State(String),

    #[error("script error: {0}")]
    Script(String),

    #[error("evaluation error ({}): {message}", kind.as_str())]
    Evaluation {
        kind: EvaluationErrorKind,
        message: String,
    },

    #[error("invalid URL: {0}")]
    InvalidUrl(String),

    #[error("address parse error: {0}")]
    AddrParse(String),

    #[error("malformed proxy decision: {0}")]
    MalformedDecision(String),

    #[error("resolver config error: {0}")]
    ResolverConfig(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl PacError {
    pub(crate) fn evaluation(kind: EvaluationErrorKind, message: impl Into<String>) -> Self {
        PacError::Evaluation {
            kind,
            message: message.into(),
        }
    }

    /// Whether this error means the caller drove the engine wrongly
    /// (wrong lifecycle state, bad configuration) rather than the script
    /// or the input failing.
    pub fn is_caller_misuse(&self) -> bool {
        matches!(self, PacError::State(_) | PacError::ResolverConfig(_))
    }

    /// Whether the runaway guard tripped.
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            PacError::Evaluation {
                kind: EvaluationErrorKind::Timeout,
                ..
            }
        )
    }

    /// Get the kind/category of this error.
    pub fn kind(&self) -> PacErrorKind {
        match self {
            PacError::State(_) => PacErrorKind::State,
            PacError::Script(_) => PacErrorKind::Script,
            PacError::Evaluation { .. } => PacErrorKind::Evaluation,
            PacError::InvalidUrl(_) => PacErrorKind::InvalidUrl,
            PacError::AddrParse(_) => PacErrorKind::AddrParse,
            PacError::MalformedDecision(_) => PacErrorKind::MalformedDecision,
            PacError::ResolverConfig(_) => PacErrorKind::ResolverConfig,
            PacError::Io(_) => PacErrorKind::Io,
            PacError::Other(_) => PacErrorKind::Other,
        }
    }
}

/// Lightweight error category for pattern matching without borrowing the error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacErrorKind {
    State,
    Script,
    Evaluation,
    InvalidUrl,
    AddrParse,
    MalformedDecision,
    ResolverConfig,
    Io,
    Other,
}

impl PacErrorKind {
    pub fn as_str(self) -> &'static str {
        match self {
            PacErrorKind::State => "STATE",
            PacErrorKind::Script => "SCRIPT",
            PacErrorKind::Evaluation => "EVALUATION",
            PacErrorKind::InvalidUrl => "INVALID_URL",
            PacErrorKind::AddrParse => "ADDR_PARSE",
            PacErrorKind::MalformedDecision => "MALFORMED_DECISION",
            PacErrorKind::ResolverConfig => "RESOLVER_CONFIG",
            PacErrorKind::Io => "IO",
            PacErrorKind::Other => "OTHER",
        }
    }
}
