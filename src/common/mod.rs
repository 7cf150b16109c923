pub mod error;

pub use error::{EvaluationErrorKind, PacError, PacErrorKind};

pub type Result<T, E = PacError> = std::result::Result<T, E>;
