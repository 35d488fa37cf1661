//! Error taxonomy for the gate pipeline.
//!
//! - [`GateError::Input`]: malformed or missing snapshot/metrics/bars. Each stage
//!   resolves it locally into its most conservative verdict (BLOCK, FAIL, REJECT);
//!   it never escapes [`crate::pipeline::Orchestrator::evaluate`].
//! - [`GateError::Config`]: invalid thresholds. Raised only while constructing the
//!   orchestrator.
//! - [`GateError::State`]: sentry state corruption. Fatal: the sentry latches it and
//!   refuses every check until an operator reset.

use gate_common::validation::ValidationError;
use thiserror::Error;

/// Result alias for gate operations.
pub type GateResult<T> = std::result::Result<T, GateError>;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GateError {
    #[error("input error: {0}")]
    Input(String),

    #[error("config error: {0}")]
    Config(String),

    #[error("sentry state error: {0}")]
    State(String),
}

impl GateError {
    pub fn input(msg: impl Into<String>) -> Self {
        Self::Input(msg.into())
    }

    pub fn state(msg: impl Into<String>) -> Self {
        Self::State(msg.into())
    }

    /// Whether new evaluations must stop until the condition is resolved.
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::Config(_) | Self::State(_))
    }
}

impl From<ValidationError> for GateError {
    fn from(err: ValidationError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<GateError> for gate_common::Error {
    fn from(err: GateError) -> Self {
        match err {
            GateError::Input(msg) => Self::InvalidInput(msg),
            GateError::Config(msg) => Self::Config(msg),
            GateError::State(msg) => Self::Unavailable(msg),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fatality() {
        assert!(!GateError::input("short series").is_fatal());
        assert!(GateError::Config("bad".into()).is_fatal());
        assert!(GateError::state("poisoned").is_fatal());
    }

    #[test]
    fn test_state_error_maps_to_unavailable() {
        let err: gate_common::Error = GateError::state("poisoned").into();
        assert_eq!(err.status_code(), 503);
    }
}
