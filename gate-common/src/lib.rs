//! Gate Common - Shared configuration, validation, errors and logging for the gate engine.
//!
//! This crate provides:
//! - Configuration types and loading (service settings plus per-stage thresholds)
//! - Configuration validation
//! - Error types and handling utilities
//! - Logging setup and structured logging helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, MacroThresholds, NetworkConfig, ObservabilityConfig, PartialTakeProfit,
    RiskThresholds, RotationThresholds, SelectorThresholds, SentryThresholds, SignalThresholds,
    ThresholdsConfig,
};
pub use error::{Error, Result};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, ThresholdsConfig};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
