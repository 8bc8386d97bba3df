//! Spring configuration errors

use thiserror::Error;

/// Errors raised while validating a [`SpringConfig`](crate::SpringConfig)
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    /// A physical coefficient was below zero
    #[error("{field} must be greater than or equal to 0, got {value}")]
    Negative { field: &'static str, value: f64 },

    /// A parameter was NaN or infinite
    #[error("{field} must be a finite number, got {value}")]
    NotFinite { field: &'static str, value: f64 },

    /// Mass of zero has no finite natural frequency. Stricter than the
    /// non-negative rule applied to the other coefficients: `0.0` is rejected
    /// here, not just negatives.
    #[error("mass must be greater than 0")]
    ZeroMass,

    /// Bounciness outside of `0.0..=1.0`
    #[error("bounciness must be within 0..=1, got {0}")]
    BouncinessOutOfRange(f64),

    /// Speed of zero or below
    #[error("speed must be greater than 0, got {0}")]
    NonPositiveSpeed(f64),

    /// A rest threshold of zero or below would never be satisfied
    #[error("{field} must be greater than 0, got {value}")]
    NonPositiveThreshold { field: &'static str, value: f64 },

    /// The RK4 step cap must allow some progress
    #[error("max_step_ms must be greater than 0, got {0}")]
    NonPositiveStep(f64),
}

impl ConfigError {
    /// Name of the offending configuration field
    pub fn field(&self) -> &'static str {
        match self {
            ConfigError::Negative { field, .. }
            | ConfigError::NotFinite { field, .. }
            | ConfigError::NonPositiveThreshold { field, .. } => field,
            ConfigError::ZeroMass => "mass",
            ConfigError::BouncinessOutOfRange(_) => "bounciness",
            ConfigError::NonPositiveSpeed(_) => "speed",
            ConfigError::NonPositiveStep(_) => "max_step_ms",
        }
    }
}

/// Result type for spring configuration
pub type Result<T> = std::result::Result<T, ConfigError>;
