//! Error types shared by every module

use thiserror::Error;

/// Errors raised by training, evaluation and importance estimation.
///
/// Nothing in the crate retries: every variant is reported straight to the caller.
#[derive(Error, Debug)]
pub enum EwcError {
    /// Shapes or arguments that can never produce a meaningful result
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// A loss or penalty evaluated to NaN or infinity
    #[error("Numeric error in {context}: value {value}")]
    Numeric { context: String, value: f32 },

    /// Config file could not be parsed or rendered
    #[error("Config error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl EwcError {
    pub(crate) fn config(msg: impl Into<String>) -> Self {
        EwcError::Configuration(msg.into())
    }

    /// Fails with `Numeric` unless `value` is finite.
    pub(crate) fn check_finite(value: f32, context: impl Into<String>) -> Result<f32> {
        if value.is_finite() {
            Ok(value)
        } else {
            Err(EwcError::Numeric { context: context.into(), value })
        }
    }
}

impl From<toml::de::Error> for EwcError {
    fn from(e: toml::de::Error) -> Self {
        EwcError::Config(e.to_string())
    }
}

impl From<toml::ser::Error> for EwcError {
    fn from(e: toml::ser::Error) -> Self {
        EwcError::Config(e.to_string())
    }
}

impl From<serde_json::Error> for EwcError {
    fn from(e: serde_json::Error) -> Self {
        EwcError::Serialization(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EwcError>;
