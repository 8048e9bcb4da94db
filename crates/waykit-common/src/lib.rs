//! # Waykit Common
//!
//! Shared pieces for the waykit crates.
//!
//! ## Features
//!
//! - A small error type for timeouts and bad arguments
//! - Logging configuration and setup
//! - Retry and timeout utilities used by precaching

use std::time::Duration;
use thiserror::Error;

pub mod logging;
pub mod retry;

pub use logging::{init_logging, try_init_logging, LogConfig, LogFormat};
pub use retry::{retry_with_backoff, with_timeout, RetryConfig};

/// Errors raised by the shared helpers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommonError {
    /// Timeout errors.
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// Invalid argument.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl CommonError {
    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        matches!(self, CommonError::Timeout(_))
    }

    /// Get the error category for log fields.
    pub fn category(&self) -> &'static str {
        match self {
            CommonError::Timeout(_) => "timeout",
            CommonError::InvalidArgument(_) => "invalid_argument",
        }
    }
}

/// Result type alias for the shared helpers.
pub type Result<T> = std::result::Result<T, CommonError>;
