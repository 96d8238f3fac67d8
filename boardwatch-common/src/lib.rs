//! Boardwatch Common - Shared configuration, errors, and logging for the
//! boardwatch limit-up monitor.
//!
//! This crate provides:
//! - Configuration types, loading, and persistence
//! - Error types and handling utilities
//! - Logging setup and noise filtering

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;

pub use config::{Config, MonitorConfig, ObservabilityConfig, ServerConfig};
pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, MonitorConfig, ServerConfig};
    pub use crate::error::{Error, Result};
    pub use crate::logging::init_logging;
}
