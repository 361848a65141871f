//! Shared library for the MAL client workspace.
//!
//! This crate provides the ambient pieces used by the client library and the
//! mock service:
//! - Configuration management
//! - Logging infrastructure

pub mod config;
pub mod logging;

// Re-export commonly used types
pub use config::{Config, LoggingConfig, MalConfig};
pub use logging::LogConfig;

/// Common result type using anyhow::Error
pub type Result<T> = anyhow::Result<T>;
