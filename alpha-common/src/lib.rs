//! Alpha Common - Shared types, utilities, and configuration for the alpha shortlist services.
//!
//! This crate provides:
//! - Configuration types and loading
//! - Error types and handling utilities
//! - Logging setup
//! - Atomic file persistence helpers

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod error;
pub mod logging;
pub mod util;

pub use config::{Config, MarketDataConfig, ObservabilityConfig, StorageConfig};
pub use error::{Error, Result};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, MarketDataConfig, ObservabilityConfig, StorageConfig};
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::init_logging;
}
