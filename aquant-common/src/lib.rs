//! aquant common - shared configuration, errors, and logging.
//!
//! This crate provides:
//! - Configuration types and modular loading (`config.json` + `trading.json`)
//! - Configuration validation
//! - The unified error type
//! - Logging setup

#![warn(clippy::all)]
#![allow(clippy::pedantic)]

pub mod config;
pub mod config_loader;
pub mod error;
pub mod logging;
pub mod validation;

pub use config::{
    Config, CycleSection, DataConfig, DipSection, HalfwaySection, MonitorSection,
    ObservabilityConfig, OrchestratorSection, ServerConfig, ThemeSection, TradingConfig,
};
pub use error::{Error, Result, ResultExt};
pub use validation::{Validate, ValidationError, ValidationResult};

/// Re-export commonly used types for convenience
pub mod prelude {
    pub use crate::config::{Config, TradingConfig};
    pub use crate::error::{Error, Result, ResultExt};
    pub use crate::logging::init_logging;
    pub use crate::validation::{Validate, ValidationError};
}
