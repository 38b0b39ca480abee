//! Domain-driven configuration for the local computation engine
//!
//! Configuration is split by functional domain, with validation, defaults,
//! YAML file loading and environment variable overrides.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;

// Re-export domain configurations
pub use domains::{
    local::LocalComputationConfig,
    logging::{LogFormat, LogLevel, LoggingConfig},
    ComputationConfig,
};
pub use validation::Validatable;
