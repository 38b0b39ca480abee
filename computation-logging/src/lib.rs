//! Structured logging initialisation for the local computation engine
//!
//! Wraps `tracing-subscriber` so entry points can install a global
//! subscriber from a [`LoggingConfig`] or from a bare level string.

pub mod init;

pub use computation_config::{LogFormat, LogLevel, LoggingConfig};
pub use init::{build_env_filter, init_logging_from_config, init_simple_tracing};
