//! Local computation engine configuration

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use crate::validation::{Validatable, validate_directory_path, validate_positive};
use crate::error::ConfigResult;

/// Configuration of the local computation engine
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LocalComputationConfig {
    /// Directory under which the common and per-batch working directories are created
    #[serde(default = "default_local_dir")]
    pub local_dir: PathBuf,

    /// Number of batches allowed to run at the same time
    #[serde(default = "default_available_core")]
    pub available_core: usize,
}

impl LocalComputationConfig {
    /// Create a configuration rooted at `local_dir` with the default core count
    pub fn new(local_dir: impl Into<PathBuf>) -> Self {
        Self {
            local_dir: local_dir.into(),
            available_core: default_available_core(),
        }
    }

    /// Builder pattern for setting the core count
    pub fn with_available_core(mut self, available_core: usize) -> Self {
        self.available_core = available_core;
        self
    }
}

impl Default for LocalComputationConfig {
    fn default() -> Self {
        Self {
            local_dir: default_local_dir(),
            available_core: default_available_core(),
        }
    }
}

impl fmt::Display for LocalComputationConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LocalComputationConfig(local_dir={}, available_core={})",
            self.local_dir.display(),
            self.available_core
        )
    }
}

impl Validatable for LocalComputationConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_directory_path(&self.local_dir, "local_dir", self.domain_name())?;
        validate_positive(self.available_core, "available_core", self.domain_name())?;

        let cpus = num_cpus::get();
        if self.available_core > cpus {
            log::warn!(
                "available_core {} exceeds the {} logical CPUs of this host",
                self.available_core,
                cpus
            );
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "local"
    }
}

// Default value functions
fn default_local_dir() -> PathBuf {
    std::env::temp_dir()
}

fn default_available_core() -> usize {
    num_cpus::get().max(1)
}
