//! Local bounded-concurrency execution engine
//!
//! Runs external programs on the local host, at most one batch per available
//! core, each batch isolated in its own working directory. Input files are
//! staged from the working or common directory (optionally gunzipped or
//! unzipped), outputs can be gzipped, and every nonzero exit code ends up in
//! the batch [`ExecutionReport`](computation_core::ExecutionReport).

pub mod default;
pub mod executor;
pub mod manager;
pub mod orchestrator;
pub mod permits;
pub mod pool;
pub mod runner;
pub mod scheduler;
pub mod staging;
pub mod working_dir;

#[cfg(test)]
mod testing;

// Re-export main types
pub use default::{default_manager, init_default, shutdown_default, DefaultManagerGuard};
pub use executor::CommandExecutor;
pub use manager::{LocalComputationManager, LOCAL_VERSION};
pub use orchestrator::{BatchControl, BatchExecutor, ProgressFn};
pub use permits::{CorePermit, PermitPool};
pub use pool::WorkerPool;
pub use runner::{platform_runner, ProcessRegistry, ProcessRunner, ProcessSpec};
pub use scheduler::{BatchState, ComputationHandle};
pub use working_dir::{WorkingDirectory, COMMON_DIR_PREFIX};

#[cfg(unix)]
pub use runner::UnixProcessRunner;
#[cfg(windows)]
pub use runner::WindowsProcessRunner;

// Re-export the model so callers need a single dependency
pub use computation_core::{
    Command, CommandExecution, CommandKind, ComputationError, ComputationResult, ExecutionEnvironment,
    ExecutionError, ExecutionHandler, ExecutionListener, ExecutionReport, FilePostProcessor,
    FilePreProcessor, GroupCommandBuilder, InputFile, OutputFile, ResourcesStatus, SimpleCommandBuilder,
};
pub use computation_config::LocalComputationConfig;
