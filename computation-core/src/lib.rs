//! Core domain models and types for the local computation engine
//!
//! This crate contains the command model, execution reports, the error
//! taxonomy and the hook traits through which callers plug into batch
//! execution. It has no knowledge of processes or the filesystem.

pub mod command;
pub mod error;
pub mod execution;
pub mod handler;
pub mod status;

// Re-export commonly used types at the crate root
pub use command::{
    Command, CommandKind, FileName, FilePostProcessor, FilePreProcessor, GroupCommandBuilder,
    InputFile, OutputFile, ProgramInvocation, SimpleCommandBuilder, INDEX_PLACEHOLDER,
};
pub use error::{ComputationError, ComputationResult};
pub use execution::{CommandExecution, ExecutionEnvironment, ExecutionError, ExecutionReport};
pub use handler::{ExecutionHandler, ExecutionListener};
pub use status::ResourcesStatus;
