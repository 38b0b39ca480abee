//! Executions of commands and the reports they produce

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use tracing::warn;

use crate::command::Command;
use crate::error::{ComputationError, ComputationResult};

/// A command to run `execution_count` times, indices `0..execution_count`
#[derive(Debug, Clone)]
pub struct CommandExecution {
    command: Arc<Command>,
    execution_count: usize,
    overloaded_variables: HashMap<String, String>,
    index_variables: BTreeMap<usize, HashMap<String, String>>,
}

impl CommandExecution {
    pub fn new(command: impl Into<Arc<Command>>, execution_count: usize) -> ComputationResult<Self> {
        let command = command.into();
        if execution_count == 0 {
            return Err(ComputationError::InvalidCommand(format!(
                "execution count of command '{}' must be at least 1",
                command.id()
            )));
        }
        Ok(Self {
            command,
            execution_count,
            overloaded_variables: HashMap::new(),
            index_variables: BTreeMap::new(),
        })
    }

    /// Variables overriding the environment for every index of this execution
    pub fn with_variables(mut self, variables: HashMap<String, String>) -> Self {
        self.overloaded_variables = variables;
        self
    }

    /// Variables overriding the environment for a single index
    pub fn with_index_variables(mut self, index: usize, variables: HashMap<String, String>) -> Self {
        self.index_variables.insert(index, variables);
        self
    }

    pub fn command(&self) -> &Arc<Command> {
        &self.command
    }

    pub fn execution_count(&self) -> usize {
        self.execution_count
    }

    /// Merge `base` with this execution's variables; per-index values win over
    /// execution-wide ones, which win over `base`
    pub fn execution_variables(
        &self,
        base: &HashMap<String, String>,
        index: usize,
    ) -> HashMap<String, String> {
        let mut variables = base.clone();
        variables.extend(
            self.overloaded_variables
                .iter()
                .map(|(k, v)| (k.clone(), v.clone())),
        );
        if let Some(per_index) = self.index_variables.get(&index) {
            variables.extend(per_index.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
        variables
    }
}

/// Where and how a batch runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutionEnvironment {
    /// Prefix of the batch working directory name
    pub working_dir_prefix: String,
    /// Keep the working directory after the batch for inspection
    #[serde(default)]
    pub debug: bool,
    /// Environment variables passed to every program of the batch
    #[serde(default)]
    pub variables: HashMap<String, String>,
}

impl ExecutionEnvironment {
    pub fn new(
        variables: HashMap<String, String>,
        working_dir_prefix: impl Into<String>,
        debug: bool,
    ) -> Self {
        Self {
            working_dir_prefix: working_dir_prefix.into(),
            debug,
            variables,
        }
    }
}

/// One (command, index) run that returned a nonzero exit code
#[derive(Debug, Clone)]
pub struct ExecutionError {
    command: Arc<Command>,
    index: usize,
    exit_code: i32,
}

impl ExecutionError {
    pub fn new(command: Arc<Command>, index: usize, exit_code: i32) -> Self {
        Self {
            command,
            index,
            exit_code,
        }
    }

    pub fn command(&self) -> &Arc<Command> {
        &self.command
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn exit_code(&self) -> i32 {
        self.exit_code
    }
}

impl fmt::Display for ExecutionError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "command '{}' failed at index {} with exit code {}",
            self.command.id(),
            self.index,
            self.exit_code
        )
    }
}

/// Errors collected over a batch, in execution order; empty means full success
#[derive(Debug, Clone, Default)]
pub struct ExecutionReport {
    errors: Vec<ExecutionError>,
}

impl ExecutionReport {
    pub fn new(errors: Vec<ExecutionError>) -> Self {
        Self { errors }
    }

    pub fn errors(&self) -> &[ExecutionError] {
        &self.errors
    }

    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    /// Log every error at warn level
    pub fn log(&self) {
        for error in &self.errors {
            warn!(
                command = error.command.id(),
                index = error.index,
                exit_code = error.exit_code,
                "Execution failed: {}",
                error.command.describe(error.index)
            );
        }
    }
}
