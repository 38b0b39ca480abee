//! Command model: programs to run and the files they consume and produce

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::{ComputationError, ComputationResult};

/// Token replaced by the execution index in file names and arguments
pub const INDEX_PLACEHOLDER: &str = "{index}";

fn substitute_index(template: &str, index: usize) -> String {
    template.replace(INDEX_PLACEHOLDER, &index.to_string())
}

/// Name of a staged file, either fixed or derived from the execution index
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileName {
    /// Same name for every execution index
    Fixed(String),
    /// Pattern in which `{index}` is replaced by the execution index
    Indexed(String),
}

impl FileName {
    /// Create a file name, indexed if it contains the index placeholder
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        if name.contains(INDEX_PLACEHOLDER) {
            FileName::Indexed(name)
        } else {
            FileName::Fixed(name)
        }
    }

    /// Resolve the name for an execution index
    pub fn name(&self, index: usize) -> String {
        match self {
            FileName::Fixed(name) => name.clone(),
            FileName::Indexed(pattern) => substitute_index(pattern, index),
        }
    }

    /// Whether the resolved name changes with the execution index
    pub fn depends_on_index(&self) -> bool {
        matches!(self, FileName::Indexed(_))
    }
}

impl From<&str> for FileName {
    fn from(name: &str) -> Self {
        FileName::new(name)
    }
}

impl From<String> for FileName {
    fn from(name: String) -> Self {
        FileName::new(name)
    }
}

impl fmt::Display for FileName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileName::Fixed(name) | FileName::Indexed(name) => write!(f, "{}", name),
        }
    }
}

/// Transformation applied to an input file while it is staged
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilePreProcessor {
    /// Decompress a gzip file, dropping its `.gz` suffix
    FileGunzip,
    /// Extract every entry of a zip archive
    ArchiveUnzip,
}

impl fmt::Display for FilePreProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilePreProcessor::FileGunzip => write!(f, "FILE_GUNZIP"),
            FilePreProcessor::ArchiveUnzip => write!(f, "ARCHIVE_UNZIP"),
        }
    }
}

impl FromStr for FilePreProcessor {
    type Err = ComputationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FILE_GUNZIP" => Ok(FilePreProcessor::FileGunzip),
            "ARCHIVE_UNZIP" => Ok(FilePreProcessor::ArchiveUnzip),
            _ => Err(ComputationError::UnsupportedPreprocessor(s.to_string())),
        }
    }
}

/// Transformation applied to an output file after a successful run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum FilePostProcessor {
    /// Write a gzip copy next to the file
    FileGzip,
}

impl fmt::Display for FilePostProcessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FilePostProcessor::FileGzip => write!(f, "FILE_GZIP"),
        }
    }
}

impl FromStr for FilePostProcessor {
    type Err = ComputationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_uppercase().as_str() {
            "FILE_GZIP" => Ok(FilePostProcessor::FileGzip),
            _ => Err(ComputationError::UnsupportedPostprocessor(s.to_string())),
        }
    }
}

/// Input file declared by a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InputFile {
    pub name: FileName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pre_processor: Option<FilePreProcessor>,
}

impl InputFile {
    pub fn new(name: impl Into<FileName>) -> Self {
        Self {
            name: name.into(),
            pre_processor: None,
        }
    }

    pub fn with_pre_processor(name: impl Into<FileName>, pre_processor: FilePreProcessor) -> Self {
        Self {
            name: name.into(),
            pre_processor: Some(pre_processor),
        }
    }

    /// File name for an execution index
    pub fn name(&self, index: usize) -> String {
        self.name.name(index)
    }
}

/// Output file declared by a command
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutputFile {
    pub name: FileName,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub post_processor: Option<FilePostProcessor>,
}

impl OutputFile {
    pub fn new(name: impl Into<FileName>) -> Self {
        Self {
            name: name.into(),
            post_processor: None,
        }
    }

    pub fn with_post_processor(name: impl Into<FileName>, post_processor: FilePostProcessor) -> Self {
        Self {
            name: name.into(),
            post_processor: Some(post_processor),
        }
    }

    /// File name for an execution index
    pub fn name(&self, index: usize) -> String {
        self.name.name(index)
    }
}

/// A program and its argument templates
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramInvocation {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl ProgramInvocation {
    pub fn new<I, S>(program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            program: program.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Arguments for an execution index
    pub fn args(&self, index: usize) -> Vec<String> {
        self.args.iter().map(|arg| substitute_index(arg, index)).collect()
    }

    /// Command line for an execution index, for logging
    pub fn render(&self, index: usize) -> String {
        std::iter::once(self.program.clone())
            .chain(self.args(index))
            .collect::<Vec<_>>()
            .join(" ")
    }
}

/// What a command runs for each execution index
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum CommandKind {
    /// One program per index
    Simple(ProgramInvocation),
    /// Programs run in order per index, stopping at the first failure
    Group { sub_commands: Vec<ProgramInvocation> },
}

/// A command with its declared input and output files.
///
/// Deserialized commands go through the same checks as built ones.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CommandRepr")]
pub struct Command {
    id: String,
    kind: CommandKind,
    #[serde(default)]
    inputs: Vec<InputFile>,
    #[serde(default)]
    outputs: Vec<OutputFile>,
}

/// Unchecked wire form of [`Command`]
#[derive(Deserialize)]
struct CommandRepr {
    id: String,
    kind: CommandKind,
    #[serde(default)]
    inputs: Vec<InputFile>,
    #[serde(default)]
    outputs: Vec<OutputFile>,
}

impl TryFrom<CommandRepr> for Command {
    type Error = ComputationError;

    fn try_from(repr: CommandRepr) -> ComputationResult<Self> {
        Command {
            id: repr.id,
            kind: repr.kind,
            inputs: repr.inputs,
            outputs: repr.outputs,
        }
        .validate()
    }
}

impl Command {
    /// Start building a command that runs a single program
    pub fn simple(id: impl Into<String>, program: impl Into<String>) -> SimpleCommandBuilder {
        SimpleCommandBuilder::new(id, program)
    }

    /// Start building a command that runs an ordered group of programs
    pub fn group(id: impl Into<String>) -> GroupCommandBuilder {
        GroupCommandBuilder::new(id)
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> &CommandKind {
        &self.kind
    }

    pub fn inputs(&self) -> &[InputFile] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[OutputFile] {
        &self.outputs
    }

    /// Name of the file receiving standard output for an execution index
    pub fn stdout_file_name(&self, index: usize) -> String {
        format!("{}_{}.out", self.id, index)
    }

    /// Name of the file receiving standard error for an execution index
    pub fn stderr_file_name(&self, index: usize) -> String {
        format!("{}_{}.err", self.id, index)
    }

    /// Command line(s) run for an execution index, for logging
    pub fn describe(&self, index: usize) -> String {
        match &self.kind {
            CommandKind::Simple(invocation) => invocation.render(index),
            CommandKind::Group { sub_commands } => format!(
                "[{}]",
                sub_commands
                    .iter()
                    .map(|sub| sub.render(index))
                    .collect::<Vec<_>>()
                    .join("; ")
            ),
        }
    }

    fn validate(self) -> ComputationResult<Self> {
        if self.id.is_empty() {
            return Err(ComputationError::InvalidCommand("command id cannot be empty".to_string()));
        }
        if self.id.contains(['/', '\\']) {
            return Err(ComputationError::InvalidCommand(format!(
                "command id '{}' cannot contain path separators",
                self.id
            )));
        }

        let invocations: &[ProgramInvocation] = match &self.kind {
            CommandKind::Simple(invocation) => std::slice::from_ref(invocation),
            CommandKind::Group { sub_commands } => sub_commands,
        };
        if invocations.is_empty() {
            return Err(ComputationError::InvalidCommand(format!(
                "group command '{}' has no sub-commands",
                self.id
            )));
        }
        if invocations.iter().any(|invocation| invocation.program.is_empty()) {
            return Err(ComputationError::InvalidCommand(format!(
                "command '{}' has an empty program",
                self.id
            )));
        }

        Ok(self)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.id)
    }
}

/// Builder for single-program commands
#[derive(Debug, Clone)]
pub struct SimpleCommandBuilder {
    id: String,
    invocation: ProgramInvocation,
    inputs: Vec<InputFile>,
    outputs: Vec<OutputFile>,
}

impl SimpleCommandBuilder {
    pub fn new(id: impl Into<String>, program: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            invocation: ProgramInvocation::new(program, Vec::<String>::new()),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Append one argument template
    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.invocation.args.push(arg.into());
        self
    }

    /// Append argument templates
    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.invocation.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn input(mut self, input: InputFile) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, output: OutputFile) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn build(self) -> ComputationResult<Command> {
        Command {
            id: self.id,
            kind: CommandKind::Simple(self.invocation),
            inputs: self.inputs,
            outputs: self.outputs,
        }
        .validate()
    }
}

/// Builder for ordered groups of programs
#[derive(Debug, Clone)]
pub struct GroupCommandBuilder {
    id: String,
    sub_commands: Vec<ProgramInvocation>,
    inputs: Vec<InputFile>,
    outputs: Vec<OutputFile>,
}

impl GroupCommandBuilder {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            sub_commands: Vec::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
        }
    }

    /// Append a sub-command; sub-commands run in the order they are added
    pub fn sub_command<I, S>(mut self, program: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.sub_commands.push(ProgramInvocation::new(program, args));
        self
    }

    pub fn input(mut self, input: InputFile) -> Self {
        self.inputs.push(input);
        self
    }

    pub fn output(mut self, output: OutputFile) -> Self {
        self.outputs.push(output);
        self
    }

    pub fn build(self) -> ComputationResult<Command> {
        Command {
            id: self.id,
            kind: CommandKind::Group {
                sub_commands: self.sub_commands,
            },
            inputs: self.inputs,
            outputs: self.outputs,
        }
        .validate()
    }
}
