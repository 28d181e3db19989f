use crate::{CompileError, ComposeError, ErrorCategory, WorkflowError};

/// Errors raised while handling an inbound command.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BridgeError {
    /// The command name is not recognised
    #[error("unknown command: {0}")]
    UnknownCommand(String),

    /// The command needs a value and got none
    #[error("{command} requires a value")]
    MissingValue {
        /// Command name
        command: &'static str,
    },

    /// The command value could not be parsed
    #[error("invalid value for {command}: {value} ({reason})")]
    InvalidValue {
        /// Command name
        command: &'static str,
        /// Offending value
        value: String,
        /// Parser message
        reason: String,
    },

    /// No file is selected for compilation
    #[error("no source file selected")]
    NoSourceFile,

    /// Nothing has been compiled yet
    #[error("no compiled bytecode structure")]
    NotCompiled,

    /// Composing the execution input failed
    #[error(transparent)]
    Compose(#[from] ComposeError),

    /// Compilation failed
    #[error(transparent)]
    Compile(#[from] CompileError),

    /// A workflow refused the command
    #[error(transparent)]
    Workflow(#[from] WorkflowError),
}

impl BridgeError {
    /// Error class.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::UnknownCommand(_) |
            Self::MissingValue { .. } |
            Self::InvalidValue { .. } |
            Self::NoSourceFile |
            Self::NotCompiled |
            Self::Compose(ComposeError::ArgumentOverflow { .. }) |
            Self::Compile(CompileError::UnsupportedExtension(_) | CompileError::Source(_)) => {
                ErrorCategory::Precondition
            }
            Self::Compose(_) | Self::Compile(CompileError::NargsMismatch { .. }) => {
                ErrorCategory::Protocol
            }
            Self::Compile(_) => ErrorCategory::Transport,
            Self::Workflow(e) => e.category(),
        }
    }
}
