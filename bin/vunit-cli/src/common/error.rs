use alloy_primitives::hex::FromHexError;
use vunit::{BridgeError, CompileError, ComposeError};

/// Error types for the vunit commands
#[derive(Debug, thiserror::Error)]
pub enum CliError {
    /// The RPC URL could not be parsed
    #[error("Invalid RPC URL '{url}': {reason}")]
    InvalidRpcUrl {
        /// URL as given
        url: String,
        /// Parser message
        reason: String,
    },

    /// Failed to read or write a file or stream
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid hex string
    #[error("Invalid hex string: {0}")]
    InvalidHex(#[from] FromHexError),

    /// Invalid JSON document
    #[error("Invalid JSON: {0}")]
    InvalidJson(#[from] serde_json::Error),

    /// HTTP client setup failed
    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    /// Composition failed
    #[error("Composition failed: {0}")]
    Compose(#[from] ComposeError),

    /// Compiler collaborator error
    #[error("Compiler error: {0}")]
    Compile(#[from] CompileError),

    /// Invalid command value
    #[error("{0}")]
    Bridge(#[from] BridgeError),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),
}

/// Result type for the vunit commands
pub type Result<T> = std::result::Result<T, CliError>;
