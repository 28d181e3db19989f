//! Compiler collaborator seam.

use core::{fmt::Debug, str::FromStr};
use std::path::Path;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::BytecodeStructure;

/// Source languages the remote compiler accepts.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "lowercase")]
pub enum SourceLanguage {
    /// C
    #[display("c")]
    C,
    /// C++
    #[display("cpp")]
    Cpp,
    /// Rust
    #[display("rust")]
    Rust,
    /// Go
    #[display("go")]
    Go,
}

impl SourceLanguage {
    /// Maps a file extension, without the dot, to a language.
    pub fn from_extension(extension: &str) -> Result<Self, CompileError> {
        match extension.to_ascii_lowercase().as_str() {
            "c" | "h" => Ok(Self::C),
            "cpp" | "cc" | "cxx" | "hpp" => Ok(Self::Cpp),
            "rs" => Ok(Self::Rust),
            "go" => Ok(Self::Go),
            _ => Err(CompileError::UnsupportedExtension(extension.to_string())),
        }
    }
}

impl FromStr for SourceLanguage {
    type Err = CompileError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "c" => Ok(Self::C),
            "cpp" => Ok(Self::Cpp),
            "rust" => Ok(Self::Rust),
            "go" => Ok(Self::Go),
            other => Self::from_extension(other),
        }
    }
}

/// Source file handed to the compiler. The content is opaque to this crate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExecutorFile {
    /// Source text
    pub content: String,
    /// Language, derived from the file extension
    pub extension: SourceLanguage,
    /// Where the file came from
    pub path: String,
}

impl ExecutorFile {
    /// Builds a file from its path and content, deriving the language from the extension.
    pub fn new(path: impl AsRef<Path>, content: String) -> Result<Self, CompileError> {
        let path = path.as_ref();
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .ok_or_else(|| CompileError::UnsupportedExtension(path.display().to_string()))?;
        Ok(Self {
            content,
            extension: SourceLanguage::from_extension(extension)?,
            path: path.display().to_string(),
        })
    }
}

/// Supplies the file to compile. Asked again for every compile request.
pub trait FileSource: Debug + Send + Sync {
    /// The file currently selected, if any.
    fn current_file(&self) -> Result<Option<ExecutorFile>, CompileError>;
}

impl FileSource for ExecutorFile {
    fn current_file(&self) -> Result<Option<ExecutorFile>, CompileError> {
        Ok(Some(self.clone()))
    }
}

/// Errors raised by a [`Compiler`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CompileError {
    /// The file extension maps to no supported language
    #[error("unsupported source extension: {0}")]
    UnsupportedExtension(String),

    /// The source file could not be read
    #[error("reading source failed: {0}")]
    Source(String),

    /// The compiler endpoint could not be reached
    #[error("compiler unreachable: {0}")]
    Transport(String),

    /// The compiler refused the source
    #[error("compiler rejected source ({status}): {body}")]
    Rejected {
        /// HTTP status
        status: u16,
        /// Response body
        body: String,
    },

    /// The compiler response could not be parsed
    #[error("malformed compiler response: {0}")]
    MalformedResponse(String),

    /// The compiled structure reserves a different number of slots than requested
    #[error("requested {requested} entrypoint arguments, compiler reserved {returned}")]
    NargsMismatch {
        /// Requested argument count
        requested: usize,
        /// Argument count in the response
        returned: usize,
    },
}

/// Request body sent to the compiler.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CompileRequest<'a> {
    /// Source text
    pub source_code: &'a str,
    /// Source language
    pub language: SourceLanguage,
    /// Number of entrypoint arguments to reserve slots for
    pub entrypoint_nargs: usize,
}

impl<'a> CompileRequest<'a> {
    /// Request for `file` with `nargs` argument slots.
    pub fn new(file: &'a ExecutorFile, nargs: usize) -> Self {
        Self { source_code: file.content.as_str(), language: file.extension, entrypoint_nargs: nargs }
    }
}

/// Off-host compiler turning source into a parameterised bytecode template.
#[async_trait]
pub trait Compiler: Debug + Send + Sync {
    /// Compiles `file` with `nargs` argument slots.
    async fn compile(
        &self,
        file: &ExecutorFile,
        nargs: usize,
    ) -> Result<BytecodeStructure, CompileError>;
}

/// Checks that the compiler honoured the requested argument count.
pub fn ensure_nargs(
    structure: BytecodeStructure,
    requested: usize,
) -> Result<BytecodeStructure, CompileError> {
    if structure.nargs != requested {
        return Err(CompileError::NargsMismatch { requested, returned: structure.nargs });
    }
    Ok(structure)
}
