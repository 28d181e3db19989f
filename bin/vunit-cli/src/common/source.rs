use std::{fs, path::PathBuf};

use vunit::{CompileError, ExecutorFile, FileSource};

/// Reads the file to compile from disk on every request.
#[derive(Debug, Clone, Default)]
pub struct FsSource {
    path: Option<PathBuf>,
}

impl FsSource {
    /// Source reading `path`, or no file at all.
    pub const fn new(path: Option<PathBuf>) -> Self {
        Self { path }
    }
}

impl FileSource for FsSource {
    fn current_file(&self) -> Result<Option<ExecutorFile>, CompileError> {
        let Some(path) = &self.path else {
            return Ok(None);
        };
        let content = fs::read_to_string(path)
            .map_err(|e| CompileError::Source(format!("{}: {e}", path.display())))?;
        ExecutorFile::new(path, content).map(Some)
    }
}
