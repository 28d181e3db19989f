use std::{
    sync::atomic::{AtomicUsize, Ordering},
    time::Duration,
};

use async_trait::async_trait;

use crate::{BytecodeStructure, CompileError, Compiler, ExecutorFile};

/// A compiler returning a fixed result, optionally after a delay.
#[derive(Debug)]
pub struct CannedCompiler {
    result: Result<BytecodeStructure, CompileError>,
    delay: Option<Duration>,
    calls: AtomicUsize,
}

impl CannedCompiler {
    /// Compiler answering every request with `result`.
    pub const fn new(result: Result<BytecodeStructure, CompileError>) -> Self {
        Self { result, delay: None, calls: AtomicUsize::new(0) }
    }

    /// Delays every answer.
    pub const fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Number of compile requests so far.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Compiler for CannedCompiler {
    async fn compile(
        &self,
        _file: &ExecutorFile,
        _nargs: usize,
    ) -> Result<BytecodeStructure, CompileError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.result.clone()
    }
}
