use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, trace};
use vunit::{ensure_nargs, BytecodeStructure, CompileError, CompileRequest, Compiler, ExecutorFile};

use super::Result;

/// Compiler service reached over HTTP.
///
/// Sends `POST {url}/compile` with `{source_code, language, entrypoint_nargs}` and expects
/// `{bytecode, key, nargs}` back.
#[derive(Debug, Clone)]
pub struct HttpCompiler {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCompiler {
    /// Client for the service at `base_url`, failing requests after `timeout`.
    pub fn new(base_url: &str, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client, endpoint: format!("{}/compile", base_url.trim_end_matches('/')) })
    }

    /// URL compile requests are posted to.
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }
}

#[async_trait]
impl Compiler for HttpCompiler {
    async fn compile(
        &self,
        file: &ExecutorFile,
        nargs: usize,
    ) -> std::result::Result<BytecodeStructure, CompileError> {
        debug!(endpoint = %self.endpoint, path = %file.path, nargs, "Posting compile request");
        let response = self
            .client
            .post(&self.endpoint)
            .json(&CompileRequest::new(file, nargs))
            .send()
            .await
            .map_err(|e| CompileError::Transport(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(CompileError::Rejected { status: status.as_u16(), body });
        }

        let structure: BytecodeStructure =
            response.json().await.map_err(|e| CompileError::MalformedResponse(e.to_string()))?;
        trace!(key = %structure.key, nargs = structure.nargs, "Compile response");
        ensure_nargs(structure, nargs)
    }
}
