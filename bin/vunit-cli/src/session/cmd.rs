use std::sync::Arc;

use clap::Parser;
use tokio::{
    io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt, BufReader},
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tracing::{debug, info, warn};
use vunit::{
    BridgeConfig, Collaborators, CommandEnvelope, ErrorCategory, EventSyncBridge, ViewUpdate,
};

use crate::common::{ChainArgs, CompilerArgs, ComposerArgs, LogArgs, Result, SourceArgs};

/// Serve a line-delimited JSON session on stdin/stdout
#[derive(Parser, Debug)]
pub struct Cmd {
    /// Chain configuration
    #[command(flatten)]
    pub chain_args: ChainArgs,

    /// Compiler configuration
    #[command(flatten)]
    pub compiler_args: CompilerArgs,

    /// Slot layout
    #[command(flatten)]
    pub composer_args: ComposerArgs,

    /// Session inputs
    #[command(flatten)]
    pub source_args: SourceArgs,

    /// Logging configuration
    #[command(flatten)]
    pub log_args: LogArgs,
}

impl Cmd {
    /// Execute the session command on a single-threaded runtime.
    pub fn run(&self) -> Result<()> {
        self.log_args.init()?;
        let runtime = tokio::runtime::Builder::new_current_thread().enable_all().build()?;
        runtime.block_on(self.serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout()))
    }

    /// Reads one command envelope per line from `input` and writes one view update per line to
    /// `output` until `input` ends.
    pub async fn serve<R, W>(&self, input: R, output: W) -> Result<()>
    where
        R: AsyncBufRead + Unpin,
        W: AsyncWrite + Unpin,
    {
        let config = BridgeConfig {
            unit_init_code: self.source_args.unit_init_code()?,
            composer: self.composer_args.config()?,
        };
        let collaborators = Collaborators {
            session: Arc::new(self.chain_args.session()?),
            compiler: Arc::new(self.compiler_args.compiler()?),
            source: Arc::new(self.source_args.file_source()),
        };
        info!(rpc_url = %self.chain_args.rpc, compiler = %self.compiler_args.compiler_url, "Session started");

        let (updates_tx, updates) = mpsc::unbounded_channel();
        let (commands_tx, commands) = mpsc::unbounded_channel();
        let bridge = EventSyncBridge::new(config, collaborators, updates_tx.clone());

        let ((), read, write) = tokio::join!(
            bridge.run(commands),
            read_commands(input, commands_tx, updates_tx),
            write_updates(output, updates),
        );
        read?;
        write
    }
}

/// Forwards parsed envelopes. Lines that are not an envelope are reported as errors.
async fn read_commands<R: AsyncBufRead + Unpin>(
    input: R,
    commands: UnboundedSender<CommandEnvelope>,
    rejects: UnboundedSender<ViewUpdate>,
) -> Result<()> {
    let mut lines = input.lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str::<CommandEnvelope>(line) {
            Ok(envelope) => {
                if commands.send(envelope).is_err() {
                    break;
                }
            }
            Err(e) => {
                warn!(%e, "Malformed command");
                let _ = rejects.send(ViewUpdate::Error {
                    command: String::new(),
                    message: format!("malformed command: {e}"),
                    category: ErrorCategory::Precondition,
                });
            }
        }
    }
    debug!("Input closed");
    Ok(())
}

async fn write_updates<W: AsyncWrite + Unpin>(
    mut output: W,
    mut updates: UnboundedReceiver<ViewUpdate>,
) -> Result<()> {
    while let Some(update) = updates.recv().await {
        let mut line = serde_json::to_vec(&update)?;
        line.push(b'\n');
        output.write_all(&line).await?;
        output.flush().await?;
    }
    Ok(())
}
