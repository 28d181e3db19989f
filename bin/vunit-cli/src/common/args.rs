//! Argument groups shared by the commands.

use std::{path::PathBuf, sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes};
use clap::Parser;
use tracing::debug;
use vunit::{ChainClient, ComposerConfig, ReceiptPolicy, SlotEncoding, SlotWidth, StaticSession};

use super::{load_hex, AlloyChainClient, CliError, FsSource, HttpCompiler, Result};

/// Chain connection configuration
#[derive(Parser, Debug, Clone)]
#[command(next_help_heading = "Chain Options")]
pub struct ChainArgs {
    /// JSON-RPC endpoint of the chain
    #[arg(long = "rpc", default_value = "http://localhost:8545", env = "RPC_URL")]
    pub rpc: String,

    /// Account transactions are sent from. Must be unlocked on the node.
    #[arg(long = "account", value_name = "ADDRESS", env = "VUNIT_ACCOUNT")]
    pub account: Option<Address>,

    /// Give up waiting for a receipt after this many seconds
    #[arg(long = "receipt.timeout", value_name = "SECONDS", default_value_t = 120)]
    pub receipt_timeout: u64,

    /// Delay between two receipt polls, in milliseconds
    #[arg(long = "receipt.poll-interval", value_name = "MILLIS", default_value_t = 1000)]
    pub receipt_poll_interval: u64,
}

impl ChainArgs {
    /// Receipt polling policy.
    pub const fn receipt_policy(&self) -> ReceiptPolicy {
        ReceiptPolicy {
            timeout: Duration::from_secs(self.receipt_timeout),
            poll_interval: Duration::from_millis(self.receipt_poll_interval),
        }
    }

    /// Wallet session with the configured account and an RPC client for the configured endpoint.
    pub fn session(&self) -> Result<StaticSession> {
        let client = AlloyChainClient::connect(&self.rpc, self.receipt_policy())?;
        debug!(rpc_url = %self.rpc, account = ?self.account, "Chain session configured");
        Ok(StaticSession::new(self.account, Some(Arc::new(client) as Arc<dyn ChainClient>)))
    }
}

/// Remote compiler configuration
#[derive(Parser, Debug, Clone)]
#[command(next_help_heading = "Compiler Options")]
pub struct CompilerArgs {
    /// Base URL of the compiler service
    #[arg(
        long = "compiler.url",
        default_value = "http://localhost:8080",
        env = "VUNIT_COMPILER_URL"
    )]
    pub compiler_url: String,

    /// Compile request timeout in seconds
    #[arg(long = "compiler.timeout", value_name = "SECONDS", default_value_t = 60)]
    pub compiler_timeout: u64,
}

impl CompilerArgs {
    /// HTTP client for the configured compiler.
    pub fn compiler(&self) -> Result<HttpCompiler> {
        HttpCompiler::new(&self.compiler_url, Duration::from_secs(self.compiler_timeout))
    }
}

/// Slot layout agreed with the compiler
#[derive(Parser, Debug, Clone)]
#[command(next_help_heading = "Composer Options")]
pub struct ComposerArgs {
    /// Width of one argument slot in bytes (16 or 32)
    #[arg(long = "slot.width", value_name = "BYTES", default_value_t = 32)]
    pub slot_width: usize,

    /// Templates arrive XOR-0xFF obfuscated
    #[arg(long = "slot.obfuscated")]
    pub slot_obfuscated: bool,
}

impl ComposerArgs {
    /// Composer configuration.
    pub fn config(&self) -> Result<ComposerConfig> {
        let width = SlotWidth::from_bytes(self.slot_width).ok_or_else(|| {
            CliError::InvalidInput(format!(
                "Unsupported slot width: {} (must be 16 or 32)",
                self.slot_width
            ))
        })?;
        let encoding =
            if self.slot_obfuscated { SlotEncoding::Obfuscated } else { SlotEncoding::Plain };
        Ok(ComposerConfig { width, encoding })
    }
}

/// Inputs of the session
#[derive(Parser, Debug, Clone)]
#[command(next_help_heading = "Source Options")]
pub struct SourceArgs {
    /// Source file handed to the compiler. Re-read on every compile.
    #[arg(long = "source", value_name = "FILE")]
    pub source: Option<PathBuf>,

    /// Init code of the virtualization unit, as hex
    #[arg(long = "unit.bytecode", value_name = "HEX")]
    pub unit_bytecode: Option<String>,

    /// File with the init code of the virtualization unit, as hex
    #[arg(long = "unit.bytecode-file", value_name = "FILE", conflicts_with = "unit_bytecode")]
    pub unit_bytecode_file: Option<String>,
}

impl SourceArgs {
    /// Where the session reads the file to compile from.
    pub fn file_source(&self) -> FsSource {
        FsSource::new(self.source.clone())
    }

    /// Init code deployed by `deploy`, empty if none was given.
    pub fn unit_init_code(&self) -> Result<Bytes> {
        Ok(load_hex(self.unit_bytecode.as_deref(), self.unit_bytecode_file.as_deref())?
            .unwrap_or_default())
    }
}
