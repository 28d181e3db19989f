//! Chain collaborator seam: RPC client, receipts and the wallet session.

use std::{fmt::Debug, sync::Arc, time::Duration};

use alloy_primitives::{Address, Bytes, Log, TxHash};
use alloy_rpc_types_eth::TransactionRequest;
use async_trait::async_trait;

/// Errors reported by a [`ChainClient`].
///
/// Transport failures are captured as their rendered message so the error can travel inside
/// workflow events.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RpcError {
    /// RPC transport error
    #[error("RPC transport error: {0}")]
    Transport(String),

    /// The node rejected the request
    #[error("RPC error: {0}")]
    Rejected(String),

    /// No receipt appeared before the polling deadline
    #[error("Receipt for {tx_hash} not available after {timeout:?}")]
    ReceiptTimeout {
        /// Hash of the submitted transaction
        tx_hash: TxHash,
        /// How long the client waited
        timeout: Duration,
    },
}

/// How long and how often a client polls for a receipt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReceiptPolicy {
    /// Give up after this long
    pub timeout: Duration,
    /// Delay between two polls
    pub poll_interval: Duration,
}

impl Default for ReceiptPolicy {
    fn default() -> Self {
        Self { timeout: Duration::from_secs(120), poll_interval: Duration::from_secs(1) }
    }
}

/// Receipt fields the workflows need.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxReceipt {
    /// Transaction hash
    pub transaction_hash: TxHash,
    /// Whether execution succeeded
    pub status: bool,
    /// Address created by a contract-creation transaction
    pub contract_address: Option<Address>,
    /// Gas used by the transaction
    pub gas_used: u64,
    /// Logs emitted by the transaction
    pub logs: Vec<Log>,
}

/// Minimal RPC surface used by the transaction workflows.
#[async_trait]
pub trait ChainClient: Debug + Send + Sync {
    /// Estimates the gas needed by `tx`.
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, RpcError>;

    /// Submits `tx` and returns its hash once the node accepted it.
    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, RpcError>;

    /// Waits until `tx_hash` is included and returns its receipt.
    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, RpcError>;

    /// Executes a read-only call.
    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, RpcError>;
}

/// Read-only view of the wallet connection. Only the wallet collaborator mutates what it returns.
pub trait WalletSession: Debug + Send + Sync {
    /// Currently selected account, if a wallet is connected.
    fn current_account(&self) -> Option<Address>;

    /// RPC client for the currently selected chain, if any.
    fn current_client(&self) -> Option<Arc<dyn ChainClient>>;
}

/// Snapshot of the wallet session taken at the start of one workflow invocation.
#[derive(Debug, Clone, Default)]
pub struct ChainContext {
    /// Active account
    pub account: Option<Address>,
    /// Active RPC client
    pub client: Option<Arc<dyn ChainClient>>,
}

impl ChainContext {
    /// Captures the current account and client from `session`.
    pub fn capture(session: &dyn WalletSession) -> Self {
        Self { account: session.current_account(), client: session.current_client() }
    }
}

/// A wallet session with a fixed account and client.
#[derive(Debug, Clone, Default)]
pub struct StaticSession {
    account: Option<Address>,
    client: Option<Arc<dyn ChainClient>>,
}

impl StaticSession {
    /// Creates a session.
    pub fn new(account: Option<Address>, client: Option<Arc<dyn ChainClient>>) -> Self {
        Self { account, client }
    }
}

impl WalletSession for StaticSession {
    fn current_account(&self) -> Option<Address> {
        self.account
    }

    fn current_client(&self) -> Option<Arc<dyn ChainClient>> {
        self.client.clone()
    }
}
