//! RPC client backed by an alloy provider.

use alloy_primitives::{Bytes, TxHash};
use alloy_provider::{transport::TransportError, DynProvider, Provider, ProviderBuilder};
use alloy_rpc_types_eth::{BlockId, TransactionReceipt, TransactionRequest};
use async_trait::async_trait;
use tracing::{debug, trace};
use vunit::{ChainClient, ReceiptPolicy, RpcError, TxReceipt};

use super::CliError;

/// [`ChainClient`] talking JSON-RPC to a node that manages the sending account.
///
/// Transactions go out through `eth_sendTransaction`, so the account has to be unlocked on the
/// node. Receipts are polled according to the [`ReceiptPolicy`].
#[derive(Debug, Clone)]
pub struct AlloyChainClient {
    provider: DynProvider,
    policy: ReceiptPolicy,
}

impl AlloyChainClient {
    /// Client for the HTTP endpoint at `rpc_url`.
    pub fn connect(rpc_url: &str, policy: ReceiptPolicy) -> Result<Self> {
        let url = rpc_url.parse::<reqwest::Url>().map_err(|e| CliError::InvalidRpcUrl {
            url: rpc_url.to_string(),
            reason: e.to_string(),
        })?;
        let provider = ProviderBuilder::new().disable_recommended_fillers().connect_http(url);
        Ok(Self { provider: DynProvider::new(provider), policy })
    }
}

/// Node errors are the node's verdict; anything else is the transport's.
fn rpc_error(error: TransportError) -> RpcError {
    match error.as_error_resp() {
        Some(payload) => RpcError::Rejected(payload.message.to_string()),
        None => RpcError::Transport(error.to_string()),
    }
}

fn into_receipt(receipt: TransactionReceipt) -> TxReceipt {
    TxReceipt {
        transaction_hash: receipt.transaction_hash,
        status: receipt.inner.status(),
        contract_address: receipt.contract_address,
        gas_used: receipt.gas_used,
        logs: receipt.inner.logs().iter().map(|log| log.inner.clone()).collect(),
    }
}

type Result<T, E = CliError> = std::result::Result<T, E>;

#[async_trait]
impl ChainClient for AlloyChainClient {
    async fn estimate_gas(&self, tx: &TransactionRequest) -> Result<u64, RpcError> {
        self.provider.estimate_gas(tx.clone()).await.map_err(rpc_error)
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, RpcError> {
        let pending = self.provider.send_transaction(tx).await.map_err(rpc_error)?;
        Ok(*pending.tx_hash())
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, RpcError> {
        let ReceiptPolicy { timeout, poll_interval } = self.policy;
        let poll = async {
            loop {
                let receipt =
                    self.provider.get_transaction_receipt(tx_hash).await.map_err(rpc_error)?;
                if let Some(receipt) = receipt {
                    debug!(%tx_hash, block = ?receipt.block_number, "Receipt received");
                    return Ok::<_, RpcError>(into_receipt(receipt));
                }
                trace!(%tx_hash, ?poll_interval, "Receipt not available yet");
                tokio::time::sleep(poll_interval).await;
            }
        };
        tokio::time::timeout(timeout, poll)
            .await
            .map_err(|_| RpcError::ReceiptTimeout { tx_hash, timeout })?
    }

    async fn call(&self, tx: &TransactionRequest) -> Result<Bytes, RpcError> {
        self.provider.call(tx.clone()).block(BlockId::latest()).await.map_err(rpc_error)
    }
}
