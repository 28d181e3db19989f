use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Mutex,
    },
    time::Duration,
};

use alloy_primitives::{address, Address, Bytes, Log, TxHash, TxKind, B256};
use alloy_rpc_types_eth::TransactionRequest;
use alloy_sol_types::{SolEvent, SolValue};
use async_trait::async_trait;

use crate::{contracts::IVirtualizationUnit, ChainClient, RpcError, TxReceipt};

/// Address every scripted deployment lands at.
pub const SCRIPTED_UNIT: Address = address!("5FbDB2315678afecb367f032d93F642f64180aa3");

/// Execution context reported by every scripted execution.
pub const SCRIPTED_CONTEXT: Address = address!("a16E02E87b7454126E5E10d957A927A7F5B5d2be");

/// A fake chain that answers every call from a script.
///
/// Contract creations emit `Deployed(SCRIPTED_UNIT)`; calls emit `Executed(SCRIPTED_CONTEXT)` from
/// the called address, and `output` returns the scripted bytes.
#[derive(Debug)]
pub struct ScriptedChain {
    estimate: Result<u64, RpcError>,
    estimate_delay: Option<Duration>,
    send_error: Option<RpcError>,
    receipt_error: Option<RpcError>,
    receipt_delay: Option<Duration>,
    reverted: bool,
    emit_events: bool,
    output: Bytes,
    call_result: Option<Result<Bytes, RpcError>>,
    nonce: AtomicU64,
    sent: Mutex<Vec<TransactionRequest>>,
    estimates: AtomicU64,
}

impl Default for ScriptedChain {
    fn default() -> Self {
        Self {
            estimate: Ok(21_000),
            estimate_delay: None,
            send_error: None,
            receipt_error: None,
            receipt_delay: None,
            reverted: false,
            emit_events: true,
            output: Bytes::from_static(b"ok"),
            call_result: None,
            nonce: AtomicU64::new(0),
            sent: Mutex::new(Vec::new()),
            estimates: AtomicU64::new(0),
        }
    }
}

impl ScriptedChain {
    /// Result of every `estimate_gas` call.
    pub fn with_estimate(mut self, estimate: Result<u64, RpcError>) -> Self {
        self.estimate = estimate;
        self
    }

    /// Delays every estimate.
    pub const fn with_estimate_delay(mut self, delay: Duration) -> Self {
        self.estimate_delay = Some(delay);
        self
    }

    /// Makes `send_transaction` fail.
    pub fn with_send_error(mut self, error: RpcError) -> Self {
        self.send_error = Some(error);
        self
    }

    /// Makes `wait_for_receipt` fail.
    pub fn with_receipt_error(mut self, error: RpcError) -> Self {
        self.receipt_error = Some(error);
        self
    }

    /// Delays every receipt.
    pub const fn with_receipt_delay(mut self, delay: Duration) -> Self {
        self.receipt_delay = Some(delay);
        self
    }

    /// Marks every receipt as reverted.
    pub const fn reverting(mut self) -> Self {
        self.reverted = true;
        self
    }

    /// Omits the unit's events from receipts.
    pub const fn without_events(mut self) -> Self {
        self.emit_events = false;
        self
    }

    /// Bytes returned by the unit's `output` view.
    pub fn with_output(mut self, output: Bytes) -> Self {
        self.output = output;
        self
    }

    /// Raw result of every `call`, replacing the encoded `output`.
    pub fn with_call_result(mut self, result: Result<Bytes, RpcError>) -> Self {
        self.call_result = Some(result);
        self
    }

    /// Transactions submitted so far.
    pub fn sent(&self) -> Vec<TransactionRequest> {
        self.sent.lock().map(|sent| sent.clone()).unwrap_or_default()
    }

    /// Number of `estimate_gas` calls so far.
    pub fn estimate_calls(&self) -> u64 {
        self.estimates.load(Ordering::SeqCst)
    }

    fn receipt_for(&self, tx_hash: TxHash, tx: &TransactionRequest) -> TxReceipt {
        let mut receipt = TxReceipt {
            transaction_hash: tx_hash,
            status: !self.reverted,
            contract_address: None,
            gas_used: tx.gas.unwrap_or_default().min(21_000),
            logs: Vec::new(),
        };

        match tx.to {
            Some(TxKind::Create) => {
                receipt.contract_address = Some(SCRIPTED_UNIT);
                if self.emit_events {
                    let data = IVirtualizationUnit::Deployed { unit: SCRIPTED_UNIT }.encode_log_data();
                    receipt.logs.push(Log { address: SCRIPTED_UNIT, data });
                }
            }
            Some(TxKind::Call(target)) => {
                if self.emit_events {
                    let data = IVirtualizationUnit::Executed { context: SCRIPTED_CONTEXT }
                        .encode_log_data();
                    receipt.logs.push(Log { address: target, data });
                }
            }
            None => {}
        }
        receipt
    }
}

#[async_trait]
impl ChainClient for ScriptedChain {
    async fn estimate_gas(&self, _tx: &TransactionRequest) -> Result<u64, RpcError> {
        self.estimates.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.estimate_delay {
            tokio::time::sleep(delay).await;
        }
        self.estimate.clone()
    }

    async fn send_transaction(&self, tx: TransactionRequest) -> Result<TxHash, RpcError> {
        if let Some(error) = &self.send_error {
            return Err(error.clone());
        }
        let nonce = self.nonce.fetch_add(1, Ordering::SeqCst) + 1;
        if let Ok(mut sent) = self.sent.lock() {
            sent.push(tx);
        }
        Ok(B256::left_padding_from(&nonce.to_be_bytes()))
    }

    async fn wait_for_receipt(&self, tx_hash: TxHash) -> Result<TxReceipt, RpcError> {
        if let Some(delay) = self.receipt_delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(error) = &self.receipt_error {
            return Err(error.clone());
        }

        let index = u64::from_be_bytes(<[u8; 8]>::try_from(&tx_hash[24..]).unwrap_or_default());
        let tx = self
            .sent
            .lock()
            .ok()
            .and_then(|sent| sent.get(index.saturating_sub(1) as usize).cloned())
            .ok_or_else(|| RpcError::Rejected(format!("unknown transaction {tx_hash}")))?;
        Ok(self.receipt_for(tx_hash, &tx))
    }

    async fn call(&self, _tx: &TransactionRequest) -> Result<Bytes, RpcError> {
        match &self.call_result {
            Some(result) => result.clone(),
            None => Ok((self.output.clone(),).abi_encode_params().into()),
        }
    }
}
