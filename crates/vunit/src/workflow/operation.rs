//! The two things a workflow can do on chain.

use core::fmt::Debug;

use alloy_primitives::{Address, Bytes, TxKind, U256};
use alloy_rpc_types_eth::{TransactionInput, TransactionRequest};
use alloy_sol_types::{SolCall, SolEvent};
use async_trait::async_trait;
use tracing::debug;

use super::{Artifact, WorkflowError, WorkflowKind};
use crate::{
    contracts::{find_event_address, IVirtualizationUnit},
    ChainClient, ComposedInput, TxReceipt,
};

/// Side effects specific to one workflow instantiation.
#[async_trait]
pub trait Operation: Debug + Send + Sync + 'static {
    /// Workflow this operation belongs to.
    const KIND: WorkflowKind;

    /// Checks operation-specific preconditions.
    fn check(&self) -> Result<(), WorkflowError>;

    /// Builds the transaction, without gas, sent from `from`.
    fn transaction(&self, from: Address) -> TransactionRequest;

    /// Turns a successful receipt into the final artifact.
    async fn finalize(
        &self,
        client: &dyn ChainClient,
        receipt: &TxReceipt,
    ) -> Result<Artifact, WorkflowError>;
}

/// Deploys a virtualization unit from its init code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Deploy {
    init_code: Bytes,
}

impl Deploy {
    /// Creates a deployment of `init_code`.
    pub const fn new(init_code: Bytes) -> Self {
        Self { init_code }
    }
}

#[async_trait]
impl Operation for Deploy {
    const KIND: WorkflowKind = WorkflowKind::Deployment;

    fn check(&self) -> Result<(), WorkflowError> {
        if self.init_code.is_empty() {
            return Err(WorkflowError::NoDeploymentPayload);
        }
        Ok(())
    }

    fn transaction(&self, from: Address) -> TransactionRequest {
        TransactionRequest {
            from: Some(from),
            to: Some(TxKind::Create),
            input: TransactionInput::new(self.init_code.clone()),
            ..Default::default()
        }
    }

    async fn finalize(
        &self,
        _client: &dyn ChainClient,
        receipt: &TxReceipt,
    ) -> Result<Artifact, WorkflowError> {
        let tx_hash = receipt.transaction_hash;
        let event = IVirtualizationUnit::Deployed::SIGNATURE;
        let unit = find_event_address::<IVirtualizationUnit::Deployed>(
            receipt,
            receipt.contract_address,
            |deployed| deployed.unit,
        )
        .ok_or(WorkflowError::MissingEvent { tx_hash, event })?;

        if unit.is_zero() {
            return Err(WorkflowError::MissingAddress { tx_hash, event });
        }

        debug!(%unit, %tx_hash, "Unit deployed");
        Ok(Artifact::Deployment { unit, tx_hash })
    }
}

/// Executes composed bytecode on a deployed unit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execute {
    target: Option<Address>,
    input: Option<ComposedInput>,
    args: Vec<U256>,
}

impl Execute {
    /// Creates an execution of `input` on `target`.
    pub const fn new(target: Option<Address>, input: Option<ComposedInput>) -> Self {
        Self { target, input, args: Vec::new() }
    }

    /// Records the arguments `input` was composed from. They are handed back in the artifact.
    pub fn with_args(mut self, args: Vec<U256>) -> Self {
        self.args = args;
        self
    }
}

#[async_trait]
impl Operation for Execute {
    const KIND: WorkflowKind = WorkflowKind::Execution;

    fn check(&self) -> Result<(), WorkflowError> {
        if self.target.is_none() {
            return Err(WorkflowError::NoTargetContract);
        }
        if self.input.is_none() {
            return Err(WorkflowError::NoComposedInput);
        }
        Ok(())
    }

    fn transaction(&self, from: Address) -> TransactionRequest {
        let code = self.input.as_ref().map(|input| input.bytes().clone()).unwrap_or_default();
        TransactionRequest {
            from: Some(from),
            to: self.target.map(TxKind::Call),
            input: TransactionInput::new(IVirtualizationUnit::executeCall { code }.abi_encode().into()),
            ..Default::default()
        }
    }

    async fn finalize(
        &self,
        client: &dyn ChainClient,
        receipt: &TxReceipt,
    ) -> Result<Artifact, WorkflowError> {
        let tx_hash = receipt.transaction_hash;
        let target = self.target.ok_or(WorkflowError::NoTargetContract)?;
        let event = IVirtualizationUnit::Executed::SIGNATURE;
        let context = find_event_address::<IVirtualizationUnit::Executed>(
            receipt,
            Some(target),
            |executed| executed.context,
        )
        .ok_or(WorkflowError::MissingEvent { tx_hash, event })?;

        if context.is_zero() {
            return Err(WorkflowError::MissingAddress { tx_hash, event });
        }

        let call = TransactionRequest {
            to: Some(TxKind::Call(target)),
            input: TransactionInput::new(
                IVirtualizationUnit::outputCall { context }.abi_encode().into(),
            ),
            ..Default::default()
        };
        let returned = client
            .call(&call)
            .await
            .map_err(|source| WorkflowError::Output { tx_hash, source })?;
        let output = IVirtualizationUnit::outputCall::abi_decode_returns_validate(&returned)
            .map_err(|e| WorkflowError::MalformedOutput { tx_hash, reason: e.to_string() })?;

        debug!(%context, %tx_hash, len = output.len(), "Execution output fetched");
        Ok(Artifact::Execution { output, tx_hash, contract: target, args: self.args.clone() })
    }
}
