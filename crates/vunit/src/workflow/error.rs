use alloy_primitives::TxHash;
use serde::Serialize;

use super::WorkflowState;
use crate::{NegotiationError, RpcError};

/// Broad error classes, used by callers to decide whether retrying can help.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCategory {
    /// Missing account, client, contract, input or gas. Retry after fixing the input.
    #[display("precondition")]
    Precondition,
    /// Stale or incompatible bytecode structure. Recompile.
    #[display("protocol")]
    Protocol,
    /// RPC failure. Surfaced as-is, never retried automatically.
    #[display("transport")]
    Transport,
    /// The transaction may have landed but its result cannot be attributed.
    #[display("decode")]
    Decode,
    /// The user cancelled.
    #[display("cancelled")]
    Cancelled,
}

/// Errors raised by a transaction workflow.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WorkflowError {
    /// No wallet account is connected
    #[error("no active account")]
    NoActiveAccount,

    /// No RPC client for the active chain
    #[error("no RPC client")]
    NoRpcClient,

    /// No virtualization unit selected for execution
    #[error("no target contract")]
    NoTargetContract,

    /// Nothing composed to execute
    #[error("no composed input")]
    NoComposedInput,

    /// No init code to deploy
    #[error("no deployment payload")]
    NoDeploymentPayload,

    /// An invocation is still in flight
    #[error("workflow busy in state {0}")]
    AlreadyRunning(WorkflowState),

    /// The transaction is already on its way to the chain
    #[error("cannot cancel in state {0}")]
    AlreadyCommitted(WorkflowState),

    /// Gas negotiation failed
    #[error("gas negotiation failed: {0}")]
    Negotiation(#[from] NegotiationError),

    /// Gas estimation failed
    #[error("gas estimation failed: {0}")]
    Estimate(RpcError),

    /// Submission failed
    #[error("sending transaction failed: {0}")]
    Send(RpcError),

    /// Waiting for the receipt failed
    #[error("receipt for {tx_hash} unavailable: {source}")]
    Receipt {
        /// Submitted transaction
        tx_hash: TxHash,
        /// Underlying RPC error
        source: RpcError,
    },

    /// The transaction was included but reverted
    #[error("transaction {tx_hash} reverted")]
    Reverted {
        /// Reverted transaction
        tx_hash: TxHash,
    },

    /// The expected event is missing from the receipt
    #[error("transaction {tx_hash} succeeded but emitted no {event} event")]
    MissingEvent {
        /// Transaction whose receipt was scanned
        tx_hash: TxHash,
        /// Event name
        event: &'static str,
    },

    /// The event carried no usable address
    #[error("{event} event of transaction {tx_hash} carries the zero address")]
    MissingAddress {
        /// Transaction whose receipt was scanned
        tx_hash: TxHash,
        /// Event name
        event: &'static str,
    },

    /// Fetching the execution output failed
    #[error("fetching output of {tx_hash} failed: {source}")]
    Output {
        /// Execution transaction
        tx_hash: TxHash,
        /// Underlying RPC error
        source: RpcError,
    },

    /// The execution output could not be decoded
    #[error("output of {tx_hash} is malformed: {reason}")]
    MalformedOutput {
        /// Execution transaction
        tx_hash: TxHash,
        /// Decoder message
        reason: String,
    },

    /// Cancelled by the user before submission
    #[error("cancelled")]
    Cancelled,
}

impl WorkflowError {
    /// Error class.
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::NoActiveAccount |
            Self::NoRpcClient |
            Self::NoTargetContract |
            Self::NoComposedInput |
            Self::NoDeploymentPayload |
            Self::AlreadyRunning(_) |
            Self::AlreadyCommitted(_) |
            Self::Negotiation(_) => ErrorCategory::Precondition,
            Self::Estimate(_) | Self::Send(_) | Self::Receipt { .. } | Self::Reverted { .. } => {
                ErrorCategory::Transport
            }
            Self::MissingEvent { .. } |
            Self::MissingAddress { .. } |
            Self::Output { .. } |
            Self::MalformedOutput { .. } => ErrorCategory::Decode,
            Self::Cancelled => ErrorCategory::Cancelled,
        }
    }

    /// Transaction the error relates to, when one reached the chain.
    pub const fn tx_hash(&self) -> Option<TxHash> {
        match self {
            Self::Receipt { tx_hash, .. } |
            Self::Reverted { tx_hash } |
            Self::MissingEvent { tx_hash, .. } |
            Self::MissingAddress { tx_hash, .. } |
            Self::Output { tx_hash, .. } |
            Self::MalformedOutput { tx_hash, .. } => Some(*tx_hash),
            _ => None,
        }
    }
}
