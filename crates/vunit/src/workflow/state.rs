//! Workflow states, statuses and the events emitted on every transition.

use alloy_primitives::{Address, Bytes, TxHash, U256};
use serde::{Deserialize, Serialize};

use super::WorkflowError;

/// The two workflow instantiations.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowKind {
    /// Deploy a virtualization unit
    #[display("deployment")]
    Deployment,
    /// Execute composed bytecode on a deployed unit
    #[display("execution")]
    Execution,
}

/// State machine positions.
///
/// `Idle` is initial. `Done` and `Error` are terminal for one invocation; the next invocation
/// starts again from `Idle`.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowState {
    /// Nothing in flight
    #[default]
    Idle,
    /// Gas estimate requested from the RPC client
    Estimating,
    /// Waiting for the user to choose a gas value
    AwaitingGas,
    /// Transaction being submitted
    Sending,
    /// Transaction accepted, hash known
    Sent,
    /// Waiting for inclusion
    AwaitingReceipt,
    /// Extracting the result from the receipt
    Decoding,
    /// Finished successfully
    Done,
    /// Finished with an error
    Error,
}

impl WorkflowState {
    /// The status presented for this state.
    pub const fn status(self) -> TransactionStatus {
        match self {
            Self::Idle => TransactionStatus::None,
            Self::Estimating | Self::AwaitingGas | Self::Sending => TransactionStatus::Sending,
            Self::Sent => TransactionStatus::Sent,
            Self::AwaitingReceipt | Self::Decoding => TransactionStatus::Confirming,
            Self::Done => TransactionStatus::Confirmed,
            Self::Error => TransactionStatus::Error,
        }
    }

    /// Whether no invocation is in flight.
    pub const fn is_settled(self) -> bool {
        matches!(self, Self::Idle | Self::Done | Self::Error)
    }

    /// Whether the invocation can still be cancelled without anything reaching the chain.
    pub const fn is_cancellable(self) -> bool {
        matches!(self, Self::Estimating | Self::AwaitingGas)
    }

    /// Whether `next` is a legal successor of `self`.
    pub const fn can_transition_to(self, next: Self) -> bool {
        match (self, next) {
            (Self::Idle, Self::Estimating) |
            (Self::Estimating, Self::AwaitingGas) |
            (Self::AwaitingGas, Self::Sending) |
            (Self::Sending, Self::Sent) |
            (Self::Sent, Self::AwaitingReceipt) |
            (Self::AwaitingReceipt, Self::Decoding) |
            (Self::Decoding, Self::Done) => true,
            // cancellation
            (Self::Estimating | Self::AwaitingGas, Self::Idle) => true,
            // explicit clear
            (Self::Done | Self::Error, Self::Idle) => true,
            (Self::Idle | Self::Done | Self::Error, Self::Error) => false,
            (_, Self::Error) => true,
            _ => false,
        }
    }
}

/// Coarse transaction status rendered by the presentation layer.
#[derive(
    Debug,
    Clone,
    Copy,
    Default,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    derive_more::Display,
)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// No transaction
    #[default]
    #[display("none")]
    None,
    /// Estimating, negotiating or submitting
    #[display("sending")]
    Sending,
    /// Submitted
    #[display("sent")]
    Sent,
    /// Waiting for confirmation
    #[display("confirming")]
    Confirming,
    /// Confirmed and decoded
    #[display("confirmed")]
    Confirmed,
    /// Failed
    #[display("error")]
    Error,
}

/// Final result of a successful invocation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Artifact {
    /// A virtualization unit was deployed.
    Deployment {
        /// Address of the new unit
        unit: Address,
        /// Deployment transaction
        tx_hash: TxHash,
    },
    /// Composed bytecode was executed.
    Execution {
        /// Bytes returned by the unit's output view
        output: Bytes,
        /// Execution transaction
        tx_hash: TxHash,
        /// Unit that executed the bytecode
        contract: Address,
        /// Arguments composed into the bytecode
        args: Vec<U256>,
    },
}

impl Artifact {
    /// Transaction that produced the artifact.
    pub const fn tx_hash(&self) -> TxHash {
        match self {
            Self::Deployment { tx_hash, .. } | Self::Execution { tx_hash, .. } => *tx_hash,
        }
    }
}

/// Data attached to a transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EventPayload {
    /// Nothing beyond the new state
    None,
    /// Gas estimate returned by the RPC client
    GasEstimate(u64),
    /// Gas value chosen by the user
    GasSelected(u64),
    /// Hash of the submitted transaction
    TransactionHash(TxHash),
    /// The invocation finished
    Done(Artifact),
    /// The invocation was cancelled before anything reached the chain
    Cancelled,
    /// The invocation failed, or a cleared error
    Failed(WorkflowError),
}

/// One state transition of one workflow instance.
///
/// Events of an instance are emitted in transition order, one per transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkflowEvent {
    /// Which workflow emitted the event
    pub kind: WorkflowKind,
    /// Invocation counter, starting at 1 for the first invocation
    pub invocation: u64,
    /// State entered
    pub state: WorkflowState,
    /// Transition data
    pub payload: EventPayload,
}

impl WorkflowEvent {
    /// Whether this event ends its invocation.
    pub const fn is_terminal(&self) -> bool {
        matches!(self.state, WorkflowState::Done | WorkflowState::Error) ||
            matches!(self.payload, EventPayload::Cancelled)
    }
}
