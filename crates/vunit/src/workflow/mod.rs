//! Transaction workflow state machine.
//!
//! One [`TransactionWorkflow`] drives one kind of on-chain operation through
//! `Idle → Estimating → AwaitingGas → Sending → Sent → AwaitingReceipt → Decoding → Done`,
//! emitting exactly one [`WorkflowEvent`] per transition. The gas value is obtained from a human
//! through the workflow's own [`GasNegotiator`].

mod error;
mod operation;
mod state;

pub use error::*;
pub use operation::*;
pub use state::*;

use std::{
    marker::PhantomData,
    sync::{Arc, Mutex, MutexGuard},
};

use alloy_primitives::{Address, TxHash};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, warn};

use crate::{ChainClient, ChainContext, GasNegotiator, NegotiationError};

/// Workflow deploying virtualization units.
pub type DeploymentWorkflow = TransactionWorkflow<Deploy>;

/// Workflow executing composed bytecode.
pub type ExecutionWorkflow = TransactionWorkflow<Execute>;

/// Observable progress of a workflow.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Progress {
    /// Current state
    pub state: WorkflowState,
    /// Number of invocations started so far
    pub invocation: u64,
    /// Estimate of the invocation in flight
    pub gas_estimate: Option<u64>,
    /// Hash of the transaction of the current or last invocation
    pub tx_hash: Option<TxHash>,
    cancel_requested: bool,
}

impl Progress {
    /// Status presented for the current state.
    pub const fn status(&self) -> TransactionStatus {
        self.state.status()
    }
}

/// Runs one kind of operation through the transaction state machine.
#[derive(Debug)]
pub struct TransactionWorkflow<O> {
    negotiator: GasNegotiator,
    progress: Mutex<Progress>,
    events: mpsc::UnboundedSender<WorkflowEvent>,
    _operation: PhantomData<fn(O)>,
}

impl<O: Operation> TransactionWorkflow<O> {
    /// Creates a workflow that publishes its transitions to `events`.
    pub fn new(events: mpsc::UnboundedSender<WorkflowEvent>) -> Self {
        Self {
            negotiator: GasNegotiator::new(),
            progress: Mutex::new(Progress::default()),
            events,
            _operation: PhantomData,
        }
    }

    /// Which workflow this is.
    pub const fn kind(&self) -> WorkflowKind {
        O::KIND
    }

    /// Snapshot of the current progress.
    pub fn progress(&self) -> Progress {
        self.lock().clone()
    }

    /// The negotiator this workflow obtains gas from.
    pub const fn negotiator(&self) -> &GasNegotiator {
        &self.negotiator
    }

    /// Supplies the gas value for the outstanding request, if any.
    pub fn supply_gas(&self, gas: u64) -> bool {
        match self.negotiator.pending() {
            Some(handle) => self.negotiator.supply(handle, gas),
            None => {
                debug!(workflow = %O::KIND, gas, "No gas request pending");
                false
            }
        }
    }

    /// Requests cancellation of the invocation in flight.
    ///
    /// Only meaningful before submission. Returns `false` when nothing is in flight. A pending
    /// estimate call is not interrupted; the invocation stops once it settles.
    pub fn cancel(&self) -> Result<bool, WorkflowError> {
        let mut progress = self.lock();
        match progress.state {
            state if state.is_settled() => Ok(false),
            state if state.is_cancellable() => {
                progress.cancel_requested = true;
                if let Some(handle) = self.negotiator.pending() {
                    self.negotiator.cancel(handle);
                }
                info!(workflow = %O::KIND, invocation = progress.invocation, "Cancellation requested");
                Ok(true)
            }
            state => Err(WorkflowError::AlreadyCommitted(state)),
        }
    }

    /// Returns a finished workflow to `Idle`.
    pub fn clear(&self) -> Result<(), WorkflowError> {
        let mut progress = self.lock();
        match progress.state {
            WorkflowState::Idle => Ok(()),
            WorkflowState::Done | WorkflowState::Error => {
                progress.gas_estimate = None;
                progress.tx_hash = None;
                self.advance(&mut progress, WorkflowState::Idle, EventPayload::None);
                Ok(())
            }
            state => Err(WorkflowError::AlreadyRunning(state)),
        }
    }

    /// Runs one invocation of `operation` to completion.
    ///
    /// Preconditions are checked against `context` before anything is emitted. Any later failure
    /// moves the workflow to [`WorkflowState::Error`] and is also returned.
    pub async fn run(&self, context: ChainContext, operation: O) -> Result<Artifact, WorkflowError> {
        let (account, client) = self.begin(&context, &operation)?;
        self.drive(account, client, operation).await
    }

    /// Checks preconditions now and runs the rest of the invocation on a new task.
    ///
    /// A precondition failure is returned here and never reaches the task, so callers can report
    /// it synchronously.
    pub fn spawn(
        self: &Arc<Self>,
        context: ChainContext,
        operation: O,
    ) -> Result<JoinHandle<Result<Artifact, WorkflowError>>, WorkflowError> {
        let (account, client) = self.begin(&context, &operation)?;
        let workflow = Arc::clone(self);
        Ok(tokio::spawn(async move { workflow.drive(account, client, operation).await }))
    }

    async fn drive(
        &self,
        account: Address,
        client: Arc<dyn ChainClient>,
        operation: O,
    ) -> Result<Artifact, WorkflowError> {
        let request = operation.transaction(account);

        // Estimating
        let estimate = match client.estimate_gas(&request).await {
            Ok(estimate) => estimate,
            Err(e) => {
                let mut progress = self.lock();
                if progress.cancel_requested {
                    debug!(workflow = %O::KIND, error = %e, "Estimate failed after cancellation");
                    return Err(self.reset_cancelled(&mut progress));
                }
                drop(progress);
                return Err(self.fail(WorkflowError::Estimate(e)));
            }
        };

        // AwaitingGas
        let handle = {
            let mut progress = self.lock();
            if progress.cancel_requested {
                return Err(self.reset_cancelled(&mut progress));
            }
            let handle = match self.negotiator.request_gas() {
                Ok(handle) => handle,
                Err(e) => {
                    drop(progress);
                    return Err(self.fail(e.into()));
                }
            };
            progress.gas_estimate = Some(estimate);
            self.advance(&mut progress, WorkflowState::AwaitingGas, EventPayload::GasEstimate(estimate));
            handle
        };
        info!(workflow = %O::KIND, estimate, "Awaiting gas");

        let gas = match self.negotiator.wait(handle).await {
            Ok(gas) => gas,
            Err(NegotiationError::GasRequestCancelled) => {
                return Err(self.reset_cancelled(&mut self.lock()));
            }
            Err(e) => return Err(self.fail(e.into())),
        };

        // Sending
        {
            let mut progress = self.lock();
            if progress.cancel_requested {
                return Err(self.reset_cancelled(&mut progress));
            }
            self.advance(&mut progress, WorkflowState::Sending, EventPayload::GasSelected(gas));
        }
        let mut request = request;
        request.gas = Some(gas);
        let tx_hash = match client.send_transaction(request).await {
            Ok(tx_hash) => tx_hash,
            Err(e) => return Err(self.fail(WorkflowError::Send(e))),
        };
        info!(workflow = %O::KIND, %tx_hash, gas, "Transaction sent");

        // Sent, AwaitingReceipt
        {
            let mut progress = self.lock();
            progress.tx_hash = Some(tx_hash);
            self.advance(&mut progress, WorkflowState::Sent, EventPayload::TransactionHash(tx_hash));
            self.advance(&mut progress, WorkflowState::AwaitingReceipt, EventPayload::None);
        }
        let receipt = match client.wait_for_receipt(tx_hash).await {
            Ok(receipt) => receipt,
            Err(source) => return Err(self.fail(WorkflowError::Receipt { tx_hash, source })),
        };
        if !receipt.status {
            return Err(self.fail(WorkflowError::Reverted { tx_hash }));
        }

        // Decoding
        self.transition(WorkflowState::Decoding, EventPayload::None);
        let artifact = match operation.finalize(client.as_ref(), &receipt).await {
            Ok(artifact) => artifact,
            Err(e) => return Err(self.fail(e)),
        };

        // Done
        {
            let mut progress = self.lock();
            progress.gas_estimate = None;
            self.advance(&mut progress, WorkflowState::Done, EventPayload::Done(artifact.clone()));
        }
        info!(workflow = %O::KIND, %tx_hash, gas_used = receipt.gas_used, "Workflow done");
        Ok(artifact)
    }

    /// Validates preconditions and enters `Estimating`.
    fn begin(
        &self,
        context: &ChainContext,
        operation: &O,
    ) -> Result<(Address, Arc<dyn ChainClient>), WorkflowError> {
        let mut progress = self.lock();
        if !progress.state.is_settled() {
            return Err(WorkflowError::AlreadyRunning(progress.state));
        }

        let account = context.account.ok_or(WorkflowError::NoActiveAccount)?;
        let client = context.client.clone().ok_or(WorkflowError::NoRpcClient)?;
        operation.check()?;

        progress.invocation += 1;
        progress.gas_estimate = None;
        progress.tx_hash = None;
        progress.cancel_requested = false;
        progress.state = WorkflowState::Idle;
        self.advance(&mut progress, WorkflowState::Estimating, EventPayload::None);
        info!(workflow = %O::KIND, invocation = progress.invocation, %account, "Estimating gas");
        Ok((account, client))
    }

    fn transition(&self, next: WorkflowState, payload: EventPayload) {
        self.advance(&mut self.lock(), next, payload);
    }

    /// Moves to `next` and emits the event. Callers hold the progress lock so events leave in
    /// transition order.
    fn advance(&self, progress: &mut Progress, next: WorkflowState, payload: EventPayload) {
        debug_assert!(
            progress.state.can_transition_to(next),
            "illegal transition {} -> {next}",
            progress.state
        );
        progress.state = next;
        let event =
            WorkflowEvent { kind: O::KIND, invocation: progress.invocation, state: next, payload };
        if self.events.send(event).is_err() {
            debug!(workflow = %O::KIND, state = %next, "No event listener");
        }
    }

    fn fail(&self, error: WorkflowError) -> WorkflowError {
        warn!(workflow = %O::KIND, %error, category = %error.category(), "Workflow failed");
        let mut progress = self.lock();
        if let Some(handle) = self.negotiator.pending() {
            self.negotiator.cancel(handle);
        }
        progress.gas_estimate = None;
        self.advance(&mut progress, WorkflowState::Error, EventPayload::Failed(error.clone()));
        error
    }

    fn reset_cancelled(&self, progress: &mut Progress) -> WorkflowError {
        info!(workflow = %O::KIND, invocation = progress.invocation, "Workflow cancelled");
        progress.cancel_requested = false;
        progress.gas_estimate = None;
        self.advance(progress, WorkflowState::Idle, EventPayload::Cancelled);
        WorkflowError::Cancelled
    }

    fn lock(&self) -> MutexGuard<'_, Progress> {
        self.progress.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
