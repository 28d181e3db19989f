//! Command routing and view synchronisation.
//!
//! [`EventSyncBridge`] sits between the presentation layer and the two workflows. Inbound
//! [`CommandEnvelope`]s are parsed and routed to the owning workflow or to the local model;
//! workflow transitions and compile results update the model. After each of those the views
//! listed in the fan-out table ([`View::for_command`], [`View::for_event`]) are pushed as
//! [`ViewUpdate`]s, and nothing else.

mod command;
mod error;
mod view;

pub use command::*;
pub use error::*;
pub use view::*;

use std::sync::Arc;

use alloy_primitives::{Bytes, U256};
use tokio::{sync::mpsc, task::JoinHandle};
use tracing::{debug, info, trace, warn};

use crate::{
    ensure_nargs, Artifact, BytecodeComposer, BytecodeStructure, ChainContext, CompileError,
    Compiler, ComposerConfig, Deploy, DeploymentWorkflow, EventPayload, Execute,
    ExecutionWorkflow, FileSource, WalletSession, WorkflowEvent, WorkflowKind, WorkflowState,
};

/// Bridge settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BridgeConfig {
    /// Init code of the virtualization unit, deployed by `deploy`
    pub unit_init_code: Bytes,
    /// Slot layout agreed with the compiler
    pub composer: ComposerConfig,
}

/// External collaborators the bridge talks to.
#[derive(Debug, Clone)]
pub struct Collaborators {
    /// Wallet connection, read at the start of every invocation
    pub session: Arc<dyn WalletSession>,
    /// Remote compiler
    pub compiler: Arc<dyn Compiler>,
    /// Where the file to compile comes from
    pub source: Arc<dyn FileSource>,
}

#[derive(Debug)]
struct CompileOutcome {
    generation: u64,
    nargs: usize,
    result: Result<BytecodeStructure, CompileError>,
}

/// Routes commands to workflows and pushes view snapshots.
#[derive(Debug)]
pub struct EventSyncBridge {
    config: BridgeConfig,
    collaborators: Collaborators,
    composer: BytecodeComposer,
    deployment: Arc<DeploymentWorkflow>,
    execution: Arc<ExecutionWorkflow>,
    events: mpsc::UnboundedReceiver<WorkflowEvent>,
    compiled_tx: mpsc::UnboundedSender<CompileOutcome>,
    compiled_rx: mpsc::UnboundedReceiver<CompileOutcome>,
    compile_task: Option<JoinHandle<()>>,
    compile_generation: u64,
    /// Highest execution invocation already written to the history.
    recorded_invocation: u64,
    model: Model,
    updates: mpsc::UnboundedSender<ViewUpdate>,
}

impl EventSyncBridge {
    /// Creates a bridge pushing its view updates to `updates`.
    pub fn new(
        config: BridgeConfig,
        collaborators: Collaborators,
        updates: mpsc::UnboundedSender<ViewUpdate>,
    ) -> Self {
        let (events_tx, events) = mpsc::unbounded_channel();
        let (compiled_tx, compiled_rx) = mpsc::unbounded_channel();
        Self {
            composer: BytecodeComposer::new(config.composer),
            config,
            collaborators,
            deployment: Arc::new(DeploymentWorkflow::new(events_tx.clone())),
            execution: Arc::new(ExecutionWorkflow::new(events_tx)),
            events,
            compiled_tx,
            compiled_rx,
            compile_task: None,
            compile_generation: 0,
            recorded_invocation: 0,
            model: Model::default(),
            updates,
        }
    }

    /// Current presentation model.
    pub const fn model(&self) -> &Model {
        &self.model
    }

    /// The deployment workflow.
    pub const fn deployment(&self) -> &Arc<DeploymentWorkflow> {
        &self.deployment
    }

    /// The execution workflow.
    pub const fn execution(&self) -> &Arc<ExecutionWorkflow> {
        &self.execution
    }

    /// Handles one envelope, reporting a failure as [`ViewUpdate::Error`].
    pub fn handle(&mut self, envelope: &CommandEnvelope) {
        if let Err(error) = self.dispatch(envelope) {
            warn!(command = %envelope.command, %error, "Command failed");
            self.publish_error(&envelope.command, &error);
        }
    }

    /// Parses `envelope` and routes it. On success the views the command can change are pushed.
    pub fn dispatch(&mut self, envelope: &CommandEnvelope) -> Result<(), BridgeError> {
        let command = Command::try_from(envelope)?;
        debug!(command = command.name(), value = ?envelope.value, "Dispatching");
        self.apply(&command)?;
        self.publish(View::for_command(&command));
        Ok(())
    }

    fn apply(&mut self, command: &Command) -> Result<(), BridgeError> {
        match command {
            Command::Compile(nargs) => self.compile(*nargs),
            Command::Estimate(args) => self.estimate(args),
            Command::Execute(gas) => {
                if !self.execution.supply_gas(*gas) {
                    debug!(gas, "Execution gas ignored");
                }
                Ok(())
            }
            Command::Deploy => {
                let context = ChainContext::capture(self.collaborators.session.as_ref());
                let operation = Deploy::new(self.config.unit_init_code.clone());
                self.deployment.spawn(context, operation)?;
                Ok(())
            }
            Command::Send(gas) => {
                if !self.deployment.supply_gas(*gas) {
                    debug!(gas, "Deployment gas ignored");
                }
                Ok(())
            }
            Command::CancelCompile => {
                self.abort_compile();
                if self.model.compile.status == CompileStatus::Compiling {
                    self.model.compile.status = CompileStatus::Cancelled;
                }
                Ok(())
            }
            Command::CancelExecution => {
                if self.execution.cancel()? {
                    return Ok(());
                }
                self.execution.clear()?;
                self.model.execution = ExecutionView::default();
                Ok(())
            }
            Command::ClearDeployment => {
                if self.deployment.progress().state.is_cancellable() {
                    self.deployment.cancel()?;
                    return Ok(());
                }
                self.deployment.clear()?;
                self.model.deployment = DeploymentView::default();
                Ok(())
            }
            Command::SetContract(contract) => {
                self.model.add_contract(*contract);
                self.model.active_contract = Some(*contract);
                info!(%contract, "Active contract set");
                Ok(())
            }
        }
    }

    fn compile(&mut self, nargs: usize) -> Result<(), BridgeError> {
        let file = self.collaborators.source.current_file()?.ok_or(BridgeError::NoSourceFile)?;
        self.abort_compile();

        let generation = self.compile_generation;
        self.model.compile = CompileView {
            status: CompileStatus::Compiling,
            current_file: Some(file.path.clone()),
            language: Some(file.extension),
            structure: None,
            error: None,
        };
        info!(path = %file.path, language = %file.extension, nargs, generation, "Compiling");

        let compiler = Arc::clone(&self.collaborators.compiler);
        let outcomes = self.compiled_tx.clone();
        self.compile_task = Some(tokio::spawn(async move {
            let result = compiler.compile(&file, nargs).await;
            let _ = outcomes.send(CompileOutcome { generation, nargs, result });
        }));
        Ok(())
    }

    /// Stops the compile in flight. Results of older generations are dropped on arrival.
    fn abort_compile(&mut self) {
        self.compile_generation += 1;
        if let Some(task) = self.compile_task.take() {
            task.abort();
        }
    }

    fn estimate(&mut self, args: &[U256]) -> Result<(), BridgeError> {
        let structure = self.model.compile.structure.as_ref().ok_or(BridgeError::NotCompiled)?;
        let input = self.composer.compose(structure, args)?;

        let context = ChainContext::capture(self.collaborators.session.as_ref());
        let target = self.model.active_contract;
        let operation = Execute::new(target, Some(input.clone())).with_args(args.to_vec());
        self.execution.spawn(context, operation)?;

        let execution = &mut self.model.execution;
        execution.clear_transient();
        execution.error = None;
        execution.target = target;
        execution.args = args.to_vec();
        execution.input = Some(input);
        Ok(())
    }

    /// Applies one workflow transition to the model and pushes the affected views.
    ///
    /// A `Done` event of an execution invocation already recorded is applied to the view but
    /// never adds a second history row.
    pub fn on_state_change(&mut self, event: WorkflowEvent) {
        trace!(kind = %event.kind, invocation = event.invocation, state = %event.state, "Workflow event");
        match event.kind {
            WorkflowKind::Deployment => self.apply_deployment_event(&event),
            WorkflowKind::Execution => self.apply_execution_event(&event),
        }
        self.publish(View::for_event(event.kind, event.state));
    }

    fn apply_deployment_event(&mut self, event: &WorkflowEvent) {
        if let EventPayload::Done(Artifact::Deployment { unit, .. }) = &event.payload {
            self.model.add_contract(*unit);
            if self.model.active_contract.is_none() {
                self.model.active_contract = Some(*unit);
                info!(contract = %unit, "Active contract set");
            }
        }

        if event.invocation != self.deployment.progress().invocation {
            trace!(invocation = event.invocation, state = %event.state, "Superseded deployment event");
            return;
        }

        let view = &mut self.model.deployment;
        view.state = event.state;
        view.status = event.state.status();
        match &event.payload {
            EventPayload::None | EventPayload::GasSelected(_) => {
                if event.state == WorkflowState::Estimating {
                    view.error = None;
                    view.address = None;
                    view.tx_hash = None;
                }
            }
            EventPayload::GasEstimate(estimate) => view.gas_estimate = Some(*estimate),
            EventPayload::TransactionHash(tx_hash) => view.tx_hash = Some(*tx_hash),
            EventPayload::Cancelled => *view = DeploymentView::default(),
            EventPayload::Failed(error) => {
                view.gas_estimate = None;
                view.error = Some(error.to_string());
                view.tx_hash = error.tx_hash().or(view.tx_hash);
            }
            EventPayload::Done(artifact) => {
                view.gas_estimate = None;
                if let Artifact::Deployment { unit, tx_hash } = artifact {
                    view.address = Some(*unit);
                    view.tx_hash = Some(*tx_hash);
                }
            }
        }
    }

    /// History rows are built from the artifact alone. The view only follows the invocation the
    /// workflow is currently on, so a late `Done` never touches the fields of a newer `estimate`.
    fn apply_execution_event(&mut self, event: &WorkflowEvent) {
        if let EventPayload::Done(Artifact::Execution { output, tx_hash, contract, args }) =
            &event.payload
        {
            if event.invocation > self.recorded_invocation {
                self.recorded_invocation = event.invocation;
                let row = HistoryRow {
                    tx_hash: *tx_hash,
                    contract: *contract,
                    args: args.clone(),
                    output: output.clone(),
                };
                info!(tx_hash = %row.tx_hash, contract = %row.contract, "Execution recorded");
                self.model.history.push(row);
            } else {
                debug!(invocation = event.invocation, "Execution already recorded");
            }
        }

        if event.invocation != self.execution.progress().invocation {
            trace!(invocation = event.invocation, state = %event.state, "Superseded execution event");
            return;
        }

        let view = &mut self.model.execution;
        view.state = event.state;
        view.status = event.state.status();
        match &event.payload {
            EventPayload::None | EventPayload::GasSelected(_) => {}
            EventPayload::GasEstimate(estimate) => view.gas_estimate = Some(*estimate),
            EventPayload::TransactionHash(tx_hash) => view.tx_hash = Some(*tx_hash),
            EventPayload::Cancelled => view.clear_transient(),
            EventPayload::Failed(error) => {
                view.gas_estimate = None;
                view.error = Some(error.to_string());
                view.tx_hash = error.tx_hash().or(view.tx_hash);
            }
            EventPayload::Done(artifact) => {
                view.clear_transient();
                if let Artifact::Execution { output, tx_hash, .. } = artifact {
                    view.output = Some(output.clone());
                    view.tx_hash = Some(*tx_hash);
                }
            }
        }
    }

    fn on_compiled(&mut self, outcome: CompileOutcome) {
        if outcome.generation != self.compile_generation {
            trace!(generation = outcome.generation, "Discarding stale compile result");
            return;
        }
        self.compile_task = None;

        let compile = &mut self.model.compile;
        match outcome.result.and_then(|structure| ensure_nargs(structure, outcome.nargs)) {
            Ok(structure) => {
                info!(nargs = structure.nargs, key = %structure.key, "Compiled");
                compile.status = CompileStatus::Compiled;
                compile.structure = Some(structure);
                compile.error = None;
            }
            Err(error) => {
                warn!(%error, "Compile failed");
                compile.status = CompileStatus::Error;
                compile.error = Some(error.to_string());
            }
        }
        self.publish(&[View::Compile]);
    }

    /// Waits for the next workflow event or compile result and applies it.
    pub async fn process_next(&mut self) {
        tokio::select! {
            Some(event) = self.events.recv() => self.on_state_change(event),
            Some(outcome) = self.compiled_rx.recv() => self.on_compiled(outcome),
            else => {}
        }
    }

    /// Serves `commands` until the sender side closes.
    ///
    /// Afterwards, invocations that can still progress without input are followed to the end and
    /// those waiting for gas are cancelled.
    pub async fn run(mut self, mut commands: mpsc::UnboundedReceiver<CommandEnvelope>) {
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(envelope) => self.handle(&envelope),
                    None => break,
                },
                Some(event) = self.events.recv() => self.on_state_change(event),
                Some(outcome) = self.compiled_rx.recv() => self.on_compiled(outcome),
            }
        }

        debug!("Command stream closed, draining");
        while !self.is_quiescent() {
            self.process_next().await;
        }
        self.process_ready();
        for cancelled in [self.deployment.cancel(), self.execution.cancel()] {
            if matches!(cancelled, Ok(true)) {
                self.process_next().await;
            }
        }
        info!(history = self.model.history.len(), "Session finished");
    }

    /// Applies everything already queued without waiting.
    fn process_ready(&mut self) {
        while let Ok(event) = self.events.try_recv() {
            self.on_state_change(event);
        }
        while let Ok(outcome) = self.compiled_rx.try_recv() {
            self.on_compiled(outcome);
        }
    }

    /// Whether nothing can progress without further commands.
    fn is_quiescent(&self) -> bool {
        let waiting = |state: WorkflowState, pending: bool| {
            state.is_settled() || (state == WorkflowState::AwaitingGas && pending)
        };
        self.compile_task.is_none() &&
            waiting(self.deployment.progress().state, self.deployment.negotiator().pending().is_some()) &&
            waiting(self.execution.progress().state, self.execution.negotiator().pending().is_some())
    }

    fn publish(&self, views: &[View]) {
        for view in views {
            if self.updates.send(self.model.snapshot(*view)).is_err() {
                trace!(?view, "No view listener");
            }
        }
    }

    fn publish_error(&self, command: &str, error: &BridgeError) {
        let update = ViewUpdate::Error {
            command: command.to_string(),
            message: error.to_string(),
            category: error.category(),
        };
        if self.updates.send(update).is_err() {
            trace!(command, "No view listener for error");
        }
    }
}
