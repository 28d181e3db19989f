//! Presentation model and the updates pushed to the presentation layer.

use alloy_primitives::{Address, Bytes, TxHash, U256};
use serde::Serialize;

use super::Command;
use crate::{
    BytecodeStructure, ComposedInput, ErrorCategory, SourceLanguage, TransactionStatus,
    WorkflowKind, WorkflowState,
};

/// A region of the presentation model that is re-rendered as a unit.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    /// Compile status and bytecode structure
    Compile,
    /// Deployment workflow
    Deployment,
    /// Execution workflow
    Execution,
    /// Known contracts and the active one
    Contracts,
    /// Transaction history
    History,
}

impl View {
    /// Views a command can change.
    pub const fn for_command(command: &Command) -> &'static [Self] {
        match command {
            Command::Compile(_) | Command::CancelCompile => &[Self::Compile],
            Command::Estimate(_) | Command::Execute(_) | Command::CancelExecution => {
                &[Self::Execution]
            }
            Command::Deploy | Command::Send(_) | Command::ClearDeployment => &[Self::Deployment],
            Command::SetContract(_) => &[Self::Contracts, Self::Execution],
        }
    }

    /// Views a workflow transition can change.
    pub const fn for_event(kind: WorkflowKind, state: WorkflowState) -> &'static [Self] {
        match (kind, state) {
            (WorkflowKind::Deployment, WorkflowState::Done) => &[Self::Deployment, Self::Contracts],
            (WorkflowKind::Deployment, _) => &[Self::Deployment],
            (WorkflowKind::Execution, WorkflowState::Done) => &[Self::Execution, Self::History],
            (WorkflowKind::Execution, _) => &[Self::Execution],
        }
    }
}

/// Lifecycle of the current compile request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CompileStatus {
    /// Nothing requested
    #[default]
    Idle,
    /// Waiting for the compiler
    Compiling,
    /// Structure available
    Compiled,
    /// Aborted by the user
    Cancelled,
    /// The compiler failed
    Error,
}

/// Compile state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct CompileView {
    /// Request status
    pub status: CompileStatus,
    /// Path of the file last sent to the compiler
    pub current_file: Option<String>,
    /// Its language
    pub language: Option<SourceLanguage>,
    /// Result of the last successful compile
    pub structure: Option<BytecodeStructure>,
    /// Message of the last failure
    pub error: Option<String>,
}

/// Deployment workflow state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeploymentView {
    /// Coarse status
    pub status: TransactionStatus,
    /// Exact workflow state
    pub state: WorkflowState,
    /// Estimate awaiting a gas choice
    pub gas_estimate: Option<u64>,
    /// Deployment transaction
    pub tx_hash: Option<TxHash>,
    /// Address of the deployed unit
    pub address: Option<Address>,
    /// Message of the last failure
    pub error: Option<String>,
}

/// Execution workflow state.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ExecutionView {
    /// Coarse status
    pub status: TransactionStatus,
    /// Exact workflow state
    pub state: WorkflowState,
    /// Estimate awaiting a gas choice
    pub gas_estimate: Option<u64>,
    /// Unit the invocation in flight targets
    pub target: Option<Address>,
    /// Arguments of the invocation in flight
    pub args: Vec<U256>,
    /// Composed bytecode of the invocation in flight
    pub input: Option<ComposedInput>,
    /// Execution transaction
    pub tx_hash: Option<TxHash>,
    /// Output of the last execution
    pub output: Option<Bytes>,
    /// Message of the last failure
    pub error: Option<String>,
}

impl ExecutionView {
    /// Drops everything tied to the finished invocation except status and state.
    pub fn clear_transient(&mut self) {
        self.gas_estimate = None;
        self.target = None;
        self.args.clear();
        self.input = None;
        self.tx_hash = None;
        self.output = None;
    }
}

/// One completed execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryRow {
    /// Execution transaction
    pub tx_hash: TxHash,
    /// Unit that executed it
    pub contract: Address,
    /// Arguments patched into the template
    pub args: Vec<U256>,
    /// Returned output
    pub output: Bytes,
}

/// Everything the presentation layer renders.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Model {
    /// Compile state
    pub compile: CompileView,
    /// Deployment state
    pub deployment: DeploymentView,
    /// Execution state
    pub execution: ExecutionView,
    /// Deployed or selected units, in insertion order
    pub contracts: Vec<Address>,
    /// Unit executions target
    pub active_contract: Option<Address>,
    /// Completed executions, oldest first
    pub history: Vec<HistoryRow>,
}

impl Model {
    /// Adds `contract` unless already known.
    pub fn add_contract(&mut self, contract: Address) {
        if !self.contracts.contains(&contract) {
            self.contracts.push(contract);
        }
    }

    /// Snapshot of one view.
    pub fn snapshot(&self, view: View) -> ViewUpdate {
        match view {
            View::Compile => ViewUpdate::Compile(self.compile.clone()),
            View::Deployment => ViewUpdate::Deployment(self.deployment.clone()),
            View::Execution => ViewUpdate::Execution(self.execution.clone()),
            View::Contracts => ViewUpdate::Contracts {
                contracts: self.contracts.clone(),
                active: self.active_contract,
            },
            View::History => ViewUpdate::History { rows: self.history.clone() },
        }
    }
}

/// One outbound update.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "view", rename_all = "snake_case")]
pub enum ViewUpdate {
    /// Compile view snapshot
    Compile(CompileView),
    /// Deployment view snapshot
    Deployment(DeploymentView),
    /// Execution view snapshot
    Execution(ExecutionView),
    /// Contracts view snapshot
    Contracts {
        /// Known units
        contracts: Vec<Address>,
        /// Active unit
        active: Option<Address>,
    },
    /// History view snapshot
    History {
        /// Completed executions
        rows: Vec<HistoryRow>,
    },
    /// A command failed
    Error {
        /// Command name as received
        command: String,
        /// Rendered error
        message: String,
        /// Error class
        category: ErrorCategory,
    },
}
