//! End-to-end runs of the deployment and execution workflows against a scripted chain.

use std::{sync::Arc, time::Duration};

use alloy_primitives::{address, Address, Bytes, TxKind, U256};
use alloy_sol_types::SolCall;
use tokio::sync::mpsc::{self, UnboundedReceiver};
use vunit::{
    contracts::IVirtualizationUnit,
    test_utils::{slotted_template, ScriptedChain, SCRIPTED_UNIT},
    Artifact, BytecodeComposer, BytecodeStructure, ChainClient, ChainContext, ComposedInput,
    Deploy, DeploymentWorkflow, ErrorCategory, EventPayload, Execute, ExecutionWorkflow, RpcError,
    TransactionStatus, WorkflowError, WorkflowEvent, WorkflowState,
};

const ACCOUNT: Address = address!("f39Fd6e51aad88F6F4ce6aB8827279cffFb92266");

fn context(chain: &Arc<ScriptedChain>) -> ChainContext {
    ChainContext { account: Some(ACCOUNT), client: Some(chain.clone() as Arc<dyn ChainClient>) }
}

fn composed(args: &[u64]) -> ComposedInput {
    let structure = BytecodeStructure { key: "0x10".into(), ..slotted_template(0x10, args.len()) };
    let args: Vec<U256> = args.iter().copied().map(U256::from).collect();
    BytecodeComposer::default().compose(&structure, &args).unwrap()
}

async fn next_event(rx: &mut UnboundedReceiver<WorkflowEvent>) -> WorkflowEvent {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no event within 5s")
        .expect("event channel closed")
}

#[tokio::test]
async fn test_execution_happy_path() {
    let chain = Arc::new(ScriptedChain::default().with_output(Bytes::from_static(&[0x2a, 0x2b])));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(ExecutionWorkflow::new(tx));
    let input = composed(&[5, 9]);

    let task = workflow
        .spawn(
            context(&chain),
            Execute::new(Some(SCRIPTED_UNIT), Some(input.clone()))
                .with_args(vec![U256::from(5), U256::from(9)]),
        )
        .unwrap();

    let mut events = vec![next_event(&mut rx).await, next_event(&mut rx).await];
    assert_eq!(events[1].state, WorkflowState::AwaitingGas);
    assert_eq!(events[1].payload, EventPayload::GasEstimate(21_000));
    assert_eq!(workflow.progress().gas_estimate, Some(21_000));

    assert!(workflow.supply_gas(25_000));
    loop {
        let event = next_event(&mut rx).await;
        let terminal = event.is_terminal();
        events.push(event);
        if terminal {
            break;
        }
    }

    let states: Vec<_> = events.iter().map(|event| event.state).collect();
    assert_eq!(
        states,
        [
            WorkflowState::Estimating,
            WorkflowState::AwaitingGas,
            WorkflowState::Sending,
            WorkflowState::Sent,
            WorkflowState::AwaitingReceipt,
            WorkflowState::Decoding,
            WorkflowState::Done,
        ]
    );
    assert!(events.iter().all(|event| event.invocation == 1));
    assert_eq!(events[2].payload, EventPayload::GasSelected(25_000));

    let EventPayload::TransactionHash(tx_hash) = events[3].payload else {
        panic!("expected a transaction hash, got {:?}", events[3].payload);
    };
    let expected = Artifact::Execution {
        output: Bytes::from_static(&[0x2a, 0x2b]),
        tx_hash,
        contract: SCRIPTED_UNIT,
        args: vec![U256::from(5), U256::from(9)],
    };
    assert_eq!(events[6].payload, EventPayload::Done(expected.clone()));
    assert_eq!(task.await.unwrap(), Ok(expected));
    assert!(rx.try_recv().is_err());

    let sent = chain.sent();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].gas, Some(25_000));
    assert_eq!(sent[0].to, Some(TxKind::Call(SCRIPTED_UNIT)));
    let call = IVirtualizationUnit::executeCall::abi_decode_validate(
        sent[0].input.input().expect("calldata set"),
    )
    .unwrap();
    assert_eq!(call.code, *input.bytes());

    let progress = workflow.progress();
    assert_eq!(progress.status(), TransactionStatus::Confirmed);
    assert_eq!(progress.gas_estimate, None);
    assert_eq!(progress.tx_hash, Some(tx_hash));
}

#[tokio::test]
async fn test_estimate_failure() {
    let chain = Arc::new(
        ScriptedChain::default().with_estimate(Err(RpcError::Transport("connection refused".into()))),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = ExecutionWorkflow::new(tx);

    let err = workflow
        .run(context(&chain), Execute::new(Some(SCRIPTED_UNIT), Some(composed(&[1]))))
        .await
        .unwrap_err();
    assert_eq!(err, WorkflowError::Estimate(RpcError::Transport("connection refused".into())));
    assert_eq!(err.category(), ErrorCategory::Transport);

    assert_eq!(next_event(&mut rx).await.state, WorkflowState::Estimating);
    let failed = next_event(&mut rx).await;
    assert_eq!(failed.state, WorkflowState::Error);
    assert_eq!(failed.payload, EventPayload::Failed(err));
    assert!(rx.try_recv().is_err());

    let progress = workflow.progress();
    assert_eq!(progress.status(), TransactionStatus::Error);
    assert_eq!(progress.gas_estimate, None);
    assert_eq!(workflow.negotiator().pending(), None);
    // no request was ever opened
    assert_eq!(workflow.negotiator().request_gas().unwrap().to_string(), "gas-request#1");
    assert!(chain.sent().is_empty());
}

#[tokio::test]
async fn test_duplicate_gas_supply() {
    let chain = Arc::new(ScriptedChain::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(ExecutionWorkflow::new(tx));
    let task = workflow
        .spawn(context(&chain), Execute::new(Some(SCRIPTED_UNIT), Some(composed(&[7]))))
        .unwrap();

    next_event(&mut rx).await;
    next_event(&mut rx).await;
    assert!(workflow.supply_gas(40_000));
    assert!(!workflow.supply_gas(90_000));

    let sending = next_event(&mut rx).await;
    assert_eq!(sending.payload, EventPayload::GasSelected(40_000));
    task.await.unwrap().unwrap();
    assert_eq!(chain.sent()[0].gas, Some(40_000));
}

#[tokio::test]
async fn test_cancel_while_awaiting_gas() {
    let chain = Arc::new(ScriptedChain::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(DeploymentWorkflow::new(tx));
    let operation = Deploy::new(Bytes::from_static(&[0x60, 0x80]));

    let task = workflow.spawn(context(&chain), operation.clone()).unwrap();
    next_event(&mut rx).await;
    assert_eq!(next_event(&mut rx).await.state, WorkflowState::AwaitingGas);

    assert_eq!(workflow.cancel(), Ok(true));
    let cancelled = next_event(&mut rx).await;
    assert_eq!(cancelled.state, WorkflowState::Idle);
    assert_eq!(cancelled.payload, EventPayload::Cancelled);
    assert!(cancelled.is_terminal());
    assert_eq!(task.await.unwrap(), Err(WorkflowError::Cancelled));
    assert!(chain.sent().is_empty());
    assert_eq!(workflow.progress().status(), TransactionStatus::None);
    assert!(!workflow.supply_gas(1));

    // a fresh invocation starts clean
    let task = workflow.spawn(context(&chain), operation).unwrap();
    assert_eq!(next_event(&mut rx).await.invocation, 2);
    next_event(&mut rx).await;
    assert!(workflow.supply_gas(60_000));
    assert!(matches!(task.await.unwrap(), Ok(Artifact::Deployment { .. })));
}

#[tokio::test]
async fn test_cancel_while_estimating() {
    let chain = Arc::new(ScriptedChain::default().with_estimate_delay(Duration::from_millis(50)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(ExecutionWorkflow::new(tx));
    let task = workflow
        .spawn(context(&chain), Execute::new(Some(SCRIPTED_UNIT), Some(composed(&[2]))))
        .unwrap();

    assert_eq!(next_event(&mut rx).await.state, WorkflowState::Estimating);
    assert_eq!(workflow.cancel(), Ok(true));
    assert_eq!(workflow.negotiator().pending(), None);

    let cancelled = next_event(&mut rx).await;
    assert_eq!(cancelled.state, WorkflowState::Idle);
    assert_eq!(cancelled.payload, EventPayload::Cancelled);
    assert_eq!(task.await.unwrap(), Err(WorkflowError::Cancelled));
    assert!(rx.try_recv().is_err());

    assert_eq!(chain.estimate_calls(), 1);
    assert!(chain.sent().is_empty());
    assert_eq!(workflow.progress().status(), TransactionStatus::None);
    // the estimate settled without a gas request being opened
    assert_eq!(workflow.negotiator().request_gas().unwrap().to_string(), "gas-request#1");
}

#[tokio::test]
async fn test_cancel_wins_over_failed_estimate() {
    let chain = Arc::new(
        ScriptedChain::default()
            .with_estimate(Err(RpcError::Transport("connection reset".into())))
            .with_estimate_delay(Duration::from_millis(50)),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(DeploymentWorkflow::new(tx));
    let task = workflow.spawn(context(&chain), Deploy::new(Bytes::from_static(&[0x00]))).unwrap();

    next_event(&mut rx).await;
    assert_eq!(workflow.cancel(), Ok(true));

    let settled = next_event(&mut rx).await;
    assert_eq!(settled.state, WorkflowState::Idle);
    assert_eq!(settled.payload, EventPayload::Cancelled);
    assert_eq!(task.await.unwrap(), Err(WorkflowError::Cancelled));
    assert!(rx.try_recv().is_err());
    assert_eq!(workflow.progress().status(), TransactionStatus::None);
}

#[tokio::test]
async fn test_output_fetch_failure() {
    let chain = Arc::new(
        ScriptedChain::default().with_call_result(Err(RpcError::Transport("node went away".into()))),
    );
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(ExecutionWorkflow::new(tx));
    let task = workflow
        .spawn(context(&chain), Execute::new(Some(SCRIPTED_UNIT), Some(composed(&[6]))))
        .unwrap();

    next_event(&mut rx).await;
    next_event(&mut rx).await;
    workflow.supply_gas(21_000);

    let err = task.await.unwrap().unwrap_err();
    let WorkflowError::Output { tx_hash, source } = &err else {
        panic!("unexpected error: {err}");
    };
    assert_eq!(*source, RpcError::Transport("node went away".into()));
    assert_eq!(Some(*tx_hash), workflow.progress().tx_hash);
    assert_eq!(err.category(), ErrorCategory::Decode);
    assert_eq!(workflow.progress().status(), TransactionStatus::Error);
    assert_eq!(chain.sent().len(), 1);
}

#[tokio::test]
async fn test_malformed_output() {
    let chain =
        Arc::new(ScriptedChain::default().with_call_result(Ok(Bytes::from_static(&[0x01]))));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(ExecutionWorkflow::new(tx));
    let task = workflow
        .spawn(context(&chain), Execute::new(Some(SCRIPTED_UNIT), Some(composed(&[6]))))
        .unwrap();

    next_event(&mut rx).await;
    next_event(&mut rx).await;
    workflow.supply_gas(21_000);

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, WorkflowError::MalformedOutput { .. }));
    assert_eq!(err.category(), ErrorCategory::Decode);
    assert_eq!(err.tx_hash(), workflow.progress().tx_hash);

    let mut last = next_event(&mut rx).await;
    while let Ok(event) = rx.try_recv() {
        last = event;
    }
    assert_eq!(last.state, WorkflowState::Error);
    assert_eq!(last.payload, EventPayload::Failed(err));
}

#[tokio::test]
async fn test_cancel_after_submission_is_refused() {
    let chain = Arc::new(ScriptedChain::default().with_receipt_delay(Duration::from_millis(100)));
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(ExecutionWorkflow::new(tx));
    let task = workflow
        .spawn(context(&chain), Execute::new(Some(SCRIPTED_UNIT), Some(composed(&[3]))))
        .unwrap();

    next_event(&mut rx).await;
    next_event(&mut rx).await;
    workflow.supply_gas(30_000);
    while next_event(&mut rx).await.state != WorkflowState::Sent {}

    assert!(matches!(workflow.cancel(), Err(WorkflowError::AlreadyCommitted(_))));
    assert_eq!(workflow.clear(), Err(WorkflowError::AlreadyRunning(WorkflowState::AwaitingReceipt)));
    assert!(matches!(task.await.unwrap(), Ok(Artifact::Execution { .. })));
}

#[tokio::test]
async fn test_missing_event_keeps_tx_hash() {
    let chain = Arc::new(ScriptedChain::default().without_events());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(ExecutionWorkflow::new(tx));
    let task = workflow
        .spawn(context(&chain), Execute::new(Some(SCRIPTED_UNIT), Some(composed(&[1, 2]))))
        .unwrap();

    next_event(&mut rx).await;
    next_event(&mut rx).await;
    workflow.supply_gas(21_000);

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, WorkflowError::MissingEvent { event: "Executed(address)", .. }));
    assert_eq!(err.category(), ErrorCategory::Decode);
    assert_eq!(err.tx_hash(), workflow.progress().tx_hash);
    assert!(err.tx_hash().is_some());
    assert_eq!(workflow.progress().status(), TransactionStatus::Error);

    assert_eq!(workflow.clear(), Ok(()));
    let mut last = next_event(&mut rx).await;
    while let Ok(event) = rx.try_recv() {
        last = event;
    }
    assert_eq!(last.state, WorkflowState::Idle);
    assert_eq!(workflow.progress().tx_hash, None);
}

#[tokio::test]
async fn test_reverted_transaction() {
    let chain = Arc::new(ScriptedChain::default().reverting());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(DeploymentWorkflow::new(tx));
    let task = workflow.spawn(context(&chain), Deploy::new(Bytes::from_static(&[0x00]))).unwrap();

    next_event(&mut rx).await;
    next_event(&mut rx).await;
    workflow.supply_gas(21_000);

    let err = task.await.unwrap().unwrap_err();
    assert!(matches!(err, WorkflowError::Reverted { .. }));
    assert_eq!(err.category(), ErrorCategory::Transport);
}

#[tokio::test]
async fn test_deploy_happy_path() {
    let chain = Arc::new(ScriptedChain::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(DeploymentWorkflow::new(tx));
    let task = workflow
        .spawn(context(&chain), Deploy::new(Bytes::from_static(&[0x60, 0x80, 0x60, 0x40])))
        .unwrap();

    next_event(&mut rx).await;
    next_event(&mut rx).await;
    assert!(workflow.supply_gas(120_000));

    let Ok(Artifact::Deployment { unit, tx_hash }) = task.await.unwrap() else {
        panic!("deployment failed");
    };
    assert_eq!(unit, SCRIPTED_UNIT);
    assert_eq!(workflow.progress().tx_hash, Some(tx_hash));

    let sent = chain.sent();
    assert_eq!(sent[0].to, Some(TxKind::Create));
    assert_eq!(sent[0].from, Some(ACCOUNT));
    assert_eq!(sent[0].gas, Some(120_000));
}

#[tokio::test]
async fn test_second_invocation_while_busy() {
    let chain = Arc::new(ScriptedChain::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = Arc::new(ExecutionWorkflow::new(tx));
    let operation = Execute::new(Some(SCRIPTED_UNIT), Some(composed(&[1])));
    let _task = workflow.spawn(context(&chain), operation.clone()).unwrap();

    next_event(&mut rx).await;
    next_event(&mut rx).await;
    assert_eq!(
        workflow.run(context(&chain), operation).await,
        Err(WorkflowError::AlreadyRunning(WorkflowState::AwaitingGas))
    );
    assert!(rx.try_recv().is_err());
}

#[tokio::test]
async fn test_missing_input() {
    let chain = Arc::new(ScriptedChain::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let workflow = ExecutionWorkflow::new(tx);
    let err = workflow.run(context(&chain), Execute::new(Some(SCRIPTED_UNIT), None)).await;
    assert_eq!(err, Err(WorkflowError::NoComposedInput));
    assert_eq!(err.unwrap_err().category(), ErrorCategory::Precondition);
    assert!(rx.try_recv().is_err());
    assert_eq!(chain.estimate_calls(), 0);
}

#[tokio::test]
async fn test_workflows_negotiate_independently() {
    let chain = Arc::new(ScriptedChain::default());
    let (tx, mut rx) = mpsc::unbounded_channel();
    let deployment = Arc::new(DeploymentWorkflow::new(tx.clone()));
    let execution = Arc::new(ExecutionWorkflow::new(tx));

    let deploy = deployment.spawn(context(&chain), Deploy::new(Bytes::from_static(&[0x00]))).unwrap();
    let execute = execution
        .spawn(context(&chain), Execute::new(Some(SCRIPTED_UNIT), Some(composed(&[4]))))
        .unwrap();
    for _ in 0..4 {
        next_event(&mut rx).await;
    }
    assert!(deployment.negotiator().pending().is_some());
    assert!(execution.negotiator().pending().is_some());

    assert!(deployment.supply_gas(50_000));
    deploy.await.unwrap().unwrap();
    assert_eq!(execution.progress().state, WorkflowState::AwaitingGas);
    assert!(execution.negotiator().pending().is_some());

    assert!(execution.supply_gas(70_000));
    execute.await.unwrap().unwrap();
    let gas: Vec<_> = chain.sent().iter().map(|tx| tx.gas).collect();
    assert_eq!(gas, [Some(50_000), Some(70_000)]);
}
