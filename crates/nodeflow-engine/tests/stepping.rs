//! Pause, step, breakpoint and reset through `StepController`.

use std::sync::Arc;
use std::time::Duration;

use serde_json::json;

use nodeflow_core::event::EventBus;
use nodeflow_core::types::{ExecutionStatus, FlowEvent, PauseReason, RunMode};
use nodeflow_core::FlowError;
use nodeflow_engine::{ExecutionState, FlowRunner, Graph, GraphDocument, RunOptions, StepController};
use nodeflow_test_utils::{document, edge, node, FailingLlm, RecordingTools};

fn chain() -> Graph {
    GraphDocument::from_json(&document(
        vec![
            node("a", "message", json!({"message": "one"})),
            node("b", "message", json!({"message": "two"})),
            node("c", "message", json!({"message": "three"})),
        ],
        vec![edge("a", "b"), edge("b", "c")],
        "a",
    ))
    .unwrap()
    .into_graph()
    .unwrap()
}

fn controller(bus: Arc<EventBus>) -> StepController {
    let runner = FlowRunner::new(Arc::new(FailingLlm), Arc::new(RecordingTools::new()), bus);
    StepController::new(Arc::new(runner))
}

fn options() -> RunOptions {
    RunOptions {
        mode: RunMode::Live,
        ..RunOptions::default()
    }
}

/// Poll until the runner is parked at `node_id`.
async fn parked_at(ctl: &StepController, node_id: &str) -> ExecutionState {
    for _ in 0..400 {
        let state = ctl.state().await;
        if state.waiting && state.current_node_id.as_deref() == Some(node_id) {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(5)).await;
    }
    panic!("runner never parked at {}", node_id);
}

#[tokio::test]
async fn breakpoint_then_step_runs_exactly_one_node() {
    let ctl = controller(Arc::new(EventBus::default()));
    ctl.set_breakpoint("b").await;
    let handle = ctl.spawn(chain(), "a".into(), options());

    let state = parked_at(&ctl, "b").await;
    assert_eq!(state.completed_nodes, vec!["a"]);
    assert_eq!(state.status, ExecutionStatus::Paused);

    assert!(ctl.step().await);
    let state = parked_at(&ctl, "c").await;
    assert_eq!(state.completed_nodes, vec!["a", "b"]);

    assert!(ctl.resume().await);
    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.executed, vec!["a", "b", "c"]);
    assert_eq!(ctl.state().await.status, ExecutionStatus::Completed);
}

#[tokio::test]
async fn resume_runs_to_next_breakpoint() {
    let ctl = controller(Arc::new(EventBus::default()));
    ctl.set_breakpoint("a").await;
    ctl.set_breakpoint("c").await;
    let handle = ctl.spawn(chain(), "a".into(), options());

    parked_at(&ctl, "a").await;
    ctl.resume().await;
    let state = parked_at(&ctl, "c").await;
    assert_eq!(state.completed_nodes, vec!["a", "b"]);
    ctl.resume().await;

    let report = handle.await.unwrap().unwrap();
    assert_eq!(report.executed.len(), 3);
}

#[tokio::test]
async fn reset_wakes_waiter_with_cancellation() {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let ctl = controller(bus);
    ctl.pause().await;
    let handle = ctl.spawn(chain(), "a".into(), options());

    parked_at(&ctl, "a").await;
    ctl.reset().await;

    let result = tokio::time::timeout(Duration::from_secs(2), handle)
        .await
        .expect("waiter left pending after reset")
        .unwrap();
    assert!(matches!(result, Err(FlowError::Cancelled)));

    let state = ctl.state().await;
    assert!(state.breakpoints.is_empty());
    assert!(!state.waiting);

    let mut saw_pause = false;
    let mut finish_status = None;
    while let Ok(event) = rx.try_recv() {
        match event {
            FlowEvent::Paused { reason, .. } => {
                assert_eq!(reason, PauseReason::UserRequested);
                saw_pause = true;
            }
            FlowEvent::FlowFinished { status, .. } => finish_status = Some(status),
            FlowEvent::NodeStarted { .. } => panic!("no node should start"),
            _ => {}
        }
    }
    assert!(saw_pause);
    assert_eq!(finish_status, Some(ExecutionStatus::Idle));
}

#[tokio::test]
async fn controller_runs_again_after_reset() {
    let ctl = controller(Arc::new(EventBus::default()));
    ctl.pause().await;
    let handle = ctl.spawn(chain(), "a".into(), options());
    parked_at(&ctl, "a").await;
    ctl.reset().await;
    assert!(handle.await.unwrap().is_err());

    let report = ctl.run(&chain(), Some("a"), options()).await.unwrap();
    assert_eq!(report.executed, vec!["a", "b", "c"]);
}

#[tokio::test]
async fn step_pause_reason_is_reported() {
    let bus = Arc::new(EventBus::default());
    let mut rx = bus.subscribe();
    let ctl = controller(bus);
    ctl.pause().await;
    let handle = ctl.spawn(chain(), "a".into(), options());

    parked_at(&ctl, "a").await;
    ctl.step().await;
    parked_at(&ctl, "b").await;
    ctl.resume().await;
    handle.await.unwrap().unwrap();

    let reasons: Vec<PauseReason> = std::iter::from_fn(|| rx.try_recv().ok())
        .filter_map(|e| match e {
            FlowEvent::Paused { reason, .. } => Some(reason),
            _ => None,
        })
        .collect();
    assert_eq!(reasons, vec![PauseReason::UserRequested, PauseReason::Step]);
}
