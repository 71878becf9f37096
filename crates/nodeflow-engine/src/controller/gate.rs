use std::collections::BTreeSet;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tokio::sync::{oneshot, Mutex};
use tracing::debug;

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::event::EventBus;
use nodeflow_core::types::{ExecutionStatus, FlowEvent, PauseReason, RunId};

/// What a suspended runner is woken with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Signal {
    Go,
    Cancel,
}

/// Observable controller state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionState {
    pub status: ExecutionStatus,
    pub current_node_id: Option<String>,
    /// Nodes finished so far in this run, in order.
    pub completed_nodes: Vec<String>,
    pub breakpoints: Vec<String>,
    pub paused: bool,
    /// A runner is parked at the gate right now.
    pub waiting: bool,
    pub speed: f32,
}

#[derive(Debug)]
struct Inner {
    run_id: Option<RunId>,
    status: ExecutionStatus,
    paused: bool,
    /// One node may pass a paused gate without waiting.
    permit: bool,
    last_was_step: bool,
    cancelled: bool,
    breakpoints: BTreeSet<String>,
    current: Option<String>,
    completed: Vec<String>,
    speed: f32,
    waiter: Option<oneshot::Sender<Signal>>,
}

impl Default for Inner {
    fn default() -> Self {
        Self {
            run_id: None,
            status: ExecutionStatus::Idle,
            paused: false,
            permit: false,
            last_was_step: false,
            cancelled: false,
            breakpoints: BTreeSet::new(),
            current: None,
            completed: Vec::new(),
            speed: 1.0,
            waiter: None,
        }
    }
}

/// Single-slot suspension point checked before every node.
///
/// At most one runner waits at a time. `step()` lets exactly one node
/// through and leaves the gate paused; `reset()` wakes any waiter with a
/// cancellation.
pub struct StepGate {
    inner: Mutex<Inner>,
    event_bus: Arc<EventBus>,
}

impl StepGate {
    pub fn new(event_bus: Arc<EventBus>) -> Self {
        Self {
            inner: Mutex::new(Inner::default()),
            event_bus,
        }
    }

    /// Prepare for a new run. Breakpoints and a pending pause are kept.
    pub async fn begin_run(&self, run_id: &RunId) {
        let mut inner = self.inner.lock().await;
        inner.run_id = Some(run_id.clone());
        inner.status = ExecutionStatus::Running;
        inner.cancelled = false;
        inner.current = None;
        inner.completed.clear();
    }

    /// Called before a node runs. Returns `Cancelled` if the gate was reset
    /// while (or before) waiting.
    pub async fn checkpoint(&self, node_id: &str) -> Result<()> {
        let rx = {
            let mut inner = self.inner.lock().await;
            if inner.cancelled {
                return Err(FlowError::Cancelled);
            }
            inner.current = Some(node_id.to_string());

            let at_breakpoint = inner.breakpoints.contains(node_id);
            if !inner.paused && !at_breakpoint {
                return Ok(());
            }
            if inner.permit {
                inner.permit = false;
                debug!(node_id, "Step permit consumed");
                return Ok(());
            }

            let reason = if at_breakpoint {
                PauseReason::Breakpoint
            } else if inner.last_was_step {
                PauseReason::Step
            } else {
                PauseReason::UserRequested
            };
            inner.paused = true;
            inner.status = ExecutionStatus::Paused;

            let (tx, rx) = oneshot::channel();
            inner.waiter = Some(tx);
            if let Some(run_id) = inner.run_id.clone() {
                self.event_bus.publish(FlowEvent::Paused {
                    run_id,
                    node_id: node_id.to_string(),
                    reason,
                    at: Utc::now(),
                });
            }
            debug!(node_id, ?reason, "Runner suspended");
            rx
        };

        match rx.await {
            Ok(Signal::Go) => {
                let mut inner = self.inner.lock().await;
                inner.status = ExecutionStatus::Running;
                if let Some(run_id) = inner.run_id.clone() {
                    self.event_bus.publish(FlowEvent::Resumed {
                        run_id,
                        node_id: node_id.to_string(),
                        at: Utc::now(),
                    });
                }
                Ok(())
            }
            Ok(Signal::Cancel) | Err(_) => Err(FlowError::Cancelled),
        }
    }

    /// Suspend before the next node.
    pub async fn pause(&self) {
        let mut inner = self.inner.lock().await;
        inner.paused = true;
        inner.last_was_step = false;
    }

    /// Clear the pause and release a waiting runner.
    pub async fn resume(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.paused = false;
        inner.permit = false;
        inner.last_was_step = false;
        match inner.waiter.take() {
            Some(tx) => tx.send(Signal::Go).is_ok(),
            None => false,
        }
    }

    /// Release exactly one node and stay paused. With nobody waiting the
    /// release is banked for the next checkpoint.
    pub async fn step(&self) -> bool {
        let mut inner = self.inner.lock().await;
        inner.paused = true;
        inner.last_was_step = true;
        match inner.waiter.take() {
            Some(tx) => tx.send(Signal::Go).is_ok(),
            None => {
                inner.permit = true;
                false
            }
        }
    }

    /// Drop all state and wake any waiter with a cancellation.
    pub async fn reset(&self) {
        let mut inner = self.inner.lock().await;
        if let Some(tx) = inner.waiter.take() {
            let _ = tx.send(Signal::Cancel);
        }
        let speed = inner.speed;
        let was_active = matches!(inner.status, ExecutionStatus::Running | ExecutionStatus::Paused);
        *inner = Inner {
            speed,
            cancelled: was_active,
            ..Inner::default()
        };
    }

    pub async fn set_breakpoint(&self, node_id: &str) {
        self.inner.lock().await.breakpoints.insert(node_id.to_string());
    }

    pub async fn clear_breakpoint(&self, node_id: &str) -> bool {
        self.inner.lock().await.breakpoints.remove(node_id)
    }

    pub async fn toggle_breakpoint(&self, node_id: &str) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.breakpoints.remove(node_id) {
            false
        } else {
            inner.breakpoints.insert(node_id.to_string());
            true
        }
    }

    /// Playback multiplier; non-positive values are ignored.
    pub async fn set_speed(&self, speed: f32) {
        if speed > 0.0 && speed.is_finite() {
            self.inner.lock().await.speed = speed;
        }
    }

    pub async fn speed(&self) -> f32 {
        self.inner.lock().await.speed
    }

    pub(crate) async fn mark_completed(&self, node_id: &str) {
        self.inner.lock().await.completed.push(node_id.to_string());
    }

    pub(crate) async fn finish(&self, status: ExecutionStatus) {
        let mut inner = self.inner.lock().await;
        inner.status = status;
        inner.current = None;
        inner.cancelled = false;
    }

    pub async fn snapshot(&self) -> ExecutionState {
        let inner = self.inner.lock().await;
        ExecutionState {
            status: inner.status,
            current_node_id: inner.current.clone(),
            completed_nodes: inner.completed.clone(),
            breakpoints: inner.breakpoints.iter().cloned().collect(),
            paused: inner.paused,
            waiting: inner.waiter.as_ref().is_some_and(|tx| !tx.is_closed()),
            speed: inner.speed,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    fn gate() -> Arc<StepGate> {
        Arc::new(StepGate::new(Arc::new(EventBus::default())))
    }

    async fn wait_until_parked(gate: &StepGate) {
        for _ in 0..200 {
            if gate.snapshot().await.waiting {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("runner never reached the gate");
    }

    #[tokio::test]
    async fn open_gate_passes() {
        let gate = gate();
        gate.begin_run(&RunId::from_str("r")).await;
        gate.checkpoint("a").await.unwrap();
        assert_eq!(gate.snapshot().await.current_node_id.as_deref(), Some("a"));
    }

    #[tokio::test]
    async fn breakpoint_parks_until_resume() {
        let gate = gate();
        gate.set_breakpoint("b").await;
        gate.begin_run(&RunId::from_str("r")).await;

        let g = gate.clone();
        let handle = tokio::spawn(async move { g.checkpoint("b").await });
        wait_until_parked(&gate).await;
        assert_eq!(gate.snapshot().await.status, ExecutionStatus::Paused);

        assert!(gate.resume().await);
        handle.await.unwrap().unwrap();
        assert_eq!(gate.snapshot().await.status, ExecutionStatus::Running);
    }

    #[tokio::test]
    async fn step_releases_one_and_rearms() {
        let gate = gate();
        gate.begin_run(&RunId::from_str("r")).await;
        gate.pause().await;

        let g = gate.clone();
        let handle = tokio::spawn(async move { g.checkpoint("a").await });
        wait_until_parked(&gate).await;
        assert!(gate.step().await);
        handle.await.unwrap().unwrap();

        // Still paused: the next node parks again
        assert!(gate.snapshot().await.paused);
        let g = gate.clone();
        let handle = tokio::spawn(async move { g.checkpoint("b").await });
        wait_until_parked(&gate).await;
        gate.reset().await;
        assert!(matches!(handle.await.unwrap(), Err(FlowError::Cancelled)));
    }

    #[tokio::test]
    async fn banked_step_passes_once() {
        let gate = gate();
        gate.begin_run(&RunId::from_str("r")).await;
        gate.pause().await;
        assert!(!gate.step().await);
        gate.checkpoint("a").await.unwrap();
        let parked = tokio::time::timeout(Duration::from_millis(20), gate.checkpoint("b")).await;
        assert!(parked.is_err());
    }

    #[tokio::test]
    async fn reset_clears_breakpoints_and_keeps_speed() {
        let gate = gate();
        gate.set_breakpoint("a").await;
        gate.set_speed(4.0).await;
        gate.set_speed(-1.0).await;
        gate.reset().await;
        let state = gate.snapshot().await;
        assert!(state.breakpoints.is_empty());
        assert_eq!(state.speed, 4.0);
        assert_eq!(state.status, ExecutionStatus::Idle);
    }

    #[tokio::test]
    async fn toggle_breakpoint() {
        let gate = gate();
        assert!(gate.toggle_breakpoint("x").await);
        assert!(!gate.toggle_breakpoint("x").await);
        assert!(!gate.clear_breakpoint("x").await);
    }

    #[tokio::test]
    async fn snapshot_serializes_completed_nodes() {
        let gate = gate();
        gate.begin_run(&RunId::from_str("r")).await;
        gate.checkpoint("a").await.unwrap();
        gate.mark_completed("a").await;

        let state = gate.snapshot().await;
        assert_eq!(state.completed_nodes, vec!["a"]);
        let json = serde_json::to_value(&state).unwrap();
        assert_eq!(json["completedNodes"], serde_json::json!(["a"]));
        assert_eq!(json["currentNodeId"], serde_json::json!("a"));
        assert!(json.get("executed").is_none());
    }
}

