use std::sync::Arc;

use tokio::task::JoinHandle;

use nodeflow_core::error::Result;

use super::gate::{ExecutionState, StepGate};
use super::{FlowRunner, RunReport};
use crate::graph::Graph;
use crate::options::RunOptions;

/// Steppable runner: the linear traversal with a `StepGate` in front of
/// every node. Control calls are safe from any task while a run is in
/// flight.
#[derive(Clone)]
pub struct StepController {
    runner: Arc<FlowRunner>,
    gate: Arc<StepGate>,
}

impl StepController {
    pub fn new(runner: Arc<FlowRunner>) -> Self {
        let gate = Arc::new(StepGate::new(runner.event_bus().clone()));
        Self { runner, gate }
    }

    pub fn gate(&self) -> &Arc<StepGate> {
        &self.gate
    }

    pub fn runner(&self) -> &Arc<FlowRunner> {
        &self.runner
    }

    /// Run on the current task, honouring pause, breakpoints and steps.
    pub async fn run(&self, graph: &Graph, start: Option<&str>, options: RunOptions) -> Result<RunReport> {
        self.runner.drive(graph, start, options, Some(&self.gate)).await
    }

    /// Run on a background task so the caller can drive the gate.
    pub fn spawn(&self, graph: Graph, start: String, options: RunOptions) -> JoinHandle<Result<RunReport>> {
        let this = self.clone();
        tokio::spawn(async move { this.run(&graph, Some(&start), options).await })
    }

    pub async fn pause(&self) {
        self.gate.pause().await
    }

    pub async fn resume(&self) -> bool {
        self.gate.resume().await
    }

    pub async fn step(&self) -> bool {
        self.gate.step().await
    }

    /// Stop scheduling, wake any waiter and clear breakpoints. Node stores
    /// survive; clear them separately.
    pub async fn reset(&self) {
        self.gate.reset().await
    }

    pub async fn set_breakpoint(&self, node_id: &str) {
        self.gate.set_breakpoint(node_id).await
    }

    pub async fn clear_breakpoint(&self, node_id: &str) -> bool {
        self.gate.clear_breakpoint(node_id).await
    }

    pub async fn set_speed(&self, speed: f32) {
        self.gate.set_speed(speed).await
    }

    pub async fn state(&self) -> ExecutionState {
        self.gate.snapshot().await
    }
}
