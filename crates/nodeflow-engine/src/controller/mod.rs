//! Execution controller: the linear runner and its steppable wrapper.
//!
//! Both share `FlowRunner::drive`; the steppable variant passes a `StepGate`
//! that is consulted before every node.

pub mod gate;
pub mod stepper;

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use serde::Serialize;
use tracing::{error, info, warn};

use nodeflow_core::config::Schedule;
use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::event::EventBus;
use nodeflow_core::traits::{LlmClient, ProjectStore, ToolSimulator};
use nodeflow_core::types::{ExecutionStatus, FlowEvent, RunId};

use crate::bridge::{self, ExecutionResult, RunResults};
use crate::context::ContextBuilder;
use crate::executors::ExecEnv;
use crate::graph::{build_order, Graph};
use crate::manifest::RunManifest;
use crate::options::RunOptions;
use crate::store::NodeStores;

pub use gate::{ExecutionState, StepGate};
pub use stepper::StepController;

/// Outcome of a completed run.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: RunId,
    pub status: ExecutionStatus,
    pub start_node_id: String,
    /// Full dependency order of the graph.
    pub order: Vec<String>,
    /// Nodes in the order they actually ran. Revisits repeat.
    pub executed: Vec<String>,
    pub results: RunResults,
    pub warnings: Vec<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub manifest_key: Option<String>,
}

/// Pick the next node after `current`.
///
/// A router's chosen path is matched against each outgoing connection's
/// target, source port, target port and id. Otherwise the target that comes
/// earliest in `order` wins.
pub fn next_hop(graph: &Graph, order: &[String], current: &ExecutionResult) -> Option<String> {
    let outgoing = graph.outgoing(&current.node_id);
    if outgoing.is_empty() {
        return None;
    }
    if let Some(route) = current.outputs_tab.route.as_deref() {
        let chosen = outgoing.iter().find(|c| {
            c.target == route || c.source_port == route || c.target_port == route || c.id == route
        });
        if let Some(conn) = chosen {
            return Some(conn.target.clone());
        }
    }
    outgoing
        .iter()
        .min_by_key(|c| order.iter().position(|id| *id == c.target).unwrap_or(usize::MAX))
        .map(|c| c.target.clone())
}

/// Runs graphs against shared collaborators.
pub struct FlowRunner {
    llm: Arc<dyn LlmClient>,
    tools: Arc<dyn ToolSimulator>,
    stores: Arc<NodeStores>,
    event_bus: Arc<EventBus>,
    store: Option<Arc<dyn ProjectStore>>,
}

impl FlowRunner {
    pub fn new(llm: Arc<dyn LlmClient>, tools: Arc<dyn ToolSimulator>, event_bus: Arc<EventBus>) -> Self {
        Self {
            llm,
            tools,
            stores: Arc::new(NodeStores::new()),
            event_bus,
            store: None,
        }
    }

    /// Share node stores with another runner or session.
    pub fn with_stores(mut self, stores: Arc<NodeStores>) -> Self {
        self.stores = stores;
        self
    }

    /// Persist a manifest for every finished run.
    pub fn with_project_store(mut self, store: Arc<dyn ProjectStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn stores(&self) -> &Arc<NodeStores> {
        &self.stores
    }

    pub fn event_bus(&self) -> &Arc<EventBus> {
        &self.event_bus
    }

    /// Run to completion without gating.
    pub async fn run(&self, graph: &Graph, start: Option<&str>, options: RunOptions) -> Result<RunReport> {
        self.drive(graph, start, options, None).await
    }

    pub(crate) async fn drive(
        &self,
        graph: &Graph,
        start: Option<&str>,
        options: RunOptions,
        gate: Option<&StepGate>,
    ) -> Result<RunReport> {
        let start = start.ok_or(FlowError::StartNodeMissing)?;
        if !graph.contains(start) {
            return Err(FlowError::NodeNotFound(start.to_string()));
        }

        let started = Instant::now();
        let run_id = RunId::new();
        let order = build_order(graph, Some(start));
        let env = ExecEnv {
            run_id: run_id.clone(),
            llm: self.llm.clone(),
            tools: self.tools.clone(),
            stores: self.stores.clone(),
            options: options.clone(),
        };

        info!(run_id = %run_id, start = %start, nodes = graph.len(), mode = %options.mode, "Flow started");
        self.event_bus.publish(FlowEvent::FlowStarted {
            run_id: run_id.clone(),
            start_node_id: start.to_string(),
            mode: options.mode,
            node_count: graph.len(),
            at: Utc::now(),
        });
        if let Some(gate) = gate {
            gate.begin_run(&run_id).await;
        }

        let scenario = options
            .scenario
            .as_ref()
            .and_then(|s| s.description.as_deref());
        let budget = options.step_budget_factor.max(1) * graph.len();
        let mut results = RunResults::new();
        let mut executed: Vec<String> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();

        let mut queue = match options.schedule {
            Schedule::FullOrder => order.clone().into_iter(),
            Schedule::Chain => Vec::new().into_iter(),
        };
        let mut current = match options.schedule {
            Schedule::Chain => Some(start.to_string()),
            Schedule::FullOrder => queue.next(),
        };

        while let Some(node_id) = current.take() {
            if executed.len() >= budget {
                let message = format!(
                    "Step budget of {} exhausted at '{}'; stopping",
                    budget, node_id
                );
                warn!(run_id = %run_id, budget, node_id = %node_id, "Step budget exhausted");
                self.event_bus.publish(FlowEvent::Warning {
                    run_id: run_id.clone(),
                    message: message.clone(),
                    at: Utc::now(),
                });
                warnings.push(message);
                break;
            }

            if let Some(gate) = gate {
                if let Err(e) = gate.checkpoint(&node_id).await {
                    info!(run_id = %run_id, node_id = %node_id, "Run cancelled at gate");
                    self.publish_finished(&run_id, ExecutionStatus::Idle, executed.len(), &started);
                    gate.finish(ExecutionStatus::Idle).await;
                    return Err(e);
                }
            }

            let Some(node) = graph.node(&node_id) else {
                return Err(FlowError::NodeNotFound(node_id));
            };

            self.event_bus.publish(FlowEvent::NodeStarted {
                run_id: run_id.clone(),
                node_id: node.id.clone(),
                kind: node.kind.clone(),
                at: Utc::now(),
            });

            let result = {
                let builder = ContextBuilder::new(graph, &results, start)
                    .with_scenario(scenario)
                    .with_input(options.input.as_deref());
                bridge::execute_node(node, &builder, &env).await
            };

            self.event_bus.publish(FlowEvent::NodeFinished {
                run_id: run_id.clone(),
                node_id: node.id.clone(),
                result_type: result.result_type(),
                summary: result.execution_summary.clone(),
                duration_ms: result.duration_ms,
                at: Utc::now(),
            });

            current = match options.schedule {
                Schedule::Chain => next_hop(graph, &order, &result),
                Schedule::FullOrder => queue.next(),
            };
            executed.push(node.id.clone());
            results.insert(result);
            if let Some(gate) = gate {
                gate.mark_completed(&node.id).await;
            }

            if current.is_some() {
                let speed = match gate {
                    Some(gate) => gate.speed().await,
                    None => options.speed,
                };
                let delay = inter_node_delay(options.base_delay_ms, speed);
                if !delay.is_zero() {
                    tokio::time::sleep(delay).await;
                }
            }
        }

        let duration_ms = started.elapsed().as_millis() as u64;
        self.publish_finished(&run_id, ExecutionStatus::Completed, executed.len(), &started);
        if let Some(gate) = gate {
            gate.finish(ExecutionStatus::Completed).await;
        }
        info!(run_id = %run_id, executed = executed.len(), duration_ms, "Flow finished");

        let violation = policy_violation(&results, &options.disallowed_models);
        let status = if violation.is_some() {
            ExecutionStatus::Error
        } else {
            ExecutionStatus::Completed
        };

        let mut report = RunReport {
            run_id,
            status,
            start_node_id: start.to_string(),
            order,
            executed,
            results,
            warnings,
            duration_ms,
            manifest_key: None,
        };
        report.manifest_key = self.persist(graph, &options, &report).await;

        match violation {
            Some(message) => {
                error!(run_id = %report.run_id, "{}", message);
                Err(FlowError::PolicyViolation(message))
            }
            None => Ok(report),
        }
    }

    fn publish_finished(&self, run_id: &RunId, status: ExecutionStatus, executed: usize, started: &Instant) {
        self.event_bus.publish(FlowEvent::FlowFinished {
            run_id: run_id.clone(),
            status,
            executed,
            duration_ms: started.elapsed().as_millis() as u64,
            at: Utc::now(),
        });
    }

    async fn persist(&self, graph: &Graph, options: &RunOptions, report: &RunReport) -> Option<String> {
        let store = self.store.as_ref()?;
        let manifest = RunManifest {
            id: report.run_id.to_string(),
            timestamp: Utc::now(),
            scenario: options.scenario.clone(),
            environment: options.mode,
            seed: options.seed,
            nodes: graph.nodes().to_vec(),
            connections: graph.connections().to_vec(),
            start_node_id: report.start_node_id.clone(),
            results: report.results.to_map(),
            duration: report.duration_ms,
            status: report.status,
        };
        match manifest.save(store).await {
            Ok(key) => Some(key),
            Err(e) => {
                warn!(run_id = %report.run_id, error = %e, "Failed to save run manifest");
                None
            }
        }
    }
}

/// `base_delay_ms / speed`; zero when either is unset.
pub fn inter_node_delay(base_delay_ms: u64, speed: f32) -> Duration {
    if base_delay_ms == 0 || speed <= 0.0 || !speed.is_finite() {
        return Duration::ZERO;
    }
    Duration::from_millis((base_delay_ms as f64 / speed as f64).round() as u64)
}

/// First result that used a disallowed model.
pub fn policy_violation(results: &RunResults, disallowed: &[String]) -> Option<String> {
    if disallowed.is_empty() {
        return None;
    }
    results.iter().find_map(|r| {
        let model = r.outputs_tab.model.as_deref()?;
        disallowed
            .iter()
            .any(|d| d.eq_ignore_ascii_case(model))
            .then(|| format!("node '{}' used disallowed model '{}'", r.node_id, model))
    })
}
