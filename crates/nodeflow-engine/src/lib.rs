//! Workflow execution engine.
//!
//! A graph document is normalized into a `Graph`, ordered by `build_order`,
//! and executed node by node through the properties bridge. `FlowRunner`
//! runs to completion; `StepController` adds pause, step and breakpoints.

pub mod bridge;
pub mod context;
pub mod controller;
pub mod executors;
pub mod graph;
pub mod manifest;
pub mod options;
pub mod run_log;
pub mod store;

pub use bridge::{execute_node, ExecutionPath, ExecutionResult, RunResults};
pub use context::{ContextBuilder, ContextMode, NodeContext, NodeOutput};
pub use controller::{ExecutionState, FlowRunner, RunReport, StepController, StepGate};
pub use executors::{ExecEnv, NodeKind};
pub use graph::{build_order, Connection, Graph, GraphDocument, Node};
pub use manifest::RunManifest;
pub use options::{LlmOverrides, RunOptions};
pub use run_log::RunLogger;
pub use store::NodeStores;
