//! Run manifests: a self-contained record of one finished run, stored in a
//! `ProjectStore` under `runs/<id>`.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use nodeflow_core::error::Result;
use nodeflow_core::traits::ProjectStore;
use nodeflow_core::types::{ExecutionStatus, RunMode, Scenario};

use crate::bridge::ExecutionResult;
use crate::graph::{Connection, GraphDocument, Node, RawConnection};

pub const RUN_PREFIX: &str = "runs/";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RunManifest {
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub scenario: Option<Scenario>,
    pub environment: RunMode,
    pub seed: u64,
    pub nodes: Vec<Node>,
    pub connections: Vec<Connection>,
    pub start_node_id: String,
    pub results: BTreeMap<String, ExecutionResult>,
    /// Wall-clock run time in milliseconds.
    pub duration: u64,
    pub status: ExecutionStatus,
}

impl RunManifest {
    pub fn key(id: &str) -> String {
        format!("{}{}", RUN_PREFIX, id)
    }

    pub async fn save(&self, store: &Arc<dyn ProjectStore>) -> Result<String> {
        let key = Self::key(&self.id);
        store.put(&key, serde_json::to_value(self)?).await?;
        Ok(key)
    }

    pub async fn load(store: &Arc<dyn ProjectStore>, id: &str) -> Result<Option<Self>> {
        match store.get(&Self::key(id)).await? {
            Some(value) => Ok(Some(serde_json::from_value(value)?)),
            None => Ok(None),
        }
    }

    /// Most recent manifests first. Entries that no longer parse are skipped.
    pub async fn list(store: &Arc<dyn ProjectStore>, limit: usize) -> Result<Vec<Self>> {
        let mut manifests = Vec::new();
        for key in store.list(RUN_PREFIX, limit).await? {
            let Some(value) = store.get(&key).await? else {
                continue;
            };
            match serde_json::from_value::<Self>(value) {
                Ok(m) => manifests.push(m),
                Err(e) => warn!(key = %key, error = %e, "Skipping unreadable run manifest"),
            }
        }
        Ok(manifests)
    }

    pub async fn delete(store: &Arc<dyn ProjectStore>, id: &str) -> Result<bool> {
        store.delete(&Self::key(id)).await
    }

    /// The graph this run executed, ready to run again.
    pub fn into_document(self) -> GraphDocument {
        GraphDocument {
            nodes: self.nodes,
            connections: self.connections.iter().map(RawConnection::from).collect(),
            start_node_id: Some(self.start_node_id),
            scenario: self.scenario,
        }
    }

    /// One-line description for listings.
    pub fn headline(&self) -> String {
        let errors = self
            .results
            .values()
            .filter(|r| r.result_type() == nodeflow_core::types::ResultType::Error)
            .count();
        format!(
            "{}  {}  {:<9}  {} node(s), {} error(s), {}ms",
            self.timestamp.format("%Y-%m-%d %H:%M:%S"),
            self.id,
            self.status.to_string(),
            self.results.len(),
            errors,
            self.duration
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use nodeflow_test_utils::MemoryStore;

    fn manifest(id: &str) -> RunManifest {
        RunManifest {
            id: id.to_string(),
            timestamp: Utc::now(),
            scenario: None,
            environment: RunMode::Mock,
            seed: 42,
            nodes: vec![Node::new("a", "agent"), Node::new("b", "tool")],
            connections: vec![Connection::new("a", "b")],
            start_node_id: "a".into(),
            results: BTreeMap::new(),
            duration: 12,
            status: ExecutionStatus::Completed,
        }
    }

    #[tokio::test]
    async fn save_load_list() {
        let store: Arc<dyn ProjectStore> = Arc::new(MemoryStore::new());
        manifest("r1").save(&store).await.unwrap();
        manifest("r2").save(&store).await.unwrap();
        store.put("runs/broken", serde_json::json!({"id": 1})).await.unwrap();

        let loaded = RunManifest::load(&store, "r1").await.unwrap().unwrap();
        assert_eq!(loaded.start_node_id, "a");
        assert!(RunManifest::load(&store, "nope").await.unwrap().is_none());

        let ids: Vec<String> = RunManifest::list(&store, 10)
            .await
            .unwrap()
            .into_iter()
            .map(|m| m.id)
            .collect();
        assert_eq!(ids, vec!["r2", "r1"]);
    }

    #[test]
    fn document_round_trip_rebuilds_graph() {
        let graph = manifest("r").into_document().into_graph().unwrap();
        assert_eq!(graph.len(), 2);
        assert_eq!(graph.outgoing("a")[0].target, "b");
    }
}
