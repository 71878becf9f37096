use std::collections::HashMap;

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value};

use nodeflow_core::error::{FlowError, Result};
use nodeflow_core::types::Scenario;

/// A node in the workflow graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Node {
    pub id: String,
    /// Declared kind, e.g. `agent`, `tool`, `router`.
    #[serde(alias = "type")]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subtype: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Open configuration bag; recognized keys depend on the kind.
    #[serde(default, alias = "properties", alias = "data")]
    pub config: Map<String, Value>,
    #[serde(default, deserialize_with = "port_list")]
    pub input_ports: Vec<String>,
    #[serde(default, deserialize_with = "port_list")]
    pub output_ports: Vec<String>,
}

/// Ports arrive as bare strings or as `{id}` / `{name}` objects.
fn port_list<'de, D>(deserializer: D) -> std::result::Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw: Option<Vec<Value>> = Option::deserialize(deserializer)?;
    Ok(raw
        .unwrap_or_default()
        .into_iter()
        .filter_map(|v| match v {
            Value::String(s) => Some(s),
            Value::Object(o) => o
                .get("id")
                .or_else(|| o.get("name"))
                .and_then(|v| v.as_str())
                .map(|s| s.to_string()),
            _ => None,
        })
        .collect())
}

impl Node {
    pub fn new(id: impl Into<String>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            subtype: None,
            name: None,
            config: Map::new(),
            input_ports: vec!["input".into()],
            output_ports: vec!["output".into()],
        }
    }

    pub fn with_subtype(mut self, subtype: impl Into<String>) -> Self {
        self.subtype = Some(subtype.into());
        self
    }

    /// Replace the config bag. Non-object values leave it empty.
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = match config {
            Value::Object(map) => map,
            _ => Map::new(),
        };
        self
    }

    /// Display label: name if set, id otherwise.
    pub fn label(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Look up a config field. `rules.nl` matches a literal `"rules.nl"` key
    /// first, then the nested path `rules` → `nl`.
    pub fn field(&self, path: &str) -> Option<&Value> {
        if let Some(v) = self.config.get(path) {
            return Some(v);
        }
        let mut parts = path.split('.');
        let mut current = self.config.get(parts.next()?)?;
        for part in parts {
            current = current.as_object()?.get(part)?;
        }
        Some(current)
    }

    /// Field as a trimmed, non-empty string. Numbers are rendered.
    pub fn field_str(&self, path: &str) -> Option<String> {
        match self.field(path)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// First configured string among several alternative field names.
    pub fn first_str(&self, paths: &[&str]) -> Option<String> {
        paths.iter().find_map(|p| self.field_str(p))
    }

    /// Numeric field, from a number or a numeric string. NaN and infinities
    /// read as unset.
    pub fn field_f64(&self, path: &str) -> Option<f64> {
        let n = match self.field(path)? {
            Value::Number(n) => n.as_f64(),
            Value::String(s) => s.trim().parse().ok(),
            _ => None,
        };
        n.filter(|v: &f64| v.is_finite())
    }

    pub fn field_bool(&self, path: &str) -> Option<bool> {
        match self.field(path)? {
            Value::Bool(b) => Some(*b),
            Value::String(s) => match s.trim().to_lowercase().as_str() {
                "true" | "yes" | "1" => Some(true),
                "false" | "no" | "0" => Some(false),
                _ => None,
            },
            _ => None,
        }
    }

    /// Whether a field carries a usable value.
    pub fn is_configured(&self, path: &str) -> bool {
        self.field(path).is_some_and(is_set)
    }
}

/// Null, blank strings and empty collections count as unset.
pub fn is_set(value: &Value) -> bool {
    match value {
        Value::Null => false,
        Value::String(s) => !s.trim().is_empty(),
        Value::Array(a) => !a.is_empty(),
        Value::Object(o) => !o.is_empty(),
        Value::Bool(_) | Value::Number(_) => true,
    }
}

/// Canonical directed edge.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    pub id: String,
    pub source: String,
    pub source_port: String,
    pub target: String,
    pub target_port: String,
}

impl Connection {
    pub fn new(source: impl Into<String>, target: impl Into<String>) -> Self {
        let source = source.into();
        let target = target.into();
        Self {
            id: format!("{}->{}", source, target),
            source,
            source_port: "output".into(),
            target,
            target_port: "input".into(),
        }
    }

    pub fn with_ports(mut self, source_port: impl Into<String>, target_port: impl Into<String>) -> Self {
        self.source_port = source_port.into();
        self.target_port = target_port.into();
        self
    }
}

/// A connection as stored by any historical writer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawConnection {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
    #[serde(default)]
    pub source_node: Option<String>,
    #[serde(default)]
    pub source_node_id: Option<String>,
    #[serde(default)]
    pub from: Option<String>,
    #[serde(default)]
    pub target: Option<String>,
    #[serde(default)]
    pub target_node: Option<String>,
    #[serde(default)]
    pub target_node_id: Option<String>,
    #[serde(default)]
    pub to: Option<String>,
    #[serde(default)]
    pub source_output: Option<String>,
    #[serde(default)]
    pub source_port: Option<String>,
    #[serde(default)]
    pub source_output_port: Option<String>,
    #[serde(default)]
    pub source_handle: Option<String>,
    #[serde(default)]
    pub target_input: Option<String>,
    #[serde(default)]
    pub target_port: Option<String>,
    #[serde(default)]
    pub target_input_port: Option<String>,
    #[serde(default)]
    pub target_handle: Option<String>,
}

fn first_of(candidates: [&Option<String>; 4]) -> Option<String> {
    candidates
        .into_iter()
        .flatten()
        .map(|s| s.trim())
        .find(|s| !s.is_empty())
        .map(|s| s.to_string())
}

impl RawConnection {
    /// Resolve to the canonical shape. `index` is the position in the
    /// document, reported when an endpoint cannot be resolved.
    pub fn normalize(&self, index: usize) -> Result<Connection> {
        let source = first_of([&self.source, &self.source_node, &self.source_node_id, &self.from])
            .ok_or_else(|| FlowError::InvalidConnection {
                index,
                reason: "no source node".into(),
            })?;
        let target = first_of([&self.target, &self.target_node, &self.target_node_id, &self.to])
            .ok_or_else(|| FlowError::InvalidConnection {
                index,
                reason: "no target node".into(),
            })?;
        let source_port = first_of([
            &self.source_output,
            &self.source_port,
            &self.source_output_port,
            &self.source_handle,
        ])
        .unwrap_or_else(|| "output".into());
        let target_port = first_of([
            &self.target_input,
            &self.target_port,
            &self.target_input_port,
            &self.target_handle,
        ])
        .unwrap_or_else(|| "input".into());
        let id = self
            .id
            .clone()
            .filter(|s| !s.trim().is_empty())
            .unwrap_or_else(|| format!("{}->{}", source, target));

        Ok(Connection {
            id,
            source,
            source_port,
            target,
            target_port,
        })
    }
}

impl From<&Connection> for RawConnection {
    fn from(c: &Connection) -> Self {
        Self {
            id: Some(c.id.clone()),
            source: Some(c.source.clone()),
            target: Some(c.target.clone()),
            source_port: Some(c.source_port.clone()),
            target_port: Some(c.target_port.clone()),
            ..Default::default()
        }
    }
}

/// Graph as supplied by the canvas or a saved project.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GraphDocument {
    #[serde(default)]
    pub nodes: Vec<Node>,
    #[serde(default, alias = "edges")]
    pub connections: Vec<RawConnection>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub start_node_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scenario: Option<Scenario>,
}

impl GraphDocument {
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Normalize every connection and index the nodes.
    pub fn into_graph(self) -> Result<Graph> {
        let connections = self
            .connections
            .iter()
            .enumerate()
            .map(|(i, raw)| raw.normalize(i))
            .collect::<Result<Vec<_>>>()?;
        Graph::new(self.nodes, connections)
    }
}

/// Immutable per-run view of nodes and canonical connections.
#[derive(Debug, Clone)]
pub struct Graph {
    nodes: Vec<Node>,
    index: HashMap<String, usize>,
    connections: Vec<Connection>,
}

impl Graph {
    pub fn new(nodes: Vec<Node>, connections: Vec<Connection>) -> Result<Self> {
        let mut index = HashMap::with_capacity(nodes.len());
        for (i, node) in nodes.iter().enumerate() {
            if node.id.trim().is_empty() {
                return Err(FlowError::InvalidGraph(format!("node at index {} has no id", i)));
            }
            if index.insert(node.id.clone(), i).is_some() {
                return Err(FlowError::InvalidGraph(format!("duplicate node id '{}'", node.id)));
            }
        }
        for (i, conn) in connections.iter().enumerate() {
            for endpoint in [&conn.source, &conn.target] {
                if !index.contains_key(endpoint) {
                    return Err(FlowError::InvalidConnection {
                        index: i,
                        reason: format!("unknown node '{}'", endpoint),
                    });
                }
            }
        }
        Ok(Self {
            nodes,
            index,
            connections,
        })
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }

    pub fn node(&self, id: &str) -> Option<&Node> {
        self.index.get(id).map(|&i| &self.nodes[i])
    }

    pub fn contains(&self, id: &str) -> bool {
        self.index.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Connections terminating at `id`, in document order.
    pub fn incoming(&self, id: &str) -> Vec<&Connection> {
        self.connections.iter().filter(|c| c.target == id).collect()
    }

    /// Connections leaving `id`, in document order.
    pub fn outgoing(&self, id: &str) -> Vec<&Connection> {
        self.connections.iter().filter(|c| c.source == id).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn node_accepts_historical_aliases() {
        let node: Node = serde_json::from_value(json!({
            "id": "a1",
            "type": "agent",
            "properties": {"rules": {"nl": "be nice"}},
            "inputPorts": ["in", {"id": "ctx"}]
        }))
        .unwrap();
        assert_eq!(node.kind, "agent");
        assert_eq!(node.field_str("rules.nl").as_deref(), Some("be nice"));
        assert_eq!(node.input_ports, vec!["in", "ctx"]);
    }

    #[test]
    fn literal_dotted_key_wins() {
        let node = Node::new("a", "agent").with_config(json!({
            "rules.nl": "flat",
            "rules": {"nl": "nested"}
        }));
        assert_eq!(node.field_str("rules.nl").as_deref(), Some("flat"));
    }

    #[test]
    fn blank_values_are_unset() {
        let node = Node::new("a", "agent").with_config(json!({
            "rules": {"nl": "   "},
            "behavior": [],
            "persistState": false
        }));
        assert!(!node.is_configured("rules.nl"));
        assert!(!node.is_configured("behavior"));
        assert!(node.is_configured("persistState"));
        assert!(!node.is_configured("missing"));
    }

    #[test]
    fn numeric_fields_skip_non_finite() {
        let node = Node::new("a", "tool").with_config(json!({
            "a": 0.25, "b": " 3 ", "c": "NaN", "d": "inf", "e": "-infinity", "f": "fast"
        }));
        assert_eq!(node.field_f64("a"), Some(0.25));
        assert_eq!(node.field_f64("b"), Some(3.0));
        for key in ["c", "d", "e", "f", "missing"] {
            assert_eq!(node.field_f64(key), None, "{}", key);
        }
    }

    #[test]
    fn normalize_all_spellings() {
        let shapes = [
            json!({"source": "a", "target": "b"}),
            json!({"sourceNode": "a", "targetNode": "b"}),
            json!({"sourceNodeId": "a", "targetNodeId": "b"}),
            json!({"from": "a", "to": "b"}),
        ];
        for shape in shapes {
            let raw: RawConnection = serde_json::from_value(shape).unwrap();
            let c = raw.normalize(0).unwrap();
            assert_eq!(c, Connection::new("a", "b"));
        }
    }

    #[test]
    fn normalize_ports_and_id() {
        let raw: RawConnection = serde_json::from_value(json!({
            "id": "e1",
            "source": "a",
            "sourceHandle": "yes",
            "target": "b",
            "targetInputPort": "ctx"
        }))
        .unwrap();
        let c = raw.normalize(0).unwrap();
        assert_eq!(c.id, "e1");
        assert_eq!(c.source_port, "yes");
        assert_eq!(c.target_port, "ctx");
    }

    #[test]
    fn unresolvable_connection_names_index() {
        let doc: GraphDocument = serde_json::from_value(json!({
            "nodes": [{"id": "a", "kind": "agent"}, {"id": "b", "kind": "tool"}],
            "edges": [{"source": "a", "target": "b"}, {"source": "a"}]
        }))
        .unwrap();
        match doc.into_graph() {
            Err(FlowError::InvalidConnection { index, .. }) => assert_eq!(index, 1),
            other => panic!("expected InvalidConnection, got {:?}", other),
        }
    }

    #[test]
    fn dangling_endpoint_is_rejected() {
        let err = Graph::new(
            vec![Node::new("a", "agent")],
            vec![Connection::new("a", "ghost")],
        )
        .unwrap_err();
        assert!(err.to_string().contains("ghost"));
    }

    #[test]
    fn duplicate_ids_rejected() {
        let err = Graph::new(vec![Node::new("a", "agent"), Node::new("a", "tool")], vec![]).unwrap_err();
        assert!(matches!(err, FlowError::InvalidGraph(_)));
    }

    #[test]
    fn incoming_outgoing_keep_document_order() {
        let graph = Graph::new(
            vec![Node::new("a", "agent"), Node::new("b", "agent"), Node::new("c", "tool")],
            vec![Connection::new("b", "c"), Connection::new("a", "c")],
        )
        .unwrap();
        let sources: Vec<&str> = graph.incoming("c").iter().map(|c| c.source.as_str()).collect();
        assert_eq!(sources, vec!["b", "a"]);
        assert_eq!(graph.outgoing("a").len(), 1);
    }
}
