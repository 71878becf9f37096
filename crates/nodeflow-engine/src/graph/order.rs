use std::collections::HashSet;

use tracing::warn;

use super::model::Graph;

/// Compute the dependency-first visiting order.
///
/// Walks from `start` (or from every node without incoming edges, in node
/// order) visiting each node's sources before the node itself, then sweeps
/// any node not reached. The result is always a permutation of the node ids.
/// A node on a cycle is appended when first reached; cycles are not rejected.
pub fn build_order(graph: &Graph, start: Option<&str>) -> Vec<String> {
    let mut visited: HashSet<&str> = HashSet::with_capacity(graph.len());
    let mut order: Vec<String> = Vec::with_capacity(graph.len());

    let start = match start {
        Some(id) if graph.contains(id) => Some(id),
        Some(id) => {
            warn!(start_node_id = %id, "Unknown start node, ordering from roots");
            None
        }
        None => None,
    };

    match start {
        Some(id) => visit(graph, id, &mut visited, &mut order),
        None => {
            for node in graph.nodes() {
                if graph.incoming(&node.id).is_empty() {
                    visit(graph, &node.id, &mut visited, &mut order);
                }
            }
        }
    }

    for node in graph.nodes() {
        visit(graph, &node.id, &mut visited, &mut order);
    }

    order
}

fn visit<'g>(graph: &'g Graph, id: &'g str, visited: &mut HashSet<&'g str>, order: &mut Vec<String>) {
    if !visited.insert(id) {
        return;
    }
    for conn in graph.incoming(id) {
        visit(graph, &conn.source, visited, order);
    }
    order.push(id.to_string());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::model::{Connection, Node};

    fn graph(ids: &[&str], edges: &[(&str, &str)]) -> Graph {
        Graph::new(
            ids.iter().map(|id| Node::new(*id, "agent")).collect(),
            edges.iter().map(|(a, b)| Connection::new(*a, *b)).collect(),
        )
        .unwrap()
    }

    fn is_permutation(order: &[String], g: &Graph) -> bool {
        let mut a: Vec<&str> = order.iter().map(|s| s.as_str()).collect();
        let mut b: Vec<&str> = g.nodes().iter().map(|n| n.id.as_str()).collect();
        a.sort_unstable();
        b.sort_unstable();
        a == b
    }

    #[test]
    fn chain_from_start() {
        let g = graph(&["c", "b", "a"], &[("a", "b"), ("b", "c")]);
        assert_eq!(build_order(&g, Some("c")), vec!["a", "b", "c"]);
    }

    #[test]
    fn dependencies_come_first_in_edge_order() {
        let g = graph(&["x", "y", "join"], &[("y", "join"), ("x", "join")]);
        assert_eq!(build_order(&g, Some("join")), vec!["y", "x", "join"]);
    }

    #[test]
    fn roots_in_node_order_without_start() {
        let g = graph(&["r2", "r1", "t"], &[("r1", "t"), ("r2", "t")]);
        assert_eq!(build_order(&g, None), vec!["r2", "r1", "t"]);
    }

    #[test]
    fn unreached_nodes_are_appended() {
        let g = graph(&["a", "b", "island"], &[("a", "b")]);
        let order = build_order(&g, Some("a"));
        assert_eq!(order, vec!["a", "b", "island"]);
    }

    #[test]
    fn cycles_are_tolerated() {
        let g = graph(&["a", "b", "c"], &[("a", "b"), ("b", "c"), ("c", "a")]);
        let order = build_order(&g, Some("a"));
        assert_eq!(order, vec!["b", "c", "a"]);
        assert!(is_permutation(&order, &g));
    }

    #[test]
    fn unknown_start_falls_back_to_roots() {
        let g = graph(&["a", "b"], &[("a", "b")]);
        assert_eq!(build_order(&g, Some("nope")), vec!["a", "b"]);
    }

    #[test]
    fn deterministic_and_complete() {
        let g = graph(
            &["n1", "n2", "n3", "n4", "n5", "n6"],
            &[("n1", "n3"), ("n2", "n3"), ("n3", "n4"), ("n5", "n4"), ("n4", "n1")],
        );
        for start in [None, Some("n4"), Some("n6"), Some("n2")] {
            let first = build_order(&g, start);
            let second = build_order(&g, start);
            assert_eq!(first, second);
            assert!(is_permutation(&first, &g), "{:?}", first);
        }
    }
}
