// graph.rs — Graph definition: node instances, links, validation.
//
// A GraphDefinition is data, not behavior: which nodes exist, how their
// slots are wired, and which operating mode the graph belongs to. The
// engine resolves handlers through the registry at execution time.
//
// Validation enforces:
// - node instance ids are unique and non-empty
// - every link endpoint references a declared node
// - no node links to itself
// - at most one producer per (consumer, input slot)
// - the data-flow portion is acyclic (Kahn's algorithm); router nodes
//   introduce conditional branching, not cycles

use std::collections::{HashMap, HashSet, VecDeque};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use vol_policy::OperatingMode;

use crate::error::GraphError;
use crate::node::NodeKind;

/// One node instance inside a graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeInstance {
    /// Instance id, unique within the graph (e.g., "detect", "plan").
    pub id: String,
    pub kind: NodeKind,
    /// Configured property values for this instance.
    #[serde(default = "default_properties")]
    pub properties: serde_json::Value,
}

fn default_properties() -> serde_json::Value {
    serde_json::json!({})
}

impl NodeInstance {
    pub fn new(id: impl Into<String>, kind: NodeKind) -> Self {
        Self {
            id: id.into(),
            kind,
            properties: default_properties(),
        }
    }

    pub fn with_properties(mut self, properties: serde_json::Value) -> Self {
        self.properties = properties;
        self
    }
}

/// A directed data-flow link: producer output slot → consumer input slot.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Link {
    pub from_node: String,
    pub from_slot: String,
    pub to_node: String,
    pub to_slot: String,
}

impl Link {
    pub fn new(from_node: &str, from_slot: &str, to_node: &str, to_slot: &str) -> Self {
        Self {
            from_node: from_node.to_string(),
            from_slot: from_slot.to_string(),
            to_node: to_node.to_string(),
            to_slot: to_slot.to_string(),
        }
    }
}

/// A validated set of nodes and links for one operating mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GraphDefinition {
    pub id: Uuid,
    pub name: String,
    pub mode: OperatingMode,
    pub nodes: Vec<NodeInstance>,
    pub links: Vec<Link>,
}

impl GraphDefinition {
    pub fn new(name: impl Into<String>, mode: OperatingMode) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            mode,
            nodes: Vec::new(),
            links: Vec::new(),
        }
    }

    pub fn add_node(mut self, node: NodeInstance) -> Self {
        self.nodes.push(node);
        self
    }

    pub fn add_link(mut self, link: Link) -> Self {
        self.links.push(link);
        self
    }

    /// Look up a node instance by id.
    pub fn node(&self, id: &str) -> Option<&NodeInstance> {
        self.nodes.iter().find(|n| n.id == id)
    }

    /// All links feeding into the given node.
    pub fn links_into(&self, node_id: &str) -> Vec<&Link> {
        self.links.iter().filter(|l| l.to_node == node_id).collect()
    }

    /// Validate structure. Called by the engine before every run, and
    /// available to builders that want early feedback.
    pub fn validate(&self) -> Result<(), GraphError> {
        if self.nodes.is_empty() {
            return Err(GraphError::Validation("graph has no nodes".to_string()));
        }

        let mut seen = HashSet::new();
        for node in &self.nodes {
            if node.id.trim().is_empty() {
                return Err(GraphError::Validation("node with empty id".to_string()));
            }
            if !seen.insert(node.id.as_str()) {
                return Err(GraphError::Validation(format!(
                    "duplicate node id '{}'",
                    node.id
                )));
            }
        }

        let mut consumed_slots = HashSet::new();
        for link in &self.links {
            if !seen.contains(link.from_node.as_str()) {
                return Err(GraphError::Validation(format!(
                    "link references unknown producer '{}'",
                    link.from_node
                )));
            }
            if !seen.contains(link.to_node.as_str()) {
                return Err(GraphError::Validation(format!(
                    "link references unknown consumer '{}'",
                    link.to_node
                )));
            }
            if link.from_node == link.to_node {
                return Err(GraphError::Validation(format!(
                    "node '{}' links to itself",
                    link.from_node
                )));
            }
            if !consumed_slots.insert((link.to_node.as_str(), link.to_slot.as_str())) {
                return Err(GraphError::Validation(format!(
                    "input '{}.{}' has more than one producer",
                    link.to_node, link.to_slot
                )));
            }
        }

        // Acyclicity — topo_order errors on a cycle.
        self.topo_order().map(|_| ())
    }

    /// Dependency order via Kahn's algorithm.
    ///
    /// Deterministic: among ready nodes, declaration order wins. Returns
    /// a Validation error if a cycle makes a full ordering impossible.
    pub fn topo_order(&self) -> Result<Vec<&NodeInstance>, GraphError> {
        let index: HashMap<&str, usize> = self
            .nodes
            .iter()
            .enumerate()
            .map(|(i, n)| (n.id.as_str(), i))
            .collect();

        let mut in_degree = vec![0usize; self.nodes.len()];
        let mut downstream: Vec<Vec<usize>> = vec![Vec::new(); self.nodes.len()];

        for link in &self.links {
            // validate() checks endpoints; tolerate unknown ids here so
            // topo_order is safe to call on its own.
            let (Some(&from), Some(&to)) = (
                index.get(link.from_node.as_str()),
                index.get(link.to_node.as_str()),
            ) else {
                continue;
            };
            // Multiple slots between the same pair still mean one edge.
            if !downstream[from].contains(&to) {
                downstream[from].push(to);
                in_degree[to] += 1;
            }
        }

        let mut ready: VecDeque<usize> = (0..self.nodes.len())
            .filter(|&i| in_degree[i] == 0)
            .collect();
        let mut order = Vec::with_capacity(self.nodes.len());

        while let Some(i) = ready.pop_front() {
            order.push(&self.nodes[i]);
            for &next in &downstream[i] {
                in_degree[next] -= 1;
                if in_degree[next] == 0 {
                    // Keep declaration order among newly-ready nodes.
                    let pos = ready
                        .iter()
                        .position(|&r| r > next)
                        .unwrap_or(ready.len());
                    ready.insert(pos, next);
                }
            }
        }

        if order.len() != self.nodes.len() {
            return Err(GraphError::Validation(
                "graph contains a cycle".to_string(),
            ));
        }
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn linear_graph() -> GraphDefinition {
        GraphDefinition::new("test", OperatingMode::Autonomous)
            .add_node(NodeInstance::new("a", NodeKind::Detector))
            .add_node(NodeInstance::new("b", NodeKind::Planner))
            .add_node(NodeInstance::new("c", NodeKind::Verdict))
            .add_link(Link::new("a", "out", "b", "in"))
            .add_link(Link::new("b", "out", "c", "in"))
    }

    #[test]
    fn valid_graph_passes() {
        assert!(linear_graph().validate().is_ok());
    }

    #[test]
    fn topo_order_respects_dependencies() {
        let graph = linear_graph();
        let order: Vec<&str> = graph
            .topo_order()
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        assert_eq!(order, vec!["a", "b", "c"]);
    }

    #[test]
    fn topo_order_is_deterministic_for_independent_nodes() {
        let graph = GraphDefinition::new("diamond", OperatingMode::Autonomous)
            .add_node(NodeInstance::new("root", NodeKind::Detector))
            .add_node(NodeInstance::new("left", NodeKind::SafetyReview))
            .add_node(NodeInstance::new("right", NodeKind::AlignmentReview))
            .add_node(NodeInstance::new("join", NodeKind::Verdict))
            .add_link(Link::new("root", "out", "left", "in"))
            .add_link(Link::new("root", "out", "right", "in"))
            .add_link(Link::new("left", "out", "join", "safety"))
            .add_link(Link::new("right", "out", "join", "alignment"));

        let order: Vec<&str> = graph
            .topo_order()
            .unwrap()
            .iter()
            .map(|n| n.id.as_str())
            .collect();
        // Independent branches run in declaration order.
        assert_eq!(order, vec!["root", "left", "right", "join"]);
    }

    #[test]
    fn cycle_is_rejected() {
        let graph = GraphDefinition::new("cyclic", OperatingMode::Autonomous)
            .add_node(NodeInstance::new("a", NodeKind::Detector))
            .add_node(NodeInstance::new("b", NodeKind::Planner))
            .add_link(Link::new("a", "out", "b", "in"))
            .add_link(Link::new("b", "out", "a", "in"));

        let result = graph.validate();
        assert!(matches!(result, Err(GraphError::Validation(msg)) if msg.contains("cycle")));
    }

    #[test]
    fn duplicate_node_id_rejected() {
        let graph = GraphDefinition::new("dup", OperatingMode::Autonomous)
            .add_node(NodeInstance::new("a", NodeKind::Detector))
            .add_node(NodeInstance::new("a", NodeKind::Planner));
        assert!(matches!(graph.validate(), Err(GraphError::Validation(_))));
    }

    #[test]
    fn unknown_link_endpoint_rejected() {
        let graph = GraphDefinition::new("dangling", OperatingMode::Autonomous)
            .add_node(NodeInstance::new("a", NodeKind::Detector))
            .add_link(Link::new("a", "out", "ghost", "in"));
        assert!(matches!(graph.validate(), Err(GraphError::Validation(_))));
    }

    #[test]
    fn self_link_rejected() {
        let graph = GraphDefinition::new("selfie", OperatingMode::Autonomous)
            .add_node(NodeInstance::new("a", NodeKind::Detector))
            .add_link(Link::new("a", "out", "a", "in"));
        assert!(matches!(graph.validate(), Err(GraphError::Validation(_))));
    }

    #[test]
    fn double_producer_for_one_slot_rejected() {
        let graph = GraphDefinition::new("double", OperatingMode::Autonomous)
            .add_node(NodeInstance::new("a", NodeKind::Detector))
            .add_node(NodeInstance::new("b", NodeKind::Planner))
            .add_node(NodeInstance::new("c", NodeKind::Verdict))
            .add_link(Link::new("a", "out", "c", "in"))
            .add_link(Link::new("b", "out", "c", "in"));
        assert!(matches!(graph.validate(), Err(GraphError::Validation(_))));
    }

    #[test]
    fn empty_graph_rejected() {
        let graph = GraphDefinition::new("empty", OperatingMode::Autonomous);
        assert!(matches!(graph.validate(), Err(GraphError::Validation(_))));
    }

    #[test]
    fn serialization_round_trip() {
        let graph = linear_graph();
        let json = serde_json::to_string(&graph).unwrap();
        let restored: GraphDefinition = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.nodes.len(), 3);
        assert_eq!(restored.links.len(), 2);
        assert_eq!(restored.mode, OperatingMode::Autonomous);
    }
}
