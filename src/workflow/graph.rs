//! Typed node graph understood by the image-generation service.
//!
//! On the wire the graph is a JSON object keyed by node id, each node carrying
//! `inputs` and `class_type`. Links between nodes are `[node_id, output_index]`
//! pairs, modelled here as [`NodeRef`].

use std::collections::BTreeMap;

use serde::de::{self, Deserializer, SeqAccess, Visitor};
use serde::ser::{SerializeTuple, Serializer};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A reference to output `output` of node `node`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct NodeRef {
    pub node: String,
    pub output: u32,
}

impl NodeRef {
    pub fn new(node: impl Into<String>, output: u32) -> Self {
        Self {
            node: node.into(),
            output,
        }
    }
}

impl Serialize for NodeRef {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut tuple = serializer.serialize_tuple(2)?;
        tuple.serialize_element(&self.node)?;
        tuple.serialize_element(&self.output)?;
        tuple.end()
    }
}

impl<'de> Deserialize<'de> for NodeRef {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        struct NodeRefVisitor;

        impl<'de> Visitor<'de> for NodeRefVisitor {
            type Value = NodeRef;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("a [node_id, output_index] pair")
            }

            fn visit_seq<A: SeqAccess<'de>>(self, mut seq: A) -> Result<NodeRef, A::Error> {
                let node: String = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(0, &self))?;
                let output: u32 = seq
                    .next_element()?
                    .ok_or_else(|| de::Error::invalid_length(1, &self))?;
                if seq.next_element::<de::IgnoredAny>()?.is_some() {
                    return Err(de::Error::invalid_length(3, &self));
                }
                Ok(NodeRef { node, output })
            }
        }

        deserializer.deserialize_seq(NodeRefVisitor)
    }
}

/// A single node input value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum InputValue {
    Link(NodeRef),
    Int(i64),
    Float(f64),
    Text(String),
}

impl InputValue {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Self::Int(value) => Some(*value),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(value) => Some(*value),
            Self::Int(value) => Some(*value as f64),
            _ => None,
        }
    }

    pub fn as_link(&self) -> Option<&NodeRef> {
        match self {
            Self::Link(link) => Some(link),
            _ => None,
        }
    }
}

impl From<NodeRef> for InputValue {
    fn from(link: NodeRef) -> Self {
        Self::Link(link)
    }
}

impl From<i64> for InputValue {
    fn from(value: i64) -> Self {
        Self::Int(value)
    }
}

impl From<u32> for InputValue {
    fn from(value: u32) -> Self {
        Self::Int(i64::from(value))
    }
}

impl From<f64> for InputValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<&str> for InputValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<String> for InputValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

/// One node of the graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowNode {
    pub inputs: BTreeMap<String, InputValue>,
    pub class_type: String,
}

impl WorkflowNode {
    pub fn new(class_type: impl Into<String>) -> Self {
        Self {
            inputs: BTreeMap::new(),
            class_type: class_type.into(),
        }
    }

    /// Adds an input, builder style.
    pub fn input(mut self, name: impl Into<String>, value: impl Into<InputValue>) -> Self {
        self.inputs.insert(name.into(), value.into());
        self
    }

    pub fn get(&self, name: &str) -> Option<&InputValue> {
        self.inputs.get(name)
    }

    /// Iterates the links this node consumes.
    pub fn links(&self) -> impl Iterator<Item = (&str, &NodeRef)> {
        self.inputs
            .iter()
            .filter_map(|(name, value)| value.as_link().map(|link| (name.as_str(), link)))
    }
}

/// Structural problems in a graph.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum GraphError {
    #[error("node '{node}' input '{input}' links to missing node '{target}'")]
    DanglingLink {
        node: String,
        input: String,
        target: String,
    },

    #[error("cycle detected through node '{0}'")]
    Cycle(String),
}

/// The full job graph, keyed by node id.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowGraph {
    nodes: BTreeMap<String, WorkflowNode>,
}

impl WorkflowGraph {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, id: impl Into<String>, node: WorkflowNode) {
        self.nodes.insert(id.into(), node);
    }

    pub fn node(&self, id: &str) -> Option<&WorkflowNode> {
        self.nodes.get(id)
    }

    pub fn node_mut(&mut self, id: &str) -> Option<&mut WorkflowNode> {
        self.nodes.get_mut(id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = (&str, &WorkflowNode)> {
        self.nodes.iter().map(|(id, node)| (id.as_str(), node))
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Checks that every link targets an existing node and that the graph is acyclic.
    pub fn validate(&self) -> Result<(), GraphError> {
        for (id, node) in &self.nodes {
            for (input, link) in node.links() {
                if !self.nodes.contains_key(&link.node) {
                    return Err(GraphError::DanglingLink {
                        node: id.clone(),
                        input: input.to_string(),
                        target: link.node.clone(),
                    });
                }
            }
        }

        // Kahn's algorithm over "consumer depends on producer" edges.
        let mut pending: BTreeMap<&str, usize> = self
            .nodes
            .iter()
            .map(|(id, node)| (id.as_str(), node.links().count()))
            .collect();
        let mut ready: Vec<&str> = pending
            .iter()
            .filter(|(_, deps)| **deps == 0)
            .map(|(id, _)| *id)
            .collect();
        let mut visited = 0usize;

        while let Some(producer) = ready.pop() {
            visited += 1;
            for (consumer, node) in &self.nodes {
                let uses = node.links().filter(|(_, l)| l.node == producer).count();
                if uses == 0 {
                    continue;
                }
                if let Some(deps) = pending.get_mut(consumer.as_str()) {
                    *deps -= uses;
                    if *deps == 0 {
                        ready.push(consumer.as_str());
                    }
                }
            }
        }

        if visited != self.nodes.len() {
            let stuck = pending
                .iter()
                .find(|(_, deps)| **deps > 0)
                .map(|(id, _)| id.to_string())
                .unwrap_or_default();
            return Err(GraphError::Cycle(stuck));
        }

        Ok(())
    }

    /// Wraps the graph in the submission envelope `{"prompt": ..., "client_id": ...}`.
    pub fn to_submission(&self, client_id: &str) -> serde_json::Value {
        serde_json::json!({
            "prompt": self,
            "client_id": client_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_node_ref_wire_format() {
        let link = NodeRef::new("4", 1);
        assert_eq!(serde_json::to_string(&link).unwrap(), r#"["4",1]"#);

        let back: NodeRef = serde_json::from_str(r#"["8", 0]"#).unwrap();
        assert_eq!(back, NodeRef::new("8", 0));

        assert!(serde_json::from_str::<NodeRef>(r#"["8"]"#).is_err());
        assert!(serde_json::from_str::<NodeRef>(r#"["8", 0, 1]"#).is_err());
    }

    #[test]
    fn test_input_value_untagged_parsing() {
        let inputs: BTreeMap<String, InputValue> = serde_json::from_str(
            r#"{"model": ["4", 0], "steps": 30, "cfg": 7.5, "sampler_name": "euler"}"#,
        )
        .unwrap();
        assert_eq!(inputs["model"], InputValue::Link(NodeRef::new("4", 0)));
        assert_eq!(inputs["steps"], InputValue::Int(30));
        assert_eq!(inputs["cfg"], InputValue::Float(7.5));
        assert_eq!(inputs["sampler_name"], InputValue::Text("euler".to_string()));
    }

    #[test]
    fn test_validate_detects_dangling_link() {
        let mut graph = WorkflowGraph::new();
        graph.insert("1", WorkflowNode::new("VAEDecode").input("samples", NodeRef::new("2", 0)));
        assert_eq!(
            graph.validate(),
            Err(GraphError::DanglingLink {
                node: "1".to_string(),
                input: "samples".to_string(),
                target: "2".to_string(),
            })
        );
    }

    #[test]
    fn test_validate_detects_cycle() {
        let mut graph = WorkflowGraph::new();
        graph.insert("a", WorkflowNode::new("X").input("in", NodeRef::new("b", 0)));
        graph.insert("b", WorkflowNode::new("Y").input("in", NodeRef::new("a", 0)));
        assert!(matches!(graph.validate(), Err(GraphError::Cycle(_))));
    }

    #[test]
    fn test_validate_accepts_diamond() {
        let mut graph = WorkflowGraph::new();
        graph.insert("root", WorkflowNode::new("Loader"));
        graph.insert("l", WorkflowNode::new("A").input("x", NodeRef::new("root", 0)));
        graph.insert("r", WorkflowNode::new("B").input("x", NodeRef::new("root", 1)));
        graph.insert(
            "sink",
            WorkflowNode::new("C")
                .input("left", NodeRef::new("l", 0))
                .input("right", NodeRef::new("r", 0)),
        );
        assert_eq!(graph.validate(), Ok(()));
    }

    #[test]
    fn test_submission_envelope() {
        let mut graph = WorkflowGraph::new();
        graph.insert("4", WorkflowNode::new("CheckpointLoaderSimple").input("ckpt_name", "x"));
        let body = graph.to_submission("client-1");
        assert_eq!(body["client_id"], "client-1");
        assert_eq!(body["prompt"]["4"]["class_type"], "CheckpointLoaderSimple");
        assert_eq!(body["prompt"]["4"]["inputs"]["ckpt_name"], "x");
    }
}
