//! Parent/child ordering of messages
//!
//! Entries may be added in any order. A node whose parent has not been
//! seen hangs off a placeholder; when the parent arrives later it takes
//! the placeholder's place. Placeholders still unresolved at the end are
//! the roots.

use std::collections::{BTreeMap, HashMap};

/// Index of a node in a [`TreeSorter`]
pub type NodeId = usize;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Node {
    /// Entry index, `None` for a placeholder
    pub entry: Option<usize>,
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
}

impl Node {
    pub fn is_placeholder(&self) -> bool {
        self.entry.is_none()
    }
}

#[derive(Debug, Clone, Default)]
pub struct TreeSorter {
    nodes: Vec<Node>,
    node_map: HashMap<String, NodeId>,
    unresolved: BTreeMap<String, NodeId>,
}

impl TreeSorter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add entry `entry` identified by `node_id` under `parent_id`
    pub fn add_entry(&mut self, entry: usize, node_id: &str, parent_id: &str) {
        let parent = match self.node_map.get(parent_id) {
            Some(&parent) => parent,
            None => match self.unresolved.get(parent_id) {
                Some(&placeholder) => placeholder,
                None => {
                    let placeholder = self.push(Node::default());
                    self.unresolved.insert(parent_id.to_string(), placeholder);
                    placeholder
                }
            },
        };

        let node = match self.unresolved.remove(node_id) {
            Some(placeholder) => {
                let node = &mut self.nodes[placeholder];
                node.entry = Some(entry);
                node.parent = Some(parent);
                placeholder
            }
            None => self.push(Node {
                entry: Some(entry),
                parent: Some(parent),
                children: Vec::new(),
            }),
        };

        self.node_map.insert(node_id.to_string(), node);
        self.nodes[parent].children.push(node);
    }

    fn push(&mut self, node: Node) -> NodeId {
        self.nodes.push(node);
        self.nodes.len() - 1
    }

    /// Placeholders for parents never added, ordered by parent id
    pub fn root_nodes(&self) -> Vec<NodeId> {
        self.unresolved.values().copied().collect()
    }

    /// Missing parent ids and their placeholders
    pub fn unresolved(&self) -> impl Iterator<Item = (&str, NodeId)> {
        self.unresolved.iter().map(|(id, &node)| (id.as_str(), node))
    }

    pub fn node(&self, id: NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Node added under `msg_id`
    pub fn lookup(&self, msg_id: &str) -> Option<NodeId> {
        self.node_map.get(msg_id).copied()
    }

    /// All nodes below `id`, each visited once
    pub fn descendants(&self, id: NodeId) -> Vec<NodeId> {
        let mut seen = vec![false; self.nodes.len()];
        let mut out = Vec::new();
        let mut stack: Vec<NodeId> = match self.nodes.get(id) {
            Some(node) => {
                seen[id] = true;
                node.children.iter().rev().copied().collect()
            }
            None => return out,
        };

        while let Some(current) = stack.pop() {
            if std::mem::replace(&mut seen[current], true) {
                continue;
            }
            out.push(current);
            stack.extend(self.nodes[current].children.iter().rev().copied());
        }
        out
    }

    /// Number of nodes, placeholders included
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}
