//! Log entries processor

use crate::tree::{NodeId, TreeSorter};
use jspy_core::Message;
use once_cell::unsync::OnceCell;
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::debug;

/// Analysis error type
#[derive(Error, Debug)]
pub enum AnalyzeError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse log: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("Entry {index} has no {field}")]
    MissingField { index: usize, field: &'static str },
}

pub type AnalyzeResult<T> = Result<T, AnalyzeError>;

/// Message type to count
pub type TypeCounts = BTreeMap<String, u64>;

/// Type reported for placeholder nodes
const UNKNOWN_TYPE: &str = "unknown";

/// Loaded message log with cached lookup structures.
///
/// The id map and the tree are built on first use. Call
/// [`Processor::free_caches`] after changing the entries.
#[derive(Debug, Default)]
pub struct Processor {
    path: Option<PathBuf>,
    entries: Vec<Message>,
    map: OnceCell<HashMap<String, usize>>,
    tree: OnceCell<TreeSorter>,
}

impl Processor {
    /// Load a complete JSON array written by a capture
    pub fn load(path: impl AsRef<Path>) -> AnalyzeResult<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;
        let entries: Vec<Message> = serde_json::from_str(&content)?;
        debug!(path = %path.display(), entries = entries.len(), "Loaded message log");

        Ok(Self {
            path: Some(path.to_path_buf()),
            ..Self::from_messages(entries)
        })
    }

    pub fn from_messages(entries: Vec<Message>) -> Self {
        Self {
            path: None,
            entries,
            map: OnceCell::new(),
            tree: OnceCell::new(),
        }
    }

    /// File the log was loaded from
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    pub fn entries(&self) -> &[Message] {
        &self.entries
    }

    /// Mutable access to the entries. Caches are dropped.
    pub fn entries_mut(&mut self) -> &mut Vec<Message> {
        self.free_caches();
        &mut self.entries
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }

    /// Drop the cached id map and tree
    pub fn free_caches(&mut self) {
        self.map = OnceCell::new();
        self.tree = OnceCell::new();
    }

    /// msg_id to entry index. A repeated id maps to its last entry.
    pub fn map(&self) -> AnalyzeResult<&HashMap<String, usize>> {
        self.map.get_or_try_init(|| {
            let mut map = HashMap::with_capacity(self.entries.len());
            for (index, entry) in self.entries.iter().enumerate() {
                map.insert(msg_id(index, entry)?.to_string(), index);
            }
            Ok(map)
        })
    }

    /// Entry with the given msg_id
    pub fn get(&self, msg_id: &str) -> AnalyzeResult<Option<&Message>> {
        Ok(self.map()?.get(msg_id).map(|&index| &self.entries[index]))
    }

    /// Message hierarchy by parent msg_id
    pub fn tree(&self) -> AnalyzeResult<&TreeSorter> {
        self.tree.get_or_try_init(|| {
            let map = self.map()?;
            let mut tree = TreeSorter::new();
            for (index, entry) in self.entries.iter().enumerate() {
                let id = msg_id(index, entry)?;
                if map.get(id) != Some(&index) {
                    continue;
                }
                let parent_id = entry
                    .parent_msg_id()
                    .ok_or(AnalyzeError::MissingField {
                        index,
                        field: "parent_header.msg_id",
                    })?;
                tree.add_entry(index, id, parent_id);
            }
            Ok(tree)
        })
    }

    /// Type of `node` and the type counts of everything below it
    pub fn stat_node(&self, node: NodeId) -> AnalyzeResult<(String, TypeCounts)> {
        let tree = self.tree()?;
        let own_type = self.node_type(tree, node)?;

        let mut counts = TypeCounts::new();
        for descendant in tree.descendants(node) {
            *counts.entry(self.node_type(tree, descendant)?).or_insert(0) += 1;
        }
        Ok((own_type, counts))
    }

    fn node_type(&self, tree: &TreeSorter, node: NodeId) -> AnalyzeResult<String> {
        match tree.node(node).and_then(|n| n.entry) {
            None => Ok(UNKNOWN_TYPE.to_string()),
            Some(index) => Ok(msg_type(index, &self.entries[index])?.to_string()),
        }
    }

    /// Message type counts over the whole log
    pub fn msg_types(&self) -> AnalyzeResult<TypeCounts> {
        let mut counts = TypeCounts::new();
        for (index, entry) in self.entries.iter().enumerate() {
            *counts.entry(msg_type(index, entry)?.to_string()).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

fn msg_id(index: usize, entry: &Message) -> AnalyzeResult<&str> {
    entry
        .msg_id()
        .ok_or(AnalyzeError::MissingField { index, field: "msg_id" })
}

fn msg_type(index: usize, entry: &Message) -> AnalyzeResult<&str> {
    entry
        .msg_type()
        .ok_or(AnalyzeError::MissingField { index, field: "msg_type" })
}
