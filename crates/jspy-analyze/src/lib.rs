//! Jupyter Spy Analyze - Offline processing of captured message logs
//!
//! Loads a complete JSON array written by a capture and offers:
//!
//! - lookup of messages by id
//! - a parent/child tree built from `parent_header.msg_id`
//! - message type statistics, per log and per subtree

pub mod processor;
pub mod tree;

pub use processor::{AnalyzeError, AnalyzeResult, Processor, TypeCounts};
pub use tree::{Node, NodeId, TreeSorter};
