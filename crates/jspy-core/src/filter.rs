//! Message filtering for capture
//!
//! A [`Filter`] is a pure predicate over [`Message`]. Filters compose by
//! logical AND and never fail: a message missing the inspected field is a
//! non-match.

use crate::message::Message;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

/// Message types of the comm lifecycle
pub const COMM_MSG_TYPES: [&str; 3] = ["comm_open", "comm_msg", "comm_close"];

/// Thread-safe, cloneable message predicate
#[derive(Clone)]
pub struct Filter {
    predicate: Arc<dyn Fn(&Message) -> bool + Send + Sync>,
}

impl Filter {
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn(&Message) -> bool + Send + Sync + 'static,
    {
        Self {
            predicate: Arc::new(predicate),
        }
    }

    /// Check if a message passes the filter
    pub fn matches(&self, message: &Message) -> bool {
        (self.predicate)(message)
    }

    /// Both `self` and `other` must pass
    pub fn and(self, other: Filter) -> Filter {
        Filter::new(move |msg| self.matches(msg) && other.matches(msg))
    }

    /// AND of all filters; `None` if the iterator is empty
    pub fn all_of(filters: impl IntoIterator<Item = Filter>) -> Option<Filter> {
        filters.into_iter().reduce(Filter::and)
    }
}

impl fmt::Debug for Filter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Filter").finish_non_exhaustive()
    }
}

/// Passes everything except `status` messages
pub fn is_not_status() -> Filter {
    Filter::new(|msg| msg.msg_type() != Some("status"))
}

/// Passes comm lifecycle messages (`comm_open`, `comm_msg`, `comm_close`)
pub fn is_comms() -> Filter {
    Filter::new(is_comm_message)
}

fn is_comm_message(msg: &Message) -> bool {
    msg.msg_type()
        .map(|t| COMM_MSG_TYPES.contains(&t))
        .unwrap_or(false)
}

/// Passes comm messages whose comm id is in `ids`
pub fn comm_ids(ids: CommIds) -> Filter {
    Filter::new(move |msg| {
        is_comm_message(msg) && msg.comm_id().map(|id| ids.contains(id)).unwrap_or(false)
    })
}

/// Drops messages whose type is listed
pub fn exclude_types(types: Vec<String>) -> Filter {
    Filter::new(move |msg| match msg.msg_type() {
        Some(t) => !types.iter().any(|excluded| excluded == t),
        None => true,
    })
}

/// Allowlist of comm ids.
///
/// A single id converts into a one-element list.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommIds(BTreeSet<String>);

impl CommIds {
    pub fn contains(&self, id: &str) -> bool {
        self.0.contains(id)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<&str> for CommIds {
    fn from(id: &str) -> Self {
        Self(BTreeSet::from([id.to_string()]))
    }
}

impl From<String> for CommIds {
    fn from(id: String) -> Self {
        Self(BTreeSet::from([id]))
    }
}

impl From<Vec<String>> for CommIds {
    fn from(ids: Vec<String>) -> Self {
        Self(ids.into_iter().collect())
    }
}

impl From<&[&str]> for CommIds {
    fn from(ids: &[&str]) -> Self {
        Self(ids.iter().map(|id| id.to_string()).collect())
    }
}

impl<const N: usize> From<[&str; N]> for CommIds {
    fn from(ids: [&str; N]) -> Self {
        Self(ids.iter().map(|id| id.to_string()).collect())
    }
}

impl FromIterator<String> for CommIds {
    fn from_iter<I: IntoIterator<Item = String>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Filter configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Drop `status` messages
    pub filter_status: bool,

    /// Message types to drop
    pub exclude_types: Vec<String>,
}

impl FilterSettings {
    /// Build the configured filter, `None` when nothing is filtered
    pub fn build(&self) -> Option<Filter> {
        let mut filters = Vec::new();
        if self.filter_status {
            filters.push(is_not_status());
        }
        if !self.exclude_types.is_empty() {
            filters.push(exclude_types(self.exclude_types.clone()));
        }
        Filter::all_of(filters)
    }
}
