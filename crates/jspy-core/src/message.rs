//! Jupyter message model
//!
//! A [`Message`] is one packet of the kernel messaging protocol. The four
//! protocol sections are typed; everything else is carried through a
//! flattened map so an observed message serializes back without loss,
//! including explicit `null` values and empty `buffers`.
//!
//! Two historical layouts are supported for the type and id of a message:
//! nested under `header` (wire format) and at the top level (as added by
//! client-side deserialization). The accessors check the header first.

use crate::PROTOCOL_VERSION;
use chrono::{DateTime, FixedOffset, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Timestamp carried in a message header.
///
/// Headers keep the date text exactly as received; this is the parsed view
/// of it. The UTC offset of the original is retained. Values that do not
/// parse as RFC 3339 are kept verbatim.
#[derive(Debug, Clone, PartialEq)]
pub enum MessageDate {
    Timestamp(DateTime<FixedOffset>),
    Raw(String),
}

impl MessageDate {
    pub fn now() -> Self {
        Self::Timestamp(Utc::now().into())
    }

    pub fn parse(text: &str) -> Self {
        match DateTime::parse_from_rfc3339(text) {
            Ok(ts) => Self::Timestamp(ts),
            Err(_) => Self::Raw(text.to_string()),
        }
    }

    /// Parsed timestamp, if the header carried a valid RFC 3339 date
    pub fn timestamp(&self) -> Option<DateTime<FixedOffset>> {
        match self {
            Self::Timestamp(ts) => Some(*ts),
            Self::Raw(_) => None,
        }
    }

    pub fn to_utc(&self) -> Option<DateTime<Utc>> {
        self.timestamp().map(|ts| ts.with_timezone(&Utc))
    }
}

impl fmt::Display for MessageDate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Timestamp(ts) => f.write_str(&ts.to_rfc3339_opts(SecondsFormat::Micros, true)),
            Self::Raw(raw) => f.write_str(raw),
        }
    }
}

/// Message header (also used for `parent_header`, which may be empty).
///
/// Stored as the raw JSON object; the well-known fields are read through
/// accessors so that absent, `null` and non-string values survive untouched.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Header(Map<String, Value>);

impl Header {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    pub fn remove(&mut self, key: &str) -> Option<Value> {
        self.0.remove(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn as_map(&self) -> &Map<String, Value> {
        &self.0
    }

    fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn msg_id(&self) -> Option<&str> {
        self.str_field("msg_id")
    }

    pub fn msg_type(&self) -> Option<&str> {
        self.str_field("msg_type")
    }

    pub fn session(&self) -> Option<&str> {
        self.str_field("session")
    }

    pub fn username(&self) -> Option<&str> {
        self.str_field("username")
    }

    pub fn version(&self) -> Option<&str> {
        self.str_field("version")
    }

    /// Parsed `date`, or `None` when the header has no date string
    pub fn date(&self) -> Option<MessageDate> {
        self.str_field("date").map(MessageDate::parse)
    }
}

impl From<Map<String, Value>> for Header {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

/// One kernel protocol message
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Message {
    #[serde(default)]
    pub header: Header,

    #[serde(default)]
    pub parent_header: Header,

    #[serde(default)]
    pub metadata: Map<String, Value>,

    #[serde(default)]
    pub content: Map<String, Value>,

    /// Everything else: top-level `msg_id`/`msg_type`, `buffers`, `channel`, ...
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl Message {
    /// Create a fresh message with a random id and the current date.
    ///
    /// Both the header and the top-level layout are populated.
    pub fn new(msg_type: impl Into<String>) -> Self {
        let msg_type = msg_type.into();
        let msg_id = uuid::Uuid::new_v4().to_string();

        let mut header = Header::new();
        header.insert("msg_id", msg_id.as_str());
        header.insert("msg_type", msg_type.as_str());
        header.insert("date", MessageDate::now().to_string());
        header.insert("version", PROTOCOL_VERSION);

        let mut message = Self {
            header,
            ..Default::default()
        };
        message.mirror_header_ids();
        message
    }

    /// Copy `header.msg_id` and `header.msg_type` to the top level
    pub fn mirror_header_ids(&mut self) {
        for key in ["msg_id", "msg_type"] {
            if let Some(value) = self.header.get(key) {
                self.extra.insert(key.to_string(), value.clone());
            }
        }
    }

    /// Set the content. Non-object values are ignored; message content is always a mapping.
    pub fn with_content(mut self, content: Value) -> Self {
        if let Value::Object(map) = content {
            self.content = map;
        }
        self
    }

    /// Set the parent header to the header of `parent`
    pub fn with_parent(mut self, parent: &Message) -> Self {
        self.parent_header = parent.header.clone();
        self
    }

    /// Set only the parent message id
    pub fn with_parent_id(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_header.insert("msg_id", parent_id.into());
        self
    }

    /// Set the session id in the header
    pub fn with_session(mut self, session: impl Into<String>) -> Self {
        self.header.insert("session", session.into());
        self
    }

    /// Parse a message from JSON text.
    ///
    /// `NaN` and `Infinity` are not valid JSON and are rejected here, so a
    /// `Message` never holds a non-finite number.
    pub fn from_json(json: &str) -> serde_json::Result<Self> {
        serde_json::from_str(json)
    }

    pub fn from_value(value: Value) -> serde_json::Result<Self> {
        serde_json::from_value(value)
    }

    pub fn to_value(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }

    /// Message type, from `header.msg_type` or the top-level `msg_type`
    pub fn msg_type(&self) -> Option<&str> {
        self.header
            .msg_type()
            .or_else(|| self.extra.get("msg_type").and_then(Value::as_str))
    }

    /// Message id, from `header.msg_id` or the top-level `msg_id`
    pub fn msg_id(&self) -> Option<&str> {
        self.header
            .msg_id()
            .or_else(|| self.extra.get("msg_id").and_then(Value::as_str))
    }

    /// Id of the message this one replies to, if any
    pub fn parent_msg_id(&self) -> Option<&str> {
        self.parent_header.msg_id()
    }

    /// Comm id for comm messages (`content.comm_id`)
    pub fn comm_id(&self) -> Option<&str> {
        self.content.get("comm_id").and_then(Value::as_str)
    }

    /// Binary buffer list, when the message carries one
    pub fn buffers(&self) -> Option<&[Value]> {
        self.extra
            .get("buffers")
            .and_then(Value::as_array)
            .map(Vec::as_slice)
    }

    pub fn set_buffers(&mut self, buffers: Vec<Value>) {
        self.extra.insert("buffers".to_string(), Value::Array(buffers));
    }
}
