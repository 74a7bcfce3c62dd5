//! Session with replaceable send and receive operations
//!
//! The operations are stored behind locks so an interceptor can swap them
//! on a session that is already in use. Callers always go through
//! [`Session::send`] and [`Session::recv`], which dispatch to whatever
//! operation is current.

use jspy_core::{Header, Message};
use parking_lot::{Mutex, RwLock};
use serde_json::{Map, Value};
use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Session error type
#[derive(Error, Debug)]
pub enum SessionError {
    #[error("Transport error: {0}")]
    Transport(String),
}

pub type SessionResult<T> = Result<T, SessionError>;

/// Outbound send operation: builds, transmits and returns the message
pub type SendOp = Arc<dyn Fn(&SendRequest) -> SessionResult<Message> + Send + Sync>;

/// Inbound receive operation for a named channel; `None` when nothing is pending
pub type RecvOp = Arc<dyn Fn(&str) -> SessionResult<Option<Received>> + Send + Sync>;

/// A message to send
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    /// Channel the message goes out on (`shell`, `iopub`, `stdin`, ...)
    pub channel: String,
    pub msg_type: String,
    pub content: Map<String, Value>,
    pub parent: Option<Header>,
    pub metadata: Map<String, Value>,
    /// Routing identities
    pub idents: Vec<Vec<u8>>,
}

impl SendRequest {
    pub fn new(channel: impl Into<String>, msg_type: impl Into<String>) -> Self {
        Self {
            channel: channel.into(),
            msg_type: msg_type.into(),
            ..Default::default()
        }
    }

    /// Set the content. Non-object values are ignored.
    pub fn with_content(mut self, content: Value) -> Self {
        if let Value::Object(map) = content {
            self.content = map;
        }
        self
    }

    pub fn with_parent(mut self, parent: &Message) -> Self {
        self.parent = Some(parent.header.clone());
        self
    }

    /// Build the full message this request describes
    pub fn build_message(&self, session_id: &str, username: &str) -> Message {
        let mut message = Message::new(self.msg_type.clone())
            .with_session(session_id)
            .with_content(Value::Object(self.content.clone()));
        message.header.insert("username", username);
        if let Some(parent) = &self.parent {
            message.parent_header = parent.clone();
        }
        message.metadata = self.metadata.clone();
        message
    }
}

/// Result of a receive: routing identities and the message
#[derive(Debug, Clone, PartialEq)]
pub struct Received {
    pub idents: Vec<Vec<u8>>,
    pub message: Message,
}

/// A kernel or client session
pub struct Session {
    id: String,
    username: String,
    send_op: RwLock<SendOp>,
    recv_op: RwLock<RecvOp>,
}

impl Session {
    pub fn new(send: SendOp, recv: RecvOp) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            username: "kernel".to_string(),
            send_op: RwLock::new(send),
            recv_op: RwLock::new(recv),
        }
    }

    /// A session whose sends are queued and handed back by `recv`.
    ///
    /// Messages are queued per channel.
    pub fn loopback() -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        let username = "kernel".to_string();
        let queue: Arc<Mutex<VecDeque<(String, Received)>>> = Arc::default();

        let send_queue = queue.clone();
        let send_id = id.clone();
        let send_username = username.clone();
        let send: SendOp = Arc::new(move |request: &SendRequest| -> SessionResult<Message> {
            let message = request.build_message(&send_id, &send_username);
            send_queue.lock().push_back((
                request.channel.clone(),
                Received {
                    idents: request.idents.clone(),
                    message: message.clone(),
                },
            ));
            Ok(message)
        });

        let recv: RecvOp = Arc::new(move |channel: &str| -> SessionResult<Option<Received>> {
            let mut queue = queue.lock();
            let position = queue.iter().position(|(c, _)| c == channel);
            Ok(position
                .and_then(|i| queue.remove(i))
                .map(|(_, received)| received))
        });

        Self {
            id,
            username,
            send_op: RwLock::new(send),
            recv_op: RwLock::new(recv),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    /// Send through the current send operation
    pub fn send(&self, request: &SendRequest) -> SessionResult<Message> {
        let op = self.send_op.read().clone();
        op(request)
    }

    /// Receive through the current receive operation
    pub fn recv(&self, channel: &str) -> SessionResult<Option<Received>> {
        let op = self.recv_op.read().clone();
        op(channel)
    }

    /// Current send operation
    pub fn send_op(&self) -> SendOp {
        self.send_op.read().clone()
    }

    /// Replace the send operation, returning the previous one
    pub fn set_send_op(&self, op: SendOp) -> SendOp {
        std::mem::replace(&mut *self.send_op.write(), op)
    }

    /// Current receive operation
    pub fn recv_op(&self) -> RecvOp {
        self.recv_op.read().clone()
    }

    /// Replace the receive operation, returning the previous one
    pub fn set_recv_op(&self, op: RecvOp) -> RecvOp {
        std::mem::replace(&mut *self.recv_op.write(), op)
    }
}

impl fmt::Debug for Session {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("id", &self.id)
            .field("username", &self.username)
            .finish_non_exhaustive()
    }
}
