//! Kernel channel abstraction
//!
//! A kernel client exposes one channel per socket. Each channel offers a
//! receive that waits at most a given timeout.

use async_trait::async_trait;
use jspy_core::{ConnectionInfo, Message};
use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Channel error type
#[derive(Error, Debug)]
pub enum ChannelError {
    #[error("Channel closed: {0}")]
    Closed(ChannelKind),

    #[error("Client is not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Decode error: {0}")]
    Decode(#[from] serde_json::Error),
}

pub type ChannelResult<T> = Result<T, ChannelError>;

/// Kernel channels a client can listen on
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelKind {
    Shell,
    IoPub,
    Stdin,
}

impl ChannelKind {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Shell => "shell",
            Self::IoPub => "iopub",
            Self::Stdin => "stdin",
        }
    }

    /// Port of this channel in the connection info
    pub fn port(&self, info: &ConnectionInfo) -> u16 {
        match self {
            Self::Shell => info.shell_port,
            Self::IoPub => info.iopub_port,
            Self::Stdin => info.stdin_port,
        }
    }
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One message stream from a kernel
#[async_trait]
pub trait KernelChannel: Send {
    fn kind(&self) -> ChannelKind;

    /// Wait up to `timeout` for the next message; `Ok(None)` on timeout.
    ///
    /// Must be cancel safe: dropping the future before it completes must
    /// not lose a message.
    async fn get_msg(&mut self, timeout: Duration) -> ChannelResult<Option<Message>>;
}

/// A client attached to a running kernel
#[async_trait]
pub trait KernelClient: Send {
    /// Attach to the kernel described by `info`
    async fn connect(&mut self, info: &ConnectionInfo) -> ChannelResult<()>;

    /// Channel of the given kind
    fn channel(&mut self, kind: ChannelKind) -> ChannelResult<&mut dyn KernelChannel>;
}
