//! In-process kernel client
//!
//! Channels are backed by unbounded tokio channels. A [`MemoryFeed`] plays
//! the kernel side and pushes messages in; dropping every feed closes the
//! channels.

use crate::channel::{ChannelError, ChannelKind, ChannelResult, KernelChannel, KernelClient};
use async_trait::async_trait;
use jspy_core::{ConnectionInfo, Message};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::debug;

/// Receiving end of one in-memory channel
#[derive(Debug)]
pub struct MemoryChannel {
    kind: ChannelKind,
    rx: mpsc::UnboundedReceiver<Message>,
}

#[async_trait]
impl KernelChannel for MemoryChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn get_msg(&mut self, timeout: Duration) -> ChannelResult<Option<Message>> {
        match tokio::time::timeout(timeout, self.rx.recv()).await {
            Ok(Some(message)) => Ok(Some(message)),
            Ok(None) => Err(ChannelError::Closed(self.kind)),
            Err(_) => Ok(None),
        }
    }
}

/// Kernel side of a [`MemoryClient`]
#[derive(Debug, Clone)]
pub struct MemoryFeed {
    shell: mpsc::UnboundedSender<Message>,
    iopub: mpsc::UnboundedSender<Message>,
    stdin: mpsc::UnboundedSender<Message>,
}

impl MemoryFeed {
    /// Push a message onto a channel
    pub fn send(&self, kind: ChannelKind, message: Message) -> ChannelResult<()> {
        let tx = match kind {
            ChannelKind::Shell => &self.shell,
            ChannelKind::IoPub => &self.iopub,
            ChannelKind::Stdin => &self.stdin,
        };
        tx.send(message).map_err(|_| ChannelError::Closed(kind))
    }

    /// Publish on iopub
    pub fn publish(&self, message: Message) -> ChannelResult<()> {
        self.send(ChannelKind::IoPub, message)
    }
}

/// Kernel client whose channels are fed from a [`MemoryFeed`]
#[derive(Debug)]
pub struct MemoryClient {
    shell: MemoryChannel,
    iopub: MemoryChannel,
    stdin: MemoryChannel,
    connected: Option<ConnectionInfo>,
}

impl MemoryClient {
    pub fn new() -> (Self, MemoryFeed) {
        let (shell_tx, shell_rx) = mpsc::unbounded_channel();
        let (iopub_tx, iopub_rx) = mpsc::unbounded_channel();
        let (stdin_tx, stdin_rx) = mpsc::unbounded_channel();

        let client = Self {
            shell: MemoryChannel {
                kind: ChannelKind::Shell,
                rx: shell_rx,
            },
            iopub: MemoryChannel {
                kind: ChannelKind::IoPub,
                rx: iopub_rx,
            },
            stdin: MemoryChannel {
                kind: ChannelKind::Stdin,
                rx: stdin_rx,
            },
            connected: None,
        };
        let feed = MemoryFeed {
            shell: shell_tx,
            iopub: iopub_tx,
            stdin: stdin_tx,
        };
        (client, feed)
    }

    /// Connection info from the last `connect`
    pub fn connection(&self) -> Option<&ConnectionInfo> {
        self.connected.as_ref()
    }
}

#[async_trait]
impl KernelClient for MemoryClient {
    async fn connect(&mut self, info: &ConnectionInfo) -> ChannelResult<()> {
        debug!(ip = %info.ip, iopub = info.iopub_port, "Memory client connected");
        self.connected = Some(info.clone());
        Ok(())
    }

    fn channel(&mut self, kind: ChannelKind) -> ChannelResult<&mut dyn KernelChannel> {
        Ok(match kind {
            ChannelKind::Shell => &mut self.shell,
            ChannelKind::IoPub => &mut self.iopub,
            ChannelKind::Stdin => &mut self.stdin,
        })
    }
}
