//! ZeroMQ kernel client
//!
//! Subscribes to iopub and opens dealer sockets for shell and stdin. The
//! spy never sends on these sockets.

use crate::channel::{ChannelError, ChannelKind, ChannelResult, KernelChannel, KernelClient};
use crate::wire;
use async_trait::async_trait;
use jspy_core::{ConnectionInfo, Message};
use std::time::Duration;
use tracing::{debug, info};
use zeromq::{DealerSocket, Socket, SocketRecv, SubSocket, ZmqMessage};

enum ZmqSocket {
    Sub(SubSocket),
    Dealer(DealerSocket),
}

/// One kernel socket
pub struct ZmqChannel {
    kind: ChannelKind,
    socket: ZmqSocket,
}

impl ZmqChannel {
    async fn connect(kind: ChannelKind, info: &ConnectionInfo) -> ChannelResult<Self> {
        let endpoint = info.endpoint(kind.port(info));
        let socket = match kind {
            ChannelKind::IoPub => {
                let mut socket = SubSocket::new();
                socket.connect(&endpoint).await.map_err(transport)?;
                socket.subscribe("").await.map_err(transport)?;
                ZmqSocket::Sub(socket)
            }
            ChannelKind::Shell | ChannelKind::Stdin => {
                let mut socket = DealerSocket::new();
                socket.connect(&endpoint).await.map_err(transport)?;
                ZmqSocket::Dealer(socket)
            }
        };
        debug!(channel = %kind, endpoint = %endpoint, "Socket connected");
        Ok(Self { kind, socket })
    }
}

#[async_trait]
impl KernelChannel for ZmqChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    async fn get_msg(&mut self, timeout: Duration) -> ChannelResult<Option<Message>> {
        let received = match &mut self.socket {
            ZmqSocket::Sub(socket) => tokio::time::timeout(timeout, socket.recv()).await,
            ZmqSocket::Dealer(socket) => tokio::time::timeout(timeout, socket.recv()).await,
        };

        match received {
            Err(_) => Ok(None),
            Ok(Err(e)) => Err(transport(e)),
            Ok(Ok(raw)) => decode(raw).map(Some),
        }
    }
}

fn decode(raw: ZmqMessage) -> ChannelResult<Message> {
    let frames = raw.into_vec();
    let (_, message) = wire::decode_frames(&frames)?;
    Ok(message)
}

fn transport(e: zeromq::ZmqError) -> ChannelError {
    ChannelError::Transport(e.to_string())
}

/// Kernel client over ZeroMQ
#[derive(Default)]
pub struct ZmqClient {
    shell: Option<ZmqChannel>,
    iopub: Option<ZmqChannel>,
    stdin: Option<ZmqChannel>,
}

impl ZmqClient {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl KernelClient for ZmqClient {
    async fn connect(&mut self, info: &ConnectionInfo) -> ChannelResult<()> {
        self.iopub = Some(ZmqChannel::connect(ChannelKind::IoPub, info).await?);
        self.shell = Some(ZmqChannel::connect(ChannelKind::Shell, info).await?);
        self.stdin = Some(ZmqChannel::connect(ChannelKind::Stdin, info).await?);
        info!(ip = %info.ip, "ZeroMQ channels open");
        Ok(())
    }

    fn channel(&mut self, kind: ChannelKind) -> ChannelResult<&mut dyn KernelChannel> {
        let slot = match kind {
            ChannelKind::Shell => &mut self.shell,
            ChannelKind::IoPub => &mut self.iopub,
            ChannelKind::Stdin => &mut self.stdin,
        };
        match slot {
            Some(channel) => Ok(channel),
            None => Err(ChannelError::NotConnected),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_channel_before_connect() {
        let mut client = ZmqClient::new();
        assert!(matches!(
            client.channel(ChannelKind::IoPub),
            Err(ChannelError::NotConnected)
        ));
    }
}
