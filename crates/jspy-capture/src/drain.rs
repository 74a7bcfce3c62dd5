//! Cancellable message drain
//!
//! Repeatedly receives from a channel with a short timeout. Each attempt
//! is raced against a cancellation token, so a stop request ends the drain
//! at the next await point instead of after the current timeout.

use crate::channel::{ChannelResult, KernelChannel};
use jspy_core::Message;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Receive timeout per polling attempt
pub const DEFAULT_POLL_INTERVAL: Duration =
    Duration::from_millis(jspy_core::config::DEFAULT_POLL_INTERVAL_MS);

/// Outcome of one polling attempt
#[derive(Debug)]
pub enum DrainEvent {
    Message(Message),
    /// Nothing arrived within the poll interval
    Timeout,
    /// Cancellation was requested; the drain is finished
    Cancelled,
}

/// Pulls messages from a channel until cancelled
pub struct MessageDrain<'a> {
    channel: &'a mut dyn KernelChannel,
    cancel: CancellationToken,
    poll_interval: Duration,
    finished: bool,
}

impl<'a> MessageDrain<'a> {
    pub fn new(channel: &'a mut dyn KernelChannel, cancel: CancellationToken) -> Self {
        Self {
            channel,
            cancel,
            poll_interval: DEFAULT_POLL_INTERVAL,
            finished: false,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    pub fn is_finished(&self) -> bool {
        self.finished
    }

    /// One polling attempt.
    ///
    /// Once `Cancelled` has been returned every later call returns it too.
    pub async fn next_event(&mut self) -> ChannelResult<DrainEvent> {
        if self.finished || self.cancel.is_cancelled() {
            self.finish();
            return Ok(DrainEvent::Cancelled);
        }

        let event = tokio::select! {
            biased;
            _ = self.cancel.cancelled() => DrainEvent::Cancelled,
            received = self.channel.get_msg(self.poll_interval) => match received? {
                Some(message) => DrainEvent::Message(message),
                None => DrainEvent::Timeout,
            },
        };

        if matches!(event, DrainEvent::Cancelled) {
            self.finish();
        }
        Ok(event)
    }

    /// Next message, skipping timeouts. `None` once cancelled.
    pub async fn next_message(&mut self) -> ChannelResult<Option<Message>> {
        loop {
            match self.next_event().await? {
                DrainEvent::Message(message) => return Ok(Some(message)),
                DrainEvent::Timeout => continue,
                DrainEvent::Cancelled => return Ok(None),
            }
        }
    }

    fn finish(&mut self) {
        if !self.finished {
            self.finished = true;
            debug!(channel = %self.channel.kind(), "Drain cancelled");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ChannelError, ChannelKind, KernelClient};
    use crate::memory::MemoryClient;
    use std::time::Instant;

    #[tokio::test]
    async fn test_timeout_then_message() {
        let (mut client, feed) = MemoryClient::new();
        let channel = client.channel(ChannelKind::IoPub).unwrap();
        let mut drain = MessageDrain::new(channel, CancellationToken::new())
            .with_poll_interval(Duration::from_millis(10));

        assert!(matches!(drain.next_event().await.unwrap(), DrainEvent::Timeout));

        feed.publish(Message::new("stream")).unwrap();
        match drain.next_event().await.unwrap() {
            DrainEvent::Message(m) => assert_eq!(m.msg_type(), Some("stream")),
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_cancel_interrupts_wait() {
        let (mut client, _feed) = MemoryClient::new();
        let channel = client.channel(ChannelKind::IoPub).unwrap();
        let cancel = CancellationToken::new();
        let mut drain = MessageDrain::new(channel, cancel.clone())
            .with_poll_interval(Duration::from_secs(30));

        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(50)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        assert!(drain.next_message().await.unwrap().is_none());
        assert!(started.elapsed() < Duration::from_secs(5));
        assert!(drain.is_finished());
        assert!(matches!(drain.next_event().await.unwrap(), DrainEvent::Cancelled));
    }

    #[tokio::test]
    async fn test_cancel_wins_over_pending_message() {
        let (mut client, feed) = MemoryClient::new();
        feed.publish(Message::new("stream")).unwrap();
        let channel = client.channel(ChannelKind::IoPub).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let mut drain = MessageDrain::new(channel, cancel);
        assert!(matches!(drain.next_event().await.unwrap(), DrainEvent::Cancelled));
    }

    #[tokio::test]
    async fn test_closed_channel_is_error() {
        let (mut client, feed) = MemoryClient::new();
        drop(feed);
        let channel = client.channel(ChannelKind::Shell).unwrap();
        let mut drain = MessageDrain::new(channel, CancellationToken::new());
        assert!(matches!(
            drain.next_message().await,
            Err(ChannelError::Closed(ChannelKind::Shell))
        ));
    }
}
