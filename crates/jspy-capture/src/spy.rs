//! Spy facade
//!
//! [`Spy`] owns a kernel client and turns a channel into a streaming JSON
//! array. Every `log_*` call runs until its cancellation token fires; the
//! array is closed on every exit path, including errors.

use crate::channel::{ChannelError, ChannelKind, KernelClient};
use crate::drain::{MessageDrain, DEFAULT_POLL_INTERVAL};
use jspy_core::filter::{self, CommIds, Filter};
use jspy_core::{ConnectInfo, ConnectionError, Message, SpyConfig};
use jspy_export::{JsonArrayWriter, Output, WriterError};
use jspy_hook::{HookRegistry, MessageCallback};
use parking_lot::Mutex;
use std::io::Write;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// Spy error type
#[derive(Error, Debug)]
pub enum SpyError {
    #[error("Connection error: {0}")]
    Connection(#[from] ConnectionError),

    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    #[error("Output error: {0}")]
    Writer(#[from] WriterError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Not implemented: {0}")]
    NotImplemented(&'static str),
}

pub type SpyResult<T> = Result<T, SpyError>;

/// Options for one polling capture
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Pretty print; `None` means pretty only when writing to stdout
    pub pretty: Option<bool>,
    /// Messages failing the filter are dropped
    pub filter: Option<Filter>,
    pub flush_each: bool,
    pub poll_interval: Duration,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            pretty: None,
            filter: None,
            flush_each: true,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }
}

impl LogOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Options from loaded configuration
    pub fn from_config(config: &SpyConfig) -> Self {
        Self {
            pretty: config.output.pretty,
            filter: config.capture.filter.build(),
            flush_each: config.output.flush_each,
            poll_interval: config.capture.poll_interval(),
        }
    }

    pub fn pretty(mut self, pretty: bool) -> Self {
        self.pretty = Some(pretty);
        self
    }

    /// Add a filter, ANDed with any filter already set
    pub fn filter(mut self, filter: Filter) -> Self {
        self.filter = Some(match self.filter.take() {
            Some(existing) => existing.and(filter),
            None => filter,
        });
        self
    }

    pub fn poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }
}

/// Counters for one capture
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub received: u64,
    pub written: u64,
    pub filtered: u64,
}

/// Observer attached to a running kernel
pub struct Spy {
    client: Box<dyn KernelClient>,
}

impl Spy {
    pub fn new(client: Box<dyn KernelClient>) -> Self {
        Self { client }
    }

    /// Create a spy and connect it in one step
    pub async fn connect_with(
        client: Box<dyn KernelClient>,
        connect_info: impl Into<ConnectInfo>,
    ) -> SpyResult<Self> {
        let mut spy = Self::new(client);
        spy.connect(connect_info).await?;
        Ok(spy)
    }

    /// Resolve the connection info (reading a connection file if a name was
    /// given) and attach the client
    pub async fn connect(&mut self, connect_info: impl Into<ConnectInfo>) -> SpyResult<()> {
        let info = connect_info.into().resolve()?;
        self.client.connect(&info).await?;
        info!(
            transport = %info.transport,
            ip = %info.ip,
            iopub_port = info.iopub_port,
            "Connected to kernel"
        );
        Ok(())
    }

    /// Capture every channel at once
    pub async fn log_all(
        &mut self,
        _output: Output,
        _options: LogOptions,
        _cancel: CancellationToken,
    ) -> SpyResult<CaptureStats> {
        Err(SpyError::NotImplemented("log_all"))
    }

    pub async fn log_iopub(
        &mut self,
        output: Output,
        options: LogOptions,
        cancel: CancellationToken,
    ) -> SpyResult<CaptureStats> {
        self.log_channel(ChannelKind::IoPub, output, options, cancel)
            .await
    }

    pub async fn log_shell(
        &mut self,
        output: Output,
        options: LogOptions,
        cancel: CancellationToken,
    ) -> SpyResult<CaptureStats> {
        self.log_channel(ChannelKind::Shell, output, options, cancel)
            .await
    }

    pub async fn log_stdin(
        &mut self,
        output: Output,
        options: LogOptions,
        cancel: CancellationToken,
    ) -> SpyResult<CaptureStats> {
        self.log_channel(ChannelKind::Stdin, output, options, cancel)
            .await
    }

    /// Capture comm messages from iopub, optionally only for some comm ids.
    ///
    /// The comm predicate runs before any filter in `options`.
    pub async fn log_comms(
        &mut self,
        only_id: Option<CommIds>,
        output: Output,
        mut options: LogOptions,
        cancel: CancellationToken,
    ) -> SpyResult<CaptureStats> {
        let comms = comm_filter(only_id);
        options.filter = Some(match options.filter.take() {
            Some(user) => comms.and(user),
            None => comms,
        });
        self.log_channel(ChannelKind::IoPub, output, options, cancel)
            .await
    }

    async fn log_channel(
        &mut self,
        kind: ChannelKind,
        output: Output,
        options: LogOptions,
        cancel: CancellationToken,
    ) -> SpyResult<CaptureStats> {
        let channel = self.client.channel(kind)?;

        let pretty = output.resolve_pretty(options.pretty);
        let mut array =
            JsonArrayWriter::open(output.into_writer()?, pretty)?.with_flush_each(options.flush_each);
        let mut drain = MessageDrain::new(channel, cancel).with_poll_interval(options.poll_interval);

        info!(channel = %kind, "Capture started");
        let mut stats = CaptureStats::default();
        let pumped = pump(&mut drain, &mut array, options.filter.as_ref(), &mut stats).await;
        let closed = array.close();

        match &pumped {
            Ok(()) => info!(
                channel = %kind,
                received = stats.received,
                written = stats.written,
                filtered = stats.filtered,
                "Capture stopped"
            ),
            Err(e) => warn!(channel = %kind, written = stats.written, "Capture failed: {}", e),
        }

        pumped?;
        closed?;
        Ok(stats)
    }

    /// Intercept an in-process session: every message sent or received
    /// through `registry` is appended to `output` until the returned
    /// capture is finished or dropped.
    pub fn hook<'r>(
        registry: &'r HookRegistry,
        output: Output,
        pretty: Option<bool>,
        filter: Option<Filter>,
    ) -> SpyResult<HookCapture<'r>> {
        let pretty = output.resolve_pretty(pretty);
        let array = Arc::new(Mutex::new(JsonArrayWriter::open(
            output.into_writer()?,
            pretty,
        )?));

        let sink = array.clone();
        let callback = MessageCallback::new(move |message: &Message| {
            if let Some(filter) = &filter {
                if !filter.matches(message) {
                    return Ok(());
                }
            }
            sink.lock().write(message)?;
            Ok(())
        });

        registry.hook_send(callback.clone());
        registry.hook_recv(callback.clone());
        debug!("Hook capture started");

        Ok(HookCapture {
            registry,
            callback,
            array,
            finished: false,
        })
    }

    /// [`Spy::hook`] restricted to comm messages
    pub fn hook_comms<'r>(
        registry: &'r HookRegistry,
        output: Output,
        pretty: Option<bool>,
        filter: Option<Filter>,
        only_id: Option<CommIds>,
    ) -> SpyResult<HookCapture<'r>> {
        let comms = comm_filter(only_id);
        let filter = match filter {
            Some(user) => comms.and(user),
            None => comms,
        };
        Self::hook(registry, output, pretty, Some(filter))
    }
}

fn comm_filter(only_id: Option<CommIds>) -> Filter {
    match only_id {
        Some(ids) => filter::comm_ids(ids),
        None => filter::is_comms(),
    }
}

async fn pump<W: Write>(
    drain: &mut MessageDrain<'_>,
    array: &mut JsonArrayWriter<W>,
    filter: Option<&Filter>,
    stats: &mut CaptureStats,
) -> SpyResult<()> {
    while let Some(message) = drain.next_message().await? {
        stats.received += 1;
        if filter.is_some_and(|f| !f.matches(&message)) {
            stats.filtered += 1;
            continue;
        }
        array.write(&message)?;
        stats.written += 1;
    }
    Ok(())
}

/// A running interception capture.
///
/// Finishing unhooks both directions and then closes the array. Dropping
/// an unfinished capture does the same, logging any error.
pub struct HookCapture<'r> {
    registry: &'r HookRegistry,
    callback: MessageCallback,
    array: Arc<Mutex<JsonArrayWriter<Box<dyn Write + Send>>>>,
    finished: bool,
}

impl HookCapture<'_> {
    /// Messages written so far
    pub fn elements(&self) -> u64 {
        self.array.lock().elements()
    }

    /// Stop capturing; returns the number of messages written
    pub fn finish(mut self) -> SpyResult<u64> {
        self.stop()
    }

    fn stop(&mut self) -> SpyResult<u64> {
        self.finished = true;
        self.registry.unhook_send(&self.callback);
        self.registry.unhook_recv(&self.callback);

        let mut array = self.array.lock();
        array.close()?;
        debug!(elements = array.elements(), "Hook capture finished");
        Ok(array.elements())
    }
}

impl Drop for HookCapture<'_> {
    fn drop(&mut self) {
        if !self.finished {
            if let Err(e) = self.stop() {
                warn!("Failed to finish hook capture: {}", e);
            }
        }
    }
}

impl std::fmt::Debug for HookCapture<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookCapture")
            .field("finished", &self.finished)
            .finish_non_exhaustive()
    }
}
