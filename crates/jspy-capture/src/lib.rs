//! Message capture
//!
//! Two ways to observe kernel traffic:
//!
//! - **Polling**: attach to a running kernel as a client and drain one of
//!   its channels ([`drain::MessageDrain`], [`Spy::log_iopub`] and friends)
//! - **Interception**: wrap an in-process session's send/recv
//!   ([`Spy::hook`], built on [`jspy_hook::HookRegistry`])
//!
//! Both write a streaming JSON array through [`jspy_export::JsonArrayWriter`].

pub mod channel;
pub mod drain;
pub mod memory;
pub mod spy;
pub mod wire;

#[cfg(feature = "zmq")]
pub mod zmq;

pub use channel::{ChannelError, ChannelKind, ChannelResult, KernelChannel, KernelClient};
pub use drain::{DrainEvent, MessageDrain, DEFAULT_POLL_INTERVAL};
pub use memory::{MemoryChannel, MemoryClient, MemoryFeed};
pub use spy::{CaptureStats, HookCapture, LogOptions, Spy, SpyError, SpyResult};

#[cfg(feature = "zmq")]
pub use zmq::ZmqClient;

pub use tokio_util::sync::CancellationToken;
