//! Session interception
//!
//! In-process capture works by wrapping a live [`Session`]'s `send` and
//! `recv` operations. Every wrapped call runs the original operation and
//! then hands the resulting message to each registered callback.
//!
//! Several observers can hook the same session. The wrapper is installed
//! by the first registration of a direction and the original operation is
//! put back when the last callback of that direction unhooks. See
//! [`HookRegistry`].
//!
//! Callbacks run synchronously on the thread performing the send or
//! receive. A slow callback therefore stalls the kernel's own message path.

pub mod registry;
pub mod session;

pub use registry::{global, install_global, HookError, HookRegistry, MessageCallback};
pub use session::{Received, RecvOp, SendOp, SendRequest, Session, SessionError, SessionResult};
