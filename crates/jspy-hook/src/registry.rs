//! Hook registration for a shared session
//!
//! Per direction (send, receive) the registry moves between two states:
//!
//! - **Unhooked**: no callbacks, no captured original, the session runs its own operation
//! - **Hooked**: at least one callback, the original operation captured and the
//!   session's operation replaced by a wrapper
//!
//! The callback list and the captured original change together inside one
//! critical section, so they are always both empty or both populated.
//!
//! A failing callback is logged and skipped; the remaining callbacks still
//! run and the caller of `send`/`recv` gets the original result.

use crate::session::{Received, RecvOp, SendOp, SendRequest, Session, SessionResult};
use jspy_core::Message;
use once_cell::sync::OnceCell;
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

/// Hook error type
#[derive(Error, Debug)]
pub enum HookError {
    #[error("A global hook registry is already installed")]
    AlreadyInstalled,
}

/// Observer invoked with every message passing a hooked operation
#[derive(Clone)]
pub struct MessageCallback {
    inner: Arc<dyn Fn(&Message) -> anyhow::Result<()> + Send + Sync>,
}

impl MessageCallback {
    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&Message) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        Self {
            inner: Arc::new(callback),
        }
    }

    pub fn call(&self, message: &Message) -> anyhow::Result<()> {
        (self.inner)(message)
    }
}

/// Callbacks compare by identity: clones of one callback are equal
impl PartialEq for MessageCallback {
    fn eq(&self, other: &Self) -> bool {
        std::ptr::addr_eq(Arc::as_ptr(&self.inner), Arc::as_ptr(&other.inner))
    }
}

impl Eq for MessageCallback {}

impl fmt::Debug for MessageCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("MessageCallback")
            .field(&Arc::as_ptr(&self.inner).cast::<()>())
            .finish()
    }
}

type SharedCallbacks = Arc<RwLock<Vec<MessageCallback>>>;

/// Outcome of removing a callback
enum Removal<Op> {
    NotRegistered,
    Removed,
    /// The last callback went away; the original must be restored
    Restore(Op),
}

/// Registration state of one direction
struct Direction<Op> {
    callbacks: SharedCallbacks,
    original: Option<Op>,
}

impl<Op> Direction<Op> {
    fn new() -> Self {
        Self {
            callbacks: Arc::default(),
            original: None,
        }
    }

    /// Add a callback. `install` runs only when the direction is unhooked;
    /// it must put the wrapper in place and return the replaced operation.
    fn register(
        &mut self,
        callback: MessageCallback,
        install: impl FnOnce(SharedCallbacks) -> Op,
    ) -> bool {
        let installed = if self.original.is_none() {
            self.original = Some(install(self.callbacks.clone()));
            true
        } else {
            false
        };

        let mut callbacks = self.callbacks.write();
        if !callbacks.contains(&callback) {
            callbacks.push(callback);
        }
        installed
    }

    fn unregister(&mut self, callback: &MessageCallback) -> Removal<Op> {
        let now_empty = {
            let mut callbacks = self.callbacks.write();
            let before = callbacks.len();
            callbacks.retain(|c| c != callback);
            if callbacks.len() == before {
                return Removal::NotRegistered;
            }
            callbacks.is_empty()
        };

        match (now_empty, self.original.take()) {
            (true, Some(original)) => Removal::Restore(original),
            (_, original) => {
                self.original = original;
                Removal::Removed
            }
        }
    }

    fn is_hooked(&self) -> bool {
        self.original.is_some()
    }

    fn len(&self) -> usize {
        self.callbacks.read().len()
    }
}

/// Hand `message` to every callback registered at call time
fn fan_out(direction: &'static str, callbacks: &SharedCallbacks, message: &Message) {
    // Snapshot so callbacks may hook or unhook without deadlocking
    let snapshot: Vec<MessageCallback> = callbacks.read().clone();
    for callback in &snapshot {
        if let Err(e) = callback.call(message) {
            warn!(
                direction,
                msg_type = message.msg_type().unwrap_or("unknown"),
                "Hook callback failed: {:#}",
                e
            );
        }
    }
}

/// Registry of send/recv observers for one session
pub struct HookRegistry {
    session: Arc<Session>,
    send: Mutex<Direction<SendOp>>,
    recv: Mutex<Direction<RecvOp>>,
}

impl HookRegistry {
    pub fn new(session: Arc<Session>) -> Self {
        Self {
            session,
            send: Mutex::new(Direction::new()),
            recv: Mutex::new(Direction::new()),
        }
    }

    pub fn session(&self) -> &Arc<Session> {
        &self.session
    }

    /// Observe every message sent through the session
    pub fn hook_send(&self, callback: MessageCallback) {
        let session = &self.session;
        let installed = self.send.lock().register(callback, |callbacks| {
            let original = session.send_op();
            let inner = original.clone();
            let wrapper: SendOp =
                Arc::new(move |request: &SendRequest| -> SessionResult<Message> {
                    let message = inner(request)?;
                    fan_out("send", &callbacks, &message);
                    Ok(message)
                });
            session.set_send_op(wrapper);
            original
        });
        if installed {
            debug!(session = %session.id(), "Installed send hook");
        }
    }

    /// Observe every message received through the session.
    ///
    /// Only the message is handed to callbacks; the caller still gets the
    /// identities along with it.
    pub fn hook_recv(&self, callback: MessageCallback) {
        let session = &self.session;
        let installed = self.recv.lock().register(callback, |callbacks| {
            let original = session.recv_op();
            let inner = original.clone();
            let wrapper: RecvOp =
                Arc::new(move |channel: &str| -> SessionResult<Option<Received>> {
                    let received = inner(channel)?;
                    if let Some(received) = &received {
                        fan_out("recv", &callbacks, &received.message);
                    }
                    Ok(received)
                });
            session.set_recv_op(wrapper);
            original
        });
        if installed {
            debug!(session = %session.id(), "Installed recv hook");
        }
    }

    /// Stop observing sends. Unknown callbacks are ignored.
    pub fn unhook_send(&self, callback: &MessageCallback) {
        let mut direction = self.send.lock();
        if let Removal::Restore(original) = direction.unregister(callback) {
            self.session.set_send_op(original);
            debug!(session = %self.session.id(), "Restored original send");
        }
    }

    /// Stop observing receives. Unknown callbacks are ignored.
    pub fn unhook_recv(&self, callback: &MessageCallback) {
        let mut direction = self.recv.lock();
        if let Removal::Restore(original) = direction.unregister(callback) {
            self.session.set_recv_op(original);
            debug!(session = %self.session.id(), "Restored original recv");
        }
    }

    pub fn is_send_hooked(&self) -> bool {
        self.send.lock().is_hooked()
    }

    pub fn is_recv_hooked(&self) -> bool {
        self.recv.lock().is_hooked()
    }

    pub fn send_callback_count(&self) -> usize {
        self.send.lock().len()
    }

    pub fn recv_callback_count(&self) -> usize {
        self.recv.lock().len()
    }
}

impl fmt::Debug for HookRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HookRegistry")
            .field("session", &self.session.id())
            .field("send_callbacks", &self.send_callback_count())
            .field("recv_callbacks", &self.recv_callback_count())
            .finish()
    }
}

static GLOBAL: OnceCell<HookRegistry> = OnceCell::new();

/// Install the process-wide registry for the process's session.
///
/// The registry lives until the process exits.
pub fn install_global(session: Arc<Session>) -> Result<&'static HookRegistry, HookError> {
    let mut created = false;
    let registry = GLOBAL.get_or_init(|| {
        created = true;
        HookRegistry::new(session)
    });
    if created {
        Ok(registry)
    } else {
        Err(HookError::AlreadyInstalled)
    }
}

/// The process-wide registry, if installed
pub fn global() -> Option<&'static HookRegistry> {
    GLOBAL.get()
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex as PlMutex;
    use serde_json::json;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::thread;

    fn recorder(log: &Arc<PlMutex<Vec<String>>>, tag: &str) -> MessageCallback {
        let log = log.clone();
        let tag = tag.to_string();
        MessageCallback::new(move |msg| {
            log.lock()
                .push(format!("{}:{}", tag, msg.msg_type().unwrap_or("?")));
            Ok(())
        })
    }

    fn send(session: &Session, msg_type: &str) -> Message {
        session
            .send(&SendRequest::new("iopub", msg_type).with_content(json!({})))
            .unwrap()
    }

    #[test]
    fn test_hook_then_unhook_restores_original() {
        let session = Arc::new(Session::loopback());
        let original = session.send_op();
        let registry = HookRegistry::new(session.clone());
        let log = Arc::default();
        let cb = recorder(&log, "a");

        registry.hook_send(cb.clone());
        assert!(registry.is_send_hooked());
        assert!(!Arc::ptr_eq(&session.send_op(), &original));

        send(&session, "stream");
        assert_eq!(*log.lock(), vec!["a:stream"]);

        registry.unhook_send(&cb);
        assert!(!registry.is_send_hooked());
        assert_eq!(registry.send_callback_count(), 0);
        assert!(Arc::ptr_eq(&session.send_op(), &original));

        send(&session, "stream");
        assert_eq!(log.lock().len(), 1);
    }

    #[test]
    fn test_rehook_recaptures() {
        let session = Arc::new(Session::loopback());
        let original = session.send_op();
        let registry = HookRegistry::new(session.clone());
        let log = Arc::default();
        let cb = recorder(&log, "a");

        registry.hook_send(cb.clone());
        registry.unhook_send(&cb);
        registry.hook_send(cb.clone());
        send(&session, "status");
        registry.unhook_send(&cb);

        assert_eq!(*log.lock(), vec!["a:status"]);
        assert!(Arc::ptr_eq(&session.send_op(), &original));
    }

    #[test]
    fn test_two_callbacks_each_called_once_in_order() {
        let session = Arc::new(Session::loopback());
        let original = session.send_op();
        let registry = HookRegistry::new(session.clone());
        let log = Arc::default();
        let a = recorder(&log, "a");
        let b = recorder(&log, "b");

        registry.hook_send(a.clone());
        registry.hook_send(b.clone());
        send(&session, "execute_result");
        assert_eq!(*log.lock(), vec!["a:execute_result", "b:execute_result"]);

        // Removing one keeps the wrapper for the other
        registry.unhook_send(&a);
        assert!(registry.is_send_hooked());
        send(&session, "status");
        assert_eq!(log.lock().last().unwrap(), "b:status");

        registry.unhook_send(&b);
        assert!(Arc::ptr_eq(&session.send_op(), &original));
    }

    #[test]
    fn test_duplicate_hook_is_single_registration() {
        let session = Arc::new(Session::loopback());
        let registry = HookRegistry::new(session.clone());
        let log = Arc::default();
        let cb = recorder(&log, "a");

        registry.hook_send(cb.clone());
        registry.hook_send(cb.clone());
        assert_eq!(registry.send_callback_count(), 1);

        send(&session, "stream");
        assert_eq!(log.lock().len(), 1);

        registry.unhook_send(&cb);
        assert!(!registry.is_send_hooked());
    }

    #[test]
    fn test_unhook_unknown_is_noop() {
        let session = Arc::new(Session::loopback());
        let original = session.send_op();
        let registry = HookRegistry::new(session.clone());
        let log = Arc::default();
        let known = recorder(&log, "a");
        let stranger = recorder(&log, "b");

        registry.unhook_send(&stranger);
        assert!(!registry.is_send_hooked());
        assert!(Arc::ptr_eq(&session.send_op(), &original));

        registry.hook_send(known.clone());
        registry.unhook_send(&stranger);
        assert!(registry.is_send_hooked());
        assert_eq!(registry.send_callback_count(), 1);
    }

    #[test]
    fn test_recv_hook_returns_idents() {
        let session = Arc::new(Session::loopback());
        let original = session.recv_op();
        let registry = HookRegistry::new(session.clone());
        let log = Arc::default();
        let cb = recorder(&log, "r");

        let mut request = SendRequest::new("shell", "execute_request");
        request.idents = vec![b"client-1".to_vec()];
        let sent = session.send(&request).unwrap();

        registry.hook_recv(cb.clone());
        assert!(session.recv("iopub").unwrap().is_none());
        let received = session.recv("shell").unwrap().unwrap();
        assert_eq!(received.idents, vec![b"client-1".to_vec()]);
        assert_eq!(received.message, sent);
        assert_eq!(*log.lock(), vec!["r:execute_request"]);

        registry.unhook_recv(&cb);
        assert!(Arc::ptr_eq(&session.recv_op(), &original));
    }

    #[test]
    fn test_failing_callback_is_isolated() {
        let session = Arc::new(Session::loopback());
        let registry = HookRegistry::new(session.clone());
        let log = Arc::default();
        let failing = MessageCallback::new(|_| anyhow::bail!("observer broke"));
        let healthy = recorder(&log, "ok");

        registry.hook_send(failing);
        registry.hook_send(healthy);

        let sent = session.send(&SendRequest::new("iopub", "stream"));
        assert!(sent.is_ok());
        assert_eq!(*log.lock(), vec!["ok:stream"]);
    }

    #[test]
    fn test_callback_may_unhook_itself() {
        let session = Arc::new(Session::loopback());
        let original = session.send_op();
        let registry = Arc::new(HookRegistry::new(session.clone()));
        let calls = Arc::new(AtomicUsize::new(0));

        let slot: Arc<PlMutex<Option<MessageCallback>>> = Arc::default();
        let cb = {
            let registry = registry.clone();
            let slot = slot.clone();
            let calls = calls.clone();
            MessageCallback::new(move |_| {
                calls.fetch_add(1, Ordering::SeqCst);
                if let Some(me) = slot.lock().take() {
                    registry.unhook_send(&me);
                }
                Ok(())
            })
        };
        *slot.lock() = Some(cb.clone());
        registry.hook_send(cb);

        send(&session, "stream");
        send(&session, "stream");
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(Arc::ptr_eq(&session.send_op(), &original));
    }

    #[test]
    fn test_concurrent_hook_unhook_restores_original() {
        let session = Arc::new(Session::loopback());
        let original = session.send_op();
        let registry = Arc::new(HookRegistry::new(session.clone()));
        let calls = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let registry = registry.clone();
                let session = session.clone();
                let calls = calls.clone();
                thread::spawn(move || {
                    for _ in 0..50 {
                        let calls = calls.clone();
                        let cb = MessageCallback::new(move |_| {
                            calls.fetch_add(1, Ordering::Relaxed);
                            Ok(())
                        });
                        registry.hook_send(cb.clone());
                        session
                            .send(&SendRequest::new("iopub", "stream"))
                            .unwrap();
                        registry.unhook_send(&cb);
                        // Drain so the loopback queue stays small
                        while session.recv("iopub").unwrap().is_some() {}
                    }
                })
            })
            .collect();

        for handle in handles {
            handle.join().unwrap();
        }

        assert!(!registry.is_send_hooked());
        assert_eq!(registry.send_callback_count(), 0);
        assert!(Arc::ptr_eq(&session.send_op(), &original));
        assert!(calls.load(Ordering::Relaxed) >= 400);

        // Still hookable afterwards
        let log = Arc::default();
        let cb = recorder(&log, "late");
        registry.hook_send(cb.clone());
        send(&session, "status");
        registry.unhook_send(&cb);
        assert_eq!(*log.lock(), vec!["late:status"]);
    }

    #[test]
    fn test_global_registry_installs_once() {
        let session = Arc::new(Session::loopback());
        let first = install_global(session.clone());
        let second = install_global(Arc::new(Session::loopback()));

        // Only this test touches the global registry
        assert!(first.is_ok());
        assert!(matches!(second, Err(HookError::AlreadyInstalled)));
        assert_eq!(global().unwrap().session().id(), session.id());
    }
}
