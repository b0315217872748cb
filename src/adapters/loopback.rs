//! In-process message bus.
//!
//! Every [`LoopbackNode`] attached to a [`LoopbackBus`] implements
//! [`SettingsApi`]. A send is delivered synchronously, on the sending
//! thread, to every handler registered for that kind by the *other*
//! nodes. No bus lock is held while handlers run, so a handler may send
//! again (a responder replying from inside a requester's send).
//!
//! Fault injection for tests: a node can be muted (sends are counted and
//! dropped) or told to drop its next `n` sends.

use core::cell::RefCell;
use core::fmt;
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use embassy_sync::blocking_mutex::CriticalSectionMutex;

use crate::error::ApiError;
use crate::protocol::transport::{CallbackToken, MessageHandler, SettingsApi, WaitStatus};

use super::signal_wait::SignalWaiter;

/// A frame as it crossed the bus.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub kind: u16,
    pub sender: u16,
    pub payload: Vec<u8>,
    /// `false` if the frame was dropped by fault injection.
    pub delivered: bool,
}

struct Route {
    token: CallbackToken,
    node: u16,
    kind: u16,
    handler: MessageHandler,
}

#[derive(Default)]
struct BusState {
    routes: Vec<Route>,
    next_token: u32,
    frames: Vec<Frame>,
}

/// Shared medium connecting loopback nodes.
pub struct LoopbackBus {
    state: CriticalSectionMutex<RefCell<BusState>>,
}

impl LoopbackBus {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            state: CriticalSectionMutex::new(RefCell::new(BusState::default())),
        })
    }

    /// Attach a node whose default sender id is `id`.
    pub fn node(self: &Arc<Self>, id: u16) -> Arc<LoopbackNode> {
        Arc::new(LoopbackNode {
            bus: Arc::clone(self),
            id,
            waiter: SignalWaiter::new(),
            muted: AtomicBool::new(false),
            drop_next: AtomicU32::new(0),
        })
    }

    /// Deliver a raw frame to every handler for `kind`, as if a node with
    /// id `sender` had sent it.
    pub fn inject(&self, kind: u16, sender: u16, payload: &[u8]) {
        self.deliver(None, kind, sender, payload);
    }

    /// Every frame sent so far, oldest first.
    pub fn frames(&self) -> Vec<Frame> {
        self.state.lock(|s| s.borrow().frames.clone())
    }

    /// Number of frames of `kind` sent so far (delivered or not).
    pub fn sent_count(&self, kind: u16) -> usize {
        self.state
            .lock(|s| s.borrow().frames.iter().filter(|f| f.kind == kind).count())
    }

    pub fn clear_frames(&self) {
        self.state.lock(|s| s.borrow_mut().frames.clear());
    }

    fn record(&self, kind: u16, sender: u16, payload: &[u8], delivered: bool) {
        self.state.lock(|s| {
            s.borrow_mut().frames.push(Frame {
                kind,
                sender,
                payload: payload.to_vec(),
                delivered,
            });
        });
    }

    fn deliver(&self, from_node: Option<u16>, kind: u16, sender: u16, payload: &[u8]) {
        let handlers: Vec<MessageHandler> = self.state.lock(|s| {
            s.borrow()
                .routes
                .iter()
                .filter(|r| r.kind == kind && Some(r.node) != from_node)
                .map(|r| Arc::clone(&r.handler))
                .collect()
        });
        for handler in handlers {
            handler(sender, payload);
        }
    }

    fn add_route(&self, node: u16, kind: u16, handler: MessageHandler) -> CallbackToken {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let token = CallbackToken(s.next_token);
            s.next_token = s.next_token.wrapping_add(1);
            s.routes.push(Route {
                token,
                node,
                kind,
                handler,
            });
            token
        })
    }

    fn remove_route(&self, node: u16, token: CallbackToken) -> bool {
        self.state.lock(|s| {
            let mut s = s.borrow_mut();
            let before = s.routes.len();
            s.routes.retain(|r| !(r.token == token && r.node == node));
            s.routes.len() != before
        })
    }

    /// Number of handlers currently registered by `node`.
    pub fn route_count(&self, node: u16) -> usize {
        self.state
            .lock(|s| s.borrow().routes.iter().filter(|r| r.node == node).count())
    }
}

/// One endpoint on a [`LoopbackBus`].
pub struct LoopbackNode {
    bus: Arc<LoopbackBus>,
    id: u16,
    waiter: SignalWaiter,
    muted: AtomicBool,
    drop_next: AtomicU32,
}

impl LoopbackNode {
    pub fn id(&self) -> u16 {
        self.id
    }

    pub fn bus(&self) -> &Arc<LoopbackBus> {
        &self.bus
    }

    /// Drop (but still record) every frame this node sends.
    pub fn set_muted(&self, muted: bool) {
        self.muted.store(muted, Ordering::SeqCst);
    }

    /// Drop the next `n` frames this node sends.
    pub fn drop_next(&self, n: u32) {
        self.drop_next.store(n, Ordering::SeqCst);
    }

    fn should_drop(&self) -> bool {
        if self.muted.load(Ordering::SeqCst) {
            return true;
        }
        self.drop_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

impl fmt::Debug for LoopbackNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LoopbackNode")
            .field("id", &self.id)
            .field("muted", &self.muted.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}

impl SettingsApi for LoopbackNode {
    fn send(&self, kind: u16, payload: &[u8]) -> Result<(), ApiError> {
        self.send_from(kind, payload, self.id)
    }

    fn send_from(&self, kind: u16, payload: &[u8], sender_id: u16) -> Result<(), ApiError> {
        let dropped = self.should_drop();
        self.bus.record(kind, sender_id, payload, !dropped);
        if !dropped {
            self.bus.deliver(Some(self.id), kind, sender_id, payload);
        }
        Ok(())
    }

    fn register_callback(
        &self,
        kind: u16,
        handler: MessageHandler,
    ) -> Result<CallbackToken, ApiError> {
        Ok(self.bus.add_route(self.id, kind, handler))
    }

    fn unregister_callback(&self, token: CallbackToken) -> Result<(), ApiError> {
        if self.bus.remove_route(self.id, token) {
            Ok(())
        } else {
            Err(ApiError::UnknownToken)
        }
    }

    fn wait_init(&self) -> Result<(), ApiError> {
        self.waiter.reset();
        Ok(())
    }

    fn wait(&self, timeout: Duration) -> WaitStatus {
        self.waiter.wait(timeout)
    }

    fn signal(&self) {
        self.waiter.signal();
    }
}
