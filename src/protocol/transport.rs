//! Transport abstraction: the host capabilities the settings core needs.
//!
//! The core never talks to a bus or an OS directly. Everything goes
//! through [`SettingsApi`], chosen when the context is created:
//!
//! - message I/O: `send`, `send_from`, `register_callback`,
//!   `unregister_callback`
//! - suspension: `wait_init`, `wait`, `wait_deinit`, `signal`
//! - diagnostics: `log`
//!
//! Implementations decide on which execution context registered handlers
//! run. The core is reentrant with respect to those handlers: a handler
//! may run while a requester call on another thread (or further up the
//! same stack, for an event-loop `wait`) is suspended.

use core::fmt;
use core::time::Duration;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use crate::error::ApiError;

/// Inbound message handler: `(sender_id, payload)`.
pub type MessageHandler = Arc<dyn Fn(u16, &[u8]) + Send + Sync>;

/// Handle for a registered callback, used to unregister it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CallbackToken(pub u32);

/// Outcome of a [`SettingsApi::wait`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WaitStatus {
    /// [`SettingsApi::signal`] was called.
    Signaled,
    /// The timeout elapsed without a signal.
    TimedOut,
}

/// Host capability set.
pub trait SettingsApi: Send + Sync {
    /// Send with the host's default sender id.
    fn send(&self, kind: u16, payload: &[u8]) -> Result<(), ApiError>;

    /// Send on behalf of `sender_id`.
    fn send_from(&self, kind: u16, payload: &[u8], sender_id: u16) -> Result<(), ApiError>;

    fn register_callback(&self, kind: u16, handler: MessageHandler)
    -> Result<CallbackToken, ApiError>;

    fn unregister_callback(&self, token: CallbackToken) -> Result<(), ApiError>;

    /// Prepare the wait substrate. Called once when the context is created.
    fn wait_init(&self) -> Result<(), ApiError> {
        Ok(())
    }

    /// Block until [`signal`](Self::signal) is called or `timeout` elapses.
    ///
    /// Spurious early returns are allowed; the core re-checks its pending
    /// table after every return.
    fn wait(&self, timeout: Duration) -> WaitStatus;

    /// Tear down the wait substrate. Called once when the context is dropped.
    fn wait_deinit(&self) -> Result<(), ApiError> {
        Ok(())
    }

    /// Wake a pending [`wait`](Self::wait).
    fn signal(&self);

    /// Diagnostic output. Defaults to the `log` facade.
    fn log(&self, level: log::Level, args: fmt::Arguments<'_>) {
        log::log!(target: "settingsbus", level, "{}", args);
    }
}

impl<T: SettingsApi + ?Sized> SettingsApi for Arc<T> {
    fn send(&self, kind: u16, payload: &[u8]) -> Result<(), ApiError> {
        (**self).send(kind, payload)
    }

    fn send_from(&self, kind: u16, payload: &[u8], sender_id: u16) -> Result<(), ApiError> {
        (**self).send_from(kind, payload, sender_id)
    }

    fn register_callback(
        &self,
        kind: u16,
        handler: MessageHandler,
    ) -> Result<CallbackToken, ApiError> {
        (**self).register_callback(kind, handler)
    }

    fn unregister_callback(&self, token: CallbackToken) -> Result<(), ApiError> {
        (**self).unregister_callback(token)
    }

    fn wait_init(&self) -> Result<(), ApiError> {
        (**self).wait_init()
    }

    fn wait(&self, timeout: Duration) -> WaitStatus {
        (**self).wait(timeout)
    }

    fn wait_deinit(&self) -> Result<(), ApiError> {
        (**self).wait_deinit()
    }

    fn signal(&self) {
        (**self).signal();
    }

    fn log(&self, level: log::Level, args: fmt::Arguments<'_>) {
        (**self).log(level, args);
    }
}

/// A transport that is connected to nothing.
///
/// Sends succeed and go nowhere; no handler is ever invoked. `wait`
/// sleeps for the full timeout. Useful for a node that only exposes
/// settings locally, and as a stand-in during bring-up.
#[derive(Default)]
pub struct NullApi {
    next_token: AtomicU32,
}

impl NullApi {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SettingsApi for NullApi {
    fn send(&self, _kind: u16, _payload: &[u8]) -> Result<(), ApiError> {
        Ok(())
    }

    fn send_from(&self, _kind: u16, _payload: &[u8], _sender_id: u16) -> Result<(), ApiError> {
        Ok(())
    }

    fn register_callback(
        &self,
        _kind: u16,
        _handler: MessageHandler,
    ) -> Result<CallbackToken, ApiError> {
        Ok(CallbackToken(self.next_token.fetch_add(1, Ordering::Relaxed)))
    }

    fn unregister_callback(&self, _token: CallbackToken) -> Result<(), ApiError> {
        Ok(())
    }

    fn wait(&self, timeout: Duration) -> WaitStatus {
        std::thread::sleep(timeout);
        WaitStatus::TimedOut
    }

    fn signal(&self) {}
}
