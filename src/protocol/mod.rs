//! Settings protocol engine.
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────┐
//! │                    Protocol Engine                        │
//! │                                                           │
//! │  inbound ──▶ Shared::dispatch ─┬─▶ responder (read/write/ │
//! │  handler                       │    enumeration requests) │
//! │                                ├─▶ requester (responses → │
//! │                                │    PendingTable, signal) │
//! │                                └─▶ watch (broadcasts)     │
//! │                                                           │
//! │  requester call ──▶ send_from ──▶ wait ⟲ ──▶ reply        │
//! └───────────────────────────────────────────────────────────┘
//! ```
//!
//! Every role is transport-decoupled: handlers receive `(sender, payload)`
//! from whatever [`transport::SettingsApi`] the context was built with.

pub mod codec;
pub mod requester;
pub mod responder;
pub mod transport;
pub mod watch;
