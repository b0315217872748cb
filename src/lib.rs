//! Settings registry and synchronization protocol for nodes on a shared
//! message bus.
//!
//! A node registers named, typed settings bound to its own memory; peers
//! read, write, enumerate and watch them over any transport that
//! implements [`SettingsApi`]. Remote writes are validated, stored, and
//! handed to the owner's notify callback, which can veto and roll back.
//!
//! ```text
//!  ┌──────────────┐  register   ┌──────────────────────────────────┐
//!  │ application  │────────────▶│ Settings<A>                      │
//!  │  (slots)     │◀── notify ──│  TypeRegistry  EntryStore        │
//!  └──────────────┘             │  commit        PendingTable      │
//!                               │  responder / requester / watch   │
//!                               └───────────────┬──────────────────┘
//!                                               │ SettingsApi
//!                                    ┌──────────▼─────────┐
//!                                    │ bus / LoopbackBus  │
//!                                    └────────────────────┘
//! ```

#![deny(unused_must_use)]

/// Log through the host's [`SettingsApi::log`].
macro_rules! api_log {
    ($api:expr, $lvl:ident, $($arg:tt)+) => {
        $crate::protocol::transport::SettingsApi::log(
            &$api,
            ::log::Level::$lvl,
            format_args!($($arg)+),
        )
    };
}

pub mod adapters;
pub mod commit;
pub mod config;
pub mod context;
pub mod protocol;
pub mod slot;
pub mod store;
pub mod types;

mod error;

pub use commit::{Notify, Veto, WriteSource};
pub use config::{ConfigError, SettingsConfig};
pub use context::{SettingInfo, Settings};
pub use error::{ApiError, Error, Result, WriteResult};
pub use protocol::requester::SettingRecord;
pub use protocol::transport::{CallbackToken, MessageHandler, NullApi, SettingsApi, WaitStatus};
pub use slot::SettingSlot;
pub use store::AccessMode;
pub use types::{SettingsType, TypeDescriptor};
