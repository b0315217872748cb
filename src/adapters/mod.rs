//! Adapters: concrete host implementations of the transport port.
//!
//! | Adapter       | Provides              | Connects to                 |
//! |---------------|-----------------------|-----------------------------|
//! | `signal_wait` | wait / signal         | embassy `Signal` + timer    |
//! | `loopback`    | SettingsApi           | in-process bus (tests, host |
//! |               |                       | tooling, demos)             |
//!
//! A firmware build plugs its own bus driver in by implementing
//! [`SettingsApi`](crate::protocol::transport::SettingsApi); it can reuse
//! [`SignalWaiter`] for the wait half.

pub mod loopback;
pub mod signal_wait;

pub use loopback::{Frame, LoopbackBus, LoopbackNode};
pub use signal_wait::SignalWaiter;
