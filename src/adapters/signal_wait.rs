//! Wait/signal substrate for hosts with threads.
//!
//! A single `embassy-sync` [`Signal`] raced against an `async-io-mini`
//! timer, driven to completion with `futures_lite::future::block_on`.
//! A signal raised while nobody waits is latched and ends the next wait
//! immediately; the requester treats that as a spurious wake-up and
//! re-checks its pending table.
//!
//! The timer runs on the `embassy-time` driver. Host builds get the std
//! driver from `embassy-time`; firmware builds must provide the
//! `_embassy_time_now` / `_embassy_time_schedule_wake` symbols.

use core::time::Duration;

use embassy_sync::blocking_mutex::raw::CriticalSectionRawMutex;
use embassy_sync::signal::Signal;
use futures_lite::future;

#[cfg(not(target_os = "espidf"))]
use embassy_time as _;

use crate::protocol::transport::WaitStatus;

pub struct SignalWaiter {
    signal: Signal<CriticalSectionRawMutex, ()>,
}

impl SignalWaiter {
    pub const fn new() -> Self {
        Self {
            signal: Signal::new(),
        }
    }

    /// Block the calling thread until [`signal`](Self::signal) or `timeout`.
    pub fn wait(&self, timeout: Duration) -> WaitStatus {
        future::block_on(future::or(
            async {
                self.signal.wait().await;
                WaitStatus::Signaled
            },
            async {
                async_io_mini::Timer::after(timeout).await;
                WaitStatus::TimedOut
            },
        ))
    }

    pub fn signal(&self) {
        self.signal.signal(());
    }

    /// Forget a latched signal.
    pub fn reset(&self) {
        self.signal.reset();
    }
}

impl Default for SignalWaiter {
    fn default() -> Self {
        Self::new()
    }
}
