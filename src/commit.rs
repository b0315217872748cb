//! Write-commit controller.
//!
//! Every value change of a registered setting goes through [`apply`]:
//! local registration, remote writes, watch updates and values handed
//! back by a settings daemon. The new bytes are stored first, then the
//! notify callback runs and may read them back. A veto restores the
//! snapshot taken before the store.
//!
//! Callers must not hold any context lock when calling [`apply`]; notify
//! callbacks are free to call back into the context.

use core::fmt;
use std::sync::Arc;

use crate::error::{Error, WriteResult};
use crate::slot::{SettingSlot, SlotBytes};
use crate::store::{AccessMode, SettingEntry};

/// Reason a notify callback refuses a freshly stored value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Veto {
    /// Generic failure; reported as `ServiceFailed`.
    Failed,
    /// The value is outside what the owner accepts; reported as
    /// `ValueRejected`.
    ValueRejected,
}

impl fmt::Display for Veto {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Failed => write!(f, "notify failed"),
            Self::ValueRejected => write!(f, "notify rejected value"),
        }
    }
}

/// Callback run after a new value has been stored in the slot.
pub type Notify = Arc<dyn Fn() -> Result<(), Veto> + Send + Sync>;

/// Origin of a value change. Only remote writes are subject to the
/// access-mode checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteSource {
    Registration,
    RemoteWrite,
    WatchUpdate,
    Announce,
}

// ───────────────────────────────────────────────────────────────
// Slot transaction
// ───────────────────────────────────────────────────────────────

/// Snapshot of a slot taken before a write, restorable on veto.
pub struct SlotTransaction<'a> {
    slot: &'a SettingSlot,
    saved: SlotBytes,
}

impl<'a> SlotTransaction<'a> {
    pub fn begin(slot: &'a SettingSlot) -> Self {
        Self {
            saved: slot.snapshot(),
            slot,
        }
    }

    /// Store `bytes` in the slot. `false` on a length mismatch, in which
    /// case the slot is unchanged.
    pub fn write(&self, bytes: &[u8]) -> bool {
        self.slot.store(bytes)
    }

    /// Keep the written value.
    pub fn commit(self) {}

    /// Put the snapshot back.
    pub fn rollback(self) {
        // Same length as the slot by construction.
        let _ = self.slot.store(&self.saved);
    }
}

// ───────────────────────────────────────────────────────────────
// Commit path
// ───────────────────────────────────────────────────────────────

/// Apply a parsed value to `entry` and run its notify callback.
///
/// `parsed` is the outcome of parsing the incoming text against the
/// entry's type; a parse error is returned as-is without touching the
/// slot. Either the slot holds the new value and the result is `Ok`, or
/// the slot holds its previous value and the result says why.
pub fn apply(
    entry: &SettingEntry,
    parsed: Result<SlotBytes, Error>,
    source: WriteSource,
) -> WriteResult {
    let bytes = match parsed {
        Ok(b) => b,
        Err(e) => return WriteResult::from(e),
    };

    if source == WriteSource::RemoteWrite {
        match entry.mode() {
            AccessMode::Writable => {}
            AccessMode::ReadOnly => return WriteResult::ReadOnly,
            AccessMode::WatchOnly => return WriteResult::ModifyDisabled,
        }
    }

    let txn = SlotTransaction::begin(entry.slot());
    if !txn.write(&bytes) {
        return WriteResult::ServiceFailed;
    }

    let Some(notify) = entry.notify() else {
        txn.commit();
        return WriteResult::Ok;
    };

    match notify() {
        Ok(()) => {
            txn.commit();
            WriteResult::Ok
        }
        Err(veto) => {
            txn.rollback();
            match veto {
                Veto::Failed => WriteResult::ServiceFailed,
                Veto::ValueRejected => WriteResult::ValueRejected,
            }
        }
    }
}

/// Run the commit path with the slot's current contents.
///
/// Used at registration so start-up side effects of the notify callback
/// fire once with the caller's initial value.
pub fn apply_current(entry: &SettingEntry) -> WriteResult {
    let current = entry.slot().snapshot();
    apply(entry, Ok(current), WriteSource::Registration)
}
