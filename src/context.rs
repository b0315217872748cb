//! Settings context: lifecycle, registration and requester API.
//!
//! [`Settings`] owns one type registry, one entry store and one pending
//! request table, all behind a single critical-section cell in
//! [`Shared`]. Inbound handlers registered with the transport hold a
//! `Weak` reference to that state, so dropping the context is enough to
//! silence them even if the transport delivers a late message.
//!
//! Lock discipline: the state cell is only held for short copy-in /
//! copy-out sections. Notify callbacks, transport sends and waits always
//! run with the cell released, which keeps every entry point reentrant.

use core::cell::RefCell;
use std::sync::{Arc, Weak};

use embassy_sync::blocking_mutex::CriticalSectionMutex;

use crate::commit::{self, Notify, WriteSource};
use crate::config::SettingsConfig;
use crate::error::{Error, Result};
use crate::protocol::codec::{MAX_PAYLOAD, MsgKind, record_len};
use crate::protocol::requester::{PendingTable, SettingRecord};
use crate::protocol::transport::{CallbackToken, MessageHandler, SettingsApi};
use crate::slot::SettingSlot;
use crate::store::{AccessMode, EntryStore, SettingEntry, validate_key_part};
use crate::types::{BOOL_NAMES, SettingsType, TypeRegistry};

// ───────────────────────────────────────────────────────────────
// Shared state
// ───────────────────────────────────────────────────────────────

/// Mutable state of one context.
pub(crate) struct State {
    pub(crate) types: TypeRegistry,
    pub(crate) entries: EntryStore,
    pub(crate) pending: PendingTable,
    pub(crate) tokens: Vec<CallbackToken>,
    pub(crate) responder_active: bool,
}

impl State {
    /// Formatted value and wire type tag of `entry`.
    pub(crate) fn describe(&self, entry: &SettingEntry) -> Result<(String, String)> {
        let value = self.types.format(entry.ty(), &entry.slot().snapshot())?;
        let tag = self
            .types
            .descriptor(entry.ty())
            .ok_or(Error::InvalidArgument)?
            .tag();
        Ok((value, tag))
    }
}

/// State reachable from inbound handlers.
pub(crate) struct Shared<A> {
    pub(crate) api: A,
    pub(crate) sender_id: u16,
    pub(crate) config: SettingsConfig,
    state: CriticalSectionMutex<RefCell<State>>,
}

impl<A: SettingsApi> Shared<A> {
    pub(crate) fn with_state<R>(&self, f: impl FnOnce(&mut State) -> R) -> R {
        self.state.lock(|cell| f(&mut cell.borrow_mut()))
    }

    /// Route one inbound message to its role.
    pub(crate) fn dispatch(&self, kind: MsgKind, sender: u16, payload: &[u8]) {
        match kind {
            // ── Responder ─────────────────────────────────────
            MsgKind::ReadRequest => self.handle_read_request(sender, payload),
            MsgKind::WriteRequest => self.handle_write_request(sender, payload),
            MsgKind::EnumerationRequest => self.handle_enumeration_request(sender, payload),

            // ── Requester ─────────────────────────────────────
            MsgKind::ReadResponse => self.handle_read_response(sender, payload),
            MsgKind::WriteResponse => self.handle_write_response(sender, payload),
            MsgKind::EnumerationResponse => self.handle_enumeration_response(sender, payload),
            MsgKind::EnumerationEnd => self.handle_enumeration_end(sender, payload),
            MsgKind::RegisterResponse => self.handle_register_response(sender, payload),

            // ── Watch ─────────────────────────────────────────
            MsgKind::UpdateBroadcast => self.handle_update_broadcast(sender, payload),

            MsgKind::Register => {
                api_log!(self.api, Debug, "settings[{}]: ignoring register message", sender);
            }
        }
    }

    /// Register one inbound handler for `kind` and remember its token.
    fn subscribe(this: &Arc<Self>, kind: MsgKind) -> Result<()>
    where
        A: 'static,
    {
        let weak: Weak<Self> = Arc::downgrade(this);
        let handler: MessageHandler = Arc::new(move |sender: u16, payload: &[u8]| {
            if let Some(shared) = weak.upgrade() {
                shared.dispatch(kind, sender, payload);
            }
        });
        let token = this.api.register_callback(kind.id(), handler)?;
        this.with_state(|s| s.tokens.push(token));
        Ok(())
    }

    /// Unregister every handler. Failures are logged and skipped.
    fn unsubscribe_all(&self) {
        let tokens = self.with_state(|s| core::mem::take(&mut s.tokens));
        for token in tokens {
            if let Err(e) = self.api.unregister_callback(token) {
                api_log!(self.api, Warn, "settings: unregister {:?} failed: {}", token, e);
            }
        }
    }
}

/// Requester and watch messages are handled for the whole lifetime of the
/// context.
const CLIENT_KINDS: [MsgKind; 6] = [
    MsgKind::ReadResponse,
    MsgKind::WriteResponse,
    MsgKind::EnumerationResponse,
    MsgKind::EnumerationEnd,
    MsgKind::RegisterResponse,
    MsgKind::UpdateBroadcast,
];

/// Responder messages are only handled once something is exposed.
const RESPONDER_KINDS: [MsgKind; 3] = [
    MsgKind::ReadRequest,
    MsgKind::WriteRequest,
    MsgKind::EnumerationRequest,
];

// ───────────────────────────────────────────────────────────────
// Public context
// ───────────────────────────────────────────────────────────────

/// Local view of a registered setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingInfo {
    pub section: String,
    pub name: String,
    pub ty: SettingsType,
    pub mode: AccessMode,
    pub len: usize,
}

/// A settings node: registry, responder, requester and watcher.
pub struct Settings<A: SettingsApi + 'static> {
    shared: Arc<Shared<A>>,
}

impl<A: SettingsApi + 'static> Settings<A> {
    /// Create a context with the default [`SettingsConfig`].
    pub fn new(sender_id: u16, api: A) -> Result<Self> {
        Self::with_config(sender_id, api, SettingsConfig::default())
    }

    /// Create a context. Calls `wait_init` and registers the requester
    /// and watch handlers; responder handlers follow with the first
    /// exposed setting.
    pub fn with_config(sender_id: u16, api: A, config: SettingsConfig) -> Result<Self> {
        if let Err(e) = config.validate() {
            api_log!(api, Error, "settings: invalid config: {}", e);
            return Err(Error::InvalidArgument);
        }
        api.wait_init()?;

        let shared = Arc::new(Shared {
            api,
            sender_id,
            config,
            state: CriticalSectionMutex::new(RefCell::new(State {
                types: TypeRegistry::new(),
                entries: EntryStore::new(),
                pending: PendingTable::new(),
                tokens: Vec::new(),
                responder_active: false,
            })),
        });

        for kind in CLIENT_KINDS {
            if let Err(e) = Shared::subscribe(&shared, kind) {
                shared.unsubscribe_all();
                if let Err(de) = shared.api.wait_deinit() {
                    api_log!(shared.api, Warn, "settings: wait_deinit failed: {}", de);
                }
                return Err(e);
            }
        }

        api_log!(shared.api, Info, "settings[{}]: context created", sender_id);
        Ok(Self { shared })
    }

    /// Drop the context held in `handle` and leave `None` behind.
    pub fn destroy(handle: &mut Option<Self>) {
        drop(handle.take());
    }

    pub fn sender_id(&self) -> u16 {
        self.shared.sender_id
    }

    pub fn config(&self) -> &SettingsConfig {
        &self.shared.config
    }

    pub fn api(&self) -> &A {
        &self.shared.api
    }

    // ── Registration ──────────────────────────────────────────

    /// Register an enumeration type on this context.
    pub fn register_enum(&self, names: &[&str]) -> Result<SettingsType> {
        self.shared.with_state(|s| s.types.register_enum(names))
    }

    /// Register a writable setting. `notify` runs once now with the
    /// slot's initial value, then after every remote write.
    pub fn register_setting(
        &self,
        section: &str,
        name: &str,
        slot: Arc<SettingSlot>,
        ty: SettingsType,
        notify: Option<Notify>,
    ) -> Result<()> {
        self.register(section, name, slot, ty, AccessMode::Writable, notify)
    }

    /// Register a setting that peers can read and enumerate but not write.
    pub fn register_readonly(
        &self,
        section: &str,
        name: &str,
        slot: Arc<SettingSlot>,
        ty: SettingsType,
    ) -> Result<()> {
        self.register(section, name, slot, ty, AccessMode::ReadOnly, None)
    }

    /// Register a local mirror of a peer's setting. `notify` runs after
    /// every update broadcast for the key, even one repeating the value.
    pub fn register_watch(
        &self,
        section: &str,
        name: &str,
        slot: Arc<SettingSlot>,
        ty: SettingsType,
        notify: Option<Notify>,
    ) -> Result<()> {
        self.register(section, name, slot, ty, AccessMode::WatchOnly, notify)
    }

    fn register(
        &self,
        section: &str,
        name: &str,
        slot: Arc<SettingSlot>,
        ty: SettingsType,
        mode: AccessMode,
        notify: Option<Notify>,
    ) -> Result<()> {
        validate_key_part(section)?;
        validate_key_part(name)?;
        let entry = SettingEntry::new(section, name, ty, mode, slot, notify);

        let activate = self.shared.with_state(|s| -> Result<bool> {
            if s.entries.find(section, name).is_ok() {
                return Err(Error::SettingRejected);
            }
            let len = entry.slot().len();
            s.types.check_slot(ty, len)?;
            let tag_len = s.types.descriptor(ty).ok_or(Error::InvalidArgument)?.tag().len();
            let value_len = s.types.max_text_len(ty, len)?;
            if record_len(section.len(), name.len(), value_len, tag_len) > MAX_PAYLOAD {
                return Err(Error::InvalidArgument);
            }
            s.entries.insert(entry.clone())?;
            let activate = mode != AccessMode::WatchOnly && !s.responder_active;
            if activate {
                s.responder_active = true;
            }
            Ok(activate)
        })?;

        if activate {
            if let Err(e) = self.activate_responder() {
                self.shared.with_state(|s| s.entries.remove(section, name).map(drop))?;
                return Err(e);
            }
        }

        let mut announced = false;
        if mode != AccessMode::WatchOnly && self.shared.config.announce_on_register {
            announced = self.announce(&entry);
        }

        if mode == AccessMode::Writable && !announced && entry.notify().is_some() {
            let result = commit::apply_current(&entry);
            if !result.is_ok() {
                api_log!(
                    self.shared.api,
                    Warn,
                    "settings: {}.{} initial value vetoed: {}",
                    section,
                    name,
                    result
                );
            }
        }

        api_log!(self.shared.api, Debug, "settings: registered {}.{} ({:?})", section, name, mode);
        Ok(())
    }

    fn activate_responder(&self) -> Result<()> {
        let mark = self.shared.with_state(|s| s.tokens.len());
        for kind in RESPONDER_KINDS {
            if let Err(e) = Shared::subscribe(&self.shared, kind) {
                api_log!(self.shared.api, Error, "settings: responder setup failed: {}", e);
                let partial = self.shared.with_state(|s| {
                    s.responder_active = false;
                    s.tokens.split_off(mark)
                });
                for token in partial {
                    if let Err(ue) = self.shared.api.unregister_callback(token) {
                        api_log!(
                            self.shared.api,
                            Warn,
                            "settings: unregister {:?} failed: {}",
                            token,
                            ue
                        );
                    }
                }
                return Err(e);
            }
        }
        api_log!(self.shared.api, Info, "settings[{}]: responder active", self.shared.sender_id);
        Ok(())
    }

    /// Announce `entry` to a settings daemon. Returns `true` if the daemon
    /// handed back a stored value that was committed.
    fn announce(&self, entry: &SettingEntry) -> bool {
        let stored = match self.shared.announce(entry) {
            Ok(Some(value)) => value,
            Ok(None) => return false,
            Err(e) => {
                api_log!(
                    self.shared.api,
                    Warn,
                    "settings: announce {}.{} failed: {}",
                    entry.section(),
                    entry.name(),
                    e
                );
                return false;
            }
        };

        let parsed = self
            .shared
            .with_state(|s| s.types.parse(entry.ty(), &stored, entry.slot().len()));
        let result = commit::apply(entry, parsed, WriteSource::Announce);
        if result.is_ok() {
            api_log!(
                self.shared.api,
                Info,
                "settings: {}.{} restored to {}",
                entry.section(),
                entry.name(),
                stored
            );
            true
        } else {
            api_log!(
                self.shared.api,
                Warn,
                "settings: stored value for {}.{} rejected: {}",
                entry.section(),
                entry.name(),
                result
            );
            false
        }
    }

    // ── Local lookups ─────────────────────────────────────────

    pub fn find(&self, section: &str, name: &str) -> Result<SettingInfo> {
        self.shared.with_state(|s| {
            s.entries.find(section, name).map(|e| SettingInfo {
                section: e.section().to_owned(),
                name: e.name().to_owned(),
                ty: e.ty(),
                mode: e.mode(),
                len: e.slot().len(),
            })
        })
    }

    /// Current value of a local setting as wire text.
    pub fn value(&self, section: &str, name: &str) -> Result<String> {
        self.shared.with_state(|s| {
            let entry = s.entries.find(section, name)?;
            s.types.format(entry.ty(), &entry.slot().snapshot())
        })
    }

    /// Number of locally registered settings.
    pub fn len(&self) -> usize {
        self.shared.with_state(|s| s.entries.len())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Value names of an enum (or bool) type registered on this context.
    pub fn enum_names(&self, ty: SettingsType) -> Option<Vec<String>> {
        self.shared.with_state(|s| {
            s.types
                .enum_names(ty)
                .map(|names| names.into_iter().map(str::to_owned).collect())
        })
    }

    // ── Requester: reads ──────────────────────────────────────

    /// Read a setting from whichever peer exposes it.
    pub fn read(&self, section: &str, name: &str) -> Result<SettingRecord> {
        self.shared.read_remote(section, name)
    }

    pub fn read_int(&self, section: &str, name: &str) -> Result<i64> {
        let rec = self.read(section, name)?;
        rec.value.parse().map_err(|_| Error::ParseFailed)
    }

    pub fn read_float(&self, section: &str, name: &str) -> Result<f64> {
        let rec = self.read(section, name)?;
        rec.value.parse().map_err(|_| Error::ParseFailed)
    }

    pub fn read_bool(&self, section: &str, name: &str) -> Result<bool> {
        let rec = self.read(section, name)?;
        match BOOL_NAMES.iter().position(|n| *n == rec.value) {
            Some(i) => Ok(i == 1),
            None => Err(Error::ParseFailed),
        }
    }

    pub fn read_str(&self, section: &str, name: &str) -> Result<String> {
        self.read(section, name).map(|rec| rec.value)
    }

    // ── Requester: writes ─────────────────────────────────────

    /// Write wire text to a peer's setting and wait for its verdict.
    pub fn write(&self, section: &str, name: &str, value: &str) -> Result<()> {
        self.shared.write_remote(section, name, value)
    }

    pub fn write_int(&self, section: &str, name: &str, value: i64) -> Result<()> {
        self.write(section, name, &value.to_string())
    }

    pub fn write_float(&self, section: &str, name: &str, value: f64) -> Result<()> {
        self.write(section, name, &value.to_string())
    }

    pub fn write_bool(&self, section: &str, name: &str, value: bool) -> Result<()> {
        self.write(section, name, BOOL_NAMES[usize::from(value)])
    }

    pub fn write_str(&self, section: &str, name: &str, value: &str) -> Result<()> {
        self.write(section, name, value)
    }

    // ── Requester: directory ──────────────────────────────────

    /// One page of a peer's directory. `None` past the last entry,
    /// `SettingRejected` for an entry the peer cannot format.
    pub fn read_by_index(&self, cursor: u16) -> Result<Option<SettingRecord>> {
        self.shared.read_by_index(cursor)
    }

    /// Walk a peer's whole directory from cursor 0. Entries the peer
    /// cannot format are left out.
    pub fn enumerate(&self) -> Result<Vec<SettingRecord>> {
        let mut records = Vec::new();
        let mut cursor: u16 = 0;
        loop {
            match self.read_by_index(cursor) {
                Ok(Some(rec)) => records.push(rec),
                Ok(None) => break,
                Err(Error::SettingRejected) => {}
                Err(e) => return Err(e),
            }
            cursor = match cursor.checked_add(1) {
                Some(c) => c,
                None => break,
            };
        }
        Ok(records)
    }

    // ── Watch ─────────────────────────────────────────────────

    /// Pull the current remote value into a local watch entry.
    pub fn sync_watch(&self, section: &str, name: &str) -> Result<()> {
        self.shared.sync_watch(section, name)
    }
}

impl<A: SettingsApi + 'static> Drop for Settings<A> {
    fn drop(&mut self) {
        self.shared.unsubscribe_all();
        if let Err(e) = self.shared.api.wait_deinit() {
            api_log!(self.shared.api, Warn, "settings: wait_deinit failed: {}", e);
        }
        api_log!(self.shared.api, Info, "settings[{}]: context destroyed", self.shared.sender_id);
    }
}
