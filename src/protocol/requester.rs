//! Requester role.
//!
//! Each outbound operation opens a pending request, sends, then waits in
//! slices until a correlated reply lands in the pending table or the
//! per-attempt deadline passes. A missed deadline resends the identical
//! payload, up to `request_attempts` sends in total.
//!
//! Replies are matched by kind and key (or cursor), never by arrival
//! order, so any number of requests may be in flight at once. A reply
//! resolves the oldest unresolved request with the same correlation.
//!
//! Every node with settings answers keyed requests, including nodes that
//! do not hold the key. Their negative replies are provisional: they are
//! kept until the attempt deadline and replaced by any answer from the
//! owner that arrives before it.

use core::time::Duration;
use std::time::Instant;

use crate::commit::{self, WriteSource};
use crate::context::Shared;
use crate::error::{Error, Result, WriteResult};
use crate::store::{AccessMode, SettingEntry, validate_key_part};
use crate::types::TypeDescriptor;

use super::codec::{
    EnumerationRecord, MsgKind, Payload, RegisterReply, RegisterStatus, SettingText, WriteReply,
    decode_cursor, encode_cursor,
};
use super::transport::SettingsApi;

/// A peer's setting as seen by the requester.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SettingRecord {
    pub section: String,
    pub name: String,
    pub value: String,
    /// Type as described by the peer, when it sent one.
    pub ty: Option<TypeDescriptor>,
}

impl SettingRecord {
    fn from_text(text: &SettingText<'_>) -> Option<Self> {
        Some(Self {
            section: text.section.to_owned(),
            name: text.name.to_owned(),
            value: text.value?.to_owned(),
            ty: text.type_tag.and_then(TypeDescriptor::parse),
        })
    }
}

// ───────────────────────────────────────────────────────────────
// Pending table
// ───────────────────────────────────────────────────────────────

/// What a pending request is waiting for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum Expect {
    Read { section: String, name: String },
    Write { section: String, name: String },
    Register { section: String, name: String },
    Enumerate(u16),
}

/// A correlated reply.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Reply {
    /// `None` is the responder's negative reply for an unknown key.
    Read(Option<SettingRecord>),
    Written {
        result: WriteResult,
    },
    Registered {
        status: RegisterStatus,
        value: Option<String>,
    },
    Entry(SettingRecord),
    /// The peer holds an entry at this cursor but cannot format it.
    Skipped,
    End,
}

impl Reply {
    /// Negative answers any node may give for a key it does not hold.
    fn is_provisional(&self) -> bool {
        matches!(
            self,
            Self::Read(None)
                | Self::Written {
                    result: WriteResult::SettingRejected
                }
        )
    }
}

struct PendingRequest {
    id: u32,
    expect: Expect,
    reply: Option<Reply>,
}

impl PendingRequest {
    fn is_settled(&self) -> bool {
        self.reply.as_ref().is_some_and(|r| !r.is_provisional())
    }

    /// Whether `reply` should be stored here: anything fills an empty
    /// request, only a definitive reply replaces a provisional one.
    fn accepts(&self, reply: &Reply) -> bool {
        match &self.reply {
            None => true,
            Some(held) => held.is_provisional() && !reply.is_provisional(),
        }
    }
}

/// In-flight requester operations.
#[derive(Default)]
pub(crate) struct PendingTable {
    next_id: u32,
    requests: Vec<PendingRequest>,
}

impl PendingTable {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn open(&mut self, expect: Expect) -> u32 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        self.requests.push(PendingRequest {
            id,
            expect,
            reply: None,
        });
        id
    }

    /// Record `reply` on the oldest request expecting it that can still
    /// take it. `false` if nobody is waiting for it.
    pub(crate) fn resolve(&mut self, expect: &Expect, reply: Reply) -> bool {
        match self
            .requests
            .iter_mut()
            .find(|r| r.expect == *expect && r.accepts(&reply))
        {
            Some(req) => {
                req.reply = Some(reply);
                true
            }
            None => false,
        }
    }

    /// Remove request `id` and return its reply once it is definitive.
    /// With `settle`, a provisional reply is returned as well.
    pub(crate) fn take(&mut self, id: u32, settle: bool) -> Option<Reply> {
        let pos = self
            .requests
            .iter()
            .position(|r| r.id == id && (r.is_settled() || (settle && r.reply.is_some())))?;
        self.requests.remove(pos).reply
    }

    /// Drop request `id` whether or not it was answered.
    pub(crate) fn close(&mut self, id: u32) {
        self.requests.retain(|r| r.id != id);
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.requests.len()
    }
}

// ───────────────────────────────────────────────────────────────
// Outbound operations
// ───────────────────────────────────────────────────────────────

impl<A: SettingsApi> Shared<A> {
    /// Send `payload` and wait for the reply correlated by `expect`.
    pub(crate) fn transact(&self, kind: MsgKind, payload: &[u8], expect: Expect) -> Result<Reply> {
        let timeout = Duration::from_millis(u64::from(self.config.request_timeout_ms));
        let slice = Duration::from_millis(u64::from(self.config.wait_slice_ms));
        let id = self.with_state(|s| s.pending.open(expect));

        let mut delivered = false;
        let mut last_err = None;

        for attempt in 1..=self.config.request_attempts {
            if let Err(e) = self.api.send_from(kind.id(), payload, self.sender_id) {
                api_log!(
                    self.api,
                    Warn,
                    "settings[{}]: send {:?} failed (attempt {}): {}",
                    self.sender_id,
                    kind,
                    attempt,
                    e
                );
                last_err = Some(e);
                continue;
            }
            delivered = true;

            let deadline = Instant::now() + timeout;
            loop {
                if let Some(reply) = self.with_state(|s| s.pending.take(id, false)) {
                    return Ok(reply);
                }
                let now = Instant::now();
                if now >= deadline {
                    break;
                }
                self.api.wait(slice.min(deadline - now));
            }
            if let Some(reply) = self.with_state(|s| s.pending.take(id, true)) {
                return Ok(reply);
            }
            api_log!(
                self.api,
                Debug,
                "settings[{}]: {:?} attempt {} timed out",
                self.sender_id,
                kind,
                attempt
            );
        }

        self.with_state(|s| s.pending.close(id));
        match last_err {
            Some(e) if !delivered => Err(Error::Transport(e)),
            _ => {
                api_log!(self.api, Warn, "settings[{}]: {:?} timed out", self.sender_id, kind);
                Err(Error::Timeout)
            }
        }
    }

    pub(crate) fn read_remote(&self, section: &str, name: &str) -> Result<SettingRecord> {
        let payload = key_payload(SettingText::key(section, name))?;
        let expect = Expect::Read {
            section: section.to_owned(),
            name: name.to_owned(),
        };
        match self.transact(MsgKind::ReadRequest, &payload, expect)? {
            Reply::Read(Some(rec)) => Ok(rec),
            Reply::Read(None) => Err(Error::SettingRejected),
            _ => Err(Error::ServiceFailed),
        }
    }

    pub(crate) fn write_remote(&self, section: &str, name: &str, value: &str) -> Result<()> {
        if value.contains('\0') {
            return Err(Error::InvalidArgument);
        }
        let payload = key_payload(SettingText::with_value(section, name, value))?;
        let expect = Expect::Write {
            section: section.to_owned(),
            name: name.to_owned(),
        };
        match self.transact(MsgKind::WriteRequest, &payload, expect)? {
            Reply::Written { result } => result.into_result(),
            _ => Err(Error::ServiceFailed),
        }
    }

    pub(crate) fn read_by_index(&self, cursor: u16) -> Result<Option<SettingRecord>> {
        let payload = encode_cursor(cursor).map_err(|_| Error::InvalidArgument)?;
        match self.transact(MsgKind::EnumerationRequest, &payload, Expect::Enumerate(cursor))? {
            Reply::Entry(rec) => Ok(Some(rec)),
            Reply::Skipped => Err(Error::SettingRejected),
            Reply::End => Ok(None),
            _ => Err(Error::ServiceFailed),
        }
    }

    /// Register handshake with a settings daemon.
    ///
    /// `Some(value)` when the daemon holds a stored value that differs
    /// from ours and should replace it.
    pub(crate) fn announce(&self, entry: &SettingEntry) -> Result<Option<String>> {
        let (value, tag) = self.with_state(|s| s.describe(entry))?;
        let payload = SettingText::full(entry.section(), entry.name(), &value, &tag)
            .encode()
            .map_err(|_| Error::InvalidArgument)?;
        let expect = Expect::Register {
            section: entry.section().to_owned(),
            name: entry.name().to_owned(),
        };
        match self.transact(MsgKind::Register, &payload, expect)? {
            Reply::Registered {
                status: RegisterStatus::Stored,
                value: Some(stored),
            } if stored != value => Ok(Some(stored)),
            Reply::Registered {
                status: RegisterStatus::ParseFailed,
                ..
            } => {
                api_log!(
                    self.api,
                    Warn,
                    "settings: daemon could not parse {}.{} = {}",
                    entry.section(),
                    entry.name(),
                    value
                );
                Ok(None)
            }
            Reply::Registered { .. } => Ok(None),
            _ => Err(Error::ServiceFailed),
        }
    }

    /// Read a peer's value and commit it to the local watch entry.
    pub(crate) fn sync_watch(&self, section: &str, name: &str) -> Result<()> {
        let entry = self.with_state(|s| s.entries.find(section, name).cloned())?;
        if entry.mode() != AccessMode::WatchOnly {
            return Err(Error::InvalidArgument);
        }
        let rec = self.read_remote(section, name)?;
        let parsed = self.with_state(|s| s.types.parse(entry.ty(), &rec.value, entry.slot().len()));
        commit::apply(&entry, parsed, WriteSource::WatchUpdate).into_result()
    }

    // ── Inbound replies ───────────────────────────────────────

    fn resolve(&self, expect: Expect, reply: Reply) {
        if self.with_state(|s| s.pending.resolve(&expect, reply)) {
            self.api.signal();
        } else {
            api_log!(self.api, Debug, "settings: unsolicited reply {:?}", expect);
        }
    }

    pub(crate) fn handle_read_response(&self, sender: u16, payload: &[u8]) {
        let msg = match SettingText::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                api_log!(self.api, Warn, "settings[{}]: bad read response: {}", sender, e);
                return;
            }
        };
        let expect = Expect::Read {
            section: msg.section.to_owned(),
            name: msg.name.to_owned(),
        };
        self.resolve(expect, Reply::Read(SettingRecord::from_text(&msg)));
    }

    pub(crate) fn handle_write_response(&self, sender: u16, payload: &[u8]) {
        let msg = match WriteReply::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                api_log!(self.api, Warn, "settings[{}]: bad write response: {}", sender, e);
                return;
            }
        };
        let Some(result) = WriteResult::from_u8(msg.result) else {
            api_log!(
                self.api,
                Warn,
                "settings[{}]: unknown write result {}",
                sender,
                msg.result
            );
            return;
        };
        let expect = Expect::Write {
            section: msg.setting.section.to_owned(),
            name: msg.setting.name.to_owned(),
        };
        self.resolve(expect, Reply::Written { result });
    }

    pub(crate) fn handle_enumeration_response(&self, sender: u16, payload: &[u8]) {
        let rec = match EnumerationRecord::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                api_log!(self.api, Warn, "settings[{}]: bad enumeration response: {}", sender, e);
                return;
            }
        };
        let reply = match SettingRecord::from_text(&rec.setting) {
            Some(record) => Reply::Entry(record),
            None => {
                api_log!(
                    self.api,
                    Warn,
                    "settings[{}]: {}.{} at cursor {} is unreadable",
                    sender,
                    rec.setting.section,
                    rec.setting.name,
                    rec.cursor
                );
                Reply::Skipped
            }
        };
        self.resolve(Expect::Enumerate(rec.cursor), reply);
    }

    pub(crate) fn handle_enumeration_end(&self, sender: u16, payload: &[u8]) {
        match decode_cursor(payload) {
            Ok(cursor) => self.resolve(Expect::Enumerate(cursor), Reply::End),
            Err(e) => {
                api_log!(self.api, Warn, "settings[{}]: bad enumeration end: {}", sender, e);
            }
        }
    }

    pub(crate) fn handle_register_response(&self, sender: u16, payload: &[u8]) {
        let msg = match RegisterReply::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                api_log!(self.api, Warn, "settings[{}]: bad register response: {}", sender, e);
                return;
            }
        };
        let expect = Expect::Register {
            section: msg.setting.section.to_owned(),
            name: msg.setting.name.to_owned(),
        };
        let reply = Reply::Registered {
            status: msg.status,
            value: msg.setting.value.map(str::to_owned),
        };
        self.resolve(expect, reply);
    }
}

/// Encode a keyed request after checking the key parts.
fn key_payload(text: SettingText<'_>) -> Result<Payload> {
    validate_key_part(text.section)?;
    validate_key_part(text.name)?;
    text.encode().map_err(|_| Error::InvalidArgument)
}
