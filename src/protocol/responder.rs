//! Responder role: answers read, write and enumeration requests for the
//! settings registered on this node.
//!
//! Unknown keys get an explicit negative reply: a key-only read-response,
//! a `SettingRejected` write-response, or an enumeration-end for a cursor
//! past the last entry. An entry whose value cannot be formatted is
//! answered key-only both by read and by enumeration, so a directory walk
//! pages past it. Requesters settle on a negative reply after one attempt
//! window instead of burning their retry budget.

use crate::commit::{self, WriteSource};
use crate::context::Shared;
use crate::error::WriteResult;

use super::codec::{
    CodecError, EnumerationRecord, MsgKind, Payload, SettingText, WriteReply, decode_cursor,
    encode_cursor,
};
use super::transport::SettingsApi;

impl<A: SettingsApi> Shared<A> {
    pub(crate) fn handle_read_request(&self, sender: u16, payload: &[u8]) {
        let req = match SettingText::decode(payload) {
            Ok(r) => r,
            Err(e) => {
                api_log!(self.api, Warn, "settings[{}]: bad read request: {}", sender, e);
                return;
            }
        };

        let found = self.with_state(|s| {
            s.entries
                .find(req.section, req.name)
                .ok()
                .map(|e| s.describe(e))
        });

        let encoded = match found {
            Some(Ok((value, tag))) => {
                SettingText::full(req.section, req.name, &value, &tag).encode()
            }
            Some(Err(e)) => {
                api_log!(
                    self.api,
                    Warn,
                    "settings: cannot format {}.{}: {}",
                    req.section,
                    req.name,
                    e
                );
                SettingText::key(req.section, req.name).encode()
            }
            None => {
                api_log!(
                    self.api,
                    Debug,
                    "settings[{}]: read of unknown {}.{}",
                    sender,
                    req.section,
                    req.name
                );
                SettingText::key(req.section, req.name).encode()
            }
        };
        self.reply(MsgKind::ReadResponse, encoded);
    }

    pub(crate) fn handle_write_request(&self, sender: u16, payload: &[u8]) {
        let req = match SettingText::decode(payload) {
            Ok(r) => r,
            Err(e) => {
                api_log!(self.api, Warn, "settings[{}]: bad write request: {}", sender, e);
                return;
            }
        };
        let Some(value) = req.value else {
            api_log!(self.api, Warn, "settings[{}]: write request without value", sender);
            return;
        };

        let target = self.with_state(|s| {
            s.entries.find(req.section, req.name).ok().map(|e| {
                let parsed = s.types.parse(e.ty(), value, e.slot().len());
                (e.clone(), parsed)
            })
        });

        let (result, after) = match target {
            None => (WriteResult::SettingRejected, None),
            Some((entry, parsed)) => {
                let result = commit::apply(&entry, parsed, WriteSource::RemoteWrite);
                let after = self
                    .with_state(|s| s.types.format(entry.ty(), &entry.slot().snapshot()))
                    .ok();
                (result, after)
            }
        };

        api_log!(
            self.api,
            Info,
            "settings[{}]: write {}.{} = {} -> {}",
            sender,
            req.section,
            req.name,
            value,
            result
        );

        let reply = WriteReply {
            result: result.as_u8(),
            setting: SettingText {
                section: req.section,
                name: req.name,
                value: after.as_deref(),
                type_tag: None,
            },
        };
        self.reply(MsgKind::WriteResponse, reply.encode());

        if let (true, Some(after)) = (result.is_ok(), after.as_deref()) {
            let update = SettingText::with_value(req.section, req.name, after);
            self.reply(MsgKind::UpdateBroadcast, update.encode());
        }
    }

    pub(crate) fn handle_enumeration_request(&self, sender: u16, payload: &[u8]) {
        let cursor = match decode_cursor(payload) {
            Ok(c) => c,
            Err(e) => {
                api_log!(self.api, Warn, "settings[{}]: bad enumeration request: {}", sender, e);
                return;
            }
        };

        let found = self.with_state(|s| {
            s.entries.iterate(cursor).map(|e| {
                (
                    e.section().to_owned(),
                    e.name().to_owned(),
                    s.describe(e),
                )
            })
        });

        match found {
            None => self.reply(MsgKind::EnumerationEnd, encode_cursor(cursor)),
            Some((section, name, Ok((value, tag)))) => {
                let rec = EnumerationRecord {
                    cursor,
                    setting: SettingText::full(&section, &name, &value, &tag),
                };
                self.reply(MsgKind::EnumerationResponse, rec.encode());
            }
            Some((section, name, Err(e))) => {
                api_log!(
                    self.api,
                    Warn,
                    "settings: cannot format {}.{} for enumeration: {}",
                    section,
                    name,
                    e
                );
                let rec = EnumerationRecord {
                    cursor,
                    setting: SettingText::key(&section, &name),
                };
                self.reply(MsgKind::EnumerationResponse, rec.encode());
            }
        }
    }

    /// Send a responder message with the host's own sender id.
    fn reply(&self, kind: MsgKind, encoded: Result<Payload, CodecError>) {
        let payload = match encoded {
            Ok(p) => p,
            Err(e) => {
                api_log!(self.api, Warn, "settings: cannot encode {:?}: {}", kind, e);
                return;
            }
        };
        if let Err(e) = self.api.send(kind.id(), &payload) {
            api_log!(self.api, Warn, "settings: send {:?} failed: {}", kind, e);
        }
    }
}
