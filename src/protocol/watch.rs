//! Watch role: mirrors peers' settings into local watch entries.
//!
//! Update broadcasts are matched by key against entries registered with
//! [`AccessMode::WatchOnly`] and committed without the remote-write access
//! checks. Broadcasts for any other entry are ignored. Delivery is best
//! effort: a lost broadcast leaves the mirror stale until the next one.

use crate::commit::{self, WriteSource};
use crate::context::Shared;
use crate::store::AccessMode;

use super::codec::SettingText;
use super::transport::SettingsApi;

impl<A: SettingsApi> Shared<A> {
    pub(crate) fn handle_update_broadcast(&self, sender: u16, payload: &[u8]) {
        if self.config.ignore_own_broadcasts && sender == self.sender_id {
            return;
        }
        let msg = match SettingText::decode(payload) {
            Ok(m) => m,
            Err(e) => {
                api_log!(self.api, Warn, "settings[{}]: bad update broadcast: {}", sender, e);
                return;
            }
        };
        let Some(value) = msg.value else {
            api_log!(self.api, Warn, "settings[{}]: update broadcast without value", sender);
            return;
        };

        let target = self.with_state(|s| match s.entries.find(msg.section, msg.name) {
            Ok(e) if e.mode() == AccessMode::WatchOnly => {
                let parsed = s.types.parse(e.ty(), value, e.slot().len());
                Some((e.clone(), parsed))
            }
            _ => None,
        });
        let Some((entry, parsed)) = target else {
            return;
        };

        let result = commit::apply(&entry, parsed, WriteSource::WatchUpdate);
        if result.is_ok() {
            api_log!(
                self.api,
                Debug,
                "settings[{}]: watch {}.{} = {}",
                sender,
                msg.section,
                msg.name,
                value
            );
        } else {
            api_log!(
                self.api,
                Warn,
                "settings[{}]: watch {}.{} = {} rejected: {}",
                sender,
                msg.section,
                msg.name,
                value,
                result
            );
        }
    }
}
