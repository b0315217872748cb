//! Setting entry store.
//!
//! Ordered by registration. The enumeration cursor is a plain index into
//! that order, so a directory listing is restartable from 0 and stable as
//! long as nothing is registered mid-listing. Entries only leave the store
//! when their own registration fails halfway.

use std::sync::Arc;

use crate::commit::Notify;
use crate::error::{Error, Result};
use crate::slot::SettingSlot;
use crate::types::SettingsType;

/// Who may change a setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessMode {
    /// Remote writes go through the commit path.
    Writable,
    /// Readable and enumerable; remote writes answer `ReadOnly`.
    ReadOnly,
    /// Local mirror of a peer's setting, fed by update broadcasts only.
    WatchOnly,
}

/// One registered setting.
#[derive(Clone)]
pub struct SettingEntry {
    section: String,
    name: String,
    ty: SettingsType,
    mode: AccessMode,
    slot: Arc<SettingSlot>,
    notify: Option<Notify>,
}

impl SettingEntry {
    pub fn new(
        section: &str,
        name: &str,
        ty: SettingsType,
        mode: AccessMode,
        slot: Arc<SettingSlot>,
        notify: Option<Notify>,
    ) -> Self {
        Self {
            section: section.into(),
            name: name.into(),
            ty,
            mode,
            slot,
            notify,
        }
    }

    pub fn section(&self) -> &str {
        &self.section
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn ty(&self) -> SettingsType {
        self.ty
    }

    pub fn mode(&self) -> AccessMode {
        self.mode
    }

    pub fn slot(&self) -> &Arc<SettingSlot> {
        &self.slot
    }

    pub fn notify(&self) -> Option<&Notify> {
        self.notify.as_ref()
    }

    pub fn matches(&self, section: &str, name: &str) -> bool {
        self.section == section && self.name == name
    }
}

impl core::fmt::Debug for SettingEntry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SettingEntry")
            .field("section", &self.section)
            .field("name", &self.name)
            .field("ty", &self.ty)
            .field("mode", &self.mode)
            .field("notify", &self.notify.is_some())
            .finish_non_exhaustive()
    }
}

/// Check a section or name for use as a key and as a wire text field.
pub fn validate_key_part(part: &str) -> Result<()> {
    if part.is_empty() || part.contains('\0') {
        return Err(Error::InvalidArgument);
    }
    Ok(())
}

/// Registered settings of one context.
#[derive(Default)]
pub struct EntryStore {
    entries: Vec<SettingEntry>,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append `entry`. A duplicate key is `SettingRejected` and leaves the
    /// existing entry untouched.
    pub fn insert(&mut self, entry: SettingEntry) -> Result<()> {
        validate_key_part(&entry.section)?;
        validate_key_part(&entry.name)?;
        if self.entries.len() >= usize::from(u16::MAX) {
            return Err(Error::InvalidArgument);
        }
        if self.find(&entry.section, &entry.name).is_ok() {
            return Err(Error::SettingRejected);
        }
        self.entries.push(entry);
        Ok(())
    }

    pub fn find(&self, section: &str, name: &str) -> Result<&SettingEntry> {
        self.entries
            .iter()
            .find(|e| e.matches(section, name))
            .ok_or(Error::NotFound)
    }

    /// Remove and return the entry for `section.name`. Later entries move
    /// down one cursor position.
    pub(crate) fn remove(&mut self, section: &str, name: &str) -> Result<SettingEntry> {
        let pos = self
            .entries
            .iter()
            .position(|e| e.matches(section, name))
            .ok_or(Error::NotFound)?;
        Ok(self.entries.remove(pos))
    }

    /// Entry at `cursor` in registration order, `None` past the end.
    pub fn iterate(&self, cursor: u16) -> Option<&SettingEntry> {
        self.entries.get(usize::from(cursor))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &SettingEntry> {
        self.entries.iter()
    }
}
