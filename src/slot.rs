//! Setting slots: the caller-owned memory a setting is bound to.
//!
//! A slot is a fixed-length byte buffer behind a critical-section mutex.
//! The application creates it, keeps an `Arc` to it, and hands a clone of
//! that `Arc` to the registry at registration time. The registry reads and
//! writes the bytes but never frees them.
//!
//! Whole-slot copies happen under the lock, so a reader never observes a
//! half-written value regardless of the slot width.

use core::cell::RefCell;

use embassy_sync::blocking_mutex::CriticalSectionMutex;

/// Largest slot, bounded by the wire payload ceiling.
pub const MAX_SLOT_LEN: usize = 255;

/// Raw slot contents.
pub type SlotBytes = heapless::Vec<u8, MAX_SLOT_LEN>;

/// Fixed-length, lock-protected byte buffer backing one setting.
pub struct SettingSlot {
    cell: CriticalSectionMutex<RefCell<SlotBytes>>,
}

impl SettingSlot {
    /// Zero-filled slot of `len` bytes. `None` if `len` is 0 or larger than
    /// [`MAX_SLOT_LEN`].
    pub fn zeroed(len: usize) -> Option<Self> {
        if len == 0 || len > MAX_SLOT_LEN {
            return None;
        }
        let mut bytes = SlotBytes::new();
        bytes.resize(len, 0).ok()?;
        Some(Self::from_vec(bytes))
    }

    /// Slot initialised from raw bytes (length taken from `bytes`).
    pub fn from_bytes(bytes: &[u8]) -> Option<Self> {
        if bytes.is_empty() {
            return None;
        }
        SlotBytes::from_slice(bytes).ok().map(Self::from_vec)
    }

    fn from_vec(bytes: SlotBytes) -> Self {
        Self {
            cell: CriticalSectionMutex::new(RefCell::new(bytes)),
        }
    }

    // ── Typed constructors ────────────────────────────────────

    pub fn int8(value: i8) -> Self {
        Self::from_vec(fixed(&value.to_ne_bytes()))
    }

    pub fn int16(value: i16) -> Self {
        Self::from_vec(fixed(&value.to_ne_bytes()))
    }

    pub fn int32(value: i32) -> Self {
        Self::from_vec(fixed(&value.to_ne_bytes()))
    }

    pub fn int64(value: i64) -> Self {
        Self::from_vec(fixed(&value.to_ne_bytes()))
    }

    pub fn float32(value: f32) -> Self {
        Self::from_vec(fixed(&value.to_ne_bytes()))
    }

    pub fn float64(value: f64) -> Self {
        Self::from_vec(fixed(&value.to_ne_bytes()))
    }

    pub fn boolean(value: bool) -> Self {
        Self::from_vec(fixed(&[u8::from(value)]))
    }

    /// One-byte slot holding an enum ordinal.
    pub fn enumeration(ordinal: u8) -> Self {
        Self::from_vec(fixed(&[ordinal]))
    }

    /// String slot of `capacity` bytes (terminator included) holding
    /// `initial`. `None` if `initial` does not fit with its terminator.
    pub fn string(capacity: usize, initial: &str) -> Option<Self> {
        let slot = Self::zeroed(capacity)?;
        slot.set_str(initial).then_some(slot)
    }

    // ── Raw access ────────────────────────────────────────────

    /// Slot length in bytes. Fixed for the slot's lifetime.
    pub fn len(&self) -> usize {
        self.cell.lock(|c| c.borrow().len())
    }

    /// Always `false`: slots have at least one byte.
    pub fn is_empty(&self) -> bool {
        false
    }

    /// Copy of the current contents.
    pub fn snapshot(&self) -> SlotBytes {
        self.cell.lock(|c| c.borrow().clone())
    }

    /// Overwrite the whole slot. Returns `false` (and leaves the slot
    /// untouched) when `bytes` has the wrong length.
    pub fn store(&self, bytes: &[u8]) -> bool {
        self.cell.lock(|c| {
            let mut cur = c.borrow_mut();
            if cur.len() != bytes.len() {
                return false;
            }
            cur.copy_from_slice(bytes);
            true
        })
    }

    // ── Typed readers ─────────────────────────────────────────

    /// Signed integer view, by slot width (1, 2, 4 or 8 bytes).
    pub fn get_int(&self) -> Option<i64> {
        read_int(&self.snapshot())
    }

    /// Float view, by slot width (4 or 8 bytes).
    pub fn get_float(&self) -> Option<f64> {
        read_float(&self.snapshot())
    }

    pub fn get_bool(&self) -> Option<bool> {
        match self.snapshot().as_slice() {
            [0] => Some(false),
            [1] => Some(true),
            _ => None,
        }
    }

    /// Enum ordinal (first byte).
    pub fn get_enum(&self) -> u8 {
        self.cell.lock(|c| c.borrow().first().copied().unwrap_or(0))
    }

    /// Text up to the first NUL.
    pub fn get_str(&self) -> String {
        let bytes = self.snapshot();
        let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
        String::from_utf8_lossy(&bytes[..end]).into_owned()
    }

    // ── Typed writers (owner-side, no notify) ─────────────────

    /// Store an integer if it fits the slot width.
    pub fn set_int(&self, value: i64) -> bool {
        let len = self.len();
        match encode_int(value, len) {
            Some(bytes) => self.store(&bytes),
            None => false,
        }
    }

    pub fn set_float(&self, value: f64) -> bool {
        match self.len() {
            4 => self.store(&(value as f32).to_ne_bytes()),
            8 => self.store(&value.to_ne_bytes()),
            _ => false,
        }
    }

    pub fn set_bool(&self, value: bool) -> bool {
        self.store(&[u8::from(value)])
    }

    pub fn set_enum(&self, ordinal: u8) -> bool {
        self.store(&[ordinal])
    }

    /// Store `text` plus terminator, zero-filling the tail.
    pub fn set_str(&self, text: &str) -> bool {
        let len = self.len();
        if text.len() >= len || text.as_bytes().contains(&0) {
            return false;
        }
        let mut bytes = SlotBytes::new();
        if bytes.extend_from_slice(text.as_bytes()).is_err() || bytes.resize(len, 0).is_err() {
            return false;
        }
        self.store(&bytes)
    }
}

impl core::fmt::Debug for SettingSlot {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("SettingSlot")
            .field("bytes", &self.snapshot().as_slice())
            .finish()
    }
}

// ── Native-endian helpers shared with the type registry ──────

fn fixed(bytes: &[u8]) -> SlotBytes {
    // Callers pass at most 8 bytes.
    let mut out = SlotBytes::new();
    let _ = out.extend_from_slice(bytes);
    out
}

pub(crate) fn read_int(bytes: &[u8]) -> Option<i64> {
    match bytes.len() {
        1 => Some(i64::from(i8::from_ne_bytes([bytes[0]]))),
        2 => Some(i64::from(i16::from_ne_bytes(bytes.try_into().ok()?))),
        4 => Some(i64::from(i32::from_ne_bytes(bytes.try_into().ok()?))),
        8 => Some(i64::from_ne_bytes(bytes.try_into().ok()?)),
        _ => None,
    }
}

pub(crate) fn read_float(bytes: &[u8]) -> Option<f64> {
    match bytes.len() {
        4 => Some(f64::from(f32::from_ne_bytes(bytes.try_into().ok()?))),
        8 => Some(f64::from_ne_bytes(bytes.try_into().ok()?)),
        _ => None,
    }
}

/// Narrow `value` to a `width`-byte integer. `None` on overflow or an
/// unsupported width.
pub(crate) fn encode_int(value: i64, width: usize) -> Option<SlotBytes> {
    let bytes = match width {
        1 => fixed(&i8::try_from(value).ok()?.to_ne_bytes()),
        2 => fixed(&i16::try_from(value).ok()?.to_ne_bytes()),
        4 => fixed(&i32::try_from(value).ok()?.to_ne_bytes()),
        8 => fixed(&value.to_ne_bytes()),
        _ => return None,
    };
    Some(bytes)
}
