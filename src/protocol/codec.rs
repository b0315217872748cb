//! Settings wire codec.
//!
//! Every message is one payload of at most [`MAX_PAYLOAD`] bytes. Framing,
//! CRC and addressing belong to the bus; this module only fixes field
//! order and encoding inside the payload:
//!
//! ```text
//! text field   UTF-8 bytes, NUL-terminated
//! cursor       u16 little-endian
//! status       single byte (write result / register status)
//! ```
//!
//! | Kind                  | Id     | Fields                                      |
//! |-----------------------|--------|---------------------------------------------|
//! | write-request         | 0x00A0 | section, name, value                        |
//! | enumeration-request   | 0x00A2 | cursor                                      |
//! | read-request          | 0x00A4 | section, name                               |
//! | read-response         | 0x00A5 | section, name, [value, type tag]            |
//! | enumeration-end       | 0x00A6 | cursor                                      |
//! | enumeration-response  | 0x00A7 | cursor, section, name, value, type tag      |
//! | update-broadcast      | 0x00AD | section, name, value                        |
//! | register              | 0x00AE | section, name, value, type tag              |
//! | write-response        | 0x00AF | result, section, name, [value]              |
//! | register-response     | 0x01AF | status, section, name, [value, type tag]    |
//!
//! The cursor of an enumeration-response is the index of the entry it
//! carries; the next request uses `cursor + 1`. A read-response without
//! value and type tag is the negative reply for an unknown key.

use core::fmt;

/// Payload ceiling shared by every message kind.
pub const MAX_PAYLOAD: usize = 255;

/// Encoded payload.
pub type Payload = heapless::Vec<u8, MAX_PAYLOAD>;

pub const MSG_WRITE_REQUEST: u16 = 0x00A0;
pub const MSG_ENUMERATION_REQUEST: u16 = 0x00A2;
pub const MSG_READ_REQUEST: u16 = 0x00A4;
pub const MSG_READ_RESPONSE: u16 = 0x00A5;
pub const MSG_ENUMERATION_END: u16 = 0x00A6;
pub const MSG_ENUMERATION_RESPONSE: u16 = 0x00A7;
pub const MSG_UPDATE_BROADCAST: u16 = 0x00AD;
pub const MSG_REGISTER: u16 = 0x00AE;
pub const MSG_WRITE_RESPONSE: u16 = 0x00AF;
pub const MSG_REGISTER_RESPONSE: u16 = 0x01AF;

/// Message kinds understood by the settings core.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MsgKind {
    WriteRequest,
    EnumerationRequest,
    ReadRequest,
    ReadResponse,
    EnumerationEnd,
    EnumerationResponse,
    UpdateBroadcast,
    Register,
    WriteResponse,
    RegisterResponse,
}

impl MsgKind {
    pub const fn id(self) -> u16 {
        match self {
            Self::WriteRequest => MSG_WRITE_REQUEST,
            Self::EnumerationRequest => MSG_ENUMERATION_REQUEST,
            Self::ReadRequest => MSG_READ_REQUEST,
            Self::ReadResponse => MSG_READ_RESPONSE,
            Self::EnumerationEnd => MSG_ENUMERATION_END,
            Self::EnumerationResponse => MSG_ENUMERATION_RESPONSE,
            Self::UpdateBroadcast => MSG_UPDATE_BROADCAST,
            Self::Register => MSG_REGISTER,
            Self::WriteResponse => MSG_WRITE_RESPONSE,
            Self::RegisterResponse => MSG_REGISTER_RESPONSE,
        }
    }

    pub const fn from_id(id: u16) -> Option<Self> {
        match id {
            MSG_WRITE_REQUEST => Some(Self::WriteRequest),
            MSG_ENUMERATION_REQUEST => Some(Self::EnumerationRequest),
            MSG_READ_REQUEST => Some(Self::ReadRequest),
            MSG_READ_RESPONSE => Some(Self::ReadResponse),
            MSG_ENUMERATION_END => Some(Self::EnumerationEnd),
            MSG_ENUMERATION_RESPONSE => Some(Self::EnumerationResponse),
            MSG_UPDATE_BROADCAST => Some(Self::UpdateBroadcast),
            MSG_REGISTER => Some(Self::Register),
            MSG_WRITE_RESPONSE => Some(Self::WriteResponse),
            MSG_REGISTER_RESPONSE => Some(Self::RegisterResponse),
            _ => None,
        }
    }
}

/// Why a payload could not be encoded or decoded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodecError {
    /// Encoding would exceed [`MAX_PAYLOAD`].
    TooLong,
    /// A fixed-width field runs past the end of the payload.
    Truncated,
    /// A text field has no NUL terminator.
    Unterminated,
    /// A text field is not valid UTF-8, or contains a NUL when encoding.
    InvalidText,
    /// Bytes left over after the last field.
    TrailingBytes,
    /// Unknown status byte.
    UnknownStatus(u8),
}

impl fmt::Display for CodecError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::TooLong => write!(f, "payload exceeds {} bytes", MAX_PAYLOAD),
            Self::Truncated => write!(f, "payload truncated"),
            Self::Unterminated => write!(f, "unterminated text field"),
            Self::InvalidText => write!(f, "invalid text field"),
            Self::TrailingBytes => write!(f, "trailing bytes"),
            Self::UnknownStatus(b) => write!(f, "unknown status byte {}", b),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Field writer / reader
// ───────────────────────────────────────────────────────────────

/// Appends fields to a [`Payload`].
#[derive(Default)]
pub struct PayloadWriter {
    buf: Payload,
}

impl PayloadWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn u8(&mut self, v: u8) -> Result<&mut Self, CodecError> {
        self.buf.push(v).map_err(|_| CodecError::TooLong)?;
        Ok(self)
    }

    pub fn u16(&mut self, v: u16) -> Result<&mut Self, CodecError> {
        self.buf
            .extend_from_slice(&v.to_le_bytes())
            .map_err(|()| CodecError::TooLong)?;
        Ok(self)
    }

    pub fn text(&mut self, s: &str) -> Result<&mut Self, CodecError> {
        if s.as_bytes().contains(&0) {
            return Err(CodecError::InvalidText);
        }
        self.buf
            .extend_from_slice(s.as_bytes())
            .map_err(|()| CodecError::TooLong)?;
        self.u8(0)
    }

    pub fn finish(self) -> Payload {
        self.buf
    }
}

/// Pulls fields off a received payload.
pub struct PayloadReader<'a> {
    rest: &'a [u8],
}

impl<'a> PayloadReader<'a> {
    pub fn new(payload: &'a [u8]) -> Result<Self, CodecError> {
        if payload.len() > MAX_PAYLOAD {
            return Err(CodecError::TooLong);
        }
        Ok(Self { rest: payload })
    }

    pub fn is_empty(&self) -> bool {
        self.rest.is_empty()
    }

    pub fn u8(&mut self) -> Result<u8, CodecError> {
        let (&b, rest) = self.rest.split_first().ok_or(CodecError::Truncated)?;
        self.rest = rest;
        Ok(b)
    }

    pub fn u16(&mut self) -> Result<u16, CodecError> {
        let Some((head, rest)) = self.rest.split_first_chunk::<2>() else {
            return Err(CodecError::Truncated);
        };
        self.rest = rest;
        Ok(u16::from_le_bytes(*head))
    }

    pub fn text(&mut self) -> Result<&'a str, CodecError> {
        let end = self
            .rest
            .iter()
            .position(|&b| b == 0)
            .ok_or(CodecError::Unterminated)?;
        let s = core::str::from_utf8(&self.rest[..end]).map_err(|_| CodecError::InvalidText)?;
        self.rest = &self.rest[end + 1..];
        Ok(s)
    }

    /// Next text field, or `None` at the end of the payload.
    pub fn opt_text(&mut self) -> Result<Option<&'a str>, CodecError> {
        if self.is_empty() {
            Ok(None)
        } else {
            self.text().map(Some)
        }
    }

    pub fn finish(self) -> Result<(), CodecError> {
        if self.rest.is_empty() {
            Ok(())
        } else {
            Err(CodecError::TrailingBytes)
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Messages
// ───────────────────────────────────────────────────────────────

/// The text body shared by most settings messages:
/// `section, name, [value, [type tag]]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SettingText<'a> {
    pub section: &'a str,
    pub name: &'a str,
    pub value: Option<&'a str>,
    pub type_tag: Option<&'a str>,
}

impl<'a> SettingText<'a> {
    /// Key only (read-request, negative read-response).
    pub fn key(section: &'a str, name: &'a str) -> Self {
        Self {
            section,
            name,
            value: None,
            type_tag: None,
        }
    }

    /// Key and value (write-request, update-broadcast).
    pub fn with_value(section: &'a str, name: &'a str, value: &'a str) -> Self {
        Self {
            section,
            name,
            value: Some(value),
            type_tag: None,
        }
    }

    /// Full description (read-response, enumeration-response, register).
    pub fn full(section: &'a str, name: &'a str, value: &'a str, type_tag: &'a str) -> Self {
        Self {
            section,
            name,
            value: Some(value),
            type_tag: Some(type_tag),
        }
    }

    fn write_to(&self, w: &mut PayloadWriter) -> Result<(), CodecError> {
        w.text(self.section)?.text(self.name)?;
        if let Some(value) = self.value {
            w.text(value)?;
            if let Some(tag) = self.type_tag {
                w.text(tag)?;
            }
        }
        Ok(())
    }

    fn read_from(r: &mut PayloadReader<'a>) -> Result<Self, CodecError> {
        let section = r.text()?;
        let name = r.text()?;
        let value = r.opt_text()?;
        let type_tag = if value.is_some() { r.opt_text()? } else { None };
        Ok(Self {
            section,
            name,
            value,
            type_tag,
        })
    }

    pub fn encode(&self) -> Result<Payload, CodecError> {
        let mut w = PayloadWriter::new();
        self.write_to(&mut w)?;
        Ok(w.finish())
    }

    pub fn decode(payload: &'a [u8]) -> Result<Self, CodecError> {
        let mut r = PayloadReader::new(payload)?;
        let msg = Self::read_from(&mut r)?;
        r.finish()?;
        Ok(msg)
    }
}

/// Write-response: raw result byte followed by the setting text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WriteReply<'a> {
    pub result: u8,
    pub setting: SettingText<'a>,
}

impl<'a> WriteReply<'a> {
    pub fn encode(&self) -> Result<Payload, CodecError> {
        let mut w = PayloadWriter::new();
        w.u8(self.result)?;
        self.setting.write_to(&mut w)?;
        Ok(w.finish())
    }

    pub fn decode(payload: &'a [u8]) -> Result<Self, CodecError> {
        let mut r = PayloadReader::new(payload)?;
        let result = r.u8()?;
        let setting = SettingText::read_from(&mut r)?;
        r.finish()?;
        Ok(Self { result, setting })
    }
}

/// Enumeration-response: entry index followed by the full setting text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EnumerationRecord<'a> {
    pub cursor: u16,
    pub setting: SettingText<'a>,
}

impl<'a> EnumerationRecord<'a> {
    pub fn encode(&self) -> Result<Payload, CodecError> {
        let mut w = PayloadWriter::new();
        w.u16(self.cursor)?;
        self.setting.write_to(&mut w)?;
        Ok(w.finish())
    }

    pub fn decode(payload: &'a [u8]) -> Result<Self, CodecError> {
        let mut r = PayloadReader::new(payload)?;
        let cursor = r.u16()?;
        let setting = SettingText::read_from(&mut r)?;
        r.finish()?;
        Ok(Self { cursor, setting })
    }
}

/// Enumeration-request and enumeration-end body.
pub fn encode_cursor(cursor: u16) -> Result<Payload, CodecError> {
    let mut w = PayloadWriter::new();
    w.u16(cursor)?;
    Ok(w.finish())
}

pub fn decode_cursor(payload: &[u8]) -> Result<u16, CodecError> {
    let mut r = PayloadReader::new(payload)?;
    let cursor = r.u16()?;
    r.finish()?;
    Ok(cursor)
}

/// Daemon verdict on a register message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum RegisterStatus {
    /// Registered with the value we announced.
    Accepted = 0,
    /// The daemon holds a persisted value and returned it.
    Stored = 1,
    /// The daemon already knew this setting.
    AlreadyRegistered = 2,
    /// The daemon could not parse the announced value.
    ParseFailed = 3,
}

impl RegisterStatus {
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Accepted),
            1 => Some(Self::Stored),
            2 => Some(Self::AlreadyRegistered),
            3 => Some(Self::ParseFailed),
            _ => None,
        }
    }
}

/// Register-response: status byte followed by the setting text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegisterReply<'a> {
    pub status: RegisterStatus,
    pub setting: SettingText<'a>,
}

impl<'a> RegisterReply<'a> {
    pub fn encode(&self) -> Result<Payload, CodecError> {
        let mut w = PayloadWriter::new();
        w.u8(self.status as u8)?;
        self.setting.write_to(&mut w)?;
        Ok(w.finish())
    }

    pub fn decode(payload: &'a [u8]) -> Result<Self, CodecError> {
        let mut r = PayloadReader::new(payload)?;
        let raw = r.u8()?;
        let status = RegisterStatus::from_u8(raw).ok_or(CodecError::UnknownStatus(raw))?;
        let setting = SettingText::read_from(&mut r)?;
        r.finish()?;
        Ok(Self { status, setting })
    }
}

/// Worst-case encoded length of a full setting record (enumeration-
/// response, the largest message) for the given field lengths.
pub const fn record_len(section: usize, name: usize, value: usize, type_tag: usize) -> usize {
    2 + (section + 1) + (name + 1) + (value + 1) + (type_tag + 1)
}
