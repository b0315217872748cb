//! Settings type registry.
//!
//! Four primitive types are built in. Enumerations are registered at
//! runtime and receive ids from a per-registry allocator, so two contexts
//! in one process never share or collide on enum ids.
//!
//! Every value crosses the bus as text. This module owns both directions
//! of that conversion:
//!
//! | Type     | Slot widths | Wire text                         |
//! |----------|-------------|-----------------------------------|
//! | `INT`    | 1, 2, 4, 8  | decimal, e.g. `-12`               |
//! | `FLOAT`  | 4, 8        | shortest round-trip decimal       |
//! | `STRING` | ≥ 1         | bytes up to the first NUL         |
//! | `BOOL`   | 1           | `False` / `True`                  |
//! | enum     | 1           | value name at the stored ordinal  |

use core::fmt;
use core::num::IntErrorKind;

use crate::error::{Error, Result};
use crate::slot::{self, SlotBytes};

/// Value names of the boolean type, in ordinal order.
pub const BOOL_NAMES: [&str; 2] = ["False", "True"];

/// Identifier of a settings type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SettingsType(u16);

impl SettingsType {
    /// Integer, 8/16/32/64 bits.
    pub const INT: Self = Self(0);
    /// Float, single or double precision.
    pub const FLOAT: Self = Self(1);
    pub const STRING: Self = Self(2);
    pub const BOOL: Self = Self(3);

    /// First id handed out to a runtime enumeration.
    pub const FIRST_ENUM: u16 = 4;

    pub const fn id(self) -> u16 {
        self.0
    }

    pub const fn is_enum(self) -> bool {
        self.0 >= Self::FIRST_ENUM
    }
}

// ───────────────────────────────────────────────────────────────
// Wire type descriptors
// ───────────────────────────────────────────────────────────────

/// Self-contained description of a type, as carried on the wire.
///
/// Enum descriptors inline their value list, so a peer can interpret an
/// enumerated setting without sharing our type ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeDescriptor {
    Int,
    Float,
    String,
    Bool,
    Enum(Vec<String>),
}

impl TypeDescriptor {
    /// Wire tag: `int`, `float`, `string`, `bool` or `enum:a,b,c`.
    pub fn tag(&self) -> String {
        self.to_string()
    }

    /// Parse a wire tag. `None` for unknown tags or empty enum lists.
    pub fn parse(tag: &str) -> Option<Self> {
        match tag {
            "int" => Some(Self::Int),
            "float" => Some(Self::Float),
            "string" => Some(Self::String),
            "bool" => Some(Self::Bool),
            _ => {
                let list = tag.strip_prefix("enum:")?;
                if list.is_empty() {
                    return None;
                }
                Some(Self::Enum(list.split(',').map(str::to_owned).collect()))
            }
        }
    }
}

impl fmt::Display for TypeDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Int => write!(f, "int"),
            Self::Float => write!(f, "float"),
            Self::String => write!(f, "string"),
            Self::Bool => write!(f, "bool"),
            Self::Enum(names) => write!(f, "enum:{}", names.join(",")),
        }
    }
}

// ───────────────────────────────────────────────────────────────
// Registry
// ───────────────────────────────────────────────────────────────

struct EnumType {
    id: SettingsType,
    names: Vec<String>,
}

/// Primitive types plus the enumerations registered on one context.
pub struct TypeRegistry {
    next_id: u16,
    enums: Vec<EnumType>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self {
            next_id: SettingsType::FIRST_ENUM,
            enums: Vec::new(),
        }
    }

    /// Register an enumeration. Names are matched case-sensitively and
    /// their order fixes the stored ordinals.
    ///
    /// Registering the same list twice yields two distinct types.
    pub fn register_enum(&mut self, names: &[&str]) -> Result<SettingsType> {
        if names.is_empty() || names.len() > usize::from(u8::MAX) + 1 {
            return Err(Error::InvalidArgument);
        }
        for (i, name) in names.iter().enumerate() {
            if name.is_empty() || name.contains([',', '\0']) || names[..i].contains(name) {
                return Err(Error::InvalidArgument);
            }
        }
        let id = SettingsType(self.next_id);
        self.next_id = self.next_id.checked_add(1).ok_or(Error::InvalidArgument)?;
        self.enums.push(EnumType {
            id,
            names: names.iter().map(|n| (*n).to_owned()).collect(),
        });
        Ok(id)
    }

    /// Value names of an enum type (`BOOL` included).
    pub fn enum_names(&self, ty: SettingsType) -> Option<Vec<&str>> {
        if ty == SettingsType::BOOL {
            return Some(BOOL_NAMES.to_vec());
        }
        self.lookup_enum(ty)
            .map(|e| e.names.iter().map(String::as_str).collect())
    }

    pub fn is_known(&self, ty: SettingsType) -> bool {
        !ty.is_enum() || self.lookup_enum(ty).is_some()
    }

    /// Wire descriptor for `ty`.
    pub fn descriptor(&self, ty: SettingsType) -> Option<TypeDescriptor> {
        match ty {
            SettingsType::INT => Some(TypeDescriptor::Int),
            SettingsType::FLOAT => Some(TypeDescriptor::Float),
            SettingsType::STRING => Some(TypeDescriptor::String),
            SettingsType::BOOL => Some(TypeDescriptor::Bool),
            _ => self
                .lookup_enum(ty)
                .map(|e| TypeDescriptor::Enum(e.names.clone())),
        }
    }

    /// Check that a slot of `len` bytes can hold values of `ty`.
    pub fn check_slot(&self, ty: SettingsType, len: usize) -> Result<()> {
        let ok = match ty {
            SettingsType::INT => matches!(len, 1 | 2 | 4 | 8),
            SettingsType::FLOAT => matches!(len, 4 | 8),
            SettingsType::STRING => len >= 1,
            SettingsType::BOOL => len == 1,
            _ => self.lookup_enum(ty).is_some() && len == 1,
        };
        if ok { Ok(()) } else { Err(Error::InvalidArgument) }
    }

    /// Upper bound on the formatted text length of a `len`-byte slot.
    pub fn max_text_len(&self, ty: SettingsType, len: usize) -> Result<usize> {
        match ty {
            // "-9223372036854775808"
            SettingsType::INT => Ok(20),
            // "-2.2250738585072014e-308", see `format_float`
            SettingsType::FLOAT => Ok(24),
            SettingsType::STRING => Ok(len.saturating_sub(1)),
            SettingsType::BOOL => Ok(5),
            _ => self
                .lookup_enum(ty)
                .and_then(|e| e.names.iter().map(String::len).max())
                .ok_or(Error::InvalidArgument),
        }
    }

    /// Render raw slot bytes as wire text.
    pub fn format(&self, ty: SettingsType, bytes: &[u8]) -> Result<String> {
        match ty {
            SettingsType::INT => slot::read_int(bytes)
                .map(|v| v.to_string())
                .ok_or(Error::InvalidArgument),
            SettingsType::FLOAT => match bytes.len() {
                4 => {
                    let raw: [u8; 4] = bytes.try_into().map_err(|_| Error::InvalidArgument)?;
                    Ok(format_float(f32::from_ne_bytes(raw)))
                }
                8 => {
                    let raw: [u8; 8] = bytes.try_into().map_err(|_| Error::InvalidArgument)?;
                    Ok(format_float(f64::from_ne_bytes(raw)))
                }
                _ => Err(Error::InvalidArgument),
            },
            SettingsType::STRING => {
                let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
                Ok(String::from_utf8_lossy(&bytes[..end]).into_owned())
            }
            SettingsType::BOOL => format_ordinal(&BOOL_NAMES, bytes),
            _ => {
                let e = self.lookup_enum(ty).ok_or(Error::InvalidArgument)?;
                format_ordinal(&e.names, bytes)
            }
        }
    }

    /// Parse wire text into the raw bytes of a `len`-byte slot.
    ///
    /// Malformed text is `ParseFailed`; well-formed text that does not fit
    /// the slot is `ValueRejected`.
    pub fn parse(&self, ty: SettingsType, text: &str, len: usize) -> Result<SlotBytes> {
        self.check_slot(ty, len)?;
        match ty {
            SettingsType::INT => {
                let value = text.parse::<i64>().map_err(|e| match e.kind() {
                    IntErrorKind::PosOverflow | IntErrorKind::NegOverflow => Error::ValueRejected,
                    _ => Error::ParseFailed,
                })?;
                slot::encode_int(value, len).ok_or(Error::ValueRejected)
            }
            SettingsType::FLOAT => parse_float(text, len),
            SettingsType::STRING => {
                if text.as_bytes().contains(&0) {
                    return Err(Error::ParseFailed);
                }
                if text.len() >= len {
                    return Err(Error::ValueRejected);
                }
                let mut out = SlotBytes::new();
                out.extend_from_slice(text.as_bytes())
                    .map_err(|()| Error::ValueRejected)?;
                out.resize(len, 0).map_err(|()| Error::ValueRejected)?;
                Ok(out)
            }
            SettingsType::BOOL => parse_ordinal(&BOOL_NAMES, text),
            _ => {
                let e = self.lookup_enum(ty).ok_or(Error::InvalidArgument)?;
                parse_ordinal(&e.names, text)
            }
        }
    }

    fn lookup_enum(&self, ty: SettingsType) -> Option<&EnumType> {
        self.enums.iter().find(|e| e.id == ty)
    }
}

impl Default for TypeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

// ── Internal ──────────────────────────────────────────────────

fn format_ordinal<S: AsRef<str>>(names: &[S], bytes: &[u8]) -> Result<String> {
    let [ordinal] = bytes else {
        return Err(Error::InvalidArgument);
    };
    names
        .get(usize::from(*ordinal))
        .map(|n| n.as_ref().to_owned())
        .ok_or(Error::ParseFailed)
}

fn parse_ordinal<S: AsRef<str>>(names: &[S], text: &str) -> Result<SlotBytes> {
    let ordinal = names
        .iter()
        .position(|n| n.as_ref() == text)
        .ok_or(Error::ParseFailed)?;
    let mut out = SlotBytes::new();
    out.push(ordinal as u8).map_err(|_| Error::ParseFailed)?;
    Ok(out)
}

/// Shortest round-trip text, switching to exponent form outside
/// `[1e-5, 1e16)` so the result never exceeds 24 characters.
fn format_float<F>(v: F) -> String
where
    F: fmt::Display + fmt::LowerExp + Into<f64> + Copy,
{
    let mag = v.into().abs();
    if mag == 0.0 || !mag.is_finite() || (1e-5..1e16).contains(&mag) {
        v.to_string()
    } else {
        format!("{:e}", v)
    }
}

fn parse_float(text: &str, len: usize) -> Result<SlotBytes> {
    let names_infinity = {
        let body = text.trim_start_matches(['+', '-']);
        body.eq_ignore_ascii_case("inf") || body.eq_ignore_ascii_case("infinity")
    };
    let mut out = SlotBytes::new();
    match len {
        4 => {
            let v = text.parse::<f32>().map_err(|_| Error::ParseFailed)?;
            if v.is_infinite() && !names_infinity {
                return Err(Error::ValueRejected);
            }
            out.extend_from_slice(&v.to_ne_bytes())
                .map_err(|()| Error::ValueRejected)?;
        }
        _ => {
            let v = text.parse::<f64>().map_err(|_| Error::ParseFailed)?;
            if v.is_infinite() && !names_infinity {
                return Err(Error::ValueRejected);
            }
            out.extend_from_slice(&v.to_ne_bytes())
                .map_err(|()| Error::ValueRejected)?;
        }
    }
    Ok(out)
}
