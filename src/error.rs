//! Unified error types for the settings core.
//!
//! A single `Error` enum that every subsystem converts into, so the
//! registration API, the requester role and the commit path report
//! failures the same way. All variants are `Copy` so they can be passed
//! out of transport callbacks and across threads without allocation.

use core::fmt;

// ---------------------------------------------------------------------------
// Top-level error
// ---------------------------------------------------------------------------

/// Every fallible operation in the crate funnels into this type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Error {
    /// Malformed registration call (duplicate enum value, empty list,
    /// incompatible slot length, oversized key).
    InvalidArgument,
    /// Local lookup miss.
    NotFound,
    /// Text does not match the grammar of the declared type.
    ParseFailed,
    /// Well-formed value outside the accepted range or domain.
    ValueRejected,
    /// The referenced setting does not exist (or is already registered).
    SettingRejected,
    /// Remote write to a read-only setting.
    ReadOnly,
    /// Remote write to a watch-only setting.
    ModifyDisabled,
    /// Notify veto or unexpected internal failure.
    ServiceFailed,
    /// A requester operation exhausted its retry budget.
    Timeout,
    /// The host transport refused an operation.
    Transport(ApiError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidArgument => write!(f, "invalid argument"),
            Self::NotFound => write!(f, "setting not found"),
            Self::ParseFailed => write!(f, "value could not be parsed"),
            Self::ValueRejected => write!(f, "value rejected"),
            Self::SettingRejected => write!(f, "setting rejected"),
            Self::ReadOnly => write!(f, "setting is read only"),
            Self::ModifyDisabled => write!(f, "setting is not modifiable"),
            Self::ServiceFailed => write!(f, "service failed"),
            Self::Timeout => write!(f, "request timed out"),
            Self::Transport(e) => write!(f, "transport: {e}"),
        }
    }
}

impl core::error::Error for Error {}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Failures reported by a [`SettingsApi`](crate::protocol::transport::SettingsApi)
/// implementation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApiError {
    /// The message could not be queued or transmitted.
    SendFailed,
    /// The callback table is full or the registration was refused.
    CallbackRegistration,
    /// The token does not name a registered callback.
    UnknownToken,
    /// Wait substrate setup or teardown failed.
    WaitSetup,
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SendFailed => write!(f, "send failed"),
            Self::CallbackRegistration => write!(f, "callback registration failed"),
            Self::UnknownToken => write!(f, "unknown callback token"),
            Self::WaitSetup => write!(f, "wait setup failed"),
        }
    }
}

impl From<ApiError> for Error {
    fn from(e: ApiError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Write results
// ---------------------------------------------------------------------------

/// Terminal outcome of a single write attempt.
///
/// The discriminants are the on-wire status byte of a write-response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum WriteResult {
    Ok = 0,
    ValueRejected = 1,
    SettingRejected = 2,
    ParseFailed = 3,
    // READ_ONLY vs MODIFY_DISABLED ~= permanent vs temporary
    ReadOnly = 4,
    ModifyDisabled = 5,
    ServiceFailed = 6,
}

impl WriteResult {
    /// Decode the wire status byte.
    pub const fn from_u8(raw: u8) -> Option<Self> {
        match raw {
            0 => Some(Self::Ok),
            1 => Some(Self::ValueRejected),
            2 => Some(Self::SettingRejected),
            3 => Some(Self::ParseFailed),
            4 => Some(Self::ReadOnly),
            5 => Some(Self::ModifyDisabled),
            6 => Some(Self::ServiceFailed),
            _ => None,
        }
    }

    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    /// `Ok(())` for [`WriteResult::Ok`], the matching [`Error`] otherwise.
    pub fn into_result(self) -> Result<()> {
        match self {
            Self::Ok => Ok(()),
            Self::ValueRejected => Err(Error::ValueRejected),
            Self::SettingRejected => Err(Error::SettingRejected),
            Self::ParseFailed => Err(Error::ParseFailed),
            Self::ReadOnly => Err(Error::ReadOnly),
            Self::ModifyDisabled => Err(Error::ModifyDisabled),
            Self::ServiceFailed => Err(Error::ServiceFailed),
        }
    }
}

impl fmt::Display for WriteResult {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ok => write!(f, "ok"),
            Self::ValueRejected => write!(f, "value rejected"),
            Self::SettingRejected => write!(f, "setting rejected"),
            Self::ParseFailed => write!(f, "parse failed"),
            Self::ReadOnly => write!(f, "read only"),
            Self::ModifyDisabled => write!(f, "modify disabled"),
            Self::ServiceFailed => write!(f, "service failed"),
        }
    }
}

/// Classify a local error for the wire. Errors with no wire counterpart
/// become `ServiceFailed`.
impl From<Error> for WriteResult {
    fn from(e: Error) -> Self {
        match e {
            Error::ParseFailed => Self::ParseFailed,
            Error::ValueRejected => Self::ValueRejected,
            Error::SettingRejected | Error::NotFound => Self::SettingRejected,
            Error::ReadOnly => Self::ReadOnly,
            Error::ModifyDisabled => Self::ModifyDisabled,
            _ => Self::ServiceFailed,
        }
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Crate-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
