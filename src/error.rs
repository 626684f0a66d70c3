//! Unified error types for the gritsbot agent.
//!
//! Each subsystem has its own small enum so callers can match on exactly
//! the failures that subsystem produces.  Everything converts into the
//! crate-wide [`Error`] for call sites (startup wiring, identity lookup)
//! that only need to report and give up.

use core::fmt;
use std::io;

// ---------------------------------------------------------------------------
// Top-level agent error
// ---------------------------------------------------------------------------

/// Every fallible library operation funnels into this type.
#[derive(Debug)]
pub enum Error {
    /// The serial transport failed.
    Transport(TransportError),
    /// A response batch did not line up with its request batch.
    Batch(BatchError),
    /// The robot could not determine who it is.
    Identity(IdentityError),
    /// The fleet messaging link failed.
    Fleet(FleetError),
    /// Configuration is invalid.
    Config(ConfigError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transport(e) => write!(f, "transport: {e}"),
            Self::Batch(e) => write!(f, "batch: {e}"),
            Self::Identity(e) => write!(f, "identity: {e}"),
            Self::Fleet(e) => write!(f, "fleet: {e}"),
            Self::Config(e) => write!(f, "config: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Transport(e) => Some(e),
            Self::Batch(e) => Some(e),
            Self::Identity(e) => Some(e),
            Self::Fleet(e) => Some(e),
            Self::Config(e) => Some(e),
        }
    }
}

// ---------------------------------------------------------------------------
// Transport errors
// ---------------------------------------------------------------------------

/// Failures surfaced by [`Transport`](crate::transport::Transport).
///
/// Device-level faults (`Io`, `Overflow`) are recovered by the watcher in
/// the background, but the exchange that hit them still fails with one of
/// these variants.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    /// The device could not be acquired, or `start` was misused.
    Device(String),
    /// `exchange` was called before `start`.
    NotStarted,
    /// The transport has been stopped.
    Stopped,
    /// The device did not become ready within the caller's timeout.
    Timeout,
    /// A write or read on the device failed mid-exchange.
    Io(io::ErrorKind, String),
    /// More bytes were buffered on the line than the ceiling allows.
    Overflow { waiting: usize, limit: usize },
    /// The reply bytes were not a valid response batch.
    MalformedResponse(String),
    /// The request batch could not be serialised.
    InvalidRequest(String),
}

impl TransportError {
    /// Whether this failure means the device handle is no longer trusted.
    pub fn triggers_reconnect(&self) -> bool {
        matches!(self, Self::Io(..) | Self::Overflow { .. })
    }

    pub(crate) fn io(err: &io::Error) -> Self {
        Self::Io(err.kind(), err.to_string())
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Device(msg) => write!(f, "device error: {msg}"),
            Self::NotStarted => write!(f, "transport not started"),
            Self::Stopped => write!(f, "transport stopped"),
            Self::Timeout => write!(f, "timed out waiting for device"),
            Self::Io(kind, msg) => write!(f, "I/O fault ({kind:?}): {msg}"),
            Self::Overflow { waiting, limit } => {
                write!(f, "too many incoming bytes waiting ({waiting} > {limit})")
            }
            Self::MalformedResponse(msg) => write!(f, "malformed response: {msg}"),
            Self::InvalidRequest(msg) => write!(f, "invalid request: {msg}"),
        }
    }
}

impl std::error::Error for TransportError {}

impl From<TransportError> for Error {
    fn from(e: TransportError) -> Self {
        Self::Transport(e)
    }
}

// ---------------------------------------------------------------------------
// Batch errors
// ---------------------------------------------------------------------------

/// A response batch whose shape does not match the request batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchError {
    /// `status` / `body` lengths differ from the number of sub-requests.
    LengthMismatch {
        expected: usize,
        status: usize,
        body: usize,
    },
}

impl fmt::Display for BatchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::LengthMismatch {
                expected,
                status,
                body,
            } => write!(
                f,
                "expected {expected} results, got {status} statuses and {body} bodies"
            ),
        }
    }
}

impl std::error::Error for BatchError {}

impl From<BatchError> for Error {
    fn from(e: BatchError) -> Self {
        Self::Batch(e)
    }
}

// ---------------------------------------------------------------------------
// Identity errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub enum IdentityError {
    /// No wireless interface was found to take a MAC address from.
    NoInterface,
    /// The interface address file did not hold a MAC address.
    BadMac(String),
    /// The MAC list file could not be read or parsed.
    MacList(String),
    /// This robot's MAC address is not in the MAC list.
    UnknownMac(String),
    Io(io::Error),
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NoInterface => write!(f, "no wlan interface found"),
            Self::BadMac(raw) => write!(f, "not a MAC address: {raw:?}"),
            Self::MacList(msg) => write!(f, "could not load MAC list: {msg}"),
            Self::UnknownMac(mac) => write!(f, "MAC address {mac} not in supplied MAC list"),
            Self::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for IdentityError {}

impl From<io::Error> for IdentityError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<IdentityError> for Error {
    fn from(e: IdentityError) -> Self {
        Self::Identity(e)
    }
}

// ---------------------------------------------------------------------------
// Fleet link errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FleetError {
    /// The broker could not be reached.
    Connect(String),
    /// The link refused a publish or subscribe request.
    Rejected(String),
}

impl fmt::Display for FleetError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connect(msg) => write!(f, "connect failed: {msg}"),
            Self::Rejected(msg) => write!(f, "request rejected: {msg}"),
        }
    }
}

impl std::error::Error for FleetError {}

impl From<FleetError> for Error {
    fn from(e: FleetError) -> Self {
        Self::Fleet(e)
    }
}

// ---------------------------------------------------------------------------
// Configuration errors
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigError {
    /// A field failed validation. Carries the field name.
    Invalid(&'static str),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Invalid(field) => write!(f, "invalid value for {field}"),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Self::Config(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Agent-wide `Result` alias.
pub type Result<T> = core::result::Result<T, Error>;
