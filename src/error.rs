//! Error types for the BeamLink library.
//!
//! Two layers:
//!
//! - [`ErrorCode`]: stable numeric codes, grouped by range so a host can
//!   classify a failure from the number alone (`1–99` initialisation,
//!   `100–199` connection, `200–299` message, and so on).
//! - [`LinkError`]: the typed result of fallible engine operations.  Every
//!   variant maps onto exactly one [`ErrorCode`] via [`LinkError::code`].
//!
//! All variants are `Copy` so they can be stored as "last error" without
//! allocation.

use core::fmt;

use crate::link::stack::StackError;

// ---------------------------------------------------------------------------
// Numeric error codes
// ---------------------------------------------------------------------------

/// Stable numeric error codes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u16)]
pub enum ErrorCode {
    Ok = 0,

    // ── Initialisation (1–99) ─────────────────────────────
    AlreadyInitialized = 1,
    InvalidDeviceName = 2,
    BleInitFailed = 3,
    ServerCreateFailed = 4,
    ServiceCreateFailed = 5,
    CharacteristicCreateFailed = 6,
    AdvertisingFailed = 7,

    // ── Connection (100–199) ──────────────────────────────
    NotConnected = 100,
    ConnectionLost = 101,
    Disconnected = 102,

    // ── Message (200–299) ─────────────────────────────────
    MessageTooLarge = 200,
    MessageEmpty = 201,
    NotifyFailed = 202,
    InvalidMessageFormat = 203,
    MessageQueueFull = 204,

    // ── Configuration (300–399) ───────────────────────────
    ConfigNotFound = 300,
    ConfigParseError = 301,
    InvalidConfigValue = 302,
    StorageInitFailed = 303,

    // ── State (400–499) ───────────────────────────────────
    NotInitialized = 400,
    InvalidState = 401,
    OperationNotPermitted = 402,

    // ── Security (500–599) ────────────────────────────────
    PairingFailed = 500,
    AuthenticationFailed = 501,
    EncryptionFailed = 502,
    InvalidPasskey = 503,

    // ── Resources (600–699) ───────────────────────────────
    OutOfMemory = 600,
    BufferOverflow = 601,
    Timeout = 602,

    Unknown = 999,
}

impl ErrorCode {
    /// Numeric value as surfaced to hosts.
    pub const fn as_u16(self) -> u16 {
        self as u16
    }

    /// Human-readable description.
    pub const fn describe(self) -> &'static str {
        match self {
            Self::Ok => "Success",
            Self::AlreadyInitialized => "Already initialized",
            Self::InvalidDeviceName => "Invalid device name",
            Self::BleInitFailed => "BLE initialization failed",
            Self::ServerCreateFailed => "Failed to create BLE server",
            Self::ServiceCreateFailed => "Failed to create BLE service",
            Self::CharacteristicCreateFailed => "Failed to create characteristic",
            Self::AdvertisingFailed => "Failed to start advertising",
            Self::NotConnected => "No client connected",
            Self::ConnectionLost => "Connection lost",
            Self::Disconnected => "Client disconnected",
            Self::MessageTooLarge => "Message exceeds MTU size",
            Self::MessageEmpty => "Message is empty",
            Self::NotifyFailed => "Failed to send notification",
            Self::InvalidMessageFormat => "Invalid message format",
            Self::MessageQueueFull => "Message queue is full",
            Self::ConfigNotFound => "Configuration file not found",
            Self::ConfigParseError => "Configuration parsing error",
            Self::InvalidConfigValue => "Invalid configuration value",
            Self::StorageInitFailed => "Configuration storage initialization failed",
            Self::NotInitialized => "Not initialized",
            Self::InvalidState => "Invalid state",
            Self::OperationNotPermitted => "Operation not permitted",
            Self::PairingFailed => "Pairing failed",
            Self::AuthenticationFailed => "Authentication failed",
            Self::EncryptionFailed => "Encryption failed",
            Self::InvalidPasskey => "Invalid passkey",
            Self::OutOfMemory => "Out of memory",
            Self::BufferOverflow => "Buffer overflow",
            Self::Timeout => "Operation timeout",
            Self::Unknown => "Unknown error",
        }
    }

    pub const fn is_ok(self) -> bool {
        matches!(self, Self::Ok)
    }

    pub const fn is_init_error(self) -> bool {
        matches!(self.as_u16(), 1..=99)
    }

    pub const fn is_connection_error(self) -> bool {
        matches!(self.as_u16(), 100..=199)
    }

    pub const fn is_message_error(self) -> bool {
        matches!(self.as_u16(), 200..=299)
    }

    pub const fn is_config_error(self) -> bool {
        matches!(self.as_u16(), 300..=399)
    }

    pub const fn is_security_error(self) -> bool {
        matches!(self.as_u16(), 500..=599)
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.describe(), self.as_u16())
    }
}

// ---------------------------------------------------------------------------
// Engine errors
// ---------------------------------------------------------------------------

/// Failure of a [`BeamLink`](crate::link::BeamLink) operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkError {
    /// `begin` called while the engine is running.
    AlreadyInitialized,
    /// Device name empty or longer than the advertising payload allows.
    InvalidDeviceName,
    /// Operation requires a successful `begin`.
    NotInitialized,
    /// No peer is connected.
    NotConnected,
    /// Outbound text was empty.
    MessageEmpty,
    /// The BLE stack rejected an operation.
    Stack(StackError),
}

impl LinkError {
    /// Stable numeric code for this failure.
    pub const fn code(self) -> ErrorCode {
        match self {
            Self::AlreadyInitialized => ErrorCode::AlreadyInitialized,
            Self::InvalidDeviceName => ErrorCode::InvalidDeviceName,
            Self::NotInitialized => ErrorCode::NotInitialized,
            Self::NotConnected => ErrorCode::NotConnected,
            Self::MessageEmpty => ErrorCode::MessageEmpty,
            Self::Stack(e) => e.code(),
        }
    }
}

impl fmt::Display for LinkError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::AlreadyInitialized => write!(f, "link already initialised"),
            Self::InvalidDeviceName => write!(f, "device name must be 1-32 bytes"),
            Self::NotInitialized => write!(f, "link not initialised"),
            Self::NotConnected => write!(f, "no peer connected"),
            Self::MessageEmpty => write!(f, "refusing to send empty message"),
            Self::Stack(e) => write!(f, "stack: {e}"),
        }
    }
}

impl From<StackError> for LinkError {
    fn from(e: StackError) -> Self {
        Self::Stack(e)
    }
}

// ---------------------------------------------------------------------------
// Convenience Result alias
// ---------------------------------------------------------------------------

/// Library-wide `Result` alias.
pub type Result<T> = core::result::Result<T, LinkError>;
