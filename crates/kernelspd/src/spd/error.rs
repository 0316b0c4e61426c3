//! Error types for SPD operations.

use std::fmt;

/// Result type for SPD operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Structured information about a single configuration validation failure.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationErrorInfo {
    /// Field that failed validation.
    pub field: String,
    /// Description of the problem.
    pub message: String,
}

impl ValidationErrorInfo {
    /// Create a new validation error entry.
    pub fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for ValidationErrorInfo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

/// Errors that can occur while decoding or applying SPD commands.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fewer bytes remain than a command header needs.
    #[error("short buffer: {remaining} bytes left, command header is {header} bytes")]
    ShortBuffer {
        /// Bytes left in the write.
        remaining: usize,
        /// Size of the fixed command header.
        header: usize,
    },

    /// Command bytecount is smaller than the header itself.
    #[error("malformed command: bytecount {bytecount} less than header size {header}")]
    BytecountTooSmall {
        /// Declared bytecount.
        bytecount: u32,
        /// Size of the fixed command header.
        header: usize,
    },

    /// Command bytecount exceeds the configured ceiling.
    #[error("malformed command: bytecount {bytecount} exceeds maximum {max}")]
    BytecountTooLarge {
        /// Declared bytecount.
        bytecount: u32,
        /// Configured maximum.
        max: u32,
    },

    /// Command claims more bytes than the write contains.
    #[error("malformed command: bytecount {bytecount} but only {remaining} bytes remain")]
    Truncated {
        /// Declared bytecount.
        bytecount: u32,
        /// Bytes left in the write.
        remaining: usize,
    },

    /// Policy-set id outside the valid range.
    #[error("invalid SPD id {0}")]
    InvalidSpdId(u32),

    /// Policy-set name that is neither a known name nor a number.
    #[error("invalid SPD name '{0}'")]
    InvalidSpdName(String),

    /// Allocation for an entry or boundary buffer failed.
    #[error("allocation of {0} bytes failed")]
    ResourceExhausted(usize),

    /// Selector payload failed the well-formedness check.
    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    /// Boundary specification failed validation.
    #[error("invalid IPsec boundary: {0}")]
    InvalidBoundary(String),

    /// ACTIVATE while already active.
    #[error("kernel SPD already active")]
    AlreadyActive,

    /// Command requires an active SPD.
    #[error("kernel SPD is not active")]
    NotActive,

    /// VERSION_SYNC payload has the wrong size.
    #[error("invalid version size {actual}; should be {expected}")]
    InvalidVersionSize {
        /// Payload size received.
        actual: usize,
        /// Size of the version field.
        expected: usize,
    },

    /// Caller speaks a different protocol version.
    #[error("incompatible version {actual}; should be {expected}")]
    VersionMismatch {
        /// Version sent by the policy manager.
        actual: u32,
        /// Compiled-in protocol version.
        expected: u32,
    },

    /// No entry with this id in the policy set.
    #[error("entry {entry_id} not found from spd id {spd_id}")]
    EntryNotFound {
        /// Policy-set id.
        spd_id: u32,
        /// Entry id.
        entry_id: u32,
    },

    /// Packet hooks could not be installed.
    #[error("failed activating packet hooks: {0}")]
    HookActivation(String),

    /// The control channel is already held by another opener.
    #[error("kernel SPD control channel already open")]
    AlreadyOpen,

    /// The SPD has been torn down.
    #[error("kernel SPD is uninitialised")]
    Uninitialised,

    /// Configuration validation failed.
    #[error("validation failed: {}", format_validation(.0))]
    Validation(Vec<ValidationErrorInfo>),
}

fn format_validation(errors: &[ValidationErrorInfo]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("; ")
}

impl Error {
    /// Check if this error comes from command framing.
    ///
    /// Framing errors abort the remainder of the write they occur in.
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Self::ShortBuffer { .. }
                | Self::BytecountTooSmall { .. }
                | Self::BytecountTooLarge { .. }
                | Self::Truncated { .. }
        )
    }

    /// Check if this error is a state conflict (already active / not active / already open).
    pub fn is_state_conflict(&self) -> bool {
        matches!(self, Self::AlreadyActive | Self::NotActive | Self::AlreadyOpen)
    }

    /// Check if this error is a version negotiation failure.
    pub fn is_version_mismatch(&self) -> bool {
        matches!(
            self,
            Self::InvalidVersionSize { .. } | Self::VersionMismatch { .. }
        )
    }

    /// Get the errno value the control file reports for this error.
    pub fn errno(&self) -> i32 {
        match self {
            Self::BytecountTooSmall { .. }
            | Self::BytecountTooLarge { .. }
            | Self::Truncated { .. }
            | Self::VersionMismatch { .. }
            | Self::Validation(_) => libc::EINVAL,
            _ => libc::EFAULT,
        }
    }

    /// Get the negative status returned to the writer.
    pub fn status(&self) -> isize {
        -(self.errno() as isize)
    }
}

/// A control-channel write that stopped at a failing command.
///
/// Commands before the failing one have been applied; `consumed` counts
/// their bytes. Nothing after the failing command was dispatched.
#[derive(Debug, thiserror::Error)]
#[error("control write failed after {consumed} bytes: {error}")]
pub struct WriteError {
    /// Bytes of fully applied commands preceding the failure.
    pub consumed: usize,
    /// The failure itself.
    #[source]
    pub error: Error,
}

impl WriteError {
    pub(crate) fn new(consumed: usize, error: Error) -> Self {
        Self { consumed, error }
    }

    /// Get the negative status returned to the writer.
    pub fn status(&self) -> isize {
        self.error.status()
    }
}
