//! Transport error types.

use core::fmt;

/// Errors surfaced by the public API.
///
/// Faults local to one transfer — a bus send or read failure, a malformed
/// frame, a state timeout — abort that transfer inside `tick` and are not
/// surfaced here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MtpError {
    /// Payload empty or too long, or an address outside the 29-bit range.
    InvalidArgument,
    /// Configuration or buffer bound rejected at construction.
    InvalidConfig,
    /// The machine did not become free within the send timeout.
    Busy,
    /// Bytes that do not form a valid frame of any class.
    InvalidFrame,
}

impl fmt::Display for MtpError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            MtpError::InvalidArgument => "invalid argument",
            MtpError::InvalidConfig => "invalid configuration",
            MtpError::Busy => "transport busy",
            MtpError::InvalidFrame => "malformed frame",
        };
        f.write_str(msg)
    }
}

#[cfg(feature = "std")]
impl std::error::Error for MtpError {}
