//! Outcome codes reported to the caller after each image request.

use crate::error::Error;

/// The closed set of outcomes a caller can receive for one image request.
///
/// Exactly one code is reported per request; there is no partial or progress
/// reporting. The discriminants are the wire values and must not be
/// renumbered.
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResponseCode {
    /// The image was quantized and its hit file written completely.
    Ok = 0,
    /// The image byte buffer could not be decoded.
    ImageNotDecoded = 1,
    /// The image exceeds the configured upper size bound.
    ImageTooLarge = 2,
    /// The image falls below the configured lower size bound.
    ImageTooSmall = 3,
    /// Persistence failures and all otherwise-unclassified internal errors.
    GenericError = 4,
}

impl ResponseCode {
    /// Returns the wire value of this code.
    #[must_use]
    pub fn as_u8(self) -> u8 {
        self as u8
    }

    /// Converts a wire value back into a code, if it is a known one.
    #[must_use]
    pub fn from_u8(value: u8) -> Option<Self> {
        match value {
            0 => Some(Self::Ok),
            1 => Some(Self::ImageNotDecoded),
            2 => Some(Self::ImageTooLarge),
            3 => Some(Self::ImageTooSmall),
            4 => Some(Self::GenericError),
            _ => None,
        }
    }

    /// Returns `true` for the success outcome.
    #[must_use]
    pub fn is_ok(self) -> bool {
        self == Self::Ok
    }
}

impl From<&Error> for ResponseCode {
    /// Total mapping from pipeline errors to caller-visible outcomes.
    ///
    /// Startup errors never reach a per-request reply path, but the mapping
    /// stays total so new error variants cannot silently leak out unmapped.
    fn from(err: &Error) -> Self {
        match err {
            Error::ImageNotDecoded(_) => Self::ImageNotDecoded,
            Error::ImageTooLarge { .. } => Self::ImageTooLarge,
            Error::ImageTooSmall { .. } => Self::ImageTooSmall,
            _ => Self::GenericError,
        }
    }
}
