//! Error types for archbit archives

use std::io;

use thiserror::Error;

/// Errors that can occur while encoding or decoding an archive
#[derive(Debug, Error)]
pub enum Error {
    /// Heap growth request could not be satisfied
    #[error("failed to allocate {requested} bytes of archive storage")]
    Allocation {
        /// Total heap capacity that was requested
        requested: usize,
    },
    /// Decoder needed more bytes than memory and channel could supply
    #[error("archive underrun: needed {requested} bytes, {available} available")]
    Underrun {
        /// Bytes the operation needed
        requested: usize,
        /// Bytes that could actually be supplied
        available: usize,
    },
    /// A length, count or payload is internally inconsistent
    #[error("framing error: {0}")]
    Framing(#[from] FramingFault),
    /// The attached channel failed
    #[error("channel i/o failed: {0}")]
    Channel(#[from] io::Error),
}

/// Detail of a [`Error::Framing`] failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum FramingFault {
    /// Record length points past the end of a detached archive
    #[error("record declares {declared} bytes but only {available} remain")]
    RecordOverrun {
        /// Length read from the record prefix
        declared: usize,
        /// Bytes left in the archive
        available: usize,
    },
    /// Scalar record width does not match the requested type
    #[error("expected a {expected}-byte scalar, record holds {found} bytes")]
    WidthMismatch {
        /// `size_of` the requested type
        expected: usize,
        /// Length read from the record prefix
        found: usize,
    },
    /// Length or count does not fit the 4-byte prefix
    #[error("length {length} does not fit a 4-byte prefix")]
    LengthOverflow {
        /// Offending length
        length: usize,
    },
    /// String record is not valid UTF-8
    #[error("string record is not valid UTF-8 (valid up to byte {valid_up_to})")]
    InvalidUtf8 {
        /// Length of the valid prefix
        valid_up_to: usize,
    },
    /// Bit pattern is not a valid value of the scalar type
    #[error("invalid bit pattern for {type_name}")]
    InvalidScalar {
        /// Name of the scalar type
        type_name: &'static str,
    },
}

/// Comparable classification of an [`Error`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// See [`Error::Allocation`]
    Allocation,
    /// See [`Error::Underrun`]
    Underrun,
    /// See [`Error::Framing`]
    Framing,
    /// See [`Error::Channel`]
    Channel,
}

impl Error {
    /// Returns the error class, ignoring its context
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Allocation { .. } => ErrorKind::Allocation,
            Error::Underrun { .. } => ErrorKind::Underrun,
            Error::Framing(_) => ErrorKind::Framing,
            Error::Channel(_) => ErrorKind::Channel,
        }
    }

    /// Returns the framing detail, if this is a framing error
    pub fn framing_fault(&self) -> Option<FramingFault> {
        match self {
            Error::Framing(fault) => Some(*fault),
            _ => None,
        }
    }
}

impl ErrorKind {
    /// Returns a human-readable description of the error class
    pub const fn description(&self) -> &'static str {
        match self {
            ErrorKind::Allocation => "archive storage could not grow",
            ErrorKind::Underrun => "not enough bytes left in the archive",
            ErrorKind::Framing => "inconsistent record framing",
            ErrorKind::Channel => "attached channel failed",
        }
    }
}

/// Result type alias for archbit operations
pub type Result<T> = core::result::Result<T, Error>;
