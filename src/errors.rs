// cansocket/src/errors.rs
//
// Socket error kinds, OS error classification and crate errors.
//
// This file is part of the Rust 'cansocket' library.
//
// Licensed under the MIT license:
//   <LICENSE or http://opensource.org/licenses/MIT>
// This file may not be copied, modified, or distributed except according
// to those terms.

//! Socket errors.
//!
//! Every failure of a kernel call is translated exactly once, at the
//! boundary, into a [`SocketErrorInfo`]: one of a closed set of
//! [`SocketError`] kinds plus a human readable message. The socket keeps
//! the last one as its current error and reports it with an error event.
//!
//! The OS error codes are mapped as follows:
//!
//! ```text
//! ENODEV                            => NoSuchDevice
//! EACCES                            => AccessDenied
//! EMFILE, ENFILE, ENOBUFS, ENOMEM   => ResourceExhausted
//! EAFNOSUPPORT, EINVAL,
//!   EPROTONOSUPPORT                 => UnsupportedOperation
//! anything else                     => Unknown
//! ```

use std::{fmt, io};
use thiserror::Error;

// ===== SocketError =====

/// The closed set of error kinds a socket can report.
#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub enum SocketError {
    /// An error that could not be classified
    Unknown,
    /// The CAN interface does not exist
    NoSuchDevice,
    /// The process lacks the privileges for the operation
    AccessDenied,
    /// The system ran out of descriptors, buffer space or memory
    ResourceExhausted,
    /// A blocking wait ran out of time
    Timeout,
    /// The operation or option is not supported in the current state
    UnsupportedOperation,
    /// The operation was attempted in the wrong state
    OperationError,
    /// Writing to the kernel failed
    WriteError,
    /// Reading from the kernel failed
    ReadError,
    /// No error
    #[default]
    NoError,
}

impl SocketError {
    /// The canonical message for the error kind.
    pub fn message(&self) -> &'static str {
        use SocketError::*;
        match *self {
            Unknown => "Unknown error",
            NoSuchDevice => "No such device",
            AccessDenied => "Permission denied",
            ResourceExhausted => "Resource error",
            Timeout => "Operation timed out",
            UnsupportedOperation => "Unsupported socket operation",
            OperationError => "Operation error",
            WriteError => "Write error",
            ReadError => "Read error",
            NoError => "No error",
        }
    }
}

impl fmt::Display for SocketError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

// ===== SocketErrorInfo =====

/// An error kind together with its descriptive message.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct SocketErrorInfo {
    kind: SocketError,
    message: String,
}

impl SocketErrorInfo {
    /// Creates the error with the canonical message for the kind.
    pub fn new(kind: SocketError) -> Self {
        Self::with_message(kind, kind.message())
    }

    /// Creates the error with a specific message.
    pub fn with_message(kind: SocketError, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// Classifies an OS error code.
    pub fn from_errno(code: i32) -> Self {
        use SocketError::*;
        let (kind, msg) = match code {
            libc::ENODEV => (NoSuchDevice, "No such device system error"),
            libc::EACCES => (AccessDenied, "Permission denied system error"),
            libc::EMFILE => (ResourceExhausted, "Too many open files system error"),
            libc::ENFILE => (ResourceExhausted, "File table overflow system error"),
            libc::ENOBUFS => (ResourceExhausted, "No buffer space available system error"),
            libc::ENOMEM => (ResourceExhausted, "Out of memory system error"),
            libc::EAFNOSUPPORT => (
                UnsupportedOperation,
                "Address family not supported by protocol system error",
            ),
            libc::EINVAL => (UnsupportedOperation, "Invalid argument system error"),
            libc::EPROTONOSUPPORT => (
                UnsupportedOperation,
                "Protocol not supported system error",
            ),
            _ => {
                let err = io::Error::from_raw_os_error(code);
                return Self::with_message(Unknown, err.to_string());
            }
        };
        Self::with_message(kind, msg)
    }

    /// Classifies an I/O error.
    ///
    /// Errors that carry an OS code go through [`from_errno`](Self::from_errno),
    /// anything else is `Unknown` with the error's own description.
    pub fn from_io(err: &io::Error) -> Self {
        match err.raw_os_error() {
            Some(code) => Self::from_errno(code),
            None => Self::with_message(SocketError::Unknown, err.to_string()),
        }
    }

    /// The error kind
    pub fn kind(&self) -> SocketError {
        self.kind
    }

    /// The descriptive message
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Gets the same error reported under a different kind.
    pub(crate) fn reclassify(mut self, kind: SocketError) -> Self {
        self.kind = kind;
        self
    }
}

impl Default for SocketErrorInfo {
    fn default() -> Self {
        Self::new(SocketError::NoError)
    }
}

impl From<SocketError> for SocketErrorInfo {
    fn from(kind: SocketError) -> Self {
        Self::new(kind)
    }
}

impl From<io::Error> for SocketErrorInfo {
    fn from(err: io::Error) -> Self {
        Self::from_io(&err)
    }
}

// ===== ConstructionError =====

/// Error that occurs when creating or modifying CAN frames
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ConstructionError {
    /// Trying to create a specific frame type from an incompatible type
    #[error("Incompatible frame type")]
    WrongFrameType,
    /// CAN ID was outside the range of valid IDs
    #[error("CAN ID too large")]
    IdTooLarge,
    /// Larger payload reported than can be held in the frame.
    #[error("Payload is too large")]
    TooMuchData,
    /// The length is not one of the valid CAN FD data lengths.
    #[error("Invalid data length")]
    InvalidDataLength,
}

// ===== ParseError =====

/// Error parsing a frame from its text form, like `123#DEADBEEF`.
#[derive(Error, Debug, Copy, Clone, PartialEq, Eq)]
pub enum ParseError {
    /// The ID and data are not separated by '#'
    #[error("Missing '#' separator")]
    MissingSeparator,
    /// The ID is not valid hex or is out of range
    #[error("Invalid CAN ID")]
    InvalidId,
    /// The payload is not valid hex
    #[error("Invalid frame data")]
    InvalidData,
    /// Error creating the frame
    #[error(transparent)]
    Construction(#[from] ConstructionError),
}

// ===== Error =====

/// Composite error for the cansocket library.
#[derive(Error, Debug)]
pub enum Error {
    /// A socket error
    #[error(transparent)]
    Socket(#[from] SocketErrorInfo),
    /// An error creating a frame
    #[error(transparent)]
    Construction(#[from] ConstructionError),
    /// A lower-level I/O error
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl From<SocketError> for Error {
    fn from(kind: SocketError) -> Self {
        Self::Socket(kind.into())
    }
}

impl embedded_can::Error for Error {
    fn kind(&self) -> embedded_can::ErrorKind {
        use embedded_can::ErrorKind;
        match self {
            Error::Socket(err) if err.kind() == SocketError::ResourceExhausted => {
                ErrorKind::Overrun
            }
            _ => ErrorKind::Other,
        }
    }
}

/// A result that can derive from any of the cansocket errors.
pub type Result<T> = std::result::Result<T, Error>;

/////////////////////////////////////////////////////////////////////////////

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_classification() {
        use SocketError::*;

        let cases = [
            (libc::ENODEV, NoSuchDevice),
            (libc::EACCES, AccessDenied),
            (libc::EMFILE, ResourceExhausted),
            (libc::ENFILE, ResourceExhausted),
            (libc::ENOBUFS, ResourceExhausted),
            (libc::ENOMEM, ResourceExhausted),
            (libc::EAFNOSUPPORT, UnsupportedOperation),
            (libc::EINVAL, UnsupportedOperation),
            (libc::EPROTONOSUPPORT, UnsupportedOperation),
            (libc::EIO, Unknown),
            (libc::ENETDOWN, Unknown),
        ];

        for (code, kind) in cases {
            assert_eq!(kind, SocketErrorInfo::from_errno(code).kind(), "errno {}", code);
        }
    }

    #[test]
    fn test_messages() {
        let err = SocketErrorInfo::from_errno(libc::ENODEV);
        assert_eq!("No such device system error", err.message());
        assert_eq!("No such device system error", err.to_string());

        let err = SocketErrorInfo::from_errno(libc::EMFILE);
        assert_eq!("Too many open files system error", err.message());

        let err = SocketErrorInfo::new(SocketError::Timeout);
        assert_eq!("Operation timed out", err.message());

        // Unknown codes keep the OS description
        let err = SocketErrorInfo::from_errno(libc::EIO);
        assert_eq!(io::Error::from_raw_os_error(libc::EIO).to_string(), err.message());
    }

    #[test]
    fn test_from_io() {
        let err = io::Error::from_raw_os_error(libc::EACCES);
        assert_eq!(SocketError::AccessDenied, SocketErrorInfo::from_io(&err).kind());

        let err = io::Error::new(io::ErrorKind::InvalidData, "bad frame");
        let info = SocketErrorInfo::from_io(&err);
        assert_eq!(SocketError::Unknown, info.kind());
        assert_eq!("bad frame", info.message());
    }

    #[test]
    fn test_defaults() {
        assert_eq!(SocketError::NoError, SocketError::default());
        let info = SocketErrorInfo::default();
        assert_eq!(SocketError::NoError, info.kind());
        assert_eq!("No error", info.message());
    }
}
