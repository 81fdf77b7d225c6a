//! Error handling for mazetune.
//!
//! Every fallible operation returns [`Result`], whose error carries an
//! [`ErrorKind`] modelled on gRPC status codes together with the underlying
//! error. Domain failures such as [`AuthError`](crate::auth::AuthError) and
//! [`PlaybackError`](crate::player::PlaybackError) are wrapped with a fitting
//! kind and can be recovered with [`Error::downcast`].
//!
//! # Example
//!
//! ```rust
//! use mazetune::error::{Error, ErrorKind, Result};
//!
//! fn lookup(found: bool) -> Result<()> {
//!     if !found {
//!         return Err(Error::not_found("no such artist"));
//!     }
//!     Ok(())
//! }
//!
//! assert_eq!(lookup(false).unwrap_err().kind, ErrorKind::NotFound);
//! ```

#![allow(clippy::enum_glob_use)]

use std::fmt;
use thiserror::Error;

/// Error kind plus the error that caused it.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Box<dyn std::error::Error + Send + Sync>,
}

/// Standard result type for mazetune operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories based on gRPC status codes.
///
/// The HTTP status each kind corresponds to is noted per variant. See
/// [gRPC status codes](https://github.com/googleapis/googleapis/blob/master/google/rpc/code.proto).
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
#[repr(u32)]
pub enum ErrorKind {
    /// 499 Client Closed Request
    #[error("operation was cancelled")]
    Cancelled = 1,

    /// 500 Internal Server Error
    #[error("unknown error")]
    Unknown = 2,

    /// 400 Bad Request
    #[error("invalid argument specified")]
    InvalidArgument = 3,

    /// 504 Gateway Timeout
    #[error("operation timed out")]
    DeadlineExceeded = 4,

    /// 404 Not Found
    #[error("not found")]
    NotFound = 5,

    /// 409 Conflict
    #[error("attempt to create what already exists")]
    AlreadyExists = 6,

    /// 403 Forbidden
    #[error("permission denied")]
    PermissionDenied = 7,

    /// 429 Too Many Requests
    #[error("resource has been exhausted")]
    ResourceExhausted = 8,

    /// 400 Bad Request
    #[error("invalid state")]
    FailedPrecondition = 9,

    /// 409 Conflict
    #[error("operation aborted")]
    Aborted = 10,

    /// 500 Internal Server Error
    #[error("internal error")]
    Internal = 13,

    /// 503 Service Unavailable
    #[error("service unavailable")]
    Unavailable = 14,

    /// 500 Internal Server Error
    #[error("unrecoverable data loss or corruption")]
    DataLoss = 15,

    /// 401 Unauthorized
    #[error("no valid authentication credentials")]
    Unauthenticated = 16,
}

/// Generates one shorthand constructor per error kind.
macro_rules! constructors {
    ($($(#[$meta:meta])* $name:ident => $kind:ident;)*) => {
        $(
            $(#[$meta])*
            pub fn $name<E>(error: E) -> Self
            where
                E: Into<Box<dyn std::error::Error + Send + Sync>>,
            {
                Self::new(ErrorKind::$kind, error)
            }
        )*
    };
}

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    constructors! {
        /// An operation was interrupted by a conflicting change.
        aborted => Aborted;
        /// Something that should be created exists already.
        already_exists => AlreadyExists;
        /// The caller gave up on the operation.
        cancelled => Cancelled;
        /// Data was truncated or corrupted.
        data_loss => DataLoss;
        /// A deadline passed before the operation completed.
        deadline_exceeded => DeadlineExceeded;
        /// The system is not in the state the operation requires.
        failed_precondition => FailedPrecondition;
        /// An invariant of mazetune itself was broken.
        internal => Internal;
        /// The caller passed something malformed.
        invalid_argument => InvalidArgument;
        /// A requested entity does not exist.
        not_found => NotFound;
        /// The caller may not perform the operation.
        permission_denied => PermissionDenied;
        /// A quota or limit was hit.
        resource_exhausted => ResourceExhausted;
        /// Credentials are missing, expired or rejected.
        unauthenticated => Unauthenticated;
        /// The remote service cannot be reached or refused the request.
        unavailable => Unavailable;
        /// Anything that fits no other category.
        unknown => Unknown;
    }

    /// Attempts to downcast the underlying error to a concrete type.
    ///
    /// ```rust
    /// use mazetune::{error::Error, player::PlaybackError};
    ///
    /// let error = Error::from(PlaybackError::DeviceNotReady);
    /// assert!(matches!(
    ///     error.downcast::<PlaybackError>(),
    ///     Some(PlaybackError::DeviceNotReady)
    /// ));
    /// ```
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.error.source()
    }
}

/// Formats as `"{kind}: {details}"`.
impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: ", self.kind)?;
        self.error.fmt(fmt)
    }
}

/// Maps IO errors onto their logical equivalents.
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::*;
        match err.kind() {
            NotFound => Self::not_found(err),
            PermissionDenied => Self::permission_denied(err),
            AddrInUse | AlreadyExists => Self::already_exists(err),
            AddrNotAvailable | ConnectionRefused | NotConnected => Self::unavailable(err),
            BrokenPipe | ConnectionReset | ConnectionAborted => Self::aborted(err),
            Interrupted | WouldBlock => Self::cancelled(err),
            UnexpectedEof => Self::data_loss(err),
            TimedOut => Self::deadline_exceeded(err),
            InvalidInput | InvalidData => Self::invalid_argument(err),
            WriteZero => Self::resource_exhausted(err),
            _ => Self::unknown(err),
        }
    }
}

/// Maps HTTP client errors by what went wrong.
impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        if err.is_body() {
            return Self::data_loss(err);
        }

        if err.is_decode() {
            return Self::invalid_argument(err);
        }

        if err.is_builder() {
            return Self::internal(err);
        }

        if err.is_timeout() {
            return Self::deadline_exceeded(err);
        }

        if err.is_connect() || err.is_redirect() {
            return Self::unavailable(err);
        }

        if err.is_status() {
            return Self::failed_precondition(err);
        }

        Self::unknown(err)
    }
}

/// JSON errors go through the IO error mapping.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        std::io::Error::from(err).into()
    }
}

impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_argument(err)
    }
}

impl From<http::header::InvalidHeaderValue> for Error {
    fn from(e: http::header::InvalidHeaderValue) -> Self {
        Self::internal(e.to_string())
    }
}

impl From<url::ParseError> for Error {
    fn from(e: url::ParseError) -> Self {
        Self::invalid_argument(e.to_string())
    }
}

impl From<tokio::time::error::Elapsed> for Error {
    fn from(e: tokio::time::error::Elapsed) -> Self {
        Self::deadline_exceeded(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_includes_kind_and_details() {
        let err = Error::not_found("artist not in manifest");
        assert_eq!(err.to_string(), "not found: artist not in manifest");
    }

    #[test]
    fn io_errors_map_to_kinds() {
        let missing = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        assert_eq!(Error::from(missing).kind, ErrorKind::NotFound);

        let timeout = std::io::Error::new(std::io::ErrorKind::TimedOut, "slow");
        assert_eq!(Error::from(timeout).kind, ErrorKind::DeadlineExceeded);
    }

    #[test]
    fn json_errors_are_invalid_arguments() {
        let err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        // Truncated input is reported as unexpected EOF.
        assert_eq!(Error::from(err).kind, ErrorKind::DataLoss);

        let err = serde_json::from_str::<u8>("\"x\"").unwrap_err();
        assert_eq!(Error::from(err).kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn downcast_recovers_source_type() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "oh no");
        let err = Error::from(io);
        assert!(err.downcast::<std::io::Error>().is_some());
        assert!(err.downcast::<std::fmt::Error>().is_none());
    }
}
