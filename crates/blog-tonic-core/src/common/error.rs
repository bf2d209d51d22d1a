//! Error types for the blog service.
//!
//! This module defines the central `Error` enum, which captures every failure
//! a call can surface to a client, and the `ErrorKind` taxonomy callers branch
//! on. `From<Error>` for `tonic::Status` maps each kind to its gRPC code, and
//! `ErrorKind: From<tonic::Code>` recovers the kind on the client side without
//! parsing message text.
//!
//! ## Error Cases
//! - `InvalidId`: The supplied identifier is not a well-formed object id.
//! - `NotFound`: No record matches a well-formed identifier.
//! - `Internal`: The store failed or returned something that cannot be
//!   decoded into a record.
//! - `RequestCancelled`: The client went away mid-stream.
//! - `ServiceShutdown`: A request arrived while the service was draining.

use tonic::{Code, Status};

pub type Result<T> = core::result::Result<T, Error>;

/// The failure categories a caller can distinguish programmatically.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    Internal,
    Unavailable,
    Cancelled,
    /// Any status code the service itself never produces (transport errors,
    /// deadlines, cancellations).
    Other(Code),
}

impl ErrorKind {
    /// The gRPC status code carrying this kind on the wire.
    pub const fn code(self) -> Code {
        match self {
            Self::InvalidArgument => Code::InvalidArgument,
            Self::NotFound => Code::NotFound,
            Self::Internal => Code::Internal,
            Self::Unavailable => Code::Unavailable,
            Self::Cancelled => Code::Cancelled,
            Self::Other(code) => code,
        }
    }

    /// Stable lowercase label, used as a metric attribute.
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::InvalidArgument => "invalid_argument",
            Self::NotFound => "not_found",
            Self::Internal => "internal",
            Self::Unavailable => "unavailable",
            Self::Cancelled => "cancelled",
            Self::Other(_) => "other",
        }
    }
}

impl From<Code> for ErrorKind {
    fn from(code: Code) -> Self {
        match code {
            Code::InvalidArgument => Self::InvalidArgument,
            Code::NotFound => Self::NotFound,
            Code::Internal => Self::Internal,
            Code::Unavailable => Self::Unavailable,
            Code::Cancelled => Self::Cancelled,
            other => Self::Other(other),
        }
    }
}

impl From<&Status> for ErrorKind {
    fn from(status: &Status) -> Self {
        status.code().into()
    }
}

/// Unified error type for the blog service.
#[derive(Clone, thiserror::Error, Debug, PartialEq, Eq)]
pub enum Error {
    /// The identifier could not be parsed into the store's id format.
    #[error("Cannot parse ID {id:?}: {reason}")]
    InvalidId { id: String, reason: String },

    /// No record exists for the identifier.
    #[error("Cannot find blog with specified ID: {id}")]
    NotFound { id: String },

    /// The store operation failed or produced an unexpected shape.
    #[error("Internal error: {context}")]
    Internal { context: String },

    /// The client aborted the request.
    #[error("Request cancelled by client")]
    RequestCancelled,

    /// The service is in the process of shutting down.
    #[error("Service is shutting down")]
    ServiceShutdown,
}

impl Error {
    pub fn internal(context: impl Into<String>) -> Self {
        Self::Internal {
            context: context.into(),
        }
    }

    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidId { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Internal { .. } => ErrorKind::Internal,
            Self::RequestCancelled => ErrorKind::Cancelled,
            Self::ServiceShutdown => ErrorKind::Unavailable,
        }
    }
}

impl From<Error> for Status {
    fn from(err: Error) -> Self {
        let message = err.to_string();
        match err {
            Error::InvalidId { .. } => Status::invalid_argument(message),
            Error::NotFound { .. } => Status::not_found(message),
            Error::Internal { .. } => Status::internal(message),
            Error::RequestCancelled => Status::cancelled(message),
            Error::ServiceShutdown => Status::unavailable(message),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_follow_kind() {
        let cases = [
            Error::InvalidId {
                id: "not-an-id".into(),
                reason: "bad hex".into(),
            },
            Error::NotFound {
                id: "5c54b08ebe020342da2b13a8".into(),
            },
            Error::internal("insert failed"),
            Error::RequestCancelled,
            Error::ServiceShutdown,
        ];

        for err in cases {
            let kind = err.kind();
            let status = Status::from(err);
            assert_eq!(status.code(), kind.code());
            assert_eq!(ErrorKind::from(&status), kind);
        }
    }

    #[test]
    fn status_message_is_human_readable() {
        let status = Status::from(Error::NotFound {
            id: "5c54b08ebe020342da2b13a8".into(),
        });
        assert_eq!(
            status.message(),
            "Cannot find blog with specified ID: 5c54b08ebe020342da2b13a8"
        );
    }

    #[test]
    fn foreign_codes_are_preserved() {
        assert_eq!(
            ErrorKind::from(Code::DeadlineExceeded),
            ErrorKind::Other(Code::DeadlineExceeded)
        );
        assert_eq!(
            ErrorKind::Other(Code::Aborted).code(),
            Code::Aborted
        );
        assert_eq!(ErrorKind::Other(Code::Aborted).as_str(), "other");
    }
}
