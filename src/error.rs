//! Error types for NetPulse.
//!
//! This module defines the single crate-wide error type. Every variant maps
//! to one of the wire-visible [`ErrorKind`] values that also show up in
//! `job.result.error.kind` — there is no separate wire-error type to keep in
//! sync with this one.

use thiserror::Error;

/// Result type alias for NetPulse operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The wire-visible error taxonomy. Every [`Error`] variant maps to exactly
/// one of these through [`Error::kind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Request body failed schema or semantic validation.
    ValidationError,
    /// Missing or invalid API key.
    AuthenticationError,
    /// The shared store (Redis) is unreachable or returned an error.
    StoreUnavailable,
    /// No eligible worker/node could be found for a request.
    WorkerUnavailable,
    /// All scheduling candidates are at capacity.
    CapacityExhausted,
    /// The requested host is already pinned under a different session.
    HostAlreadyPinned,
    /// The driver failed to open a transport-level connection.
    ConnectionFailed,
    /// The device rejected the supplied credentials.
    AuthenticationFailed,
    /// An operation exceeded its configured deadline.
    Timeout,
    /// The device driver reported a command execution failure.
    CommandFailed,
    /// The driver encountered an unexpected or malformed device response.
    ProtocolError,
    /// The job's TTL elapsed before a worker could execute it.
    JobTTLExpired,
    /// The owning worker process exited or was killed mid-job.
    WorkerTerminated,
    /// The job or session was cancelled by a caller.
    Cancelled,
    /// `Request.driver` does not name a registered driver.
    UnknownDriver,
}

/// The main error type for NetPulse.
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Request validation
    // ========================================================================
    /// Request body failed schema or semantic validation.
    #[error("validation failed: {0}")]
    Validation(String),

    // ========================================================================
    // Authentication
    // ========================================================================
    /// The caller's API key is missing or does not match configuration.
    #[error("invalid or missing API key")]
    Authentication,

    // ========================================================================
    // Shared store
    // ========================================================================
    /// The shared store backend is unreachable or returned an error.
    #[error("shared store unavailable: {0}")]
    StoreUnavailable(String),

    // ========================================================================
    // Scheduling
    // ========================================================================
    /// No node/worker satisfies the request's scheduling constraints.
    #[error("no eligible worker for host '{host}'")]
    WorkerUnavailable {
        /// Target host
        host: String,
    },

    /// Every scheduling candidate is at or above its capacity.
    #[error("capacity exhausted across {candidates} candidate node(s)")]
    CapacityExhausted {
        /// Number of candidates considered
        candidates: usize,
    },

    /// The requested host is already bound to a different pinned session.
    #[error("host '{host}' is already pinned to queue '{queue}'")]
    HostAlreadyPinned {
        /// Target host
        host: String,
        /// Existing queue binding
        queue: String,
    },

    // ========================================================================
    // Device connectivity
    // ========================================================================
    /// The driver failed to open a transport-level connection to the device.
    #[error("connection to '{host}' failed: {message}")]
    ConnectionFailed {
        /// Target host
        host: String,
        /// Error detail
        message: String,
    },

    /// The device rejected the supplied credentials.
    #[error("authentication to '{host}' failed")]
    AuthenticationFailed {
        /// Target host
        host: String,
    },

    /// An operation exceeded its configured deadline.
    #[error("operation on '{host}' timed out after {timeout_secs}s")]
    Timeout {
        /// Target host
        host: String,
        /// Configured timeout
        timeout_secs: u64,
    },

    /// The device driver reported a command execution failure.
    #[error("command failed on '{host}': {message}")]
    CommandFailed {
        /// Target host
        host: String,
        /// Error detail
        message: String,
    },

    /// The driver encountered an unexpected or malformed device response.
    #[error("protocol error on '{host}': {message}")]
    ProtocolError {
        /// Target host
        host: String,
        /// Error detail
        message: String,
    },

    // ========================================================================
    // Job lifecycle
    // ========================================================================
    /// The job's TTL elapsed before a worker picked it up.
    #[error("job '{job_id}' expired before execution (ttl {ttl_secs}s)")]
    JobTTLExpired {
        /// Job identifier
        job_id: String,
        /// Configured TTL
        ttl_secs: u64,
    },

    /// The owning worker process exited or was killed mid-job.
    #[error("worker terminated while executing job '{job_id}'")]
    WorkerTerminated {
        /// Job identifier
        job_id: String,
    },

    /// The job or session was cancelled by a caller.
    #[error("job '{job_id}' cancelled")]
    Cancelled {
        /// Job identifier
        job_id: String,
    },

    /// `Request.driver` does not name a registered driver.
    #[error("unknown driver '{name}'")]
    UnknownDriver {
        /// Requested driver name
        name: String,
    },

    // ========================================================================
    // Configuration
    // ========================================================================
    /// Configuration failed to load or validate.
    #[error("configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Wrapped lower-level errors
    // ========================================================================
    /// I/O error, usually from file-lock or socket handling.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Redis client error.
    #[error("redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// JSON (de)serialization error.
    #[error("serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    /// Catch-all with attached context, produced by [`ErrorContext`].
    #[error("{message}")]
    Other {
        /// Context message
        message: String,
        /// Underlying source error
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },
}

impl Error {
    /// Construct a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Maps this error onto its wire-visible [`ErrorKind`].
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Validation(_) => ErrorKind::ValidationError,
            Error::Authentication => ErrorKind::AuthenticationError,
            Error::StoreUnavailable(_) | Error::Redis(_) => ErrorKind::StoreUnavailable,
            Error::WorkerUnavailable { .. } => ErrorKind::WorkerUnavailable,
            Error::CapacityExhausted { .. } => ErrorKind::CapacityExhausted,
            Error::HostAlreadyPinned { .. } => ErrorKind::HostAlreadyPinned,
            Error::ConnectionFailed { .. } => ErrorKind::ConnectionFailed,
            Error::AuthenticationFailed { .. } => ErrorKind::AuthenticationFailed,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::CommandFailed { .. } => ErrorKind::CommandFailed,
            Error::ProtocolError { .. } => ErrorKind::ProtocolError,
            Error::JobTTLExpired { .. } => ErrorKind::JobTTLExpired,
            Error::WorkerTerminated { .. } => ErrorKind::WorkerTerminated,
            Error::Cancelled { .. } => ErrorKind::Cancelled,
            Error::UnknownDriver { .. } => ErrorKind::UnknownDriver,
            Error::Config(_) | Error::Io(_) | Error::Serde(_) | Error::Other { .. } => {
                ErrorKind::ValidationError
            }
        }
    }

    /// Returns true if the Dispatcher should retry this error internally
    /// rather than surface it as a terminal job failure.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Error::HostAlreadyPinned { .. } | Error::CapacityExhausted { .. }
        )
    }
}

/// Extension trait for adding context to errors, mirroring `anyhow`'s
/// `.context()` but producing [`Error::Other`].
pub trait ErrorContext<T> {
    /// Adds context to an error.
    fn context(self, message: impl Into<String>) -> Result<T>;

    /// Adds context with a closure that is only evaluated on error.
    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>;
}

impl<T, E> ErrorContext<T> for std::result::Result<T, E>
where
    E: std::error::Error + Send + Sync + 'static,
{
    fn context(self, message: impl Into<String>) -> Result<T> {
        self.map_err(|e| Error::Other {
            message: message.into(),
            source: Some(Box::new(e)),
        })
    }

    fn with_context<F, S>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> S,
        S: Into<String>,
    {
        self.map_err(|e| Error::Other {
            message: f().into(),
            source: Some(Box::new(e)),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_maps_stably() {
        let e = Error::HostAlreadyPinned {
            host: "r1".into(),
            queue: "netpulse:queue:pinned:r1".into(),
        };
        assert_eq!(e.kind(), ErrorKind::HostAlreadyPinned);
        assert!(e.is_recoverable());
    }

    #[test]
    fn terminal_errors_are_not_recoverable() {
        let e = Error::CommandFailed {
            host: "r1".into(),
            message: "% Invalid input".into(),
        };
        assert!(!e.is_recoverable());
    }

    #[test]
    fn context_wraps_foreign_errors() {
        let res: std::result::Result<(), std::num::ParseIntError> = "x".parse::<u32>().map(|_| ());
        let wrapped = res.context("parsing retry count");
        assert!(matches!(wrapped, Err(Error::Other { .. })));
    }
}
