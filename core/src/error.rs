//! Stage-level failure taxonomy.
//!
//! The pipeline never stalls on a bad event: every failure while processing
//! a single event resolves to one of three categories, each a distinct
//! observable outcome (a counter, not just a log line).
//!
//! - [`StageError::Transient`] - an external dependency misbehaved; the
//!   stage either used a fallback (empty shop list, locally generated
//!   message, skipped sink write) or dropped the event.
//! - [`StageError::MissingState`] - a prerequisite record was absent, e.g. a
//!   proximity event for a user the pipeline has never seen.
//! - [`StageError::Malformed`] - the event could not be decoded.

use thiserror::Error;

/// What went wrong while processing one event.
#[derive(Error, Debug)]
pub enum StageError {
    /// A dependency (spatial index, cache, generator, sink, bus) failed
    /// transiently.
    #[error("transient failure in {dependency}: {reason}")]
    Transient {
        /// The dependency that failed.
        dependency: &'static str,
        /// Human-readable failure reason.
        reason: String,
    },

    /// Required per-key state was absent.
    #[error("no state found for user {user_id}")]
    MissingState {
        /// The user whose state was missing.
        user_id: i64,
    },

    /// The event payload could not be decoded.
    #[error("malformed event: {0}")]
    Malformed(String),
}

impl StageError {
    /// Wrap a dependency failure.
    pub fn transient(dependency: &'static str, reason: impl ToString) -> Self {
        Self::Transient {
            dependency,
            reason: reason.to_string(),
        }
    }

    /// The outcome category this error maps to.
    #[must_use]
    pub const fn category(&self) -> ErrorCategory {
        match self {
            Self::Transient { .. } => ErrorCategory::Transient,
            Self::MissingState { .. } => ErrorCategory::MissingState,
            Self::Malformed(_) => ErrorCategory::Malformed,
        }
    }
}

/// Coarse error category, used as a metrics label.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    /// Transient external failure.
    Transient,
    /// Missing prerequisite state.
    MissingState,
    /// Undecodable input.
    Malformed,
}

impl ErrorCategory {
    /// Stable label for metrics and logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Transient => "transient",
            Self::MissingState => "missing_state",
            Self::Malformed => "malformed",
        }
    }
}

/// Errors from the spatial index adapter.
#[derive(Error, Debug)]
pub enum SpatialError {
    /// The lookup query failed or the index was unreachable.
    #[error("spatial lookup failed: {0}")]
    Lookup(String),
}

/// Errors from the message generator client.
#[derive(Error, Debug)]
pub enum GeneratorError {
    /// The HTTP request failed (network error or client-side timeout).
    #[error("generator request failed: {0}")]
    RequestFailed(String),

    /// The generator returned a non-2xx status.
    #[error("generator error (status {status}): {message}")]
    Api {
        /// HTTP status code.
        status: u16,
        /// Response body, if any.
        message: String,
    },

    /// The response body could not be parsed.
    #[error("generator response parsing failed: {0}")]
    ResponseParseFailed(String),
}

/// Errors from the durable analytics sink.
#[derive(Error, Debug)]
pub enum SinkError {
    /// The append-only write failed; the record is lost (no retry queue).
    #[error("sink write failed: {0}")]
    Write(String),
}
