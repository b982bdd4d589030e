//! Error taxonomy for the execution-plan engine.
//!
//! Operations raise their own error types; the engine only needs to know
//! which [`ErrorKind`] each one belongs to. That mapping is the [`Classify`]
//! trait, and it must be total: every error value lands in exactly one kind.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Closed set of error classifications.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Network-level failure; expected to succeed on retry with the same configuration
    Transient,

    /// The remote service rejected or failed the request at the application layer
    ProviderUnavailable,

    /// Anything the classifier could not place
    Unclassified,
}

impl ErrorKind {
    /// All kinds, in declaration order.
    pub const ALL: [ErrorKind; 3] = [
        ErrorKind::Transient,
        ErrorKind::ProviderUnavailable,
        ErrorKind::Unclassified,
    ];
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorKind::Transient => write!(f, "transient"),
            ErrorKind::ProviderUnavailable => write!(f, "provider-unavailable"),
            ErrorKind::Unclassified => write!(f, "unclassified"),
        }
    }
}

/// Maps an operation error onto the engine's taxonomy.
///
/// Implementations should `match` exhaustively and send anything they do
/// not recognise to a conservative default bucket rather than panicking.
pub trait Classify {
    /// The classification of this error.
    fn kind(&self) -> ErrorKind;
}

impl Classify for ErrorKind {
    fn kind(&self) -> ErrorKind {
        *self
    }
}

/// Errors raised while constructing a [`Plan`](crate::Plan).
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PlanError {
    #[error("execution plan must contain at least one step")]
    Empty,

    #[error("step {step} must allow at least one attempt")]
    ZeroAttempts { step: usize },

    #[error("step {step} has an invalid retry schedule: {reason}")]
    InvalidSchedule { step: usize, reason: String },
}

/// Where a run was suspended when it was cancelled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    /// Awaiting the operation's outcome
    Operation,

    /// Waiting out a retry delay
    Backoff,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Phase::Operation => write!(f, "operation"),
            Phase::Backoff => write!(f, "backoff"),
        }
    }
}

/// Terminal failure of a plan run.
///
/// Intermediate failures never surface; a run yields exactly one of these.
#[derive(Error, Debug)]
pub enum RunError<E> {
    #[error(
        "execution plan exhausted: step {step} ({configuration}) failed after {attempts} attempt(s) with {kind} error"
    )]
    Exhausted {
        /// Index of the last step attempted
        step: usize,
        /// Display form of that step's configuration
        configuration: String,
        /// Classification of the final error
        kind: ErrorKind,
        /// Attempts made under that step
        attempts: u32,
        #[source]
        source: E,
    },

    #[error("execution plan cancelled during {phase} (step {step}, attempt {attempt})")]
    Cancelled {
        step: usize,
        attempt: u32,
        phase: Phase,
    },
}

impl<E> RunError<E> {
    /// Classification of the final error, if the run was not cancelled.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            RunError::Exhausted { kind, .. } => Some(*kind),
            RunError::Cancelled { .. } => None,
        }
    }

    /// The operation error that ended the run.
    pub fn source_error(&self) -> Option<&E> {
        match self {
            RunError::Exhausted { source, .. } => Some(source),
            RunError::Cancelled { .. } => None,
        }
    }

    /// Consume the error, returning the operation error that ended the run.
    pub fn into_source(self) -> Option<E> {
        match self {
            RunError::Exhausted { source, .. } => Some(source),
            RunError::Cancelled { .. } => None,
        }
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, RunError::Cancelled { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_display() {
        assert_eq!(ErrorKind::Transient.to_string(), "transient");
        assert_eq!(
            ErrorKind::ProviderUnavailable.to_string(),
            "provider-unavailable"
        );
        assert_eq!(ErrorKind::Unclassified.to_string(), "unclassified");
    }

    #[test]
    fn test_exhausted_message_names_kind_and_configuration() {
        let err: RunError<ErrorKind> = RunError::Exhausted {
            step: 1,
            configuration: "anthropic/claude".to_string(),
            kind: ErrorKind::ProviderUnavailable,
            attempts: 2,
            source: ErrorKind::ProviderUnavailable,
        };

        let msg = err.to_string();
        assert!(msg.contains("anthropic/claude"));
        assert!(msg.contains("provider-unavailable"));
        assert!(msg.contains("2 attempt(s)"));
        assert_eq!(err.kind(), Some(ErrorKind::ProviderUnavailable));
        assert!(!err.is_cancelled());
    }

    #[test]
    fn test_exhausted_error_text_appears_once_in_chain() {
        #[derive(Error, Debug)]
        #[error("upstream said no")]
        struct Refused;

        let err: RunError<Refused> = RunError::Exhausted {
            step: 0,
            configuration: "primary".to_string(),
            kind: ErrorKind::ProviderUnavailable,
            attempts: 1,
            source: Refused,
        };

        let mut chain = vec![err.to_string()];
        let mut next = std::error::Error::source(&err);
        while let Some(cause) = next {
            chain.push(cause.to_string());
            next = cause.source();
        }

        assert_eq!(chain.len(), 2);
        assert_eq!(chain.join(": ").matches("upstream said no").count(), 1);
    }

    #[test]
    fn test_cancelled_has_no_source() {
        let err: RunError<ErrorKind> = RunError::Cancelled {
            step: 0,
            attempt: 2,
            phase: Phase::Backoff,
        };
        assert!(err.is_cancelled());
        assert!(err.kind().is_none());
        assert!(err.into_source().is_none());
    }
}
