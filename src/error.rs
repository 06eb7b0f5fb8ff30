//! Error taxonomy shared by every component of the daemon.
//!
//! Every fallible operation in the crate returns [`ChaosError`]. The dispatcher
//! and recovery engine match on its variants to decide what happens to the
//! experiment ledger (see [`crate::dispatcher`] and [`crate::recovery`]); the
//! HTTP and CLI front-ends match on it to decide the response status / exit code.

use std::fmt;

/// Unified error type for the fault-injection lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum ChaosError {
    /// Caller-supplied arguments failed validation (unknown action, bad CIDR,
    /// unknown signal, unresolvable hostname, ...). No ledger row is written.
    #[error("bad arguments: {0}")]
    BadArgs(String),

    /// A rule-store read or write failed. Always fatal to the containing step.
    #[error("rule store error: {0}")]
    Store(#[from] StoreError),

    /// The TC-agent RPC failed. Non-recoverable from the core's perspective;
    /// the experiment is marked `Error` and left there.
    #[error("agent error: {0}")]
    Agent(String),

    /// Recovery was requested for an action that has no inverse (e.g. a
    /// SIGKILL'd process). The experiment row is left untouched.
    #[error("experiment {uid} is not recoverable: {reason}")]
    NonRecoverable {
        /// Experiment uid.
        uid: String,
        /// Why the action cannot be reversed.
        reason: String,
    },

    /// An invariant the code assumes was violated.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ChaosError {
    /// True if this is a [`ChaosError::BadArgs`].
    pub fn is_bad_args(&self) -> bool {
        matches!(self, Self::BadArgs(_))
    }

    /// True if this is a [`ChaosError::NonRecoverable`].
    pub fn is_non_recoverable(&self) -> bool {
        matches!(self, Self::NonRecoverable { .. })
    }

    /// Render the message that gets persisted into `experiments.error`.
    pub fn ledger_message(&self) -> String {
        self.to_string()
    }

    /// Classify this error for logging/status-code mapping.
    pub fn kind(&self) -> ChaosErrorKind {
        match self {
            Self::BadArgs(_) => ChaosErrorKind::BadArgs,
            Self::Store(_) => ChaosErrorKind::Store,
            Self::Agent(_) => ChaosErrorKind::Agent,
            Self::NonRecoverable { .. } => ChaosErrorKind::NonRecoverable,
            Self::Internal(_) => ChaosErrorKind::Internal,
        }
    }
}

/// Errors surfaced by the rule store (§4.A). Deliberately narrow: callers never
/// need to distinguish a missing row from a connection failure, they need to
/// know the containing attack step cannot proceed.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested experiment/rule does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// Underlying SQLite driver error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A persisted row failed to decode (e.g. malformed recover_command JSON).
    #[error("decode error: {0}")]
    Decode(String),
}

/// The taxonomy kind without the payload, used for logging tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChaosErrorKind {
    /// See [`ChaosError::BadArgs`].
    BadArgs,
    /// See [`ChaosError::Store`].
    Store,
    /// See [`ChaosError::Agent`].
    Agent,
    /// See [`ChaosError::NonRecoverable`].
    NonRecoverable,
    /// See [`ChaosError::Internal`].
    Internal,
}

impl fmt::Display for ChaosErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            ChaosErrorKind::BadArgs => "bad_args",
            ChaosErrorKind::Store => "store",
            ChaosErrorKind::Agent => "agent",
            ChaosErrorKind::NonRecoverable => "non_recoverable",
            ChaosErrorKind::Internal => "internal",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bad_args_display_contains_message() {
        let err = ChaosError::BadArgs("unknown signal 99".into());
        assert!(err.to_string().contains("unknown signal 99"));
        assert!(err.is_bad_args());
    }

    #[test]
    fn non_recoverable_display_contains_uid_and_reason() {
        let err = ChaosError::NonRecoverable { uid: "abc123".into(), reason: "SIGKILL".into() };
        let msg = err.to_string();
        assert!(msg.contains("abc123"));
        assert!(msg.contains("SIGKILL"));
        assert!(err.is_non_recoverable());
    }

    #[test]
    fn kind_classification_matches_variant() {
        assert_eq!(ChaosError::BadArgs("x".into()).kind(), ChaosErrorKind::BadArgs);
        assert_eq!(ChaosError::Agent("x".into()).kind(), ChaosErrorKind::Agent);
        assert_eq!(ChaosError::Internal("x".into()).kind(), ChaosErrorKind::Internal);
    }

    #[test]
    fn store_not_found_display() {
        let err = StoreError::NotFound("experiment abc".into());
        assert_eq!(err.to_string(), "not found: experiment abc");
    }
}
