//! Invocation outcomes.
//!
//! Every registration selected for an event terminates in exactly one
//! `HandlerOutcome`. Outcomes are the only observable error surface of the
//! engine: failures are reported, never retried internally.

use serde::{Deserialize, Serialize};

/// Classification of a failed invocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// The handler did not complete within its configured budget.
    Timeout,
    /// An external generation/action/API call failed.
    ExternalAction,
    /// A write lost a race against another writer.
    Conflict,
    /// The document store reported a non-conflict error.
    Store,
    /// The handler panicked.
    HandlerPanic,
    /// Any other handler-internal error.
    Internal,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Timeout => write!(f, "timeout"),
            Self::ExternalAction => write!(f, "external_action"),
            Self::Conflict => write!(f, "conflict"),
            Self::Store => write!(f, "store"),
            Self::HandlerPanic => write!(f, "handler_panic"),
            Self::Internal => write!(f, "internal"),
        }
    }
}

/// Terminal result of one handler invocation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HandlerOutcome {
    /// The handler ran and finished its work.
    Completed,
    /// The handler did not run, or ran and found nothing to do.
    Skipped {
        /// Why the invocation was skipped.
        reason: String,
    },
    /// The handler failed; effects up to the failure point are not rolled
    /// back.
    Failed {
        /// Failure classification.
        kind: ErrorKind,
        /// Human-readable detail for logs.
        detail: String,
    },
}

/// Router-level skip reason for registrations whose filter did not match.
pub const SKIP_FILTER_NOT_MATCHED: &str = "filter-not-matched";

impl HandlerOutcome {
    /// Builds a skipped outcome.
    #[must_use]
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self::Skipped {
            reason: reason.into(),
        }
    }

    /// Builds a failed outcome.
    #[must_use]
    pub fn failed(kind: ErrorKind, detail: impl Into<String>) -> Self {
        Self::Failed {
            kind,
            detail: detail.into(),
        }
    }

    /// True when the handler ran and finished its work.
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed)
    }

    /// True when the invocation was skipped.
    #[must_use]
    pub const fn is_skipped(&self) -> bool {
        matches!(self, Self::Skipped { .. })
    }

    /// True when the invocation failed.
    #[must_use]
    pub const fn is_failed(&self) -> bool {
        matches!(self, Self::Failed { .. })
    }

    /// The failure kind, when failed.
    #[must_use]
    pub const fn error_kind(&self) -> Option<ErrorKind> {
        match self {
            Self::Failed { kind, .. } => Some(*kind),
            _ => None,
        }
    }
}

impl std::fmt::Display for HandlerOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Completed => write!(f, "completed"),
            Self::Skipped { reason } => write!(f, "skipped({reason})"),
            Self::Failed { kind, detail } => write!(f, "failed({kind}: {detail})"),
        }
    }
}

/// One registration's outcome within a dispatch, paired with the registration
/// name for reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    /// Name of the registration this outcome belongs to.
    pub handler: String,
    /// Terminal result.
    pub outcome: HandlerOutcome,
}

impl DispatchOutcome {
    #[allow(missing_docs)]
    #[must_use]
    pub fn new(handler: impl Into<String>, outcome: HandlerOutcome) -> Self {
        Self {
            handler: handler.into(),
            outcome,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_predicates() {
        assert!(HandlerOutcome::Completed.is_completed());
        assert!(HandlerOutcome::skipped("x").is_skipped());
        assert!(HandlerOutcome::failed(ErrorKind::Timeout, "late").is_failed());
        assert_eq!(
            HandlerOutcome::failed(ErrorKind::Conflict, "race").error_kind(),
            Some(ErrorKind::Conflict)
        );
        assert_eq!(HandlerOutcome::Completed.error_kind(), None);
    }

    #[test]
    fn test_outcome_display() {
        assert_eq!(format!("{}", HandlerOutcome::Completed), "completed");
        assert_eq!(
            format!("{}", HandlerOutcome::skipped(SKIP_FILTER_NOT_MATCHED)),
            "skipped(filter-not-matched)"
        );
        let failed = HandlerOutcome::failed(ErrorKind::ExternalAction, "503");
        assert_eq!(format!("{failed}"), "failed(external_action: 503)");
    }

    #[test]
    fn test_outcome_serialization() {
        let outcome = HandlerOutcome::failed(ErrorKind::Timeout, "exceeded 10s");
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["status"], "failed");
        assert_eq!(json["kind"], "timeout");

        let back: HandlerOutcome = serde_json::from_value(json).unwrap();
        assert_eq!(back, outcome);
    }
}
