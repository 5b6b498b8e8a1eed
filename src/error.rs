//! Error types for the reconciliation client

use thiserror::Error;

use crate::resource::ReconcileResult;

/// Main error type for reconciliation operations
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum Error {
    /// Kubernetes API error
    #[error("kubernetes error: {0}")]
    Kube(#[from] kube::Error),

    /// An operation received zero resources where at least one was required
    #[error("no objects visited")]
    EmptyInput,

    /// A delete was requested for a resource set that no longer exists
    #[error("object not found, skipping delete")]
    AlreadyDeleted,

    /// A manifest could not be turned into an addressable resource handle
    #[error("invalid resource: {0}")]
    InvalidResource(String),

    /// A desired resource exists on the server but was never recorded as
    /// previously applied
    #[error("no {kind} with the name {name:?} found")]
    StaleState {
        /// Kind of the offending resource
        kind: String,
        /// Name of the offending resource
        name: String,
    },

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A no-op update could not re-fetch the live object
    #[error("failed to refresh {kind} {name:?}: resource no longer exists")]
    Refresh {
        /// Kind of the resource being refreshed
        kind: String,
        /// Name of the resource being refreshed
        name: String,
    },

    /// The server rejected a patch and no forced recreation was requested
    #[error("cannot patch {kind} {name:?}: {reason} (use force to delete and recreate the resource)")]
    PatchRejected {
        /// Kind of the resource that could not be patched
        kind: String,
        /// Name of the resource that could not be patched
        name: String,
        /// The original patch error from the server
        reason: String,
    },

    /// The forced delete-and-recreate fallback failed part way through
    #[error("failed to recreate {kind} {name:?}: {reason}")]
    Recreate {
        /// Kind of the resource being recreated
        kind: String,
        /// Name of the resource being recreated
        name: String,
        /// What went wrong during delete or recreate
        reason: String,
    },

    /// Multiple per-resource failures joined into one error
    #[error("{0}")]
    Aggregate(AggregateError),

    /// A readiness wait exceeded its deadline
    #[error("timed out waiting for {kind} {name:?}")]
    Timeout {
        /// Kind of the resource being waited on
        kind: String,
        /// Name of the resource being waited on
        name: String,
    },

    /// A watch ended without the resource reaching its readiness milestone
    #[error("failed to wait for {name:?}: {reason}")]
    WatchFailed {
        /// Name of the resource being watched
        name: String,
        /// Why the watch ended
        reason: String,
    },

    /// The cluster API server could not be reached
    #[error("kubernetes cluster unreachable")]
    Unreachable,
}

impl Error {
    /// Create an invalid-resource error with the given message
    pub fn invalid_resource(msg: impl Into<String>) -> Self {
        Self::InvalidResource(msg.into())
    }

    /// Create a stale-state error for the given resource
    pub fn stale_state(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::StaleState {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a serialization error with the given message
    pub fn serialization(msg: impl Into<String>) -> Self {
        Self::Serialization(msg.into())
    }

    /// Create a patch-rejected error for the given resource
    pub fn patch_rejected(
        kind: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::PatchRejected {
            kind: kind.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create a recreate error for the given resource
    pub fn recreate(
        kind: impl Into<String>,
        name: impl Into<String>,
        reason: impl Into<String>,
    ) -> Self {
        Self::Recreate {
            kind: kind.into(),
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Create an aggregate error from collected per-resource failures and the
    /// partially populated result
    pub fn aggregate(failures: Vec<String>, partial: ReconcileResult) -> Self {
        Self::Aggregate(AggregateError { failures, partial })
    }

    /// Create a timeout error for the given resource
    pub fn timeout(kind: impl Into<String>, name: impl Into<String>) -> Self {
        Self::Timeout {
            kind: kind.into(),
            name: name.into(),
        }
    }

    /// Create a watch-failed error for the given resource
    pub fn watch_failed(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::WatchFailed {
            name: name.into(),
            reason: reason.into(),
        }
    }

    /// Whether this error is a Kubernetes "not found" API response
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::Kube(kube::Error::Api(ae)) if ae.code == 404)
    }
}

/// Aggregation of per-resource update failures.
///
/// Carries the partially populated [`ReconcileResult`] so callers can tell
/// what succeeded even though the overall call failed. The display form joins
/// the individual failures with `" && "`.
#[derive(Debug, Default)]
pub struct AggregateError {
    /// The collected per-resource failure messages, in resource order
    pub failures: Vec<String>,
    /// Whatever was created/updated/deleted before the error was raised
    pub partial: ReconcileResult,
}

impl std::fmt::Display for AggregateError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.failures.join(" && "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn aggregate_joins_failures_with_double_ampersand() {
        let err = Error::aggregate(
            vec!["first failed".to_string(), "second failed".to_string()],
            ReconcileResult::default(),
        );
        assert_eq!(err.to_string(), "first failed && second failed");
    }

    #[test]
    fn aggregate_carries_partial_result() {
        let partial = ReconcileResult::default();
        match Error::aggregate(vec!["boom".into()], partial) {
            Error::Aggregate(agg) => {
                assert!(agg.partial.created.is_empty());
                assert_eq!(agg.failures.len(), 1);
            }
            other => panic!("expected Aggregate, got {other:?}"),
        }
    }

    #[test]
    fn not_found_detection_matches_api_404_only() {
        let err = Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "pods \"web\" not found".to_string(),
            reason: "NotFound".to_string(),
            code: 404,
        }));
        assert!(err.is_not_found());

        let conflict = Error::Kube(kube::Error::Api(kube::core::ErrorResponse {
            status: "Failure".to_string(),
            message: "operation cannot be fulfilled".to_string(),
            reason: "Conflict".to_string(),
            code: 409,
        }));
        assert!(!conflict.is_not_found());
        assert!(!Error::EmptyInput.is_not_found());
    }

    #[test]
    fn patch_rejected_mentions_force() {
        let err = Error::patch_rejected("Service", "web", "field is immutable");
        assert!(err.to_string().contains("use force"));
        assert!(err.to_string().contains("field is immutable"));
    }
}
