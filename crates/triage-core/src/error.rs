//! Error types shared across the workspace
//!
//! - `CollaboratorError`: anything an external collaborator can report
//! - `WorkflowError`: fatal, workflow-ending failures
//! - `TransitionError`: illegal status transitions on a workflow record
//! - `PatchError`: conflict signals from the patch engine

use crate::workflow::WorkflowStatus;

/// Failure reported by a chat, language-model, issue-tracker or source-host collaborator.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollaboratorError {
    /// The resource already exists (HTTP 409/422 style)
    #[error("conflict: {0}")]
    Conflict(String),

    /// The requested resource does not exist
    #[error("not found: {0}")]
    NotFound(String),

    /// Credentials missing, rejected or insufficient
    #[error("authentication failed: {0}")]
    Auth(String),

    /// Transport-level failure (connect, timeout, body read)
    #[error("network error: {0}")]
    Network(String),

    /// Non-success response that does not fit a narrower variant
    #[error("api error ({status}): {message}")]
    Api { status: u16, message: String },

    /// Response arrived but could not be understood
    #[error("malformed response: {0}")]
    Malformed(String),

    /// The call was cancelled before completing
    #[error("operation cancelled")]
    Cancelled,
}

impl CollaboratorError {
    /// True for "already exists" style failures.
    #[inline]
    #[must_use]
    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }

    /// True when the same request might succeed if sent again.
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Api { status, .. } => *status == 429 || *status >= 500,
            _ => false,
        }
    }
}

/// Failures that end a workflow in the `failed` state.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    /// Normalized report came back without a title
    #[error("report parse failure: {0}")]
    ReportParse(String),

    /// The issue tracker refused to create the ticket
    #[error("ticket creation failed: {0}")]
    TicketCreation(#[source] CollaboratorError),

    /// Branch could not be created, even after the collision retry
    #[error("branch creation failed: {0}")]
    BranchCreation(#[source] CollaboratorError),

    /// A file change could not be written to the branch
    #[error("failed to apply change to {path}: {source}")]
    ApplyChange {
        path: String,
        #[source]
        source: CollaboratorError,
    },

    /// The pull request could not be opened
    #[error("pull request creation failed: {0}")]
    PullRequest(#[source] CollaboratorError),

    /// The workflow store rejected a status transition
    #[error(transparent)]
    Transition(#[from] TransitionError),

    /// A step panicked; the payload text is kept
    #[error("workflow step panicked: {0}")]
    Panicked(String),
}

/// Rejected status change on a workflow record.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransitionError {
    #[error("no workflow record for id {0}")]
    UnknownWorkflow(String),

    #[error("illegal transition {from} -> {to}")]
    Illegal {
        from: WorkflowStatus,
        to: WorkflowStatus,
    },
}

/// Why a patch could not be applied cleanly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PatchError {
    /// No `@@` hunk header was found
    #[error("patch contains no hunks")]
    NoHunks,

    /// The hunk's context/removed lines match nowhere in the document
    #[error("hunk {hunk} (line {old_start}) does not match the document")]
    Conflict { hunk: usize, old_start: usize },

    /// Two hunks claim overlapping line ranges
    #[error("hunk {second} overlaps hunk {first}")]
    Overlap { first: usize, second: usize },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conflict_is_not_retryable() {
        let err = CollaboratorError::Conflict("Reference already exists".to_string());
        assert!(err.is_conflict());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_server_errors_and_rate_limits_are_retryable() {
        let server = CollaboratorError::Api {
            status: 502,
            message: "bad gateway".to_string(),
        };
        let limited = CollaboratorError::Api {
            status: 429,
            message: "slow down".to_string(),
        };
        let bad_request = CollaboratorError::Api {
            status: 400,
            message: "nope".to_string(),
        };
        assert!(server.is_retryable());
        assert!(limited.is_retryable());
        assert!(!bad_request.is_retryable());
        assert!(CollaboratorError::Network("reset".to_string()).is_retryable());
    }

    #[test]
    fn test_workflow_error_keeps_collaborator_text() {
        let err = WorkflowError::TicketCreation(CollaboratorError::Auth("401".to_string()));
        assert_eq!(
            err.to_string(),
            "ticket creation failed: authentication failed: 401"
        );
    }
}
