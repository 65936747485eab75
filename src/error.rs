//! Error types for the audit pipeline.
//!
//! Every fallible library operation returns [`AuditResult`]. A detected
//! vulnerability or a policy violation is a normal result, never an error:
//! only infrastructure and service failures end up here.

use thiserror::Error;

/// Result type alias for audit operations.
pub type AuditResult<T> = Result<T, AuditError>;

#[derive(Error, Debug)]
pub enum AuditError {
    // Network errors
    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited by the component report service, try again later")]
    RateLimited,

    #[error("component report request failed with status {status}")]
    RemoteAuditFailed { status: u16 },

    #[error("could not decode response: {0}")]
    Decode(String),

    // Policy evaluation errors
    #[error("policy server request failed with status {status}")]
    PolicyServerFailed { status: u16 },

    #[error("no application found for public id '{public_id}'")]
    ApplicationNotFound { public_id: String },

    #[error("policy server rejected the submission with status {status}")]
    SubmissionRejected { status: u16 },

    #[error("policy evaluation did not finish after {attempts} status checks")]
    PollTimeout { attempts: u32 },

    #[error("policy evaluation reported an error: {message}")]
    PolicyEvaluationFailed { message: String },

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to build bill of materials: {0}")]
    Bom(String),
}

impl AuditError {
    /// Whether a later retry of the same call could succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, AuditError::RateLimited | AuditError::Transport(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rate_limit_is_transient() {
        assert!(AuditError::RateLimited.is_transient());
        assert!(!AuditError::RemoteAuditFailed { status: 500 }.is_transient());
        assert!(!AuditError::PollTimeout { attempts: 3 }.is_transient());
    }

    #[test]
    fn messages_name_the_failure() {
        let err = AuditError::ApplicationNotFound {
            public_id: "my-app".to_string(),
        };
        assert_eq!(err.to_string(), "no application found for public id 'my-app'");

        let err = AuditError::RemoteAuditFailed { status: 503 };
        assert!(err.to_string().contains("503"));
    }
}
