//! Error types for the transformation engine and the request executor

use serde_json::{json, Value};
use thiserror::Error;

/// Errors raised by the pure task pipeline (normalize → critical → rows)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("cyclic task dependencies among: {}", ids.join(", "))]
    CyclicDependency { ids: Vec<String> },
}

/// Outcome classes of an authenticated upstream call
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExecError {
    /// No session, or an expired session without a refresh token
    #[error("unauthorized")]
    Unauthorized,

    /// Session is bound to another upstream domain
    #[error("domain mismatch: session bound to {expected}, request for {actual}")]
    DomainMismatch { expected: String, actual: String },

    /// Any non-auth failure reported by the upstream service
    #[error("upstream error (HTTP {status}): {body}")]
    Upstream { status: u16, body: Value },

    /// Refresh failed and the session was deleted; the client must re-authorize
    #[error("session expired, re-authorization required")]
    TokenExpiredFinal,
}

impl ExecError {
    /// HTTP status the route layer should answer with
    pub fn status(&self) -> u16 {
        match self {
            Self::Unauthorized | Self::TokenExpiredFinal => 401,
            Self::DomainMismatch { .. } => 403,
            Self::Upstream { status, .. } => *status,
        }
    }

    /// JSON body the route layer should answer with
    pub fn body(&self) -> Value {
        match self {
            Self::Unauthorized => json!({ "error": "Unauthorized" }),
            Self::DomainMismatch { .. } => json!({ "error": "Domain mismatch" }),
            Self::Upstream { body, .. } => body.clone(),
            Self::TokenExpiredFinal => {
                json!({ "error": "token_expired", "message": "Session expired" })
            }
        }
    }

    /// True when the client has to restart authorization
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Self::Unauthorized | Self::TokenExpiredFinal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ExecError::Unauthorized.status(), 401);
        assert_eq!(ExecError::TokenExpiredFinal.status(), 401);
        let mismatch = ExecError::DomainMismatch {
            expected: "a.example".to_string(),
            actual: "b.example".to_string(),
        };
        assert_eq!(mismatch.status(), 403);
        let upstream = ExecError::Upstream {
            status: 502,
            body: json!({ "error": "bad_gateway" }),
        };
        assert_eq!(upstream.status(), 502);
        assert_eq!(upstream.body()["error"], "bad_gateway");
    }

    #[test]
    fn test_token_expired_body_instructs_reauth() {
        let err = ExecError::TokenExpiredFinal;
        assert_eq!(err.body()["error"], "token_expired");
        assert!(err.requires_reauth());
        assert!(!ExecError::DomainMismatch {
            expected: "a".to_string(),
            actual: "b".to_string()
        }
        .requires_reauth());
    }

    #[test]
    fn test_cycle_message_lists_ids() {
        let err = EngineError::CyclicDependency {
            ids: vec!["1".to_string(), "2".to_string()],
        };
        assert_eq!(err.to_string(), "cyclic task dependencies among: 1, 2");
    }
}
