//! Error taxonomy.
//!
//! Callers must be able to tell apart a user-correctable rejection, a
//! missing row, a lost fire race, and an unreachable store. Storage
//! unavailability is never folded into "not found" or an empty result.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

/// Engine-level error for intent operations.
#[derive(Debug, Error)]
pub enum EngineError {
    /// The referenced intent does not exist. Terminal, no retry.
    #[error("intent not found")]
    NotFound,

    /// The request violated one or more validation rules. Always carries
    /// the complete list.
    #[error("validation failed: {0:?}")]
    Validation(Vec<String>),

    /// A concurrent fire updated the intent first; nothing was written.
    #[error("intent was updated concurrently")]
    Conflict,

    /// Storage or another dependency is unreachable. Retryable.
    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl IntoResponse for EngineError {
    fn into_response(self) -> Response {
        match self {
            Self::NotFound => {
                (StatusCode::NOT_FOUND, Json(json!({"detail": "Intent not found"})))
                    .into_response()
            }
            Self::Validation(errors) => {
                (StatusCode::BAD_REQUEST, Json(json!({"errors": errors}))).into_response()
            }
            Self::Conflict => (
                StatusCode::CONFLICT,
                Json(json!({"detail": "Intent was updated concurrently"})),
            )
                .into_response(),
            Self::Infrastructure(e) => {
                tracing::error!(error = %e, "infrastructure error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({"detail": "Storage unavailable"})),
                )
                    .into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_keeps_every_message() {
        let err = EngineError::Validation(vec!["a".into(), "b".into(), "c".into()]);
        let EngineError::Validation(errors) = err else {
            unreachable!()
        };
        assert_eq!(errors.len(), 3);
    }

    #[test]
    fn infrastructure_wraps_anyhow() {
        let err: EngineError = anyhow::anyhow!("connection refused").into();
        assert!(matches!(err, EngineError::Infrastructure(_)));
    }
}
