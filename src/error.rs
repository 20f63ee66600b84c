//! Crate-wide error taxonomy (spec §7).
//!
//! `CoreError` classifies every failure the core can produce into the six
//! kinds of §7 (Validation, NotFound, NotProvisioned, Transient, Permanent,
//! Internal). Two downstream consumers read that classification:
//! the trigger endpoint maps it to an HTTP status code, the worker maps it
//! to a retry-or-fail decision.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

/// A classified error produced anywhere in the core.
#[derive(Debug, thiserror::Error)]
pub enum CoreError {
    /// Bad input caught before any side effect (§7 Validation).
    #[error("validation error: {0}")]
    Validation(String),

    /// A referenced entity (lead, rule, tenant) does not exist (§7 NotFound).
    #[error("not found: {0}")]
    NotFound(String),

    /// The tenant has no connection string or required secrets configured
    /// (§7 NotProvisioned).
    #[error("not configured: {0}")]
    NotProvisioned(String),

    /// A retryable failure: provider 5xx, network timeout, DB disconnect
    /// (§7 Transient).
    #[error("transient error: {0}")]
    Transient(String),

    /// A non-retryable failure: provider 4xx, auth failure (§7 Permanent).
    #[error("permanent error: {0}")]
    Permanent(String),

    /// An unexpected internal failure (§7 Internal).
    #[error("internal error: {0}")]
    Internal(String),
}

impl CoreError {
    /// Maps this error to the HTTP status code the trigger endpoint returns
    /// (§4.I: "status code derives from error kind").
    pub fn status_code(&self) -> StatusCode {
        match self {
            CoreError::Validation(_) => StatusCode::BAD_REQUEST,
            CoreError::NotFound(_) => StatusCode::NOT_FOUND,
            CoreError::NotProvisioned(_) => StatusCode::UNPROCESSABLE_ENTITY,
            CoreError::Transient(_) | CoreError::Permanent(_) | CoreError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Whether the worker should retry a job that failed with this error
    /// (§7: Transient retries via queue backoff, Permanent fails after the
    /// first attempt).
    pub fn is_transient(&self) -> bool {
        matches!(self, CoreError::Transient(_))
    }
}

impl From<sqlx::Error> for CoreError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => CoreError::NotFound(err.to_string()),
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => CoreError::Transient(err.to_string()),
            _ => CoreError::Internal(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for CoreError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() || err.is_connect() {
            CoreError::Transient(err.to_string())
        } else if err
            .status()
            .is_some_and(|s| s.is_client_error() && s.as_u16() != 408 && s.as_u16() != 429)
        {
            CoreError::Permanent(err.to_string())
        } else {
            CoreError::Transient(err.to_string())
        }
    }
}

/// JSON error body returned by the HTTP layer.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    /// Machine-readable error code, derived from the error variant name.
    pub code: &'static str,
    /// Human-readable message. Stack traces are never included
    /// (§7: "log with stack, non-production only" — logs only, never the
    /// response body).
    pub message: String,
}

impl CoreError {
    fn code(&self) -> &'static str {
        match self {
            CoreError::Validation(_) => "VALIDATION_ERROR",
            CoreError::NotFound(_) => "NOT_FOUND",
            CoreError::NotProvisioned(_) => "NOT_PROVISIONED",
            CoreError::Transient(_) => "TRANSIENT_ERROR",
            CoreError::Permanent(_) => "PERMANENT_ERROR",
            CoreError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl IntoResponse for CoreError {
    fn into_response(self) -> Response {
        if matches!(self, CoreError::Internal(_)) {
            tracing::error!(error = %self, "internal error");
        }
        let status = self.status_code();
        let body = ErrorBody {
            code: self.code(),
            message: self.to_string(),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_maps_to_400() {
        assert_eq!(
            CoreError::Validation("bad phone".into()).status_code(),
            StatusCode::BAD_REQUEST
        );
    }

    #[test]
    fn not_found_maps_to_404() {
        assert_eq!(
            CoreError::NotFound("lead".into()).status_code(),
            StatusCode::NOT_FOUND
        );
    }

    #[test]
    fn not_provisioned_maps_to_422() {
        assert_eq!(
            CoreError::NotProvisioned("missing secrets".into()).status_code(),
            StatusCode::UNPROCESSABLE_ENTITY
        );
    }

    #[test]
    fn only_transient_is_retryable() {
        assert!(CoreError::Transient("timeout".into()).is_transient());
        assert!(!CoreError::Permanent("bad auth".into()).is_transient());
        assert!(!CoreError::Internal("bug".into()).is_transient());
    }
}
