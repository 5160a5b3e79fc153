//! API error taxonomy.
//!
//! Every failure a handler can surface maps to one HTTP status and a
//! `{success: false, error}` body; router failures also carry the plan.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::json;
use thiserror::Error;

use crate::chain::ChainError;
use crate::services::router::ExecutionPlan;
use crate::services::settlement::SettlementError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    InvalidArgument(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("missing admin key")]
    Unauthorized,

    #[error("invalid admin key")]
    Forbidden,

    #[error("bad signature: {0}")]
    BadSignature(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{reason}")]
    PlanRejected {
        reason: String,
        plan: Box<ExecutionPlan>,
    },

    #[error("settlement rejected: {0}")]
    SettlementRejected(String),

    #[error("internal error")]
    Internal(String),
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::InvalidArgument(_)
            | ApiError::BadSignature(_)
            | ApiError::Conflict(_)
            | ApiError::PlanRejected { .. } => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Unauthorized => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden => StatusCode::FORBIDDEN,
            ApiError::SettlementRejected(_) | ApiError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        if let ApiError::Internal(detail) = &self {
            tracing::error!("internal error: {}", detail);
        }
        let status = self.status();
        let body = match &self {
            ApiError::PlanRejected { reason, plan } => json!({
                "success": false,
                "error": reason,
                "plan": plan,
            }),
            other => json!({
                "success": false,
                "error": other.to_string(),
            }),
        };
        (status, Json(body)).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::InvalidOrder(msg) => ApiError::InvalidArgument(msg),
            StoreError::NotFound(what) => ApiError::NotFound(what),
            StoreError::Conflict(msg) => ApiError::Conflict(msg),
        }
    }
}

impl From<ChainError> for ApiError {
    fn from(err: ChainError) -> Self {
        match err {
            ChainError::InvalidArgument(msg) | ChainError::Codec(msg) => {
                ApiError::InvalidArgument(msg)
            }
            ChainError::BadSignature(msg) => ApiError::BadSignature(msg),
            ChainError::Rejected(body) => ApiError::SettlementRejected(body),
            ChainError::Http(msg) => ApiError::Internal(msg),
        }
    }
}

impl From<SettlementError> for ApiError {
    fn from(err: SettlementError) -> Self {
        match err {
            SettlementError::Disabled => {
                ApiError::Conflict("settlement is not configured".into())
            }
            SettlementError::Precondition(msg) => ApiError::InvalidArgument(msg),
            SettlementError::AlreadySettled(id) => {
                ApiError::Conflict(format!("trade {} already settled", id))
            }
            SettlementError::TradeNotFound(id) => ApiError::NotFound(format!("trade {}", id)),
            SettlementError::Rejected(body) => ApiError::SettlementRejected(body),
            SettlementError::Timeout => {
                ApiError::SettlementRejected("broadcast timed out".into())
            }
            SettlementError::Chain(chain) => chain.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_mapping() {
        assert_eq!(ApiError::InvalidArgument("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Unauthorized.status(), StatusCode::UNAUTHORIZED);
        assert_eq!(ApiError::Forbidden.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::BadSignature("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            ApiError::SettlementRejected("x".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_store_error_mapping() {
        let err: ApiError = StoreError::InvalidOrder("size".into()).into();
        assert!(matches!(err, ApiError::InvalidArgument(_)));
        let err: ApiError = StoreError::Conflict("terminal".into()).into();
        assert!(matches!(err, ApiError::Conflict(_)));
    }
}
