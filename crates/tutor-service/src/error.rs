//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use tutor_core::EngineError;
use tutor_store::StoreError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Missing or invalid service API key.
    #[error("unauthorized")]
    Unauthorized,

    /// The caller may not act on this resource.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Resource already exists, or a lock could not be taken in time.
    #[error("conflict: {message}")]
    Conflict {
        /// Human-readable reason.
        message: String,
        /// Whether the same request may succeed if retried.
        retryable: bool,
    },

    /// The student cannot pay for the activation.
    #[error("insufficient balance: balance={balance}, required={required}")]
    InsufficientBalance {
        /// Current balance.
        balance: i64,
        /// Required amount.
        required: i64,
    },

    /// The top-up or refund would exceed the balance ceiling.
    #[error("balance ceiling exceeded: balance={balance}, amount={amount}, max={max}")]
    BalanceCeilingExceeded {
        /// Current balance.
        balance: i64,
        /// Requested amount.
        amount: i64,
        /// Configured maximum.
        max: i64,
    },

    /// No seat left on the lesson.
    #[error("capacity exceeded: {0}")]
    CapacityExceeded(String),

    /// The booking cannot move to the requested state.
    #[error("invalid transition: {0}")]
    InvalidTransition(String),

    /// A referenced row is missing or soft-deleted.
    #[error("orphan reference: {0}")]
    OrphanReference(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict { message, retryable } => (
                StatusCode::CONFLICT,
                "conflict",
                message.clone(),
                Some(serde_json::json!({ "retryable": retryable })),
            ),
            Self::InsufficientBalance { balance, required } => (
                StatusCode::PAYMENT_REQUIRED,
                "insufficient_balance",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "required": required
                })),
            ),
            Self::BalanceCeilingExceeded {
                balance,
                amount,
                max,
            } => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "balance_ceiling_exceeded",
                self.to_string(),
                Some(serde_json::json!({
                    "balance": balance,
                    "amount": amount,
                    "max": max
                })),
            ),
            Self::CapacityExceeded(msg) => {
                (StatusCode::CONFLICT, "capacity_exceeded", msg.clone(), None)
            }
            Self::InvalidTransition(msg) => {
                (StatusCode::CONFLICT, "invalid_transition", msg.clone(), None)
            }
            Self::OrphanReference(msg) => (
                StatusCode::UNPROCESSABLE_ENTITY,
                "orphan_reference",
                msg.clone(),
                None,
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let message = err.to_string();
        match err {
            EngineError::InsufficientBalance { balance, required } => {
                Self::InsufficientBalance { balance, required }
            }
            EngineError::BalanceCeilingExceeded {
                balance,
                amount,
                max,
            } => Self::BalanceCeilingExceeded {
                balance,
                amount,
                max,
            },
            EngineError::CapacityExceeded { .. } => Self::CapacityExceeded(message),
            EngineError::CapacityBelowActive { .. } => Self::Conflict {
                message,
                retryable: false,
            },
            EngineError::InvalidTransition { .. } | EngineError::LessonNotFinished { .. } => {
                Self::InvalidTransition(message)
            }
            EngineError::InvalidAmount(_)
            | EngineError::RefundMismatch { .. }
            | EngineError::RoleMismatch { .. }
            | EngineError::InvalidId(_) => Self::BadRequest(message),
        }
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        let message = err.to_string();
        match err {
            StoreError::Engine(engine) => engine.into(),
            StoreError::NotFound { .. } => Self::NotFound(message),
            StoreError::OrphanReference { .. } => Self::OrphanReference(message),
            StoreError::BookingMismatch { .. } => Self::BadRequest(message),
            StoreError::NotParticipant { .. } => Self::Forbidden(message),
            StoreError::AlreadyExists { .. } => Self::Conflict {
                message,
                retryable: false,
            },
            StoreError::Conflict(_) => Self::Conflict {
                message,
                retryable: true,
            },
            StoreError::Database(msg) | StoreError::Serialization(msg) => Self::Internal(msg),
        }
    }
}
