use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::json;
use std::fmt;

use reelworks_core::CoreError;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub message: String,
}

impl AppError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, message)
    }

    pub fn payment_required(message: impl Into<String>) -> Self {
        Self::new(StatusCode::PAYMENT_REQUIRED, message)
    }

    pub fn rate_limited(message: impl Into<String>) -> Self {
        Self::new(StatusCode::TOO_MANY_REQUESTS, message)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let body = Json(json!({
            "error": {
                "message": self.message,
                "status": self.status.as_u16(),
            }
        }));

        (self.status, body).into_response()
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        let message = err.reason();
        match err {
            CoreError::InsufficientCredits { .. } => {
                Self::payment_required(message)
            }
            CoreError::AccountNotFound(_)
            | CoreError::JobNotFound(_)
            | CoreError::VideoNotFound(_) => Self::not_found(message),
            CoreError::InvalidJobState(_) | CoreError::Conflict(_) => {
                Self::conflict(message)
            }
            CoreError::ConcurrencyLimitReached(_) => {
                Self::rate_limited(message)
            }
            CoreError::InvalidAmount(_) => Self::bad_request(message),
            CoreError::Serialization(_)
            | CoreError::Database(_)
            | CoreError::Internal(_) => Self::internal(message),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        Self::internal(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reelworks_model::{JobId, TenantId};

    #[test]
    fn core_errors_map_to_expected_statuses() {
        let cases = [
            (
                AppError::from(CoreError::InsufficientCredits {
                    tenant_id: TenantId::new(),
                    required: 10,
                    available: 3,
                }),
                StatusCode::PAYMENT_REQUIRED,
            ),
            (
                AppError::from(CoreError::JobNotFound(JobId::new())),
                StatusCode::NOT_FOUND,
            ),
            (
                AppError::from(CoreError::InvalidJobState("done".into())),
                StatusCode::CONFLICT,
            ),
            (
                AppError::from(CoreError::ConcurrencyLimitReached(
                    "busy".into(),
                )),
                StatusCode::TOO_MANY_REQUESTS,
            ),
            (
                AppError::from(CoreError::InvalidAmount(-5)),
                StatusCode::BAD_REQUEST,
            ),
        ];

        for (err, status) in cases {
            assert_eq!(err.status, status, "{}", err.message);
        }
    }
}
