use application::ApplicationError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use domain::{DomainError, RepositoryError};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
}

#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    body: ErrorBody,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            body: ErrorBody {
                code,
                message: message.into(),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, "UNAUTHORIZED", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<DomainError> for ApiError {
    fn from(error: DomainError) -> Self {
        match &error {
            DomainError::ValidationError { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_ARGUMENT", error.to_string())
            }
            DomainError::NotParticipant { .. } => {
                ApiError::new(StatusCode::FORBIDDEN, "NOT_A_PARTICIPANT", error.to_string())
            }
            DomainError::ConversationNotFound { .. } => ApiError::new(
                StatusCode::NOT_FOUND,
                "CONVERSATION_NOT_FOUND",
                error.to_string(),
            ),
            DomainError::RecipientRequired | DomainError::InvalidRecipient { .. } => {
                ApiError::new(StatusCode::BAD_REQUEST, "INVALID_RECIPIENT", error.to_string())
            }
        }
    }
}

impl From<ApplicationError> for ApiError {
    fn from(error: ApplicationError) -> Self {
        match error {
            ApplicationError::Domain(err) => err.into(),
            ApplicationError::Repository(repo_err) | ApplicationError::Persistence(repo_err) => {
                match repo_err {
                    RepositoryError::NotFound => ApiError::new(
                        StatusCode::NOT_FOUND,
                        "NOT_FOUND",
                        "requested resource not found",
                    ),
                    RepositoryError::Conflict => {
                        ApiError::new(StatusCode::CONFLICT, "CONFLICT", "resource conflict")
                    }
                    RepositoryError::Storage { message } => {
                        tracing::error!(error = %message, "存储访问失败");
                        ApiError::new(
                            StatusCode::INTERNAL_SERVER_ERROR,
                            "DATABASE_ERROR",
                            "storage unavailable",
                        )
                    }
                }
            }
            ApplicationError::UnknownConnection(id) => ApiError::new(
                StatusCode::NOT_FOUND,
                "NOT_CONNECTED",
                format!("connection {id} is not registered"),
            ),
            ApplicationError::HubUnavailable => ApiError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                "HUB_UNAVAILABLE",
                "chat hub is unavailable",
            ),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(self.body)).into_response()
    }
}
