use axum::{
    extract::rejection::{JsonRejection, PathRejection},
    extract::multipart::{MultipartError, MultipartRejection},
    http::StatusCode,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("validation error: {0}")]
    ValidationError(#[from] validator::ValidationErrors),

    #[error("{0}")]
    InvalidInput(String),

    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Conflict(String),

    #[error("method not allowed")]
    MethodNotAllowed,

    #[error("request timed out")]
    RequestTimeout,

    #[error("{0}")]
    Unauthorized(UnauthorizedType),

    #[error("{0}")]
    PasswordHashError(#[from] password_hash::Error),

    #[error("{0}")]
    DatabaseError(#[from] mongodb::error::Error),

    #[error("{0}")]
    JWTError(#[from] jsonwebtoken::errors::Error),

    #[error("{0}")]
    BSONSerError(#[from] bson::ser::Error),

    #[error("{0}")]
    IoError(#[from] std::io::Error),

    #[error("{0}")]
    TaskError(#[from] tokio::task::JoinError),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UnauthorizedType {
    #[error("User is not authenticated")]
    MissingSession,

    #[error("Invalid or expired session token")]
    InvalidToken,

    #[error("Session user no longer exists")]
    UnknownUser,

    #[error("Invalid email, password or role")]
    WrongCredentials,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorJson {
    pub success: bool,
    pub r#type: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<serde_json::Value>,
}

impl Error {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::ValidationError(..) | Self::InvalidInput(..) => StatusCode::BAD_REQUEST,
            Self::Unauthorized(..) => StatusCode::UNAUTHORIZED,
            Self::NotFound(..) => StatusCode::NOT_FOUND,
            Self::Conflict(..) => StatusCode::CONFLICT,
            Self::MethodNotAllowed => StatusCode::METHOD_NOT_ALLOWED,
            Self::RequestTimeout => StatusCode::REQUEST_TIMEOUT,
            Self::PasswordHashError(..)
            | Self::DatabaseError(..)
            | Self::JWTError(..)
            | Self::BSONSerError(..)
            | Self::IoError(..)
            | Self::TaskError(..) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn variant_name(&self) -> &'static str {
        match self {
            Self::ValidationError(..) => "ValidationError",
            Self::InvalidInput(..) => "InvalidInput",
            Self::NotFound(..) => "NotFound",
            Self::Conflict(..) => "Conflict",
            Self::MethodNotAllowed => "MethodNotAllowed",
            Self::RequestTimeout => "RequestTimeout",
            Self::Unauthorized(..) => "Unauthorized",
            Self::PasswordHashError(..)
            | Self::DatabaseError(..)
            | Self::JWTError(..)
            | Self::BSONSerError(..)
            | Self::IoError(..)
            | Self::TaskError(..) => "InternalError",
        }
    }
}

impl From<Error> for ErrorJson {
    fn from(err: Error) -> Self {
        let r#type = err.variant_name().to_string();

        // Internal faults are logged, never echoed.
        let message = if err.status().is_server_error() {
            "Internal Server Error".to_string()
        } else {
            err.to_string()
        };

        let errors = match err {
            Error::ValidationError(err) => serde_json::to_value(err).ok(),
            _ => None,
        };

        Self {
            success: false,
            r#type,
            message,
            errors,
        }
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> axum::response::Response {
        let status = self.status();
        if status.is_server_error() {
            tracing::error!("error: {:?}", self);
        } else {
            tracing::debug!("rejected: {}", self);
        }

        (status, Json(ErrorJson::from(self))).into_response()
    }
}

impl From<PathRejection> for Error {
    fn from(_value: PathRejection) -> Self {
        Self::NotFound("resource")
    }
}

impl From<JsonRejection> for Error {
    fn from(value: JsonRejection) -> Self {
        Self::InvalidInput(value.body_text())
    }
}

impl From<MultipartRejection> for Error {
    fn from(value: MultipartRejection) -> Self {
        Self::InvalidInput(value.body_text())
    }
}

impl From<MultipartError> for Error {
    fn from(value: MultipartError) -> Self {
        Self::InvalidInput(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_password_hash_error_is_internal() {
        let err = Error::from(password_hash::Error::Password);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);

        let json = ErrorJson::from(err);
        assert!(!json.success);
        assert_eq!(json.r#type, "InternalError");
        assert_eq!(json.message, "Internal Server Error");
    }

    #[test]
    fn test_routing_errors() {
        assert_eq!(Error::NotFound("route").to_string(), "route not found");
        assert_eq!(
            Error::MethodNotAllowed.status(),
            StatusCode::METHOD_NOT_ALLOWED
        );

        let json = ErrorJson::from(Error::RequestTimeout);
        assert_eq!(json.r#type, "RequestTimeout");
        assert_eq!(json.message, "request timed out");
    }
}
