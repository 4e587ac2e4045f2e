use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::models::ActionResult;

/// PortalError
///
/// The single error taxonomy shared by the repository, the identity client and the handlers.
/// Every variant carries a human-readable message that is safe to surface inline in the UI,
/// except `Backend`, whose detail is logged and replaced with a generic message on the wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PortalError {
    /// Bad credentials, or a missing/invalid/expired session.
    #[error("authentication failed: {0}")]
    Auth(String),
    /// The caller is authenticated but lacks the role or ownership for the action.
    #[error("forbidden: {0}")]
    Forbidden(String),
    /// No role, doctor, specialization or child row matched.
    #[error("not found: {0}")]
    NotFound(String),
    /// A required field is missing or a value violates a constraint.
    #[error("validation failed: {0}")]
    Validation(String),
    /// The data service or identity provider failed.
    #[error("backend failure: {0}")]
    Backend(String),
}

impl PortalError {
    pub fn status(&self) -> StatusCode {
        match self {
            PortalError::Auth(_) => StatusCode::UNAUTHORIZED,
            PortalError::Forbidden(_) => StatusCode::FORBIDDEN,
            PortalError::NotFound(_) => StatusCode::NOT_FOUND,
            PortalError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            PortalError::Backend(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// The message placed in the `error` field of the response envelope.
    pub fn public_message(&self) -> String {
        match self {
            PortalError::Auth(msg)
            | PortalError::Forbidden(msg)
            | PortalError::NotFound(msg)
            | PortalError::Validation(msg) => msg.clone(),
            PortalError::Backend(_) => "Something went wrong. Please try again.".to_string(),
        }
    }
}

impl From<sqlx::Error> for PortalError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => PortalError::NotFound("record not found".to_string()),
            // 23505: unique_violation
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => {
                PortalError::Validation(format!(
                    "a record with the same {} already exists",
                    db.constraint().unwrap_or("value")
                ))
            }
            // 23514: check_violation
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23514") => {
                PortalError::Validation(db.message().to_string())
            }
            _ => PortalError::Backend(err.to_string()),
        }
    }
}

impl From<reqwest::Error> for PortalError {
    fn from(err: reqwest::Error) -> Self {
        PortalError::Backend(format!("identity provider request failed: {}", err))
    }
}

impl IntoResponse for PortalError {
    fn into_response(self) -> Response {
        if let PortalError::Backend(detail) = &self {
            tracing::error!(error = %detail, "request failed with backend error");
        }
        let body = ActionResult::failure(self.public_message());
        (self.status(), Json(body)).into_response()
    }
}
