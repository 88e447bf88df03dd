use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use tracing::error;

use crate::users::{
    dto::MessageResponse,
    services::RegisterError,
    validation::{ValidationErrors, EMAIL_IN_USE},
};

pub const EMAIL_FAILURE: &str = "Email failure";
pub const INTERNAL_ERROR: &str = "Internal server error";

/// Errors a handler can return; each maps to one status and JSON body.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("validation failed")]
    Validation(ValidationErrors),

    #[error("{0}")]
    BadRequest(String),

    #[error("activation email could not be sent")]
    EmailFailure(#[source] anyhow::Error),

    #[error("internal server error")]
    Internal(#[source] anyhow::Error),
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ValidationBody<'a> {
    validation_errors: &'a ValidationErrors,
}

impl ApiError {
    pub fn internal(err: impl Into<anyhow::Error>) -> Self {
        Self::Internal(err.into())
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Validation(_) | Self::BadRequest(_) => StatusCode::BAD_REQUEST,
            Self::EmailFailure(_) => StatusCode::BAD_GATEWAY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<RegisterError> for ApiError {
    fn from(e: RegisterError) -> Self {
        match e {
            RegisterError::EmailInUse => {
                let mut errors = ValidationErrors::new();
                errors.add("email", EMAIL_IN_USE);
                Self::Validation(errors)
            }
            RegisterError::EmailFailure(e) => Self::EmailFailure(e),
            other => Self::Internal(other.into()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        match self {
            Self::Validation(errors) => (
                status,
                Json(ValidationBody {
                    validation_errors: &errors,
                }),
            )
                .into_response(),
            Self::BadRequest(msg) => (status, Json(MessageResponse::new(msg))).into_response(),
            Self::EmailFailure(e) => {
                error!(error = %e, "email failure");
                (status, Json(MessageResponse::new(EMAIL_FAILURE))).into_response()
            }
            Self::Internal(e) => {
                error!(error = ?e, "internal error");
                (status, Json(MessageResponse::new(INTERNAL_ERROR))).into_response()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::users::repo::RepoError;

    async fn body_json(resp: Response) -> serde_json::Value {
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX)
            .await
            .unwrap();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn email_in_use_is_a_validation_error() {
        let resp = ApiError::from(RegisterError::EmailInUse).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "validationErrors": { "email": "Email in use" } })
        );
    }

    #[tokio::test]
    async fn email_failure_is_bad_gateway() {
        let err = RegisterError::EmailFailure(anyhow::anyhow!("smtp down"));
        let resp = ApiError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "message": "Email failure" })
        );
    }

    #[tokio::test]
    async fn storage_failure_hides_details() {
        let err = RegisterError::Storage(RepoError::Database(sqlx::Error::PoolTimedOut));
        let resp = ApiError::from(err).into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(
            body_json(resp).await,
            serde_json::json!({ "message": "Internal server error" })
        );
    }
}
