use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use tracing::{info, instrument, warn};

use crate::{
    error::ApiError,
    state::AppState,
    users::{
        dto::{MessageResponse, RegistrationRequest},
        services::register_user,
        validation::{check_email_available, check_fields, normalize},
    },
};

pub const USER_CREATED: &str = "User created!";

pub fn user_routes() -> Router<AppState> {
    Router::new().route("/api/1.0/users", post(create_user))
}

#[instrument(skip(state, payload))]
pub async fn create_user(
    State(state): State<AppState>,
    payload: Result<Json<RegistrationRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<MessageResponse>), ApiError> {
    let Json(payload) = payload.map_err(|e| {
        warn!(error = %e, "rejected request body");
        ApiError::BadRequest(e.body_text())
    })?;

    let registration = normalize(payload);
    let mut errors = check_fields(&registration);
    check_email_available(state.users.as_ref(), &mut errors, &registration.email)
        .await
        .map_err(ApiError::internal)?;
    if !errors.is_empty() {
        let fields: Vec<&str> = errors.fields().collect();
        warn!(?fields, "validation failed");
        return Err(ApiError::Validation(errors));
    }

    let user = register_user(state.users.as_ref(), state.mailer.as_ref(), registration).await?;

    info!(user_id = %user.id, "signup accepted");
    Ok((StatusCode::CREATED, Json(MessageResponse::new(USER_CREATED))))
}
