use axum::{extract::State, http::StatusCode, Json};
use parlor_hub::{Session, User};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{ApiError, AppState, CurrentUser};

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserResponse {
    pub user: User,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub session: Session,
    pub user: User,
}

pub async fn signup(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    let user = state
        .authenticator()
        .register(request.username.trim(), &request.password)
        .await?;

    Ok((StatusCode::CREATED, Json(UserResponse { user })))
}

pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<CredentialsRequest>,
) -> Result<Json<SessionResponse>, ApiError> {
    let session = state
        .authenticator()
        .login(request.username.trim(), &request.password)
        .await?;
    let user = state.authenticate(&session.id).await?;

    Ok(Json(SessionResponse { session, user }))
}

/// Ends the session and drops the user's live connection with it.
pub async fn logout(
    State(state): State<AppState>,
    current: CurrentUser,
) -> Result<StatusCode, ApiError> {
    state.authenticator().logout(&current.token).await?;
    if state.hub().disconnect_user(current.user.id) {
        info!(user_id = %current.user.id, "closed live connection on logout");
    }
    Ok(StatusCode::NO_CONTENT)
}

pub async fn current_user(current: CurrentUser) -> Json<UserResponse> {
    Json(UserResponse { user: current.user })
}
