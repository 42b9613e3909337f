//! Session extraction for authenticated routes.

use axum::{
    async_trait,
    extract::{FromRequestParts, Query},
    http::{header::AUTHORIZATION, request::Parts, HeaderMap, Uri},
};
use parlor_hub::User;
use serde::Deserialize;

use crate::{ApiError, AppState};

pub(crate) const SESSION_HEADER: &str = "x-session-id";

#[derive(Debug, Deserialize)]
struct TokenQuery {
    token: Option<String>,
}

/// Find the session id of a request.
///
/// Checked in order: `Authorization: Bearer`, `x-session-id`, then the
/// `token` query parameter, which is the only option for browser websockets.
pub fn session_token(headers: &HeaderMap, uri: &Uri) -> Result<String, ApiError> {
    if let Some(value) = headers
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
    {
        let mut parts = value.split_whitespace();
        let scheme = parts.next().unwrap_or("");
        if !scheme.eq_ignore_ascii_case("Bearer") {
            return Err(ApiError::unauthorized("invalid authorization scheme"));
        }
        return match parts.next() {
            Some(token) if !token.is_empty() => Ok(token.to_string()),
            _ => Err(ApiError::unauthorized("missing bearer token")),
        };
    }

    if let Some(token) = headers
        .get(SESSION_HEADER)
        .and_then(|header| header.to_str().ok())
        .map(str::trim)
        .filter(|token| !token.is_empty())
    {
        return Ok(token.to_string());
    }

    Query::<TokenQuery>::try_from_uri(uri)
        .ok()
        .and_then(|Query(query)| query.token)
        .filter(|token| !token.is_empty())
        .ok_or_else(|| ApiError::unauthorized("missing session token"))
}

/// The authenticated user and the session id they presented.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user: User,
    pub token: String,
}

#[async_trait]
impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self, Self::Rejection> {
        let token = session_token(&parts.headers, &parts.uri)?;
        let user = state.authenticate(&token).await?;
        Ok(Self { user, token })
    }
}
