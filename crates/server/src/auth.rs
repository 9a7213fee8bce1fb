use std::sync::Arc;

use axum::{
    async_trait,
    extract::FromRequestParts,
    http::{header, request::Parts, HeaderMap, StatusCode},
    Json,
};
use server_api::{auth::verify_token, AuthContext};
use shared::error::{ApiError, ErrorCode};
use tracing::debug;

use crate::app_state::AppState;

/// Caller identity taken from the `Authorization: Bearer` header.
pub(crate) struct AuthUser(pub(crate) AuthContext);

#[async_trait]
impl FromRequestParts<Arc<AppState>> for AuthUser {
    type Rejection = (StatusCode, Json<ApiError>);

    async fn from_request_parts(
        parts: &mut Parts,
        state: &Arc<AppState>,
    ) -> Result<Self, Self::Rejection> {
        let token = extract_bearer(&parts.headers)
            .ok_or_else(|| unauthorized("missing bearer token"))?;
        let caller = verify_token(&state.api.auth, token).map_err(|error| {
            debug!(%error, "rejected bearer token");
            unauthorized("invalid bearer token")
        })?;
        Ok(Self(caller))
    }
}

fn extract_bearer(headers: &HeaderMap) -> Option<&str> {
    let token = headers
        .get(header::AUTHORIZATION)?
        .to_str()
        .ok()?
        .strip_prefix("Bearer ")?
        .trim();
    (!token.is_empty()).then_some(token)
}

fn unauthorized(message: &str) -> (StatusCode, Json<ApiError>) {
    (
        StatusCode::UNAUTHORIZED,
        Json(ApiError::new(ErrorCode::Unauthorized, message)),
    )
}
