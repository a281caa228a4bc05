use axum::{Json, extract::State};

use crate::{
    AppState,
    api::{
        JsonBody,
        models::auth::{AccessTokenResponse, LoginRequest, RefreshRequest, TokenPairResponse},
    },
    auth::{password, session},
    errors::{Error, Result},
};

const NO_ACTIVE_ACCOUNT: &str = "No active account found with the given credentials";

fn no_active_account() -> Error {
    Error::Unauthenticated {
        message: Some(NO_ACTIVE_ACCOUNT.to_string()),
    }
}

/// Obtain a JWT pair
#[utoipa::path(
    post,
    path = "/api/users/login/",
    tag = "users",
    summary = "Obtain a JWT pair",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Access and refresh tokens", body = TokenPairResponse),
        (status = 401, description = "Unknown user, wrong password or inactive account"),
    )
)]
#[tracing::instrument(skip_all, fields(username = %request.username))]
pub async fn login(State(state): State<AppState>, JsonBody(request): JsonBody<LoginRequest>) -> Result<Json<TokenPairResponse>> {
    let user = state
        .storage
        .get_user_by_username(&request.username)
        .await?
        .ok_or_else(no_active_account)?;

    // Verify on a blocking thread to avoid stalling the runtime
    let candidate = request.password.clone();
    let hash = user.password_hash.clone();
    let is_valid = tokio::task::spawn_blocking(move || password::verify_password(&candidate, &hash))
        .await
        .map_err(|e| Error::Internal {
            operation: format!("spawn password verification task: {e}"),
        })??;

    if !is_valid || !user.is_active {
        return Err(no_active_account());
    }

    let pair = session::issue_token_pair(&user, &state.config)?;
    Ok(Json(pair.into()))
}

/// Exchange a refresh token for a new access token
#[utoipa::path(
    post,
    path = "/api/users/refresh/",
    tag = "users",
    summary = "Refresh an access token",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "New access token", body = AccessTokenResponse),
        (status = 401, description = "Invalid or expired refresh token"),
    )
)]
#[tracing::instrument(skip_all)]
pub async fn refresh(State(state): State<AppState>, JsonBody(request): JsonBody<RefreshRequest>) -> Result<Json<AccessTokenResponse>> {
    let access = session::refresh_access_token(&request.refresh, &state.config)?;
    Ok(Json(AccessTokenResponse { access }))
}
