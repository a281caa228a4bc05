use axum::{
    extract::{FromRequestParts, OptionalFromRequestParts},
    http::{header::AUTHORIZATION, request::Parts},
};
use tracing::{debug, instrument, trace};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    auth::session::{self, TokenType},
    errors::{Error, Result},
};

/// Pull the token out of an `Authorization: Bearer <token>` header.
///
/// Returns:
/// - None: no Authorization header
/// - Some(Ok(token)): a bearer token
/// - Some(Err(error)): header present but not a bearer token
fn bearer_token(parts: &Parts) -> Option<Result<&str>> {
    let header = parts.headers.get(AUTHORIZATION)?;
    let value = match header.to_str() {
        Ok(value) => value,
        Err(_) => {
            return Some(Err(Error::Unauthenticated {
                message: Some("Invalid Authorization header".to_string()),
            }));
        }
    };
    match value.strip_prefix("Bearer ") {
        Some(token) if !token.trim().is_empty() => Some(Ok(token.trim())),
        _ => Some(Err(Error::Unauthenticated {
            message: Some("Authorization header must be 'Bearer <token>'".to_string()),
        })),
    }
}

/// Verify the access token and load the user it names, rejecting deactivated accounts.
async fn authenticate(token: &str, state: &AppState) -> Result<CurrentUser> {
    let claims = session::verify_token(token, TokenType::Access, &state.config)?;
    let user = state
        .storage
        .get_user(&claims.sub)
        .await?
        .ok_or_else(|| Error::Unauthenticated {
            message: Some("User not found".to_string()),
        })?;
    if !user.is_active {
        return Err(Error::Unauthenticated {
            message: Some("User is inactive".to_string()),
        });
    }
    debug!(user_id = %user.id, user_type = %user.user_type, "Authenticated bearer token");
    Ok(CurrentUser::from(user))
}

impl FromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    #[instrument(skip(parts, state))]
    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        match bearer_token(parts) {
            Some(Ok(token)) => authenticate(token, state).await,
            Some(Err(e)) => Err(e),
            None => {
                trace!("No Authorization header present");
                Err(Error::Unauthenticated { message: None })
            }
        }
    }
}

/// `Option<CurrentUser>` is `None` only when no credentials were sent; bad credentials
/// are still rejected.
impl OptionalFromRequestParts<AppState> for CurrentUser {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Option<Self>> {
        match bearer_token(parts) {
            Some(Ok(token)) => authenticate(token, state).await.map(Some),
            Some(Err(e)) => Err(e),
            None => Ok(None),
        }
    }
}
