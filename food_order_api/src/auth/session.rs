//! JWT access/refresh token issuance and verification.

use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode, errors::ErrorKind};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use uuid::Uuid;

use crate::{
    config::Config,
    db::models::users::{UserDBResponse, UserType},
    errors::Error,
    types::UserId,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Access,
    Refresh,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: UserId,
    pub username: String,
    pub user_type: UserType,
    pub token_type: TokenType,
    /// Unique token id
    pub jti: String,
    pub exp: i64,
    pub iat: i64,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access: String,
    pub refresh: String,
}

fn secret(config: &Config) -> Result<&[u8], Error> {
    config
        .secret_key
        .as_deref()
        .map(str::as_bytes)
        .ok_or_else(|| Error::Internal {
            operation: "JWT: secret_key is required".to_string(),
        })
}

fn issue(sub: &str, username: &str, user_type: UserType, token_type: TokenType, lifetime: Duration, config: &Config) -> Result<String, Error> {
    let now = Utc::now();
    let lifetime = chrono::Duration::from_std(lifetime).map_err(|e| Error::Internal {
        operation: format!("convert token lifetime: {e}"),
    })?;
    let claims = Claims {
        sub: sub.to_string(),
        username: username.to_string(),
        user_type,
        token_type,
        jti: Uuid::new_v4().simple().to_string(),
        exp: (now + lifetime).timestamp(),
        iat: now.timestamp(),
    };

    encode(&Header::default(), &claims, &EncodingKey::from_secret(secret(config)?)).map_err(|e| Error::Internal {
        operation: format!("create JWT: {e}"),
    })
}

/// Issue an access and refresh token for a user.
pub fn issue_token_pair(user: &UserDBResponse, config: &Config) -> Result<TokenPair, Error> {
    Ok(TokenPair {
        access: issue(
            &user.id,
            &user.username,
            user.user_type,
            TokenType::Access,
            config.auth.access_token_lifetime,
            config,
        )?,
        refresh: issue(
            &user.id,
            &user.username,
            user.user_type,
            TokenType::Refresh,
            config.auth.refresh_token_lifetime,
            config,
        )?,
    })
}

/// Verify a token's signature and expiry and check it is of the expected type.
pub fn verify_token(token: &str, expected: TokenType, config: &Config) -> Result<Claims, Error> {
    let key = DecodingKey::from_secret(secret(config)?);
    let mut validation = Validation::default();
    validation.leeway = 0;

    let token_data = decode::<Claims>(token, &key, &validation).map_err(|e| match e.kind() {
        // Client errors (401) - malformed, expired or tampered tokens
        ErrorKind::InvalidToken
        | ErrorKind::InvalidSignature
        | ErrorKind::ExpiredSignature
        | ErrorKind::MissingRequiredClaim(_)
        | ErrorKind::InvalidIssuer
        | ErrorKind::InvalidAudience
        | ErrorKind::InvalidSubject
        | ErrorKind::ImmatureSignature
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_)
        | ErrorKind::InvalidAlgorithm => Error::Unauthenticated {
            message: Some("Given token not valid for any token type".to_string()),
        },
        _ => Error::Internal {
            operation: format!("JWT verification: {e}"),
        },
    })?;

    if token_data.claims.token_type != expected {
        return Err(Error::Unauthenticated {
            message: Some("Token has wrong type".to_string()),
        });
    }

    Ok(token_data.claims)
}

/// Exchange a refresh token for a fresh access token.
pub fn refresh_access_token(refresh: &str, config: &Config) -> Result<String, Error> {
    let claims = verify_token(refresh, TokenType::Refresh, config)?;
    issue(
        &claims.sub,
        &claims.username,
        claims.user_type,
        TokenType::Access,
        config.auth.access_token_lifetime,
        config,
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_config() -> Config {
        Config {
            secret_key: Some("test-secret-key-for-jwt".to_string()),
            ..Default::default()
        }
    }

    fn create_test_user() -> UserDBResponse {
        UserDBResponse {
            id: "usr0123456789abcdef0123456789ab".to_string(),
            username: "alice".to_string(),
            email: "alice@example.com".to_string(),
            phone: None,
            user_type: UserType::User,
            password_hash: String::new(),
            is_active: true,
            date_joined: Utc::now(),
        }
    }

    #[test]
    fn test_token_pair_round_trip() {
        let config = create_test_config();
        let user = create_test_user();
        let pair = issue_token_pair(&user, &config).unwrap();

        let access = verify_token(&pair.access, TokenType::Access, &config).unwrap();
        assert_eq!(access.sub, user.id);
        assert_eq!(access.username, "alice");
        assert_eq!(access.user_type, UserType::User);

        let refresh = verify_token(&pair.refresh, TokenType::Refresh, &config).unwrap();
        assert!(refresh.exp > access.exp);
    }

    #[test]
    fn test_token_type_is_enforced() {
        let config = create_test_config();
        let pair = issue_token_pair(&create_test_user(), &config).unwrap();

        assert!(matches!(
            verify_token(&pair.refresh, TokenType::Access, &config),
            Err(Error::Unauthenticated { .. })
        ));
        assert!(matches!(
            verify_token(&pair.access, TokenType::Refresh, &config),
            Err(Error::Unauthenticated { .. })
        ));
    }

    #[test]
    fn test_refresh_issues_access_token() {
        let config = create_test_config();
        let pair = issue_token_pair(&create_test_user(), &config).unwrap();

        let access = refresh_access_token(&pair.refresh, &config).unwrap();
        let claims = verify_token(&access, TokenType::Access, &config).unwrap();
        assert_eq!(claims.username, "alice");
    }

    #[test]
    fn test_wrong_secret_is_rejected() {
        let config = create_test_config();
        let pair = issue_token_pair(&create_test_user(), &config).unwrap();

        let other = Config {
            secret_key: Some("a-different-secret".to_string()),
            ..Default::default()
        };
        assert!(matches!(
            verify_token(&pair.access, TokenType::Access, &other),
            Err(Error::Unauthenticated { .. })
        ));
    }

    #[test]
    fn test_garbage_token_is_rejected() {
        let config = create_test_config();
        assert!(matches!(
            verify_token("not.a.jwt", TokenType::Access, &config),
            Err(Error::Unauthenticated { .. })
        ));
    }

    #[test]
    fn test_expired_token_is_rejected() {
        let mut config = create_test_config();
        config.auth.access_token_lifetime = Duration::from_secs(1);
        let user = create_test_user();
        let token = issue(&user.id, &user.username, user.user_type, TokenType::Access, Duration::from_secs(1), &config).unwrap();
        std::thread::sleep(Duration::from_millis(2100));

        assert!(matches!(
            verify_token(&token, TokenType::Access, &config),
            Err(Error::Unauthenticated { .. })
        ));
    }
}
