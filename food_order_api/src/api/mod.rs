//! API layer for HTTP request handling and data models.
//!
//! - **[`handlers`]**: Axum route handlers for all API endpoints
//! - **[`models`]**: Request/response data structures for API communication
//!
//! # API Structure
//!
//! Everything is served under `/api`:
//!
//! - **Authentication** (`/api/users/login/`, `/api/users/refresh/`): JWT pairs
//! - **Registration** (`/api/user/`)
//! - **Users** (`/api/users/*`): listing with order details, profile updates, soft delete
//! - **Products** (`/api/products/*`): admin-managed catalogue
//! - **Orders** (`/api/orders/*`): placing orders, delivery status, OTP checks, bulk product
//!   import and task progress
//!
//! # OpenAPI Documentation
//!
//! Interactive documentation is served at `/doc/`.

use axum::{
    body::Bytes,
    extract::{FromRequest, Request},
};
use serde::de::DeserializeOwned;
use serde_json::json;

use crate::errors::Error;

pub mod handlers;
pub mod models;

/// JSON body extractor whose rejections use the API's error shape.
///
/// An empty body is read as `null`, so handlers taking an `Option<T>` can report
/// missing data themselves.
pub struct JsonBody<T>(pub T);

fn parse_error(message: impl std::fmt::Display) -> Error {
    Error::Validation {
        errors: json!({ "detail": format!("JSON parse error - {message}") }),
    }
}

impl<T, S> FromRequest<S> for JsonBody<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = Error;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let bytes = Bytes::from_request(req, state)
            .await
            .map_err(|rejection| parse_error(rejection.body_text()))?;
        let body: &[u8] = if bytes.iter().all(u8::is_ascii_whitespace) {
            b"null"
        } else {
            &bytes
        };
        serde_json::from_slice(body).map(JsonBody).map_err(parse_error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Value;

    async fn extract<T: DeserializeOwned>(body: &'static str) -> Result<T, Error> {
        let request = Request::builder().body(axum::body::Body::from(body)).unwrap();
        JsonBody::<T>::from_request(request, &()).await.map(|JsonBody(v)| v)
    }

    #[tokio::test]
    async fn empty_body_reads_as_null() {
        assert_eq!(extract::<Value>("").await.unwrap(), Value::Null);
        assert_eq!(extract::<Value>("  \n").await.unwrap(), Value::Null);
    }

    #[tokio::test]
    async fn malformed_body_is_a_detail_error() {
        match extract::<Value>("{not json").await {
            Err(Error::Validation { errors }) => {
                assert!(errors["detail"].as_str().unwrap().starts_with("JSON parse error - "));
            }
            other => panic!("expected validation error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn typed_bodies_deserialize() {
        #[derive(serde::Deserialize)]
        struct Otp {
            otp: String,
        }
        assert_eq!(extract::<Otp>(r#"{"otp":"abc"}"#).await.unwrap().otp, "abc");
        assert!(extract::<Otp>("").await.is_err());
    }
}
