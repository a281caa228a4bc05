//! Role-based permission classes.
//!
//! A handler states who may call it by taking a [`RequiresPermission<P>`] argument, where
//! `P` is one of the policies below. The extractor authenticates the caller first, so
//! anonymous requests get 401 and authenticated callers of the wrong kind get 403.
//!
//! ```ignore
//! async fn list_products(
//!     State(state): State<AppState>,
//!     _: RequiresPermission<Admin>,
//! ) -> Result<Json<Vec<ProductResponse>>> { .. }
//! ```

use std::marker::PhantomData;
use std::ops::Deref;

use axum::{extract::FromRequestParts, http::request::Parts};

use crate::{
    AppState,
    api::models::users::CurrentUser,
    db::models::users::UserType,
    errors::{Error, Result},
};

/// A permission class: decides from the caller's account whether access is granted.
pub trait Policy: Send + Sync + 'static {
    /// Human-readable requirement used in logs
    const REQUIRED: &'static str;

    fn allows(user: &CurrentUser) -> bool;
}

pub struct Admin;
pub struct DeliveryAgent;
/// Plain customer account
pub struct Customer;
pub struct AdminOrCustomer;
/// Any active account
pub struct Authenticated;

impl Policy for Admin {
    const REQUIRED: &'static str = "admin";

    fn allows(user: &CurrentUser) -> bool {
        user.user_type == UserType::Admin
    }
}

impl Policy for DeliveryAgent {
    const REQUIRED: &'static str = "delivery_agent";

    fn allows(user: &CurrentUser) -> bool {
        user.user_type == UserType::DeliveryAgent
    }
}

impl Policy for Customer {
    const REQUIRED: &'static str = "user";

    fn allows(user: &CurrentUser) -> bool {
        user.user_type == UserType::User
    }
}

impl Policy for AdminOrCustomer {
    const REQUIRED: &'static str = "admin or user";

    fn allows(user: &CurrentUser) -> bool {
        Admin::allows(user) || Customer::allows(user)
    }
}

impl Policy for Authenticated {
    const REQUIRED: &'static str = "authenticated";

    fn allows(_: &CurrentUser) -> bool {
        true
    }
}

/// Extractor that yields the current user once `P` admits them.
pub struct RequiresPermission<P: Policy> {
    pub user: CurrentUser,
    _policy: PhantomData<P>,
}

impl<P: Policy> RequiresPermission<P> {
    pub fn check(user: CurrentUser, resource: &str) -> Result<Self> {
        if P::allows(&user) {
            Ok(Self {
                user,
                _policy: PhantomData,
            })
        } else {
            Err(Error::InsufficientPermissions {
                required: P::REQUIRED.to_string(),
                resource: resource.to_string(),
            })
        }
    }

    pub fn into_inner(self) -> CurrentUser {
        self.user
    }
}

impl<P: Policy> Deref for RequiresPermission<P> {
    type Target = CurrentUser;

    fn deref(&self) -> &CurrentUser {
        &self.user
    }
}

impl<P: Policy> FromRequestParts<AppState> for RequiresPermission<P> {
    type Rejection = Error;

    async fn from_request_parts(parts: &mut Parts, state: &AppState) -> Result<Self> {
        let user = <CurrentUser as FromRequestParts<AppState>>::from_request_parts(parts, state).await?;
        Self::check(user, parts.uri.path())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(user_type: UserType) -> CurrentUser {
        CurrentUser {
            id: "usr0000000000000000000000000000".to_string(),
            username: "someone".to_string(),
            email: "someone@example.com".to_string(),
            user_type,
        }
    }

    #[test]
    fn single_role_policies() {
        assert!(Admin::allows(&user(UserType::Admin)));
        assert!(!Admin::allows(&user(UserType::User)));
        assert!(DeliveryAgent::allows(&user(UserType::DeliveryAgent)));
        assert!(!DeliveryAgent::allows(&user(UserType::Admin)));
        assert!(Customer::allows(&user(UserType::User)));
        assert!(!Customer::allows(&user(UserType::DeliveryAgent)));
    }

    #[test]
    fn combined_policies() {
        assert!(AdminOrCustomer::allows(&user(UserType::Admin)));
        assert!(AdminOrCustomer::allows(&user(UserType::User)));
        assert!(!AdminOrCustomer::allows(&user(UserType::DeliveryAgent)));
        for t in [UserType::Admin, UserType::DeliveryAgent, UserType::User] {
            assert!(Authenticated::allows(&user(t)));
        }
    }

    #[test]
    fn check_reports_requirement() {
        match RequiresPermission::<Admin>::check(user(UserType::User), "/api/products/") {
            Err(Error::InsufficientPermissions { required, resource }) => {
                assert_eq!(required, "admin");
                assert_eq!(resource, "/api/products/");
            }
            _ => panic!("expected insufficient permissions"),
        }
        let granted = RequiresPermission::<AdminOrCustomer>::check(user(UserType::User), "/api/orders/").unwrap();
        assert_eq!(granted.username, "someone");
    }
}
