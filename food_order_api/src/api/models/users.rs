//! API request/response models for users.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::rust::double_option;
use utoipa::{IntoParams, ToSchema};

use super::{BLANK, FieldErrors, money, required_string};
use crate::auth::normalize_email;
use crate::config::PasswordConfig;
use crate::db::models::users::{OrderSummary, UserDBResponse, UserType};
use crate::types::UserId;

const USERNAME_MAX: usize = 150;
const EMAIL_MAX: usize = 254;
const PHONE_MAX: usize = 60;

// User request models

/// Registration and full-update payload. Every field is optional at parse time so that
/// [`UserCreate::validate`] can report all missing fields at once.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct UserCreate {
    #[schema(example = "alice")]
    pub username: Option<String>,
    #[schema(example = "alice@example.com")]
    pub email: Option<String>,
    /// Generated and emailed to the user when omitted
    pub password: Option<String>,
    /// `null` or blank clears the phone number
    #[serde(default, with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
    /// Only honoured when an admin makes the request
    pub user_type: Option<UserType>,
    pub is_active: Option<bool>,
}

/// A validated user payload.
#[derive(Debug, Clone, PartialEq)]
pub struct UserInput {
    pub username: String,
    pub email: String,
    pub password: Option<String>,
    /// `None` when absent, `Some(None)` when cleared
    pub phone: Option<Option<String>>,
    pub user_type: Option<UserType>,
    pub is_active: Option<bool>,
}

fn is_valid_username(username: &str) -> bool {
    username
        .chars()
        .all(|c| c.is_alphanumeric() || matches!(c, '@' | '.' | '+' | '-' | '_'))
}

fn is_valid_email(email: &str) -> bool {
    let Some((local, domain)) = email.rsplit_once('@') else {
        return false;
    };
    !local.is_empty()
        && !email.chars().any(char::is_whitespace)
        && domain.contains('.')
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.split('.').all(|label| !label.is_empty())
}

fn max_length(errors: &mut FieldErrors, field: &str, value: &str, max: usize) -> bool {
    if value.chars().count() > max {
        errors.add(field, format!("Ensure this field has no more than {max} characters."));
        false
    } else {
        true
    }
}

impl UserCreate {
    /// Check every field, collecting all failures.
    ///
    /// `username` and `email` are always required; the remaining fields are optional.
    pub fn validate(&self, policy: &PasswordConfig) -> Result<UserInput, FieldErrors> {
        let mut errors = FieldErrors::new();

        let username = required_string(&mut errors, "username", self.username.as_deref(), USERNAME_MAX).and_then(
            |username| {
                if is_valid_username(&username) {
                    Some(username)
                } else {
                    errors.add(
                        "username",
                        "Enter a valid username. This value may contain only letters, numbers, and @/./+/-/_ characters.",
                    );
                    None
                }
            },
        );

        let email = required_string(&mut errors, "email", self.email.as_deref(), EMAIL_MAX).and_then(|email| {
            if is_valid_email(&email) {
                Some(normalize_email(&email))
            } else {
                errors.add("email", "Enter a valid email address.");
                None
            }
        });

        let password = self.password.as_deref().map(str::trim).and_then(|password| {
            if password.is_empty() {
                errors.add("password", BLANK);
                None
            } else if password.chars().count() < policy.min_length {
                errors.add(
                    "password",
                    format!("Ensure this field has at least {} characters.", policy.min_length),
                );
                None
            } else if max_length(&mut errors, "password", password, policy.max_length) {
                Some(password.to_string())
            } else {
                None
            }
        });

        let phone = match &self.phone {
            None => None,
            Some(phone) => match phone.as_deref().map(str::trim) {
                None | Some("") => Some(None),
                Some(phone) => max_length(&mut errors, "phone", phone, PHONE_MAX).then(|| Some(phone.to_string())),
            },
        };

        match (username, email) {
            (Some(username), Some(email)) if errors.is_empty() => Ok(UserInput {
                username,
                email,
                password,
                phone,
                user_type: self.user_type,
                is_active: self.is_active,
            }),
            _ => Err(errors),
        }
    }
}

// User response models

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub user_type: UserType,
    pub date_joined: DateTime<Utc>,
    pub is_active: bool,
}

impl From<UserDBResponse> for UserResponse {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            phone: db.phone,
            user_type: db.user_type,
            date_joined: db.date_joined,
            is_active: db.is_active,
        }
    }
}

/// Aggregate of a customer's orders.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct OrderDetails {
    /// Null when the user has no orders
    #[schema(value_type = Option<String>, example = "42.50")]
    pub total_amount: Option<Decimal>,
    pub order_count: i64,
}

impl From<OrderSummary> for OrderDetails {
    fn from(summary: OrderSummary) -> Self {
        Self {
            total_amount: summary.total_amount.map(money),
            order_count: summary.order_count,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UserWithOrderDetails {
    #[serde(flatten)]
    pub user: UserResponse,
    pub order_details: OrderDetails,
}

/// Query parameters for listing users
#[derive(Debug, Deserialize, IntoParams, ToSchema)]
pub struct ListUsersQuery {
    /// Only return users of this type (`admin`, `delivery_agent` or `user`)
    pub user_type: Option<String>,
}

/// The authenticated caller, resolved from the bearer token.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CurrentUser {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub user_type: UserType,
}

impl CurrentUser {
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    pub fn is_delivery_agent(&self) -> bool {
        self.user_type == UserType::DeliveryAgent
    }

    pub fn is_user(&self) -> bool {
        self.user_type == UserType::User
    }
}

impl From<UserDBResponse> for CurrentUser {
    fn from(db: UserDBResponse) -> Self {
        Self {
            id: db.id,
            username: db.username,
            email: db.email,
            user_type: db.user_type,
        }
    }
}
