//! Storage models for users.

use crate::types::UserId;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

/// Account kind. Determines which permission classes a user satisfies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum UserType {
    Admin,
    DeliveryAgent,
    /// Customer
    #[default]
    User,
}

impl UserType {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserType::Admin => "admin",
            UserType::DeliveryAgent => "delivery_agent",
            UserType::User => "user",
        }
    }
}

impl fmt::Display for UserType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for UserType {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "admin" => Ok(UserType::Admin),
            "delivery_agent" => Ok(UserType::DeliveryAgent),
            "user" => Ok(UserType::User),
            other => Err(anyhow::anyhow!("unknown user type: {other}")),
        }
    }
}

#[derive(Debug, Clone)]
pub struct UserCreateDBRequest {
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub user_type: UserType,
    pub password_hash: String,
}

/// Fields left as `None` are not touched.
#[derive(Debug, Clone, Default)]
pub struct UserUpdateDBRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    /// `Some(None)` clears the phone number
    pub phone: Option<Option<String>>,
    pub user_type: Option<UserType>,
    pub password_hash: Option<String>,
    pub is_active: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct UserDBResponse {
    pub id: UserId,
    pub username: String,
    pub email: String,
    pub phone: Option<String>,
    pub user_type: UserType,
    pub password_hash: String,
    pub is_active: bool,
    pub date_joined: DateTime<Utc>,
}

impl UserDBResponse {
    pub fn is_admin(&self) -> bool {
        self.user_type == UserType::Admin
    }

    pub fn is_delivery_agent(&self) -> bool {
        self.user_type == UserType::DeliveryAgent
    }

    /// Plain customer account
    pub fn is_user(&self) -> bool {
        self.user_type == UserType::User
    }
}

#[derive(Debug, Clone, Default)]
pub struct UserFilter {
    pub user_type: Option<UserType>,
}

/// Aggregate over a customer's orders. `total_amount` is `None` when there are no orders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct OrderSummary {
    pub total_amount: Option<Decimal>,
    pub order_count: i64,
}
