//! Storage models for orders and their items.

use crate::types::{OrderId, ProductId, UserId};
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::{fmt, str::FromStr};
use utoipa::ToSchema;

/// Delivery lifecycle of an order.
///
/// ```text
/// pending ──▶ assigned ──▶ delivered
///    │           │
///    └───────────┴──▶ canceled
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "lowercase")]
pub enum DeliveryStatus {
    #[default]
    Pending,
    Assigned,
    Delivered,
    Canceled,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeliveryStatus::Pending => "pending",
            DeliveryStatus::Assigned => "assigned",
            DeliveryStatus::Delivered => "delivered",
            DeliveryStatus::Canceled => "canceled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, DeliveryStatus::Delivered | DeliveryStatus::Canceled)
    }

    /// Whether moving from `self` to `next` is allowed. Staying put is always allowed.
    pub fn can_transition_to(&self, next: DeliveryStatus) -> bool {
        use DeliveryStatus::*;
        *self == next
            || matches!(
                (self, next),
                (Pending, Assigned) | (Pending, Canceled) | (Assigned, Delivered) | (Assigned, Canceled)
            )
    }
}

impl fmt::Display for DeliveryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeliveryStatus {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(DeliveryStatus::Pending),
            "assigned" => Ok(DeliveryStatus::Assigned),
            "delivered" => Ok(DeliveryStatus::Delivered),
            "canceled" => Ok(DeliveryStatus::Canceled),
            other => Err(anyhow::anyhow!("unknown delivery status: {other}")),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    pub product: ProductId,
    pub quantity: i32,
}

#[derive(Debug, Clone)]
pub struct OrderCreateDBRequest {
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub total_amount: Decimal,
    pub payment_option: String,
    pub otp: String,
}

#[derive(Debug, Clone, Default)]
pub struct OrderUpdateDBRequest {
    pub delivery_status: Option<DeliveryStatus>,
    pub delivery_agent_id: Option<UserId>,
}

#[derive(Debug, Clone)]
pub struct OrderDBResponse {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<OrderItem>,
    pub order_date: DateTime<Utc>,
    pub total_amount: Decimal,
    pub delivery_status: DeliveryStatus,
    pub otp: String,
    pub payment_option: String,
    pub delivery_agent_id: Option<UserId>,
}

#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    pub user_id: Option<UserId>,
}
