//! API request/response models for orders.

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use super::{BLANK, FieldErrors, REQUIRED, check_decimal, money, required_string};
use crate::db::models::orders::{DeliveryStatus, OrderDBResponse, OrderItem};
use crate::types::{OrderId, ProductId, UserId};

const PAYMENT_OPTION_MAX: usize = 20;
const TOTAL_DIGITS: usize = 10;
const TOTAL_PLACES: usize = 2;

// Order request models

/// One line of an order request.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct OrderItemCreate {
    #[schema(example = "pro_5f2a")]
    pub product: Option<ProductId>,
    #[schema(example = 2)]
    pub quantity: Option<i64>,
}

/// Order creation payload. Every field is optional at parse time so that
/// [`OrderCreate::validate`] can report all missing fields at once.
#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct OrderCreate {
    /// Customer placing the order; defaults to the caller. Only admins may set it.
    pub user: Option<UserId>,
    pub products: Option<Vec<OrderItemCreate>>,
    /// Optional client-side total, checked against the computed total
    #[schema(value_type = Option<String>, example = "17.00")]
    pub total_amount: Option<Decimal>,
    #[schema(example = "cash")]
    pub payment_option: Option<String>,
}

/// A validated order payload. Product existence is checked against storage separately.
#[derive(Debug, Clone, PartialEq)]
pub struct OrderInput {
    pub user: Option<UserId>,
    pub items: Vec<OrderItem>,
    pub total_amount: Option<Decimal>,
    pub payment_option: String,
}

fn trimmed(value: Option<&str>) -> Option<String> {
    value.map(str::trim).filter(|s| !s.is_empty()).map(str::to_string)
}

impl OrderItemCreate {
    fn validate(&self, index: usize, errors: &mut FieldErrors) -> Option<OrderItem> {
        let item = index + 1;
        let product = match self.product.as_deref().map(str::trim) {
            None => {
                errors.add("products", format!("Item {item}: product: {REQUIRED}"));
                None
            }
            Some("") => {
                errors.add("products", format!("Item {item}: product: {BLANK}"));
                None
            }
            Some(product) => Some(product.to_string()),
        };

        let quantity = match self.quantity {
            None => {
                errors.add("products", format!("Item {item}: quantity: {REQUIRED}"));
                None
            }
            Some(q) if q < 1 => {
                errors.add(
                    "products",
                    format!("Item {item}: quantity: Ensure this value is greater than or equal to 1."),
                );
                None
            }
            Some(q) => match i32::try_from(q) {
                Ok(q) => Some(q),
                Err(_) => {
                    errors.add(
                        "products",
                        format!("Item {item}: quantity: Ensure this value is less than or equal to {}.", i32::MAX),
                    );
                    None
                }
            },
        };

        Some(OrderItem {
            product: product?,
            quantity: quantity?,
        })
    }
}

impl OrderCreate {
    /// Check every field, collecting all failures.
    pub fn validate(&self) -> Result<OrderInput, FieldErrors> {
        let mut errors = FieldErrors::new();

        let items = match self.products.as_deref() {
            None => {
                errors.add("products", REQUIRED);
                Vec::new()
            }
            Some([]) => {
                errors.add("products", "This list may not be empty.");
                Vec::new()
            }
            Some(items) => items
                .iter()
                .enumerate()
                .filter_map(|(i, item)| item.validate(i, &mut errors))
                .collect(),
        };

        let total_amount = self
            .total_amount
            .and_then(|total| match check_decimal(total, TOTAL_DIGITS, TOTAL_PLACES) {
                Ok(total) => Some(total),
                Err(message) => {
                    errors.add("total_amount", message);
                    None
                }
            });

        let payment_option = required_string(
            &mut errors,
            "payment_option",
            self.payment_option.as_deref(),
            PAYMENT_OPTION_MAX,
        );

        match payment_option {
            Some(payment_option) if errors.is_empty() => Ok(OrderInput {
                user: trimmed(self.user.as_deref()),
                items,
                total_amount,
                payment_option,
            }),
            _ => Err(errors),
        }
    }
}

/// Check a computed order total against the precision of the stored column.
pub fn check_total(total: Decimal) -> Result<Decimal, FieldErrors> {
    check_decimal(total, TOTAL_DIGITS, TOTAL_PLACES).map_err(|message| {
        let mut errors = FieldErrors::new();
        errors.add("total_amount", message);
        errors
    })
}

/// Delivery status change and/or agent assignment.
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct OrderUpdate {
    pub delivery_status: Option<DeliveryStatus>,
    /// Blank is treated as absent
    pub delivery_agent: Option<UserId>,
}

impl OrderUpdate {
    pub fn assigned_agent(&self) -> Option<String> {
        trimmed(self.delivery_agent.as_deref())
    }
}

#[derive(Debug, Clone, Default, Deserialize, ToSchema)]
pub struct VerifyOtpRequest {
    #[serde(default)]
    pub otp: String,
}

// Order response models

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemPayload {
    pub product: ProductId,
    pub quantity: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderResponse {
    pub id: OrderId,
    pub user: UserId,
    pub products: Vec<OrderItemPayload>,
    pub order_date: DateTime<Utc>,
    #[schema(value_type = String, example = "17.00")]
    pub total_amount: Decimal,
    pub payment_option: String,
    pub delivery_status: DeliveryStatus,
    pub delivery_agent: Option<UserId>,
}

impl From<OrderDBResponse> for OrderResponse {
    fn from(db: OrderDBResponse) -> Self {
        Self {
            id: db.id,
            user: db.user_id,
            products: db
                .items
                .into_iter()
                .map(|item| OrderItemPayload {
                    product: item.product,
                    quantity: item.quantity,
                })
                .collect(),
            order_date: db.order_date,
            total_amount: money(db.total_amount),
            payment_option: db.payment_option,
            delivery_status: db.delivery_status,
            delivery_agent: db.delivery_agent_id,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderCreatedResponse {
    #[serde(flatten)]
    pub order: OrderResponse,
    pub order_id: OrderId,
}

impl From<OrderDBResponse> for OrderCreatedResponse {
    fn from(db: OrderDBResponse) -> Self {
        let order = OrderResponse::from(db);
        Self {
            order_id: order.id.clone(),
            order,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct MessageResponse {
    pub message: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn order(body: serde_json::Value) -> OrderCreate {
        serde_json::from_value(body).unwrap()
    }

    #[test]
    fn valid_order() {
        let input = order(json!({
            "user": "  ",
            "products": [{ "product": "pro1", "quantity": 2 }, { "product": " pro2 ", "quantity": 1 }],
            "total_amount": "17.00",
            "payment_option": "cash",
        }))
        .validate()
        .unwrap();
        assert_eq!(input.user, None);
        assert_eq!(
            input.items,
            vec![
                OrderItem {
                    product: "pro1".to_string(),
                    quantity: 2
                },
                OrderItem {
                    product: "pro2".to_string(),
                    quantity: 1
                },
            ]
        );
        assert_eq!(input.total_amount, Some(Decimal::new(1700, 2)));
        assert_eq!(input.payment_option, "cash");
    }

    #[test]
    fn order_requires_items_and_payment_option() {
        let errors = order(json!({ "products": [] })).validate().unwrap_err();
        assert_eq!(
            errors.to_value(),
            json!({
                "products": ["This list may not be empty."],
                "payment_option": ["This field is required."],
            })
        );
        let errors = OrderCreate::default().validate().unwrap_err();
        assert_eq!(
            errors.to_value(),
            json!({
                "products": ["This field is required."],
                "payment_option": ["This field is required."],
            })
        );
    }

    #[test]
    fn item_errors_name_the_item() {
        let errors = order(json!({
            "products": [
                { "product": "pro1", "quantity": 0 },
                { "quantity": 1 },
                { "product": "pro3", "quantity": 3_000_000_000_i64 },
            ],
            "total_amount": "1.005",
            "payment_option": "upi-with-a-very-long-name",
        }))
        .validate()
        .unwrap_err();
        assert_eq!(
            errors.to_value(),
            json!({
                "products": [
                    "Item 1: quantity: Ensure this value is greater than or equal to 1.",
                    "Item 2: product: This field is required.",
                    "Item 3: quantity: Ensure this value is less than or equal to 2147483647.",
                ],
                "total_amount": ["Ensure that there are no more than 2 decimal places."],
                "payment_option": ["Ensure this field has no more than 20 characters."],
            })
        );
    }

    #[test]
    fn mistyped_fields_fail_to_parse() {
        for body in [
            json!({ "products": [{ "product": "pro1", "quantity": "1" }] }),
            json!({ "products": [{ "product": "pro1", "quantity": 1.5 }] }),
            json!({ "products": "pro1" }),
            json!({ "payment_option": 3 }),
        ] {
            assert!(serde_json::from_value::<OrderCreate>(body).is_err());
        }
    }

    #[test]
    fn computed_total_must_fit_the_column() {
        assert_eq!(check_total(Decimal::new(9_999_999_999, 2)).unwrap(), Decimal::new(9_999_999_999, 2));
        let errors = check_total(Decimal::new(9_999_999_999_000, 2)).unwrap_err();
        assert_eq!(
            errors.to_value(),
            json!({ "total_amount": ["Ensure that there are no more than 10 digits in total."] })
        );
    }

    #[test]
    fn update_accepts_known_statuses_only() {
        let update: OrderUpdate = serde_json::from_value(json!({ "delivery_status": "canceled" })).unwrap();
        assert_eq!(update.delivery_status, Some(DeliveryStatus::Canceled));
        assert!(update.assigned_agent().is_none());

        assert!(serde_json::from_value::<OrderUpdate>(json!({ "delivery_status": "shipped" })).is_err());

        let update: OrderUpdate = serde_json::from_value(json!({ "delivery_agent": " usr1 " })).unwrap();
        assert_eq!(update.assigned_agent().as_deref(), Some("usr1"));
        let update: OrderUpdate = serde_json::from_value(json!({ "delivery_agent": "" })).unwrap();
        assert!(update.assigned_agent().is_none());
    }

    #[test]
    fn created_response_repeats_the_id() {
        let response = OrderCreatedResponse::from(OrderDBResponse {
            id: "ord1".to_string(),
            user_id: "usr1".to_string(),
            items: vec![OrderItem {
                product: "pro1".to_string(),
                quantity: 3,
            }],
            order_date: Utc::now(),
            total_amount: Decimal::from(9),
            delivery_status: DeliveryStatus::Pending,
            otp: "AbC123xY".to_string(),
            payment_option: "cash".to_string(),
            delivery_agent_id: None,
        });
        let json = serde_json::to_value(&response).unwrap();
        assert_eq!(json["id"], "ord1");
        assert_eq!(json["order_id"], "ord1");
        assert_eq!(json["total_amount"], "9.00");
        assert_eq!(json["products"], json!([{ "product": "pro1", "quantity": 3 }]));
        assert!(json.get("otp").is_none());
    }
}
