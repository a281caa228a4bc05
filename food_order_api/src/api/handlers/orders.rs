use std::collections::HashMap;

use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
};
use chrono::Utc;
use rust_decimal::Decimal;

use crate::{
    AppState,
    api::{
        JsonBody,
        models::{
            FieldErrors,
            orders::{
                MessageResponse, OrderCreate, OrderCreatedResponse, OrderResponse, OrderUpdate, VerifyOtpRequest,
                check_total,
            },
            users::CurrentUser,
        },
    },
    auth::{
        password,
        permissions::{AdminOrCustomer, Authenticated, DeliveryAgent, RequiresPermission},
    },
    db::models::{
        orders::{DeliveryStatus, OrderCreateDBRequest, OrderDBResponse, OrderFilter, OrderUpdateDBRequest},
        users::{UserDBResponse, UserType},
    },
    errors::{Error, Result},
    notifications,
    types::{OrderId, abbrev},
};

const OTP_LENGTH: usize = 8;

async fn load_order(state: &AppState, id: &str) -> Result<OrderDBResponse> {
    state.storage.get_order(id).await?.ok_or_else(|| Error::not_found("Order", id))
}

/// Customers may only see and change their own orders.
fn ensure_visible(caller: &CurrentUser, order: &OrderDBResponse) -> Result<()> {
    if caller.is_user() && caller.id != order.user_id {
        return Err(Error::InsufficientPermissions {
            required: "owner".to_string(),
            resource: format!("/api/orders/{}/", order.id),
        });
    }
    Ok(())
}

fn does_not_exist(id: &str) -> String {
    format!("Invalid pk \"{id}\" - object does not exist.")
}

/// List orders
#[utoipa::path(
    get,
    path = "/api/orders/",
    tag = "orders",
    summary = "List orders",
    responses(
        (status = 200, description = "Orders, newest first. Customers only see their own.", body = Vec<OrderResponse>),
        (status = 403, description = "Delivery agents cannot list orders"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn list_orders(
    State(state): State<AppState>,
    caller: RequiresPermission<AdminOrCustomer>,
) -> Result<Json<Vec<OrderResponse>>> {
    let filter = OrderFilter {
        user_id: caller.is_user().then(|| caller.id.clone()),
    };
    let orders = state.storage.list_orders(&filter).await?;
    Ok(Json(orders.into_iter().map(Into::into).collect()))
}

/// Place an order
#[utoipa::path(
    post,
    path = "/api/orders/",
    tag = "orders",
    summary = "Place an order",
    request_body = OrderCreate,
    responses(
        (status = 201, description = "Order placed; a confirmation email with the OTP is queued", body = OrderCreatedResponse),
        (status = 400, description = "Invalid order data or mismatched total"),
        (status = 403, description = "Customers cannot order on behalf of others"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(caller = abbrev(&caller.id)))]
pub async fn create_order(
    State(state): State<AppState>,
    caller: RequiresPermission<AdminOrCustomer>,
    JsonBody(body): JsonBody<Option<OrderCreate>>,
) -> Result<(StatusCode, Json<OrderCreatedResponse>)> {
    let input = body.unwrap_or_default().validate()?;

    let customer_id = match input.user {
        Some(user_id) if user_id != caller.id => {
            if !caller.is_admin() {
                return Err(Error::InsufficientPermissions {
                    required: "admin".to_string(),
                    resource: "/api/orders/".to_string(),
                });
            }
            user_id
        }
        _ => caller.id.clone(),
    };

    let mut errors = FieldErrors::new();
    let customer = state.storage.get_user(&customer_id).await?;
    if customer.is_none() {
        errors.add("user", does_not_exist(&customer_id));
    }

    let ids: Vec<_> = input.items.iter().map(|item| item.product.clone()).collect();
    let prices: HashMap<_, _> = state
        .storage
        .get_products(&ids)
        .await?
        .into_iter()
        .map(|product| (product.id, product.price))
        .collect();

    let mut total = Decimal::ZERO;
    for item in &input.items {
        match prices.get(&item.product) {
            Some(price) => total += *price * Decimal::from(item.quantity),
            None => errors.add("products", does_not_exist(&item.product)),
        }
    }
    errors.into_result()?;
    let total = check_total(total)?;
    let Some(customer) = customer else {
        return Err(Error::not_found("User", customer_id));
    };

    if let Some(supplied) = input.total_amount
        && supplied != total
    {
        return Err(Error::bad_request(format!(
            "Total amount {supplied} does not match the order total {}.",
            crate::api::models::money(total)
        )));
    }

    let order = state
        .storage
        .create_order(&OrderCreateDBRequest {
            user_id: customer.id.clone(),
            items: input.items,
            total_amount: total,
            payment_option: input.payment_option,
            otp: password::random_alphanumeric(OTP_LENGTH),
        })
        .await?;
    tracing::info!(order_id = abbrev(&order.id), total = %order.total_amount, "Order placed");

    if let Err(e) = state.tasks.delay(notifications::order_confirmation(&customer, &order)).await {
        tracing::error!(error = %e, "Failed to queue order confirmation email");
    }

    Ok((StatusCode::CREATED, Json(order.into())))
}

/// Retrieve an order
#[utoipa::path(
    get,
    path = "/api/orders/{id}/",
    tag = "orders",
    summary = "Get order",
    params(("id" = String, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Order detail", body = OrderResponse),
        (status = 403, description = "Customers may only read their own orders"),
        (status = 404, description = "Order not found"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn get_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    caller: RequiresPermission<Authenticated>,
) -> Result<Json<OrderResponse>> {
    let order = load_order(&state, &id).await?;
    ensure_visible(&caller, &order)?;
    Ok(Json(order.into()))
}

/// Work out the status change a PATCH asks for, enforcing who may do what.
fn plan_update(
    caller: &CurrentUser,
    order: &OrderDBResponse,
    update: &OrderUpdate,
    agent: Option<&UserDBResponse>,
    cancellation_window: std::time::Duration,
) -> Result<OrderUpdateDBRequest> {
    let current = order.delivery_status;
    let mut next = update.delivery_status.unwrap_or(current);

    if next == DeliveryStatus::Canceled && current != DeliveryStatus::Canceled {
        if caller.is_delivery_agent() {
            return Err(Error::bad_request("You are not permitted to cancel the order."));
        }
        if caller.is_user() {
            let elapsed = (Utc::now() - order.order_date).to_std().unwrap_or_default();
            if elapsed > cancellation_window {
                return Err(Error::bad_request(format!(
                    "Orders can only be canceled within {} minutes of being placed.",
                    cancellation_window.as_secs() / 60
                )));
            }
            if order.delivery_agent_id.is_some() {
                return Err(Error::bad_request(
                    "Orders cannot be canceled once a delivery agent has been assigned.",
                ));
            }
        }
    }

    let mut delivery_agent_id = None;
    if let Some(agent) = agent {
        if current.is_terminal() {
            return Err(Error::bad_request(format!(
                "Cannot assign a delivery agent to a {current} order."
            )));
        }
        if current == DeliveryStatus::Pending && update.delivery_status.is_none() {
            next = DeliveryStatus::Assigned;
        }
        delivery_agent_id = Some(agent.id.clone());
    }

    if next == DeliveryStatus::Assigned
        && current != DeliveryStatus::Assigned
        && delivery_agent_id.is_none()
        && order.delivery_agent_id.is_none()
    {
        return Err(Error::bad_request("A delivery agent must be assigned to the order."));
    }

    if next == DeliveryStatus::Delivered
        && current != DeliveryStatus::Delivered
        && !(caller.is_delivery_agent() && order.delivery_agent_id.as_deref() == Some(caller.id.as_str()))
    {
        return Err(Error::bad_request(
            "Only the assigned delivery agent can mark the order as delivered.",
        ));
    }

    if !current.can_transition_to(next) {
        return Err(Error::bad_request(format!(
            "Cannot change delivery status from {current} to {next}."
        )));
    }

    Ok(OrderUpdateDBRequest {
        delivery_status: (next != current).then_some(next),
        delivery_agent_id,
    })
}

/// Change delivery status or assign a delivery agent
#[utoipa::path(
    patch,
    path = "/api/orders/{id}/",
    tag = "orders",
    summary = "Update order",
    params(("id" = String, Path, description = "Order ID")),
    request_body = OrderUpdate,
    responses(
        (status = 200, description = "Updated order", body = OrderResponse),
        (status = 400, description = "Transition not allowed for this caller"),
        (status = 403, description = "Not the caller's order, or agent assignment by a non-admin"),
        (status = 404, description = "Order not found"),
        (status = 409, description = "The order was changed concurrently"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn update_order(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    caller: RequiresPermission<Authenticated>,
    JsonBody(body): JsonBody<Option<OrderUpdate>>,
) -> Result<Json<OrderResponse>> {
    let order = load_order(&state, &id).await?;
    ensure_visible(&caller, &order)?;

    let update = body.unwrap_or_default();
    let agent = match update.assigned_agent() {
        None => None,
        Some(agent_id) => {
            if !caller.is_admin() {
                return Err(Error::InsufficientPermissions {
                    required: "admin".to_string(),
                    resource: format!("/api/orders/{id}/"),
                });
            }
            match state.storage.get_user(&agent_id).await? {
                Some(agent) if agent.user_type == UserType::DeliveryAgent => Some(agent),
                _ => return Err(Error::bad_request("User agent does not exist")),
            }
        }
    };

    let request = plan_update(&caller, &order, &update, agent.as_ref(), state.config.orders.cancellation_window)?;
    if request.delivery_status.is_none() && request.delivery_agent_id.is_none() {
        return Ok(Json(order.into()));
    }

    let updated = state
        .storage
        .update_order(&order.id, order.delivery_status, &request)
        .await?
        .ok_or_else(|| Error::Conflict {
            message: "The order was modified by another request. Please retry.".to_string(),
        })?;
    tracing::info!(
        order_id = abbrev(&updated.id),
        from = %order.delivery_status,
        to = %updated.delivery_status,
        "Order updated"
    );

    if order.delivery_status != DeliveryStatus::Canceled && updated.delivery_status == DeliveryStatus::Canceled {
        queue_cancellation(&state, &updated).await;
    }

    Ok(Json(updated.into()))
}

async fn queue_cancellation(state: &AppState, order: &OrderDBResponse) {
    let customer = match state.storage.get_user(&order.user_id).await {
        Ok(Some(customer)) => customer,
        Ok(None) => return,
        Err(e) => {
            tracing::error!(error = %e, "Failed to load customer for cancellation email");
            return;
        }
    };
    let agent = match &order.delivery_agent_id {
        Some(agent_id) => state.storage.get_user(agent_id).await.ok().flatten(),
        None => None,
    };
    if let Err(e) = state
        .tasks
        .delay(notifications::order_cancellation(&customer, agent.as_ref(), order))
        .await
    {
        tracing::error!(error = %e, "Failed to queue order cancellation email");
    }
}

/// Verify the delivery OTP for an order
#[utoipa::path(
    post,
    path = "/api/orders/{id}/verify-otp/",
    tag = "orders",
    summary = "Verify delivery OTP",
    params(("id" = String, Path, description = "Order ID")),
    request_body = VerifyOtpRequest,
    responses(
        (status = 200, description = "OTP matches", body = MessageResponse),
        (status = 400, description = "Invalid OTP"),
        (status = 403, description = "Delivery agents only"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(order_id = %id))]
pub async fn verify_otp(
    State(state): State<AppState>,
    Path(id): Path<OrderId>,
    _: RequiresPermission<DeliveryAgent>,
    JsonBody(request): JsonBody<Option<VerifyOtpRequest>>,
) -> Result<Json<MessageResponse>> {
    let otp = request.unwrap_or_default().otp;
    match state.storage.get_order(&id).await? {
        Some(order) if !otp.is_empty() && order.otp == otp => Ok(Json(MessageResponse {
            message: "OTP verification successful".to_string(),
        })),
        _ => Err(Error::bad_request("Invalid OTP")),
    }
}
