//! PostgreSQL storage implementation.
//!
//! Queries are checked at runtime so the crate builds without a live database. Task claims
//! use `FOR UPDATE SKIP LOCKED`, so any number of worker processes can share the queue.

use std::collections::HashMap;

use anyhow::anyhow;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{FromRow, PgPool, types::Json};
use tracing::instrument;

use crate::db::errors::{DbError, Result};
use crate::db::models::{
    orders::{DeliveryStatus, OrderCreateDBRequest, OrderDBResponse, OrderFilter, OrderItem, OrderUpdateDBRequest},
    products::{ProductCreateDBRequest, ProductDBResponse, ProductUpdateDBRequest},
    tasks::{TaskCreateDBRequest, TaskDBResponse, TaskOutcome, TaskProgress, TaskState},
    users::{OrderSummary, UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest},
};
use crate::types::{ProductId, TaskId, UserId, abbrev, generate_id, prefix};

use super::Storage;

const USER_COLUMNS: &str = "id, username, email, phone, user_type, password_hash, is_active, date_joined";
const PRODUCT_COLUMNS: &str = "id, name, description, price, image, created_at, modified";
const ORDER_COLUMNS: &str =
    "id, user_id, order_date, total_amount, delivery_status, otp, payment_option, delivery_agent_id";
const TASK_COLUMNS: &str =
    "id, name, payload, state, progress, result, error, worker_id, created_at, started_at, finished_at";

#[derive(FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    phone: Option<String>,
    user_type: String,
    password_hash: String,
    is_active: bool,
    date_joined: DateTime<Utc>,
}

impl TryFrom<UserRow> for UserDBResponse {
    type Error = DbError;

    fn try_from(row: UserRow) -> Result<Self> {
        Ok(Self {
            user_type: row.user_type.parse()?,
            id: row.id,
            username: row.username,
            email: row.email,
            phone: row.phone,
            password_hash: row.password_hash,
            is_active: row.is_active,
            date_joined: row.date_joined,
        })
    }
}

#[derive(FromRow)]
struct ProductRow {
    id: String,
    name: String,
    description: String,
    price: Decimal,
    image: Option<String>,
    created_at: DateTime<Utc>,
    modified: DateTime<Utc>,
}

impl From<ProductRow> for ProductDBResponse {
    fn from(row: ProductRow) -> Self {
        Self {
            id: row.id,
            name: row.name,
            description: row.description,
            price: row.price,
            image: row.image,
            created_at: row.created_at,
            modified: row.modified,
        }
    }
}

#[derive(FromRow)]
struct OrderRow {
    id: String,
    user_id: String,
    order_date: DateTime<Utc>,
    total_amount: Decimal,
    delivery_status: String,
    otp: String,
    payment_option: String,
    delivery_agent_id: Option<String>,
}

impl OrderRow {
    fn into_response(self, items: Vec<OrderItem>) -> Result<OrderDBResponse> {
        Ok(OrderDBResponse {
            delivery_status: self.delivery_status.parse()?,
            id: self.id,
            user_id: self.user_id,
            items,
            order_date: self.order_date,
            total_amount: self.total_amount,
            otp: self.otp,
            payment_option: self.payment_option,
            delivery_agent_id: self.delivery_agent_id,
        })
    }
}

#[derive(FromRow)]
struct OrderItemRow {
    order_id: String,
    product_id: String,
    quantity: i32,
}

#[derive(FromRow)]
struct TaskRow {
    id: TaskId,
    name: String,
    payload: serde_json::Value,
    state: String,
    progress: Option<Json<TaskProgress>>,
    result: Option<serde_json::Value>,
    error: Option<String>,
    worker_id: Option<String>,
    created_at: DateTime<Utc>,
    started_at: Option<DateTime<Utc>>,
    finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<TaskRow> for TaskDBResponse {
    type Error = DbError;

    fn try_from(row: TaskRow) -> Result<Self> {
        Ok(Self {
            state: row.state.parse()?,
            id: row.id,
            name: row.name,
            payload: row.payload,
            progress: row.progress.map(|p| p.0),
            result: row.result,
            error: row.error,
            worker_id: row.worker_id,
            created_at: row.created_at,
            started_at: row.started_at,
            finished_at: row.finished_at,
        })
    }
}

#[derive(FromRow)]
struct SummaryRow {
    user_id: String,
    total_amount: Option<Decimal>,
    order_count: i64,
}

#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
}

impl PostgresStorage {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    async fn items_for(&self, order_ids: &[String]) -> Result<HashMap<String, Vec<OrderItem>>> {
        let rows: Vec<OrderItemRow> = sqlx::query_as(
            "SELECT order_id, product_id, quantity FROM order_items WHERE order_id = ANY($1) ORDER BY id",
        )
        .bind(order_ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<String, Vec<OrderItem>> = HashMap::new();
        for row in rows {
            items.entry(row.order_id).or_default().push(OrderItem {
                product: row.product_id,
                quantity: row.quantity,
            });
        }
        Ok(items)
    }

    async fn with_items(&self, rows: Vec<OrderRow>) -> Result<Vec<OrderDBResponse>> {
        let ids: Vec<String> = rows.iter().map(|r| r.id.clone()).collect();
        let mut items = self.items_for(&ids).await?;
        rows.into_iter()
            .map(|row| {
                let order_items = items.remove(&row.id).unwrap_or_default();
                row.into_response(order_items)
            })
            .collect()
    }
}

#[async_trait]
impl Storage for PostgresStorage {
    #[instrument(skip(self, request), fields(username = %request.username), err)]
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let row: UserRow = sqlx::query_as(&format!(
            "INSERT INTO users (id, username, email, phone, user_type, password_hash)
             VALUES ($1, $2, $3, $4, $5, $6)
             RETURNING {USER_COLUMNS}"
        ))
        .bind(generate_id(prefix::USER))
        .bind(&request.username)
        .bind(&request.email)
        .bind(&request.phone)
        .bind(request.user_type.as_str())
        .bind(&request.password_hash)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    #[instrument(skip(self), fields(user_id = %abbrev(id)), err)]
    async fn get_user(&self, id: &str) -> Result<Option<UserDBResponse>> {
        let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self), err)]
    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserDBResponse>> {
        let row: Option<UserRow> = sqlx::query_as(&format!("SELECT {USER_COLUMNS} FROM users WHERE username = $1"))
            .bind(username)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self), err)]
    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserDBResponse>> {
        let rows: Vec<UserRow> = sqlx::query_as(&format!(
            "SELECT {USER_COLUMNS} FROM users
             WHERE ($1::varchar IS NULL OR user_type = $1)
             ORDER BY date_joined, id"
        ))
        .bind(filter.user_type.map(|t| t.as_str()))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(TryInto::try_into).collect()
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev(id)), err)]
    async fn update_user(&self, id: &str, request: &UserUpdateDBRequest) -> Result<UserDBResponse> {
        let row: Option<UserRow> = sqlx::query_as(&format!(
            "UPDATE users SET
                username = COALESCE($2, username),
                email = COALESCE($3, email),
                phone = CASE WHEN $4 THEN $5 ELSE phone END,
                user_type = COALESCE($6, user_type),
                password_hash = COALESCE($7, password_hash),
                is_active = COALESCE($8, is_active)
             WHERE id = $1
             RETURNING {USER_COLUMNS}"
        ))
        .bind(id)
        .bind(&request.username)
        .bind(&request.email)
        .bind(request.phone.is_some())
        .bind(request.phone.clone().flatten())
        .bind(request.user_type.map(|t| t.as_str()))
        .bind(&request.password_hash)
        .bind(request.is_active)
        .fetch_optional(&self.pool)
        .await?;

        row.ok_or(DbError::NotFound)?.try_into()
    }

    #[instrument(skip(self, user_ids), fields(count = user_ids.len()), err)]
    async fn order_summaries(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, OrderSummary>> {
        let rows: Vec<SummaryRow> = sqlx::query_as(
            "SELECT user_id, SUM(total_amount) AS total_amount, COUNT(*) AS order_count
             FROM orders WHERE user_id = ANY($1) GROUP BY user_id",
        )
        .bind(user_ids)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|row| {
                (
                    row.user_id,
                    OrderSummary {
                        total_amount: row.total_amount,
                        order_count: row.order_count,
                    },
                )
            })
            .collect())
    }

    #[instrument(skip(self, requests), fields(count = requests.len()), err)]
    async fn create_products(&self, requests: &[ProductCreateDBRequest]) -> Result<Vec<ProductDBResponse>> {
        let mut tx = self.pool.begin().await?;
        let mut created = Vec::with_capacity(requests.len());
        for request in requests {
            let row: ProductRow = sqlx::query_as(&format!(
                "INSERT INTO products (id, name, description, price, image)
                 VALUES ($1, $2, $3, $4, $5)
                 RETURNING {PRODUCT_COLUMNS}"
            ))
            .bind(generate_id(prefix::PRODUCT))
            .bind(&request.name)
            .bind(&request.description)
            .bind(request.price)
            .bind(&request.image)
            .fetch_one(&mut *tx)
            .await?;
            created.push(row.into());
        }
        tx.commit().await?;
        Ok(created)
    }

    #[instrument(skip(self), err)]
    async fn get_product(&self, id: &str) -> Result<Option<ProductDBResponse>> {
        let row: Option<ProductRow> = sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(row.map(Into::into))
    }

    #[instrument(skip(self, ids), fields(count = ids.len()), err)]
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<ProductDBResponse>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)"))
            .bind(ids)
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self), err)]
    async fn list_products(&self) -> Result<Vec<ProductDBResponse>> {
        let rows: Vec<ProductRow> = sqlx::query_as(&format!("SELECT {PRODUCT_COLUMNS} FROM products ORDER BY created_at, id"))
            .fetch_all(&self.pool)
            .await?;

        Ok(rows.into_iter().map(Into::into).collect())
    }

    #[instrument(skip(self, request), err)]
    async fn update_product(&self, id: &str, request: &ProductUpdateDBRequest) -> Result<ProductDBResponse> {
        let row: Option<ProductRow> = sqlx::query_as(&format!(
            "UPDATE products SET
                name = COALESCE($2, name),
                description = COALESCE($3, description),
                price = COALESCE($4, price),
                image = CASE WHEN $5 THEN $6 ELSE image END,
                modified = NOW()
             WHERE id = $1
             RETURNING {PRODUCT_COLUMNS}"
        ))
        .bind(id)
        .bind(&request.name)
        .bind(&request.description)
        .bind(request.price)
        .bind(request.image.is_some())
        .bind(request.image.clone().flatten())
        .fetch_optional(&self.pool)
        .await?;

        Ok(row.ok_or(DbError::NotFound)?.into())
    }

    #[instrument(skip(self), err)]
    async fn delete_product(&self, id: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM products WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected() > 0)
    }

    #[instrument(skip(self, request), fields(user_id = %abbrev(&request.user_id), items = request.items.len()), err)]
    async fn create_order(&self, request: &OrderCreateDBRequest) -> Result<OrderDBResponse> {
        let mut tx = self.pool.begin().await?;

        let row: OrderRow = sqlx::query_as(&format!(
            "INSERT INTO orders (id, user_id, total_amount, otp, payment_option)
             VALUES ($1, $2, $3, $4, $5)
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(generate_id(prefix::ORDER))
        .bind(&request.user_id)
        .bind(request.total_amount)
        .bind(&request.otp)
        .bind(&request.payment_option)
        .fetch_one(&mut *tx)
        .await?;

        let products: Vec<String> = request.items.iter().map(|i| i.product.clone()).collect();
        let quantities: Vec<i32> = request.items.iter().map(|i| i.quantity).collect();
        sqlx::query(
            "INSERT INTO order_items (order_id, product_id, quantity)
             SELECT $1, product_id, quantity FROM UNNEST($2::varchar[], $3::int4[]) AS t(product_id, quantity)",
        )
        .bind(&row.id)
        .bind(&products)
        .bind(&quantities)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        row.into_response(request.items.clone())
    }

    #[instrument(skip(self), err)]
    async fn get_order(&self, id: &str) -> Result<Option<OrderDBResponse>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }

    #[instrument(skip(self), err)]
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderDBResponse>> {
        let rows: Vec<OrderRow> = sqlx::query_as(&format!(
            "SELECT {ORDER_COLUMNS} FROM orders
             WHERE ($1::varchar IS NULL OR user_id = $1)
             ORDER BY order_date DESC, id"
        ))
        .bind(&filter.user_id)
        .fetch_all(&self.pool)
        .await?;

        self.with_items(rows).await
    }

    #[instrument(skip(self, request), err)]
    async fn update_order(
        &self,
        id: &str,
        expected: DeliveryStatus,
        request: &OrderUpdateDBRequest,
    ) -> Result<Option<OrderDBResponse>> {
        let row: Option<OrderRow> = sqlx::query_as(&format!(
            "UPDATE orders SET
                delivery_status = COALESCE($3, delivery_status),
                delivery_agent_id = COALESCE($4, delivery_agent_id)
             WHERE id = $1 AND delivery_status = $2
             RETURNING {ORDER_COLUMNS}"
        ))
        .bind(id)
        .bind(expected.as_str())
        .bind(request.delivery_status.map(|s| s.as_str()))
        .bind(&request.delivery_agent_id)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => Ok(self.with_items(vec![row]).await?.pop()),
            None => {
                let exists: bool = sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE id = $1)")
                    .bind(id)
                    .fetch_one(&self.pool)
                    .await?;
                if exists { Ok(None) } else { Err(DbError::NotFound) }
            }
        }
    }

    #[instrument(skip(self), err)]
    async fn has_pending_orders(&self, user_id: &str) -> Result<bool> {
        let pending: bool =
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM orders WHERE user_id = $1 AND delivery_status = 'pending')")
                .bind(user_id)
                .fetch_one(&self.pool)
                .await?;

        Ok(pending)
    }

    #[instrument(skip(self, request), fields(task_id = %request.id, name = %request.name), err)]
    async fn create_task(&self, request: &TaskCreateDBRequest) -> Result<TaskDBResponse> {
        let row: TaskRow = sqlx::query_as(&format!(
            "INSERT INTO tasks (id, name, payload) VALUES ($1, $2, $3) RETURNING {TASK_COLUMNS}"
        ))
        .bind(request.id)
        .bind(&request.name)
        .bind(&request.payload)
        .fetch_one(&self.pool)
        .await?;

        row.try_into()
    }

    #[instrument(skip(self), err)]
    async fn get_task(&self, id: TaskId) -> Result<Option<TaskDBResponse>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = $1"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self), err)]
    async fn claim_task(&self, worker_id: &str) -> Result<Option<TaskDBResponse>> {
        let row: Option<TaskRow> = sqlx::query_as(&format!(
            "UPDATE tasks
             SET state = 'STARTED', worker_id = $1, started_at = NOW()
             WHERE id = (
                 SELECT id FROM tasks
                 WHERE state = 'PENDING'
                 ORDER BY created_at ASC
                 LIMIT 1
                 FOR UPDATE SKIP LOCKED
             )
             RETURNING {TASK_COLUMNS}"
        ))
        .bind(worker_id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(TryInto::try_into).transpose()
    }

    #[instrument(skip(self, progress), fields(percent = progress.percent), err)]
    async fn set_task_progress(&self, id: TaskId, progress: &TaskProgress) -> Result<()> {
        let result = sqlx::query("UPDATE tasks SET state = 'PROGRESS', progress = $2 WHERE id = $1")
            .bind(id)
            .bind(Json(progress))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound);
        }
        Ok(())
    }

    #[instrument(skip(self, outcome), err)]
    async fn finish_task(&self, id: TaskId, outcome: &TaskOutcome) -> Result<()> {
        let (state, result, error) = match outcome {
            TaskOutcome::Success(value) => (TaskState::Success, Some(value), None),
            TaskOutcome::Failure(message) => (TaskState::Failure, None, Some(message.as_str())),
        };
        let updated = sqlx::query(
            "UPDATE tasks SET state = $2, result = $3, error = $4, finished_at = NOW() WHERE id = $1",
        )
        .bind(id)
        .bind(state.as_str())
        .bind(result)
        .bind(error)
        .execute(&self.pool)
        .await?;

        if updated.rows_affected() == 0 {
            return Err(DbError::Other(anyhow!("task {id} vanished before it could be finished")));
        }
        Ok(())
    }
}
