use std::collections::HashMap;

use async_trait::async_trait;

use crate::db::errors::Result;
use crate::db::models::{
    orders::{DeliveryStatus, OrderCreateDBRequest, OrderDBResponse, OrderFilter, OrderUpdateDBRequest},
    products::{ProductCreateDBRequest, ProductDBResponse, ProductUpdateDBRequest},
    tasks::{TaskCreateDBRequest, TaskDBResponse, TaskOutcome, TaskProgress},
    users::{OrderSummary, UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest},
};
use crate::types::{ProductId, TaskId, UserId};

pub mod in_memory;
pub mod postgres;


/// Storage trait for users, products, orders and the task queue.
///
/// Implementations mint entity ids on insert and enforce the same uniqueness and
/// reference rules, so the API layer can treat both backends alike.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Insert a user.
    ///
    /// # Errors
    /// - `UniqueViolation` if the username or email is taken
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse>;

    async fn get_user(&self, id: &str) -> Result<Option<UserDBResponse>>;

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserDBResponse>>;

    /// List users in join order.
    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserDBResponse>>;

    /// # Errors
    /// - `NotFound` if the user does not exist
    /// - `UniqueViolation` if a new username or email is taken
    async fn update_user(&self, id: &str, request: &UserUpdateDBRequest) -> Result<UserDBResponse>;

    /// Order totals and counts per customer. Users without orders are absent from the map.
    async fn order_summaries(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, OrderSummary>>;

    /// Insert several products atomically: either all are created or none is.
    async fn create_products(&self, requests: &[ProductCreateDBRequest]) -> Result<Vec<ProductDBResponse>>;

    async fn get_product(&self, id: &str) -> Result<Option<ProductDBResponse>>;

    /// Fetch the products that exist among `ids`.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<ProductDBResponse>>;

    async fn list_products(&self) -> Result<Vec<ProductDBResponse>>;

    /// # Errors
    /// - `NotFound` if the product does not exist
    async fn update_product(&self, id: &str, request: &ProductUpdateDBRequest) -> Result<ProductDBResponse>;

    /// Delete a product and every order item referencing it. Returns false if it did not exist.
    async fn delete_product(&self, id: &str) -> Result<bool>;

    /// Insert an order and its items in one transaction.
    ///
    /// # Errors
    /// - `ForeignKeyViolation` if the customer or a product does not exist
    async fn create_order(&self, request: &OrderCreateDBRequest) -> Result<OrderDBResponse>;

    async fn get_order(&self, id: &str) -> Result<Option<OrderDBResponse>>;

    /// List orders, newest first.
    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderDBResponse>>;

    /// Apply `request` only if the order is still in `expected` status.
    ///
    /// Returns `None` when the status changed underneath the caller.
    ///
    /// # Errors
    /// - `NotFound` if the order does not exist
    /// - `ForeignKeyViolation` if the delivery agent does not exist
    async fn update_order(
        &self,
        id: &str,
        expected: DeliveryStatus,
        request: &OrderUpdateDBRequest,
    ) -> Result<Option<OrderDBResponse>>;

    async fn has_pending_orders(&self, user_id: &str) -> Result<bool>;

    /// Enqueue a task in `PENDING` state.
    async fn create_task(&self, request: &TaskCreateDBRequest) -> Result<TaskDBResponse>;

    async fn get_task(&self, id: TaskId) -> Result<Option<TaskDBResponse>>;

    /// Atomically move the oldest pending task to `STARTED` for `worker_id`.
    ///
    /// Concurrent callers never receive the same task.
    async fn claim_task(&self, worker_id: &str) -> Result<Option<TaskDBResponse>>;

    /// Record progress and move the task to `PROGRESS`.
    async fn set_task_progress(&self, id: TaskId, progress: &TaskProgress) -> Result<()>;

    /// Record the final outcome, moving the task to `SUCCESS` or `FAILURE`.
    async fn finish_task(&self, id: TaskId, outcome: &TaskOutcome) -> Result<()>;
}
