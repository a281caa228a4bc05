//! In-memory storage implementation.
//!
//! Everything lives behind a single lock, which keeps multi-entity operations (order plus
//! items, bulk product inserts, task claims) atomic. Suitable for tests and single-process
//! deployments. Data is lost on restart.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use rust_decimal::Decimal;

use crate::db::errors::{DbError, Result};
use crate::db::models::{
    orders::{DeliveryStatus, OrderCreateDBRequest, OrderDBResponse, OrderFilter, OrderUpdateDBRequest},
    products::{ProductCreateDBRequest, ProductDBResponse, ProductUpdateDBRequest},
    tasks::{TaskCreateDBRequest, TaskDBResponse, TaskOutcome, TaskProgress, TaskState},
    users::{OrderSummary, UserCreateDBRequest, UserDBResponse, UserFilter, UserUpdateDBRequest},
};
use crate::types::{ProductId, TaskId, UserId, generate_id, prefix};

use super::Storage;

#[derive(Default)]
struct Tables {
    // Vecs keep insertion order, which is the listing order
    users: Vec<UserDBResponse>,
    products: Vec<ProductDBResponse>,
    orders: Vec<OrderDBResponse>,
    tasks: Vec<TaskDBResponse>,
}

impl Tables {
    fn check_user_unique(&self, id: Option<&str>, username: &str, email: &str) -> Result<()> {
        for user in self.users.iter().filter(|u| Some(u.id.as_str()) != id) {
            if user.username == username {
                return Err(DbError::unique("users", "users_username_unique"));
            }
            if user.email == email {
                return Err(DbError::unique("users", "users_email_unique"));
            }
        }
        Ok(())
    }

    fn task_mut(&mut self, id: TaskId) -> Result<&mut TaskDBResponse> {
        self.tasks.iter_mut().find(|t| t.id == id).ok_or(DbError::NotFound)
    }
}

#[derive(Clone, Default)]
pub struct InMemoryStorage {
    tables: Arc<RwLock<Tables>>,
}

impl InMemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for InMemoryStorage {
    async fn create_user(&self, request: &UserCreateDBRequest) -> Result<UserDBResponse> {
        let mut tables = self.tables.write();
        tables.check_user_unique(None, &request.username, &request.email)?;

        let user = UserDBResponse {
            id: generate_id(prefix::USER),
            username: request.username.clone(),
            email: request.email.clone(),
            phone: request.phone.clone(),
            user_type: request.user_type,
            password_hash: request.password_hash.clone(),
            is_active: true,
            date_joined: Utc::now(),
        };
        tables.users.push(user.clone());
        Ok(user)
    }

    async fn get_user(&self, id: &str) -> Result<Option<UserDBResponse>> {
        Ok(self.tables.read().users.iter().find(|u| u.id == id).cloned())
    }

    async fn get_user_by_username(&self, username: &str) -> Result<Option<UserDBResponse>> {
        Ok(self.tables.read().users.iter().find(|u| u.username == username).cloned())
    }

    async fn list_users(&self, filter: &UserFilter) -> Result<Vec<UserDBResponse>> {
        Ok(self
            .tables
            .read()
            .users
            .iter()
            .filter(|u| filter.user_type.is_none_or(|t| u.user_type == t))
            .cloned()
            .collect())
    }

    async fn update_user(&self, id: &str, request: &UserUpdateDBRequest) -> Result<UserDBResponse> {
        let mut tables = self.tables.write();
        let current = tables.users.iter().find(|u| u.id == id).cloned().ok_or(DbError::NotFound)?;

        let username = request.username.clone().unwrap_or(current.username);
        let email = request.email.clone().unwrap_or(current.email);
        tables.check_user_unique(Some(id), &username, &email)?;

        let user = tables.users.iter_mut().find(|u| u.id == id).ok_or(DbError::NotFound)?;
        user.username = username;
        user.email = email;
        if let Some(phone) = &request.phone {
            user.phone = phone.clone();
        }
        if let Some(user_type) = request.user_type {
            user.user_type = user_type;
        }
        if let Some(hash) = &request.password_hash {
            user.password_hash = hash.clone();
        }
        if let Some(is_active) = request.is_active {
            user.is_active = is_active;
        }
        Ok(user.clone())
    }

    async fn order_summaries(&self, user_ids: &[UserId]) -> Result<HashMap<UserId, OrderSummary>> {
        let tables = self.tables.read();
        let mut summaries: HashMap<UserId, OrderSummary> = HashMap::new();
        for order in tables.orders.iter().filter(|o| user_ids.contains(&o.user_id)) {
            let summary = summaries.entry(order.user_id.clone()).or_default();
            summary.order_count += 1;
            summary.total_amount = Some(summary.total_amount.unwrap_or(Decimal::ZERO) + order.total_amount);
        }
        Ok(summaries)
    }

    async fn create_products(&self, requests: &[ProductCreateDBRequest]) -> Result<Vec<ProductDBResponse>> {
        let mut tables = self.tables.write();
        let now = Utc::now();
        let created: Vec<ProductDBResponse> = requests
            .iter()
            .map(|r| ProductDBResponse {
                id: generate_id(prefix::PRODUCT),
                name: r.name.clone(),
                description: r.description.clone(),
                price: r.price,
                image: r.image.clone(),
                created_at: now,
                modified: now,
            })
            .collect();
        tables.products.extend(created.iter().cloned());
        Ok(created)
    }

    async fn get_product(&self, id: &str) -> Result<Option<ProductDBResponse>> {
        Ok(self.tables.read().products.iter().find(|p| p.id == id).cloned())
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<ProductDBResponse>> {
        Ok(self
            .tables
            .read()
            .products
            .iter()
            .filter(|p| ids.contains(&p.id))
            .cloned()
            .collect())
    }

    async fn list_products(&self) -> Result<Vec<ProductDBResponse>> {
        Ok(self.tables.read().products.clone())
    }

    async fn update_product(&self, id: &str, request: &ProductUpdateDBRequest) -> Result<ProductDBResponse> {
        let mut tables = self.tables.write();
        let product = tables.products.iter_mut().find(|p| p.id == id).ok_or(DbError::NotFound)?;
        if let Some(name) = &request.name {
            product.name = name.clone();
        }
        if let Some(description) = &request.description {
            product.description = description.clone();
        }
        if let Some(price) = request.price {
            product.price = price;
        }
        if let Some(image) = &request.image {
            product.image = image.clone();
        }
        product.modified = Utc::now();
        Ok(product.clone())
    }

    async fn delete_product(&self, id: &str) -> Result<bool> {
        let mut tables = self.tables.write();
        let before = tables.products.len();
        tables.products.retain(|p| p.id != id);
        if tables.products.len() == before {
            return Ok(false);
        }
        for order in tables.orders.iter_mut() {
            order.items.retain(|item| item.product != id);
        }
        Ok(true)
    }

    async fn create_order(&self, request: &OrderCreateDBRequest) -> Result<OrderDBResponse> {
        let mut tables = self.tables.write();
        if !tables.users.iter().any(|u| u.id == request.user_id) {
            return Err(DbError::foreign_key("orders", "orders_user_id_fkey"));
        }
        if let Some(missing) = request
            .items
            .iter()
            .find(|item| !tables.products.iter().any(|p| p.id == item.product))
        {
            tracing::debug!(product = %missing.product, "order references unknown product");
            return Err(DbError::foreign_key("order_items", "order_items_product_id_fkey"));
        }

        let order = OrderDBResponse {
            id: generate_id(prefix::ORDER),
            user_id: request.user_id.clone(),
            items: request.items.clone(),
            order_date: Utc::now(),
            total_amount: request.total_amount,
            delivery_status: DeliveryStatus::Pending,
            otp: request.otp.clone(),
            payment_option: request.payment_option.clone(),
            delivery_agent_id: None,
        };
        tables.orders.push(order.clone());
        Ok(order)
    }

    async fn get_order(&self, id: &str) -> Result<Option<OrderDBResponse>> {
        Ok(self.tables.read().orders.iter().find(|o| o.id == id).cloned())
    }

    async fn list_orders(&self, filter: &OrderFilter) -> Result<Vec<OrderDBResponse>> {
        Ok(self
            .tables
            .read()
            .orders
            .iter()
            .rev()
            .filter(|o| filter.user_id.as_ref().is_none_or(|id| &o.user_id == id))
            .cloned()
            .collect())
    }

    async fn update_order(
        &self,
        id: &str,
        expected: DeliveryStatus,
        request: &OrderUpdateDBRequest,
    ) -> Result<Option<OrderDBResponse>> {
        let mut tables = self.tables.write();
        if let Some(agent_id) = &request.delivery_agent_id
            && !tables.users.iter().any(|u| &u.id == agent_id)
        {
            return Err(DbError::foreign_key("orders", "orders_delivery_agent_id_fkey"));
        }

        let order = tables.orders.iter_mut().find(|o| o.id == id).ok_or(DbError::NotFound)?;
        if order.delivery_status != expected {
            return Ok(None);
        }
        if let Some(status) = request.delivery_status {
            order.delivery_status = status;
        }
        if let Some(agent_id) = &request.delivery_agent_id {
            order.delivery_agent_id = Some(agent_id.clone());
        }
        Ok(Some(order.clone()))
    }

    async fn has_pending_orders(&self, user_id: &str) -> Result<bool> {
        Ok(self
            .tables
            .read()
            .orders
            .iter()
            .any(|o| o.user_id == user_id && o.delivery_status == DeliveryStatus::Pending))
    }

    async fn create_task(&self, request: &TaskCreateDBRequest) -> Result<TaskDBResponse> {
        let mut tables = self.tables.write();
        if tables.tasks.iter().any(|t| t.id == request.id) {
            return Err(DbError::unique("tasks", "tasks_pkey"));
        }
        let task = TaskDBResponse {
            id: request.id,
            name: request.name.clone(),
            payload: request.payload.clone(),
            state: TaskState::Pending,
            progress: None,
            result: None,
            error: None,
            worker_id: None,
            created_at: Utc::now(),
            started_at: None,
            finished_at: None,
        };
        tables.tasks.push(task.clone());
        Ok(task)
    }

    async fn get_task(&self, id: TaskId) -> Result<Option<TaskDBResponse>> {
        Ok(self.tables.read().tasks.iter().find(|t| t.id == id).cloned())
    }

    async fn claim_task(&self, worker_id: &str) -> Result<Option<TaskDBResponse>> {
        let mut tables = self.tables.write();
        let Some(task) = tables.tasks.iter_mut().find(|t| t.state == TaskState::Pending) else {
            return Ok(None);
        };
        task.state = TaskState::Started;
        task.worker_id = Some(worker_id.to_string());
        task.started_at = Some(Utc::now());
        Ok(Some(task.clone()))
    }

    async fn set_task_progress(&self, id: TaskId, progress: &TaskProgress) -> Result<()> {
        let mut tables = self.tables.write();
        let task = tables.task_mut(id)?;
        task.state = TaskState::Progress;
        task.progress = Some(progress.clone());
        Ok(())
    }

    async fn finish_task(&self, id: TaskId, outcome: &TaskOutcome) -> Result<()> {
        let mut tables = self.tables.write();
        let task = tables.task_mut(id)?;
        match outcome {
            TaskOutcome::Success(result) => {
                task.state = TaskState::Success;
                task.result = Some(result.clone());
            }
            TaskOutcome::Failure(error) => {
                task.state = TaskState::Failure;
                task.error = Some(error.clone());
            }
        }
        task.finished_at = Some(Utc::now());
        Ok(())
    }
}
