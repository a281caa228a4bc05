//! API response models for background task submission and progress polling.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::types::TaskId;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct TaskIdResponse {
    #[schema(value_type = String, example = "0b9a7e52-3c1d-4f0e-9a61-5d2f8c4b7e10")]
    pub task_id: TaskId,
}

/// Returned while a task is running or once it has succeeded.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct ProgressResponse {
    pub percent: f64,
    pub description: Option<String>,
    pub completed: bool,
}

/// Returned with a 500 when a task failed or its state is unknown.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema, PartialEq)]
pub struct TaskErrorResponse {
    pub error: String,
    pub completed: bool,
}
