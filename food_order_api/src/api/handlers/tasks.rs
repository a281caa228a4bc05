use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::{
    AppState,
    api::{
        JsonBody,
        handlers::products::no_properties,
        models::{
            products::{ProductCreate, ProductPayload},
            tasks::{ProgressResponse, TaskErrorResponse, TaskIdResponse},
        },
    },
    auth::permissions::{Admin, Authenticated, RequiresPermission},
    db::models::tasks::{TaskDBResponse, TaskState},
    errors::Result,
    tasks::TaskKind,
};

/// Queue a bulk product import
#[utoipa::path(
    post,
    path = "/api/orders/bulk_create/",
    tag = "orders",
    summary = "Bulk create products in the background",
    request_body = Vec<ProductCreate>,
    responses(
        (status = 200, description = "Import queued; poll check_progress with the task id", body = TaskIdResponse),
        (status = 400, description = "Empty payload"),
        (status = 403, description = "Admin only"),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all)]
pub async fn bulk_create(
    State(state): State<AppState>,
    _: RequiresPermission<Admin>,
    JsonBody(payload): JsonBody<Option<ProductPayload>>,
) -> Result<Json<TaskIdResponse>> {
    let items = payload.and_then(ProductPayload::into_items).ok_or_else(no_properties)?;
    let task_id = state.tasks.delay(TaskKind::BulkCreateProducts { items }).await?;
    tracing::info!(%task_id, "Bulk product import queued");
    Ok(Json(TaskIdResponse { task_id }))
}

fn unknown_state() -> Response {
    failure("Unknown task state".to_string())
}

fn failure(error: String) -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(TaskErrorResponse { error, completed: true }),
    )
        .into_response()
}

/// Map a task to its progress report.
fn progress_report(task: TaskDBResponse) -> Response {
    match task.state {
        TaskState::Progress => {
            let (percent, description) = task
                .progress
                .map(|p| (p.percent, p.description))
                .unwrap_or((0.0, None));
            Json(ProgressResponse {
                percent,
                description,
                completed: false,
            })
            .into_response()
        }
        TaskState::Success => Json(ProgressResponse {
            percent: 100.0,
            description: Some("Task completed".to_string()),
            completed: true,
        })
        .into_response(),
        TaskState::Failure => failure(task.error.unwrap_or_default()),
        TaskState::Pending | TaskState::Started => unknown_state(),
    }
}

/// Check the progress of a background task
#[utoipa::path(
    get,
    path = "/api/orders/check_progress/{task_id}/",
    tag = "orders",
    summary = "Check task progress",
    params(("task_id" = String, Path, description = "Task ID returned by bulk_create")),
    responses(
        (status = 200, description = "Task running or completed", body = ProgressResponse),
        (status = 500, description = "Task failed, or its state is unknown", body = TaskErrorResponse),
    ),
    security(("BearerAuth" = []))
)]
#[tracing::instrument(skip_all, fields(task_id = %task_id))]
pub async fn check_progress(
    State(state): State<AppState>,
    Path(task_id): Path<String>,
    _: RequiresPermission<Authenticated>,
) -> Result<Response> {
    let Ok(id) = task_id.parse::<uuid::Uuid>() else {
        return Ok(unknown_state());
    };
    Ok(match state.tasks.get(id).await? {
        Some(task) => progress_report(task),
        None => unknown_state(),
    })
}
