//! Task implementations.

use serde_json::{Value, json};
use tracing::{info, instrument, warn};

use crate::api::models::products::ProductCreate;
use crate::db::models::tasks::TaskOutcome;
use crate::db::storage::Storage;
use crate::email::EmailService;
use crate::tasks::{TaskKind, events::EventPublisher, progress::ProgressRecorder};
use crate::types::TaskId;

/// Everything a running task may touch.
pub struct JobContext<'a> {
    pub storage: &'a dyn Storage,
    pub email: &'a EmailService,
    pub events: &'a EventPublisher,
}

/// Run one task to completion and report how it ended.
pub async fn execute(task_id: TaskId, kind: TaskKind, ctx: &JobContext<'_>) -> TaskOutcome {
    let result = match kind {
        TaskKind::SendMail {
            subject,
            message,
            recipients,
        } => send_mail(ctx.email, &subject, &message, &recipients).await,
        TaskKind::BulkCreateProducts { items } => {
            let progress = ProgressRecorder::new(ctx.storage, ctx.events, task_id);
            bulk_create_products(ctx.storage, &progress, &items).await
        }
    };
    match result {
        Ok(value) => TaskOutcome::Success(value),
        Err(message) => TaskOutcome::Failure(message),
    }
}

#[instrument(skip(email, message), fields(recipients = recipients.len()))]
async fn send_mail(email: &EmailService, subject: &str, message: &str, recipients: &[String]) -> Result<Value, String> {
    email.send(subject, message, recipients).await.map_err(|e| e.to_string())?;
    Ok(Value::Null)
}

/// Validate every item in order, then create them all in one transaction.
///
/// The first invalid item fails the whole task and nothing is created.
#[instrument(skip_all, fields(items = items.len()))]
async fn bulk_create_products(storage: &dyn Storage, progress: &ProgressRecorder<'_>, items: &[ProductCreate]) -> Result<Value, String> {
    let total = items.len();
    let mut requests = Vec::with_capacity(total);

    for (index, item) in items.iter().enumerate() {
        let position = index + 1;
        let request = item.validate().map_err(|errors| format!("Validation error for item {position}: {errors}"))?;
        requests.push(request);

        if let Err(e) = progress
            .set_progress(position as u64, total as u64, format!("Creating item {position}/{total}"))
            .await
        {
            warn!(error = %e, "Failed to record task progress");
        }
    }

    let created = storage.create_products(&requests).await.map_err(|e| format!("Bulk create failed: {e}"))?;
    info!(created = created.len(), "Bulk product import finished");

    Ok(json!({ "result": "Bulk create completed" }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{EmailConfig, EmailTransportConfig};
    use crate::db::models::tasks::{TaskCreateDBRequest, TaskState};
    use crate::db::storage::in_memory::InMemoryStorage;
    use uuid::Uuid;

    fn email_service(dir: &std::path::Path) -> EmailService {
        EmailService::new(&EmailConfig {
            transport: EmailTransportConfig::File {
                path: dir.to_string_lossy().into_owned(),
            },
            ..Default::default()
        })
        .unwrap()
    }

    fn product(name: &str, price: &str) -> ProductCreate {
        ProductCreate {
            name: Some(name.to_string()),
            description: Some(format!("{name} description")),
            price: Some(price.parse().unwrap()),
            image: None,
        }
    }

    async fn enqueue(storage: &InMemoryStorage) -> TaskId {
        storage
            .create_task(&TaskCreateDBRequest {
                id: Uuid::new_v4(),
                name: "bulk_create_products".to_string(),
                payload: json!({}),
            })
            .await
            .unwrap()
            .id
    }

    #[tokio::test]
    async fn test_bulk_create_records_progress_and_creates_all() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = InMemoryStorage::new();
        let email = email_service(tmp.path());
        let events = EventPublisher::new(false);
        let ctx = JobContext {
            storage: &storage,
            email: &email,
            events: &events,
        };
        let task_id = enqueue(&storage).await;

        let items = vec![product("Dosa", "3.50"), product("Idli", "2")];
        let outcome = execute(task_id, TaskKind::BulkCreateProducts { items }, &ctx).await;

        assert_eq!(outcome, TaskOutcome::Success(json!({ "result": "Bulk create completed" })));
        assert_eq!(storage.list_products().await.unwrap().len(), 2);

        let task = storage.get_task(task_id).await.unwrap().unwrap();
        assert_eq!(task.state, TaskState::Progress);
        let progress = task.progress.unwrap();
        assert_eq!(progress.percent, 100.0);
        assert_eq!(progress.description.as_deref(), Some("Creating item 2/2"));
    }

    #[tokio::test]
    async fn test_bulk_create_is_all_or_nothing() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = InMemoryStorage::new();
        let email = email_service(tmp.path());
        let events = EventPublisher::new(false);
        let ctx = JobContext {
            storage: &storage,
            email: &email,
            events: &events,
        };
        let task_id = enqueue(&storage).await;

        let items = vec![product("Dosa", "3.50"), product("Vada", "-0.50")];
        let outcome = execute(task_id, TaskKind::BulkCreateProducts { items }, &ctx).await;

        match outcome {
            TaskOutcome::Failure(message) => assert_eq!(
                message,
                r#"Validation error for item 2: {"price":["Ensure this value is greater than or equal to 0."]}"#
            ),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(storage.list_products().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_send_mail_writes_message() {
        let tmp = tempfile::tempdir().unwrap();
        let storage = InMemoryStorage::new();
        let email = email_service(tmp.path());
        let events = EventPublisher::new(false);
        let ctx = JobContext {
            storage: &storage,
            email: &email,
            events: &events,
        };

        let outcome = execute(
            Uuid::new_v4(),
            TaskKind::SendMail {
                subject: "Order Confirmation".to_string(),
                message: "Hello".to_string(),
                recipients: vec!["alice@example.com".to_string()],
            },
            &ctx,
        )
        .await;
        assert_eq!(outcome, TaskOutcome::Success(Value::Null));
        assert_eq!(std::fs::read_dir(tmp.path()).unwrap().count(), 1);

        let outcome = execute(
            Uuid::new_v4(),
            TaskKind::SendMail {
                subject: "Nobody".to_string(),
                message: "Hello".to_string(),
                recipients: vec![],
            },
            &ctx,
        )
        .await;
        assert!(matches!(outcome, TaskOutcome::Failure(_)));
    }
}
