use crate::db::{errors::Result, models::tasks::TaskProgress, storage::Storage};
use crate::tasks::events::{EventPublisher, TaskEvent};
use crate::types::TaskId;

/// Records progress for one running task so pollers can report a percentage.
pub struct ProgressRecorder<'a> {
    storage: &'a dyn Storage,
    events: &'a EventPublisher,
    task_id: TaskId,
}

impl<'a> ProgressRecorder<'a> {
    pub fn new(storage: &'a dyn Storage, events: &'a EventPublisher, task_id: TaskId) -> Self {
        Self {
            storage,
            events,
            task_id,
        }
    }

    pub async fn set_progress(&self, current: u64, total: u64, description: impl Into<String>) -> Result<TaskProgress> {
        let progress = TaskProgress::new(current, total, Some(description.into()));
        self.storage.set_task_progress(self.task_id, &progress).await?;
        self.events.publish(TaskEvent::TaskProgress {
            uuid: self.task_id,
            percent: progress.percent,
            description: progress.description.clone(),
        });
        Ok(progress)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::tasks::{TaskCreateDBRequest, TaskState};
    use crate::db::storage::in_memory::InMemoryStorage;
    use serde_json::json;
    use uuid::Uuid;

    #[tokio::test]
    async fn test_set_progress_updates_task_and_emits_event() {
        let storage = InMemoryStorage::new();
        let events = EventPublisher::new(true);
        let mut rx = events.subscribe();
        let task = storage
            .create_task(&TaskCreateDBRequest {
                id: Uuid::new_v4(),
                name: "bulk_create_products".to_string(),
                payload: json!({}),
            })
            .await
            .unwrap();

        let recorder = ProgressRecorder::new(&storage, &events, task.id);
        let progress = recorder.set_progress(1, 4, "Creating item 1/4").await.unwrap();
        assert_eq!(progress.percent, 25.0);

        let stored = storage.get_task(task.id).await.unwrap().unwrap();
        assert_eq!(stored.state, TaskState::Progress);
        assert_eq!(stored.progress.unwrap().description.as_deref(), Some("Creating item 1/4"));

        match rx.recv().await.unwrap() {
            TaskEvent::TaskProgress { uuid, percent, .. } => {
                assert_eq!(uuid, task.id);
                assert_eq!(percent, 25.0);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_unknown_task_is_an_error() {
        let storage = InMemoryStorage::new();
        let events = EventPublisher::new(false);
        let recorder = ProgressRecorder::new(&storage, &events, Uuid::new_v4());
        assert!(recorder.set_progress(1, 1, "x").await.is_err());
    }
}
