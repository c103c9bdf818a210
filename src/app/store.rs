//! Holds the current task snapshot and commits refreshes in issue order.

use std::sync::{Arc, Mutex, MutexGuard};

use chrono::Utc;
use tokio::sync::watch;
use tracing::{debug, info};

use crate::service::{ServiceError, TaskService};
use crate::types::{NewTask, SharedSnapshot, Snapshot, Task, TaskId};

#[derive(Debug, Clone, PartialEq)]
pub enum RefreshOutcome {
    /// The retrieved snapshot replaced the held one.
    Applied(SharedSnapshot),
    /// A later refresh or a reset was issued while this one was in flight.
    Superseded,
}

/// Owner of the single current [`Snapshot`].
///
/// Every refresh is tagged with a sequence number when it is issued. Its result
/// is committed only if no newer refresh (or reset) was issued in the meantime,
/// so a slow response can never overwrite a newer snapshot.
pub struct TaskStore {
    service: Arc<dyn TaskService>,
    latest_issued: Mutex<u64>,
    snapshot: watch::Sender<Option<SharedSnapshot>>,
}

impl TaskStore {
    pub fn new(service: Arc<dyn TaskService>) -> Self {
        let (snapshot, _) = watch::channel(None);
        Self {
            service,
            latest_issued: Mutex::new(0),
            snapshot,
        }
    }

    pub fn snapshot(&self) -> Option<SharedSnapshot> {
        self.snapshot.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<SharedSnapshot>> {
        self.snapshot.subscribe()
    }

    /// Retrieves task, posts and analytics concurrently and commits them together.
    ///
    /// On error the held snapshot is left untouched.
    pub async fn refresh(&self, id: TaskId) -> Result<RefreshOutcome, ServiceError> {
        let sequence = self.issue();
        debug!(task_id = %id, sequence, "refresh issued");

        let (task, posts, analytics) = tokio::try_join!(
            self.service.get_task(id),
            self.service.get_posts(id),
            self.service.get_analytics(id)
        )?;

        if task.id != id {
            return Err(ServiceError::Malformed {
                path: format!("/tasks/{id}"),
                message: format!("response describes task {} instead of {id}", task.id),
            });
        }

        let snapshot = Arc::new(Snapshot {
            task,
            posts,
            analytics,
            fetched_at: Utc::now(),
        });

        let latest = self.lock_sequence();
        if *latest != sequence {
            debug!(
                task_id = %id,
                sequence,
                latest = *latest,
                "discarding superseded refresh"
            );
            return Ok(RefreshOutcome::Superseded);
        }
        self.snapshot.send_replace(Some(Arc::clone(&snapshot)));
        drop(latest);

        debug!(
            task_id = %id,
            sequence,
            status = %snapshot.task.status,
            posts = snapshot.posts.len(),
            "snapshot applied"
        );
        Ok(RefreshOutcome::Applied(snapshot))
    }

    /// Drops the held snapshot and invalidates every refresh still in flight.
    pub fn reset(&self) {
        let mut latest = self.lock_sequence();
        *latest += 1;
        self.snapshot.send_replace(None);
    }

    /// Submits a new task definition. The held snapshot is not affected.
    pub async fn create(&self, task: &NewTask) -> Result<TaskId, ServiceError> {
        let created = self.service.create_task(task).await?;
        info!(task_id = %created.id, name = %created.name, "created analysis task");
        Ok(created.id)
    }

    pub async fn list(&self) -> Result<Vec<Task>, ServiceError> {
        self.service.list_tasks().await
    }

    fn issue(&self) -> u64 {
        let mut latest = self.lock_sequence();
        *latest += 1;
        *latest
    }

    fn lock_sequence(&self) -> MutexGuard<'_, u64> {
        match self.latest_issued.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
