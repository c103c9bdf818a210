//! Scripted [`TaskService`] used by store, polling and view tests.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use tokio::sync::{Barrier, oneshot};

use crate::service::{ServiceError, TaskService};
use crate::types::{Analytics, NewTask, Post, Task, TaskFilters, TaskId, TaskStatus};

pub enum Step {
    Respond(Task),
    Fail(ServiceError),
    /// Responds once the paired sender fires (or is dropped).
    Gated(Task, oneshot::Receiver<()>),
}

pub fn task(id: i64, status: TaskStatus) -> Task {
    Task {
        id: TaskId(id),
        name: format!("task {id}"),
        status,
        created_at: Utc
            .with_ymd_and_hms(2024, 5, 1, 10, 0, 0)
            .single()
            .expect("fixed timestamp should be valid"),
        completed_at: status.is_terminal().then(|| {
            Utc.with_ymd_and_hms(2024, 5, 1, 10, 5, 0)
                .single()
                .expect("fixed timestamp should be valid")
        }),
        filters: TaskFilters::default(),
    }
}

pub fn post(id: i64, hashtags: &[&str]) -> Post {
    Post {
        id,
        source: "twitter".to_string(),
        post_id: format!("tw-{id}"),
        timestamp: Utc
            .with_ymd_and_hms(2024, 5, 1, 9, 0, 0)
            .single()
            .expect("fixed timestamp should be valid"),
        content: format!("post {id}"),
        likes: 3,
        comments: 1,
        shares: 0,
        hashtags: hashtags.iter().map(|tag| tag.to_string()).collect(),
        content_type: "text".to_string(),
    }
}

/// Pops one [`Step`] per `get_task` call and repeats the last task once the
/// script is exhausted.
pub struct ScriptedService {
    steps: Mutex<VecDeque<Step>>,
    last_task: Mutex<Option<Task>>,
    hashtag_counts: Mutex<HashMap<String, u64>>,
    posts_error: Mutex<Option<ServiceError>>,
    fetch_barrier: Mutex<Option<Arc<Barrier>>>,
    keep_ids: AtomicBool,
    task_calls: AtomicUsize,
    requested: Mutex<Vec<TaskId>>,
    created: Mutex<Vec<String>>,
}

impl ScriptedService {
    pub fn new(steps: Vec<Step>) -> Self {
        Self {
            steps: Mutex::new(steps.into()),
            last_task: Mutex::new(None),
            hashtag_counts: Mutex::new(HashMap::new()),
            posts_error: Mutex::new(None),
            fetch_barrier: Mutex::new(None),
            keep_ids: AtomicBool::new(false),
            task_calls: AtomicUsize::new(0),
            requested: Mutex::new(Vec::new()),
            created: Mutex::new(Vec::new()),
        }
    }

    pub fn set_hashtag_counts(&self, counts: &[(&str, u64)]) {
        *self
            .hashtag_counts
            .lock()
            .expect("hashtag counts mutex should not be poisoned") = counts
            .iter()
            .map(|(tag, count)| (tag.to_string(), *count))
            .collect();
    }

    pub fn fail_posts(&self, err: ServiceError) {
        *self
            .posts_error
            .lock()
            .expect("posts error mutex should not be poisoned") = Some(err);
    }

    /// Holds task, posts and analytics retrievals until all three have started.
    pub fn synchronize_fetches(&self) {
        let barrier = Arc::new(Barrier::new(3));
        *self
            .fetch_barrier
            .lock()
            .expect("fetch barrier mutex should not be poisoned") = Some(barrier);
    }

    /// Returns scripted tasks with their own ids instead of the requested one.
    pub fn keep_response_ids(&self) {
        self.keep_ids.store(true, Ordering::SeqCst);
    }

    pub fn task_calls(&self) -> usize {
        self.task_calls.load(Ordering::SeqCst)
    }

    pub fn requested_ids(&self) -> Vec<TaskId> {
        self.requested
            .lock()
            .expect("requested ids mutex should not be poisoned")
            .clone()
    }

    pub fn created_names(&self) -> Vec<String> {
        self.created
            .lock()
            .expect("created names mutex should not be poisoned")
            .clone()
    }

    async fn rendezvous(&self) {
        let barrier = self
            .fetch_barrier
            .lock()
            .expect("fetch barrier mutex should not be poisoned")
            .clone();
        if let Some(barrier) = barrier {
            barrier.wait().await;
        }
    }

    fn next_step(&self) -> Option<Step> {
        self.steps
            .lock()
            .expect("steps mutex should not be poisoned")
            .pop_front()
    }

    fn finish(&self, id: TaskId, mut task: Task) -> Task {
        if !self.keep_ids.load(Ordering::SeqCst) {
            task.id = id;
        }
        *self
            .last_task
            .lock()
            .expect("last task mutex should not be poisoned") = Some(task.clone());
        task
    }
}

#[async_trait]
impl TaskService for ScriptedService {
    async fn list_tasks(&self) -> Result<Vec<Task>, ServiceError> {
        Ok(self
            .last_task
            .lock()
            .expect("last task mutex should not be poisoned")
            .iter()
            .cloned()
            .collect())
    }

    async fn create_task(&self, new_task: &NewTask) -> Result<Task, ServiceError> {
        self.created
            .lock()
            .expect("created names mutex should not be poisoned")
            .push(new_task.name().to_string());
        let mut created = task(100, TaskStatus::Pending);
        created.name = new_task.name().to_string();
        created.filters = new_task.filters().clone();
        Ok(created)
    }

    async fn get_task(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.task_calls.fetch_add(1, Ordering::SeqCst);
        self.requested
            .lock()
            .expect("requested ids mutex should not be poisoned")
            .push(id);
        self.rendezvous().await;

        match self.next_step() {
            Some(Step::Respond(task)) => Ok(self.finish(id, task)),
            Some(Step::Fail(err)) => Err(err),
            Some(Step::Gated(task, gate)) => {
                let _ = gate.await;
                Ok(self.finish(id, task))
            }
            None => {
                let last = self
                    .last_task
                    .lock()
                    .expect("last task mutex should not be poisoned")
                    .clone();
                match last {
                    Some(task) => Ok(self.finish(id, task)),
                    None => Err(ServiceError::NotFound {
                        path: format!("/tasks/{id}"),
                        message: "Task not found".to_string(),
                    }),
                }
            }
        }
    }

    async fn get_posts(&self, id: TaskId) -> Result<Vec<Post>, ServiceError> {
        self.rendezvous().await;
        if let Some(err) = self
            .posts_error
            .lock()
            .expect("posts error mutex should not be poisoned")
            .clone()
        {
            return Err(err);
        }
        Ok(vec![post(id.0 * 10, &["ai"])])
    }

    async fn get_analytics(&self, _id: TaskId) -> Result<Analytics, ServiceError> {
        self.rendezvous().await;
        let hashtag_counts = self
            .hashtag_counts
            .lock()
            .expect("hashtag counts mutex should not be poisoned")
            .clone();
        Ok(Analytics {
            total_posts: 1,
            total_engagement: 4,
            hashtag_counts,
        })
    }
}
