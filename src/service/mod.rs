//! Remote analysis service contract.
//!
//! The client depends on five endpoints of the service: listing and creating
//! tasks, and reading a task, its posts and its analytics. [`TaskService`] is
//! the seam the store is written against so that tests can substitute a
//! scripted implementation for the HTTP one.

pub mod http;

use async_trait::async_trait;
use thiserror::Error;

use crate::types::{Analytics, NewTask, Post, Task, TaskId};

pub use http::{HttpTaskService, ServiceConfig};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transport,
    Malformed,
    NotFound,
    Rejected,
}

/// Failures at the client boundary. None of them are fatal to polling.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ServiceError {
    #[error("request to {path} failed: {message}")]
    Transport { path: String, message: String },
    #[error("malformed response from {path}: {message}")]
    Malformed { path: String, message: String },
    #[error("{path} not found: {message}")]
    NotFound { path: String, message: String },
    #[error("{path} rejected with HTTP {status}: {message}")]
    Rejected {
        path: String,
        status: u16,
        message: String,
    },
}

impl ServiceError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Transport { .. } => ErrorKind::Transport,
            Self::Malformed { .. } => ErrorKind::Malformed,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Rejected { .. } => ErrorKind::Rejected,
        }
    }

    pub fn code(&self) -> &'static str {
        match self.kind() {
            ErrorKind::Transport => "SERVICE_UNREACHABLE",
            ErrorKind::Malformed => "SERVICE_MALFORMED_RESPONSE",
            ErrorKind::NotFound => "TASK_NOT_FOUND",
            ErrorKind::Rejected => "SERVICE_REJECTED",
        }
    }
}

#[async_trait]
pub trait TaskService: Send + Sync {
    async fn list_tasks(&self) -> Result<Vec<Task>, ServiceError>;
    async fn create_task(&self, task: &NewTask) -> Result<Task, ServiceError>;
    async fn get_task(&self, id: TaskId) -> Result<Task, ServiceError>;
    async fn get_posts(&self, id: TaskId) -> Result<Vec<Post>, ServiceError>;
    async fn get_analytics(&self, id: TaskId) -> Result<Analytics, ServiceError>;
}
