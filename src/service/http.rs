use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::types::{Analytics, NewTask, Post, Task, TaskId};

use super::{ServiceError, TaskService};

pub const DEFAULT_BASE_URL: &str = "http://localhost:8000";

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub base_url: String,
    pub request_timeout: Duration,
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }
}

/// [`TaskService`] backed by the analysis service's REST API.
#[derive(Debug, Clone)]
pub struct HttpTaskService {
    client: Client,
    config: ServiceConfig,
}

impl HttpTaskService {
    pub fn new(config: ServiceConfig) -> Result<Self, ServiceError> {
        let client = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(|err| ServiceError::Transport {
                path: config.base_url.clone(),
                message: format!("failed to build HTTP client: {err}"),
            })?;

        debug!(base_url = %config.base_url, "created analysis service client");
        Ok(Self { client, config })
    }

    pub fn base_url(&self) -> &str {
        &self.config.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.config.base_url.trim_end_matches('/'), path)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ServiceError> {
        let request = self.client.get(self.url(path));
        self.execute("GET", path, request).await
    }

    async fn execute<T: DeserializeOwned>(
        &self,
        method: &'static str,
        path: &str,
        request: RequestBuilder,
    ) -> Result<T, ServiceError> {
        let response = request.send().await.map_err(|err| {
            warn!(method, path, error = %err, "analysis service request failed");
            ServiceError::Transport {
                path: path.to_string(),
                message: err.to_string(),
            }
        })?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| ServiceError::Transport {
                path: path.to_string(),
                message: format!("failed to read response body: {err}"),
            })?;

        debug!(method, path, status, bytes = body.len(), "analysis service responded");
        decode_response(path, status, &body)
    }
}

#[async_trait]
impl TaskService for HttpTaskService {
    #[instrument(skip(self))]
    async fn list_tasks(&self) -> Result<Vec<Task>, ServiceError> {
        self.get_json("/tasks").await
    }

    #[instrument(skip(self, task), fields(name = task.name()))]
    async fn create_task(&self, task: &NewTask) -> Result<Task, ServiceError> {
        let request = self.client.post(self.url("/tasks")).json(task);
        self.execute("POST", "/tasks", request).await
    }

    #[instrument(skip(self))]
    async fn get_task(&self, id: TaskId) -> Result<Task, ServiceError> {
        self.get_json(&format!("/tasks/{id}")).await
    }

    #[instrument(skip(self))]
    async fn get_posts(&self, id: TaskId) -> Result<Vec<Post>, ServiceError> {
        self.get_json(&format!("/tasks/{id}/posts")).await
    }

    #[instrument(skip(self))]
    async fn get_analytics(&self, id: TaskId) -> Result<Analytics, ServiceError> {
        self.get_json(&format!("/analytics/{id}")).await
    }
}

fn decode_response<T: DeserializeOwned>(
    path: &str,
    status: u16,
    body: &str,
) -> Result<T, ServiceError> {
    if status == 404 {
        return Err(ServiceError::NotFound {
            path: path.to_string(),
            message: error_detail(body),
        });
    }
    if !(200..300).contains(&status) {
        return Err(ServiceError::Rejected {
            path: path.to_string(),
            status,
            message: error_detail(body),
        });
    }

    serde_json::from_str(body).map_err(|err| ServiceError::Malformed {
        path: path.to_string(),
        message: err.to_string(),
    })
}

/// Extracts FastAPI's `{"detail": ...}` message, falling back to the raw body.
fn error_detail(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return "empty response body".to_string();
    }

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(map)) => match map.get("detail") {
            Some(Value::String(detail)) => detail.clone(),
            Some(other) => other.to_string(),
            None => trimmed.to_string(),
        },
        _ => trimmed.to_string(),
    }
}
