use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use serde_json::{Value, json};

use social_analytics::app::polling::{PollState, PollingController, StopReason};
use social_analytics::app::store::TaskStore;
use social_analytics::service::{
    ErrorKind, HttpTaskService, ServiceConfig, ServiceError, TaskService,
};
use social_analytics::types::{NewTask, TaskId, TaskStatus};

#[derive(Debug, Clone)]
struct RecordedRequest {
    method: String,
    path: String,
    body: String,
}

type Handler = dyn Fn(&RecordedRequest) -> (u16, String) + Send + Sync;

/// Minimal HTTP/1.1 server answering each connection once and closing it.
struct MockServer {
    port: u16,
    requests: Arc<Mutex<Vec<RecordedRequest>>>,
    stop: Arc<AtomicBool>,
    handle: Option<thread::JoinHandle<()>>,
}

impl MockServer {
    fn start(
        handler: impl Fn(&RecordedRequest) -> (u16, String) + Send + Sync + 'static,
    ) -> Result<Self> {
        let listener = TcpListener::bind(("127.0.0.1", 0))
            .context("failed to bind mock analysis server on random available port")?;
        let port = listener
            .local_addr()
            .context("failed to get mock server port")?
            .port();
        listener
            .set_nonblocking(true)
            .context("failed to make mock server non-blocking")?;

        let stop = Arc::new(AtomicBool::new(false));
        let stop_flag = Arc::clone(&stop);
        let requests = Arc::new(Mutex::new(Vec::new()));
        let recorded = Arc::clone(&requests);
        let handler: Arc<Handler> = Arc::new(handler);

        let handle = thread::spawn(move || {
            while !stop_flag.load(Ordering::Relaxed) {
                match listener.accept() {
                    Ok((stream, _)) => serve(stream, handler.as_ref(), &recorded),
                    Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => {
                        thread::sleep(Duration::from_millis(5));
                    }
                    Err(_) => break,
                }
            }
        });

        Ok(Self {
            port,
            requests,
            stop,
            handle: Some(handle),
        })
    }

    fn base_url(&self) -> String {
        format!("http://127.0.0.1:{}", self.port)
    }

    fn requests(&self) -> Vec<RecordedRequest> {
        self.requests
            .lock()
            .expect("mock request log lock should not be poisoned")
            .clone()
    }

    fn count(&self, path: &str) -> usize {
        self.requests()
            .iter()
            .filter(|request| request.path == path)
            .count()
    }
}

impl Drop for MockServer {
    fn drop(&mut self) {
        self.stop.store(true, Ordering::Relaxed);
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

fn serve(mut stream: TcpStream, handler: &Handler, recorded: &Mutex<Vec<RecordedRequest>>) {
    let _ = stream.set_nonblocking(false);
    let _ = stream.set_read_timeout(Some(Duration::from_secs(2)));

    let Some(request) = read_request(&mut stream) else {
        return;
    };
    let (status, body) = handler(&request);
    recorded
        .lock()
        .expect("mock request log lock should not be poisoned")
        .push(request);

    let reason = match status {
        200 => "OK",
        201 => "Created",
        404 => "Not Found",
        _ => "Error",
    };
    let response = format!(
        "HTTP/1.1 {status} {reason}\r\nContent-Type: application/json\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
        body.len()
    );
    let _ = stream.write_all(response.as_bytes());
    let _ = stream.flush();
}

fn read_request(stream: &mut TcpStream) -> Option<RecordedRequest> {
    let mut buffer = Vec::new();
    let mut chunk = [0u8; 1024];
    let header_end = loop {
        let read = stream.read(&mut chunk).ok()?;
        if read == 0 {
            return None;
        }
        buffer.extend_from_slice(&chunk[..read]);
        if let Some(position) = find_header_end(&buffer) {
            break position;
        }
    };

    let head = String::from_utf8_lossy(&buffer[..header_end]).to_string();
    let content_length = head
        .lines()
        .filter_map(|line| line.split_once(':'))
        .find(|(name, _)| name.trim().eq_ignore_ascii_case("content-length"))
        .and_then(|(_, value)| value.trim().parse::<usize>().ok())
        .unwrap_or(0);

    let body_start = header_end + 4;
    while buffer.len() < body_start + content_length {
        let read = stream.read(&mut chunk).ok()?;
        if read == 0 {
            break;
        }
        buffer.extend_from_slice(&chunk[..read]);
    }

    let mut request_line = head.lines().next()?.split_whitespace();
    let method = request_line.next()?.to_string();
    let path = request_line.next()?.to_string();
    let body_end = buffer.len().min(body_start + content_length);
    let body = String::from_utf8_lossy(&buffer[body_start.min(body_end)..body_end]).to_string();

    Some(RecordedRequest { method, path, body })
}

fn find_header_end(buffer: &[u8]) -> Option<usize> {
    buffer.windows(4).position(|window| window == b"\r\n\r\n")
}

fn service_for(server: &MockServer) -> HttpTaskService {
    HttpTaskService::new(ServiceConfig {
        base_url: server.base_url(),
        request_timeout: Duration::from_secs(5),
    })
    .expect("client should build")
}

fn task_json(id: i64, status: &str) -> Value {
    let completed_at = match status {
        "completed" => Value::String("2024-05-01T10:05:00".to_string()),
        _ => Value::Null,
    };
    json!({
        "id": id,
        "name": "launch week",
        "status": status,
        "created_at": "2024-05-01T10:00:00.123456",
        "completed_at": completed_at,
        "filters": {
            "start_date": null,
            "end_date": "2024-05-31",
            "hashtags": ["ai"],
            "platforms": ["twitter"]
        }
    })
}

#[tokio::test]
async fn get_task_decodes_service_payload() -> Result<()> {
    let server = MockServer::start(|_| (200, task_json(5, "in_progress").to_string()))?;
    let service = service_for(&server);

    let task = service.get_task(TaskId(5)).await?;

    assert_eq!(task.id, TaskId(5));
    assert_eq!(task.status, TaskStatus::InProgress);
    assert_eq!(task.completed_at, None);
    assert_eq!(task.filters.start_date, None);
    assert_eq!(task.filters.end_date.as_deref(), Some("2024-05-31"));
    assert_eq!(
        task.created_at.to_rfc3339(),
        "2024-05-01T10:00:00.123456+00:00"
    );

    let requests = server.requests();
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].method, "GET");
    assert_eq!(requests[0].path, "/tasks/5");
    Ok(())
}

#[tokio::test]
async fn posts_and_analytics_use_their_endpoints() -> Result<()> {
    let server = MockServer::start(|request| match request.path.as_str() {
        "/tasks/3/posts" => (
            200,
            json!([{
                "id": 1,
                "source": "instagram",
                "post_id": "ig-1",
                "timestamp": "2024-05-02T08:30:00",
                "content": "new model drop #ai",
                "likes": 10,
                "comments": 2,
                "shares": 1,
                "hashtags": ["ai"],
                "content_type": "image"
            }])
            .to_string(),
        ),
        "/analytics/3" => (
            200,
            json!({
                "total_posts": 1,
                "total_engagement": 13,
                "hashtag_counts": {"ai": 1}
            })
            .to_string(),
        ),
        _ => (404, json!({"detail": "Not Found"}).to_string()),
    })?;
    let service = service_for(&server);

    let posts = service.get_posts(TaskId(3)).await?;
    let analytics = service.get_analytics(TaskId(3)).await?;

    assert_eq!(posts.len(), 1);
    assert_eq!(posts[0].engagement(), 13);
    assert_eq!(analytics.total_engagement, 13);
    assert_eq!(analytics.hashtag_counts.get("ai"), Some(&1));
    Ok(())
}

#[tokio::test]
async fn create_task_posts_definition_and_returns_created_task() -> Result<()> {
    let server = MockServer::start(|request| {
        let mut created = task_json(12, "pending");
        let submitted: Value = serde_json::from_str(&request.body).unwrap_or(Value::Null);
        created["name"] = submitted["name"].clone();
        (200, created.to_string())
    })?;
    let service = service_for(&server);
    let new_task = NewTask::new(
        "Election coverage",
        None,
        None,
        vec!["#vote".to_string()],
        vec!["twitter".to_string()],
    )?;

    let created = service.create_task(&new_task).await?;

    assert_eq!(created.id, TaskId(12));
    assert_eq!(created.name, "Election coverage");
    let requests = server.requests();
    assert_eq!(requests[0].method, "POST");
    assert_eq!(requests[0].path, "/tasks");
    let body: Value = serde_json::from_str(&requests[0].body)?;
    assert_eq!(body["name"], "Election coverage");
    assert_eq!(body["filters"]["hashtags"], json!(["vote"]));
    assert_eq!(body["filters"]["platforms"], json!(["twitter"]));
    Ok(())
}

#[tokio::test]
async fn missing_task_is_not_found_with_service_detail() -> Result<()> {
    let server = MockServer::start(|_| (404, json!({"detail": "Task not found"}).to_string()))?;
    let service = service_for(&server);

    let err = service
        .get_task(TaskId(99))
        .await
        .expect_err("missing task should fail");

    assert_eq!(
        err,
        ServiceError::NotFound {
            path: "/tasks/99".to_string(),
            message: "Task not found".to_string(),
        }
    );
    Ok(())
}

#[tokio::test]
async fn server_errors_and_bad_bodies_are_classified() -> Result<()> {
    let server = MockServer::start(|request| match request.path.as_str() {
        "/tasks/1" => (500, "Internal Server Error".to_string()),
        _ => (200, "{\"id\": \"not-a-number\"".to_string()),
    })?;
    let service = service_for(&server);

    let rejected = service
        .get_task(TaskId(1))
        .await
        .expect_err("500 should fail");
    let malformed = service
        .get_task(TaskId(2))
        .await
        .expect_err("truncated body should fail");

    assert_eq!(rejected.kind(), ErrorKind::Rejected);
    assert_eq!(malformed.kind(), ErrorKind::Malformed);
    Ok(())
}

#[tokio::test]
async fn unreachable_service_is_a_transport_error() -> Result<()> {
    let port = {
        let listener = TcpListener::bind(("127.0.0.1", 0))?;
        listener.local_addr()?.port()
    };
    let service = HttpTaskService::new(ServiceConfig {
        base_url: format!("http://127.0.0.1:{port}"),
        request_timeout: Duration::from_secs(2),
    })?;

    let err = service
        .list_tasks()
        .await
        .expect_err("closed port should fail");

    assert_eq!(err.kind(), ErrorKind::Transport);
    Ok(())
}

#[tokio::test]
async fn polling_follows_task_to_completion_over_http() -> Result<()> {
    let task_reads = Arc::new(AtomicUsize::new(0));
    let reads = Arc::clone(&task_reads);
    let server = MockServer::start(move |request| match request.path.as_str() {
        "/tasks/5" => {
            let status = match reads.fetch_add(1, Ordering::SeqCst) {
                0 => "pending",
                1 => "in_progress",
                _ => "completed",
            };
            (200, task_json(5, status).to_string())
        }
        "/tasks/5/posts" => (200, "[]".to_string()),
        "/analytics/5" => (
            200,
            json!({
                "total_posts": 0,
                "total_engagement": 0,
                "hashtag_counts": {"ai": 5, "tech": 3, "news": 3}
            })
            .to_string(),
        ),
        _ => (404, json!({"detail": "Not Found"}).to_string()),
    })?;

    let store = Arc::new(TaskStore::new(Arc::new(service_for(&server))));
    let mut controller = PollingController::new(Arc::clone(&store), Duration::from_millis(50));
    let mut states = controller.subscribe_state();

    controller.bind(TaskId(5));
    tokio::time::timeout(
        Duration::from_secs(10),
        states.wait_for(|state| matches!(state, PollState::Stopped { .. })),
    )
    .await
    .context("polling should stop within the timeout")??;

    assert_eq!(
        controller.state(),
        PollState::Stopped {
            task_id: TaskId(5),
            reason: StopReason::Terminal(TaskStatus::Completed),
        }
    );
    let snapshot = store.snapshot().context("snapshot should be present")?;
    assert_eq!(snapshot.task.status, TaskStatus::Completed);
    assert_eq!(snapshot.analytics.hashtag_counts.len(), 3);

    tokio::time::sleep(Duration::from_millis(300)).await;
    assert_eq!(server.count("/tasks/5"), 3);
    Ok(())
}
