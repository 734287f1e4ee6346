//! In-process workspace server used by the SDK tests

#![allow(dead_code)]

use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::sse::{Event, Sse};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, BoxStream, StreamExt};
use serde::Deserialize;
use serde_json::{json, Value};
use tokio::net::TcpListener;
use workspace_sdk::{ClientConfig, WorkspaceClient};

/// Sandbox id the mock server reports as missing
pub const MISSING_SANDBOX: &str = "missing";

/// Observations made by the mock server
#[derive(Default)]
pub struct MockState {
    pub stream_dropped: AtomicBool,
    pub resize_calls: AtomicUsize,
    pub delete_calls: AtomicUsize,
    pub inbound_frames: AtomicUsize,
    pub last_signal: AtomicI32,
    pub sandbox_polls: AtomicUsize,
    ptys: Mutex<HashMap<String, Option<String>>>,
    next_pty: AtomicUsize,
}

impl MockState {
    pub fn open_ptys(&self) -> usize {
        self.ptys.lock().unwrap().len()
    }
}

pub struct MockServer {
    pub addr: SocketAddr,
    pub state: Arc<MockState>,
}

impl MockServer {
    /// Bind to an ephemeral port and serve on the current runtime
    pub async fn start() -> Self {
        let state = Arc::new(MockState::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let app = router(state.clone());
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self { addr, state }
    }

    pub fn url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn config(&self) -> ClientConfig {
        ClientConfig::new(self.url())
            .with_api_key("test-key")
            .with_timeout_grace(Duration::from_millis(200))
    }

    pub fn client(&self) -> WorkspaceClient {
        WorkspaceClient::with_config(self.config()).unwrap()
    }
}

fn router(state: Arc<MockState>) -> Router {
    Router::new()
        .route("/api/v1/health", get(health))
        .route("/api/v1/sandboxes", get(list_sandboxes).post(create_sandbox))
        .route(
            "/api/v1/sandboxes/{id}",
            get(get_sandbox).delete(delete_sandbox),
        )
        .route("/api/v1/sandboxes/{id}/process/run", post(run_command))
        .route(
            "/api/v1/sandboxes/{id}/process/run/stream",
            get(run_command_stream),
        )
        .route("/api/v1/sandboxes/{id}/process/{pid}/kill", post(kill_process))
        .route("/api/v1/sandboxes/{id}/pty", post(create_pty))
        .route(
            "/api/v1/sandboxes/{id}/pty/{pty_id}",
            get(pty_websocket).delete(kill_pty),
        )
        .route("/api/v1/sandboxes/{id}/pty/{pty_id}/resize", post(resize_pty))
        .with_state(state)
}

fn error_response(status: StatusCode, code: u32, message: String) -> Response {
    (status, Json(json!({ "code": code, "message": message }))).into_response()
}

fn sandbox_not_found(id: &str) -> Response {
    error_response(
        StatusCode::NOT_FOUND,
        2001,
        format!("Sandbox not found: {}", id),
    )
}

fn pty_not_found(id: &str) -> Response {
    error_response(StatusCode::NOT_FOUND, 4101, format!("PTY not found: {}", id))
}

fn sandbox_json(id: &str, state: &str) -> Value {
    let error_message = (state == "error").then_some("image pull failed");
    json!({
        "id": id,
        "workspace_id": "ws-1",
        "template": "default",
        "state": state,
        "created_at": "2026-01-01T00:00:00Z",
        "updated_at": "2026-01-01T00:00:00Z",
        "error_message": error_message,
    })
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok", "version": "test" }))
}

#[derive(Deserialize)]
struct ListQuery {
    state: Option<String>,
}

async fn list_sandboxes(Query(query): Query<ListQuery>) -> Json<Value> {
    let all = [("sb-1", "running"), ("sb-2", "stopped"), ("sb-3", "running")];
    let sandboxes: Vec<Value> = all
        .iter()
        .filter(|(_, state)| query.state.as_deref().map_or(true, |wanted| wanted == *state))
        .map(|(id, state)| sandbox_json(id, state))
        .collect();
    Json(json!({ "sandboxes": sandboxes }))
}

async fn create_sandbox(Json(body): Json<Value>) -> Response {
    match body["template"].as_str() {
        Some("nope") => error_response(
            StatusCode::NOT_FOUND,
            2003,
            "Template not found: nope".to_string(),
        ),
        _ => Json(sandbox_json("sb-new", "starting")).into_response(),
    }
}

async fn get_sandbox(State(state): State<Arc<MockState>>, Path(id): Path<String>) -> Response {
    match id.as_str() {
        MISSING_SANDBOX => sandbox_not_found(&id),
        "booting" => {
            let polls = state.sandbox_polls.fetch_add(1, Ordering::SeqCst);
            let current = if polls < 2 { "starting" } else { "running" };
            Json(sandbox_json(&id, current)).into_response()
        }
        "broken" => Json(sandbox_json(&id, "error")).into_response(),
        _ => Json(sandbox_json(&id, "running")).into_response(),
    }
}

async fn delete_sandbox(Path(id): Path<String>) -> Response {
    if id == MISSING_SANDBOX {
        return sandbox_not_found(&id);
    }
    Json(json!({ "success": true })).into_response()
}

#[derive(Debug, Deserialize)]
struct RunRequest {
    command: String,
    #[serde(default)]
    args: Vec<String>,
    #[serde(default)]
    env: HashMap<String, String>,
}

fn result(exit_code: i32, stdout: impl Into<String>, stderr: impl Into<String>) -> Response {
    Json(json!({
        "exit_code": exit_code,
        "stdout": stdout.into(),
        "stderr": stderr.into(),
    }))
    .into_response()
}

async fn run_command(Path(id): Path<String>, Json(req): Json<RunRequest>) -> Response {
    if id == MISSING_SANDBOX {
        return sandbox_not_found(&id);
    }

    let first = req.args.first().cloned().unwrap_or_default();
    match req.command.as_str() {
        "exit" => result(first.parse().unwrap_or(0), "", ""),
        "echo" => result(0, format!("{}\n", req.args.join(" ")), ""),
        "hostname" => result(0, format!("{}\n", id), ""),
        "printenv" => result(0, req.env.get(&first).cloned().unwrap_or_default(), ""),
        "bash" => result(0, req.args.get(1).cloned().unwrap_or_default(), ""),
        "sleep" => {
            let secs: f64 = first.parse().unwrap_or(1.0);
            tokio::time::sleep(Duration::from_secs_f64(secs)).await;
            result(0, "", "")
        }
        "false" => result(1, "", "failed\n"),
        "crash" => (StatusCode::INTERNAL_SERVER_ERROR, "agent crashed").into_response(),
        "denied" => error_response(
            StatusCode::FORBIDDEN,
            3003,
            "Permission denied: /root".to_string(),
        ),
        other => result(127, "", format!("{}: command not found\n", other)),
    }
}

/// Sets its flag when the response stream is dropped
struct DropFlag(Arc<MockState>);

impl Drop for DropFlag {
    fn drop(&mut self) {
        self.0.stream_dropped.store(true, Ordering::SeqCst);
    }
}

fn data_event(kind: &str, payload: Value) -> Result<Event, Infallible> {
    Ok(Event::default().event(kind).data(payload.to_string()))
}

async fn run_command_stream(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    if id == MISSING_SANDBOX {
        return sandbox_not_found(&id);
    }

    let command = query.get("command").cloned().unwrap_or_default();
    let args: Vec<String> = query
        .get("args")
        .and_then(|a| serde_json::from_str(a).ok())
        .unwrap_or_default();
    let count: usize = args.first().and_then(|n| n.parse().ok()).unwrap_or(3);

    let events: BoxStream<'static, Result<Event, Infallible>> = match command.as_str() {
        "count" => {
            let mut events = vec![Ok(Event::default().comment("keep-alive"))];
            for i in 0..count {
                events.push(data_event(
                    "stdout",
                    json!({ "type": "stdout", "data": format!("line {}\n", i) }),
                ));
            }
            events.push(data_event("stderr", json!({ "type": "stderr", "data": "done\n" })));
            events.push(data_event("exit", json!({ "type": "exit", "code": 0 })));
            stream::iter(events).boxed()
        }
        "progress" => stream::iter(vec![
            data_event("progress", json!({ "type": "progress", "percent": 50 })),
            data_event("stdout", json!({ "type": "stdout", "data": "ok\n" })),
            data_event("exit", json!({ "type": "exit", "code": 3 })),
        ])
        .boxed(),
        "fail" => stream::iter(vec![data_event(
            "error",
            json!({ "type": "error", "message": "agent disconnected" }),
        )])
        .boxed(),
        "truncated" => stream::iter(vec![data_event(
            "stdout",
            json!({ "type": "stdout", "data": "partial" }),
        )])
        .boxed(),
        "garbage" => stream::iter(vec![Ok(Event::default().data("{not json"))]).boxed(),
        "forever" => {
            let guard = DropFlag(state.clone());
            stream::unfold((guard, 0u64), |(guard, i)| async move {
                tokio::time::sleep(Duration::from_millis(20)).await;
                let event = data_event("stdout", json!({ "type": "stdout", "data": format!("tick {}\n", i) }));
                Some((event, (guard, i + 1)))
            })
            .boxed()
        }
        _ => stream::iter(vec![data_event("exit", json!({ "type": "exit", "code": 127 }))]).boxed(),
    };

    Sse::new(events).into_response()
}

#[derive(Deserialize)]
struct KillRequest {
    signal: i32,
}

async fn kill_process(
    State(state): State<Arc<MockState>>,
    Path((id, pid)): Path<(String, u32)>,
    Json(req): Json<KillRequest>,
) -> Response {
    if id == MISSING_SANDBOX {
        return sandbox_not_found(&id);
    }
    if pid == 0 {
        return error_response(
            StatusCode::NOT_FOUND,
            4001,
            "Process not found: 0".to_string(),
        );
    }
    state.last_signal.store(req.signal, Ordering::SeqCst);
    Json(json!({ "success": true })).into_response()
}

#[derive(Deserialize)]
struct CreatePtyRequest {
    cols: u16,
    rows: u16,
    shell: Option<String>,
}

async fn create_pty(
    State(state): State<Arc<MockState>>,
    Path(id): Path<String>,
    Json(req): Json<CreatePtyRequest>,
) -> Response {
    if id == MISSING_SANDBOX {
        return sandbox_not_found(&id);
    }

    let pty_id = format!("pty-{}", state.next_pty.fetch_add(1, Ordering::SeqCst));
    state.ptys.lock().unwrap().insert(pty_id.clone(), req.shell);
    Json(json!({ "id": pty_id, "cols": req.cols, "rows": req.rows })).into_response()
}

async fn pty_websocket(
    State(state): State<Arc<MockState>>,
    Path((_id, pty_id)): Path<(String, String)>,
    ws: WebSocketUpgrade,
) -> Response {
    // The `detached` shell refuses the upgrade as if the PTY vanished
    let shell = match state.ptys.lock().unwrap().get(&pty_id) {
        Some(shell) if shell.as_deref() == Some("detached") => return pty_not_found(&pty_id),
        Some(shell) => shell.clone(),
        None => return pty_not_found(&pty_id),
    };
    ws.on_upgrade(move |socket| handle_pty_socket(socket, state, shell))
}

/// Echo terminal: replies to `ls\n` with a listing, echoes everything else.
///
/// The `banner` shell greets on connect, `hangup` closes right away.
async fn handle_pty_socket(mut socket: WebSocket, state: Arc<MockState>, shell: Option<String>) {
    match shell.as_deref() {
        Some("banner") => {
            if socket
                .send(Message::Binary("welcome\r\n".into()))
                .await
                .is_err()
            {
                return;
            }
        }
        Some("hangup") => {
            tokio::time::sleep(Duration::from_millis(50)).await;
            let _ = socket.send(Message::Close(None)).await;
            return;
        }
        _ => {}
    }

    while let Some(Ok(msg)) = socket.recv().await {
        let input = match msg {
            Message::Binary(data) => data,
            Message::Text(text) => text.as_str().as_bytes().to_vec().into(),
            Message::Close(_) => break,
            _ => continue,
        };
        state.inbound_frames.fetch_add(1, Ordering::SeqCst);

        let reply = if input.as_ref() == b"ls\n" {
            "README.md  src\r\n".into()
        } else {
            input
        };
        if socket.send(Message::Binary(reply)).await.is_err() {
            break;
        }
    }
}

#[derive(Deserialize)]
struct ResizeRequest {
    cols: u16,
    rows: u16,
}

async fn resize_pty(
    State(state): State<Arc<MockState>>,
    Path((_id, pty_id)): Path<(String, String)>,
    Json(req): Json<ResizeRequest>,
) -> Response {
    if !state.ptys.lock().unwrap().contains_key(&pty_id) {
        return pty_not_found(&pty_id);
    }
    state.resize_calls.fetch_add(1, Ordering::SeqCst);
    Json(json!({ "success": true, "cols": req.cols, "rows": req.rows })).into_response()
}

async fn kill_pty(
    State(state): State<Arc<MockState>>,
    Path((_id, pty_id)): Path<(String, String)>,
) -> Response {
    state.delete_calls.fetch_add(1, Ordering::SeqCst);
    if state.ptys.lock().unwrap().remove(&pty_id).is_none() {
        return pty_not_found(&pty_id);
    }
    Json(json!({ "success": true })).into_response()
}

/// Poll `check` until it holds or `timeout` elapses
pub async fn eventually(timeout: Duration, check: impl Fn() -> bool) -> bool {
    let deadline = tokio::time::Instant::now() + timeout;
    while tokio::time::Instant::now() < deadline {
        if check() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    check()
}
