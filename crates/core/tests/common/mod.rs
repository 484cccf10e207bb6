//! In-process mock of the generation backend.
//!
//! Serves the HTTP and WebSocket endpoints the clients talk to, with
//! scripted responses, so the real `reqwest` / `tokio-tungstenite` clients
//! can be tested without infrastructure.

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use axum::extract::ws::{CloseFrame, Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Multipart, Path, Query, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// A recorded job submission.
#[derive(Debug, Clone, Default)]
pub struct RecordedSubmission {
    pub fields: HashMap<String, String>,
    pub file_name: Option<String>,
    pub file_len: usize,
    pub authorization: Option<String>,
}

/// Scripted reply of the status endpoint.
#[derive(Debug, Clone)]
pub enum StatusReply {
    Ok(Value),
    Error {
        status: StatusCode,
        retry_after: Option<u64>,
        detail: String,
    },
}

/// Scripted behavior of one realtime connection.
#[derive(Debug, Clone, Default)]
pub struct WsScript {
    pub frames: Vec<Value>,
    /// Close with this code after the frames; otherwise stay open.
    pub close_code: Option<u16>,
}

#[derive(Default)]
pub struct BackendState {
    pub submissions: Mutex<Vec<RecordedSubmission>>,
    pub statuses: Mutex<HashMap<String, VecDeque<StatusReply>>>,
    pub ws_scripts: Mutex<HashMap<String, WsScript>>,
    pub ws_tokens: Mutex<Vec<Option<String>>>,
    pub refresh_tokens: Mutex<Vec<String>>,
    next_task: Mutex<u32>,
}

/// A running mock backend.
pub struct MockBackend {
    pub base_url: String,
    pub state: Arc<BackendState>,
    handle: JoinHandle<()>,
}

impl MockBackend {
    pub async fn start() -> Self {
        let state = Arc::new(BackendState::default());
        let router = Router::new()
            .route("/api/v1/generate", post(submit))
            .route("/api/v1/generate/status/{task_id}", get(status))
            .route("/api/v1/auth/refresh", post(refresh))
            .route("/ws/generate/{task_id}", get(realtime))
            .with_state(Arc::clone(&state));

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let handle = tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            base_url: format!("http://{}", addr),
            state,
            handle,
        }
    }

    pub async fn push_status(&self, task_id: &str, reply: StatusReply) {
        self.state
            .statuses
            .lock()
            .await
            .entry(task_id.to_string())
            .or_default()
            .push_back(reply);
    }

    pub async fn script_ws(&self, task_id: &str, script: WsScript) {
        self.state
            .ws_scripts
            .lock()
            .await
            .insert(task_id.to_string(), script);
    }

    pub async fn submissions(&self) -> Vec<RecordedSubmission> {
        self.state.submissions.lock().await.clone()
    }

    pub async fn ws_tokens(&self) -> Vec<Option<String>> {
        self.state.ws_tokens.lock().await.clone()
    }
}

impl Drop for MockBackend {
    fn drop(&mut self) {
        self.handle.abort();
    }
}

async fn submit(
    State(state): State<Arc<BackendState>>,
    headers: HeaderMap,
    mut multipart: Multipart,
) -> Response {
    let mut submission = RecordedSubmission {
        authorization: headers
            .get(header::AUTHORIZATION)
            .and_then(|v| v.to_str().ok())
            .map(String::from),
        ..Default::default()
    };

    while let Ok(Some(field)) = multipart.next_field().await {
        let name = field.name().unwrap_or_default().to_string();
        if name == "schema_file" {
            submission.file_name = field.file_name().map(String::from);
            submission.file_len = field.bytes().await.map(|b| b.len()).unwrap_or(0);
        } else {
            let value = field.text().await.unwrap_or_default();
            submission.fields.insert(name, value);
        }
    }

    let reject = submission
        .fields
        .get("additional_prompt")
        .is_some_and(|p| p == "reject");
    state.submissions.lock().await.push(submission);

    if reject {
        return (
            StatusCode::UNPROCESSABLE_ENTITY,
            Json(json!({ "detail": "Pose mismatch detected in schema" })),
        )
            .into_response();
    }

    let mut next = state.next_task.lock().await;
    *next += 1;
    Json(json!({ "task_id": format!("srv-{}", *next) })).into_response()
}

async fn status(
    State(state): State<Arc<BackendState>>,
    Path(task_id): Path<String>,
) -> Response {
    let reply = state
        .statuses
        .lock()
        .await
        .get_mut(&task_id)
        .and_then(VecDeque::pop_front);

    match reply {
        Some(StatusReply::Ok(body)) => Json(body).into_response(),
        Some(StatusReply::Error {
            status,
            retry_after,
            detail,
        }) => {
            let mut response = (status, Json(json!({ "detail": detail }))).into_response();
            if let Some(secs) = retry_after {
                response
                    .headers_mut()
                    .insert(header::RETRY_AFTER, secs.to_string().parse().unwrap());
            }
            response
        }
        None => (
            StatusCode::NOT_FOUND,
            Json(json!({ "detail": "Task not found" })),
        )
            .into_response(),
    }
}

async fn refresh(State(state): State<Arc<BackendState>>, Json(body): Json<Value>) -> Response {
    let token = body["refresh_token"].as_str().unwrap_or_default().to_string();
    state.refresh_tokens.lock().await.push(token.clone());

    if token.starts_with("good") {
        Json(json!({
            "access_token": "fresh-access",
            "refresh_token": "good-rotated",
            "expires_in": 3600
        }))
        .into_response()
    } else {
        (
            StatusCode::UNAUTHORIZED,
            Json(json!({ "detail": "Invalid refresh token" })),
        )
            .into_response()
    }
}

async fn realtime(
    ws: WebSocketUpgrade,
    State(state): State<Arc<BackendState>>,
    Path(task_id): Path<String>,
    Query(params): Query<HashMap<String, String>>,
) -> Response {
    state
        .ws_tokens
        .lock()
        .await
        .push(params.get("token").cloned());
    let script = state
        .ws_scripts
        .lock()
        .await
        .remove(&task_id)
        .unwrap_or_default();

    ws.on_upgrade(move |socket| play(socket, script))
}

async fn play(mut socket: WebSocket, script: WsScript) {
    for frame in script.frames {
        if socket
            .send(Message::Text(frame.to_string().into()))
            .await
            .is_err()
        {
            return;
        }
    }

    if let Some(code) = script.close_code {
        let _ = socket
            .send(Message::Close(Some(CloseFrame {
                code,
                reason: "".into(),
            })))
            .await;
        return;
    }

    while let Some(Ok(message)) = socket.recv().await {
        if matches!(message, Message::Close(_)) {
            break;
        }
    }
}
