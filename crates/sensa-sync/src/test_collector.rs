//! In-process collector for transport, auth and engine tests.
//!
//! Serves `POST /api/login`, `POST /api/devices/` and
//! `POST /api/measurements/` on `127.0.0.1:0`. Replies can be scripted per
//! endpoint, otherwise the collector behaves like a healthy server that
//! accepts `alice` / `secret`.
//!
//! [`truncated_reply_url`] is a raw TCP server for replies axum cannot
//! produce: a status line followed by a body shorter than announced.

use std::collections::VecDeque;
use std::io::Read;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use axum::body::Bytes;
use axum::extract::State;
use axum::http::{HeaderMap, HeaderValue, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::Router;
use flate2::read::GzDecoder;
use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use url::Url;

use crate::payload::UploadPayload;
use crate::transport::endpoint;

pub(crate) const LOGIN: &str = "alice";
pub(crate) const PASSWORD: &str = "secret";

/// A scripted reply.
#[derive(Debug, Clone)]
pub(crate) enum Reply {
    /// Status code, empty body.
    Status(u16),
    /// Status code with a JSON body.
    Json(u16, String),
}

impl Reply {
    fn into_response(self) -> Response {
        match self {
            Reply::Status(code) => status(code).into_response(),
            Reply::Json(code, body) => (status(code), [("content-type", "application/json")], body).into_response(),
        }
    }
}

fn status(code: u16) -> StatusCode {
    StatusCode::from_u16(code).unwrap()
}

/// One received upload.
#[derive(Debug, Clone)]
pub(crate) struct RecordedUpload {
    pub authorization: Option<String>,
    pub content_type: Option<String>,
    pub gzipped: bool,
    pub payload: UploadPayload,
}

#[derive(Default)]
struct CollectorState {
    logins: AtomicUsize,
    login_script: Mutex<VecDeque<Reply>>,
    registrations: Mutex<Vec<Value>>,
    register_script: Mutex<VecDeque<Reply>>,
    uploads: Mutex<Vec<RecordedUpload>>,
    upload_script: Mutex<VecDeque<Reply>>,
}

pub(crate) struct TestCollector {
    base: Url,
    state: Arc<CollectorState>,
}

impl TestCollector {
    pub async fn start() -> Self {
        let state = Arc::new(CollectorState::default());
        let app = Router::new()
            .route("/api/login", post(login))
            .route("/api/devices/", post(register))
            .route("/api/measurements/", post(upload))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        TestCollector {
            base: Url::parse(&format!("http://{addr}/api")).unwrap(),
            state,
        }
    }

    /// Collector base URL (`http://127.0.0.1:<port>/api`).
    pub fn base_url(&self) -> &Url {
        &self.base
    }

    pub fn url(&self, path: &str) -> Url {
        endpoint(&self.base, path).unwrap()
    }

    pub fn logins(&self) -> usize {
        self.state.logins.load(Ordering::SeqCst)
    }

    pub fn registrations(&self) -> Vec<Value> {
        self.state.registrations.lock().unwrap().clone()
    }

    pub fn uploads(&self) -> Vec<RecordedUpload> {
        self.state.uploads.lock().unwrap().clone()
    }

    pub fn script_logins(&self, replies: impl IntoIterator<Item = Reply>) {
        self.state.login_script.lock().unwrap().extend(replies);
    }

    pub fn script_registrations(&self, replies: impl IntoIterator<Item = Reply>) {
        self.state.register_script.lock().unwrap().extend(replies);
    }

    pub fn script_uploads(&self, replies: impl IntoIterator<Item = Reply>) {
        self.state.upload_script.lock().unwrap().extend(replies);
    }
}

/// A URL on a local port nobody listens on.
pub(crate) async fn unused_local_url() -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);
    Url::parse(&format!("http://{addr}/api/measurements/")).unwrap()
}

/// A URL whose server answers one request with `status_line`, a
/// `Content-Length` of 100 and a single body byte, then closes.
pub(crate) async fn truncated_reply_url(status_line: &'static str) -> Url {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        read_request(&mut socket).await;
        let reply = format!(
            "HTTP/1.1 {status_line}\r\nContent-Type: application/json\r\nContent-Length: 100\r\nConnection: close\r\n\r\n{{"
        );
        socket.write_all(reply.as_bytes()).await.unwrap();
        let _ = socket.shutdown().await;
    });
    Url::parse(&format!("http://{addr}/api/measurements/")).unwrap()
}

/// Reads one HTTP request (head plus `Content-Length` body).
async fn read_request(socket: &mut TcpStream) {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 8192];
    loop {
        let n = socket.read(&mut chunk).await.unwrap();
        if n == 0 {
            return;
        }
        buf.extend_from_slice(&chunk[..n]);

        if let Some(end) = buf.windows(4).position(|w| w == b"\r\n\r\n") {
            let head = String::from_utf8_lossy(&buf[..end]).to_lowercase();
            let body_len = head
                .lines()
                .find_map(|line| line.strip_prefix("content-length:"))
                .and_then(|v| v.trim().parse::<usize>().ok())
                .unwrap_or(0);
            if buf.len() >= end + 4 + body_len {
                return;
            }
        }
    }
}

async fn login(State(state): State<Arc<CollectorState>>, body: Bytes) -> Response {
    let n = state.logins.fetch_add(1, Ordering::SeqCst) + 1;
    if let Some(reply) = state.login_script.lock().unwrap().pop_front() {
        return reply.into_response();
    }

    let creds: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    if creds["login"] == LOGIN && creds["password"] == PASSWORD {
        let mut headers = HeaderMap::new();
        headers.insert(
            "authorization",
            HeaderValue::from_str(&format!("Bearer token-{n}")).unwrap(),
        );
        (StatusCode::OK, headers).into_response()
    } else {
        StatusCode::UNAUTHORIZED.into_response()
    }
}

async fn register(State(state): State<Arc<CollectorState>>, body: Bytes) -> Response {
    let device: Value = serde_json::from_slice(&body).unwrap_or(Value::Null);
    state.registrations.lock().unwrap().push(device);
    match state.register_script.lock().unwrap().pop_front() {
        Some(reply) => reply.into_response(),
        None => StatusCode::CREATED.into_response(),
    }
}

async fn upload(State(state): State<Arc<CollectorState>>, headers: HeaderMap, body: Bytes) -> Response {
    let header = |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    let gzipped = header("content-encoding").as_deref() == Some("gzip");

    let json = if gzipped {
        let mut out = Vec::new();
        GzDecoder::new(&body[..]).read_to_end(&mut out).unwrap();
        out
    } else {
        body.to_vec()
    };
    let payload: UploadPayload = serde_json::from_slice(&json).unwrap();

    state.uploads.lock().unwrap().push(RecordedUpload {
        authorization: header("authorization"),
        content_type: header("content-type"),
        gzipped,
        payload,
    });

    match state.upload_script.lock().unwrap().pop_front() {
        Some(reply) => reply.into_response(),
        None => StatusCode::CREATED.into_response(),
    }
}
