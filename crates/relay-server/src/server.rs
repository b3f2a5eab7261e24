//! Axum HTTP + WebSocket server.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use axum::extract::ws::{WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::get;
use axum::Router;
use futures::StreamExt;
use relay_core::ServerFrame;
use relay_store::MessageStore;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::ServerConfig;
use crate::error::ServerError;
use crate::health;
use crate::hub::Hub;
use crate::session;
use crate::shutdown::ShutdownCoordinator;

/// Shared state accessible from Axum handlers.
#[derive(Clone)]
pub struct AppState {
    pub hub: Hub,
    pub store: Arc<dyn MessageStore>,
    pub config: Arc<ServerConfig>,
    pub start_time: Instant,
}

impl AppState {
    pub fn new(hub: Hub, store: Arc<dyn MessageStore>, config: ServerConfig) -> Self {
        Self {
            hub,
            store,
            config: Arc::new(config),
            start_time: Instant::now(),
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .route("/history", get(history_handler))
        .route("/health", get(health_handler))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

/// Bind, spawn the hub and the HTTP server, and return a handle to them.
pub async fn start(config: ServerConfig, store: Arc<dyn MessageStore>) -> Result<ServerHandle, ServerError> {
    config.validate()?;

    let (hub, hub_task) = Hub::spawn(config.outbound_queue_capacity);

    let addr = config.bind_addr();
    let listener = TcpListener::bind(&addr)
        .await
        .map_err(|source| ServerError::Bind { addr, source })?;
    let local_addr = listener.local_addr()?;

    let router = build_router(AppState::new(hub.clone(), store, config));

    let shutdown = ShutdownCoordinator::new();
    let token = shutdown.token();
    let server = tokio::spawn(async move {
        let result = axum::serve(listener, router)
            .with_graceful_shutdown(async move { token.cancelled().await })
            .await;
        if let Err(e) = result {
            error!(error = %e, "server stopped with error");
        }
    });

    info!(addr = %local_addr, "relay server started");

    Ok(ServerHandle {
        addr: local_addr,
        hub,
        shutdown,
        server,
        hub_task,
    })
}

/// Handle returned by [`start`]. Keeps the server and hub tasks alive.
pub struct ServerHandle {
    addr: SocketAddr,
    hub: Hub,
    shutdown: ShutdownCoordinator,
    server: JoinHandle<()>,
    hub_task: JoinHandle<()>,
}

impl ServerHandle {
    /// Address the listener actually bound, useful with port 0.
    pub fn local_addr(&self) -> SocketAddr {
        self.addr
    }

    pub fn hub(&self) -> &Hub {
        &self.hub
    }

    /// Stop accepting connections and close every open session.
    pub fn shutdown(&self) {
        info!("shutting down");
        self.shutdown.shutdown();
        self.hub.close_all();
    }

    /// Wait for the server to stop, then for the hub loop to drain.
    pub async fn wait(self) {
        let Self {
            hub,
            shutdown,
            server,
            hub_task,
            ..
        } = self;
        drop(hub);
        shutdown.drain(vec![server, hub_task], None).await;
    }
}

/// WebSocket upgrade handler. Any origin is accepted.
async fn ws_handler(ws: WebSocketUpgrade, State(state): State<AppState>) -> impl IntoResponse {
    ws.max_message_size(state.config.max_message_size)
        .on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket(socket: WebSocket, state: AppState) {
    let (sink, stream) = socket.split();
    session::run_session(sink, stream, state.hub, state.store).await;
}

/// GET /history: most recent messages, oldest first.
async fn history_handler(State(state): State<AppState>) -> Response {
    match state.store.recent(state.config.history_limit).await {
        Ok(messages) => {
            let frames: Vec<ServerFrame> = messages.into_iter().map(ServerFrame::Chat).collect();
            Json(frames).into_response()
        }
        Err(e) => {
            error!(error = %e, "failed to load history");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({ "error": e.to_string() })),
            )
                .into_response()
        }
    }
}

/// GET /health: 200 while chat can be stored, 503 otherwise.
async fn health_handler(State(state): State<AppState>) -> Response {
    let health = health::health_check(state.start_time, &state.hub, state.store.as_ref()).await;
    let status = if health.is_healthy() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };
    (status, Json(health)).into_response()
}
