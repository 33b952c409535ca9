//! Gateway HTTP server and relay wiring.

use crate::backend::BackendClient;
use crate::channels::{to_chat_id, SessionClient, SessionState};
use crate::config::{self, Config};
use crate::relay::{Relay, RelayExit, SharedSessionState};
use anyhow::{Context, Result};
use axum::{
    body::Bytes,
    extract::State,
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::{mpsc, oneshot, RwLock};

const MISSING_FIELDS_ERROR: &str = "Número e mensagem são obrigatórios.";
const SEND_OK_STATUS: &str = "Mensagem enviada com sucesso!";
const SEND_FAILED_ERROR: &str = "Erro ao enviar mensagem via WhatsApp.";

/// Shared state for the HTTP handlers.
#[derive(Clone)]
pub struct GatewayState {
    pub client: Arc<dyn SessionClient>,
    pub session_state: SharedSessionState,
    /// Port actually bound (reported by the health endpoint).
    pub port: u16,
}

/// How the gateway stopped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunExit {
    /// Shutdown signal received; the session was closed.
    Shutdown,
    /// The session reported CONFLICT or UNPAIRED.
    SessionFatal(SessionState),
}

impl RunExit {
    pub fn exit_code(&self) -> i32 {
        match self {
            RunExit::Shutdown => 0,
            RunExit::SessionFatal(_) => 1,
        }
    }
}

#[derive(Debug, Deserialize)]
struct SendMessageRequest {
    #[serde(default)]
    number: serde_json::Value,
    #[serde(default)]
    message: serde_json::Value,
}

/// Text of a request field. Numbers are taken as written; empty strings count as missing.
fn field_text(value: &serde_json::Value) -> Option<String> {
    match value {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

pub fn router(state: GatewayState) -> Router {
    Router::new()
        .route("/", get(health_http))
        .route("/send-message", post(send_message_http))
        .with_state(state)
}

/// Run until SIGINT/SIGTERM or a fatal session state.
pub async fn run_gateway(config: Config, client: Arc<dyn SessionClient>) -> Result<RunExit> {
    run_gateway_until(config, client, shutdown_signal()).await
}

/// Connect the session, start the relay and the HTTP server, and run until `shutdown`
/// completes or the session becomes unusable. The session is closed before returning.
pub async fn run_gateway_until<F>(
    config: Config,
    client: Arc<dyn SessionClient>,
    shutdown: F,
) -> Result<RunExit>
where
    F: Future<Output = ()> + Send,
{
    let bind = config.gateway.bind.trim().to_string();
    if !config::is_loopback_bind(&bind) {
        log::warn!(
            "gateway bound to non-loopback address {}; /send-message has no authentication",
            bind
        );
    }

    let backend_url = config::resolve_backend_url(&config);
    if backend_url.is_none() {
        log::warn!("no backend URL configured (BACKEND_API_URL); every message will get the fallback reply");
    }
    let backend = BackendClient::new(backend_url, config.backend.timeout())
        .context("building backend HTTP client")?;

    let bind_addr = format!("{}:{}", bind, config.gateway.port);
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("binding to {}", bind_addr))?;
    let port = listener
        .local_addr()
        .map(|a| a.port())
        .unwrap_or(config.gateway.port);

    let (message_tx, message_rx) = mpsc::channel(64);
    let (state_tx, state_rx) = mpsc::channel(16);
    client.on_message(message_tx);
    client.on_state_change(state_tx);
    if let Err(e) = client.connect().await {
        let _ = client.close().await;
        return Err(e).context("connecting WhatsApp session");
    }
    log::info!("session connected");

    let session_state: SharedSessionState = Arc::new(RwLock::new(Some(SessionState::Connected)));
    let relay = Relay::new(client.clone(), backend, session_state.clone());
    let mut relay_task = tokio::spawn(relay.run(message_rx, state_rx));

    let app = router(GatewayState {
        client: client.clone(),
        session_state,
        port,
    });
    log::info!("gateway listening on {}:{}", bind, port);

    let (stop_tx, stop_rx) = oneshot::channel::<()>();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(async move {
                let _ = stop_rx.await;
            })
            .await
    });

    let outcome = tokio::select! {
        _ = shutdown => {
            log::info!("shutdown signal received, closing session");
            Ok(RunExit::Shutdown)
        }
        res = &mut relay_task => match res {
            Ok(RelayExit::SessionFatal(state)) => Ok(RunExit::SessionFatal(state)),
            Ok(RelayExit::StreamsClosed) => Err(anyhow::anyhow!("session event streams closed")),
            Err(e) => Err(anyhow::anyhow!("relay task failed: {}", e)),
        },
    };

    relay_task.abort();
    let _ = stop_tx.send(());
    match server.await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => log::warn!("gateway server error: {}", e),
        Err(e) => log::warn!("gateway server task failed: {}", e),
    }
    if let Err(e) = client.close().await {
        log::warn!("closing session failed: {}", e);
    }
    log::info!("gateway stopped");
    outcome
}

/// Future that completes when the process should shut down (SIGINT or SIGTERM).
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

/// POST /send-message: `{number, message}` → send through the session.
async fn send_message_http(
    State(state): State<GatewayState>,
    body: Bytes,
) -> (StatusCode, Json<serde_json::Value>) {
    let req: SendMessageRequest = match serde_json::from_slice(&body) {
        Ok(r) => r,
        Err(e) => {
            log::debug!("send-message: bad request body: {}", e);
            return missing_fields();
        }
    };
    let (number, message) = match (field_text(&req.number), field_text(&req.message)) {
        (Some(n), Some(m)) => (n, m),
        _ => return missing_fields(),
    };

    let chat_id = to_chat_id(&number);
    match state.client.send_text(&chat_id, &message).await {
        Ok(()) => {
            log::info!("send-message: sent to {}", chat_id);
            (StatusCode::OK, Json(json!({ "status": SEND_OK_STATUS })))
        }
        Err(e) => {
            log::error!("send-message: sending to {} failed: {}", chat_id, e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({ "error": SEND_FAILED_ERROR })),
            )
        }
    }
}

fn missing_fields() -> (StatusCode, Json<serde_json::Value>) {
    (
        StatusCode::BAD_REQUEST,
        Json(json!({ "error": MISSING_FIELDS_ERROR })),
    )
}

/// GET / returns a simple health JSON (for probes).
async fn health_http(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    let session = state
        .session_state
        .read()
        .await
        .as_ref()
        .map(|s| s.as_str().to_string());
    Json(json!({
        "runtime": "running",
        "session": session,
        "port": state.port,
    }))
}
