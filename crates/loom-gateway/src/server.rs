//! HTTP surface: `POST /v1/agent/chat` streams protocol lines for one agent run.

use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use futures_util::stream::{self, StreamExt};
use loom_bridge::{BridgeOptions, CancellationToken, ClosingSource};
use loom_compositor::{spawn_source_stream, AgentEventSource, ResponseSession};
use serde_json::json;
use tokio::net::TcpListener;

use crate::{frame_line, AgentChatRequest, AgentRuntime, GatewayApiError, GatewayConfig};

pub const AGENT_CHAT_ENDPOINT: &str = "/v1/agent/chat";
pub const HEALTH_ENDPOINT: &str = "/healthz";
pub const EVENT_STREAM_CONTENT_TYPE: &str = "text/event-stream";

/// Shared state behind every request.
#[derive(Clone)]
pub struct GatewayState {
    runtime: Arc<dyn AgentRuntime>,
    config: Arc<GatewayConfig>,
    active_streams: Arc<AtomicUsize>,
}

impl GatewayState {
    pub fn new(config: GatewayConfig, runtime: Arc<dyn AgentRuntime>) -> Self {
        Self {
            runtime,
            config: Arc::new(config),
            active_streams: Arc::new(AtomicUsize::new(0)),
        }
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    /// Agent runs whose event source has not been closed yet.
    pub fn active_streams(&self) -> usize {
        self.active_streams.load(Ordering::SeqCst)
    }
}

pub fn build_gateway_router(state: GatewayState) -> Router {
    Router::new()
        .route(AGENT_CHAT_ENDPOINT, post(handle_agent_chat))
        .route(HEALTH_ENDPOINT, get(handle_health))
        .with_state(state)
}

/// Binds `config.gateway.bind` and serves until ctrl-c.
pub async fn run_gateway_server(
    config: GatewayConfig,
    runtime: Arc<dyn AgentRuntime>,
) -> Result<()> {
    config.validate().context("invalid gateway config")?;
    let bind_addr = config.bind_addr()?;
    let listener = TcpListener::bind(bind_addr)
        .await
        .with_context(|| format!("failed to bind gateway server on {bind_addr}"))?;
    let local_addr = listener
        .local_addr()
        .context("failed to resolve bound gateway address")?;
    serve_gateway(listener, local_addr, GatewayState::new(config, runtime)).await
}

async fn serve_gateway(
    listener: TcpListener,
    local_addr: SocketAddr,
    state: GatewayState,
) -> Result<()> {
    tracing::info!(
        addr = %local_addr,
        endpoint = AGENT_CHAT_ENDPOINT,
        "gateway server listening"
    );
    axum::serve(listener, build_gateway_router(state))
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await
        .context("gateway server exited unexpectedly")?;
    tracing::info!("gateway server stopped");
    Ok(())
}

async fn handle_health(State(state): State<GatewayState>) -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "active_streams": state.active_streams(),
    }))
}

async fn handle_agent_chat(State(state): State<GatewayState>, body: Bytes) -> Response {
    let request = match serde_json::from_slice::<AgentChatRequest>(&body) {
        Ok(request) => request,
        Err(error) => {
            return GatewayApiError::bad_request(
                "malformed_json",
                format!("failed to parse request body: {error}"),
            )
            .into_response();
        }
    };

    let iterator = match state.runtime.start(&request).await {
        Ok(iterator) => iterator,
        Err(error) => {
            tracing::warn!(%error, "agent runtime failed to start");
            return GatewayApiError::runtime_failure(&error).into_response();
        }
    };

    let label = request
        .conversation_id
        .clone()
        .unwrap_or_else(|| "agent-chat".to_string());
    tracing::info!(label = %label, multi_agent = request.multi_agent, "agent stream started");

    state.active_streams.fetch_add(1, Ordering::SeqCst);
    let active_streams = Arc::clone(&state.active_streams);
    let closer_label = label.clone();
    let source = ClosingSource::new(AgentEventSource::new(iterator), move || {
        active_streams.fetch_sub(1, Ordering::SeqCst);
        tracing::info!(label = %closer_label, "agent stream closed");
    });

    let session = ResponseSession::new(
        request.mode(),
        request.context,
        state.config.compositor.clone(),
    );
    let options = BridgeOptions::new(label).with_capacity(state.config.gateway.channel_capacity);
    let handle = spawn_source_stream(source, session, options, CancellationToken::new());
    let guard = CancelOnDrop(handle.token().clone());

    let done = state.config.gateway.done_message.clone();
    let frames = handle
        .into_stream()
        .chain(stream::iter(done))
        .map(move |line| {
            let _ = &guard;
            Ok::<Bytes, Infallible>(Bytes::from(frame_line(&line)))
        });

    (
        [
            (CONTENT_TYPE, EVENT_STREAM_CONTENT_TYPE),
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
        ],
        Body::from_stream(frames),
    )
        .into_response()
}

/// Cancels the producer when the response body is dropped, e.g. on disconnect.
struct CancelOnDrop(CancellationToken);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.cancel();
    }
}
