//! Gateway tests grouped by endpoint behavior.
use super::*;
use std::net::SocketAddr;
use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use loom_ai::{
    event_channel, AgentEvent, AgentEventIterator, AgentEventSender, ChatFragment, RuntimeError,
};
use loom_bridge::CancellationToken;
use loom_compositor::{DEFAULT_FAILURE_MESSAGE, FAILURE_CODE};
use reqwest::Client;
use serde_json::{json, Value};
use tempfile::tempdir;
use tokio::net::TcpListener;
use tokio::sync::mpsc;

const SINGLE_TOOL_FIXTURE: &str = r#"
{"message":{"tool_calls":[{"id":"t1","name":"search"}]}}
{"stream":[{"tool_calls":[{"id":"t1","arguments":"{\"q\":"}]},{"tool_calls":[{"id":"t1","arguments":"\"x\"}"}],"finish_reason":"tool_calls"}]}
{"message":{"role":"tool","tool_call_id":"t1","tool_name":"search","content":"3 results"}}
{"message":{"content":"","finish_reason":"stop"}}
"#;

const FAILING_FIXTURE: &str = r#"
{"message":{"content":"hello"}}
{"error":"model overloaded"}
"#;

struct FailingRuntime;

#[async_trait]
impl AgentRuntime for FailingRuntime {
    async fn start(
        &self,
        _request: &AgentChatRequest,
    ) -> Result<Box<dyn AgentEventIterator>, RuntimeError> {
        Err(RuntimeError::Unavailable("model pool drained".to_string()))
    }
}

/// Hands out one channel-backed run and keeps the sender for the test.
#[derive(Default)]
struct ChannelRuntime {
    sender: Mutex<Option<AgentEventSender>>,
    requests: Mutex<Vec<AgentChatRequest>>,
}

#[async_trait]
impl AgentRuntime for ChannelRuntime {
    async fn start(
        &self,
        request: &AgentChatRequest,
    ) -> Result<Box<dyn AgentEventIterator>, RuntimeError> {
        let (sender, iterator) = event_channel(8);
        if let Ok(mut slot) = self.sender.lock() {
            *slot = Some(sender);
        }
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(request.clone());
        }
        Ok(Box::new(iterator))
    }
}

impl ChannelRuntime {
    fn take_sender(&self) -> AgentEventSender {
        self.sender
            .lock()
            .expect("sender lock")
            .take()
            .expect("run started")
    }
}

async fn spawn_test_server(
    config: GatewayConfig,
    runtime: Arc<dyn AgentRuntime>,
) -> Result<(SocketAddr, GatewayState, tokio::task::JoinHandle<()>)> {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .context("bind ephemeral listener")?;
    let addr = listener.local_addr().context("resolve listener addr")?;
    let state = GatewayState::new(config, runtime);
    let app = build_gateway_router(state.clone());
    let handle = tokio::spawn(async move {
        let _ = axum::serve(listener, app).await;
    });
    tokio::time::sleep(Duration::from_millis(20)).await;
    Ok((addr, state, handle))
}

fn write_fixture(dir: &Path, name: &str, body: &str) {
    std::fs::write(dir.join(format!("{name}.jsonl")), body).expect("write fixture");
}

fn replay_config(dir: &Path) -> GatewayConfig {
    let mut config = GatewayConfig::default();
    config.gateway.fixtures_dir = dir.to_path_buf();
    config
}

fn parse_frames(body: &str) -> Vec<Value> {
    body.split("\n\n")
        .filter(|frame| !frame.trim().is_empty())
        .map(|frame| {
            let payload = frame
                .strip_prefix("data:")
                .expect("frame carries data prefix")
                .trim();
            serde_json::from_str(payload).expect("frame payload is json")
        })
        .collect()
}

async fn wait_for_active_streams(state: &GatewayState, expected: usize) {
    for _ in 0..100 {
        if state.active_streams() == expected {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    assert_eq!(state.active_streams(), expected);
}

#[test]
fn unit_frame_line_appends_event_terminator() {
    assert_eq!(frame_line("data:{\"a\":1}\n"), "data:{\"a\":1}\n\n");
    assert_eq!(frame_line(""), "\n");
}

#[test]
fn unit_frame_line_wraps_error_lines_as_code_minus_one() {
    let frame = frame_line("error:bad \"quote\"");
    assert!(frame.starts_with("data: "));
    assert!(frame.ends_with("\n\n"));
    let value: Value = serde_json::from_str(frame["data: ".len()..].trim()).expect("json payload");
    assert_eq!(value, json!({"code": -1, "message": "bad \"quote\""}));
}

#[test]
fn unit_config_defaults_and_overrides() {
    let config = GatewayConfig::from_toml_str(
        r#"
[gateway]
bind = "0.0.0.0:9100"
channel_capacity = 4
done_message = "data: [DONE]"
replay_delay_ms = 5

[compositor]
handoff_tool_name = "delegate"
"#,
    )
    .expect("config parses");
    assert_eq!(config.gateway.channel_capacity, 4);
    assert_eq!(config.gateway.done_message.as_deref(), Some("data: [DONE]"));
    assert_eq!(config.bind_addr().expect("bind").port(), 9100);
    assert_eq!(config.compositor.handoff_tool_name, "delegate");
    assert_eq!(
        config.gateway.fixtures_dir,
        std::path::PathBuf::from(DEFAULT_FIXTURES_DIR)
    );
}

#[test]
fn regression_config_rejects_zero_capacity_and_bad_bind() {
    let error = GatewayConfig::from_toml_str("[gateway]\nchannel_capacity = 0\n")
        .expect_err("zero capacity rejected");
    assert!(error.to_string().contains("channel_capacity"));

    let error = GatewayConfig::from_toml_str("[gateway]\nbind = \"not-an-addr\"\n")
        .expect_err("bad bind rejected");
    assert!(matches!(error, ConfigError::Invalid(_)));

    let error = GatewayConfig::from_toml_str("[gateway\n").expect_err("bad toml rejected");
    assert!(matches!(error, ConfigError::Parse { .. }));
}

#[test]
fn unit_config_load_reads_file_and_reports_missing_path() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("loom.toml");
    std::fs::write(&path, "[gateway]\nreplay_delay_ms = 12\n").expect("write config");
    let config = GatewayConfig::load_or_default(Some(&path)).expect("config loads");
    assert_eq!(config.gateway.replay_delay_ms, 12);

    let missing = temp.path().join("missing.toml");
    let error = GatewayConfig::load(&missing).expect_err("missing file");
    assert!(matches!(error, ConfigError::Read { .. }));
    assert_eq!(
        GatewayConfig::load_or_default(None).expect("defaults"),
        GatewayConfig::default()
    );
}

#[test]
fn unit_replay_runtime_prefers_conversation_fixture_and_rejects_traversal() {
    let temp = tempdir().expect("tempdir");
    write_fixture(temp.path(), "default", SINGLE_TOOL_FIXTURE);
    write_fixture(temp.path(), "conv-7", FAILING_FIXTURE);
    let runtime = ReplayRuntime::new(temp.path());

    let mut request = AgentChatRequest {
        conversation_id: Some("conv-7".to_string()),
        ..AgentChatRequest::default()
    };
    assert_eq!(
        runtime.fixture_path(&request),
        Some(temp.path().join("conv-7.jsonl"))
    );

    request.conversation_id = Some("../conv-7".to_string());
    assert_eq!(
        runtime.fixture_path(&request),
        Some(temp.path().join("default.jsonl"))
    );

    request.conversation_id = None;
    assert_eq!(
        runtime.fixture_path(&request),
        Some(temp.path().join("default.jsonl"))
    );
}

#[tokio::test]
async fn unit_write_stream_writes_frames_and_done_message() {
    let (sender, receiver) = mpsc::channel(4);
    sender
        .send("data:{\"n\":1}\n".to_string())
        .await
        .expect("send");
    sender
        .send("error:overloaded".to_string())
        .await
        .expect("send");
    drop(sender);

    let mut output = Vec::new();
    let token = CancellationToken::new();
    let written = write_stream(
        receiver,
        &mut output,
        "unit",
        Some("data: [DONE]"),
        &token,
    )
    .await
    .expect("write succeeds");

    assert_eq!(written, 3);
    let text = String::from_utf8(output).expect("utf8");
    assert_eq!(
        text,
        "data:{\"n\":1}\n\ndata: {\"code\":-1,\"message\":\"overloaded\"}\n\ndata: [DONE]\n"
    );
    assert!(!token.is_cancelled());
}

struct BrokenWriter;

impl tokio::io::AsyncWrite for BrokenWriter {
    fn poll_write(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
        _buf: &[u8],
    ) -> std::task::Poll<std::io::Result<usize>> {
        std::task::Poll::Ready(Err(std::io::Error::new(
            std::io::ErrorKind::BrokenPipe,
            "client went away",
        )))
    }

    fn poll_flush(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }

    fn poll_shutdown(
        self: std::pin::Pin<&mut Self>,
        _cx: &mut std::task::Context<'_>,
    ) -> std::task::Poll<std::io::Result<()>> {
        std::task::Poll::Ready(Ok(()))
    }
}

#[tokio::test]
async fn regression_write_stream_cancels_token_on_write_failure() {
    let (sender, receiver) = mpsc::channel(1);
    sender.send("data:{}\n".to_string()).await.expect("send");
    let token = CancellationToken::new();
    let error = write_stream(receiver, &mut BrokenWriter, "broken", None, &token)
        .await
        .expect_err("write fails");
    assert_eq!(error.kind(), std::io::ErrorKind::BrokenPipe);
    assert!(token.is_cancelled());
}

#[tokio::test]
async fn unit_write_stream_returns_early_when_cancelled() {
    let (_sender, receiver) = mpsc::channel::<String>(1);
    let token = CancellationToken::new();
    token.cancel();
    let mut output = Vec::new();
    let written = write_stream(receiver, &mut output, "cancelled", Some("done"), &token)
        .await
        .expect("cancel is not an error");
    assert_eq!(written, 0);
    assert!(output.is_empty());
}

#[tokio::test]
async fn functional_agent_chat_streams_replayed_fixture() {
    let temp = tempdir().expect("tempdir");
    write_fixture(temp.path(), "default", SINGLE_TOOL_FIXTURE);
    let mut config = replay_config(temp.path());
    config.gateway.done_message = Some("data: [DONE]".to_string());
    let runtime = Arc::new(ReplayRuntime::new(temp.path()));
    let (addr, state, handle) = spawn_test_server(config, runtime)
        .await
        .expect("spawn server");

    let response = Client::new()
        .post(format!("http://{addr}{AGENT_CHAT_ENDPOINT}"))
        .json(&json!({"input": "find x"}))
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), reqwest::StatusCode::OK);
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|value| value.to_str().ok())
        .unwrap_or_default()
        .to_string();
    assert!(content_type.contains(EVENT_STREAM_CONTENT_TYPE));

    let body = response.text().await.expect("read body");
    let (frames, done) = body
        .rsplit_once("data: [DONE]")
        .map(|(frames, done)| (frames.to_string(), done.to_string()))
        .expect("done message present");
    assert_eq!(done, "\n");

    let values = parse_frames(&frames);
    assert_eq!(values.len(), 8);
    assert_eq!(values[0]["response"], "Tool: search");
    assert_eq!(values[1]["response"], "<tool>\n\n```arguments:\n");
    assert_eq!(values[2]["response"], "{\"q\":");
    assert_eq!(values[4]["response"], "\n```\n\n");
    assert_eq!(values[6]["response"], "</tool>");
    assert_eq!(values[7]["finish"], 1);
    assert!(values.iter().all(|value| value["code"] == 0));

    wait_for_active_streams(&state, 0).await;
    handle.abort();
}

#[tokio::test]
async fn functional_agent_chat_ends_with_failure_envelope_on_runtime_error() {
    let temp = tempdir().expect("tempdir");
    write_fixture(temp.path(), "default", FAILING_FIXTURE);
    let runtime = Arc::new(ReplayRuntime::new(temp.path()));
    let (addr, _state, handle) = spawn_test_server(replay_config(temp.path()), runtime)
        .await
        .expect("spawn server");

    let body = Client::new()
        .post(format!("http://{addr}{AGENT_CHAT_ENDPOINT}"))
        .json(&json!({"input": "hi"}))
        .send()
        .await
        .expect("send request")
        .text()
        .await
        .expect("read body");

    let values = parse_frames(&body);
    assert_eq!(values.len(), 2);
    assert_eq!(values[0]["response"], "hello");
    assert_eq!(values[1]["code"], FAILURE_CODE);
    assert_eq!(values[1]["message"], DEFAULT_FAILURE_MESSAGE);
    assert_eq!(values[1]["finish"], 1);
    handle.abort();
}

#[tokio::test]
async fn regression_compositor_failures_never_use_error_line_framing() {
    let temp = tempdir().expect("tempdir");
    write_fixture(temp.path(), "default", FAILING_FIXTURE);
    let runtime = Arc::new(ReplayRuntime::new(temp.path()));
    let (addr, _state, handle) = spawn_test_server(replay_config(temp.path()), runtime)
        .await
        .expect("spawn server");

    let body = Client::new()
        .post(format!("http://{addr}{AGENT_CHAT_ENDPOINT}"))
        .json(&json!({"input": "hi", "multi_agent": true}))
        .send()
        .await
        .expect("send request")
        .text()
        .await
        .expect("read body");

    assert!(!body.contains("data: {\"code\":-1"), "body: {body}");
    let values = parse_frames(&body);
    let last = values.last().expect("failure frame");
    assert_eq!(last["code"], FAILURE_CODE);
    assert_ne!(last["code"], -1);
    handle.abort();
}

#[tokio::test]
async fn regression_agent_chat_rejects_malformed_json() {
    let temp = tempdir().expect("tempdir");
    let runtime = Arc::new(ReplayRuntime::new(temp.path()));
    let (addr, _state, handle) = spawn_test_server(replay_config(temp.path()), runtime)
        .await
        .expect("spawn server");

    let response = Client::new()
        .post(format!("http://{addr}{AGENT_CHAT_ENDPOINT}"))
        .body("{not json")
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_REQUEST);
    let payload: Value = response.json().await.expect("json error");
    assert_eq!(payload["error"]["type"], "invalid_request_error");
    assert_eq!(payload["error"]["code"], "malformed_json");
    handle.abort();
}

#[tokio::test]
async fn regression_agent_chat_maps_runtime_start_failure_to_bad_gateway() {
    let (addr, state, handle) = spawn_test_server(GatewayConfig::default(), Arc::new(FailingRuntime))
        .await
        .expect("spawn server");

    let response = Client::new()
        .post(format!("http://{addr}{AGENT_CHAT_ENDPOINT}"))
        .json(&json!({"input": "hi"}))
        .send()
        .await
        .expect("send request");
    assert_eq!(response.status(), reqwest::StatusCode::BAD_GATEWAY);
    let payload: Value = response.json().await.expect("json error");
    assert_eq!(payload["error"]["type"], "server_error");
    assert_eq!(payload["error"]["code"], "agent_runtime_error");
    assert!(payload["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("model pool drained"));
    assert_eq!(state.active_streams(), 0);
    handle.abort();
}

#[tokio::test]
async fn integration_healthz_tracks_in_flight_streams() {
    let runtime = Arc::new(ChannelRuntime::default());
    let (addr, state, handle) = spawn_test_server(GatewayConfig::default(), runtime.clone())
        .await
        .expect("spawn server");
    let client = Client::new();

    let health: Value = client
        .get(format!("http://{addr}{HEALTH_ENDPOINT}"))
        .send()
        .await
        .expect("health request")
        .json()
        .await
        .expect("health json");
    assert_eq!(health, json!({"status": "ok", "active_streams": 0}));

    let response = client
        .post(format!("http://{addr}{AGENT_CHAT_ENDPOINT}"))
        .json(&json!({"input": "hi", "conversation_id": "c-1", "multi_agent": true}))
        .send()
        .await
        .expect("send request");
    let sender = runtime.take_sender();
    assert!(
        sender
            .send(AgentEvent::Message(ChatFragment::assistant_text("first")))
            .await
    );

    let mut body = response.bytes_stream();
    let chunk = body
        .next()
        .await
        .expect("first chunk")
        .expect("chunk bytes");
    assert!(String::from_utf8_lossy(&chunk).contains("first"));

    let health: Value = client
        .get(format!("http://{addr}{HEALTH_ENDPOINT}"))
        .send()
        .await
        .expect("health request")
        .json()
        .await
        .expect("health json");
    assert_eq!(health["active_streams"], 1);

    drop(sender);
    while body.next().await.is_some() {}
    wait_for_active_streams(&state, 0).await;

    let requests = runtime.requests.lock().expect("requests lock");
    assert_eq!(requests.len(), 1);
    assert!(requests[0].multi_agent);
    assert_eq!(requests[0].conversation_id.as_deref(), Some("c-1"));
    handle.abort();
}
