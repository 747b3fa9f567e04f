use std::path::{Path, PathBuf};

use loom_ai::load_fixture;
use loom_bridge::{BridgeOptions, BridgeOutcome, CancellationToken};
use loom_compositor::{
    spawn_response_stream, CompositorConfig, ConversationContext, ResponseMode, ResponseSession,
    SubAgentProfile, LINE_PREFIX, PARAMS_CLOSE_MARKER, PARAMS_OPEN_MARKER, TOOL_BLOCK_END,
};
use loom_gateway::{write_stream, AgentChatRequest, AgentRuntime, ReplayRuntime};
use serde_json::Value;

fn fixture_dir() -> PathBuf {
    Path::new(env!("CARGO_MANIFEST_DIR")).join("fixtures")
}

fn fixture_path(name: &str) -> PathBuf {
    fixture_dir().join(format!("{name}.jsonl"))
}

fn parse_line(line: &str) -> Value {
    assert!(line.starts_with(LINE_PREFIX), "unexpected line: {line}");
    serde_json::from_str(line[LINE_PREFIX.len()..].trim_end()).expect("line payload is json")
}

async fn replay(
    name: &str,
    mode: ResponseMode,
    context: ConversationContext,
) -> (Vec<Value>, BridgeOutcome) {
    let iterator = load_fixture(&fixture_path(name)).expect("fixture loads");
    let session = ResponseSession::new(mode, context, CompositorConfig::default());
    let (lines, outcome) = spawn_response_stream(
        Box::new(iterator),
        session,
        BridgeOptions::new(name),
        CancellationToken::new(),
    )
    .collect()
    .await;
    (lines.iter().map(|line| parse_line(line)).collect(), outcome)
}

fn responses(values: &[Value]) -> Vec<&str> {
    values
        .iter()
        .map(|value| value["response"].as_str().unwrap_or_default())
        .collect()
}

#[tokio::test]
async fn integration_single_tool_fixture_dedups_narration_and_brackets_tool() {
    let (values, outcome) = replay(
        "single_tool",
        ResponseMode::SingleAgent,
        ConversationContext::default(),
    )
    .await;

    assert_eq!(outcome, BridgeOutcome::Completed);
    let texts = responses(&values);
    assert_eq!(texts.len(), 10);
    assert_eq!(&texts[..2], ["Let me look ", "that up."]);
    assert_eq!(texts[2], "Tool: web_search");
    assert_eq!(texts[3], PARAMS_OPEN_MARKER);
    assert_eq!(texts[4], "{\"query\":");
    assert_eq!(texts[5], "\"rust async\"}");
    assert_eq!(texts[6], PARAMS_CLOSE_MARKER);
    assert!(texts[7].contains("web_search result:"));
    assert!(texts[7].contains("2 hits"));
    assert_eq!(texts[8], TOOL_BLOCK_END);
    assert_eq!(texts[9], "Here is what I found.");

    let last = values.last().expect("final envelope");
    assert_eq!(last["finish"], 1);
    assert_eq!(last["usage"]["total_tokens"], 21);
    assert!(values[..9].iter().all(|value| value["finish"] == 0));
    assert!(values.iter().all(|value| value["eventType"] == 0));
}

#[tokio::test]
async fn integration_concurrent_tools_close_first_block_before_second_opens() {
    let (values, outcome) = replay(
        "concurrent_tools",
        ResponseMode::SingleAgent,
        ConversationContext::default(),
    )
    .await;

    assert_eq!(outcome, BridgeOutcome::Completed);
    let texts = responses(&values);
    assert_eq!(
        texts[..8],
        [
            "Tool: weather",
            PARAMS_OPEN_MARKER,
            "{\"city\":\"Oslo\"}",
            PARAMS_CLOSE_MARKER,
            "Tool: clock",
            PARAMS_OPEN_MARKER,
            "{}",
            PARAMS_CLOSE_MARKER,
        ]
    );
    assert!(texts[8].contains("weather result:"));
    assert_eq!(texts[9], TOOL_BLOCK_END);
    assert!(texts[10].contains("clock result:"));
    assert_eq!(texts[11], TOOL_BLOCK_END);
    assert_eq!(texts[12], "");
    assert_eq!(values[12]["finish"], 1);
}

#[tokio::test]
async fn integration_handoff_fixture_wraps_sub_agent_tool_activity() {
    let context = ConversationContext::with_main_agent("router", "main-1").with_sub_agent(
        "writer",
        SubAgentProfile {
            avatar: Some("/icons/writer.png".to_string()),
            knowledge: None,
        },
    );
    let (values, outcome) = replay("handoff", ResponseMode::MultiAgent, context).await;

    assert_eq!(outcome, BridgeOutcome::Completed);
    assert_eq!(values.len(), 9);
    let statuses = values
        .iter()
        .map(|value| value["eventData"]["status"].as_u64().unwrap_or_default())
        .collect::<Vec<_>>();
    assert_eq!(statuses, [1, 2, 2, 2, 2, 2, 2, 2, 3]);
    assert!(values.iter().all(|value| value["eventType"] == 1));
    assert!(values.iter().all(|value| value["finish"] == 0));

    let id = &values[0]["eventData"]["id"];
    assert!(values.iter().all(|value| &value["eventData"]["id"] == id));
    assert!(values
        .iter()
        .all(|value| value["eventData"]["profile"] == "/icons/writer.png"));
    assert!(values
        .iter()
        .all(|value| value["eventData"]["parentId"] == "main-1"));
    assert_eq!(values[1]["response"], "Tool: outline");
    assert_eq!(values[7]["response"], "Draft ready.");
    assert!(values[8]["eventData"]["timeCost"].is_string());
}

#[tokio::test]
async fn integration_nested_stream_failure_keeps_run_alive() {
    let (values, outcome) = replay(
        "nested_failure",
        ResponseMode::SingleAgent,
        ConversationContext::default(),
    )
    .await;

    assert_eq!(outcome, BridgeOutcome::Completed);
    assert_eq!(responses(&values), ["partial ", "recovered"]);
    assert_eq!(values[1]["finish"], 1);
}

#[tokio::test]
async fn integration_replay_runtime_output_written_through_line_writer() {
    let runtime = ReplayRuntime::new(fixture_dir());
    let request = AgentChatRequest {
        input: "what time is it in Oslo?".to_string(),
        conversation_id: Some("concurrent_tools".to_string()),
        ..AgentChatRequest::default()
    };
    let iterator = runtime.start(&request).await.expect("replay starts");
    let session = ResponseSession::new(
        request.mode(),
        request.context.clone(),
        CompositorConfig::default(),
    );
    let handle = spawn_response_stream(
        iterator,
        session,
        BridgeOptions::new("writer-test").with_capacity(2),
        CancellationToken::new(),
    );
    let token = handle.token().clone();
    let (receiver, producer) = handle.into_parts();

    let mut output = Vec::new();
    let written = write_stream(receiver, &mut output, "writer-test", Some("data: [DONE]"), &token)
        .await
        .expect("write succeeds");
    assert_eq!(producer.await.expect("producer joins"), BridgeOutcome::Completed);

    assert_eq!(written, 14);
    let text = String::from_utf8(output).expect("utf8 output");
    let frames = text.split("\n\n").collect::<Vec<_>>();
    assert!(frames[..13].iter().all(|frame| frame.starts_with("data:{")));
    assert_eq!(frames[13], "data: [DONE]\n");
}

#[tokio::test]
async fn integration_replay_runtime_reports_missing_fixture() {
    let runtime = ReplayRuntime::new(fixture_dir().join("absent"));
    let error = match runtime.start(&AgentChatRequest::default()).await {
        Ok(_) => panic!("missing fixture must fail"),
        Err(error) => error,
    };
    assert!(error.to_string().contains("no replay fixture"));
}
