//! Streaming agent event compositor.
//!
//! Turns the raw fragments of an agent run (narration tokens, streamed tool
//! calls, tool results, sub-agent hand-offs) into ordered, de-duplicated
//! protocol envelopes for a chat UI. [`ResponseSession`] owns all per-response
//! state; [`spawn_response_stream`] runs it behind the event bridge.

use thiserror::Error;

mod config;
mod content;
mod context;
mod envelope;
mod session;
mod stream;
mod sub_agent;
mod tool_steps;

pub use config::{
    CompositorConfig, DEFAULT_AGENT_AVATAR, DEFAULT_DEDUP_THRESHOLD_CHARS, DEFAULT_EXIT_TOOL_NAME,
    DEFAULT_FAILURE_MESSAGE, DEFAULT_HANDOFF_TOOL_NAME,
};
pub use content::{
    render_step, tool_name_header, tool_result_block, NarrationFilter, PARAMS_CLOSE_MARKER,
    PARAMS_OPEN_MARKER, TOOL_BLOCK_END, TOOL_BLOCK_START,
};
pub use context::{ConversationContext, KnowledgeHits, SubAgentProfile};
pub use envelope::{
    fragment_finishes, EventData, EventType, OutputEnvelope, FAILURE_CODE, LINE_PREFIX,
    SUCCESS_CODE, SUCCESS_MESSAGE,
};
pub use session::{ResponseMode, ResponseSession};
pub use stream::{
    spawn_response_stream, spawn_source_stream, AgentEventSource, MessageStreamSource,
};
pub use sub_agent::{
    parse_handoff_target, ActiveSubAgent, Route, SubAgentEvent, SubAgentStatus, SubAgentTracker,
};
pub use tool_steps::{PlannedStep, StepAction, ToolRecord, ToolStep, ToolStepTracker};

/// Enumerates supported `CompositorError` values.
#[derive(Debug, Error)]
pub enum CompositorError {
    #[error("invalid compositor config: {0}")]
    InvalidConfig(String),
    #[error("malformed fragment: {0}")]
    MalformedFragment(String),
    #[error("failed to serialize envelope: {0}")]
    Serialize(#[from] serde_json::Error),
}
