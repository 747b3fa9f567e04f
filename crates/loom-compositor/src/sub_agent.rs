//! Hand-off detection and sub-agent lifecycle for multi-agent responses.

use loom_ai::{ChatFragment, FinishReason, ToolCallDelta};
use loom_core::{current_unix_timestamp_ms, format_elapsed_ms, span_since_unix_ms};
use serde::{Deserialize, Serialize, Serializer};
use uuid::Uuid;

use crate::{CompositorConfig, ConversationContext};

/// Lifecycle status carried in `eventData.status` (1..=4 on the wire).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SubAgentStatus {
    Start,
    Processing,
    End,
    Fail,
}

impl SubAgentStatus {
    pub fn code(self) -> u8 {
        match self {
            Self::Start => 1,
            Self::Processing => 2,
            Self::End => 3,
            Self::Fail => 4,
        }
    }
}

impl Serialize for SubAgentStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(self.code())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubAgentEvent {
    pub status: SubAgentStatus,
    pub id: String,
    pub name: String,
    pub avatar: String,
    /// Formatted wall-clock time since hand-off; set on `End` only.
    pub elapsed: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSubAgent {
    pub id: String,
    pub name: String,
    pub avatar: String,
    pub started_ms: u64,
}

impl ActiveSubAgent {
    fn event(&self, status: SubAgentStatus) -> SubAgentEvent {
        SubAgentEvent {
            status,
            id: self.id.clone(),
            name: self.name.clone(),
            avatar: self.avatar.clone(),
            elapsed: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
enum HandoffState {
    #[default]
    Idle,
    Streaming {
        tool_id: String,
        buffer: String,
        started_ms: u64,
    },
}

/// What the session should do with a fragment in multi-agent mode.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Route {
    /// Consumed by the lifecycle tracker; nothing is emitted.
    Absorb,
    /// Emit one lifecycle envelope per event and nothing else.
    Events(Vec<SubAgentEvent>),
    /// The supervisor's exit result: emit its content as final main output.
    SupervisorExit,
    /// Run the fragment through the tool tracker and compositor.
    Compose,
}

#[derive(Debug, Deserialize)]
struct HandoffArguments {
    #[serde(default)]
    agent_name: String,
}

/// Parses `{"agent_name": "..."}`; `None` while the text is incomplete or the
/// name is missing.
pub fn parse_handoff_target(arguments: &str) -> Option<String> {
    let parsed = serde_json::from_str::<HandoffArguments>(arguments).ok()?;
    let name = parsed.agent_name.trim();
    (!name.is_empty()).then(|| name.to_string())
}

#[derive(Debug, Default)]
pub struct SubAgentTracker {
    handoff: HandoffState,
    active: Option<ActiveSubAgent>,
    exit_pending: bool,
}

impl SubAgentTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn active(&self) -> Option<&ActiveSubAgent> {
        self.active.as_ref()
    }

    pub fn is_handoff_streaming(&self) -> bool {
        matches!(self.handoff, HandoffState::Streaming { .. })
    }

    pub fn processing_event(&self) -> Option<SubAgentEvent> {
        self.active
            .as_ref()
            .map(|agent| agent.event(SubAgentStatus::Processing))
    }

    /// Ends the active sub-agent, if any, stamping its elapsed time.
    pub fn finish_active(&mut self) -> Option<SubAgentEvent> {
        let agent = self.active.take()?;
        let mut event = agent.event(SubAgentStatus::End);
        event.elapsed = Some(format_elapsed_ms(span_since_unix_ms(agent.started_ms)));
        tracing::debug!(agent = %agent.name, id = %agent.id, "sub-agent finished");
        Some(event)
    }

    pub fn route(
        &mut self,
        fragment: &ChatFragment,
        context: &ConversationContext,
        config: &CompositorConfig,
    ) -> Route {
        let handoff_name = config.handoff_tool_name.as_str();
        let exit_name = config.exit_tool_name.as_str();

        if let HandoffState::Streaming {
            tool_id, buffer, ..
        } = &mut self.handoff
        {
            for call in &fragment.tool_calls {
                if belongs_to_handoff(call, tool_id, handoff_name) {
                    buffer.push_str(&call.arguments);
                } else {
                    tracing::debug!(
                        tool = %call.name,
                        id = %call.id,
                        "absorbing tool call while hand-off streams"
                    );
                }
            }
            return match fragment.finish_reason {
                Some(FinishReason::ToolCalls) => self.resolve_handoff(context, config),
                Some(FinishReason::Stop) => {
                    tracing::warn!("response stopped before hand-off arguments completed");
                    let mut events = vec![self.fail_event(config)];
                    events.extend(self.finish_active());
                    Route::Events(events)
                }
                _ => Route::Absorb,
            };
        }

        if fragment.is_result_of(handoff_name) {
            return Route::Absorb;
        }

        if let Some(call) = fragment
            .tool_calls
            .iter()
            .find(|call| call.name == handoff_name)
        {
            let arguments = fragment
                .tool_calls
                .iter()
                .filter(|other| belongs_to_handoff(other, &call.id, handoff_name))
                .map(|other| other.arguments.as_str())
                .collect::<String>();
            self.handoff = HandoffState::Streaming {
                tool_id: call.id.clone(),
                buffer: arguments,
                started_ms: current_unix_timestamp_ms(),
            };
            tracing::debug!(id = %call.id, "hand-off detected");
            if fragment.finished_with(FinishReason::ToolCalls) {
                return self.resolve_handoff(context, config);
            }
            return Route::Absorb;
        }

        if self.active.is_some() {
            return Route::Compose;
        }

        if self.exit_pending {
            if fragment.is_result_of(exit_name) {
                self.exit_pending = false;
                return Route::SupervisorExit;
            }
            return Route::Absorb;
        }
        if fragment.is_result_of(exit_name) {
            return Route::SupervisorExit;
        }
        if fragment.tool_calls.iter().any(|call| call.name == exit_name) {
            tracing::debug!("supervisor exit requested");
            self.exit_pending = true;
            return Route::Absorb;
        }
        Route::Compose
    }

    fn resolve_handoff(
        &mut self,
        context: &ConversationContext,
        config: &CompositorConfig,
    ) -> Route {
        let HandoffState::Streaming {
            buffer, started_ms, ..
        } = std::mem::take(&mut self.handoff)
        else {
            return Route::Absorb;
        };
        let Some(name) = parse_handoff_target(&buffer) else {
            tracing::warn!(arguments = %buffer, "hand-off arguments did not name an agent");
            return self.fail_handoff(config);
        };
        if name == context.main_agent_name {
            tracing::debug!(agent = %name, "ignoring hand-off back to the supervisor");
            return Route::Absorb;
        }

        let mut events = Vec::new();
        if let Some(previous) = self.finish_active() {
            events.push(previous);
        }
        let agent = ActiveSubAgent {
            id: Uuid::new_v4().to_string(),
            avatar: context.avatar_for(&name, &config.default_avatar),
            name,
            started_ms,
        };
        tracing::debug!(agent = %agent.name, id = %agent.id, "sub-agent started");
        events.push(agent.event(SubAgentStatus::Start));
        self.active = Some(agent);
        Route::Events(events)
    }

    fn fail_handoff(&mut self, config: &CompositorConfig) -> Route {
        Route::Events(vec![self.fail_event(config)])
    }

    fn fail_event(&mut self, config: &CompositorConfig) -> SubAgentEvent {
        self.handoff = HandoffState::Idle;
        SubAgentEvent {
            status: SubAgentStatus::Fail,
            id: Uuid::new_v4().to_string(),
            name: String::new(),
            avatar: config.default_avatar.clone(),
            elapsed: None,
        }
    }
}

/// A delta continues the hand-off when it carries the hand-off's id, or no id
/// and no competing tool name.
fn belongs_to_handoff(call: &ToolCallDelta, tool_id: &str, handoff_name: &str) -> bool {
    match call.explicit_id() {
        Some(id) if id == tool_id => true,
        Some(_) => tool_id.is_empty() && (call.name.is_empty() || call.name == handoff_name),
        None => call.name.is_empty() || call.name == handoff_name,
    }
}
