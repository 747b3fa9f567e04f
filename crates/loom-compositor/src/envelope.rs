use loom_ai::{ChatFragment, ChatUsage, FinishReason};
use serde::{Serialize, Serializer};
use serde_json::Value;

use crate::{ConversationContext, SubAgentEvent, SubAgentStatus};

pub const SUCCESS_CODE: i32 = 0;
pub const FAILURE_CODE: i32 = 1;
pub const SUCCESS_MESSAGE: &str = "success";
/// Prefix of every protocol line.
pub const LINE_PREFIX: &str = "data:";

/// Enumerates supported `EventType` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EventType {
    #[default]
    Main,
    Sub,
}

impl Serialize for EventType {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(match self {
            Self::Main => 0,
            Self::Sub => 1,
        })
    }
}

/// Wire form of a [`SubAgentEvent`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EventData {
    pub status: SubAgentStatus,
    pub id: String,
    pub name: String,
    pub profile: String,
    #[serde(rename = "timeCost")]
    pub time_cost: String,
    #[serde(rename = "parentId")]
    pub parent_id: String,
}

impl EventData {
    pub fn from_event(event: &SubAgentEvent, context: &ConversationContext) -> Self {
        Self {
            status: event.status,
            id: event.id.clone(),
            name: event.name.clone(),
            profile: event.avatar.clone(),
            time_cost: event.elapsed.clone().unwrap_or_default(),
            parent_id: context.main_agent_id.clone(),
        }
    }
}

/// One protocol record.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputEnvelope {
    pub code: i32,
    pub message: String,
    pub response: String,
    #[serde(rename = "eventType")]
    pub event_type: EventType,
    #[serde(rename = "eventData")]
    pub event_data: Option<EventData>,
    pub gen_file_url_list: Vec<Value>,
    pub history: Vec<Value>,
    pub finish: u8,
    pub usage: ChatUsage,
    pub search_list: Vec<Value>,
    pub qa_type: u8,
}

impl OutputEnvelope {
    /// Envelope carrying one content piece. `event` tags sub-agent output.
    pub fn content(
        response: impl Into<String>,
        fragment: &ChatFragment,
        context: &ConversationContext,
        event: Option<&SubAgentEvent>,
        finish: bool,
    ) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: SUCCESS_MESSAGE.to_string(),
            response: response.into(),
            event_type: if event.is_some() {
                EventType::Sub
            } else {
                EventType::Main
            },
            event_data: event.map(|event| EventData::from_event(event, context)),
            gen_file_url_list: Vec::new(),
            history: Vec::new(),
            finish: u8::from(finish),
            usage: fragment.usage.unwrap_or_default(),
            search_list: context.citations(),
            qa_type: u8::from(context.has_knowledge()),
        }
    }

    /// Lifecycle-only envelope (start, end, fail) with the sub-agent's own
    /// citations.
    pub fn lifecycle(
        event: &SubAgentEvent,
        fragment: &ChatFragment,
        context: &ConversationContext,
    ) -> Self {
        Self {
            code: SUCCESS_CODE,
            message: SUCCESS_MESSAGE.to_string(),
            response: String::new(),
            event_type: EventType::Sub,
            event_data: Some(EventData::from_event(event, context)),
            gen_file_url_list: Vec::new(),
            history: Vec::new(),
            finish: 0,
            usage: fragment.usage.unwrap_or_default(),
            search_list: context.sub_agent_citations(&event.name),
            qa_type: 0,
        }
    }

    pub fn failure(message: &str) -> Self {
        Self {
            code: FAILURE_CODE,
            message: message.to_string(),
            response: message.to_string(),
            event_type: EventType::Main,
            event_data: None,
            gen_file_url_list: Vec::new(),
            history: Vec::new(),
            finish: 1,
            usage: ChatUsage::default(),
            search_list: Vec::new(),
            qa_type: 0,
        }
    }

    /// Serializes as `data:<json>\n`. serde_json leaves `<`, `>` and `&`
    /// unescaped, so tool markers survive verbatim.
    pub fn to_line(&self) -> Result<String, serde_json::Error> {
        Ok(format!("{LINE_PREFIX}{}\n", serde_json::to_string(self)?))
    }

    pub fn is_finished(&self) -> bool {
        self.finish == 1
    }
}

/// Finish flag for main-agent output: the model stopped, or the exit tool
/// answered.
pub fn fragment_finishes(fragment: &ChatFragment, exit_tool_name: &str) -> bool {
    fragment.finished_with(FinishReason::Stop) || fragment.is_result_of(exit_tool_name)
}
