use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Enumerates supported `MessageRole` values.
pub enum MessageRole {
    System,
    User,
    #[default]
    Assistant,
    Tool,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
/// Why the model stopped producing the current message.
pub enum FinishReason {
    Stop,
    ToolCalls,
    Length,
    ContentFilter,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
/// One streamed piece of a tool call. Runtimes may omit `id` on continuation
/// chunks and may split `arguments` at arbitrary byte boundaries of the JSON.
pub struct ToolCallDelta {
    #[serde(default)]
    pub id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub index: Option<usize>,
    #[serde(default, alias = "function_name")]
    pub name: String,
    #[serde(default)]
    pub arguments: String,
}

impl ToolCallDelta {
    pub fn new(id: impl Into<String>, name: impl Into<String>, arguments: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            index: None,
            name: name.into(),
            arguments: arguments.into(),
        }
    }

    pub fn with_index(mut self, index: usize) -> Self {
        self.index = Some(index);
        self
    }

    /// Returns the call id when the runtime supplied a non-empty one.
    pub fn explicit_id(&self) -> Option<&str> {
        non_empty(&self.id)
    }
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
/// Token counters reported by the runtime.
pub struct ChatUsage {
    #[serde(default)]
    pub prompt_tokens: u64,
    #[serde(default)]
    pub completion_tokens: u64,
    #[serde(default)]
    pub total_tokens: u64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
/// One unit pulled from the runtime: narration text, a tool-call piece, or a
/// tool result.
///
/// # Examples
///
/// ```
/// use loom_ai::{ChatFragment, FinishReason, ToolCallDelta};
///
/// let fragment = ChatFragment::tool_calls(vec![ToolCallDelta::new("t1", "search", "{}")])
///     .with_finish(FinishReason::ToolCalls);
/// assert!(fragment.finished_with(FinishReason::ToolCalls));
/// assert!(!fragment.is_tool_result());
/// ```
pub struct ChatFragment {
    #[serde(default)]
    pub role: MessageRole,
    #[serde(default)]
    pub content: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tool_calls: Vec<ToolCallDelta>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_call_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub usage: Option<ChatUsage>,
}

impl ChatFragment {
    pub fn assistant_text(text: impl Into<String>) -> Self {
        Self {
            content: text.into(),
            ..Self::default()
        }
    }

    pub fn tool_calls(calls: Vec<ToolCallDelta>) -> Self {
        Self {
            tool_calls: calls,
            ..Self::default()
        }
    }

    pub fn tool_call(
        id: impl Into<String>,
        name: impl Into<String>,
        arguments: impl Into<String>,
    ) -> Self {
        Self::tool_calls(vec![ToolCallDelta::new(id, name, arguments)])
    }

    pub fn tool_result(
        tool_call_id: impl Into<String>,
        tool_name: impl Into<String>,
        content: impl Into<String>,
    ) -> Self {
        Self {
            role: MessageRole::Tool,
            content: content.into(),
            tool_call_id: Some(tool_call_id.into()),
            tool_name: Some(tool_name.into()),
            ..Self::default()
        }
    }

    pub fn with_finish(mut self, reason: FinishReason) -> Self {
        self.finish_reason = Some(reason);
        self
    }

    pub fn with_usage(mut self, usage: ChatUsage) -> Self {
        self.usage = Some(usage);
        self
    }

    pub fn finished_with(&self, reason: FinishReason) -> bool {
        self.finish_reason == Some(reason)
    }

    pub fn is_tool_result(&self) -> bool {
        self.role == MessageRole::Tool
    }

    /// Returns the id of the tool call this fragment answers, if non-empty.
    pub fn explicit_tool_call_id(&self) -> Option<&str> {
        self.tool_call_id.as_deref().and_then(non_empty)
    }

    pub fn tool_name_or_empty(&self) -> &str {
        self.tool_name.as_deref().unwrap_or_default()
    }

    /// Returns true when this is a tool result produced by the tool `name`.
    pub fn is_result_of(&self, name: &str) -> bool {
        self.is_tool_result() && self.tool_name.as_deref() == Some(name)
    }
}

fn non_empty(value: &str) -> Option<&str> {
    if value.is_empty() {
        None
    } else {
        Some(value)
    }
}
