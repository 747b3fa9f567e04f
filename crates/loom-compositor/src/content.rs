//! Rendering of tool steps into display text and the narration filter.

use crate::tool_steps::StepAction;

pub const TOOL_BLOCK_START: &str = "<tool>";
pub const TOOL_BLOCK_END: &str = "</tool>";
pub const PARAMS_OPEN_MARKER: &str = "<tool>\n\n```arguments:\n";
pub const PARAMS_CLOSE_MARKER: &str = "\n```\n\n";

pub fn tool_name_header(name: &str) -> String {
    format!("Tool: {name}")
}

pub fn tool_result_block(name: &str, content: &str) -> String {
    format!("\n\n```{name} result:\n {content} \n```\n\n")
}

/// Text pieces for one step, one envelope each.
pub fn render_step(action: &StepAction) -> Vec<String> {
    match action {
        StepAction::EmitName { name } => vec![tool_name_header(name)],
        StepAction::OpenParams => vec![PARAMS_OPEN_MARKER.to_string()],
        StepAction::StreamParams { chunk } => vec![chunk.clone()],
        StepAction::CloseParams => vec![PARAMS_CLOSE_MARKER.to_string()],
        StepAction::CloseResult { tool_name, content } => vec![
            tool_result_block(tool_name, content),
            TOOL_BLOCK_END.to_string(),
        ],
    }
}

/// Suppresses narration a model repeats verbatim right before it starts
/// calling tools.
///
/// Narration accumulates into a buffer. A later fragment longer than the
/// threshold that equals the buffer is swallowed, after which the buffer is
/// frozen and only that exact text keeps being swallowed.
#[derive(Debug, Clone, Default)]
pub struct NarrationFilter {
    threshold_chars: usize,
    buffer: String,
    frozen: Option<String>,
    tools_at_reset: usize,
}

impl NarrationFilter {
    pub fn new(threshold_chars: usize) -> Self {
        Self {
            threshold_chars,
            ..Self::default()
        }
    }

    /// Starts a fresh speaker turn. `tracked_tools` is the tracker size now;
    /// the filter is only armed until the tracker grows past it.
    pub fn reset(&mut self, tracked_tools: usize) {
        self.buffer.clear();
        self.frozen = None;
        self.tools_at_reset = tracked_tools;
    }

    pub fn buffered(&self) -> &str {
        &self.buffer
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    /// Returns the text to emit for `content`, or `None` to suppress it.
    pub fn filter(&mut self, content: &str, tracked_tools: usize) -> Option<String> {
        if tracked_tools > self.tools_at_reset {
            return Some(content.to_string());
        }
        if content.chars().count() > self.threshold_chars {
            let reference = self.frozen.as_deref().unwrap_or(&self.buffer);
            if reference == content {
                tracing::debug!(chars = content.chars().count(), "suppressing repeated narration");
                if self.frozen.is_none() {
                    self.frozen = Some(std::mem::take(&mut self.buffer));
                }
                return None;
            }
        }
        if self.frozen.is_none() {
            self.buffer.push_str(content);
        }
        Some(content.to_string())
    }
}
