use serde::{Deserialize, Serialize};

use crate::CompositorError;

pub const DEFAULT_DEDUP_THRESHOLD_CHARS: usize = 10;
pub const DEFAULT_HANDOFF_TOOL_NAME: &str = "transfer_to_agent";
pub const DEFAULT_EXIT_TOOL_NAME: &str = "exit";
pub const DEFAULT_AGENT_AVATAR: &str = "/v1/static/icon/agent-default-icon.png";
pub const DEFAULT_FAILURE_MESSAGE: &str =
    "The agent ran into a problem while responding. Please try again later.";

/// Tunables for one response compositor.
///
/// # Examples
///
/// ```
/// use loom_compositor::CompositorConfig;
///
/// let config = CompositorConfig {
///     dedup_threshold_chars: 24,
///     ..CompositorConfig::default()
/// };
/// assert_eq!(config.handoff_tool_name, "transfer_to_agent");
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Narration longer than this many Unicode scalars is checked for a repeat.
    pub dedup_threshold_chars: usize,
    pub handoff_tool_name: String,
    /// Tool whose result ends a supervisor turn.
    pub exit_tool_name: String,
    pub default_avatar: String,
    pub failure_message: String,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            dedup_threshold_chars: DEFAULT_DEDUP_THRESHOLD_CHARS,
            handoff_tool_name: DEFAULT_HANDOFF_TOOL_NAME.to_string(),
            exit_tool_name: DEFAULT_EXIT_TOOL_NAME.to_string(),
            default_avatar: DEFAULT_AGENT_AVATAR.to_string(),
            failure_message: DEFAULT_FAILURE_MESSAGE.to_string(),
        }
    }
}

impl CompositorConfig {
    pub fn validate(&self) -> Result<(), CompositorError> {
        if self.handoff_tool_name.trim().is_empty() {
            return Err(CompositorError::InvalidConfig(
                "handoff_tool_name must not be empty".to_string(),
            ));
        }
        if self.exit_tool_name.trim().is_empty() {
            return Err(CompositorError::InvalidConfig(
                "exit_tool_name must not be empty".to_string(),
            ));
        }
        if self.handoff_tool_name == self.exit_tool_name {
            return Err(CompositorError::InvalidConfig(format!(
                "handoff_tool_name and exit_tool_name must differ (both are '{}')",
                self.exit_tool_name
            )));
        }
        if self.failure_message.trim().is_empty() {
            return Err(CompositorError::InvalidConfig(
                "failure_message must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}
