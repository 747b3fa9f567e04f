//! The gateway's seam to an agent runtime, plus a fixture-replaying runtime.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use loom_ai::{load_fixture, AgentEventIterator, RuntimeError};
use loom_compositor::{ConversationContext, ResponseMode};
use serde::{Deserialize, Serialize};

pub const DEFAULT_FIXTURE_NAME: &str = "default";

/// Body of `POST /v1/agent/chat`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AgentChatRequest {
    pub input: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub multi_agent: bool,
    #[serde(default)]
    pub context: ConversationContext,
}

impl AgentChatRequest {
    pub fn mode(&self) -> ResponseMode {
        if self.multi_agent {
            ResponseMode::MultiAgent
        } else {
            ResponseMode::SingleAgent
        }
    }
}

/// Starts one agent run and hands back its event iterator.
#[async_trait]
pub trait AgentRuntime: Send + Sync {
    async fn start(
        &self,
        request: &AgentChatRequest,
    ) -> Result<Box<dyn AgentEventIterator>, RuntimeError>;
}

/// Runtime that replays JSONL fixtures from a directory.
///
/// `<conversation_id>.jsonl` is served when present, else `default.jsonl`.
#[derive(Debug, Clone)]
pub struct ReplayRuntime {
    fixtures_dir: PathBuf,
    delay: Duration,
}

impl ReplayRuntime {
    pub fn new(fixtures_dir: impl Into<PathBuf>) -> Self {
        Self {
            fixtures_dir: fixtures_dir.into(),
            delay: Duration::ZERO,
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn fixtures_dir(&self) -> &Path {
        &self.fixtures_dir
    }

    pub fn fixture_path(&self, request: &AgentChatRequest) -> Option<PathBuf> {
        let named = request
            .conversation_id
            .as_deref()
            .filter(|id| is_safe_fixture_name(id))
            .map(|id| self.fixtures_dir.join(format!("{id}.jsonl")))
            .filter(|path| path.is_file());
        named.or_else(|| {
            let fallback = self
                .fixtures_dir
                .join(format!("{DEFAULT_FIXTURE_NAME}.jsonl"));
            fallback.is_file().then_some(fallback)
        })
    }
}

#[async_trait]
impl AgentRuntime for ReplayRuntime {
    async fn start(
        &self,
        request: &AgentChatRequest,
    ) -> Result<Box<dyn AgentEventIterator>, RuntimeError> {
        let path = self.fixture_path(request).ok_or_else(|| {
            RuntimeError::Unavailable(format!(
                "no replay fixture for conversation {:?} in {}",
                request.conversation_id,
                self.fixtures_dir.display()
            ))
        })?;
        tracing::debug!(fixture = %path.display(), "starting replay");
        let iterator =
            load_fixture(&path).map_err(|error| RuntimeError::Failed(error.to_string()))?;
        Ok(Box::new(iterator.with_delay(self.delay)))
    }
}

fn is_safe_fixture_name(id: &str) -> bool {
    !id.is_empty()
        && id
            .chars()
            .all(|ch| ch.is_ascii_alphanumeric() || matches!(ch, '-' | '_' | '.'))
        && !id.starts_with('.')
}
