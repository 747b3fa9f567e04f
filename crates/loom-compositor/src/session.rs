use loom_ai::{ChatFragment, FinishReason};
use serde::{Deserialize, Serialize};

use crate::content::{render_step, NarrationFilter};
use crate::envelope::fragment_finishes;
use crate::sub_agent::{Route, SubAgentStatus, SubAgentTracker};
use crate::tool_steps::ToolStepTracker;
use crate::{CompositorConfig, CompositorError, ConversationContext, OutputEnvelope};

/// Enumerates supported `ResponseMode` values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    #[default]
    SingleAgent,
    MultiAgent,
}

/// All compositor state for one response. Owned by exactly one producer.
///
/// # Examples
///
/// ```
/// use loom_ai::{ChatFragment, FinishReason};
/// use loom_compositor::{CompositorConfig, ConversationContext, ResponseMode, ResponseSession};
///
/// let mut session = ResponseSession::new(
///     ResponseMode::SingleAgent,
///     ConversationContext::default(),
///     CompositorConfig::default(),
/// );
/// let lines = session
///     .handle_lines(&ChatFragment::assistant_text("hello").with_finish(FinishReason::Stop))
///     .expect("compose");
/// assert_eq!(lines.len(), 1);
/// assert!(lines[0].starts_with("data:"));
/// ```
#[derive(Debug)]
pub struct ResponseSession {
    mode: ResponseMode,
    context: ConversationContext,
    config: CompositorConfig,
    tools: ToolStepTracker,
    narration: NarrationFilter,
    sub_agents: SubAgentTracker,
}

impl ResponseSession {
    pub fn new(mode: ResponseMode, context: ConversationContext, config: CompositorConfig) -> Self {
        Self {
            mode,
            narration: NarrationFilter::new(config.dedup_threshold_chars),
            context,
            config,
            tools: ToolStepTracker::new(),
            sub_agents: SubAgentTracker::new(),
        }
    }

    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub fn config(&self) -> &CompositorConfig {
        &self.config
    }

    pub fn tools(&self) -> &ToolStepTracker {
        &self.tools
    }

    pub fn sub_agents(&self) -> &SubAgentTracker {
        &self.sub_agents
    }

    /// Envelopes for one runtime fragment, in emission order. May be empty.
    pub fn handle(
        &mut self,
        fragment: &ChatFragment,
    ) -> Result<Vec<OutputEnvelope>, CompositorError> {
        if fragment.is_tool_result() && !fragment.tool_calls.is_empty() {
            return Err(CompositorError::MalformedFragment(
                "tool result fragment also carries tool calls".to_string(),
            ));
        }
        let envelopes = match self.mode {
            ResponseMode::SingleAgent => {
                let finish = fragment_finishes(fragment, &self.config.exit_tool_name);
                self.compose(fragment)
                    .into_iter()
                    .map(|piece| {
                        OutputEnvelope::content(piece, fragment, &self.context, None, finish)
                    })
                    .collect()
            }
            ResponseMode::MultiAgent => self.handle_multi_agent(fragment),
        };
        tracing::trace!(envelopes = envelopes.len(), "fragment composed");
        Ok(envelopes)
    }

    /// [`Self::handle`] serialized to protocol lines.
    pub fn handle_lines(&mut self, fragment: &ChatFragment) -> Result<Vec<String>, CompositorError> {
        self.handle(fragment)?
            .iter()
            .map(|envelope| envelope.to_line().map_err(CompositorError::from))
            .collect()
    }

    /// The canned failure line delivered when a response cannot complete.
    pub fn failure_line(&self) -> Result<String, CompositorError> {
        Ok(OutputEnvelope::failure(&self.config.failure_message).to_line()?)
    }

    fn handle_multi_agent(&mut self, fragment: &ChatFragment) -> Vec<OutputEnvelope> {
        match self
            .sub_agents
            .route(fragment, &self.context, &self.config)
        {
            Route::Absorb => Vec::new(),
            Route::Events(events) => {
                if events
                    .iter()
                    .any(|event| event.status == SubAgentStatus::Start)
                {
                    self.narration.reset(self.tools.len());
                }
                events
                    .iter()
                    .map(|event| OutputEnvelope::lifecycle(event, fragment, &self.context))
                    .collect()
            }
            Route::SupervisorExit => vec![OutputEnvelope::content(
                fragment.content.clone(),
                fragment,
                &self.context,
                None,
                true,
            )],
            Route::Compose => {
                let processing = self.sub_agents.processing_event();
                let finish =
                    processing.is_none() && fragment_finishes(fragment, &self.config.exit_tool_name);
                let mut envelopes = self
                    .compose(fragment)
                    .into_iter()
                    .map(|piece| {
                        OutputEnvelope::content(
                            piece,
                            fragment,
                            &self.context,
                            processing.as_ref(),
                            finish,
                        )
                    })
                    .collect::<Vec<_>>();
                if fragment.finished_with(FinishReason::Stop) {
                    if let Some(end) = self.sub_agents.finish_active() {
                        envelopes.push(OutputEnvelope::lifecycle(&end, fragment, &self.context));
                    }
                }
                envelopes
            }
        }
    }

    /// Text pieces for one fragment: rendered tool steps, or filtered narration.
    fn compose(&mut self, fragment: &ChatFragment) -> Vec<String> {
        let touches_tools = fragment.is_tool_result()
            || !fragment.tool_calls.is_empty()
            || fragment.finished_with(FinishReason::ToolCalls);
        if touches_tools {
            return self
                .tools
                .plan(fragment)
                .iter()
                .flat_map(|planned| render_step(&planned.action))
                .collect();
        }
        if self.tools.has_open_tool() {
            tracing::debug!("suppressing narration while a tool call is open");
            return Vec::new();
        }
        self.narration
            .filter(&fragment.content, self.tools.len())
            .into_iter()
            .collect()
    }
}
