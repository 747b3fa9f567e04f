//! Per-response tool-call lifecycle tracking.
//!
//! Every tool call seen in a response gets one [`ToolRecord`]. Incoming
//! fragments are turned into [`PlannedStep`]s that only ever move a record
//! forward, so replayed fragments produce nothing and every parameter block is
//! closed before its result is shown.

use std::collections::HashMap;

use loom_ai::{ChatFragment, FinishReason, ToolCallDelta};

/// Lifecycle position of one tool call. Ordering follows the lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum ToolStep {
    NameEmitted,
    ParamsOpened,
    ParamsStreaming,
    ParamsClosed,
    ResultClosed,
}

impl ToolStep {
    pub fn params_open(self) -> bool {
        matches!(self, Self::ParamsOpened | Self::ParamsStreaming)
    }
}

/// Public struct `ToolRecord` used across loom-compositor components.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRecord {
    pub id: String,
    pub name: String,
    pub index: Option<usize>,
    pub step: ToolStep,
    /// Arrival sequence; unique and increasing within one response.
    pub order: u64,
}

/// What the compositor must render for one step.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StepAction {
    EmitName { name: String },
    OpenParams,
    StreamParams { chunk: String },
    CloseParams,
    CloseResult { tool_name: String, content: String },
}

impl StepAction {
    pub fn step(&self) -> ToolStep {
        match self {
            Self::EmitName { .. } => ToolStep::NameEmitted,
            Self::OpenParams => ToolStep::ParamsOpened,
            Self::StreamParams { .. } => ToolStep::ParamsStreaming,
            Self::CloseParams => ToolStep::ParamsClosed,
            Self::CloseResult { .. } => ToolStep::ResultClosed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlannedStep {
    pub tool_id: String,
    pub action: StepAction,
}

/// Tool records for one response plus the "current" call pointer.
///
/// `current_tool_id` is either `None` or a key of `records`.
#[derive(Debug, Default)]
pub struct ToolStepTracker {
    records: HashMap<String, ToolRecord>,
    current_tool_id: Option<String>,
    next_order: u64,
}

impl ToolStepTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn record(&self, id: &str) -> Option<&ToolRecord> {
        self.records.get(id)
    }

    pub fn current_tool_id(&self) -> Option<&str> {
        self.current_tool_id.as_deref()
    }

    /// True while any tracked call has not had its result shown.
    pub fn has_open_tool(&self) -> bool {
        self.records
            .values()
            .any(|record| record.step != ToolStep::ResultClosed)
    }

    pub fn records_by_order(&self) -> Vec<&ToolRecord> {
        let mut records = self.records.values().collect::<Vec<_>>();
        records.sort_by_key(|record| record.order);
        records
    }

    /// Resolves which call a tool-result fragment answers: the explicit id,
    /// else the oldest call still awaiting its result, else the current call.
    pub fn governing_result_id(&self, fragment: &ChatFragment) -> Option<String> {
        if let Some(id) = fragment.explicit_tool_call_id() {
            return Some(id.to_string());
        }
        if let Some(record) = self
            .records
            .values()
            .filter(|record| record.step != ToolStep::ResultClosed)
            .min_by_key(|record| record.order)
        {
            return Some(record.id.clone());
        }
        self.current_tool_id.clone()
    }

    /// Classifies `fragment` into the steps to render, in order.
    pub fn plan(&mut self, fragment: &ChatFragment) -> Vec<PlannedStep> {
        let mut planned = Vec::new();
        if fragment.is_tool_result() {
            self.plan_result(fragment, &mut planned);
            return planned;
        }

        for delta in &fragment.tool_calls {
            if delta.explicit_id().is_none() && delta.name.is_empty() && delta.arguments.is_empty()
            {
                continue;
            }
            let id = self
                .resolve_call_id(delta)
                .unwrap_or_else(|| self.synthetic_id());
            match self.records.get_mut(&id) {
                Some(record) => {
                    if record.name.is_empty() && !delta.name.is_empty() {
                        record.name = delta.name.clone();
                    }
                    if record.index.is_none() {
                        record.index = delta.index;
                    }
                }
                None => self.begin_record(&id, &delta.name, delta.index, &mut planned),
            }
            self.current_tool_id = Some(id.clone());
            if !delta.arguments.is_empty() {
                self.advance(
                    &id,
                    StepAction::StreamParams {
                        chunk: delta.arguments.clone(),
                    },
                    &mut planned,
                );
            }
        }

        if fragment.finished_with(FinishReason::ToolCalls) {
            self.close_open_blocks(&mut planned);
        }
        planned
    }

    fn plan_result(&mut self, fragment: &ChatFragment, planned: &mut Vec<PlannedStep>) {
        let id = self
            .governing_result_id(fragment)
            .unwrap_or_else(|| self.synthetic_id());
        let tool_name = fragment.tool_name_or_empty();
        if !self.records.contains_key(&id) {
            tracing::debug!(tool_id = %id, tool_name, "result for untracked tool call");
            self.begin_record(&id, tool_name, None, planned);
        }
        self.current_tool_id = Some(id.clone());

        let Some(record) = self.records.get(&id) else {
            return;
        };
        let params_open = record.step.params_open();
        let display_name = if tool_name.is_empty() {
            record.name.clone()
        } else {
            tool_name.to_string()
        };
        if params_open {
            self.advance(&id, StepAction::CloseParams, planned);
        }
        let shown = self.advance(
            &id,
            StepAction::CloseResult {
                tool_name: display_name,
                content: fragment.content.clone(),
            },
            planned,
        );
        if !shown {
            tracing::debug!(tool_id = %id, "dropping duplicate tool result");
        }
    }

    fn resolve_call_id(&self, delta: &ToolCallDelta) -> Option<String> {
        if let Some(id) = delta.explicit_id() {
            return Some(id.to_string());
        }
        if let Some(index) = delta.index {
            if let Some(record) = self
                .records
                .values()
                .filter(|record| record.index == Some(index) && record.step.params_open())
                .min_by_key(|record| record.order)
            {
                return Some(record.id.clone());
            }
        }
        let current = self
            .current_tool_id
            .as_deref()
            .and_then(|id| self.records.get(id))?;
        let same_index = delta.index.is_none() || current.index.is_none();
        let same_name = delta.name.is_empty() || delta.name == current.name;
        (current.step.params_open() && same_index && same_name).then(|| current.id.clone())
    }

    fn synthetic_id(&self) -> String {
        let mut order = self.next_order;
        loop {
            let id = format!("call_{order}");
            if !self.records.contains_key(&id) {
                return id;
            }
            order += 1;
        }
    }

    fn begin_record(
        &mut self,
        id: &str,
        name: &str,
        index: Option<usize>,
        planned: &mut Vec<PlannedStep>,
    ) {
        self.close_open_blocks(planned);
        let order = self.next_order;
        self.next_order += 1;
        self.records.insert(
            id.to_string(),
            ToolRecord {
                id: id.to_string(),
                name: name.to_string(),
                index,
                step: ToolStep::NameEmitted,
                order,
            },
        );
        if !name.is_empty() {
            planned.push(PlannedStep {
                tool_id: id.to_string(),
                action: StepAction::EmitName {
                    name: name.to_string(),
                },
            });
        }
        self.advance(id, StepAction::OpenParams, planned);
    }

    /// Closes every open parameter block, the current call first, then by
    /// arrival order.
    fn close_open_blocks(&mut self, planned: &mut Vec<PlannedStep>) {
        let current = self.current_tool_id.clone();
        let mut open = self
            .records
            .values()
            .filter(|record| record.step.params_open())
            .map(|record| (current.as_deref() != Some(record.id.as_str()), record.order, record.id.clone()))
            .collect::<Vec<_>>();
        open.sort();
        for (_, _, id) in open {
            self.advance(&id, StepAction::CloseParams, planned);
        }
    }

    fn advance(&mut self, id: &str, action: StepAction, planned: &mut Vec<PlannedStep>) -> bool {
        let Some(record) = self.records.get_mut(id) else {
            return false;
        };
        let target = action.step();
        let repeatable = target == ToolStep::ParamsStreaming && record.step == target;
        if record.step >= target && !repeatable {
            tracing::debug!(tool_id = id, from = ?record.step, to = ?target, "ignoring non-advancing tool step");
            return false;
        }
        record.step = target;
        planned.push(PlannedStep {
            tool_id: id.to_string(),
            action,
        });
        true
    }
}
