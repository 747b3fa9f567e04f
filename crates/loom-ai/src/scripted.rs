//! Scripted runtime doubles and the JSONL fixture format used by replays.

use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    AgentEvent, AgentEventIterator, ChatFragment, MessageStream, RuntimeError, StreamRecvError,
};

/// Enumerates supported `FixtureError` values.
#[derive(Debug, Error)]
pub enum FixtureError {
    #[error("failed to read fixture {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid fixture line {line}: {source}")]
    Parse {
        line: usize,
        #[source]
        source: serde_json::Error,
    },
}

/// One line of a JSONL fixture.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "snake_case")]
pub enum ScriptedEvent {
    Message(ChatFragment),
    Stream(Vec<ChatFragment>),
    StreamError {
        #[serde(default)]
        fragments: Vec<ChatFragment>,
        error: String,
    },
    Error(String),
}

impl ScriptedEvent {
    fn into_agent_event(self) -> AgentEvent {
        match self {
            Self::Message(fragment) => AgentEvent::Message(fragment),
            Self::Stream(fragments) => {
                AgentEvent::Stream(Box::new(ScriptedMessageStream::new(fragments)))
            }
            Self::StreamError { fragments, error } => AgentEvent::Stream(Box::new(
                ScriptedMessageStream::failing(fragments, error),
            )),
            Self::Error(message) => AgentEvent::Error(RuntimeError::Failed(message)),
        }
    }
}

/// Message stream that replays a fixed list of fragments, then `Eof` (or a
/// scripted failure).
#[derive(Debug)]
pub struct ScriptedMessageStream {
    fragments: VecDeque<ChatFragment>,
    failure: Option<String>,
    closed: Arc<AtomicBool>,
}

impl ScriptedMessageStream {
    pub fn new(fragments: Vec<ChatFragment>) -> Self {
        Self {
            fragments: fragments.into(),
            failure: None,
            closed: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn failing(fragments: Vec<ChatFragment>, error: impl Into<String>) -> Self {
        Self {
            failure: Some(error.into()),
            ..Self::new(fragments)
        }
    }

    /// Flag flipped by `close`; lets callers assert that the stream was released.
    pub fn closed_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.closed)
    }
}

#[async_trait]
impl MessageStream for ScriptedMessageStream {
    async fn recv(&mut self) -> Result<ChatFragment, StreamRecvError> {
        if let Some(fragment) = self.fragments.pop_front() {
            return Ok(fragment);
        }
        match self.failure.take() {
            Some(message) => Err(StreamRecvError::Failed(message)),
            None => Err(StreamRecvError::Eof),
        }
    }

    fn close(&mut self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// Agent-event iterator backed by an in-memory script.
#[derive(Debug, Default)]
pub struct ScriptedEventIterator {
    events: VecDeque<ScriptedEvent>,
    delay: Option<Duration>,
}

impl ScriptedEventIterator {
    pub fn new(events: Vec<ScriptedEvent>) -> Self {
        Self {
            events: events.into(),
            delay: None,
        }
    }

    /// Sleeps before yielding every event, simulating model latency.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = (!delay.is_zero()).then_some(delay);
        self
    }

    pub fn remaining(&self) -> usize {
        self.events.len()
    }
}

#[async_trait]
impl AgentEventIterator for ScriptedEventIterator {
    async fn next(&mut self) -> Option<AgentEvent> {
        let event = self.events.pop_front()?;
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        Some(event.into_agent_event())
    }
}

/// Parses JSONL fixture text. Blank lines and `#` comments are skipped.
pub fn parse_fixture(raw: &str) -> Result<Vec<ScriptedEvent>, FixtureError> {
    raw.lines()
        .enumerate()
        .filter(|(_, line)| {
            let trimmed = line.trim();
            !trimmed.is_empty() && !trimmed.starts_with('#')
        })
        .map(|(index, line)| {
            serde_json::from_str(line).map_err(|source| FixtureError::Parse {
                line: index + 1,
                source,
            })
        })
        .collect()
}

/// Reads a JSONL fixture file into a replayable iterator.
pub fn load_fixture(path: &Path) -> Result<ScriptedEventIterator, FixtureError> {
    let raw = std::fs::read_to_string(path).map_err(|source| FixtureError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(ScriptedEventIterator::new(parse_fixture(&raw)?))
}
