use async_trait::async_trait;
use thiserror::Error;
use tokio::sync::mpsc;

use crate::ChatFragment;

/// Enumerates supported `RuntimeError` values.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RuntimeError {
    #[error("agent runtime failed: {0}")]
    Failed(String),
    #[error("agent runtime unavailable: {0}")]
    Unavailable(String),
}

/// Outcome of a failed `MessageStream::recv`. `Eof` is the normal end sentinel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StreamRecvError {
    #[error("end of message stream")]
    Eof,
    #[error("message stream failed: {0}")]
    Failed(String),
}

/// A streaming sub-message: the runtime produces one fragment per `recv`.
#[async_trait]
pub trait MessageStream: Send {
    async fn recv(&mut self) -> Result<ChatFragment, StreamRecvError>;

    /// Releases the underlying stream. Called once by whoever drains it.
    fn close(&mut self) {}
}

/// One event from the agent runtime.
pub enum AgentEvent {
    Message(ChatFragment),
    Stream(Box<dyn MessageStream>),
    Error(RuntimeError),
}

impl std::fmt::Debug for AgentEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Message(fragment) => f.debug_tuple("Message").field(fragment).finish(),
            Self::Stream(_) => f.write_str("Stream(..)"),
            Self::Error(error) => f.debug_tuple("Error").field(error).finish(),
        }
    }
}

/// Pull-based iterator over the events of one agent run. `None` ends the run.
#[async_trait]
pub trait AgentEventIterator: Send {
    async fn next(&mut self) -> Option<AgentEvent>;
}

/// Producer half of [`event_channel`].
#[derive(Debug, Clone)]
pub struct AgentEventSender {
    sender: mpsc::Sender<AgentEvent>,
}

impl AgentEventSender {
    /// Sends one event; returns false once the iterator side has been dropped.
    pub async fn send(&self, event: AgentEvent) -> bool {
        self.sender.send(event).await.is_ok()
    }

    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

/// Consumer half of [`event_channel`].
#[derive(Debug)]
pub struct ChannelEventIterator {
    receiver: mpsc::Receiver<AgentEvent>,
}

#[async_trait]
impl AgentEventIterator for ChannelEventIterator {
    async fn next(&mut self) -> Option<AgentEvent> {
        self.receiver.recv().await
    }
}

/// Creates a bounded sender/iterator pair so a runtime can publish events from
/// its own task. The iterator ends once every sender is dropped.
pub fn event_channel(capacity: usize) -> (AgentEventSender, ChannelEventIterator) {
    let (sender, receiver) = mpsc::channel(capacity.max(1));
    (
        AgentEventSender { sender },
        ChannelEventIterator { receiver },
    )
}
