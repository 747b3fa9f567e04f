//! Adapters that feed an agent run through the bridge and a [`ResponseSession`].

use async_trait::async_trait;
use loom_ai::{AgentEvent, AgentEventIterator, ChatFragment, MessageStream, StreamRecvError};
use loom_bridge::{
    spawn_bridge, BridgeHandle, BridgeOptions, CancellationToken, Pull, PullError, PullSource,
    Pulled, TransformError,
};

use crate::ResponseSession;

/// Root source over an agent run's event iterator.
pub struct AgentEventSource {
    iterator: Option<Box<dyn AgentEventIterator>>,
}

impl AgentEventSource {
    pub fn new(iterator: Box<dyn AgentEventIterator>) -> Self {
        Self {
            iterator: Some(iterator),
        }
    }
}

#[async_trait]
impl PullSource<Pulled<ChatFragment>> for AgentEventSource {
    async fn pull(&mut self) -> Pull<Pulled<ChatFragment>> {
        let Some(iterator) = self.iterator.as_mut() else {
            return Pull::End;
        };
        match iterator.next().await {
            None => Pull::End,
            Some(AgentEvent::Message(fragment)) => Pull::Item(Pulled::Item(fragment)),
            Some(AgentEvent::Stream(stream)) => {
                Pull::Item(Pulled::Nested(Box::new(MessageStreamSource::new(stream))))
            }
            Some(AgentEvent::Error(error)) => Pull::Error(PullError::visible(error.to_string())),
        }
    }

    fn close(&mut self) {
        if self.iterator.take().is_some() {
            tracing::trace!("agent event iterator released");
        }
    }
}

/// Nested source over one streaming sub-message.
pub struct MessageStreamSource {
    stream: Box<dyn MessageStream>,
}

impl MessageStreamSource {
    pub fn new(stream: Box<dyn MessageStream>) -> Self {
        Self { stream }
    }
}

#[async_trait]
impl PullSource<Pulled<ChatFragment>> for MessageStreamSource {
    async fn pull(&mut self) -> Pull<Pulled<ChatFragment>> {
        match self.stream.recv().await {
            Ok(fragment) => Pull::Item(Pulled::Item(fragment)),
            Err(StreamRecvError::Eof) => Pull::End,
            Err(error) => Pull::Error(PullError::visible(error.to_string())),
        }
    }

    fn close(&mut self) {
        self.stream.close();
    }
}

/// Streams protocol lines for one agent run.
///
/// The session is moved into the producer task. Runtime and composition
/// failures end the stream with the session's failure line; cancellation ends
/// it silently.
pub fn spawn_response_stream(
    iterator: Box<dyn AgentEventIterator>,
    session: ResponseSession,
    options: BridgeOptions<String>,
    token: CancellationToken,
) -> BridgeHandle<String> {
    spawn_source_stream(AgentEventSource::new(iterator), session, options, token)
}

/// [`spawn_response_stream`] over any fragment source.
pub fn spawn_source_stream<S>(
    source: S,
    mut session: ResponseSession,
    options: BridgeOptions<String>,
    token: CancellationToken,
) -> BridgeHandle<String>
where
    S: PullSource<Pulled<ChatFragment>> + 'static,
{
    let failure_line = match session.failure_line() {
        Ok(line) => line,
        Err(error) => {
            tracing::error!(%error, "failed to render failure line");
            String::new()
        }
    };
    let options = options.with_failure_item(move |_| failure_line.clone());
    spawn_bridge(
        source,
        move |fragment: ChatFragment| {
            session
                .handle_lines(&fragment)
                .map_err(|error| TransformError::new(error.to_string()))
        },
        options,
        token,
    )
}
