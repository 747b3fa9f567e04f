use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::Arc;

use futures_util::FutureExt;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::ReceiverStream;

use crate::{BoxedSource, CancellationToken, Pull, PullSource, Pulled};

pub const DEFAULT_BRIDGE_CAPACITY: usize = 128;

/// Failure raised by the transformation callback. Always terminal for the run.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransformError {
    pub message: String,
}

impl TransformError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

type FailureItemFn<O> = Arc<dyn Fn(&str) -> O + Send + Sync>;

/// Tuning and terminal-item policy for one bridge run.
pub struct BridgeOptions<O> {
    pub label: String,
    pub capacity: usize,
    failure_item: Option<FailureItemFn<O>>,
}

impl<O> BridgeOptions<O> {
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            capacity: DEFAULT_BRIDGE_CAPACITY,
            failure_item: None,
        }
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity.max(1);
        self
    }

    /// Item delivered before the channel closes when the run fails in a
    /// user-visible way. Receives the failure message.
    pub fn with_failure_item(mut self, build: impl Fn(&str) -> O + Send + Sync + 'static) -> Self {
        self.failure_item = Some(Arc::new(build));
        self
    }
}

impl<O> Default for BridgeOptions<O> {
    fn default() -> Self {
        Self::new("bridge")
    }
}

/// How a bridge run ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BridgeOutcome {
    Completed,
    Failed(String),
    Cancelled,
    Panicked(String),
}

/// Consumer side of a running bridge.
pub struct BridgeHandle<O> {
    receiver: mpsc::Receiver<O>,
    task: JoinHandle<BridgeOutcome>,
    token: CancellationToken,
}

impl<O: Send + 'static> BridgeHandle<O> {
    pub async fn recv(&mut self) -> Option<O> {
        self.receiver.recv().await
    }

    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    pub fn into_parts(self) -> (mpsc::Receiver<O>, JoinHandle<BridgeOutcome>) {
        (self.receiver, self.task)
    }

    /// Detaches the producer task and exposes the outputs as a stream.
    pub fn into_stream(self) -> ReceiverStream<O> {
        ReceiverStream::new(self.receiver)
    }

    /// Drains every output, then waits for the producer to finish.
    pub async fn collect(mut self) -> (Vec<O>, BridgeOutcome) {
        let mut outputs = Vec::new();
        while let Some(output) = self.receiver.recv().await {
            outputs.push(output);
        }
        let outcome = match self.task.await {
            Ok(outcome) => outcome,
            Err(error) => BridgeOutcome::Panicked(error.to_string()),
        };
        (outputs, outcome)
    }
}

/// Spawns the producer task for `source` and returns the consumer handle.
///
/// `transform` maps one pulled item to zero or more outputs; an empty vector
/// is a legitimate "nothing to emit" and never ends the run. Cancelling
/// `token`, or dropping the handle's receiver, stops the producer at its next
/// suspension point.
pub fn spawn_bridge<T, O, S, F>(
    source: S,
    transform: F,
    options: BridgeOptions<O>,
    token: CancellationToken,
) -> BridgeHandle<O>
where
    T: Send + 'static,
    O: Send + 'static,
    S: PullSource<Pulled<T>> + 'static,
    F: FnMut(T) -> Result<Vec<O>, TransformError> + Send + 'static,
{
    let (sender, receiver) = mpsc::channel(options.capacity.max(1));
    let producer = Producer {
        sender,
        token: token.clone(),
        label: options.label,
        failure_item: options.failure_item,
    };
    let task = tokio::spawn(producer.run(Box::new(source), transform));
    BridgeHandle {
        receiver,
        task,
        token,
    }
}

struct Producer<O> {
    sender: mpsc::Sender<O>,
    token: CancellationToken,
    label: String,
    failure_item: Option<FailureItemFn<O>>,
}

impl<O: Send + 'static> Producer<O> {
    async fn run<T, F>(self, root: BoxedSource<T>, mut transform: F) -> BridgeOutcome
    where
        T: Send + 'static,
        F: FnMut(T) -> Result<Vec<O>, TransformError> + Send + 'static,
    {
        let mut stack = SourceStack::new(root);
        let outcome = self.drain(&mut stack, &mut transform).await;
        drop(stack);
        match &outcome {
            BridgeOutcome::Completed => tracing::debug!(label = %self.label, "bridge completed"),
            BridgeOutcome::Cancelled => tracing::debug!(label = %self.label, "bridge cancelled"),
            BridgeOutcome::Failed(message) => {
                tracing::error!(label = %self.label, error = %message, "bridge failed")
            }
            BridgeOutcome::Panicked(message) => {
                tracing::error!(label = %self.label, panic = %message, "bridge callback panicked")
            }
        }
        outcome
    }

    async fn drain<T, F>(&self, stack: &mut SourceStack<T>, transform: &mut F) -> BridgeOutcome
    where
        T: Send + 'static,
        F: FnMut(T) -> Result<Vec<O>, TransformError> + Send,
    {
        loop {
            let depth = stack.depth();
            let Some(source) = stack.top() else {
                return BridgeOutcome::Completed;
            };
            let pulled = tokio::select! {
                biased;
                _ = self.token.cancelled() => return BridgeOutcome::Cancelled,
                pulled = AssertUnwindSafe(source.pull()).catch_unwind() => pulled,
            };
            let pulled = match pulled {
                Ok(pulled) => pulled,
                Err(payload) => {
                    let message = panic_message(payload.as_ref());
                    return self.fail_with_panic(message).await;
                }
            };

            match pulled {
                Pull::Item(Pulled::Item(item)) => {
                    match catch_unwind(AssertUnwindSafe(|| transform(item))) {
                        Ok(Ok(outputs)) => {
                            for output in outputs {
                                if !self.deliver(output).await {
                                    return BridgeOutcome::Cancelled;
                                }
                            }
                        }
                        Ok(Err(error)) => {
                            self.deliver_failure(&error.message).await;
                            return BridgeOutcome::Failed(error.message);
                        }
                        Err(payload) => {
                            let message = panic_message(payload.as_ref());
                            return self.fail_with_panic(message).await;
                        }
                    }
                }
                Pull::Item(Pulled::Nested(nested)) => {
                    tracing::trace!(label = %self.label, depth = depth + 1, "draining nested source");
                    stack.push(nested);
                }
                Pull::End => stack.pop_and_close(),
                Pull::Error(error) if depth == 1 => {
                    if error.user_visible {
                        self.deliver_failure(&error.message).await;
                    }
                    return BridgeOutcome::Failed(error.message);
                }
                Pull::Error(error) => {
                    tracing::warn!(
                        label = %self.label,
                        depth,
                        error = %error.message,
                        "nested source failed; resuming outer source"
                    );
                    stack.pop_and_close();
                }
            }
        }
    }

    async fn deliver(&self, output: O) -> bool {
        tokio::select! {
            biased;
            _ = self.token.cancelled() => false,
            sent = self.sender.send(output) => {
                if sent.is_err() {
                    tracing::debug!(label = %self.label, "receiver dropped; cancelling producer");
                    self.token.cancel();
                    return false;
                }
                true
            }
        }
    }

    async fn deliver_failure(&self, message: &str) {
        if self.token.is_cancelled() {
            return;
        }
        if let Some(build) = &self.failure_item {
            let _ = self.deliver(build(message)).await;
        }
    }

    async fn fail_with_panic(&self, message: String) -> BridgeOutcome {
        self.deliver_failure(&message).await;
        BridgeOutcome::Panicked(message)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        return (*message).to_string();
    }
    if let Some(message) = payload.downcast_ref::<String>() {
        return message.clone();
    }
    "unknown panic".to_string()
}

/// Sources currently being drained, outermost first. Dropping the stack closes
/// whatever is left, innermost first.
struct SourceStack<T> {
    frames: Vec<BoxedSource<T>>,
}

impl<T> SourceStack<T> {
    fn new(root: BoxedSource<T>) -> Self {
        Self { frames: vec![root] }
    }

    fn depth(&self) -> usize {
        self.frames.len()
    }

    fn top(&mut self) -> Option<&mut BoxedSource<T>> {
        self.frames.last_mut()
    }

    fn push(&mut self, source: BoxedSource<T>) {
        self.frames.push(source);
    }

    fn pop_and_close(&mut self) {
        if let Some(mut source) = self.frames.pop() {
            source.close();
        }
    }
}

impl<T> Drop for SourceStack<T> {
    fn drop(&mut self) {
        while !self.frames.is_empty() {
            self.pop_and_close();
        }
    }
}
