use std::collections::VecDeque;

use async_trait::async_trait;
use thiserror::Error;

/// Failure reported by a source. `user_visible` asks the bridge to emit its
/// terminal failure item before closing the channel.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct PullError {
    pub message: String,
    pub user_visible: bool,
}

impl PullError {
    pub fn visible(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_visible: true,
        }
    }

    pub fn silent(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            user_visible: false,
        }
    }
}

/// Result of one pull.
#[derive(Debug)]
pub enum Pull<T> {
    Item(T),
    End,
    Error(PullError),
}

/// A pulled item: either a value for the transformation callback or a nested
/// source whose items are relayed onto the same output channel.
pub enum Pulled<T> {
    Item(T),
    Nested(BoxedSource<T>),
}

impl<T: std::fmt::Debug> std::fmt::Debug for Pulled<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Item(item) => f.debug_tuple("Item").field(item).finish(),
            Self::Nested(_) => f.write_str("Nested(..)"),
        }
    }
}

pub type BoxedSource<T> = Box<dyn PullSource<Pulled<T>>>;

/// Pull side of the bridge.
#[async_trait]
pub trait PullSource<T>: Send {
    async fn pull(&mut self) -> Pull<T>;

    /// Releases the source. The bridge calls this exactly once per source it
    /// owns, after the last pull.
    fn close(&mut self) {}
}

/// In-memory source yielding a fixed list of items, then `End`.
#[derive(Debug)]
pub struct VecSource<T> {
    items: VecDeque<T>,
}

impl<T> VecSource<T> {
    pub fn new(items: Vec<T>) -> Self {
        Self {
            items: items.into(),
        }
    }
}

#[async_trait]
impl<T: Send> PullSource<Pulled<T>> for VecSource<T> {
    async fn pull(&mut self) -> Pull<Pulled<T>> {
        match self.items.pop_front() {
            Some(item) => Pull::Item(Pulled::Item(item)),
            None => Pull::End,
        }
    }
}

/// Wraps a source with an extra caller-supplied closer that runs right after
/// the inner source is closed.
pub struct ClosingSource<S> {
    inner: S,
    closer: Option<Box<dyn FnOnce() + Send>>,
}

impl<S> ClosingSource<S> {
    pub fn new(inner: S, closer: impl FnOnce() + Send + 'static) -> Self {
        Self {
            inner,
            closer: Some(Box::new(closer)),
        }
    }
}

#[async_trait]
impl<T, S> PullSource<T> for ClosingSource<S>
where
    T: Send,
    S: PullSource<T>,
{
    async fn pull(&mut self) -> Pull<T> {
        self.inner.pull().await
    }

    fn close(&mut self) {
        self.inner.close();
        if let Some(closer) = self.closer.take() {
            closer();
        }
    }
}
