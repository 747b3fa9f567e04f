//! Agent-runtime boundary types consumed by the loom stream compositor.
//!
//! The runtime that drives models and tools lives outside this workspace; this
//! crate only describes what it hands over: chat fragments, agent events that
//! wrap either a single fragment or a stream of them, and the pull contracts
//! used to read both.
mod runtime;
mod scripted;
mod types;

pub use runtime::{
    event_channel, AgentEvent, AgentEventIterator, AgentEventSender, ChannelEventIterator,
    MessageStream, RuntimeError, StreamRecvError,
};
pub use scripted::{
    load_fixture, parse_fixture, FixtureError, ScriptedEvent, ScriptedEventIterator,
    ScriptedMessageStream,
};
pub use types::{ChatFragment, ChatUsage, FinishReason, MessageRole, ToolCallDelta};
