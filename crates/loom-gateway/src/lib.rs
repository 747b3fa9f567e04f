//! Streaming HTTP gateway for the loom compositor.
//!
//! Starts an agent run per request, feeds it through a
//! [`loom_compositor::ResponseSession`] behind the event bridge and writes the
//! resulting protocol lines to the client as they are produced.
mod config;
mod line_writer;
mod runtime;
mod server;
mod types;

pub use config::{
    ConfigError, GatewayConfig, GatewaySettings, DEFAULT_CHANNEL_CAPACITY, DEFAULT_FIXTURES_DIR,
    DEFAULT_GATEWAY_BIND,
};
pub use line_writer::{frame_line, write_stream, ERROR_LINE_PREFIX};
pub use runtime::{AgentChatRequest, AgentRuntime, ReplayRuntime, DEFAULT_FIXTURE_NAME};
pub use server::{
    build_gateway_router, run_gateway_server, GatewayState, AGENT_CHAT_ENDPOINT,
    EVENT_STREAM_CONTENT_TYPE, HEALTH_ENDPOINT,
};
pub use types::GatewayApiError;

#[cfg(test)]
mod tests;
