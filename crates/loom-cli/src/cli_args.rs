use std::path::PathBuf;

use clap::{ArgAction, Parser, Subcommand};

#[derive(Debug, Parser)]
#[command(
    name = "loom",
    about = "Streams agent runs as ordered chat protocol lines",
    version
)]
pub(crate) struct Cli {
    #[command(subcommand)]
    pub(crate) command: Command,
}

#[derive(Debug, Subcommand)]
pub(crate) enum Command {
    /// Replays a JSONL fixture and prints protocol lines to stdout.
    Replay(ReplayArgs),
    /// Runs the streaming HTTP gateway.
    Serve(ServeArgs),
}

#[derive(Debug, clap::Args)]
pub(crate) struct ReplayArgs {
    #[arg(help = "JSONL fixture with one scripted agent event per line")]
    pub(crate) fixture: PathBuf,

    #[arg(
        long = "multi-agent",
        env = "LOOM_MULTI_AGENT",
        default_value_t = false,
        action = ArgAction::Set,
        num_args = 0..=1,
        require_equals = true,
        default_missing_value = "true",
        help = "Track sub-agent hand-offs and wrap their output in lifecycle events"
    )]
    pub(crate) multi_agent: bool,

    #[arg(
        long,
        env = "LOOM_SUPERVISOR",
        help = "Supervisor agent name; a hand-off naming it never starts a sub-agent"
    )]
    pub(crate) supervisor: Option<String>,

    #[arg(
        long,
        env = "LOOM_CONTEXT",
        help = "JSON conversation context (knowledge hits, sub-agent directory)"
    )]
    pub(crate) context: Option<PathBuf>,

    #[arg(
        long,
        env = "LOOM_CONFIG",
        help = "TOML config file; only its [compositor] table is used by replay"
    )]
    pub(crate) config: Option<PathBuf>,

    #[arg(
        long = "done-message",
        env = "LOOM_DONE_MESSAGE",
        help = "Optional line written after the last envelope, e.g. 'data: [DONE]'"
    )]
    pub(crate) done_message: Option<String>,
}

#[derive(Debug, clap::Args)]
pub(crate) struct ServeArgs {
    #[arg(long, env = "LOOM_CONFIG", help = "TOML config file")]
    pub(crate) config: Option<PathBuf>,

    #[arg(
        long,
        env = "LOOM_BIND",
        help = "Socket address to listen on; overrides gateway.bind"
    )]
    pub(crate) bind: Option<String>,

    #[arg(
        long,
        env = "LOOM_FIXTURES",
        help = "Directory of replay fixtures; overrides gateway.fixtures_dir"
    )]
    pub(crate) fixtures: Option<PathBuf>,

    #[arg(
        long = "replay-delay-ms",
        env = "LOOM_REPLAY_DELAY_MS",
        help = "Delay before each replayed event; overrides gateway.replay_delay_ms"
    )]
    pub(crate) replay_delay_ms: Option<u64>,

    #[arg(
        long = "done-message",
        env = "LOOM_DONE_MESSAGE",
        help = "Line written after the last envelope; overrides gateway.done_message"
    )]
    pub(crate) done_message: Option<String>,
}
