use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use loom_ai::load_fixture;
use loom_bridge::{BridgeOptions, BridgeOutcome, CancellationToken};
use loom_compositor::{spawn_response_stream, ConversationContext, ResponseMode, ResponseSession};
use loom_gateway::{run_gateway_server, write_stream, GatewayConfig, ReplayRuntime};

use crate::cli_args::{Cli, Command, ReplayArgs, ServeArgs};

pub(crate) async fn run_cli(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Replay(args) => run_replay(args).await,
        Command::Serve(args) => run_serve(args).await,
    }
}

async fn run_replay(args: ReplayArgs) -> Result<()> {
    let config = GatewayConfig::load_or_default(args.config.as_deref())
        .context("failed to load config")?;
    let context = replay_context(args.context.as_deref(), args.supervisor.as_deref())?;
    let iterator = load_fixture(&args.fixture)
        .with_context(|| format!("failed to load fixture {}", args.fixture.display()))?;
    let mode = if args.multi_agent {
        ResponseMode::MultiAgent
    } else {
        ResponseMode::SingleAgent
    };

    let label = args.fixture.display().to_string();
    let session = ResponseSession::new(mode, context, config.compositor.clone());
    let options =
        BridgeOptions::new(label.clone()).with_capacity(config.gateway.channel_capacity);
    let handle = spawn_response_stream(
        Box::new(iterator),
        session,
        options,
        CancellationToken::new(),
    );
    let token = handle.token().clone();
    let (receiver, producer) = handle.into_parts();

    let mut stdout = tokio::io::stdout();
    let done_message = args.done_message.or(config.gateway.done_message);
    let written = write_stream(
        receiver,
        &mut stdout,
        &label,
        done_message.as_deref(),
        &token,
    )
    .await
    .context("failed to write protocol lines to stdout")?;
    let outcome = producer.await.context("replay producer task failed")?;
    tracing::info!(fixture = %label, written, ?outcome, "replay finished");

    match outcome {
        BridgeOutcome::Completed | BridgeOutcome::Cancelled => Ok(()),
        BridgeOutcome::Failed(message) => bail!("replay ended with failure: {message}"),
        BridgeOutcome::Panicked(message) => bail!("replay panicked: {message}"),
    }
}

async fn run_serve(args: ServeArgs) -> Result<()> {
    let mut config = GatewayConfig::load_or_default(args.config.as_deref())
        .context("failed to load config")?;
    apply_serve_overrides(&mut config, &args);
    config.validate().context("invalid gateway config")?;

    let runtime = ReplayRuntime::new(config.gateway.fixtures_dir.clone())
        .with_delay(Duration::from_millis(config.gateway.replay_delay_ms));
    tracing::info!(
        fixtures = %runtime.fixtures_dir().display(),
        "serving replay runtime"
    );
    run_gateway_server(config, Arc::new(runtime)).await
}

/// Flags win over file values.
pub(crate) fn apply_serve_overrides(config: &mut GatewayConfig, args: &ServeArgs) {
    if let Some(bind) = &args.bind {
        config.gateway.bind = bind.clone();
    }
    if let Some(fixtures) = &args.fixtures {
        config.gateway.fixtures_dir = fixtures.clone();
    }
    if let Some(delay) = args.replay_delay_ms {
        config.gateway.replay_delay_ms = delay;
    }
    if let Some(done) = &args.done_message {
        config.gateway.done_message = Some(done.clone());
    }
}

pub(crate) fn replay_context(
    path: Option<&Path>,
    supervisor: Option<&str>,
) -> Result<ConversationContext> {
    let mut context = match path {
        Some(path) => {
            let raw = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read context {}", path.display()))?;
            serde_json::from_str::<ConversationContext>(&raw)
                .with_context(|| format!("failed to parse context {}", path.display()))?
        }
        None => ConversationContext::default(),
    };
    if let Some(name) = supervisor {
        context.main_agent_name = name.to_string();
    }
    Ok(context)
}
