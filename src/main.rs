mod console;
mod tools;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use chatwire_engine::{EngineError, RunnerConfig, SessionController, ToolRegistry, TurnOutcome, TurnRunner};
use chatwire_llm::{OpenAiCompatProvider, ProviderConfig};
use chatwire_settings::ChatwireSettings;
use chatwire_telemetry::{init_telemetry, parse_level, TelemetryConfig};

use crate::console::ConsoleStore;
use crate::tools::CurrentTimeTool;

/// Stream one chat completion from an OpenAI-compatible gateway.
#[derive(Debug, Parser)]
#[command(name = "chatwire", version)]
struct Cli {
    /// Model id to request.
    #[arg(long, default_value = "default")]
    model: String,

    /// System prompt sent ahead of the conversation.
    #[arg(long)]
    system: Option<String>,

    /// Settings file (defaults to ~/.chatwire/settings.json).
    #[arg(long)]
    settings: Option<PathBuf>,

    prompt: String,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let settings = match &cli.settings {
        Some(path) => chatwire_settings::load_settings_from_path(path),
        None => chatwire_settings::load_settings(),
    }
    .context("failed to load settings")?;

    init_telemetry(&telemetry_config(&settings)).context("failed to initialize logging")?;

    let runner_config = RunnerConfig {
        max_iterations: settings.orchestrator.max_iterations,
        flush_interval: settings.orchestrator.flush_interval(),
        tool_timeout: settings.orchestrator.tool_timeout(),
    };
    let provider = OpenAiCompatProvider::new(provider_config(settings))?;
    tracing::info!(endpoint = provider.endpoint(), model = %cli.model, "starting turn");

    let store = Arc::new(ConsoleStore::new(std::io::stdout()));
    let runner = TurnRunner::new(
        Arc::new(provider),
        Arc::new(build_registry()?),
        store,
        runner_config,
    );
    let session = Arc::new(SessionController::new(Arc::new(runner)));

    let interrupt = {
        let session = Arc::clone(&session);
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!("interrupt received");
                let _ = session.stop_streaming();
            }
        })
    };

    let report = session
        .send_message(&cli.prompt, &cli.model, &[], cli.system.as_deref(), Vec::new())
        .await;
    interrupt.abort();

    tracing::info!(
        iterations = report.iterations,
        prompt_tokens = report.usage.prompt_tokens,
        completion_tokens = report.usage.completion_tokens,
        "turn finished"
    );

    match report.outcome {
        TurnOutcome::Completed | TurnOutcome::Aborted => Ok(()),
        TurnOutcome::IterationLimit => {
            eprintln!("stopped after {} tool iterations", report.iterations);
            Ok(())
        }
        TurnOutcome::Failed { message } => anyhow::bail!(message),
    }
}

fn telemetry_config(settings: &ChatwireSettings) -> TelemetryConfig {
    let mut config = TelemetryConfig {
        json: settings.logging.json,
        ..TelemetryConfig::default()
    };
    match parse_level(&settings.logging.level) {
        Some(level) => config.log_level = level,
        None => eprintln!("unknown log level {:?}, using info", settings.logging.level),
    }
    config
}

fn provider_config(settings: ChatwireSettings) -> ProviderConfig {
    let connect_timeout = settings.gateway.connect_timeout();
    let idle_timeout = settings.gateway.idle_timeout();
    ProviderConfig {
        base_url: settings.gateway.base_url,
        api_key: settings.gateway.api_key,
        credential_cookie: settings.gateway.credential_cookie,
        connect_timeout,
        idle_timeout,
    }
}

fn build_registry() -> Result<ToolRegistry, EngineError> {
    let mut registry = ToolRegistry::new();
    registry.register(Arc::new(CurrentTimeTool))?;
    Ok(registry)
}
