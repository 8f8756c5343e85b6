use anyhow::{Context, Result};
use deskpilot_actors::{register_builtin, ActorRegistry};
use deskpilot_app::cli::{self, Command, USAGE};
use deskpilot_app::{summary, AppConfig, JsonlRecordSink, SnapshotSource};
use deskpilot_core::pattern_library::default_matcher;
use deskpilot_core::{CancellationFlag, ExecutionEngine, RunStatus, SnapshotProvider};
use deskpilot_providers::{LlmPlanningOracle, OpenAICompatibleProvider};
use deskpilot_state::{HyprlandSnapshotProvider, SystemSnapshotProvider};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const EXIT_FAILED: i32 = 1;
const EXIT_INTERNAL: i32 = 2;

#[tokio::main]
async fn main() {
    init_tracing();

    let args: Vec<String> = std::env::args().skip(1).collect();
    let code = match cli::parse(&args) {
        Ok(command) => match execute(command).await {
            Ok(code) => code,
            Err(e) => {
                eprintln!("❌ {:#}", e);
                EXIT_INTERNAL
            }
        },
        Err(e) => {
            eprintln!("❌ {}\n\n{}", e, USAGE);
            EXIT_INTERNAL
        }
    };

    std::process::exit(code);
}

fn init_tracing() {
    let filter =
        EnvFilter::try_from_env("DESKPILOT_LOG").unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

async fn execute(command: Command) -> Result<i32> {
    match command {
        Command::Help => {
            println!("{}", USAGE);
            Ok(0)
        }
        Command::Capabilities { config } => {
            load_config(config)?;
            let registry = build_registry()?;
            println!("{}", serde_json::to_string_pretty(&registry.capabilities())?);
            Ok(0)
        }
        Command::Run {
            instruction,
            config,
            no_patterns,
        } => {
            let mut config = load_config(config)?;
            if no_patterns {
                config.engine.pattern_matching = false;
            }
            run(&instruction, config).await
        }
    }
}

fn load_config(path: Option<PathBuf>) -> Result<AppConfig> {
    AppConfig::load(path.as_deref()).context("Invalid configuration")
}

fn build_registry() -> Result<ActorRegistry> {
    let mut registry = ActorRegistry::new();
    register_builtin(&mut registry).context("Failed to register built-in actors")?;
    Ok(registry)
}

fn build_engine(config: &AppConfig) -> Result<ExecutionEngine> {
    let snapshots: Arc<dyn SnapshotProvider> = match config.snapshot {
        SnapshotSource::Hyprland => Arc::new(HyprlandSnapshotProvider::new()),
        SnapshotSource::System => Arc::new(SystemSnapshotProvider::new()),
    };

    let api_key = config.api_key();
    if api_key.is_none() {
        warn!("{} is not set, calling the planner without a key", config.oracle.api_key_env);
    }
    let provider = OpenAICompatibleProvider::new(
        config.oracle.endpoint.clone(),
        api_key,
        config.oracle.model.clone(),
    );
    info!("Planner: {} at {}", provider.model(), config.oracle.endpoint);
    let oracle = LlmPlanningOracle::new(Arc::new(provider))
        .with_defaults(config.engine.plan_defaults());

    let patterns = default_matcher(config.engine.plan_defaults())
        .context("Failed to build instruction templates")?;

    let mut engine = ExecutionEngine::new(
        Arc::new(build_registry()?),
        snapshots,
        Arc::new(oracle),
        config.engine.clone(),
    )
    .with_patterns(Arc::new(patterns));

    if let Some(path) = &config.journal_path {
        let sink = JsonlRecordSink::new(path)
            .with_context(|| format!("Failed to open journal {}", path.display()))?;
        engine = engine.with_sink(Arc::new(sink));
    }

    Ok(engine)
}

async fn run(instruction: &str, config: AppConfig) -> Result<i32> {
    let engine = build_engine(&config)?;

    let cancel = CancellationFlag::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Interrupted, cancelling run");
                cancel.cancel();
            }
        })
    };

    let state = engine.run(instruction, &cancel).await;
    interrupt.abort();
    let state = state.context("Run failed")?;

    print!("{}", summary::render(&state));

    let metrics = engine.metrics().snapshot();
    info!(
        "{} step attempts, {} failures, {} recoveries requested",
        metrics.step_attempts, metrics.step_failures, metrics.recoveries_requested
    );

    Ok(match state.status {
        RunStatus::Succeeded => 0,
        _ => EXIT_FAILED,
    })
}
