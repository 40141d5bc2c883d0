//! Vigil - Session Health Daemon
//!
//! Probes the backing resource of every development session, reports which
//! recovery actions are safe, and classifies each session's pull-request
//! workflow stage. Serves the results over a local HTTP API.

#![forbid(unsafe_code)]

mod events;
mod health;
mod http_api;
mod poller;
mod probe;
mod store;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use tracing_subscriber::{EnvFilter, fmt, prelude::*};
use vigil_common::{DaemonConfig, ErrorCode, SessionId, classify_workflow};

use events::EventBus;
use health::{HealthConfig, HealthService};
use http_api::HttpState;
use poller::HealthPoller;
use probe::ProbeRegistry;
use store::{JsonFileStore, SessionStore, StoreError};

#[derive(Parser)]
#[command(name = "vigild")]
#[command(author, version, about = "Vigil daemon - session health and workflow status")]
struct Cli {
    /// Path to the configuration file
    #[arg(short, long, env = "VIGIL_CONFIG")]
    config: Option<PathBuf>,

    /// Path to the sessions file (overrides the configuration)
    #[arg(long)]
    sessions: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    json_logs: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the poller and HTTP API (default)
    Serve(ServeArgs),
    /// Run one health sweep and print the reports as JSON
    Check {
        /// Only evaluate this session
        #[arg(long)]
        session: Option<String>,
    },
    /// Print the workflow stage of each session as JSON
    Workflow {
        /// Only classify this session
        #[arg(long)]
        session: Option<String>,
    },
    /// Print the effective configuration as TOML
    Config,
}

#[derive(Args, Default)]
struct ServeArgs {
    /// Address for the HTTP API (overrides the configuration)
    #[arg(long)]
    bind: Option<String>,

    /// Serve on-demand evaluations only; do not poll
    #[arg(long)]
    no_poll: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = DaemonConfig::load(cli.config.as_deref())
        .map_err(|err| coded(err.error_code(), err))?;

    init_logging(&cli, &loaded.config.general.log_level);

    match &loaded.file {
        Some(path) => debug!("Loaded configuration from {:?}", path),
        None => debug!("No configuration file, using defaults"),
    }
    for value in &loaded.overrides {
        debug!(key = %value.key, value = %value.value, "Configuration overridden by {}", value.source);
    }

    let mut config = loaded.config;
    if let Some(path) = cli.sessions {
        config.store.sessions_path = path;
    }

    match cli.command.unwrap_or(Commands::Serve(ServeArgs::default())) {
        Commands::Serve(args) => serve(config, args).await,
        Commands::Check { session } => check(config, session).await,
        Commands::Workflow { session } => workflow(config, session).await,
        Commands::Config => show_config(&config, &loaded.overrides),
    }
}

/// Logs go to stderr so command output on stdout stays parseable.
fn init_logging(cli: &Cli, configured_level: &str) {
    let level = if cli.verbose { "debug" } else { configured_level };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{level},hyper=warn,reqwest=warn")));

    let json_layer = cli
        .json_logs
        .then(|| fmt::layer().json().with_writer(std::io::stderr));
    let text_layer = (!cli.json_logs).then(|| fmt::layer().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(json_layer)
        .with(text_layer)
        .with(filter)
        .init();
}

fn build_service(config: &DaemonConfig) -> Result<HealthService> {
    let registry = ProbeRegistry::from_config(&config.probes)
        .map_err(|err| coded(err.error_code(), err))
        .context("Failed to set up probe adapters")?;
    info!("Probing backends: {:?}", registry.kinds());
    Ok(HealthService::new(registry, HealthConfig::from_daemon(config)))
}

fn store_failure(err: StoreError) -> anyhow::Error {
    coded(err.error_code(), err)
}

/// Prefix the catalog code and append its remediation steps.
fn coded(code: ErrorCode, err: impl std::fmt::Display) -> anyhow::Error {
    let entry = code.entry();
    let mut message = format!("[{}] {err}", entry.code);
    for step in &entry.remediation {
        message.push_str("\n  - ");
        message.push_str(step);
    }
    anyhow!(message)
}

async fn serve(config: DaemonConfig, args: ServeArgs) -> Result<()> {
    info!("Starting Vigil daemon...");

    let service = build_service(&config)?;
    let store: Arc<dyn SessionStore> = Arc::new(JsonFileStore::new(&config.store.sessions_path));
    info!("Reading sessions from {:?}", config.store.sessions_path);

    let events = EventBus::default();
    let poller = HealthPoller::new(service, store, events.clone(), config.poller.interval());

    let mut event_log = events.subscribe();
    tokio::spawn(async move {
        while let Ok(line) = event_log.recv().await {
            debug!(target: "vigild::events", "{}", line);
        }
    });

    let poll_handle = if config.poller.enabled && !args.no_poll {
        Some(poller.start(config.poller.startup_sweep))
    } else {
        info!("Polling disabled; sessions are evaluated on request");
        None
    };

    let bind = args.bind.unwrap_or(config.general.http_bind);
    let state = HttpState {
        poller: poller.clone(),
        version: env!("CARGO_PKG_VERSION"),
        started_at: Instant::now(),
        pid: std::process::id(),
    };
    let server = http_api::start_server(&bind, state)
        .await
        .with_context(|| format!("Failed to bind HTTP API on {bind}"))?;

    let result = tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            Ok(())
        }
        joined = server => match joined {
            Ok(Ok(())) => Ok(()),
            Ok(Err(err)) => Err(anyhow::Error::from(err).context("HTTP API failed")),
            Err(err) => Err(anyhow::Error::from(err).context("HTTP API task failed")),
        },
    };

    poller.stop();
    if let Some(handle) = poll_handle {
        handle.abort();
    }
    info!("Vigil daemon stopped");
    result
}

async fn check(config: DaemonConfig, session: Option<String>) -> Result<()> {
    let service = build_service(&config)?;
    let store = JsonFileStore::new(&config.store.sessions_path);

    let output = match session {
        Some(id) => {
            let session = store
                .get(&SessionId::new(id))
                .await
                .map_err(store_failure)?;
            serde_json::to_value(service.evaluate(&session).await)?
        }
        None => {
            let sessions = store.list().await.map_err(store_failure)?;
            let sweep = service.sweep(sessions).await;
            if sweep.needs_attention_count() > 0 {
                warn!(
                    count = sweep.needs_attention_count(),
                    "Sessions need attention"
                );
            }
            http_api::sweep_body(&sweep)
        }
    };

    println!("{}", serde_json::to_string_pretty(&output)?);
    Ok(())
}

async fn workflow(config: DaemonConfig, session: Option<String>) -> Result<()> {
    let store = JsonFileStore::new(&config.store.sessions_path);
    let sessions = match session {
        Some(id) => vec![
            store
                .get(&SessionId::new(id))
                .await
                .map_err(store_failure)?,
        ],
        None => store.list().await.map_err(store_failure)?,
    };

    let rows: Vec<_> = sessions
        .iter()
        .map(|session| {
            let classification = classify_workflow(session);
            json!({
                "session_id": session.id,
                "name": session.name,
                "stage": classification.stage,
                "blockers": classification.blockers,
            })
        })
        .collect();

    println!("{}", serde_json::to_string_pretty(&rows)?);
    Ok(())
}

fn show_config(
    config: &DaemonConfig,
    overrides: &[vigil_common::config::ConfigValueSource],
) -> Result<()> {
    let mut printable = config.clone();
    if printable.probes.sprites_token.is_some() {
        printable.probes.sprites_token = Some("<redacted>".to_string());
    }

    for value in overrides {
        println!("# {} = {} ({})", value.key, value.value, value.source);
    }
    print!(
        "{}",
        toml::to_string_pretty(&printable).context("Failed to render configuration")?
    );
    Ok(())
}
