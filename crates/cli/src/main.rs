mod app;
mod commands;
mod status;

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Duration,
};

use {
    clap::{Parser, Subcommand},
    mirror_config::{Severity, discover_config, validate},
    mirror_discord::RelayHandler,
    mirror_metrics::{MetricsRecorderConfig, init_metrics},
    secrecy::ExposeSecret,
    serenity::all::Client,
    tokio_util::sync::CancellationToken,
    tracing::{error, info, warn},
    tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt},
};

use crate::{
    app::App,
    status::{StatusState, serve},
};

#[derive(Parser)]
#[command(name = "mirror", version, about = "Mirror: Discord channel relay")]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    /// Config file (defaults to ./config.* then ~/.config/mirror/config.*).
    #[arg(long, short, global = true, env = "MIRROR_CONFIG")]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    /// Output logs as JSON instead of human-readable.
    #[arg(long, global = true, default_value_t = false)]
    json_logs: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Connect to Discord and relay messages (default when no subcommand is provided).
    Run,
    /// Validate the configuration file and report errors/warnings.
    Check,
    /// Print the route table built from the configuration.
    Routes,
}

fn init_telemetry(cli: &Cli) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));

    let registry = tracing_subscriber::registry().with(filter);

    if cli.json_logs {
        registry
            .with(fmt::layer().json().with_target(true).with_thread_ids(false))
            .init();
    } else {
        registry
            .with(
                fmt::layer()
                    .compact()
                    .with_target(false)
                    .with_thread_ids(false)
                    .with_ansi(true),
            )
            .init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    init_telemetry(&cli);

    match cli.command {
        None | Some(Commands::Run) => run(cli.config.as_deref()).await,
        Some(Commands::Check) => commands::check(cli.config.as_deref()),
        Some(Commands::Routes) => commands::routes(cli.config.as_deref()),
    }
}

async fn run(config_path: Option<&Path>) -> anyhow::Result<()> {
    info!(version = env!("CARGO_PKG_VERSION"), "mirror starting");

    let (path, config) = discover_config(config_path)?;
    info!(path = %path.display(), redirects = config.redirects.len(), "config loaded");

    let validation = validate(&config);
    for d in &validation.diagnostics {
        if d.severity == Severity::Warning {
            warn!(path = %d.path, category = d.category, "{}", d.message);
        }
    }
    if validation.has_errors() {
        anyhow::bail!("invalid configuration: {}", validation.error_summary());
    }

    let app = App::build(&config).await?;
    let cancel = CancellationToken::new();
    let flush = app.store.spawn_flush_task(
        Duration::from_secs(config.relay.flush_interval_secs),
        cancel.clone(),
    );

    let metrics = init_metrics(MetricsRecorderConfig {
        enabled: config.metrics.enabled,
        global_labels: Vec::new(),
    })?;

    let status = if config.status.enabled {
        let addr = format!("{}:{}", config.status.bind, config.status.port);
        let listener = tokio::net::TcpListener::bind(&addr).await?;
        info!(addr, "status server listening");
        let state = StatusState {
            coordinator: Arc::clone(&app.coordinator),
            metrics,
        };
        Some(tokio::spawn(serve(listener, state, cancel.clone())))
    } else {
        None
    };

    let handler = Arc::new(RelayHandler::new(
        Arc::clone(&app.coordinator),
        Arc::clone(&app.resolver),
        cancel.clone(),
    ));
    let mut client = Client::builder(config.token.expose_secret(), RelayHandler::intents())
        .event_handler_arc(Arc::clone(&handler))
        .await?;
    let shard_manager = Arc::clone(&client.shard_manager);

    let outcome = tokio::select! {
        result = client.start() => result.map_err(anyhow::Error::from),
        signal = tokio::signal::ctrl_c() => {
            info!("shutdown requested");
            signal.map_err(anyhow::Error::from)
        },
    };
    if let Err(e) = &outcome {
        error!(error = %e, "discord client stopped");
    }

    handler.shutdown().await;
    shard_manager.shutdown_all().await;
    if let Err(e) = flush.await {
        error!(error = %e, "store flush task ended abnormally");
    }
    if let Some(status) = status {
        match status.await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!(error = %e, "status server failed"),
            Err(e) => warn!(error = %e, "status server task ended abnormally"),
        }
    }

    info!(watched = app.coordinator.tracker().len(), "mirror stopped");
    outcome
}
