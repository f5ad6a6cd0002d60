// ABOUTME: Main entry point for the Matrix bot with sync loop and graceful shutdown
// ABOUTME: Initializes logging, config, metrics, Matrix client, routes and the admission gate
#![recursion_limit = "256"]

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, ValueEnum};
use matrix_sdk::config::SyncSettings;
use nixbot::{
    bot::Bot,
    config::Config,
    handlers::{self, script::ScriptPolicy},
    matrix_client, metrics, paths,
    platform::{setup_event_stream, MatrixTransport},
};
use nixbot_core::{
    AcceptAll, AdmissionGate, AllowList, DispatchConfig, Dispatcher, InvitePolicy, RouteRegistry,
};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_LOG_FILTER: &str = "info,matrix_sdk_crypto=warn";

#[derive(Debug, Clone, Copy, Default, ValueEnum)]
enum LogFormat {
    #[default]
    Text,
    Json,
}

#[derive(Parser, Debug)]
#[command(name = "nixbot", version, about = "Matrix bot with regex-routed commands")]
struct Args {
    /// Path to the TOML config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Console log format
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,
}

fn init_logging(format: LogFormat) -> Result<WorkerGuard> {
    let log_dir = paths::log_dir();
    std::fs::create_dir_all(&log_dir)
        .with_context(|| format!("Failed to create log directory {}", log_dir.display()))?;
    let (file_writer, guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "nixbot.log"));

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| DEFAULT_LOG_FILTER.into());

    let (text_layer, json_layer) = match format {
        LogFormat::Text => (
            Some(tracing_subscriber::fmt::layer().with_writer(std::io::stderr)),
            None,
        ),
        LogFormat::Json => (
            None,
            Some(
                tracing_subscriber::fmt::layer()
                    .json()
                    .with_writer(std::io::stderr),
            ),
        ),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(text_layer)
        .with(json_layer)
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(file_writer),
        )
        .init();

    Ok(guard)
}

fn invite_policy(config: &Config) -> Arc<dyn InvitePolicy> {
    if let Some(script) = &config.bot.join_script {
        tracing::info!(script = %script, "Using script invite policy");
        Arc::new(ScriptPolicy::new(script, config.nix.eval_timeout()))
    } else if !config.bot.allowed_inviters.is_empty() {
        tracing::info!(
            allowed = config.bot.allowed_inviters.len(),
            "Using allow-list invite policy"
        );
        Arc::new(AllowList::new(config.bot.allowed_inviters.iter().cloned()))
    } else {
        tracing::info!("Accepting all invites");
        Arc::new(AcceptAll)
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Set up panic hook to log panics before they crash the process
    std::panic::set_hook(Box::new(|panic_info| {
        eprintln!("\nPANIC! nixbot crashed with the following error:\n");
        eprintln!("{}", panic_info);
        eprintln!("\nBacktrace:");
        eprintln!("{:?}", std::backtrace::Backtrace::force_capture());
    }));

    dotenvy::dotenv().ok();
    let args = Args::parse();
    let _log_guard = init_logging(args.log_format)?;

    tracing::info!("Starting nixbot");

    let config = Config::load_from(args.config.as_deref())?;

    tracing::info!(
        homeserver = %config.matrix.home_server,
        user_id = %config.matrix.user_id,
        state_dir = %config.state.dir().display(),
        scripts = config.scripts.len(),
        nix = config.nix.enabled,
        "Configuration loaded"
    );

    if let Some(listen) = config.metrics.listen {
        metrics::init_metrics(listen)?;
        tracing::info!(listen = %listen, "Metrics exporter listening");
    }

    let client = matrix_client::create_client(&config.matrix, &config.state).await?;
    matrix_client::login(&client, &config.matrix).await?;
    let transport = Arc::new(MatrixTransport::new(client.clone())?);

    let mut registry = RouteRegistry::new();
    handlers::register_all(&mut registry, &config).await?;
    let routes = registry.freeze();
    for route in routes.iter() {
        tracing::debug!(pattern = %route.pattern(), "Route registered");
    }
    tracing::info!(routes = routes.len(), "Routes frozen");

    let dispatch_config = DispatchConfig {
        own_user_id: config.matrix.user_id.clone(),
        staleness: config.bot.staleness(),
        surface_handler_errors: config.bot.surface_handler_errors,
        read_receipts: config.bot.read_receipts,
    };
    let dispatcher = Arc::new(Dispatcher::new(routes, transport.clone(), dispatch_config));
    let gate = Arc::new(
        AdmissionGate::new(config.matrix.user_id.clone(), transport.clone())
            .with_policy(invite_policy(&config)),
    );
    let bot = Arc::new(Bot::new(Arc::clone(&dispatcher), gate));

    // The SDK waits for its event handlers inside each sync, and they block
    // once the channel is full, so the consumer must run before the first sync
    let events = setup_event_stream(&transport);
    let mut bot_task = tokio::spawn({
        let bot = Arc::clone(&bot);
        async move { bot.run(events).await }
    });

    // Perform initial sync to upload device keys and establish encryption
    tracing::info!("Performing initial sync...");
    let response = client
        .sync_once(SyncSettings::default())
        .await
        .context("Initial sync failed")?;
    tracing::info!("Initial sync complete");

    let settings = SyncSettings::default().token(response.next_batch);
    let sync_client = client.clone();
    let sync_task = tokio::spawn(async move {
        if let Err(e) = sync_client.sync(settings).await {
            tracing::error!(error = %e, "Sync loop terminated");
        }
    });

    tracing::info!("Bot ready");

    tokio::select! {
        result = &mut bot_task => {
            if let Err(e) = result {
                tracing::error!(error = %e, "Event loop task failed");
            }
            tracing::warn!("Event loop ended");
        }
        _ = shutdown_signal() => {
            tracing::info!("Shutdown signal received");
        }
    }

    sync_task.abort();
    bot_task.abort();

    let grace = config.bot.shutdown_grace();
    let pending_invites = bot.invites().shutdown(grace).await;
    let remaining = dispatcher.supervisor().shutdown(grace).await;
    tracing::info!(remaining, pending_invites, "Stopped nixbot");

    Ok(())
}
