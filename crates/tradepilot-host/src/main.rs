//! Command-line host for the TradePilot worker.
//!
//! Registers the worker against a live origin, then delivers one event to
//! it. The cache storage snapshot survives between runs.
//!
//! ## Usage
//!
//! ```bash
//! # Install and activate, reclaiming stale stores
//! tradepilot-host register
//!
//! # Route a navigation through the worker
//! tradepilot-host --origin https://app.tradepilot.ai fetch /plans --navigate
//!
//! # Show a push notification, then click its explore action
//! tradepilot-host click --action explore "BTC/USDT spread 2.3%"
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use tracing::{debug, error, info, warn};
use tradepilot_common::{init_logging, OptionExt, PilotError, Result};
use tradepilot_net::{Fetcher, LoaderConfig, Request, ResourceLoader, Response};
use tradepilot_sw::config::BACKGROUND_SYNC_TAG;
use tradepilot_sw::{
    CacheStorage, Clients, FetchDecision, NotificationClick, PushMessage, ServiceWorker,
    ServiceWorkerError, ServiceWorkerRegistration, SyncEvent, WorkerHost,
};
use url::Url;

mod config;
mod notifier;

use config::HostConfig;
use notifier::TracingNotifier;

#[derive(Parser)]
#[command(name = "tradepilot-host")]
#[command(about = "Drive the TradePilot worker from the command line")]
struct Cli {
    /// Host config file
    #[arg(short, long, default_value = "tradepilot.toml")]
    config: PathBuf,

    /// Origin the dashboard is served from
    #[arg(long)]
    origin: Option<Url>,

    /// Log level, overrides the config file
    #[arg(long)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Install and activate the worker
    Register,

    /// Send a GET through the worker
    Fetch {
        /// Path or absolute URL
        target: String,
        /// Treat as a top-level navigation
        #[arg(long)]
        navigate: bool,
    },

    /// Deliver a push message
    Push {
        /// Payload text; omitted means an empty payload
        text: Option<String>,
    },

    /// Deliver a push, then click the resulting notification
    Click {
        /// Payload text
        text: Option<String>,
        /// Action button id (`explore`, `close`); omitted means the body
        #[arg(short, long)]
        action: Option<String>,
    },

    /// Deliver a background sync event
    Sync {
        #[arg(default_value = BACKGROUND_SYNC_TAG)]
        tag: String,
    },
}

fn worker_err(message: &'static str) -> impl FnOnce(ServiceWorkerError) -> PilotError {
    move |e| PilotError::worker_with_source(message, e)
}

#[tokio::main]
async fn main() -> ExitCode {
    match run(Cli::parse()).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(category = e.category(), retryable = e.is_retryable(), "{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<()> {
    let mut config = HostConfig::load(&cli.config)?;
    if let Some(origin) = cli.origin {
        config.worker.origin = origin;
    }
    if let Some(level) = cli.log_level {
        config.logging.level = level;
        config.logging.filter = None;
    }
    init_logging(config.log_config()?)?;

    let output = execute(&config, cli.command).await?;
    println!("{output}");
    Ok(())
}

/// Register the worker, deliver one command and persist the caches.
///
/// When installing fails but the snapshot already holds the current store,
/// that store keeps serving.
async fn execute(config: &HostConfig, command: Commands) -> Result<String> {
    let version = config
        .worker
        .validate()
        .map_err(|e| PilotError::config_with_source("invalid worker config", e))?;
    info!(cache = %version, origin = %config.worker.origin, "Starting worker host");

    let loader = ResourceLoader::new(LoaderConfig::default().with_origin(config.worker.origin.clone()))
        .map_err(|e| PilotError::network_with_source("cannot build network loader", e))?;
    let storage = CacheStorage::load(&config.snapshot_path, config.worker.cache_quota_bytes)
        .map_err(|e| PilotError::storage_with_source("cannot load cache snapshot", e))?;

    let host = WorkerHost {
        fetcher: Arc::new(loader),
        notifier: Arc::new(TracingNotifier::new()),
        caches: storage.into_shared(),
        clients: Clients::new().into_shared(),
    };

    let scope = config.worker.shell_url().map_err(worker_err("invalid scope"))?;
    let (mut registration, mut events) = ServiceWorkerRegistration::new(scope);
    let new_worker = || {
        ServiceWorker::new(config.worker.clone(), host.clone())
            .map_err(worker_err("cannot create worker"))
    };

    match registration.update(new_worker()?).await {
        Ok(entries) => {
            let report = registration
                .activate()
                .await
                .map_err(worker_err("activation failed"))?;
            info!(
                entries,
                deleted = report.deleted.len(),
                "Worker installed and activated"
            );
        }
        Err(install_error) => {
            if registration.adopt(new_worker()?).await.is_err() {
                return Err(PilotError::worker_with_source("install failed", install_error));
            }
            warn!(error = %install_error, "Install failed, serving the cached generation");
        }
    }
    let active = registration.active().ok_or_not_found("active worker")?;
    let mut output = format!("{} active", active.version());

    let outcome = deliver(&registration, &host, config, command).await;

    while let Ok(event) = events.try_recv() {
        debug!(?event, "Registration event");
    }

    host.caches
        .read()
        .await
        .save(&config.snapshot_path)
        .map_err(|e| PilotError::storage_with_source("cannot save cache snapshot", e))?;

    if let Some(line) = outcome? {
        output.push('\n');
        output.push_str(&line);
    }
    Ok(output)
}

async fn deliver(
    registration: &ServiceWorkerRegistration,
    host: &WorkerHost,
    config: &HostConfig,
    command: Commands,
) -> Result<Option<String>> {
    let line = match command {
        Commands::Register => return Ok(None),

        Commands::Fetch { target, navigate } => {
            let url = config
                .worker
                .resolve(&target)
                .map_err(|e| PilotError::InvalidArgument(e.to_string()))?;
            let request = if navigate {
                Request::navigate(url)
            } else {
                Request::get(url)
            };

            let handled = registration
                .handle_fetch(request.clone())
                .await
                .map_err(worker_err("fetch failed"))?;
            let line = match &handled.decision {
                FetchDecision::Respond(r) => describe(&format!("{:?}", r.source), &r.response),
                FetchDecision::Passthrough => {
                    let response = host
                        .fetcher
                        .fetch(&request)
                        .await
                        .map_err(|e| PilotError::network_with_source("passthrough fetch failed", e))?;
                    describe("Passthrough", &response)
                }
            };
            handled.lifetime.settled().await;
            line
        }

        Commands::Push { text } => {
            let id = registration
                .push(push_message(text))
                .await
                .map_err(worker_err("push failed"))?;
            format!("notification {id:?} shown")
        }

        Commands::Click { text, action } => {
            let notification = registration
                .push(push_message(text))
                .await
                .map_err(worker_err("push failed"))?;
            let outcome = registration
                .notification_click(NotificationClick {
                    notification,
                    action,
                })
                .await
                .map_err(worker_err("notification click failed"))?;
            format!("click: {outcome:?}")
        }

        Commands::Sync { tag } => {
            let outcome = registration
                .sync(SyncEvent::new(tag))
                .await
                .map_err(worker_err("sync failed"))?;
            format!("sync: {outcome:?}")
        }
    };
    Ok(Some(line))
}

fn push_message(text: Option<String>) -> PushMessage {
    text.map(PushMessage::new).unwrap_or_else(PushMessage::empty)
}

fn describe(source: &str, response: &Response) -> String {
    format!(
        "{} {} [{source}, {}] {} bytes",
        response.status,
        response.url,
        response.response_type.as_str(),
        response.body().len()
    )
}
