use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use cycle_controller::snapshot::{self, EXPORT_VERSION, SYNC_VERSION};
use cycle_controller::{AppConfig, CycleController, ImportOutcome, LogRenderer, MemoryStore, SqliteStateStore};
use market_core::StoreBackend;
use price_client::{FetchExecutor, HttpTransport, ReqwestTransport, TwelveDataClient};
use sentiment_resolver::SentimentResolver;
use tokio::signal::unix::SignalKind;

enum Command {
    Run,
    Update,
    Sync { out: PathBuf },
    Export { path: Option<PathBuf> },
    Import { path: PathBuf },
}

fn parse_command(args: &[String], config: &AppConfig) -> Result<Command> {
    let flag_value = |name: &str| {
        args.iter()
            .position(|a| a == name)
            .and_then(|i| args.get(i + 1))
            .map(PathBuf::from)
    };

    match args.get(1).map(|s| s.as_str()) {
        None | Some("run") => Ok(Command::Run),
        Some("update") => Ok(Command::Update),
        Some("sync") => Ok(Command::Sync {
            out: flag_value("--out").unwrap_or_else(|| {
                if is_url(&config.public_snapshot) {
                    PathBuf::from("data.json")
                } else {
                    PathBuf::from(&config.public_snapshot)
                }
            }),
        }),
        Some("export") => Ok(Command::Export { path: args.get(2).map(PathBuf::from) }),
        Some("import") => match args.get(2) {
            Some(path) => Ok(Command::Import { path: PathBuf::from(path) }),
            None => bail!("usage: cycle-controller import <PATH>"),
        },
        Some(other) => bail!("unknown command '{}' (expected run, update, sync, export or import)", other),
    }
}

fn is_url(location: &str) -> bool {
    location.starts_with("http://") || location.starts_with("https://")
}

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Load .env, init tracing
    dotenvy::dotenv().ok();

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(
                tracing_subscriber::EnvFilter::try_from_default_env()
                    .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
            )
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    // 2. Configuration
    let config = AppConfig::from_env()?;
    let args: Vec<String> = std::env::args().collect();
    let command = parse_command(&args, &config)?;

    tracing::info!("Starting TQQQ phase signal system");
    tracing::info!("  Symbols: {} (anchor {})", config.symbols.join(", "), config.anchor);
    tracing::info!("  SMA periods: {}/{}", config.short_period, config.long_period);
    tracing::info!("  Daily request budget: {}", config.daily_request_budget);

    // 3. Collaborators
    let transport: Arc<dyn HttpTransport> = Arc::new(ReqwestTransport::new());
    let executor = FetchExecutor::new(Arc::clone(&transport), config.retry_policy());

    // Without a key the client is never asked for prices
    let prices = TwelveDataClient::new(config.api_key.clone().unwrap_or_default(), executor.clone())
        .with_base_url(config.base_url.clone())
        .with_max_history_points(config.max_history_points)
        .with_quote_budget(1, config.quote_timeout());

    let sentiment = SentimentResolver::new(Arc::clone(&transport)).with_timeout(config.sentiment_timeout());

    let backend: Arc<dyn StoreBackend> = if config.is_read_only() {
        Arc::new(MemoryStore::new())
    } else {
        let store = SqliteStateStore::connect(&config.database_url)
            .await
            .with_context(|| format!("failed to open {}", config.database_url))?;
        tracing::info!("State store ready ({})", config.database_url);
        Arc::new(store)
    };

    let controller = CycleController::new(
        config.rule_set(),
        Arc::new(prices),
        Arc::new(sentiment),
        backend,
        Arc::new(LogRenderer::new()),
    )
    .with_daily_budget(config.daily_request_budget)
    .with_inter_symbol_pause(config.inter_symbol_pause())
    .with_max_history_points(config.max_history_points);

    if config.is_read_only() {
        if !matches!(command, Command::Run) {
            bail!("TWELVE_DATA_API_KEY is required for update, sync, export and import");
        }
        return run_read_only(&controller, &executor, &config.public_snapshot).await;
    }

    if let Err(e) = controller.restore().await {
        tracing::warn!("Ignoring unreadable cached store: {}", e);
    }

    match command {
        Command::Run => run_loop(&controller).await,
        Command::Update => {
            let outcome = controller.run_live_update().await;
            match outcome.report() {
                Some(report) => tracing::info!("Manual update: {}", report.status_message()),
                None => tracing::warn!("Manual update {}", outcome.label()),
            }
            Ok(())
        }
        Command::Sync { out } => run_sync(&controller, &out).await,
        Command::Export { path } => {
            let path = path.unwrap_or_else(|| {
                PathBuf::from(snapshot::default_export_name(chrono::Utc::now().date_naive()))
            });
            let document = controller.export_snapshot(EXPORT_VERSION).await;
            snapshot::write_snapshot(&path, &document).await?;
            tracing::info!("Exported {} series to {}", document.asset_store.data.len(), path.display());
            Ok(())
        }
        Command::Import { path } => {
            let raw = snapshot::read_snapshot_file(&path).await?;
            match controller.import_snapshot(&raw).await? {
                ImportOutcome::Imported { symbols, rows } => {
                    tracing::info!("Imported {} series ({} rows) from {}", symbols, rows, path.display());
                }
                ImportOutcome::Skipped => tracing::warn!("Import skipped: a cycle is in progress"),
            }
            Ok(())
        }
    }
}

async fn run_read_only(controller: &CycleController, executor: &FetchExecutor, location: &str) -> Result<()> {
    tracing::info!("No API key configured, loading public snapshot (read-only)");

    let document = if is_url(location) {
        executor
            .fetch(location)
            .await
            .with_context(|| format!("failed to fetch public snapshot {}", location))?
    } else {
        let raw = snapshot::read_snapshot_file(std::path::Path::new(location)).await?;
        serde_json::from_str(&raw).with_context(|| format!("{} is not valid JSON", location))?
    };

    match controller.present_public(document).await? {
        ImportOutcome::Imported { symbols, rows } => {
            tracing::info!("Public snapshot loaded: {} series, {} rows (read-only)", symbols, rows);
        }
        ImportOutcome::Skipped => {}
    }
    Ok(())
}

async fn run_sync(controller: &CycleController, out: &std::path::Path) -> Result<()> {
    let outcome = controller.run_full_sync().await;
    if let Some(report) = outcome.report() {
        if report.loaded.is_empty() {
            bail!("sync failed: {}", report.status_message());
        }
    }

    let document = controller.export_snapshot(SYNC_VERSION).await;
    snapshot::write_snapshot(out, &document).await?;
    tracing::info!(
        "Sync complete: {} series, {} rows written to {}",
        document.asset_store.data.len(),
        document.strategy_results.len(),
        out.display()
    );
    Ok(())
}

async fn run_loop(controller: &CycleController) -> Result<()> {
    tracing::info!(
        "Running. Refreshing every {}s. Press Ctrl+C to stop.",
        controller.interval().as_secs().max(1)
    );

    // Graceful shutdown on SIGINT + SIGTERM
    let mut sigterm = tokio::signal::unix::signal(SignalKind::terminate())?;
    let shutdown = async move {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Received SIGINT");
            }
            _ = sigterm.recv() => {
                tracing::info!("Received SIGTERM");
            }
        }
    };

    let cycles = controller.run_scheduled(shutdown).await;
    tracing::info!("Cycle controller shut down after {} cycles.", cycles);
    Ok(())
}
