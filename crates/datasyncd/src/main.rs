// # datasyncd - Data Sync Daemon
//
// A thin shell around datasync-core: it keeps one HTTP-backed source
// fresh and logs every refresh until it is told to stop.
//
// The daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Building the session, store and source
// 4. Running the source coordinator until SIGTERM/SIGINT
//
// Scheduling, retries and fencing all live in datasync-core.
//
// ## Configuration
//
// ### Source
// - `DATASYNC_SOURCE_NAME`: Source name, used for store keys (default: remote)
// - `DATASYNC_URL`: Endpoint returning JSON (required)
// - `DATASYNC_PAGED`: Treat the endpoint as a paged list (default: false)
// - `DATASYNC_BEARER_TOKEN`: Bearer token sent with every request
//
// ### Timing
// - `DATASYNC_TTL_MS`: Time-to-live of fetched data (default: 1800000)
// - `DATASYNC_RETRY_MS`: Delay before retrying a failed fetch (default: 62000)
// - `DATASYNC_POLLING`: Refetch whenever the data expires (default: true)
//
// ### Session
// - `DATASYNC_OWNER_ID`: Identity the data is fetched for (default: local)
//
// ### Logging
// - `DATASYNC_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export DATASYNC_URL=https://api.example.com/v1/account/~/active-calls
// export DATASYNC_PAGED=true
// export DATASYNC_TTL_MS=300000
//
// datasyncd
// ```

use anyhow::{Context, Result};
use std::env;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

use datasync_core::config::{DEFAULT_TIME_TO_RETRY_MS, DEFAULT_TTL_MS};
use datasync_core::traits::Observable;
use datasync_core::{DataSource, LocalSession, MemoryStore, SourceConfig};
use datasync_fetch_http::{HttpFetcher, PagedFetcher};

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum SyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<SyncExitCode> for ExitCode {
    fn from(code: SyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug, Clone)]
struct Config {
    source_name: String,
    url: String,
    paged: bool,
    bearer_token: Option<String>,
    ttl_ms: u64,
    retry_ms: u64,
    polling: bool,
    owner_id: String,
    log_level: String,
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} has an invalid value '{}': {}", name, raw, e)),
        Err(_) => Ok(default),
    }
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Ok(Self {
            source_name: env::var("DATASYNC_SOURCE_NAME").unwrap_or_else(|_| "remote".to_string()),
            url: env::var("DATASYNC_URL").context("DATASYNC_URL is required")?,
            paged: parse_var("DATASYNC_PAGED", false)?,
            bearer_token: env::var("DATASYNC_BEARER_TOKEN")
                .ok()
                .filter(|t| !t.trim().is_empty()),
            ttl_ms: parse_var("DATASYNC_TTL_MS", DEFAULT_TTL_MS)?,
            retry_ms: parse_var("DATASYNC_RETRY_MS", DEFAULT_TIME_TO_RETRY_MS)?,
            polling: parse_var("DATASYNC_POLLING", true)?,
            owner_id: env::var("DATASYNC_OWNER_ID").unwrap_or_else(|_| "local".to_string()),
            log_level: env::var("DATASYNC_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.source_name.trim().is_empty() {
            anyhow::bail!("DATASYNC_SOURCE_NAME cannot be empty");
        }

        if !self.url.starts_with("https://") && !self.url.starts_with("http://") {
            anyhow::bail!(
                "DATASYNC_URL must use HTTP or HTTPS scheme. Got: {}",
                self.url
            );
        }

        if !(1_000..=86_400_000).contains(&self.ttl_ms) {
            anyhow::bail!(
                "DATASYNC_TTL_MS must be between 1000 and 86400000. Got: {}",
                self.ttl_ms
            );
        }

        if !(1_000..=3_600_000).contains(&self.retry_ms) {
            anyhow::bail!(
                "DATASYNC_RETRY_MS must be between 1000 and 3600000. Got: {}",
                self.retry_ms
            );
        }

        if self.owner_id.trim().is_empty() {
            anyhow::bail!("DATASYNC_OWNER_ID cannot be empty");
        }

        if parse_level(&self.log_level).is_none() {
            anyhow::bail!(
                "DATASYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            );
        }

        self.source_config().validate()?;
        Ok(())
    }

    fn source_config(&self) -> SourceConfig {
        let mut config = SourceConfig::new(self.source_name.trim()).with_polling(self.polling);
        config.ttl_ms = self.ttl_ms;
        config.time_to_retry_ms = self.retry_ms;
        config
    }
}

fn parse_level(level: &str) -> Option<Level> {
    match level.to_lowercase().as_str() {
        "trace" => Some(Level::TRACE),
        "debug" => Some(Level::DEBUG),
        "info" => Some(Level::INFO),
        "warn" => Some(Level::WARN),
        "error" => Some(Level::ERROR),
        _ => None,
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return SyncExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    let log_level = parse_level(&config.log_level).unwrap_or(Level::INFO);
    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return SyncExitCode::ConfigError.into();
    }

    info!("Starting datasyncd");
    if config.url.starts_with("http://") {
        warn!("DATASYNC_URL uses HTTP (not HTTPS)");
    }

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return SyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        if let Err(e) = run_daemon(config).await {
            error!("Daemon error: {:#}", e);
            SyncExitCode::RuntimeError
        } else {
            SyncExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Build the source for the configured endpoint and serve it
async fn run_daemon(config: Config) -> Result<()> {
    let session = Arc::new(LocalSession::new());
    let store = Arc::new(MemoryStore::new());

    info!(
        "Source '{}': {} (ttl {} ms, retry {} ms, polling {})",
        config.source_name, config.url, config.ttl_ms, config.retry_ms, config.polling
    );

    if config.paged {
        let mut fetcher = PagedFetcher::<serde_json::Value>::new(config.url.clone());
        if let Some(token) = &config.bearer_token {
            fetcher = fetcher.with_bearer_token(token.clone());
        }
        let source = DataSource::builder(config.source_config())
            .fetch(fetcher)
            .session(session.clone())
            .store(store.clone())
            .build()?;
        serve(source, &config, &session, &store, |records| records.len()).await
    } else {
        let mut fetcher = HttpFetcher::<serde_json::Value>::new(config.url.clone());
        if let Some(token) = &config.bearer_token {
            fetcher = fetcher.with_bearer_token(token.clone());
        }
        let source = DataSource::builder(config.source_config())
            .fetch(fetcher)
            .session(session.clone())
            .store(store.clone())
            .build()?;
        serve(source, &config, &session, &store, |value| match value {
            serde_json::Value::Array(items) => items.len(),
            _ => 1,
        })
        .await
    }
}

/// Run a source until a shutdown signal, logging every refresh
async fn serve<T, F>(
    source: DataSource<T>,
    config: &Config,
    session: &LocalSession,
    store: &MemoryStore,
    count: F,
) -> Result<()>
where
    T: Send + Sync + 'static,
    F: Fn(&T) -> usize,
{
    let task = source.spawn();
    let mut changes = store.changes();
    session.login(config.owner_id.as_str());

    let shutdown = wait_for_shutdown();
    tokio::pin!(shutdown);

    let mut last_timestamp = None;
    loop {
        tokio::select! {
            received = &mut shutdown => {
                info!("Received shutdown signal: {}", received?);
                break;
            }
            changed = changes.changed() => {
                if changed.is_err() {
                    warn!("Store closed, stopping");
                    break;
                }
                let timestamp = source.timestamp();
                if timestamp.is_some() && timestamp != last_timestamp {
                    last_timestamp = timestamp;
                    let at = timestamp
                        .and_then(chrono::DateTime::from_timestamp_millis)
                        .map(|t| t.to_rfc3339())
                        .unwrap_or_default();
                    let items = source.data().map(|d| count(&d)).unwrap_or(0);
                    info!("{}: refreshed at {} ({} item(s))", source.name(), at, items);
                }
            }
        }
    }

    info!("Shutting down {}", source.name());
    task.shutdown().await?;
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    })
}

/// Wait for shutdown signals (SIGINT only)
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
async fn wait_for_shutdown() -> Result<&'static str> {
    tokio::signal::ctrl_c()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to wait for CTRL-C: {}", e))?;
    Ok("SIGINT")
}
