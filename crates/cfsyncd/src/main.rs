// # cfsyncd - Cloudflare Sync Daemon
//
// This daemon is a THIN integration layer:
// - Reading configuration from environment variables
// - Initializing logging and the runtime
// - Wiring the Cloudflare remote and the HTTP IP source into the sync engine
// - Translating SIGTERM/SIGINT into engine shutdown
//
// All reconciliation logic lives in cfsync-core.
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Provider
// - `CFSYNC_API_TOKEN`: Cloudflare API token (required)
// - `CFSYNC_MODE`: `live` (default) or `dry-run`
// - `CFSYNC_VERIFY_TOKEN`: Check the token before starting (default: true)
//
// ### Domains
// - `CFSYNC_DOMAINS`: Comma-separated domains published for both families
// - `CFSYNC_IP4_DOMAINS`: Comma-separated domains published for IPv4 only
// - `CFSYNC_IP6_DOMAINS`: Comma-separated domains published for IPv6 only
//
// ### IP detection
// - `CFSYNC_IP4_PROVIDER`: `cloudflare.trace` (default), an http(s) URL, or `none`
// - `CFSYNC_IP6_PROVIDER`: same, for IPv6
//
// ### IP lists
// - `CFSYNC_WAF_LISTS`: Comma-separated `account_id/list_name` entries
// - `CFSYNC_WAF_LIST_DESCRIPTION`: Description of lists created by cfsync
// - `CFSYNC_WAF_LIST_ITEM_COMMENT`: Comment of items added by cfsync
//
// ### Records
// - `CFSYNC_TTL`: TTL of new records, 1 = automatic (default: 1)
// - `CFSYNC_PROXIED`: Proxy new records (default: false)
// - `CFSYNC_RECORD_COMMENT`: Comment of new records
//
// ### Engine
// - `CFSYNC_UPDATE_INTERVAL_SECS`: Seconds between cycles (default: 300)
// - `CFSYNC_DETECTION_TIMEOUT_SECS`: Bound for one detection (default: 5)
// - `CFSYNC_UPDATE_TIMEOUT_SECS`: Bound for one domain or list (default: 30)
// - `CFSYNC_CACHE_TTL_SECS`: Lifetime of cached provider data (default: 21600)
// - `CFSYNC_UPDATE_ON_START`: Run a cycle at startup (default: true)
// - `CFSYNC_DELETE_ON_STOP`: Remove managed records and lists on exit (default: false)
// - `CFSYNC_LOG_LEVEL`: trace, debug, info, warn, error (default: info)
//
// ## Example
//
// ```bash
// export CFSYNC_API_TOKEN=your_token
// export CFSYNC_DOMAINS=example.com,www.example.com
// export CFSYNC_IP6_PROVIDER=none
// export CFSYNC_WAF_LISTS=0123456789abcdef/home
//
// cfsyncd
// ```

use anyhow::{Context, Result};
use cfsync_cloudflare::CloudflareApi;
use cfsync_core::config::{ProviderConfig, SyncConfig, WafListConfig};
use cfsync_core::{Domain, IpFamily, SyncEngine};
use cfsync_ip_http::HttpIpSource;
use std::collections::HashMap;
use std::env;
use std::process::ExitCode;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{Level, debug, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum CfsyncExitCode {
    /// Clean shutdown (normal exit)
    CleanShutdown = 0,
    /// Configuration error or startup failure
    ConfigError = 1,
    /// Runtime error (unexpected failure)
    RuntimeError = 2,
}

impl From<CfsyncExitCode> for ExitCode {
    fn from(code: CfsyncExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Where the address of one family comes from
#[derive(Debug, Clone, PartialEq, Eq)]
enum Detection {
    /// The built-in Cloudflare trace endpoint
    Trace,
    /// A custom endpoint
    Url(String),
    /// The family is not managed
    Disabled,
}

impl Detection {
    fn parse(var: &str, value: &str) -> Result<Self> {
        match value.trim() {
            "" | "cloudflare.trace" => Ok(Detection::Trace),
            "none" => Ok(Detection::Disabled),
            url if url.starts_with("https://") || url.starts_with("http://") => {
                if url.starts_with("http://") {
                    eprintln!(
                        "WARNING: {} uses HTTP (not HTTPS). \
                        Detected addresses could be tampered with.",
                        var
                    );
                }
                Ok(Detection::Url(url.to_string()))
            }
            other => anyhow::bail!(
                "{} '{}' is not supported. \
                Use cloudflare.trace, an http(s) URL, or none",
                var,
                other
            ),
        }
    }
}

/// Application configuration
struct Config {
    sync: SyncConfig,
    detection: HashMap<IpFamily, Detection>,
    verify_token: bool,
    log_level: Level,
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration from any variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        let api_token = var("CFSYNC_API_TOKEN").context(
            "CFSYNC_API_TOKEN is required. Set it via: export CFSYNC_API_TOKEN=your_token",
        )?;
        validate_token(&api_token)?;

        let dry_run = match var("CFSYNC_MODE").as_deref() {
            None | Some("live") => false,
            Some("dry-run") => true,
            Some(other) => anyhow::bail!(
                "CFSYNC_MODE '{}' is not valid. Valid modes: live, dry-run",
                other
            ),
        };

        let mut sync = SyncConfig::new(ProviderConfig::Cloudflare { api_token, dry_run });

        let mut detection = HashMap::new();
        for (family, key) in [
            (IpFamily::V4, "CFSYNC_IP4_PROVIDER"),
            (IpFamily::V6, "CFSYNC_IP6_PROVIDER"),
        ] {
            let source = match var(key) {
                Some(value) => Detection::parse(key, &value)?,
                None => Detection::Trace,
            };
            detection.insert(family, source);
        }
        sync.families = IpFamily::ALL
            .into_iter()
            .filter(|family| detection.get(family) != Some(&Detection::Disabled))
            .collect();

        let shared = parse_domains("CFSYNC_DOMAINS", var("CFSYNC_DOMAINS"))?;
        for (family, key) in [
            (IpFamily::V4, "CFSYNC_IP4_DOMAINS"),
            (IpFamily::V6, "CFSYNC_IP6_DOMAINS"),
        ] {
            let mut domains = parse_domains(key, var(key))?;
            if sync.families.contains(&family) {
                domains.extend(shared.iter().cloned());
            } else if !domains.is_empty() {
                anyhow::bail!(
                    "{} is set but {} detection is disabled",
                    key,
                    family
                );
            }
            domains.sort();
            domains.dedup();
            if !domains.is_empty() {
                sync.domains.insert(family, domains);
            }
        }

        let description = var("CFSYNC_WAF_LIST_DESCRIPTION").unwrap_or_default();
        let item_comment = var("CFSYNC_WAF_LIST_ITEM_COMMENT").unwrap_or_default();
        for entry in split_list(var("CFSYNC_WAF_LISTS")) {
            let (account_id, name) = entry.split_once('/').with_context(|| {
                format!(
                    "CFSYNC_WAF_LISTS entry '{}' must look like account_id/list_name",
                    entry
                )
            })?;
            sync.waf_lists.push(
                WafListConfig::new(account_id, name)
                    .with_description(description.clone())
                    .with_item_comment(item_comment.clone()),
            );
        }

        sync.record_attrs.ttl = parse_or("CFSYNC_TTL", var("CFSYNC_TTL"), 1)?;
        sync.record_attrs.proxied = parse_bool("CFSYNC_PROXIED", var("CFSYNC_PROXIED"), false)?;
        sync.record_attrs.comment = var("CFSYNC_RECORD_COMMENT").unwrap_or_default();

        let engine = &mut sync.engine;
        engine.update_interval_secs = parse_or(
            "CFSYNC_UPDATE_INTERVAL_SECS",
            var("CFSYNC_UPDATE_INTERVAL_SECS"),
            300,
        )?;
        engine.detection_timeout_secs = parse_or(
            "CFSYNC_DETECTION_TIMEOUT_SECS",
            var("CFSYNC_DETECTION_TIMEOUT_SECS"),
            5,
        )?;
        engine.update_timeout_secs = parse_or(
            "CFSYNC_UPDATE_TIMEOUT_SECS",
            var("CFSYNC_UPDATE_TIMEOUT_SECS"),
            30,
        )?;
        engine.update_on_start =
            parse_bool("CFSYNC_UPDATE_ON_START", var("CFSYNC_UPDATE_ON_START"), true)?;
        engine.delete_on_stop =
            parse_bool("CFSYNC_DELETE_ON_STOP", var("CFSYNC_DELETE_ON_STOP"), false)?;

        sync.cache.ttl_secs = parse_or(
            "CFSYNC_CACHE_TTL_SECS",
            var("CFSYNC_CACHE_TTL_SECS"),
            sync.cache.ttl_secs,
        )?;

        let verify_token = parse_bool("CFSYNC_VERIFY_TOKEN", var("CFSYNC_VERIFY_TOKEN"), true)?;

        let log_level = match var("CFSYNC_LOG_LEVEL")
            .unwrap_or_else(|| "info".to_string())
            .to_lowercase()
            .as_str()
        {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            other => anyhow::bail!(
                "CFSYNC_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                other
            ),
        };

        Ok(Self {
            sync,
            detection,
            verify_token,
            log_level,
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        if self.sync.engine.update_interval_secs < 30 {
            anyhow::bail!(
                "CFSYNC_UPDATE_INTERVAL_SECS must be at least 30 seconds. Got: {}",
                self.sync.engine.update_interval_secs
            );
        }

        self.sync.validate()?;
        Ok(())
    }

    /// Build the IP source for the enabled families
    fn ip_source(&self) -> Result<HttpIpSource> {
        let mut source = HttpIpSource::new()?;
        for family in IpFamily::ALL {
            source = match self.detection.get(&family) {
                Some(Detection::Url(url)) => source.with_url(family, url.clone()),
                Some(Detection::Disabled) => source.without(family),
                Some(Detection::Trace) | None => source,
            };
        }
        Ok(source)
    }
}

fn validate_token(token: &str) -> Result<()> {
    // Cloudflare API tokens are 40 characters
    if token.len() < 20 {
        anyhow::bail!(
            "CFSYNC_API_TOKEN appears too short ({} chars). \
            Cloudflare tokens are typically 40 characters. \
            Verify your token is correct.",
            token.len()
        );
    }

    let lower = token.to_lowercase();
    if lower.contains("your_token") || lower.contains("replace_me") || lower.contains("example") {
        anyhow::bail!(
            "CFSYNC_API_TOKEN appears to be a placeholder. \
            Use an actual API token from the Cloudflare dashboard."
        );
    }

    Ok(())
}

fn split_list(value: Option<String>) -> Vec<String> {
    value
        .unwrap_or_default()
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

fn parse_domains(key: &str, value: Option<String>) -> Result<Vec<Domain>> {
    split_list(value)
        .iter()
        .map(|name| Domain::parse(name).with_context(|| format!("{}: invalid domain", key)))
        .collect()
}

fn parse_or<T>(key: &str, value: Option<String>, default: T) -> Result<T>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match value {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} '{}' is not valid: {}", key, raw, e)),
        None => Ok(default),
    }
}

fn parse_bool(key: &str, value: Option<String>, default: bool) -> Result<bool> {
    match value.as_deref().map(str::trim).map(str::to_lowercase).as_deref() {
        None => Ok(default),
        Some("true" | "1" | "yes" | "on") => Ok(true),
        Some("false" | "0" | "no" | "off") => Ok(false),
        Some(other) => anyhow::bail!("{} '{}' is not a boolean", key, other),
    }
}

fn main() -> ExitCode {
    // Load configuration from environment
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {:#}", e);
            return CfsyncExitCode::ConfigError.into();
        }
    };

    // Validate configuration
    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {:#}", e);
        return CfsyncExitCode::ConfigError.into();
    }

    let subscriber = FmtSubscriber::builder()
        .with_max_level(config.log_level)
        .finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CfsyncExitCode::ConfigError.into();
    }

    info!("Starting cfsyncd daemon");
    info!(
        families = ?config.sync.families,
        lists = config.sync.waf_lists.len(),
        "Configuration loaded"
    );

    // Enter tokio runtime
    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CfsyncExitCode::RuntimeError.into();
        }
    };

    let result = rt.block_on(async {
        let engine = match start(&config).await {
            Ok(engine) => engine,
            Err(e) => {
                error!("Startup failed: {:#}", e);
                return CfsyncExitCode::ConfigError;
            }
        };

        match run_daemon(engine).await {
            Ok(()) => CfsyncExitCode::CleanShutdown,
            Err(e) => {
                error!("Daemon error: {:#}", e);
                CfsyncExitCode::RuntimeError
            }
        }
    });

    result.into()
}

/// Build the remote, check its token and assemble the engine
async fn start(config: &Config) -> Result<SyncEngine> {
    let api = CloudflareApi::from_config(&config.sync.provider)?;

    if config.verify_token {
        api.verify_token()
            .await
            .context("API token verification failed")?;
        info!("API token verified");
    }

    let ip_source = config.ip_source()?;
    let (engine, mut events) =
        SyncEngine::new(Box::new(ip_source), Arc::new(api), config.sync.clone())?;

    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            debug!(?event, "engine event");
        }
    });

    Ok(engine)
}

/// Run the engine until a shutdown signal arrives
async fn run_daemon(engine: SyncEngine) -> Result<()> {
    let shutdown = CancellationToken::new();

    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            match wait_for_shutdown().await {
                Ok(signal) => info!("Received shutdown signal: {}", signal),
                Err(e) => warn!("Signal handling failed, shutting down: {}", e),
            }
            shutdown.cancel();
        }
    });

    engine.run(shutdown).await?;
    info!("cfsyncd stopped");
    Ok(())
}

/// Wait for shutdown signals (SIGTERM, SIGINT)
///
/// # Returns
///
/// Returns the name of the signal received.
#[cfg(unix)]
async fn wait_for_shutdown() -> Result<&'static str> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    let signal = tokio::select! {
        _ = sigterm.recv() => "SIGTERM",
        _ = sigint.recv() => "SIGINT",
    };
    Ok(signal)
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
