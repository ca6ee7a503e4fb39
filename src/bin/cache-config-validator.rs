//! # Cache Configuration Validator
//!
//! Command-line tool for validating tiered cache configuration files, probing
//! the configured shared tier and running a short end-to-end demonstration.

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde_json::json;
use std::path::PathBuf;
use std::process;
use tiered_cache::cache::CacheCoordinator;
use tiered_cache::config::{CacheConfig, ConfigManager};
use tiered_cache::logging::redact_url;
use tracing::{error, info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "cache-config-validator")]
#[command(about = "Validate tiered cache configuration and probe the shared tier")]
#[command(version = env!("CARGO_PKG_VERSION"))]
pub struct Cli {
    /// Environment section to apply (development, test, production)
    #[arg(short, long, default_value = "development")]
    environment: String,

    /// Directory containing tiered-cache.yaml (default: config)
    #[arg(short, long)]
    config_dir: Option<PathBuf>,

    /// Verbose output level (use multiple times for more verbosity)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Output format
    #[arg(long, value_enum, default_value_t = OutputFormat::Table)]
    format: OutputFormat,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Table,
    Json,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load and validate the configuration
    Validate,

    /// Connect to the configured shared tier and run a health check
    Probe,

    /// Exercise the cache: set/get, promotion reads, metrics and diagnostics
    Demo,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = match cli.verbose {
        0 => Level::WARN,
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    };

    let _subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .try_init();

    let result = match &cli.command {
        Some(Commands::Validate) | None => validate(&cli),
        Some(Commands::Probe) => probe(&cli).await,
        Some(Commands::Demo) => demo(&cli).await,
    };

    match result {
        Ok(()) => {
            info!("Cache configuration check completed successfully");
            process::exit(0);
        }
        Err(e) => {
            error!("Cache configuration check failed: {:#}", e);
            eprintln!("❌ {:#}", e);
            process::exit(1);
        }
    }
}

fn load_config(cli: &Cli) -> Result<CacheConfig> {
    let manager =
        ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
            .context("failed to load cache configuration")?;
    Ok(manager.config().clone())
}

fn validate(cli: &Cli) -> Result<()> {
    let manager =
        ConfigManager::load_from_directory_with_env(cli.config_dir.clone(), &cli.environment)
            .context("failed to load cache configuration")?;

    match cli.format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&manager.debug_config())?);
        }
        OutputFormat::Table => {
            let config = manager.config();
            println!("🔧 Validating Tiered Cache Configuration");
            println!("Environment: {}", manager.environment());
            println!("Config File: {}", manager.config_file().display());
            println!();
            print_config_table(config);
            println!("\n✅ Configuration is valid");
        }
    }
    Ok(())
}

fn print_config_table(config: &CacheConfig) {
    let rows = [
        ("namespace", config.namespace.clone()),
        ("default_ttl_seconds", config.default_ttl_seconds.to_string()),
        ("hot_tier.max_entries", config.hot_tier.max_entries.to_string()),
        (
            "hot_tier.promotion_ttl_seconds",
            config.hot_tier.promotion_ttl_seconds.to_string(),
        ),
        ("shared_tier.enabled", config.shared_tier.enabled.to_string()),
        ("shared_tier.backend", config.shared_tier.backend.clone()),
        ("shared_tier.url", redact_url(&config.shared_tier.url)),
        (
            "shared_tier.operation_timeout_ms",
            config.shared_tier.operation_timeout_ms.to_string(),
        ),
        ("warming.enabled", config.warming.enabled.to_string()),
        ("warming.threshold", config.warming.threshold.to_string()),
        (
            "circuit_breaker.enabled",
            config.circuit_breaker.enabled.to_string(),
        ),
        (
            "circuit_breaker.failure_threshold",
            config.circuit_breaker.failure_threshold.to_string(),
        ),
        ("shutdown_grace_ms", config.shutdown_grace_ms.to_string()),
    ];

    let width = rows.iter().map(|(name, _)| name.len()).max().unwrap_or(0);
    for (name, value) in rows {
        println!("  {name:<width$}  {value}");
    }
}

async fn probe(cli: &Cli) -> Result<()> {
    let config = load_config(cli)?;
    println!(
        "🔌 Probing shared tier: {} ({})",
        config.shared_tier.backend,
        redact_url(&config.shared_tier.url)
    );

    let cache = CacheCoordinator::connect(config).await?;
    let healthy = cache.health_check().await;
    let metrics = cache.get_metrics();
    cache.shutdown().await;

    match cli.format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&json!({
                "healthy": healthy,
                "shared_backend": metrics.shared_backend,
                "connected": metrics.redis_connected,
                "circuit_state": metrics.circuit_state,
            }))?
        ),
        OutputFormat::Table => {
            println!("  backend:   {}", metrics.shared_backend);
            println!("  connected: {}", metrics.redis_connected);
            println!("  healthy:   {}", healthy);
        }
    }

    if !healthy {
        bail!("shared tier health check failed");
    }
    println!("✅ Shared tier reachable");
    Ok(())
}

async fn demo(cli: &Cli) -> Result<()> {
    let config = load_config(cli).unwrap_or_else(|e| {
        println!("⚠️  {e}; using environment defaults");
        CacheConfig::from_environment()
    });
    let cache = CacheCoordinator::connect(config).await?;

    cache
        .set("test_key", json!({"message": "hello", "source": "demo"}))
        .await;
    let value = cache.get("test_key").await;
    println!("test_key -> {}", serde_json::to_string(&value)?);

    cache
        .set(
            "stock:SAP.DE",
            json!({"symbol": "SAP.DE", "price": 123.45, "currency": "EUR"}),
        )
        .await;
    for attempt in 1..=3 {
        let quote = cache.get("stock:SAP.DE").await;
        println!("read #{attempt}: stock:SAP.DE -> {}", serde_json::to_string(&quote)?);
    }

    println!("\n📊 Metrics");
    println!("{}", serde_json::to_string_pretty(&cache.get_metrics())?);

    if cli.format == OutputFormat::Json {
        println!("\n🔎 Cache info");
        println!("{}", serde_json::to_string_pretty(&cache.get_cache_info())?);
    } else {
        println!("\n🔎 Hot tier entries");
        for entry in cache.get_cache_info().l1_cache {
            println!(
                "  {} (tier={}, hits={}, ttl={}s)",
                entry.key, entry.tier, entry.hit_count, entry.ttl
            );
        }
    }

    let report = cache.shutdown().await;
    println!(
        "\n✅ Demo finished (background tasks completed={}, aborted={})",
        report.completed, report.aborted
    );
    Ok(())
}
