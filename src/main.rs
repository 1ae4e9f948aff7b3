use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use mcpulse::config::Config;
use mcpulse::lease::{CoordinationStore, MemoryCoordinator, RedisCoordinator, SharedCoordinationStore};
use mcpulse::models::{ServerKind, ServerRecord};
use mcpulse::poller::PollerService;
use mcpulse::probe::{MinecraftProbe, StatusProbe};
use mcpulse::store::{MemoryStore, PostgresStore, SharedRegistry, SharedStatusStore, StoreConfig};

#[derive(Parser)]
#[command(
    name = "mcpulse",
    version,
    about = "Distributed Minecraft server status poller",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables are used otherwise
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json)
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Compete for the poller lease and poll until Ctrl-C / SIGTERM
    Run {
        /// Use in-memory stores instead of Redis and PostgreSQL
        #[arg(long, default_value = "false")]
        memory: bool,

        /// Server to register in memory mode, as KIND:ADDRESS (repeatable)
        #[arg(long = "server", value_name = "KIND:ADDRESS")]
        servers: Vec<String>,

        /// Create the status table if it does not exist
        #[arg(long, default_value = "false")]
        migrate: bool,

        /// Serve Prometheus metrics on this address (e.g. 0.0.0.0:9090)
        #[arg(long, value_name = "ADDR")]
        metrics_addr: Option<SocketAddr>,
    },

    /// Probe a single server once and print the snapshot as JSON
    Probe {
        /// Server address (host or host:port)
        address: String,

        /// Server kind (java, bedrock)
        #[arg(short, long, default_value = "java")]
        kind: String,

        /// Probe timeout in milliseconds
        #[arg(short, long)]
        timeout_ms: Option<u64>,
    },

    /// Show who currently holds the poller lease
    Lease,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => Config::from_file(path)?,
        None => Config::from_env()?,
    };

    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, &config.logging.level, cli.verbose)?;

    config.validate().context("Invalid configuration")?;

    match cli.command {
        Commands::Run {
            memory,
            servers,
            migrate,
            metrics_addr,
        } => {
            tracing::info!(memory, migrate, metrics_addr = ?metrics_addr, "Starting run command");
            run(config, memory, servers, migrate, metrics_addr).await?;
        }

        Commands::Probe {
            address,
            kind,
            timeout_ms,
        } => {
            tracing::info!(address = %address, kind = %kind, "Starting probe command");
            probe(&config, &address, &kind, timeout_ms).await?;
        }

        Commands::Lease => {
            lease(&config).await?;
        }
    }

    Ok(())
}

fn setup_tracing(format: &str, level: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("mcpulse=debug,info")
    } else {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(format!("mcpulse={level},warn")))
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}

/// Resolve on Ctrl-C or SIGTERM
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to listen for Ctrl-C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
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
        _ = ctrl_c => tracing::info!("Received Ctrl-C"),
        _ = terminate => tracing::info!("Received SIGTERM"),
    }
}

fn parse_server_arg(index: usize, arg: &str) -> Result<ServerRecord> {
    let (kind, address) = arg
        .split_once(':')
        .with_context(|| format!("Expected KIND:ADDRESS, got {arg:?}"))?;
    Ok(ServerRecord::new(index as i64 + 1, address, &kind.to_ascii_uppercase()))
}

/// Coordination store, registry and status store used by `run`
struct Backends {
    coordination: SharedCoordinationStore,
    registry: SharedRegistry,
    store: SharedStatusStore,
}

impl Backends {
    fn memory(servers: Vec<ServerRecord>) -> Self {
        let store = Arc::new(MemoryStore::with_servers(servers));
        Self {
            coordination: Arc::new(MemoryCoordinator::new()),
            registry: store.clone(),
            store,
        }
    }

    async fn connect(config: &Config, migrate: bool) -> Result<Self> {
        let coordination = RedisCoordinator::connect(&config.redis)
            .await
            .context("Failed to connect to Redis")?;
        let store = PostgresStore::connect(StoreConfig::from(&config.database))
            .await
            .context("Failed to connect to PostgreSQL")?;
        if migrate {
            store.ensure_schema().await?;
        }

        let store = Arc::new(store);
        Ok(Self {
            coordination: Arc::new(coordination),
            registry: store.clone(),
            store,
        })
    }
}

async fn run(
    config: Config,
    memory: bool,
    servers: Vec<String>,
    migrate: bool,
    metrics_addr: Option<SocketAddr>,
) -> Result<()> {
    if let Err(e) = mcpulse::metrics::init_metrics() {
        tracing::warn!(error = %e, "Metrics initialization failed, continuing without metrics");
    }

    let metrics_server = match metrics_addr {
        Some(addr) => {
            let listener = mcpulse::metrics::server::bind(addr).await?;
            let (stop, stopped) = tokio::sync::oneshot::channel::<()>();
            let task = tokio::spawn(mcpulse::metrics::server::serve(listener, async {
                let _ = stopped.await;
            }));
            Some((stop, task))
        }
        None => None,
    };

    let backends = if memory {
        let records = servers
            .iter()
            .enumerate()
            .map(|(i, arg)| parse_server_arg(i, arg))
            .collect::<Result<Vec<_>>>()?;
        tracing::info!(servers = records.len(), "Using in-memory stores");
        Backends::memory(records)
    } else {
        Backends::connect(&config, migrate).await?
    };

    let service = PollerService::from_config(
        &config,
        backends.coordination,
        backends.registry,
        backends.store,
        Arc::new(MinecraftProbe::new()),
    );
    let handle = service.start();

    shutdown_signal().await;

    let grace = config.probe_timeout() * 2 + Duration::from_secs(5);
    if !handle.stop_within(grace).await {
        tracing::warn!("Forced shutdown before workers drained");
    }

    if let Some((stop, task)) = metrics_server {
        let _ = stop.send(());
        match task.await {
            Ok(Err(e)) => tracing::warn!(error = %e, "Metrics server exited with error"),
            Err(e) => tracing::warn!(error = %e, "Metrics server task panicked"),
            Ok(Ok(())) => {}
        }
    }

    let stats = service.stats();
    tracing::info!(
        cycles = stats.cycles,
        probes_ok = stats.probes_ok,
        probe_failures = stats.probe_failures,
        writes = stats.writes,
        dedup_skips = stats.dedup_skips,
        "Poller finished"
    );
    Ok(())
}

async fn probe(config: &Config, address: &str, kind: &str, timeout_ms: Option<u64>) -> Result<()> {
    let kind: ServerKind = kind.to_ascii_uppercase().parse()?;
    let timeout = timeout_ms
        .map(Duration::from_millis)
        .unwrap_or_else(|| config.probe_timeout());

    let snapshot = MinecraftProbe::new()
        .probe(address, kind, timeout)
        .await
        .with_context(|| format!("Failed to probe {kind} server at {address}"))?;

    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

async fn lease(config: &Config) -> Result<()> {
    let coordination = RedisCoordinator::connect(&config.redis)
        .await
        .context("Failed to connect to Redis")?;

    let key = &config.lease.key;
    match coordination.get(key).await? {
        Some(token) => {
            let ttl = coordination.remaining_ttl(key).await?;
            println!("Lease {key} held by {token}");
            if let Some(ttl) = ttl {
                println!("  Expires in: {:.1}s", ttl.as_secs_f64());
            }
        }
        None => println!("Lease {key} is free"),
    }
    Ok(())
}
