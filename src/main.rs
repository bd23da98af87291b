//! proxyctl CLI - Control center for a local CLI AI proxy.

use clap::{Parser, Subcommand};
use colored::Colorize;
use proxyctl::api::{create_router_with_state, AppState};
use proxyctl::config::{Config, LogVerbosity};
use proxyctl::error::ManagerError;
use proxyctl::process::Supervisor;
use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::signal;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "proxyctl")]
#[command(about = "Control center for a local CLI AI proxy")]
#[command(version)]
struct Cli {
    /// Config file path
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the management server and GUI
    Serve {
        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Passthrough log verbosity
        #[arg(short, long, value_enum)]
        log_level: Option<LogLevel>,
    },

    /// Show whether the proxy is running
    Status,

    /// Start the proxy
    Start,

    /// Stop the proxy
    Stop,

    /// Restart the proxy
    Restart,

    /// Show current configuration
    Config {
        /// Show config file path
        #[arg(long)]
        path: bool,
    },
}

#[derive(Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
enum LogLevel {
    Minimal,
    Compact,
    Verbose,
}

impl From<LogLevel> for LogVerbosity {
    fn from(level: LogLevel) -> Self {
        match level {
            LogLevel::Minimal => LogVerbosity::Minimal,
            LogLevel::Compact => LogVerbosity::Compact,
            LogLevel::Verbose => LogVerbosity::Verbose,
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let serving = matches!(cli.command, None | Some(Commands::Serve { .. }));
    init_tracing(if serving { "info" } else { "warn" });

    let command = match cli.command {
        Some(Commands::Config { path }) => return show_config(path, cli.config),
        other => other,
    };

    let config = load_config(cli.config)?;
    match command {
        Some(Commands::Serve { port, log_level }) => run_server(config, port, log_level).await,
        Some(Commands::Status) => {
            print_status(&Supervisor::new(config.proxy)).await;
            Ok(())
        }
        Some(Commands::Start) => start(&Supervisor::new(config.proxy)).await,
        Some(Commands::Stop) => {
            stop(&Supervisor::new(config.proxy)).await;
            Ok(())
        }
        Some(Commands::Restart) => {
            let supervisor = Supervisor::new(config.proxy);
            stop(&supervisor).await;
            start(&supervisor).await
        }
        Some(Commands::Config { .. }) | None => run_server(config, None, None).await,
    }
}

fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false))
        .with(filter)
        .init();
}

fn load_config(path: Option<PathBuf>) -> anyhow::Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };
    Ok(config.with_env_overrides())
}

async fn run_server(
    mut config: Config,
    port_override: Option<u16>,
    log_level: Option<LogLevel>,
) -> anyhow::Result<()> {
    if let Some(level) = log_level {
        config.app.log_verbosity = level.into();
    }

    let port = port_override.unwrap_or(config.server.port);
    let host: IpAddr = config
        .server
        .host
        .parse()
        .unwrap_or(IpAddr::V4(Ipv4Addr::LOCALHOST));
    let addr = SocketAddr::new(host, port);
    let verbosity = config.app.log_verbosity;

    let state = Arc::new(AppState::new(config));
    let proxy_endpoint = format!("{}/v1", state.supervisor.proxy_base_url());
    let app = create_router_with_state(state);

    match verbosity {
        LogVerbosity::Minimal => {
            println!("proxyctl:{}", port);
        }
        LogVerbosity::Compact => {
            println!("→ proxyctl starting on http://{}", addr);
            println!("→ Proxy endpoint: {}", proxy_endpoint);
        }
        LogVerbosity::Verbose => {
            println!("────────────────────────────────────────");
            println!("proxyctl v{}", env!("CARGO_PKG_VERSION"));
            println!("────────────────────────────────────────");
            println!("Control center: http://{}", addr);
            println!("Management API: http://{}/api", addr);
            println!("Proxy endpoint: {}", proxy_endpoint);
            println!("────────────────────────────────────────");
            println!("Log Level:      {:?}", verbosity);
            println!("────────────────────────────────────────");
        }
    }

    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!("Management server listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    println!("\nManagement server stopped.");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}

fn success(message: &str) {
    println!("{} {}", "[+]".green(), message);
}

fn failure(message: &str) {
    eprintln!("{} {}", "[-]".red(), message);
}

fn notice(message: &str) {
    println!("{} {}", "[*]".cyan(), message);
}

async fn print_status(supervisor: &Supervisor) {
    let status = supervisor.status().await;
    match status.pid {
        Some(pid) if status.running => {
            success(&format!("Proxy is running (pid {})", pid));
            if let Some(mb) = status.memory_mb {
                notice(&format!("Memory: {:.1} MB", mb));
            }
            if status.endpoint_ready {
                notice(&format!("Endpoint: {}", status.endpoint));
            } else {
                notice(&format!("Endpoint: {} (not accepting connections yet)", status.endpoint));
            }
        }
        _ => notice("Proxy is not running"),
    }
}

/// Setup failures such as a missing binary or config are fatal.
async fn start(supervisor: &Supervisor) -> anyhow::Result<()> {
    match supervisor.start().await {
        Ok(info) => {
            success(&format!("Proxy started (pid {})", info.pid));
            Ok(())
        }
        Err(ManagerError::AlreadyRunning(pid)) => {
            notice(&format!("Proxy already running (pid {})", pid));
            Ok(())
        }
        Err(e) => {
            failure(&e.to_string());
            std::process::exit(1);
        }
    }
}

async fn stop(supervisor: &Supervisor) {
    match supervisor.stop().await {
        Ok(pid) => success(&format!("Proxy stopped (pid {})", pid)),
        Err(ManagerError::NotRunning) => notice("Proxy is not running"),
        Err(e) => failure(&e.to_string()),
    }
}

fn show_config(show_path: bool, path: Option<PathBuf>) -> anyhow::Result<()> {
    if show_path {
        println!("{}", path.unwrap_or_else(Config::default_path).display());
        return Ok(());
    }

    let config = load_config(path)?;
    println!("{}", toml::to_string_pretty(&config)?);
    Ok(())
}
