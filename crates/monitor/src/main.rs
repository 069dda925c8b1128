//! astmon
//!
//! Asterisk manager status poller.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand};
use monitor::config::{default_config_path, Config};
use monitor::{
    AmiTransport, ManagerEndpoint, PollEvent, PollRunner, PollScheduler, SessionManager, Severity,
    TargetRegistry, TargetStatus,
};
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// astmon - poll Asterisk connection, extension and mailbox status.
#[derive(Parser, Debug)]
#[command(name = "astmon")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands.
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Poll continuously until interrupted
    Run,

    /// Poll once and print every target's status
    Check {
        /// Output in JSON format
        #[arg(long)]
        json: bool,
    },

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long, short)]
        force: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let config_path = cli.config.clone().unwrap_or_else(default_config_path);

    if let Commands::InitConfig { force } = cli.command {
        init_logging(cli.verbose, "info");
        return init_config(&config_path, force);
    }

    let mut config = Config::load(&config_path)?;
    config.apply_env_overrides();
    init_logging(cli.verbose, &config.daemon.log_level);
    tracing::debug!("Using config file: {:?}", config_path);

    config.validate()?;

    match cli.command {
        Commands::Run => run(&config).await,
        Commands::Check { json } => check(&config, json).await,
        Commands::InitConfig { .. } => Ok(()),
    }
}

/// `RUST_LOG` wins, then `--verbose`, then the configured level.
fn init_logging(verbose: bool, configured: &str) {
    let default_level = if verbose { "debug" } else { configured };
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();
}

fn build_scheduler(config: &Config) -> anyhow::Result<PollScheduler<AmiTransport>> {
    let registry = Arc::new(TargetRegistry::new(
        config.monitor.extensions.iter().cloned(),
        config.monitor.mailboxes.iter().cloned(),
    )?);

    let transport = AmiTransport::new(
        config.manager.connect_timeout(),
        config.manager.action_timeout(),
    );
    let session = SessionManager::new(transport, ManagerEndpoint::from(&config.manager));

    Ok(PollScheduler::new(session, registry))
}

/// Poll until SIGINT or SIGTERM, then log off.
async fn run(config: &Config) -> anyhow::Result<()> {
    let mut scheduler = build_scheduler(config)?;
    tracing::info!(
        "astmon starting ({} targets, manager {}:{})",
        scheduler.registry().len(),
        config.manager.host,
        config.manager.port
    );

    let events = scheduler.subscribe();
    tokio::spawn(log_events(events));

    let shutdown = CancellationToken::new();
    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        wait_for_shutdown_signal().await;
        signal_token.cancel();
    });

    let runner = PollRunner::new(config.monitor.poll_interval(), shutdown);
    runner.run(&mut scheduler).await;

    scheduler.session_mut().close().await;
    tracing::info!("astmon stopped");
    Ok(())
}

/// Connect, poll once and print the result.
async fn check(config: &Config, json: bool) -> anyhow::Result<()> {
    let mut scheduler = build_scheduler(config)?;

    // Connect up front so the connection target reflects this run.
    if let Err(e) = scheduler.session_mut().ensure_connected().await {
        tracing::warn!("{}", e);
    }
    let report = scheduler.tick().await;
    scheduler.session_mut().close().await;

    let statuses = scheduler.registry().reader().snapshot();
    if json {
        println!("{}", serde_json::to_string_pretty(&statuses)?);
    } else {
        print_table(&statuses);
        if report.failed > 0 {
            println!();
            println!("{} target(s) failed to poll", report.failed);
        }
    }

    Ok(())
}

fn print_table(statuses: &[TargetStatus]) {
    let width = statuses
        .iter()
        .map(|s| s.name.len())
        .max()
        .unwrap_or(0)
        .max("TARGET".len());

    println!("{:<width$}  STATUS", "TARGET", width = width);
    for status in statuses {
        println!("{:<width$}  {}", status.name, status.status, width = width);
    }
}

fn init_config(path: &Path, force: bool) -> anyhow::Result<()> {
    if path.exists() && !force {
        anyhow::bail!(
            "Config file already exists at {} (use --force to overwrite)",
            path.display()
        );
    }

    Config::default().save(path)?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

async fn log_events(mut events: broadcast::Receiver<PollEvent>) {
    loop {
        match events.recv().await {
            Ok(PollEvent::StatusChanged { target, status }) => {
                tracing::info!("{}: {}", target, status);
            }
            Ok(PollEvent::Diagnostic(diagnostic)) => match diagnostic.severity {
                Severity::Error => {
                    tracing::error!("{}: {}", diagnostic.target, diagnostic.message);
                }
                Severity::Warning => {
                    tracing::warn!("{}: {}", diagnostic.target, diagnostic.message);
                }
            },
            Ok(PollEvent::TickCompleted(report)) => {
                tracing::debug!(
                    "Tick {} complete ({} polled, {} failed)",
                    report.tick,
                    report.polled,
                    report.failed
                );
            }
            Err(broadcast::error::RecvError::Lagged(skipped)) => {
                tracing::warn!("Event logger lagged, {} events skipped", skipped);
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Wait for a shutdown signal (SIGTERM or SIGINT).
#[cfg(unix)]
async fn wait_for_shutdown_signal() {
    use tokio::signal::unix::{signal, SignalKind};

    let mut sigterm = match signal(SignalKind::terminate()) {
        Ok(s) => s,
        Err(e) => {
            tracing::error!("Failed to register SIGTERM handler: {}", e);
            let _ = tokio::signal::ctrl_c().await;
            return;
        }
    };

    tokio::select! {
        _ = sigterm.recv() => {
            tracing::info!("Received SIGTERM");
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("Received SIGINT");
        }
    }
}

#[cfg(not(unix))]
async fn wait_for_shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("Received Ctrl-C");
}
