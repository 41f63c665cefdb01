//! junban - Dependency-ordered service lifecycle orchestrator
//!
//! Entry point for the junban application.

use clap::Parser;
use junban::cli::{Cli, Commands, ConfigCommands, GraphArgs, RunArgs};
use junban::config::Config;
use junban::error::exit_code;
use junban::{GraphBuilder, JunbanError, Lifecycle, ServiceGraph, TokioExecutor};
use std::future::Future;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match load_config(&cli) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("{}", e);
            return ExitCode::from(e.exit_code() as u8);
        }
    };

    if let Err(e) = config.logging.init(cli.log_level()) {
        eprintln!("Failed to initialize logging: {}", e);
        return ExitCode::from(exit_code::GENERAL_ERROR as u8);
    }

    match run(&cli, &config) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("{}", e);
            ExitCode::from(e.exit_code() as u8)
        }
    }
}

/// Main application logic.
fn run(cli: &Cli, config: &Config) -> junban::Result<()> {
    match &cli.command {
        Commands::Run(args) => cmd_run(config, args),
        Commands::Graph(args) => cmd_graph(config, args),
        Commands::Config(subcmd) => cmd_config(config, subcmd),
    }
}

/// Handle the `run` command.
fn cmd_run(config: &Config, args: &RunArgs) -> junban::Result<()> {
    let graph = GraphBuilder::from_config(config).build()?;

    let runtime = tokio::runtime::Runtime::new().map_err(|e| {
        JunbanError::backend_with_source("Failed to create async runtime", e)
    })?;

    runtime.block_on(serve(graph, args.start_timeout))
}

/// Runs the graph until Ctrl-C or SIGTERM.
async fn serve(graph: ServiceGraph, start_timeout: Option<u64>) -> junban::Result<()> {
    let lifecycle = Lifecycle::new(graph, Arc::new(TokioExecutor::current()?));
    tracing::info!(
        run_id = %lifecycle.run_id(),
        services = lifecycle.len(),
        "Starting junban"
    );
    run_services(&lifecycle, start_timeout, shutdown_signal()).await
}

/// Starts the graph, waits for `shutdown`, then stops it.
///
/// `shutdown` is watched from the start, so a signal during startup still
/// stops whatever already started.
async fn run_services<S>(
    lifecycle: &Lifecycle,
    start_timeout: Option<u64>,
    shutdown: S,
) -> junban::Result<()>
where
    S: Future<Output = junban::Result<()>>,
{
    tokio::pin!(shutdown);

    let interrupted = tokio::select! {
        result = start_services(lifecycle, start_timeout) => {
            result?;
            None
        }
        signal = &mut shutdown => Some(signal),
    };

    if let Some(signal) = interrupted {
        tracing::warn!("Shutdown requested during startup");
        lifecycle.stop().await;
        tracing::info!("All services stopped");
        return signal;
    }

    for status in lifecycle.status() {
        tracing::info!(service = %status.name, state = %status.state, "Service ready");
    }
    tracing::info!("All services started; press Ctrl-C to stop");

    let signal = shutdown.await;
    lifecycle.stop().await;
    tracing::info!("All services stopped");
    signal
}

/// Starts the graph, giving up after `start_timeout` seconds.
async fn start_services(lifecycle: &Lifecycle, start_timeout: Option<u64>) -> junban::Result<()> {
    let Some(seconds) = start_timeout else {
        return lifecycle.start().await;
    };

    match tokio::time::timeout(Duration::from_secs(seconds), lifecycle.start()).await {
        Ok(result) => result,
        Err(_) => {
            lifecycle.stop().await;
            Err(JunbanError::Timeout {
                operation: "starting services".to_string(),
                seconds,
            })
        }
    }
}

/// Waits for Ctrl-C or, on unix, SIGTERM.
async fn shutdown_signal() -> junban::Result<()> {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut terminate = signal(SignalKind::terminate())?;
        tokio::select! {
            result = tokio::signal::ctrl_c() => result?,
            _ = terminate.recv() => {}
        }
    }

    #[cfg(not(unix))]
    tokio::signal::ctrl_c().await?;

    tracing::info!("Shutdown signal received");
    Ok(())
}

/// Handle the `graph` command.
fn cmd_graph(config: &Config, args: &GraphArgs) -> junban::Result<()> {
    let graph = GraphBuilder::from_config(config).build()?;
    let edges = graph.describe();

    if args.json {
        println!("{}", serde_json::to_string_pretty(&edges)?);
        return Ok(());
    }

    if edges.is_empty() {
        println!("No services configured");
        return Ok(());
    }

    for entry in &edges {
        println!("{}", entry.name);
        if entry.dependencies.is_empty() {
            println!("  depends on: (nothing)");
        } else {
            println!("  depends on: {}", entry.dependencies.join(", "));
        }
        if !entry.dependents.is_empty() {
            println!("  required by: {}", entry.dependents.join(", "));
        }
    }
    Ok(())
}

/// Handle the `config` subcommand.
///
/// Loading already validated the configuration; `validate` additionally
/// resolves the dependency graph.
fn cmd_config(config: &Config, subcmd: &ConfigCommands) -> junban::Result<()> {
    match subcmd {
        ConfigCommands::Validate => match GraphBuilder::from_config(config).build() {
            Ok(graph) => {
                println!("✓ Configuration is valid ({} services)", graph.len());
                tracing::debug!(?config, "Validated configuration");
                Ok(())
            }
            Err(e) => {
                println!("✗ Configuration is invalid: {}", e);
                Err(e)
            }
        },
        ConfigCommands::Show => {
            let yaml = serde_yaml::to_string(config).map_err(|e| {
                JunbanError::config_with_source("Failed to serialize configuration", e)
            })?;
            println!("{}", yaml);
            Ok(())
        }
    }
}

/// Load configuration with error handling.
fn load_config(cli: &Cli) -> junban::Result<Config> {
    let config_path = cli.config.as_deref();
    Config::load(config_path)
}
