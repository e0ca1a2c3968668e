use anyhow::Context;
use clap::{value_parser, Arg, ArgMatches, Command};
use cytoclass_core::{PredictionService, ProcessInvoker, ServiceConfig};
use cytoclass_server::{routes, telemetry};
use cytoclass_store::SqliteStore;
use std::net::{IpAddr, SocketAddr};
use std::path::PathBuf;
use std::sync::Arc;

fn cli() -> Command {
    Command::new("cytoclass")
        .version(cytoclass_server::VERSION)
        .about("Breast tumor cytology classification service")
        .arg(
            Arg::new("port")
                .long("port")
                .global(true)
                .value_parser(value_parser!(u16))
                .help("Listen port (overrides PORT)"),
        )
        .arg(
            Arg::new("database")
                .long("database")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("SQLite database file (overrides DATABASE_PATH)"),
        )
        .arg(
            Arg::new("model-path")
                .long("model-path")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Scoring script (overrides MODEL_PATH)"),
        )
        .subcommand(Command::new("serve").about("Run the HTTP server (default)"))
        .subcommand(Command::new("probe").about("Check that the model runtime starts"))
}

/// Merge the nearest `.env` into the process environment
///
/// Variables already set in the environment keep their values. A missing
/// file is not an error.
fn load_env_file() -> Result<Option<PathBuf>, dotenvy::Error> {
    match dotenvy::dotenv() {
        Ok(path) => Ok(Some(path)),
        Err(e) if e.not_found() => Ok(None),
        Err(e) => Err(e),
    }
}

fn apply_overrides(config: &mut ServiceConfig, args: &ArgMatches) {
    if let Some(port) = args.get_one::<u16>("port") {
        config.port = *port;
    }
    if let Some(path) = args.get_one::<PathBuf>("database") {
        config.database_path.clone_from(path);
    }
    if let Some(path) = args.get_one::<PathBuf>("model-path") {
        config.model.script_path.clone_from(path);
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let matches = cli().get_matches();
    // Globals propagate down, so the subcommand's matches see every flag
    let args = matches.subcommand().map_or(&matches, |(_, sub)| sub);

    // Before tracing is up, so the outcome is logged below
    let env_file = load_env_file();
    let mut config =
        ServiceConfig::from_env().context("failed to load configuration from the environment")?;
    apply_overrides(&mut config, args);
    telemetry::init_tracing(&config).context("failed to initialize tracing")?;
    match env_file {
        Ok(Some(path)) => tracing::info!(path = %path.display(), "loaded environment file"),
        Ok(None) => {}
        Err(e) => tracing::warn!(error = %e, "failed to load environment file"),
    }

    match matches.subcommand_name() {
        Some("probe") => probe(&config).await,
        _ => serve(config).await,
    }
}

async fn probe(config: &ServiceConfig) -> anyhow::Result<()> {
    let version = ProcessInvoker::new(config.model.clone())
        .probe_runtime()
        .await
        .context("model runtime unavailable")?;
    println!("{}: {version}", config.model.executable);
    Ok(())
}

async fn serve(config: ServiceConfig) -> anyhow::Result<()> {
    let store = SqliteStore::open(&config.database_path).with_context(|| {
        format!(
            "failed to open database {}",
            config.database_path.display()
        )
    })?;

    let invoker = ProcessInvoker::new(config.model.clone());
    match invoker.probe_runtime().await {
        Ok(version) => tracing::info!(
            executable = %config.model.executable,
            %version,
            "model runtime available"
        ),
        Err(e) => tracing::warn!(
            error = %e,
            "model runtime check failed, predictions will fail until it is available"
        ),
    }

    let service = Arc::new(PredictionService::new(
        &config,
        Arc::new(invoker),
        Arc::new(store),
    ));

    let host: IpAddr = config
        .host
        .parse()
        .with_context(|| format!("invalid HOST {:?}", config.host))?;
    let (bound, server) = warp::serve(routes(service))
        .try_bind_with_graceful_shutdown(SocketAddr::new(host, config.port), shutdown_signal())
        .with_context(|| format!("failed to bind {host}:{}", config.port))?;

    tracing::info!(
        addr = %bound,
        environment = %config.environment,
        model = %config.model.script_path.display(),
        database = %config.database_path.display(),
        "server listening"
    );
    server.await;
    tracing::info!("server stopped");
    Ok(())
}

async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match (
            signal(SignalKind::terminate()),
            signal(SignalKind::interrupt()),
        ) {
            (Ok(mut sigterm), Ok(mut sigint)) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = sigint.recv() => {}
                }
            }
            _ => {
                tracing::warn!("signal handlers unavailable, waiting for ctrl-c");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
    tracing::info!("shutdown signal received");
}
