//! Command-line interface for the bus bridge.

use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result};
use busbridge_core::config::{defaults, env_vars};
use busbridge_core::{BridgeConfig, LoopbackTransport, Transport};
use busbridge_drivers::{Bridge, ObjectSummary};
use clap::{Parser, Subcommand};

/// Bus bridge - expose audio controller buses over HTTP.
#[derive(Parser, Debug)]
#[command(name = "busbridge")]
#[command(author, version, about, long_about = None)]
struct Args {
    #[command(subcommand)]
    command: Command,

    /// Configuration file.
    #[arg(short, long, global = true, default_value = defaults::CONFIG_FILE)]
    config: PathBuf,

    /// Verbose output.
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Start the HTTP server.
    Serve {
        /// Host to bind to (overrides config).
        #[arg(long)]
        host: Option<String>,
        /// Port to bind to (overrides config).
        #[arg(short, long)]
        port: Option<u16>,
        /// Run against the in-memory loopback bus, echoing writes back.
        #[arg(long)]
        loopback: bool,
    },
    /// Print the configured object tree and the addresses each profile binds.
    Inspect {
        /// Emit JSON instead of a tree.
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.verbose);

    match args.command {
        Command::Serve {
            host,
            port,
            loopback,
        } => run_server(&args.config, host, port, loopback).await,
        Command::Inspect { json } => run_inspect(&args.config, json).await,
    }
}

fn init_logging(verbose: bool) {
    let json_logging = env_vars::parsed::<bool>(env_vars::LOG_JSON).unwrap_or(false);

    let default_level = if verbose { "busbridge=debug" } else { "busbridge=info" };
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level));

    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(env_filter)
            .with_target(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(env_filter)
            .with_target(false)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .compact()
            .init();
    }
}

fn load_config(path: &Path) -> Result<BridgeConfig> {
    let mut config = BridgeConfig::load(path)
        .with_context(|| format!("failed to load {}", path.display()))?;
    config.apply_env_overrides();
    config.validate()?;
    Ok(config)
}

async fn run_server(
    config_path: &Path,
    host: Option<String>,
    port: Option<u16>,
    loopback: bool,
) -> Result<()> {
    let mut config = load_config(config_path)?;
    if let Some(host) = host {
        config.server.host = host;
    }
    if let Some(port) = port {
        config.server.port = port;
    }

    // Only the loopback bus ships; hardware transports plug in here.
    if !loopback {
        anyhow::bail!("no hardware transport available; run with --loopback");
    }
    let transport: Arc<dyn Transport> = Arc::new(LoopbackTransport::with_echo());

    let bind: SocketAddr = format!("{}:{}", config.server.host, config.server.port)
        .parse()
        .with_context(|| {
            format!(
                "invalid bind address {}:{}",
                config.server.host, config.server.port
            )
        })?;

    tracing::info!(
        %bind,
        controllers = config.topology.controllers.len(),
        "Starting busbridge on the loopback bus"
    );
    let bridge = Bridge::start(config, transport).await?;
    busbridge_api::run(Arc::new(bridge), bind).await
}

async fn run_inspect(config_path: &Path, json: bool) -> Result<()> {
    let config = load_config(config_path)?;
    // A silent loopback is enough to compose the tree; nothing is sent.
    let bridge = Bridge::start(config, Arc::new(LoopbackTransport::new())).await?;
    let objects = bridge.describe_all();

    if json {
        println!("{}", serde_json::to_string_pretty(&objects)?);
    } else if objects.is_empty() {
        println!("No controllers configured.");
    } else {
        print_tree(&objects);
    }

    bridge.shutdown().await;
    Ok(())
}

fn print_tree(objects: &[ObjectSummary]) {
    for summary in objects {
        let object = &summary.object;
        let indent = match object.kind {
            busbridge_core::ObjectKind::Controller => "",
            busbridge_core::ObjectKind::Zone => "  ",
        };
        println!("{}{} {} ({})", indent, object.address, object.id, object.name);
        for profile in &summary.profiles {
            println!("{}  - {:<14} {}", indent, profile.kind.as_str(), profile.address);
        }
    }
}
