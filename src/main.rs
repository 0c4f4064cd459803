//! Pod Composer
//!
//! Command line front end: dry-run template matching against an inventory
//! snapshot, and composition of a node with optional assembly.

use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use pod_composer::{
    ComposedNodeService, ComposedNodeState, ComposerConfig, Error, HttpComputeActions,
    HttpStorageControlPlane, Inventory, InventorySnapshot, ProvisioningStatus,
    RemoteDriveAllocation, RequestedNode, Result,
};

// =============================================================================
// CLI Arguments
// =============================================================================

/// Pod Composer - compose logical nodes from pooled rack hardware
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Composer configuration file (YAML)
    #[arg(long, env = "COMPOSER_CONFIG", global = true)]
    config: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info", global = true)]
    log_level: String,

    /// Output logs as JSON
    #[arg(long, env = "LOG_JSON", global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// List the blades a template would accept, in allocation order
    Match(Inputs),

    /// Allocate a composed node for a template
    Compose(ComposeArgs),
}

#[derive(ClapArgs, Debug)]
struct Inputs {
    /// Inventory snapshot (YAML)
    #[arg(long, env = "COMPOSER_INVENTORY")]
    inventory: PathBuf,

    /// Node template (YAML)
    #[arg(long)]
    template: PathBuf,
}

#[derive(ClapArgs, Debug)]
struct ComposeArgs {
    #[command(flatten)]
    inputs: Inputs,

    /// Wait for a delegated remote target creation to finish
    #[arg(long)]
    wait: bool,

    /// Maximum time to wait for the remote target
    #[arg(long, default_value = "900")]
    wait_timeout_secs: u64,

    /// Assemble the node once allocated
    #[arg(long)]
    assemble: bool,

    /// Write the resulting inventory back to the snapshot file
    #[arg(long)]
    write_inventory: bool,

    /// Print composer metrics on exit
    #[arg(long)]
    metrics: bool,
}

// =============================================================================
// Main
// =============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    init_logging(&args);

    let config = match &args.config {
        Some(path) => ComposerConfig::from_file(path)?,
        None => ComposerConfig::default(),
    };

    info!("Starting {} {}", pod_composer::NAME, pod_composer::VERSION);

    match args.command {
        Command::Match(inputs) => run_match(&inputs, &config),
        Command::Compose(compose) => run_compose(&compose, &config).await,
    }
}

fn load(inputs: &Inputs, config: &ComposerConfig) -> Result<(Arc<Inventory>, RequestedNode)> {
    let snapshot = InventorySnapshot::from_file(&inputs.inventory)?;
    let inventory = Inventory::from_snapshot(snapshot, config.event_channel_capacity)?;
    let template = RequestedNode::from_yaml(&std::fs::read_to_string(&inputs.template)?)?;
    Ok((inventory, template))
}

fn build_service(
    inventory: Arc<Inventory>,
    config: &ComposerConfig,
) -> Result<Arc<ComposedNodeService>> {
    let compute = Arc::new(HttpComputeActions::new(&config.compute)?);
    let control_plane = Arc::new(HttpStorageControlPlane::new(&config.provisioning)?);
    ComposedNodeService::new(inventory, compute, control_plane, config)
}

fn run_match(inputs: &Inputs, config: &ComposerConfig) -> Result<()> {
    let (inventory, template) = load(inputs, config)?;
    let service = build_service(inventory, config)?;

    let blades = service.matching_blades(&template)?;
    if blades.is_empty() {
        println!("No blade matches template {}", template.name);
    }
    for blade in blades {
        println!("{}", blade);
    }
    Ok(())
}

async fn run_compose(args: &ComposeArgs, config: &ComposerConfig) -> Result<()> {
    let (inventory, template) = load(&args.inputs, config)?;
    let service = build_service(inventory, config)?;

    let shutdown = CancellationToken::new();
    let reconciler = service.start(shutdown.clone());

    let creation = service.create_composed_node(&template)?;
    let node_id = creation.node_id;
    info!("Composed node {} created", node_id);

    if let RemoteDriveAllocation::Delegated(handle) = &creation.remote {
        if args.wait {
            let timeout = Duration::from_secs(args.wait_timeout_secs);
            match tokio::time::timeout(timeout, handle.wait()).await {
                Ok(ProvisioningStatus::Completed(address)) => {
                    info!("Remote target available at {}", address);
                    // Pick up the target if it is already in the inventory
                    service.reconciler().sweep();
                }
                Ok(status) => warn!("Remote target creation ended with {:?}", status),
                Err(_) => {
                    handle.abort();
                    warn!("Gave up waiting for the remote target after {:?}", timeout);
                }
            }
        } else {
            info!("Remote target is being created in the background");
        }
    }

    if args.assemble {
        let state = service.composed_node(node_id)?.state;
        if state == ComposedNodeState::Allocated {
            service.assemble(node_id).await?;
        } else {
            warn!("Composed node {} is {}, skipping assembly", node_id, state);
        }
    }

    let node = service.composed_node(node_id)?;
    print!("{}", serde_yaml::to_string(&node)?);

    if args.write_inventory {
        service.inventory().snapshot().save(&args.inputs.inventory)?;
        info!("Inventory written to {}", args.inputs.inventory.display());
    }

    if args.metrics {
        print!("{}", service.metrics().encode()?);
    }

    shutdown.cancel();
    reconciler
        .await
        .map_err(|e| Error::Internal(format!("reconciler task failed: {}", e)))?;
    Ok(())
}

// =============================================================================
// Logging Setup
// =============================================================================

fn init_logging(args: &Args) {
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let mut filter = EnvFilter::from_default_env().add_directive(level.into());
    for directive in ["hyper=warn", "reqwest=info", "rustls=warn"] {
        if let Ok(directive) = directive.parse() {
            filter = filter.add_directive(directive);
        }
    }

    // Logs go to stderr, stdout carries command output
    if args.log_json {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().json().with_writer(std::io::stderr))
            .init();
    } else {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_target(true).with_writer(std::io::stderr))
            .init();
    }
}
