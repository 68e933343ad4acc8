//! nodebus - Main entry point
//!
//! Loads configuration, opens a bus session and runs one discovery scan.

mod config;

use anyhow::Result;
use clap::Parser;
use nodebus_discovery::{DiscoveredNodeSet, NodeScanner};
use nodebus_transport::{RetryingTransport, SharedBus};
use std::path::PathBuf;
use tracing::{info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "nodebus")]
#[command(about = "Discover timing nodes on a shared bus and report their API levels")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "nodebus.toml")]
    config: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short, long, default_value = "info")]
    log_level: String,

    /// Print discovered nodes as JSON
    #[arg(long)]
    json: bool,

    /// Write a default configuration file to the config path and exit
    #[arg(long)]
    write_default_config: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("nodebus v{}", env!("CARGO_PKG_VERSION"));

    if args.write_default_config {
        config::save_default_config(&args.config)?;
        info!(path = %args.config.display(), "Wrote default configuration");
        return Ok(());
    }

    let config = config::load_config(&args.config)?;

    info!(
        addresses = ?config.discovery.addresses,
        offset = config.discovery.index_offset,
        fast_probe = config.discovery.fast_probe,
        "Configuration loaded"
    );

    if config.simulated_nodes.is_empty() {
        warn!("No simulated nodes configured, the scan will find nothing");
    }

    let bus = SharedBus::new(config.to_sim_bus(), config.to_bus_config());
    let transport = RetryingTransport::new(bus, config.to_transport_config());
    let scanner = NodeScanner::new(config.to_discovery_config())?;

    let nodes = scanner.scan(&transport);

    if args.json {
        println!("{}", serde_json::to_string_pretty(&nodes.summaries())?);
    } else {
        print_nodes(&nodes);
    }

    Ok(())
}

fn print_nodes(nodes: &DiscoveredNodeSet) {
    println!("Discovered {} nodes:", nodes.len());
    for node in nodes {
        println!(
            "  - node {} at address {} (API level {})",
            node.index + 1,
            node.address(),
            node.api_level
        );
        if node.read_error_count() > 0 {
            println!("    Read errors: {}", node.read_error_count());
        }
        if let Some(latency) = node.io_latency() {
            println!("    Last read latency: {:?}", latency);
        }
    }
}
