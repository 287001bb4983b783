//! netroute node binary.
//!
//! Runs one routing node over TCP. Lines typed on stdin as `DEST message`
//! are routed to `DEST`; messages addressed to this node are printed.

use anyhow::{anyhow, Context};
use clap::Parser;
use netroute_routing::{Mode, Router};
use netroute_session::{NodeManager, TcpTransport};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::BufReader;
use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod config;
mod logging;
mod prompt;

use config::NetConfig;
use logging::RouteLogFormatter;

/// Routing node for flooding, distance-vector and link-state experiments
#[derive(Parser, Debug)]
#[command(name = "netroute", version, about = "Routing node for flooding, distance-vector and link-state experiments")]
struct Args {
    /// Configuration file (YAML, or TOML when named *.toml)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Node this process runs as, e.g. A
    #[arg(long)]
    node: Option<String>,

    /// Routing mode: flooding, distance_vector (dv), link_state (ls)
    #[arg(long)]
    mode: Option<Mode>,

    /// Listen address, e.g. 0.0.0.0:9001 (defaults to the node's address)
    #[arg(long)]
    listen: Option<String>,

    /// Echo probe interval, e.g. 10s
    #[arg(long)]
    probe_interval: Option<humantime::Duration>,

    /// Unanswered probe timeout, e.g. 5s
    #[arg(long)]
    echo_timeout: Option<humantime::Duration>,

    /// Topology document, `{"type": "topo", "config": {...}}`
    #[arg(long, requires = "names_file")]
    topo_file: Option<PathBuf>,

    /// Names document, `{"type": "names", "config": {...}}`
    #[arg(long, requires = "topo_file")]
    names_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

impl Args {
    /// Command line flags take precedence over file and environment
    fn apply_to(&self, config: &mut NetConfig) {
        if let Some(node) = &self.node {
            config.node = Some(node.as_str().into());
        }
        if let Some(mode) = self.mode {
            config.mode = mode;
        }
        if let Some(listen) = &self.listen {
            config.listen = Some(listen.clone());
        }
        if let Some(interval) = self.probe_interval {
            config.probe_interval = interval.into();
        }
        if let Some(timeout) = self.echo_timeout {
            config.echo_timeout = timeout.into();
        }
        if self.topo_file.is_some() {
            config.topology_file = self.topo_file.clone();
            config.names_file = self.names_file.clone();
        }
    }
}

#[tokio::main(flavor = "multi_thread")]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let level = &args.log_level;
    let env_filter = EnvFilter::new("warn")
        .add_directive(format!("netroute={}", level).parse()?)
        .add_directive(format!("netroute_routing={}", level).parse()?)
        .add_directive(format!("netroute_session={}", level).parse()?)
        .add_directive(format!("netroute_topology={}", level).parse()?)
        .add_directive(format!("netroute_wire={}", level).parse()?);

    let label = args
        .node
        .clone()
        .or_else(|| std::env::var("NETROUTE_NODE").ok())
        .unwrap_or_else(|| "netroute".to_string());

    tracing_subscriber::fmt()
        .with_env_filter(env_filter)
        .with_target(false)
        .event_format(RouteLogFormatter::new(label))
        .init();

    info!("Starting netroute v{}", env!("CARGO_PKG_VERSION"));

    let mut config = match &args.config {
        Some(path) => NetConfig::load_from_file(path)?,
        None => NetConfig::default(),
    };
    config.apply_environment_overrides()?;
    args.apply_to(&mut config);
    config.validate()?;

    let node = config.node_id()?;
    let directory = Arc::new(config.directory()?);
    let address = directory
        .address_of(&node)
        .cloned()
        .ok_or_else(|| anyhow!("Node {} is not part of the configured topology", node))?;

    info!(
        "Node {} at {} running {} routing (probe every {:?}, echo timeout {:?})",
        node, address, config.mode, config.probe_interval, config.echo_timeout
    );
    info!("Network: {}", directory);

    let listen = config.listen.clone().unwrap_or_else(|| address.to_string());
    let (transport, events) = TcpTransport::bind(&listen, address.clone())
        .await
        .with_context(|| format!("Failed to listen on {}", listen))?;

    let neighbor_addresses: Vec<_> = directory
        .neighbors_of(&node)
        .filter_map(|neighbor| directory.address_of(neighbor))
        .cloned()
        .collect();
    transport.dial_neighbors(neighbor_addresses).await;

    let router = Router::new(node.clone(), directory.clone(), config.mode, config.seen_messages())?;
    let (mut manager, handle) =
        NodeManager::new(router, Arc::new(transport), events, config.node_config());

    let (delivery_tx, delivery_rx) = mpsc::unbounded_channel();
    manager.set_delivery_sender(delivery_tx);

    tokio::spawn(async move {
        if let Err(e) = prompt::print_deliveries(delivery_rx, tokio::io::stdout()).await {
            warn!("Failed to print deliveries: {}", e);
        }
    });
    tokio::spawn(async move {
        let stdin = BufReader::new(tokio::io::stdin());
        if let Err(e) = prompt::run_prompt(handle, stdin, tokio::io::stdout()).await {
            warn!("Console input failed: {}", e);
        }
    });

    let mut sigterm = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
        .map_err(|e| anyhow!("Failed to install SIGTERM handler: {}", e))?;
    let mut sigint = tokio::signal::unix::signal(tokio::signal::unix::SignalKind::interrupt())
        .map_err(|e| anyhow!("Failed to install SIGINT handler: {}", e))?;

    let shutdown = async move {
        tokio::select! {
            _ = sigterm.recv() => info!("Received SIGTERM, shutting down"),
            _ = sigint.recv() => info!("Received SIGINT, shutting down"),
        }
    };

    let stats = manager.run(shutdown).await;
    info!(
        "Node {} stopped: {} forwarded, {} delivered, {} dropped",
        stats.local_node_id, stats.payloads_forwarded, stats.payloads_delivered, stats.payloads_dropped
    );
    for (reason, count) in &stats.drop_reasons {
        info!("  dropped {}: {}", reason, count);
    }

    Ok(())
}
