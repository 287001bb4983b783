//! Configuration handling for the netroute node.
//!
//! Settings come from an optional YAML (or TOML) file, then environment
//! variables, then command line flags, each layer overriding the previous.

use anyhow::{bail, Context, Result};
use netroute_routing::{Mode, SeenMessages};
use netroute_session::NodeConfig;
use netroute_topology::Directory;
use netroute_wire::{Address, NodeId};
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Node configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NetConfig {
    /// Node this process runs as
    pub node: Option<NodeId>,
    /// Routing mode
    pub mode: Mode,
    /// Interval between echo probe rounds
    #[serde(with = "human_duration")]
    pub probe_interval: Duration,
    /// Age after which an unanswered probe counts as lost
    #[serde(with = "human_duration")]
    pub echo_timeout: Duration,
    /// Bound on remembered message ids; unbounded when absent
    pub seen_capacity: Option<usize>,
    /// Socket to listen on; defaults to the node's own address
    pub listen: Option<String>,
    /// Node -> direct neighbors
    pub topology: BTreeMap<NodeId, Vec<NodeId>>,
    /// Node -> transport address
    pub names: BTreeMap<NodeId, Address>,
    /// `{"type": "topo", ...}` document, replaces `topology` when set
    pub topology_file: Option<PathBuf>,
    /// `{"type": "names", ...}` document, replaces `names` when set
    pub names_file: Option<PathBuf>,
}

impl Default for NetConfig {
    fn default() -> Self {
        Self {
            node: None,
            mode: Mode::LinkState,
            probe_interval: Duration::from_secs(10),
            echo_timeout: Duration::from_secs(5),
            seen_capacity: None,
            listen: None,
            topology: BTreeMap::new(),
            names: BTreeMap::new(),
            topology_file: None,
            names_file: None,
        }
    }
}

impl NetConfig {
    /// Load configuration from a file. `.toml` files are read as TOML,
    /// anything else as YAML.
    pub fn load_from_file<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let path = config_path.as_ref();
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {:?}", path))?;

        let config: Self = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => toml::from_str(&content)
                .with_context(|| format!("Failed to parse TOML config {:?}", path))?,
            _ => serde_yaml::from_str(&content)
                .with_context(|| format!("Failed to parse YAML config {:?}", path))?,
        };

        info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Apply environment variable overrides
    pub fn apply_environment_overrides(&mut self) -> Result<()> {
        self.apply_overrides_from(|key| std::env::var(key).ok())
    }

    /// Apply overrides from any key lookup (the environment in production)
    pub fn apply_overrides_from<F>(&mut self, lookup: F) -> Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(node) = lookup("NETROUTE_NODE") {
            info!("Node overridden by environment: {}", node);
            self.node = Some(NodeId::new(node));
        }

        if let Some(mode) = lookup("NETROUTE_MODE") {
            self.mode = mode
                .parse()
                .with_context(|| "Invalid NETROUTE_MODE".to_string())?;
            info!("Mode overridden by environment: {}", self.mode);
        }

        if let Some(interval) = lookup("NETROUTE_PROBE_INTERVAL") {
            self.probe_interval = humantime::parse_duration(&interval)
                .with_context(|| format!("Invalid NETROUTE_PROBE_INTERVAL '{}'", interval))?;
            info!("Probe interval overridden by environment: {:?}", self.probe_interval);
        }

        Ok(())
    }

    /// Reject settings the node cannot run with
    pub fn validate(&self) -> Result<()> {
        if self.probe_interval.is_zero() {
            bail!("probe_interval must be greater than zero");
        }
        if self.echo_timeout.is_zero() {
            bail!("echo_timeout must be greater than zero");
        }
        if self.seen_capacity == Some(0) {
            bail!("seen_capacity must be greater than zero when set");
        }
        Ok(())
    }

    /// Build and validate the network directory
    pub fn directory(&self) -> Result<Directory> {
        match (&self.topology_file, &self.names_file) {
            (Some(topo), Some(names)) => {
                let topo = std::fs::read_to_string(topo)
                    .with_context(|| format!("Failed to read topology file {:?}", topo))?;
                let names = std::fs::read_to_string(names)
                    .with_context(|| format!("Failed to read names file {:?}", names))?;
                Ok(Directory::from_documents(&topo, &names)?)
            }
            (None, None) => {
                if self.topology.is_empty() {
                    bail!("No topology configured (set `topology` and `names`, or `topology_file` and `names_file`)");
                }
                Ok(Directory::new(self.topology.clone(), self.names.clone())?)
            }
            _ => bail!("`topology_file` and `names_file` must be given together"),
        }
    }

    /// Node identity, required before the node can start
    pub fn node_id(&self) -> Result<NodeId> {
        match &self.node {
            Some(node) => Ok(node.clone()),
            None => bail!("No node configured (use --node, NETROUTE_NODE or `node` in the config file)"),
        }
    }

    /// Prober timing for the node manager
    pub fn node_config(&self) -> NodeConfig {
        NodeConfig {
            probe_interval: self.probe_interval,
            echo_timeout: self.echo_timeout,
        }
    }

    /// Seen-set matching `seen_capacity`
    pub fn seen_messages(&self) -> SeenMessages {
        SeenMessages::from_capacity(self.seen_capacity)
    }
}

/// Durations written as `10s`, `500ms`, `1m 30s`
mod human_duration {
    use super::*;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&humantime::format_duration(*value).to_string())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        let raw = String::deserialize(deserializer)?;
        humantime::parse_duration(&raw).map_err(serde::de::Error::custom)
    }
}
