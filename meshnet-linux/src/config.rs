//! Load config from file and environment.

use std::net::Ipv4Addr;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use meshnet_core::{MeshConfig, PhysicalAddress};
use serde::Deserialize;

/// Daemon configuration. File: ~/.config/meshnet/config.toml or /etc/meshnet/config.toml.
/// Env overrides: MESHNET_PORT, MESHNET_GATEWAY, MESHNET_NODE_NAME, MESHNET_ADDRESS, MESHNET_LOG.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    /// UDP port shared by every node on the LAN (default 47800).
    #[serde(default = "default_port")]
    pub port: u16,
    /// Where broadcast frames go (default 255.255.255.255).
    #[serde(default = "default_broadcast_addr")]
    pub broadcast_addr: Ipv4Addr,
    /// Engine tick period in ms (default 1000).
    #[serde(default = "default_tick_ms")]
    pub tick_ms: u64,
    /// Explicit node address; wins over `node_name`.
    #[serde(default)]
    pub address: Option<PhysicalAddress>,
    /// Name hashed into a stable address when `address` is unset.
    #[serde(default)]
    pub node_name: Option<String>,
    #[serde(default)]
    pub gateway: bool,
    /// Default filter when RUST_LOG is unset (default "info").
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default)]
    pub log_format: LogFormat,
    #[serde(default)]
    pub mesh: MeshConfig,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

fn default_port() -> u16 {
    47800
}
fn default_broadcast_addr() -> Ipv4Addr {
    Ipv4Addr::BROADCAST
}
fn default_tick_ms() -> u64 {
    1000
}
fn default_log_level() -> String {
    "info".to_string()
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: default_port(),
            broadcast_addr: default_broadcast_addr(),
            tick_ms: default_tick_ms(),
            address: None,
            node_name: None,
            gateway: false,
            log_level: default_log_level(),
            log_format: LogFormat::default(),
            mesh: MeshConfig::default(),
        }
    }
}

impl Config {
    /// Node address: explicit, else derived from the name, else random.
    pub fn node_address(&self) -> PhysicalAddress {
        if let Some(a) = self.address {
            return a;
        }
        match &self.node_name {
            Some(name) => PhysicalAddress::from_name(name),
            None => PhysicalAddress::random(),
        }
    }
}

/// Load config: merge default, then config file (if present), then env vars.
pub fn load() -> Result<Config> {
    let c = match config_paths().into_iter().find(|p| p.exists()) {
        Some(path) => load_file(&path)?,
        None => Config::default(),
    };
    apply_env(c, |key| std::env::var(key).ok())
}

fn config_paths() -> Vec<PathBuf> {
    let home = std::env::var_os("HOME").map(PathBuf::from);
    let mut out = Vec::new();
    if let Some(h) = home {
        out.push(h.join(".config/meshnet/config.toml"));
    }
    out.push(PathBuf::from("/etc/meshnet/config.toml"));
    out
}

fn load_file(path: &Path) -> Result<Config> {
    let s = std::fs::read_to_string(path)
        .with_context(|| format!("reading {}", path.display()))?;
    parse(&s).with_context(|| format!("parsing {}", path.display()))
}

pub fn parse(s: &str) -> Result<Config> {
    Ok(toml::from_str::<Config>(s)?)
}

/// Apply MESHNET_* overrides. Unparsable values are an error rather than ignored.
pub fn apply_env(mut c: Config, var: impl Fn(&str) -> Option<String>) -> Result<Config> {
    if let Some(s) = var("MESHNET_PORT") {
        c.port = s.parse().with_context(|| format!("MESHNET_PORT={s}"))?;
    }
    if let Some(s) = var("MESHNET_GATEWAY") {
        c.gateway = parse_bool(&s).with_context(|| format!("MESHNET_GATEWAY={s}"))?;
    }
    if let Some(s) = var("MESHNET_NODE_NAME") {
        c.node_name = Some(s);
    }
    if let Some(s) = var("MESHNET_ADDRESS") {
        c.address = Some(s.parse().with_context(|| format!("MESHNET_ADDRESS={s}"))?);
    }
    if let Some(s) = var("MESHNET_LOG") {
        c.log_level = s;
    }
    Ok(c)
}

fn parse_bool(s: &str) -> Result<bool> {
    match s.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => anyhow::bail!("expected a boolean, got {other:?}"),
    }
}
