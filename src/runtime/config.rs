use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;

#[derive(Debug, Clone)]
pub struct InitialLink {
    pub neighbor_id: u32,
    pub cost: u32,
}

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub router_id: u32,
    pub bind_address: String,
    pub hello_interval_s: u64,
    pub lsa_interval_s: u64,
    pub lsa_jitter_s: u64,
    pub lsa_ttl: u16,
    pub initial_links: Vec<InitialLink>,
}

#[derive(Debug, Deserialize)]
struct RawInitialLink {
    neighbor_id: u32,
    cost: Option<u32>,
}

#[derive(Debug, Deserialize)]
struct RawNodeConfig {
    router_id: u32,
    bind_address: Option<String>,
    hello_interval_s: Option<u64>,
    lsa_interval_s: Option<u64>,
    lsa_jitter_s: Option<u64>,
    lsa_ttl: Option<u16>,
    #[serde(default)]
    initial_links: Vec<RawInitialLink>,
}

pub fn load_node_config(path: &Path) -> Result<NodeConfig> {
    let raw_text = fs::read_to_string(path)
        .with_context(|| format!("failed to read config file {}", path.display()))?;
    let raw_cfg: RawNodeConfig =
        serde_yaml::from_str(&raw_text).context("failed to parse node config yaml")?;

    let initial_links = raw_cfg
        .initial_links
        .into_iter()
        .map(|item| InitialLink {
            neighbor_id: item.neighbor_id,
            cost: item.cost.unwrap_or(1),
        })
        .collect();

    Ok(NodeConfig {
        router_id: raw_cfg.router_id,
        bind_address: raw_cfg.bind_address.unwrap_or_else(|| "127.0.0.1".to_string()),
        hello_interval_s: raw_cfg.hello_interval_s.unwrap_or(15),
        lsa_interval_s: raw_cfg.lsa_interval_s.unwrap_or(30),
        lsa_jitter_s: raw_cfg.lsa_jitter_s.unwrap_or(5),
        lsa_ttl: raw_cfg.lsa_ttl.unwrap_or(60),
        initial_links,
    })
}
