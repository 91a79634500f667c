use std::path::PathBuf;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::Duration;

use anyhow::Result;
use clap::Parser;
use ls_router::runtime::config::load_node_config;
use ls_router::runtime::node::LinkStateNode;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "routerd")]
#[command(about = "Link-state routing node daemon")]
struct Args {
    #[arg(long)]
    config: PathBuf,
    #[arg(long, default_value = "INFO")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(&args.log_level)?;

    let cfg = load_node_config(&args.config)?;
    let node = LinkStateNode::new(&cfg);
    node.turn_on()?;

    for link in &cfg.initial_links {
        node.add_link(link.neighbor_id, link.cost);
    }

    let running = Arc::new(AtomicBool::new(true));
    let signal_node = node.clone();
    let signal_running = Arc::clone(&running);
    ctrlc::set_handler(move || {
        signal_running.store(false, Ordering::Relaxed);
        signal_node.turn_off();
    })?;

    info!(router_id = node.router_id(), "routerd running, press Ctrl-C to stop");
    while running.load(Ordering::Relaxed) {
        thread::sleep(Duration::from_millis(200));
    }
    Ok(())
}

fn init_logging(level: &str) -> Result<()> {
    let level = level.parse::<Level>()?;
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .compact()
        .init();
    Ok(())
}
