//! The tracker daemon.
//!
//! ```text
//! paxtrack <port> <cluster_size> <node_id> [master_host_port]
//! ```
//!
//! When `master_host_port` is absent this node is the cluster master.
//! The process exits `0` on clean shutdown (signal or control-channel
//! close) and non-zero on bootstrap failure.
use clap::Parser;
use tracing::info;

use paxtrack::config::Configuration;
use paxtrack::servers::signals;
use paxtrack::{app, bootstrap};

#[derive(Parser)]
#[command(name = env!("CARGO_PKG_NAME"), version, about = env!("CARGO_PKG_DESCRIPTION"))]
struct Args {
    /// Port the tracker RPC surface binds to.
    port: u16,
    /// Number of nodes in the cluster.
    cluster_size: usize,
    /// This node's stable position in the cluster.
    node_id: u32,
    /// Address of the master node; omit on the master itself.
    master_host_port: Option<String>,
    /// Maximum log verbosity (off, error, warn, info, debug, trace).
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    let cfg = Configuration {
        port: args.port,
        cluster_size: args.cluster_size,
        node_id: args.node_id,
        master_addr: args.master_host_port,
        log_level: args.log_level,
        ..Configuration::default()
    };

    bootstrap::app::setup(&cfg);

    match app::start(cfg).await {
        Ok(running) => {
            tokio::select! {
                () = signals::global_shutdown_signal() => info!("global shutdown signal received"),
                () = running.wait() => info!("tracker stopped"),
            }
            std::process::exit(0);
        }
        Err(e) => {
            eprintln!("bootstrap failed: {e}");
            std::process::exit(1);
        }
    }
}
