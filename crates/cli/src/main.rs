#![forbid(unsafe_code)]

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;

use anyhow::Result;
use clap::{ArgAction, Parser};
use metrics_exporter_prometheus::PrometheusBuilder;
use rollgate_controller::{manager, ObserveOnly};
use rollgate_core::config::{DEFAULT_QUEUE_CAP, DEFAULT_SYNC_TIMEOUT_SECS, DEFAULT_WORKERS};
use rollgate_core::ControllerConfig;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "rollgate", version, about = "Advanced deployment controller")]
struct Cli {
    /// Number of concurrent reconcile workers
    #[arg(long = "deployment-workers", env = "ROLLGATE_WORKERS", default_value_t = DEFAULT_WORKERS)]
    workers: usize,

    /// Enable the advanced deployment controller
    #[arg(
        long = "advanced-deployment",
        env = "ROLLGATE_ADVANCED_DEPLOYMENT",
        action = ArgAction::Set,
        default_value_t = true
    )]
    enabled: bool,

    /// Kubernetes namespace to watch (default: all namespaces)
    #[arg(long = "ns", env = "ROLLGATE_NAMESPACE")]
    namespace: Option<String>,

    /// Capacity of each cache ingest channel
    #[arg(long = "queue-cap", env = "ROLLGATE_QUEUE_CAP", default_value_t = DEFAULT_QUEUE_CAP)]
    queue_cap: usize,

    /// Seconds to wait for the initial list of every watched kind
    #[arg(long = "sync-timeout", env = "ROLLGATE_SYNC_TIMEOUT_SECS", default_value_t = DEFAULT_SYNC_TIMEOUT_SECS)]
    sync_timeout_secs: u64,
}

impl Cli {
    fn into_config(self) -> ControllerConfig {
        ControllerConfig {
            workers: self.workers,
            enabled: self.enabled,
            namespace: self.namespace,
            queue_cap: self.queue_cap,
            sync_timeout_secs: self.sync_timeout_secs,
        }
    }
}

/// `ROLLGATE_LOG` directives; unparsable input falls back to `info`.
fn env_filter(raw: Option<&str>) -> EnvFilter {
    raw.and_then(|r| EnvFilter::from_str(r).ok()).unwrap_or_else(|| EnvFilter::new("info"))
}

fn metrics_addr(raw: &str) -> Option<SocketAddr> { raw.trim().parse().ok() }

/// Install the log subscriber and, when `ROLLGATE_METRICS_ADDR` is set, the
/// Prometheus listener.
fn init_observability() {
    let log = std::env::var("ROLLGATE_LOG").ok();
    tracing_subscriber::fmt().with_env_filter(env_filter(log.as_deref())).with_target(true).init();

    let Ok(raw) = std::env::var("ROLLGATE_METRICS_ADDR") else { return };
    let Some(sock) = metrics_addr(&raw) else {
        warn!(addr = %raw, "invalid ROLLGATE_METRICS_ADDR; expected host:port");
        return;
    };
    match PrometheusBuilder::new().with_http_listener(sock).install() {
        Ok(()) => info!(%sock, "metrics exporter listening"),
        Err(e) => warn!(error = %e, "metrics exporter not installed; continuing without it"),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    init_observability();
    let config = Cli::parse().into_config().validate()?;
    info!(workers = config.workers, enabled = config.enabled, ns = ?config.namespace, "starting rollgate");
    manager::run(config, Arc::new(ObserveOnly)).await
}
