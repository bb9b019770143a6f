use std::net::IpAddr;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use chain::ChainId;
use clap::Parser;
use metrics::server::MetricsServerConfig;
use networking::network::NetworkServiceConfig;
use networking::ordersync::{
    OrdersyncConfig, BACKOFF_BASE_MS, BACKOFF_MAX_MS, DEFAULT_PAGE_SIZE, MAX_PAGES_PER_SESSION,
    REQUEST_TIMEOUT_SECS, SESSION_TIMEOUT_SECS,
};

mod node;

use node::{NodeConfig, DEFAULT_MAX_ORDERS};

#[derive(Parser, Debug)]
struct Args {
    #[arg(short, long, default_value = "127.0.0.1")]
    address: IpAddr,

    #[arg(short, long, default_value_t = 60558)]
    port: u16,

    #[arg(short, long)]
    bootnodes: Vec<String>,

    #[arg(long, default_value_t = ChainId::GANACHE.get())]
    chain_id: u64,

    #[arg(long, default_value = "./data")]
    data_dir: PathBuf,

    /// Order filter configuration; every order is accepted when unset.
    #[arg(long)]
    custom_order_filter: Option<String>,

    #[arg(long, default_value_t = DEFAULT_PAGE_SIZE)]
    page_size: usize,

    #[arg(long, default_value_t = MAX_PAGES_PER_SESSION)]
    max_pages_per_session: usize,

    #[arg(long, default_value_t = DEFAULT_MAX_ORDERS)]
    max_orders: usize,

    #[arg(long, default_value_t = REQUEST_TIMEOUT_SECS)]
    request_timeout_secs: u64,

    #[arg(long, default_value_t = SESSION_TIMEOUT_SECS)]
    session_timeout_secs: u64,

    #[arg(long, default_value_t = BACKOFF_BASE_MS)]
    backoff_base_ms: u64,

    #[arg(long, default_value_t = BACKOFF_MAX_MS)]
    backoff_max_ms: u64,

    #[arg(long)]
    metrics: bool,

    #[arg(long, default_value = "127.0.0.1")]
    metrics_address: IpAddr,

    #[arg(long, default_value_t = 5054)]
    metrics_port: u16,
}

impl Args {
    fn into_config(self) -> NodeConfig {
        let chain_id = ChainId(self.chain_id);
        let request_timeout = Duration::from_secs(self.request_timeout_secs);

        let ordersync = OrdersyncConfig::new(chain_id)
            .with_page_size(self.page_size)
            .with_max_pages_per_session(self.max_pages_per_session)
            .with_timeouts(request_timeout, Duration::from_secs(self.session_timeout_secs))
            .with_backoff(
                Duration::from_millis(self.backoff_base_ms),
                Duration::from_millis(self.backoff_max_ms),
            );

        let network = NetworkServiceConfig::new(self.address, self.port, self.bootnodes)
            .with_supported_versions(ordersync.supported_versions.clone())
            .with_request_timeout(request_timeout);

        let metrics = self.metrics.then(|| MetricsServerConfig {
            metrics_address: self.metrics_address,
            metrics_port: self.metrics_port,
        });

        NodeConfig {
            chain_id,
            data_dir: self.data_dir,
            custom_order_filter: self.custom_order_filter,
            max_orders: self.max_orders,
            ordersync,
            network,
            metrics,
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let config = Args::parse().into_config();

    node::run(config).await
}
