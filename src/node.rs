use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use chain::{init_metadata, ChainId, ChainMetadata, FileMetadataStore};
use metrics::server::{run_metrics_server, MetricsServerConfig};
use metrics::Metrics;
use networking::network::{NetworkService, NetworkServiceConfig, OutboundRequest, SwarmTransport};
use networking::ordersync::{
    MemoryOrderStore, OrderEventSubscription, OrdersyncConfig, OrdersyncCoordinator,
    OrdersyncProvider,
};
use order_filter::OrderFilter;
use tokio::sync::mpsc;
use tokio::task;
use tracing::{debug, info, warn};

pub const DEFAULT_MAX_ORDERS: usize = 100_000;

#[derive(Debug, Clone)]
pub struct NodeConfig {
    pub chain_id: ChainId,
    pub data_dir: PathBuf,
    /// Filter configuration text. `None` accepts every order.
    pub custom_order_filter: Option<String>,
    pub max_orders: usize,
    pub ordersync: OrdersyncConfig,
    pub network: NetworkServiceConfig,
    pub metrics: Option<MetricsServerConfig>,
}

/// Everything that exists before the node touches the network.
pub struct NodeComponents {
    pub metadata: ChainMetadata,
    pub filter: OrderFilter,
    pub store: Arc<MemoryOrderStore>,
    pub provider: OrdersyncProvider,
    pub coordinator: OrdersyncCoordinator,
    pub metrics: Option<Arc<Metrics>>,
    outbound_requests: mpsc::UnboundedReceiver<OutboundRequest>,
}

impl NodeComponents {
    /// Builds the ordersync stack.
    ///
    /// The chain binding is checked first: on a mismatch nothing else is
    /// constructed and the node must not start.
    pub fn build(config: &NodeConfig) -> Result<Self> {
        let metadata_store = FileMetadataStore::new(&config.data_dir);
        let metadata = init_metadata(config.chain_id, &metadata_store)
            .with_context(|| format!("Failed to verify chain metadata in {:?}", config.data_dir))?;

        let filter = match &config.custom_order_filter {
            Some(text) => OrderFilter::compile(text).context("Invalid custom order filter")?,
            None => OrderFilter::accept_all(),
        };
        info!(fingerprint = %filter.fingerprint(), "Using order filter");

        let metrics = config.metrics.as_ref().map(|_| Arc::new(Metrics::new()));

        let store = Arc::new(MemoryOrderStore::new(
            metadata.chain_id,
            config.max_orders,
            filter.clone(),
        ));

        let provider = OrdersyncProvider::new(
            store.clone(),
            filter.clone(),
            config.ordersync.supported_versions.clone(),
            config.ordersync.max_page_size,
        );

        let (transport, outbound_requests) = SwarmTransport::channel();
        let coordinator = OrdersyncCoordinator::new(
            config.ordersync.clone(),
            Arc::new(transport),
            store.clone(),
            filter.clone(),
            metrics.clone(),
        );

        Ok(Self {
            metadata,
            filter,
            store,
            provider,
            coordinator,
            metrics,
            outbound_requests,
        })
    }
}

/// Runs the node until the network service stops or ctrl-c is received.
pub async fn run(config: NodeConfig) -> Result<()> {
    let NodeComponents {
        metadata,
        store,
        provider,
        coordinator,
        metrics,
        outbound_requests,
        ..
    } = NodeComponents::build(&config)?;
    info!(chain_id = %metadata.chain_id, data_dir = ?config.data_dir, "Starting mesh node");

    let event_handle = task::spawn(watch_order_events(
        store.events().subscribe(),
        store.clone(),
        metrics.clone(),
    ));

    if let (Some(metrics_config), Some(metrics)) = (config.metrics.clone(), metrics.clone()) {
        task::spawn(async move {
            if let Err(err) = run_metrics_server(metrics_config, metrics).await {
                warn!(%err, "Metrics server exited with error");
            }
        });
    }

    let mut network_service = NetworkService::new(
        Arc::new(config.network.clone()),
        provider,
        coordinator.clone(),
        outbound_requests,
        metrics,
    )
    .await
    .context("Failed to create network service")?;
    info!(peer_id = %network_service.local_peer_id(), "Network service created");

    let network_handle = task::spawn(async move { network_service.start().await });

    let result = tokio::select! {
        joined = network_handle => match joined {
            Ok(result) => result.context("Network service exited with error"),
            Err(err) => Err(err).context("Network service task failed"),
        },
        signal = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal");
            signal.context("Failed to listen for shutdown signal")
        }
    };

    coordinator.shutdown();
    event_handle.abort();
    info!(stats = ?coordinator.stats(), "Mesh node stopped");

    result
}

async fn watch_order_events(
    mut subscription: OrderEventSubscription,
    store: Arc<MemoryOrderStore>,
    metrics: Option<Arc<Metrics>>,
) {
    while let Some(batch) = subscription.recv().await {
        for event in &batch {
            debug!(order_hash = %event.order_hash, end_state = ?event.end_state, "Order event");
        }
        if let Some(metrics) = &metrics {
            metrics.set_stored_orders(store.len() as i64);
        }
    }
}
