pub mod server;

use prometheus::{Encoder, HistogramOpts, HistogramVec, IntCounterVec, IntGauge, Opts, Registry, TextEncoder};

#[derive(Clone)]
pub struct Metrics {
    registry: Registry,
    peers: IntGauge,
    peer_connection_events: IntCounterVec,
    peer_disconnection_events: IntCounterVec,
    // Ordersync
    active_sessions: IntGauge,
    sessions: IntCounterVec,
    pages_fetched: IntCounterVec,
    orders: IntCounterVec,
    session_duration: HistogramVec,
    requests_served: IntCounterVec,
    // Order store
    stored_orders: IntGauge,
}

impl Metrics {
    pub fn new() -> Self {
        let registry = Registry::new();

        let peers = IntGauge::with_opts(Opts::new("mesh_peers_connected", "Number of connected peers")).unwrap();
        registry.register(Box::new(peers.clone())).unwrap();

        // Network
        let peer_connection_events = IntCounterVec::new(
            Opts::new("mesh_peer_connection_events_total", "Total number of peer connection events"),
            &["direction", "result"],
        ).unwrap();
        registry.register(Box::new(peer_connection_events.clone())).unwrap();

        let peer_disconnection_events = IntCounterVec::new(
            Opts::new("mesh_peer_disconnection_events_total", "Total number of peer disconnection events"),
            &["direction", "reason"],
        ).unwrap();
        registry.register(Box::new(peer_disconnection_events.clone())).unwrap();

        // Ordersync
        let active_sessions = IntGauge::with_opts(Opts::new(
            "mesh_ordersync_active_sessions",
            "Number of ordersync sessions currently running",
        )).unwrap();
        registry.register(Box::new(active_sessions.clone())).unwrap();

        let sessions = IntCounterVec::new(
            Opts::new("mesh_ordersync_sessions_total", "Total number of ordersync sessions by outcome"),
            &["outcome"],
        ).unwrap();
        registry.register(Box::new(sessions.clone())).unwrap();

        let pages_fetched = IntCounterVec::new(
            Opts::new("mesh_ordersync_pages_fetched_total", "Total number of pages fetched from peers"),
            &["version"],
        ).unwrap();
        registry.register(Box::new(pages_fetched.clone())).unwrap();

        let orders = IntCounterVec::new(
            Opts::new("mesh_ordersync_orders_total", "Total number of orders received through ordersync"),
            &["result"],
        ).unwrap();
        registry.register(Box::new(orders.clone())).unwrap();

        let session_duration = HistogramVec::new(
            HistogramOpts::new("mesh_ordersync_session_duration_seconds", "Time taken by a completed ordersync session")
                .buckets(vec![0.05, 0.1, 0.5, 1.0, 5.0, 10.0, 30.0, 60.0, 300.0]),
            &[],
        ).unwrap();
        registry.register(Box::new(session_duration.clone())).unwrap();

        let requests_served = IntCounterVec::new(
            Opts::new("mesh_ordersync_requests_served_total", "Total number of inbound ordersync requests answered"),
            &["kind", "result"],
        ).unwrap();
        registry.register(Box::new(requests_served.clone())).unwrap();

        // Order store
        let stored_orders = IntGauge::with_opts(Opts::new("mesh_orders_stored", "Number of orders in the local store")).unwrap();
        registry.register(Box::new(stored_orders.clone())).unwrap();

        Self {
            registry,
            peers,
            peer_connection_events,
            peer_disconnection_events,
            active_sessions,
            sessions,
            pages_fetched,
            orders,
            session_duration,
            requests_served,
            stored_orders,
        }
    }

    pub fn gather(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::<u8>::new();
        let encoder = TextEncoder::new();
        encoder.encode(&metric_families, &mut buffer).expect("failed to encode metrics");
        String::from_utf8(buffer).expect("metrics not utf8")
    }

    pub fn set_peers(&self, v: i64) {
        self.peers.set(v);
    }

    // Network
    pub fn inc_peer_connection(&self, direction: &str, result: &str) {
        self.peer_connection_events.with_label_values(&[direction, result]).inc();
    }

    pub fn inc_peer_disconnection(&self, direction: &str, reason: &str) {
        self.peer_disconnection_events.with_label_values(&[direction, reason]).inc();
    }

    // Ordersync
    pub fn set_active_sessions(&self, v: i64) {
        self.active_sessions.set(v);
    }

    /// `outcome` is `done` or the label of the error that ended the session.
    pub fn inc_sessions(&self, outcome: &str) {
        self.sessions.with_label_values(&[outcome]).inc();
    }

    pub fn inc_pages_fetched(&self, version: &str, pages: u64) {
        self.pages_fetched.with_label_values(&[version]).inc_by(pages);
    }

    pub fn inc_orders(&self, result: &str, count: u64) {
        self.orders.with_label_values(&[result]).inc_by(count);
    }

    pub fn observe_session_duration(&self, duration: f64) {
        self.session_duration.with_label_values::<&str>(&[]).observe(duration);
    }

    pub fn inc_requests_served(&self, kind: &str, result: &str) {
        self.requests_served.with_label_values(&[kind, result]).inc();
    }

    // Order store
    pub fn set_stored_orders(&self, v: i64) {
        self.stored_orders.set(v);
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}
