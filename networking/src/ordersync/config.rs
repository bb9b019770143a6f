/// Ordersync configuration.
///
/// Operational parameters for pulling orders from peers: page sizes,
/// per-request and per-session bounds, and retry backoff.
use std::time::Duration;

use chain::ChainId;

use super::protocol::SubprotocolVersion;

/// Orders requested per page unless configured otherwise.
pub const DEFAULT_PAGE_SIZE: usize = 500;

/// Largest page a provider will serve regardless of what was asked for.
pub const MAX_PAGE_SIZE: usize = 500;

/// Upper bound on pages fetched in one session.
pub const MAX_PAGES_PER_SESSION: usize = 10_000;

pub const REQUEST_TIMEOUT_SECS: u64 = 20;

pub const SESSION_TIMEOUT_SECS: u64 = 5 * 60;

/// Lifetime of an offset-pagination snapshot on the provider side.
pub const SNAPSHOT_TTL_SECS: u64 = 60;

/// Snapshots retained at once; the oldest is evicted beyond this.
pub const MAX_SNAPSHOTS: usize = 64;

/// How long a removed order hash is refused re-entry into the store.
pub const REMOVED_ORDER_TTL_SECS: u64 = 10 * 60;

/// Removed hashes remembered at once; the oldest are forgotten beyond this.
pub const MAX_REMOVED_ORDERS: usize = 100_000;

pub const BACKOFF_BASE_MS: u64 = 1_000;

pub const BACKOFF_MAX_MS: u64 = 60_000;

#[derive(Debug, Clone)]
pub struct OrdersyncConfig {
    pub chain_id: ChainId,
    pub supported_versions: Vec<SubprotocolVersion>,
    pub page_size: usize,
    pub max_page_size: usize,
    pub max_pages_per_session: usize,
    pub request_timeout: Duration,
    pub session_timeout: Duration,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl OrdersyncConfig {
    pub fn new(chain_id: ChainId) -> Self {
        Self {
            chain_id,
            supported_versions: SubprotocolVersion::ALL.to_vec(),
            page_size: DEFAULT_PAGE_SIZE,
            max_page_size: MAX_PAGE_SIZE,
            max_pages_per_session: MAX_PAGES_PER_SESSION,
            request_timeout: Duration::from_secs(REQUEST_TIMEOUT_SECS),
            session_timeout: Duration::from_secs(SESSION_TIMEOUT_SECS),
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(BACKOFF_MAX_MS),
        }
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_supported_versions(mut self, versions: Vec<SubprotocolVersion>) -> Self {
        self.supported_versions = versions;
        self
    }

    pub fn with_max_pages_per_session(mut self, max_pages: usize) -> Self {
        self.max_pages_per_session = max_pages;
        self
    }

    pub fn with_timeouts(mut self, request: Duration, session: Duration) -> Self {
        self.request_timeout = request;
        self.session_timeout = session;
        self
    }

    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_max = max;
        self
    }

    /// Page size actually sent on the wire. Zero is treated as one.
    pub fn effective_page_size(&self) -> usize {
        self.page_size.max(1)
    }
}
