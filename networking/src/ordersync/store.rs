use std::collections::{BTreeMap, HashMap, VecDeque};
use std::ops::Bound;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use chain::ChainId;
use containers::{
    AcceptedOrderInfo, GetOrdersResponse, OrderEvent, OrderEventEndState, OrderHash, OrderInfo,
    RejectedOrderInfo, RejectedOrderKind, RejectedOrderStatus, SignedOrder, U256,
    ValidationResults,
};
use order_filter::OrderFilter;
use parking_lot::Mutex;
use thiserror::Error;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use super::config::{MAX_REMOVED_ORDERS, MAX_SNAPSHOTS, REMOVED_ORDER_TTL_SECS, SNAPSHOT_TTL_SECS};
use super::events::OrderEventFeed;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("{0} is not a removal transition")]
    NotARemoval(OrderEventEndState),

    #[error("order store unavailable: {0}")]
    Unavailable(String),
}

/// Atomic accept/reject boundary for incoming orders.
///
/// Must be safe to call from many sessions at once; offering an order that
/// is already stored is accepted again without creating a second record.
#[async_trait]
pub trait OrderValidator: Send + Sync {
    async fn validate_and_store_valid_orders(
        &self,
        orders: Vec<SignedOrder>,
        pinned: bool,
        chain_id: ChainId,
    ) -> Result<ValidationResults, StoreError>;
}

/// Read side of the order store, ordered by order hash.
#[async_trait]
pub trait OrderQuery: Send + Sync {
    /// Offset page `page` of the snapshot named `snapshot_id`. An unknown or
    /// expired id starts a fresh snapshot.
    async fn get_orders(
        &self,
        page: u64,
        limit: usize,
        snapshot_id: Option<&str>,
    ) -> Result<GetOrdersResponse, StoreError>;

    /// Up to `limit` orders whose hash is strictly greater than `min_order_hash`.
    async fn get_orders_after(
        &self,
        min_order_hash: Option<OrderHash>,
        limit: usize,
    ) -> Result<Vec<OrderInfo>, StoreError>;
}

#[derive(Debug, Clone)]
struct StoredOrder {
    signed_order: SignedOrder,
    fillable_taker_asset_amount: U256,
    pinned: bool,
}

impl StoredOrder {
    fn info(&self, order_hash: OrderHash) -> OrderInfo {
        OrderInfo {
            order_hash,
            signed_order: self.signed_order.clone(),
            fillable_taker_asset_amount: self.fillable_taker_asset_amount,
        }
    }
}

#[derive(Debug)]
struct Snapshot {
    created_at: Instant,
    timestamp_ms: u64,
    orders: Arc<Vec<OrderInfo>>,
}

#[derive(Debug, Default)]
struct StoreInner {
    orders: BTreeMap<OrderHash, StoredOrder>,
    /// Orders that left the fillable set and may not be re-added while
    /// remembered. `removal_queue` holds the same hashes oldest first.
    removed: HashMap<OrderHash, OrderEventEndState>,
    removal_queue: VecDeque<(Instant, OrderHash)>,
    snapshots: HashMap<String, Snapshot>,
}

impl StoreInner {
    fn remember_removal(&mut self, order_hash: OrderHash, end_state: OrderEventEndState, now: Instant) {
        if self.removed.insert(order_hash, end_state).is_none() {
            self.removal_queue.push_back((now, order_hash));
        }
    }

    /// Forgets removals older than `ttl`, then the oldest beyond `capacity`.
    fn prune_removals(&mut self, now: Instant, ttl: Duration, capacity: usize) {
        while let Some((removed_at, order_hash)) = self.removal_queue.front().copied() {
            if now.duration_since(removed_at) < ttl && self.removal_queue.len() <= capacity {
                break;
            }
            self.removal_queue.pop_front();
            self.removed.remove(&order_hash);
        }
    }
}

/// In-memory order store used by the node and by tests.
///
/// All mutations happen under one lock, which gives per-hash mutual
/// exclusion across concurrent sessions.
pub struct MemoryOrderStore {
    chain_id: ChainId,
    max_orders: usize,
    filter: OrderFilter,
    snapshot_ttl: Duration,
    removed_ttl: Duration,
    max_removed: usize,
    events: OrderEventFeed,
    inner: Mutex<StoreInner>,
}

impl MemoryOrderStore {
    pub fn new(chain_id: ChainId, max_orders: usize, filter: OrderFilter) -> Self {
        Self {
            chain_id,
            max_orders,
            filter,
            snapshot_ttl: Duration::from_secs(SNAPSHOT_TTL_SECS),
            removed_ttl: Duration::from_secs(REMOVED_ORDER_TTL_SECS),
            max_removed: MAX_REMOVED_ORDERS,
            events: OrderEventFeed::new(),
            inner: Mutex::new(StoreInner::default()),
        }
    }

    pub fn with_snapshot_ttl(mut self, ttl: Duration) -> Self {
        self.snapshot_ttl = ttl;
        self
    }

    /// How long, and how many, removed hashes are refused re-entry.
    pub fn with_removal_memory(mut self, ttl: Duration, capacity: usize) -> Self {
        self.removed_ttl = ttl;
        self.max_removed = capacity;
        self
    }

    /// Removed hashes still refused re-entry.
    pub fn removed_len(&self) -> usize {
        let mut inner = self.inner.lock();
        inner.prune_removals(Instant::now(), self.removed_ttl, self.max_removed);
        inner.removed.len()
    }

    pub fn with_event_feed(mut self, events: OrderEventFeed) -> Self {
        self.events = events;
        self
    }

    pub fn chain_id(&self) -> ChainId {
        self.chain_id
    }

    pub fn events(&self) -> &OrderEventFeed {
        &self.events
    }

    pub fn filter(&self) -> &OrderFilter {
        &self.filter
    }

    pub fn len(&self) -> usize {
        self.inner.lock().orders.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, order_hash: &OrderHash) -> bool {
        self.inner.lock().orders.contains_key(order_hash)
    }

    pub fn is_pinned(&self, order_hash: &OrderHash) -> Option<bool> {
        self.inner.lock().orders.get(order_hash).map(|o| o.pinned)
    }

    pub fn all_orders(&self) -> Vec<OrderInfo> {
        self.inner
            .lock()
            .orders
            .iter()
            .map(|(hash, order)| order.info(*hash))
            .collect()
    }

    /// Moves stored orders out of the fillable set and announces it.
    pub fn remove_orders(
        &self,
        order_hashes: &[OrderHash],
        end_state: OrderEventEndState,
    ) -> Result<Vec<OrderEvent>, StoreError> {
        if !end_state.is_removal() {
            return Err(StoreError::NotARemoval(end_state));
        }

        let timestamp_ms = now_ms();
        let now = Instant::now();
        let mut inner = self.inner.lock();
        inner.prune_removals(now, self.removed_ttl, self.max_removed);

        let events: Vec<OrderEvent> = order_hashes
            .iter()
            .filter_map(|hash| {
                let stored = inner.orders.remove(hash)?;
                inner.remember_removal(*hash, end_state, now);
                Some(OrderEvent::new(
                    *hash,
                    stored.signed_order,
                    end_state,
                    timestamp_ms,
                ))
            })
            .collect();
        inner.prune_removals(now, self.removed_ttl, self.max_removed);

        if !events.is_empty() {
            info!(num_orders = events.len(), %end_state, "Removed orders");
        }
        // Published under the store lock so batches reach subscribers in
        // the order the store applied them.
        self.events.publish(events.clone());
        Ok(events)
    }

    fn check(&self, order: &SignedOrder, chain_id: ChainId, now_secs: u64) -> Option<RejectedOrderStatus> {
        if order.order.chain_id != chain_id.get() {
            return Some(RejectedOrderStatus::incorrect_chain_id());
        }
        if order.order.has_zero_amount() {
            return Some(RejectedOrderStatus::invalid_amounts());
        }
        if order.signature.is_empty() {
            return Some(RejectedOrderStatus::invalid_signature());
        }
        if order.order.is_expired_at(now_secs) {
            return Some(RejectedOrderStatus::expired());
        }
        match self.filter.match_order(order) {
            Ok(true) => None,
            Ok(false) => Some(RejectedOrderStatus::does_not_match_filter()),
            Err(err) => {
                warn!(%err, "Order filter evaluation failed, treating order as non-matching");
                Some(RejectedOrderStatus::does_not_match_filter())
            }
        }
    }

    fn take_snapshot(inner: &mut StoreInner, now: Instant) -> (String, u64, Arc<Vec<OrderInfo>>) {
        if inner.snapshots.len() >= MAX_SNAPSHOTS {
            let oldest = inner
                .snapshots
                .iter()
                .min_by_key(|(_, snapshot)| snapshot.created_at)
                .map(|(id, _)| id.clone());
            if let Some(oldest) = oldest {
                inner.snapshots.remove(&oldest);
            }
        }

        let id = format!("{:016x}", rand::random::<u64>());
        let timestamp_ms = now_ms();
        let orders: Arc<Vec<OrderInfo>> = Arc::new(
            inner
                .orders
                .iter()
                .map(|(hash, order)| order.info(*hash))
                .collect(),
        );
        inner.snapshots.insert(
            id.clone(),
            Snapshot {
                created_at: now,
                timestamp_ms,
                orders: orders.clone(),
            },
        );
        debug!(snapshot_id = %id, num_orders = orders.len(), "Created order snapshot");
        (id, timestamp_ms, orders)
    }
}

#[async_trait]
impl OrderValidator for MemoryOrderStore {
    async fn validate_and_store_valid_orders(
        &self,
        orders: Vec<SignedOrder>,
        pinned: bool,
        chain_id: ChainId,
    ) -> Result<ValidationResults, StoreError> {
        let timestamp_ms = now_ms();
        let now_secs = timestamp_ms / 1000;
        let mut results = ValidationResults::default();
        let mut events = Vec::new();

        {
            let mut inner = self.inner.lock();
            inner.prune_removals(Instant::now(), self.removed_ttl, self.max_removed);
            for signed_order in orders {
                let order_hash = signed_order.compute_order_hash();

                if let Some(stored) = inner.orders.get_mut(&order_hash) {
                    stored.pinned |= pinned;
                    results.accepted.push(AcceptedOrderInfo {
                        order_hash,
                        signed_order,
                        fillable_taker_asset_amount: stored.fillable_taker_asset_amount,
                        is_new: false,
                    });
                    continue;
                }

                let rejection = if inner.removed.contains_key(&order_hash) {
                    Some((
                        RejectedOrderKind::ZeroexValidation,
                        RejectedOrderStatus::already_stored_and_unfillable(),
                    ))
                } else if let Some(status) = self.check(&signed_order, chain_id, now_secs) {
                    Some((RejectedOrderKind::MeshValidation, status))
                } else if inner.orders.len() >= self.max_orders {
                    Some((
                        RejectedOrderKind::MeshValidation,
                        RejectedOrderStatus::database_full(),
                    ))
                } else {
                    None
                };

                if let Some((kind, status)) = rejection {
                    events.push(OrderEvent::new(
                        order_hash,
                        signed_order.clone(),
                        OrderEventEndState::Rejected,
                        timestamp_ms,
                    ));
                    results.rejected.push(RejectedOrderInfo {
                        order_hash,
                        signed_order,
                        kind,
                        status,
                    });
                    continue;
                }

                let fillable_taker_asset_amount = signed_order.order.taker_asset_amount;
                inner.orders.insert(
                    order_hash,
                    StoredOrder {
                        signed_order: signed_order.clone(),
                        fillable_taker_asset_amount,
                        pinned,
                    },
                );
                events.push(OrderEvent::new(
                    order_hash,
                    signed_order.clone(),
                    OrderEventEndState::Added,
                    timestamp_ms,
                ));
                results.accepted.push(AcceptedOrderInfo {
                    order_hash,
                    signed_order,
                    fillable_taker_asset_amount,
                    is_new: true,
                });
            }

            // Same ordering rule as `remove_orders`.
            self.events.publish(events);
        }

        debug!(
            accepted = results.accepted.len(),
            new = results.newly_added().count(),
            rejected = results.rejected.len(),
            "Validated orders"
        );
        Ok(results)
    }
}

#[async_trait]
impl OrderQuery for MemoryOrderStore {
    async fn get_orders(
        &self,
        page: u64,
        limit: usize,
        snapshot_id: Option<&str>,
    ) -> Result<GetOrdersResponse, StoreError> {
        let now = Instant::now();
        let mut inner = self.inner.lock();

        let ttl = self.snapshot_ttl;
        inner
            .snapshots
            .retain(|_, snapshot| now.duration_since(snapshot.created_at) < ttl);

        let existing = snapshot_id.and_then(|id| {
            inner
                .snapshots
                .get(id)
                .map(|snapshot| (id.to_string(), snapshot.timestamp_ms, snapshot.orders.clone()))
        });
        let (snapshot_id, snapshot_timestamp_ms, orders) = match existing {
            Some(existing) => existing,
            None => {
                if let Some(stale) = snapshot_id {
                    debug!(snapshot_id = stale, page, "Snapshot expired or unknown, starting a new one");
                }
                Self::take_snapshot(&mut inner, now)
            }
        };

        let start = usize::try_from(page)
            .ok()
            .and_then(|page| page.checked_mul(limit))
            .unwrap_or(usize::MAX);
        let orders_infos = orders.iter().skip(start).take(limit).cloned().collect();

        Ok(GetOrdersResponse {
            snapshot_id,
            snapshot_timestamp_ms,
            orders_infos,
        })
    }

    async fn get_orders_after(
        &self,
        min_order_hash: Option<OrderHash>,
        limit: usize,
    ) -> Result<Vec<OrderInfo>, StoreError> {
        let inner = self.inner.lock();
        let lower = match min_order_hash {
            Some(hash) => Bound::Excluded(hash),
            None => Bound::Unbounded,
        };
        Ok(inner
            .orders
            .range((lower, Bound::Unbounded))
            .take(limit)
            .map(|(hash, order)| order.info(*hash))
            .collect())
    }
}

pub(crate) fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|elapsed| elapsed.as_millis() as u64)
        .unwrap_or_default()
}
