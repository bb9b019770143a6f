/// Page contracts, one per subprotocol version.
///
/// A contract knows where a session starts and how a provider turns a
/// cursor into a page plus the cursor for the next one. Requesters only
/// ever echo back the cursor they were given.
use async_trait::async_trait;
use containers::SignedOrder;

use super::error::OrdersyncError;
use super::protocol::{PageCursor, SubprotocolVersion};
use super::store::OrderQuery;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServedPage {
    pub orders: Vec<SignedOrder>,
    pub next_cursor: Option<PageCursor>,
    pub complete: bool,
}

#[async_trait]
pub trait PageContract: Send + Sync {
    fn version(&self) -> SubprotocolVersion;

    fn first_cursor(&self) -> PageCursor;

    async fn serve(
        &self,
        store: &dyn OrderQuery,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<ServedPage, OrdersyncError>;
}

/// V0: offset pages over a snapshot the provider pins for the session.
pub struct OffsetPagination;

/// V1: pages of orders whose hash is strictly above the cursor.
pub struct KeysetPagination;

static OFFSET: OffsetPagination = OffsetPagination;
static KEYSET: KeysetPagination = KeysetPagination;

pub fn contract_for(version: SubprotocolVersion) -> &'static dyn PageContract {
    match version {
        SubprotocolVersion::V0 => &OFFSET,
        SubprotocolVersion::V1 => &KEYSET,
    }
}

fn wrong_cursor(version: SubprotocolVersion, cursor: &PageCursor) -> OrdersyncError {
    OrdersyncError::Protocol(format!(
        "{version} page contract cannot serve a {} cursor",
        cursor.version()
    ))
}

#[async_trait]
impl PageContract for OffsetPagination {
    fn version(&self) -> SubprotocolVersion {
        SubprotocolVersion::V0
    }

    fn first_cursor(&self) -> PageCursor {
        PageCursor::Offset {
            page: 0,
            snapshot_id: None,
        }
    }

    async fn serve(
        &self,
        store: &dyn OrderQuery,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<ServedPage, OrdersyncError> {
        let PageCursor::Offset { page, snapshot_id } = cursor else {
            return Err(wrong_cursor(self.version(), cursor));
        };

        let response = store
            .get_orders(*page, limit, snapshot_id.as_deref())
            .await?;
        let complete = response.orders_infos.len() < limit;
        let next_cursor = (!complete).then(|| PageCursor::Offset {
            page: page + 1,
            snapshot_id: Some(response.snapshot_id.clone()),
        });

        Ok(ServedPage {
            orders: response
                .orders_infos
                .into_iter()
                .map(|info| info.signed_order)
                .collect(),
            next_cursor,
            complete,
        })
    }
}

#[async_trait]
impl PageContract for KeysetPagination {
    fn version(&self) -> SubprotocolVersion {
        SubprotocolVersion::V1
    }

    fn first_cursor(&self) -> PageCursor {
        PageCursor::Keyset {
            min_order_hash: None,
        }
    }

    async fn serve(
        &self,
        store: &dyn OrderQuery,
        cursor: &PageCursor,
        limit: usize,
    ) -> Result<ServedPage, OrdersyncError> {
        let PageCursor::Keyset { min_order_hash } = cursor else {
            return Err(wrong_cursor(self.version(), cursor));
        };

        let infos = store.get_orders_after(*min_order_hash, limit).await?;
        let complete = infos.len() < limit;
        let next_cursor = match infos.last() {
            Some(last) if !complete => Some(PageCursor::Keyset {
                min_order_hash: Some(last.order_hash),
            }),
            _ => None,
        };

        Ok(ServedPage {
            orders: infos.into_iter().map(|info| info.signed_order).collect(),
            next_cursor,
            complete,
        })
    }
}
