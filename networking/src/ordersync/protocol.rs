use std::fmt;

use containers::{OrderHash, SignedOrder};
use order_filter::FilterFingerprint;
use serde::{Deserialize, Serialize};

pub const NEGOTIATE_PROTOCOL_V1: &str = "/mesh/ordersync/negotiate/1/json_snappy";
pub const PAGINATION_PROTOCOL_V0: &str = "/mesh/ordersync/pagination/0/json_snappy";
pub const PAGINATION_PROTOCOL_V1: &str = "/mesh/ordersync/pagination/1/json_snappy";

/// Pagination variants a node can speak. Each pins one page contract.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub enum SubprotocolVersion {
    /// Offset pagination over a provider snapshot.
    V0 = 0,
    /// Keyset pagination ordered by order hash.
    V1 = 1,
}

impl SubprotocolVersion {
    pub const ALL: [SubprotocolVersion; 2] = [SubprotocolVersion::V0, SubprotocolVersion::V1];

    pub fn protocol_id(&self) -> &'static str {
        match self {
            Self::V0 => PAGINATION_PROTOCOL_V0,
            Self::V1 => PAGINATION_PROTOCOL_V1,
        }
    }

    pub fn from_protocol_id(protocol: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|version| version.protocol_id() == protocol)
    }

    /// Highest version present in both sets.
    pub fn highest_common(ours: &[Self], theirs: &[Self]) -> Option<Self> {
        ours.iter()
            .filter(|version| theirs.contains(version))
            .max()
            .copied()
    }
}

impl From<SubprotocolVersion> for u8 {
    fn from(version: SubprotocolVersion) -> Self {
        version as u8
    }
}

impl TryFrom<u8> for SubprotocolVersion {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(Self::V0),
            1 => Ok(Self::V1),
            other => Err(format!("unknown ordersync subprotocol version {other}")),
        }
    }
}

impl fmt::Display for SubprotocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "v{}", *self as u8)
    }
}

/// Continuation token for the next page. The variant fixes the version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "camelCase", rename_all_fields = "camelCase")]
pub enum PageCursor {
    Offset {
        page: u64,
        snapshot_id: Option<String>,
    },
    Keyset {
        min_order_hash: Option<OrderHash>,
    },
}

impl PageCursor {
    pub fn version(&self) -> SubprotocolVersion {
        match self {
            Self::Offset { .. } => SubprotocolVersion::V0,
            Self::Keyset { .. } => SubprotocolVersion::V1,
        }
    }
}

impl fmt::Display for PageCursor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Offset {
                page,
                snapshot_id: Some(snapshot_id),
            } => write!(f, "page {page} of snapshot {snapshot_id}"),
            Self::Offset { page, .. } => write!(f, "page {page}"),
            Self::Keyset {
                min_order_hash: Some(hash),
            } => write!(f, "after {}", hash.short()),
            Self::Keyset { .. } => f.write_str("start"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateRequest {
    pub supported_versions: Vec<SubprotocolVersion>,
    pub filter_fingerprint: Option<FilterFingerprint>,
}

/// `version` is `None` when the peers share no version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NegotiateResponse {
    pub version: Option<SubprotocolVersion>,
    pub supported_versions: Vec<SubprotocolVersion>,
    pub filter_fingerprint: FilterFingerprint,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageRequest {
    pub cursor: PageCursor,
    pub page_size: u32,
    pub filter_fingerprint: Option<FilterFingerprint>,
}

/// One page of a provider's order set.
///
/// `filter_fingerprint` is the provider's own filter; every order it holds
/// already satisfies that filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse {
    pub orders: Vec<SignedOrder>,
    pub next_cursor: Option<PageCursor>,
    pub complete: bool,
    pub filter_fingerprint: FilterFingerprint,
}

/// Self-describing on the wire. It travels on the stream named by
/// [`OrdersyncRequest::protocol_id`], so a page request is routed by its
/// cursor's version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrdersyncRequest {
    Negotiate(NegotiateRequest),
    Page(PageRequest),
}

impl OrdersyncRequest {
    pub fn protocol_id(&self) -> &'static str {
        match self {
            Self::Negotiate(_) => NEGOTIATE_PROTOCOL_V1,
            Self::Page(request) => request.cursor.version().protocol_id(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum OrdersyncResponse {
    Negotiate(NegotiateResponse),
    Page(PageResponse),
    Error(String),
}

/// Every protocol id the node serves.
pub fn protocol_ids(versions: &[SubprotocolVersion]) -> Vec<String> {
    std::iter::once(NEGOTIATE_PROTOCOL_V1)
        .chain(versions.iter().map(SubprotocolVersion::protocol_id))
        .map(str::to_string)
        .collect()
}
