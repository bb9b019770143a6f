pub mod types;
pub mod order;
pub mod event;
pub mod validation;
pub mod query;
pub mod serde_helpers;

pub use event::{OrderEvent, OrderEventEndState};
pub use order::{Order, SignedOrder};
pub use query::{GetOrdersResponse, OrderInfo};
pub use types::{Bytes32, OrderHash};
pub use validation::{
    AcceptedOrderInfo, RejectedOrderInfo, RejectedOrderKind, RejectedOrderStatus,
    ValidationResults,
};

pub use alloy_primitives::{Address, Bytes, U256};
