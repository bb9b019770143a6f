pub mod bootnodes;
pub mod network;
pub mod ordersync;
pub mod req_resp;
pub mod types;
