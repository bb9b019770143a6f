mod behaviour;
mod service;
mod transport;

pub use behaviour::{MeshNetworkBehaviour, MeshNetworkBehaviourEvent};
pub use service::{NetworkService, NetworkServiceConfig};
pub use transport::{OutboundRequest, SwarmTransport};
