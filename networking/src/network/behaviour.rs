use libp2p::{connection_limits, identify, swarm::NetworkBehaviour};

use crate::req_resp::ReqResp;

#[derive(NetworkBehaviour)]
pub struct MeshNetworkBehaviour {
    pub identify: identify::Behaviour,
    pub req_resp: ReqResp,
    pub connection_limits: connection_limits::Behaviour,
}
