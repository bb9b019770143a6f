use std::fs::File;
use std::sync::Arc;

use libp2p::Multiaddr;
use tracing::warn;

pub trait BootnodeSource: Send + Sync {
    fn to_multiaddrs(&self) -> Vec<Multiaddr>;
}

impl BootnodeSource for Vec<Multiaddr> {
    fn to_multiaddrs(&self) -> Vec<Multiaddr> {
        self.clone()
    }
}

impl BootnodeSource for Arc<[Multiaddr]> {
    fn to_multiaddrs(&self) -> Vec<Multiaddr> {
        self.as_ref().to_vec()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StaticBootnodes(Vec<Multiaddr>);

impl StaticBootnodes {
    pub fn new<T: Into<Vec<Multiaddr>>>(addrs: T) -> Self {
        StaticBootnodes(addrs.into())
    }

    /// Parses every command line argument; see [`parse_bootnode_argument`].
    pub fn from_arguments<S: AsRef<str>>(args: &[S]) -> Self {
        StaticBootnodes(
            args.iter()
                .flat_map(|arg| parse_bootnode_argument(arg.as_ref()))
                .collect(),
        )
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl BootnodeSource for StaticBootnodes {
    fn to_multiaddrs(&self) -> Vec<Multiaddr> {
        self.0.clone()
    }
}

/// A bootnode argument is either a multiaddr or a path to a YAML list of
/// multiaddrs. Anything else is logged and ignored.
pub fn parse_bootnode_argument(arg: &str) -> Vec<Multiaddr> {
    if let Ok(value) = arg.parse::<Multiaddr>() {
        return vec![value];
    };

    let Ok(file) = File::open(arg) else {
        warn!(
            "value {arg:?} provided as bootnode is not recognized - it is not valid multiaddr nor valid path to file containing bootnodes."
        );

        return Vec::new();
    };

    let entries: Vec<String> = match serde_yaml::from_reader(file) {
        Ok(value) => value,
        Err(err) => {
            warn!("failed to read bootnodes from {arg:?}: {err:?}");

            return Vec::new();
        }
    };

    let bootnodes: Vec<Multiaddr> = entries
        .iter()
        .filter_map(|entry| match entry.parse::<Multiaddr>() {
            Ok(addr) => Some(addr),
            Err(err) => {
                warn!("skipping bootnode {entry:?} from {arg:?}: {err}");
                None
            }
        })
        .collect();

    if bootnodes.is_empty() {
        warn!("provided file with bootnodes {arg:?} is empty");
    }

    bootnodes
}
