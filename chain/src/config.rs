use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChainId(pub u64);

impl ChainId {
    pub const MAINNET: ChainId = ChainId(1);
    pub const ROPSTEN: ChainId = ChainId(3);
    pub const KOVAN: ChainId = ChainId(42);
    pub const GANACHE: ChainId = ChainId(1337);

    #[inline]
    pub fn get(&self) -> u64 {
        self.0
    }

    pub fn name(&self) -> Option<&'static str> {
        match *self {
            Self::MAINNET => Some("mainnet"),
            Self::ROPSTEN => Some("ropsten"),
            Self::KOVAN => Some("kovan"),
            Self::GANACHE => Some("ganache"),
            _ => None,
        }
    }
}

impl From<u64> for ChainId {
    fn from(value: u64) -> Self {
        ChainId(value)
    }
}

impl fmt::Display for ChainId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.name() {
            Some(name) => write!(f, "{} ({name})", self.0),
            None => write!(f, "{}", self.0),
        }
    }
}
