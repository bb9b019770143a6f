use containers::SignedOrder;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt;
use std::sync::Arc;
use tracing::debug;

use crate::canonical;
use crate::compile::{compile, compile_str};
use crate::constraint::Constraint;
use crate::error::FilterError;

const FINGERPRINT_DOMAIN: &[u8] = b"ordersync:filter:v1:";

/// Identity token of a compiled filter, as lowercase hex.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FilterFingerprint(String);

impl FilterFingerprint {
    fn of(canonical: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(FINGERPRINT_DOMAIN);
        hasher.update(canonical.as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FilterFingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A compiled, immutable order interest filter.
///
/// Cloning is cheap; the constraint tree is shared.
#[derive(Clone, Debug)]
pub struct OrderFilter {
    constraint: Arc<Constraint>,
    encoded: String,
    fingerprint: FilterFingerprint,
}

impl OrderFilter {
    /// Compiles filter configuration text. `{}` accepts every order.
    pub fn compile(config: &str) -> Result<Self, FilterError> {
        Ok(Self::from_constraint(compile_str(config)?))
    }

    pub fn from_value(config: &Value) -> Result<Self, FilterError> {
        Ok(Self::from_constraint(compile(config)?))
    }

    pub fn accept_all() -> Self {
        Self::from_constraint(Constraint::accept_all())
    }

    fn from_constraint(constraint: Constraint) -> Self {
        let encoded = canonical::to_string(&canonical::to_value(&constraint));
        let fingerprint = FilterFingerprint::of(&encoded);
        debug!(%fingerprint, filter = %encoded, "Compiled order filter");
        Self {
            constraint: Arc::new(constraint),
            encoded,
            fingerprint,
        }
    }

    pub fn match_order(&self, order: &SignedOrder) -> Result<bool, FilterError> {
        if self.constraint.is_accept_all() {
            return Ok(true);
        }
        let value = order.to_json_value().map_err(|err| FilterError::Evaluation {
            reason: err.to_string(),
        })?;
        Ok(self.constraint.evaluate(&value))
    }

    pub fn match_json(&self, value: &Value) -> bool {
        self.constraint.evaluate(value)
    }

    pub fn fingerprint(&self) -> &FilterFingerprint {
        &self.fingerprint
    }

    /// Canonical configuration text of this filter.
    pub fn encoded(&self) -> &str {
        &self.encoded
    }

    pub fn constraint(&self) -> &Constraint {
        &self.constraint
    }

    pub fn is_accept_all(&self) -> bool {
        self.constraint.is_accept_all()
    }
}

impl PartialEq for OrderFilter {
    fn eq(&self, other: &Self) -> bool {
        self.fingerprint == other.fingerprint
    }
}

impl Eq for OrderFilter {}
