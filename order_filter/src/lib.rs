/// Interest filters for orders.
///
/// A node only stores and relays orders it is interested in. Interest is
/// configured as a JSON-schema-like document over the order's JSON form
/// and compiled once at startup into a [`Constraint`] tree. Evaluation is
/// a pure recursive walk over that tree.
///
/// Every compiled filter has a canonical form and a [`FilterFingerprint`]
/// derived from it. Two configurations that differ only in whitespace,
/// key order, or the order of commutative members produce the same
/// fingerprint, which lets peers recognise compatible filters during
/// ordersync without exchanging the filters themselves.
pub mod canonical;
pub mod compile;
pub mod constraint;
pub mod error;
pub mod filter;

pub use constraint::{Constraint, JsonType, Pattern, Range};
pub use error::FilterError;
pub use filter::{FilterFingerprint, OrderFilter};
