use containers::U256;
use regex::Regex;
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// JSON value kinds a `type` keyword may name.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum JsonType {
    Array,
    Boolean,
    Integer,
    Null,
    Number,
    Object,
    String,
}

impl JsonType {
    pub fn from_name(name: &str) -> Option<Self> {
        match name {
            "array" => Some(Self::Array),
            "boolean" => Some(Self::Boolean),
            "integer" => Some(Self::Integer),
            "null" => Some(Self::Null),
            "number" => Some(Self::Number),
            "object" => Some(Self::Object),
            "string" => Some(Self::String),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Array => "array",
            Self::Boolean => "boolean",
            Self::Integer => "integer",
            Self::Null => "null",
            Self::Number => "number",
            Self::Object => "object",
            Self::String => "string",
        }
    }

    pub fn matches(&self, value: &Value) -> bool {
        match (self, value) {
            (Self::Array, Value::Array(_)) => true,
            (Self::Boolean, Value::Bool(_)) => true,
            (Self::Null, Value::Null) => true,
            (Self::Number, Value::Number(_)) => true,
            (Self::Integer, Value::Number(number)) => {
                number.is_u64()
                    || number.is_i64()
                    || number.as_f64().is_some_and(|f| f.fract() == 0.0)
            }
            (Self::Object, Value::Object(_)) => true,
            (Self::String, Value::String(_)) => true,
            _ => false,
        }
    }
}

/// Compiled regular expression that remembers its source text.
#[derive(Clone)]
pub struct Pattern {
    source: String,
    regex: Regex,
}

impl Pattern {
    pub fn new(source: &str) -> Result<Self, regex::Error> {
        Ok(Self {
            source: source.to_string(),
            regex: Regex::new(source)?,
        })
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn is_match(&self, text: &str) -> bool {
        self.regex.is_match(text)
    }
}

impl PartialEq for Pattern {
    fn eq(&self, other: &Self) -> bool {
        self.source == other.source
    }
}

impl Eq for Pattern {}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({:?})", self.source)
    }
}

/// Unsigned integer bounds. Order amounts are 256-bit and travel as
/// decimal strings, so bounds are held as `U256`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Range {
    pub minimum: Option<U256>,
    pub maximum: Option<U256>,
    pub exclusive_minimum: Option<U256>,
    pub exclusive_maximum: Option<U256>,
}

/// Numeric reading of a JSON value for range checks.
enum Numeric {
    Unsigned(U256),
    Negative,
    Fractional(f64),
}

impl Numeric {
    fn read(value: &Value) -> Option<Self> {
        match value {
            Value::Number(number) => {
                if let Some(n) = number.as_u64() {
                    Some(Numeric::Unsigned(U256::from(n)))
                } else if number.as_i64().is_some() {
                    Some(Numeric::Negative)
                } else {
                    number.as_f64().map(|f| {
                        if f < 0.0 {
                            Numeric::Negative
                        } else {
                            Numeric::Fractional(f)
                        }
                    })
                }
            }
            Value::String(text) => {
                if text.is_empty() || !text.bytes().all(|b| b.is_ascii_digit()) {
                    return None;
                }
                U256::from_str(text).ok().map(Numeric::Unsigned)
            }
            _ => None,
        }
    }
}

fn bound_as_f64(bound: &U256) -> f64 {
    bound.to_string().parse().unwrap_or(f64::INFINITY)
}

impl Range {
    pub fn is_empty(&self) -> bool {
        self.minimum.is_none()
            && self.maximum.is_none()
            && self.exclusive_minimum.is_none()
            && self.exclusive_maximum.is_none()
    }

    /// Numbers and strings are range-checked; a string that is not an
    /// unsigned decimal integer is out of range. Other kinds are not
    /// constrained by a range.
    pub fn contains(&self, value: &Value) -> bool {
        if !matches!(value, Value::Number(_) | Value::String(_)) {
            return true;
        }
        let Some(numeric) = Numeric::read(value) else {
            return false;
        };

        match numeric {
            Numeric::Unsigned(n) => {
                self.minimum.map_or(true, |min| n >= min)
                    && self.maximum.map_or(true, |max| n <= max)
                    && self.exclusive_minimum.map_or(true, |min| n > min)
                    && self.exclusive_maximum.map_or(true, |max| n < max)
            }
            // Below every unsigned lower bound, under every upper bound.
            Numeric::Negative => self.minimum.is_none() && self.exclusive_minimum.is_none(),
            Numeric::Fractional(f) => {
                self.minimum.map_or(true, |min| f >= bound_as_f64(&min))
                    && self.maximum.map_or(true, |max| f <= bound_as_f64(&max))
                    && self.exclusive_minimum.map_or(true, |min| f > bound_as_f64(&min))
                    && self.exclusive_maximum.map_or(true, |max| f < bound_as_f64(&max))
            }
        }
    }
}

/// A compiled interest predicate.
///
/// Leaves constrain a single JSON value; `All`, `Any` and `Not` compose
/// subtrees; `Properties` and `Required` descend into objects. An empty
/// `All` accepts everything and an empty `Any` accepts nothing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Constraint {
    All(Vec<Constraint>),
    Any(Vec<Constraint>),
    Not(Box<Constraint>),
    Type(Vec<JsonType>),
    Pattern(Pattern),
    Const(Value),
    Enum(Vec<Value>),
    Range(Range),
    Length { min: Option<u64>, max: Option<u64> },
    Properties(BTreeMap<String, Constraint>),
    Required(Vec<String>),
}

impl Constraint {
    pub fn accept_all() -> Self {
        Constraint::All(Vec::new())
    }

    pub fn reject_all() -> Self {
        Constraint::Any(Vec::new())
    }

    pub fn is_accept_all(&self) -> bool {
        matches!(self, Constraint::All(items) if items.is_empty())
    }

    pub fn evaluate(&self, value: &Value) -> bool {
        match self {
            Constraint::All(items) => items.iter().all(|c| c.evaluate(value)),
            Constraint::Any(items) => items.iter().any(|c| c.evaluate(value)),
            Constraint::Not(inner) => !inner.evaluate(value),
            Constraint::Type(types) => types.iter().any(|t| t.matches(value)),
            Constraint::Pattern(pattern) => match value {
                Value::String(text) => pattern.is_match(text),
                _ => true,
            },
            Constraint::Const(expected) => value == expected,
            Constraint::Enum(allowed) => allowed.iter().any(|candidate| candidate == value),
            Constraint::Range(range) => range.contains(value),
            Constraint::Length { min, max } => match value {
                Value::String(text) => {
                    let len = text.chars().count() as u64;
                    min.map_or(true, |m| len >= m) && max.map_or(true, |m| len <= m)
                }
                _ => true,
            },
            Constraint::Properties(properties) => match value {
                Value::Object(object) => properties.iter().all(|(name, constraint)| {
                    object.get(name).map_or(true, |field| constraint.evaluate(field))
                }),
                _ => true,
            },
            Constraint::Required(names) => match value {
                Value::Object(object) => names.iter().all(|name| object.contains_key(name)),
                _ => true,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use serde_json::json;

    fn range(min: Option<u64>, max: Option<u64>) -> Range {
        Range {
            minimum: min.map(U256::from),
            maximum: max.map(U256::from),
            ..Range::default()
        }
    }

    #[rstest]
    #[case(json!(5), true)]
    #[case(json!("5"), true)]
    #[case(json!("10"), true)]
    #[case(json!("11"), false)]
    #[case(json!(4), false)]
    #[case(json!(-3), false)]
    #[case(json!(7.5), true)]
    #[case(json!("0x05"), false)]
    #[case(json!("five"), false)]
    #[case(json!(true), true)]
    fn test_range_contains(#[case] value: Value, #[case] expected: bool) {
        assert_eq!(range(Some(5), Some(10)).contains(&value), expected);
    }

    #[test]
    fn test_range_handles_256_bit_amounts() {
        let big = "115792089237316195423570985008687907853269984665640564039457584007913129639935";
        let r = Range {
            exclusive_minimum: Some(U256::from(u64::MAX)),
            ..Range::default()
        };
        assert!(r.contains(&json!(big)));
        assert!(!r.contains(&json!(u64::MAX)));
    }

    #[rstest]
    #[case(JsonType::Integer, json!(3), true)]
    #[case(JsonType::Integer, json!(3.0), true)]
    #[case(JsonType::Integer, json!(3.5), false)]
    #[case(JsonType::Number, json!(3.5), true)]
    #[case(JsonType::String, json!("3"), true)]
    #[case(JsonType::String, json!(3), false)]
    #[case(JsonType::Null, json!(null), true)]
    fn test_json_type_matches(#[case] ty: JsonType, #[case] value: Value, #[case] expected: bool) {
        assert_eq!(ty.matches(&value), expected);
    }

    #[test]
    fn test_empty_composites() {
        assert!(Constraint::accept_all().evaluate(&json!({"a": 1})));
        assert!(!Constraint::reject_all().evaluate(&json!({"a": 1})));
    }

    #[test]
    fn test_properties_ignore_absent_fields_unless_required() {
        let mut properties = BTreeMap::new();
        properties.insert(
            "makerFee".to_string(),
            Constraint::Const(json!("0")),
        );
        let optional = Constraint::Properties(properties.clone());
        let required = Constraint::All(vec![
            Constraint::Properties(properties),
            Constraint::Required(vec!["makerFee".to_string()]),
        ]);

        assert!(optional.evaluate(&json!({})));
        assert!(!required.evaluate(&json!({})));
        assert!(required.evaluate(&json!({"makerFee": "0"})));
        assert!(!required.evaluate(&json!({"makerFee": "1"})));
    }

    #[test]
    fn test_pattern_only_constrains_strings() {
        let c = Constraint::Pattern(Pattern::new("^1$").unwrap());
        assert!(c.evaluate(&json!("1")));
        assert!(!c.evaluate(&json!("10")));
        assert!(c.evaluate(&json!(10)));
    }
}
