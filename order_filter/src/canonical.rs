use serde_json::{Map, Value};
use std::fmt::Write;

use crate::constraint::{Constraint, Range};

/// Renders a compiled constraint back into filter configuration JSON.
///
/// The result compiles to an equivalent constraint, so it doubles as the
/// advertised form of a filter.
pub fn to_value(constraint: &Constraint) -> Value {
    match constraint {
        Constraint::All(items) if items.is_empty() => Value::Object(Map::new()),
        Constraint::All(items) => keyword("allOf", Value::Array(items.iter().map(to_value).collect())),
        Constraint::Any(items) if items.is_empty() => Value::Bool(false),
        Constraint::Any(items) => keyword("anyOf", Value::Array(items.iter().map(to_value).collect())),
        Constraint::Not(inner) => keyword("not", to_value(inner)),
        Constraint::Type(types) => {
            let names: Vec<Value> = types.iter().map(|t| Value::from(t.name())).collect();
            match names.as_slice() {
                [single] => keyword("type", single.clone()),
                _ => keyword("type", Value::Array(names)),
            }
        }
        Constraint::Pattern(pattern) => keyword("pattern", Value::from(pattern.source())),
        Constraint::Const(value) => keyword("const", value.clone()),
        Constraint::Enum(values) => keyword("enum", Value::Array(values.clone())),
        Constraint::Range(range) => range_value(range),
        Constraint::Length { min, max } => {
            let mut map = Map::new();
            if let Some(min) = min {
                map.insert("minLength".to_string(), Value::from(*min));
            }
            if let Some(max) = max {
                map.insert("maxLength".to_string(), Value::from(*max));
            }
            Value::Object(map)
        }
        Constraint::Properties(properties) => {
            let map = properties
                .iter()
                .map(|(name, c)| (name.clone(), to_value(c)))
                .collect();
            keyword("properties", Value::Object(map))
        }
        Constraint::Required(names) => keyword(
            "required",
            Value::Array(names.iter().cloned().map(Value::from).collect()),
        ),
    }
}

fn keyword(name: &str, value: Value) -> Value {
    let mut map = Map::new();
    map.insert(name.to_string(), value);
    Value::Object(map)
}

// Bounds are written as decimal strings so amounts above u64 survive.
fn range_value(range: &Range) -> Value {
    let mut map = Map::new();
    let bounds = [
        ("minimum", &range.minimum),
        ("maximum", &range.maximum),
        ("exclusiveMinimum", &range.exclusive_minimum),
        ("exclusiveMaximum", &range.exclusive_maximum),
    ];
    for (name, bound) in bounds {
        if let Some(bound) = bound {
            map.insert(name.to_string(), Value::from(bound.to_string()));
        }
    }
    Value::Object(map)
}

/// Compact JSON with object keys in byte order at every depth.
pub fn to_string(value: &Value) -> String {
    let mut out = String::new();
    write_value(&mut out, value);
    out
}

fn write_value(out: &mut String, value: &Value) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.as_bytes().cmp(b.0.as_bytes()));

            out.push('{');
            for (i, (key, item)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_string(out, key);
                out.push(':');
                write_value(out, item);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(out, item);
            }
            out.push(']');
        }
        Value::String(text) => write_string(out, text),
        // Scalars have a single compact rendering.
        other => {
            let _ = write!(out, "{other}");
        }
    }
}

fn write_string(out: &mut String, text: &str) {
    let _ = write!(out, "{}", Value::from(text));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::{JsonType, Pattern};
    use containers::U256;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use std::collections::BTreeMap;

    #[test]
    fn test_keys_are_sorted_at_every_depth() {
        let value = json!({"b": {"z": 1, "a": [ {"y": true, "x": null} ]}, "a": "s"});
        assert_eq!(
            to_string(&value),
            r#"{"a":"s","b":{"a":[{"x":null,"y":true}],"z":1}}"#
        );
    }

    #[test]
    fn test_strings_are_escaped() {
        assert_eq!(to_string(&json!({"k": "a\"b\\c\n"})), r#"{"k":"a\"b\\c\n"}"#);
    }

    #[test]
    fn test_constraint_rendering() {
        let mut properties = BTreeMap::new();
        properties.insert(
            "makerAssetAmount".to_string(),
            Constraint::All(vec![
                Constraint::Pattern(Pattern::new("^1$").unwrap()),
                Constraint::Type(vec![JsonType::String]),
            ]),
        );
        properties.insert(
            "makerFee".to_string(),
            Constraint::Range(Range {
                maximum: Some(U256::from(10u64)),
                ..Range::default()
            }),
        );

        let value = to_value(&Constraint::Properties(properties));
        assert_eq!(
            to_string(&value),
            r#"{"properties":{"makerAssetAmount":{"allOf":[{"pattern":"^1$"},{"type":"string"}]},"makerFee":{"maximum":"10"}}}"#
        );
    }

    #[test]
    fn test_boolean_extremes() {
        assert_eq!(to_string(&to_value(&Constraint::accept_all())), "{}");
        assert_eq!(to_string(&to_value(&Constraint::reject_all())), "false");
    }
}
