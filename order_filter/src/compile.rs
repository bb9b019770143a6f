use containers::U256;
use serde_json::Value;
use std::collections::BTreeMap;
use std::str::FromStr;

use crate::canonical;
use crate::constraint::{Constraint, JsonType, Pattern, Range};
use crate::error::FilterError;

/// Keywords that carry no constraint.
const ANNOTATIONS: &[&str] = &["$schema", "$id", "id", "title", "description"];

/// Compiles a filter configuration document into a normalized constraint tree.
///
/// Normalization makes the tree independent of key order and of the order of
/// commutative members, which is what keeps fingerprints stable.
///
/// The document itself must be an object; boolean schemas are only
/// accepted below the top level.
pub fn compile(schema: &Value) -> Result<Constraint, FilterError> {
    if !schema.is_object() {
        return Err(FilterError::invalid(
            "#",
            format!("filter must be a JSON object, got {}", kind(schema)),
        ));
    }
    compile_at(schema, "#")
}

fn compile_at(schema: &Value, path: &str) -> Result<Constraint, FilterError> {
    let object = match schema {
        Value::Bool(true) => return Ok(Constraint::accept_all()),
        Value::Bool(false) => return Ok(Constraint::reject_all()),
        Value::Object(object) => object,
        other => {
            return Err(FilterError::invalid(
                path,
                format!("expected an object or boolean schema, got {}", kind(other)),
            ));
        }
    };

    let mut items = Vec::new();
    let mut range = Range::default();
    let mut length = (None, None);

    for (key, value) in object {
        let here = format!("{path}/{key}");
        match key.as_str() {
            k if ANNOTATIONS.contains(&k) => {}
            "type" => items.push(compile_type(value, &here)?),
            "pattern" => {
                let source = value
                    .as_str()
                    .ok_or_else(|| FilterError::invalid(&here, "pattern must be a string"))?;
                let pattern = Pattern::new(source)
                    .map_err(|err| FilterError::invalid(&here, format!("invalid regex: {err}")))?;
                items.push(Constraint::Pattern(pattern));
            }
            "const" => items.push(Constraint::Const(value.clone())),
            "enum" => items.push(compile_enum(value, &here)?),
            "minimum" => range.minimum = Some(parse_bound(value, &here)?),
            "maximum" => range.maximum = Some(parse_bound(value, &here)?),
            "exclusiveMinimum" => range.exclusive_minimum = Some(parse_bound(value, &here)?),
            "exclusiveMaximum" => range.exclusive_maximum = Some(parse_bound(value, &here)?),
            "minLength" => length.0 = Some(parse_length(value, &here)?),
            "maxLength" => length.1 = Some(parse_length(value, &here)?),
            "properties" => items.push(compile_properties(value, &here)?),
            "required" => items.push(compile_required(value, &here)?),
            "allOf" => items.push(all(compile_members(value, &here)?)),
            "anyOf" => items.push(any(compile_members(value, &here)?)),
            "not" => items.push(Constraint::Not(Box::new(compile_at(value, &here)?))),
            unknown => {
                return Err(FilterError::invalid(
                    &here,
                    format!("unsupported keyword `{unknown}`"),
                ));
            }
        }
    }

    if !range.is_empty() {
        items.push(Constraint::Range(range));
    }
    if length != (None, None) {
        items.push(Constraint::Length {
            min: length.0,
            max: length.1,
        });
    }

    Ok(all(items))
}

fn compile_type(value: &Value, path: &str) -> Result<Constraint, FilterError> {
    let names: Vec<&Value> = match value {
        Value::Array(names) if !names.is_empty() => names.iter().collect(),
        Value::Array(_) => return Err(FilterError::invalid(path, "type list is empty")),
        single => vec![single],
    };

    let mut types = names
        .into_iter()
        .map(|name| {
            name.as_str()
                .and_then(JsonType::from_name)
                .ok_or_else(|| FilterError::invalid(path, format!("unknown type {name}")))
        })
        .collect::<Result<Vec<_>, _>>()?;
    types.sort();
    types.dedup();
    Ok(Constraint::Type(types))
}

fn compile_enum(value: &Value, path: &str) -> Result<Constraint, FilterError> {
    let Value::Array(values) = value else {
        return Err(FilterError::invalid(path, "enum must be an array"));
    };
    if values.is_empty() {
        return Err(FilterError::invalid(path, "enum is empty"));
    }

    let mut keyed: Vec<(String, Value)> = values
        .iter()
        .map(|v| (canonical::to_string(v), v.clone()))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);
    Ok(Constraint::Enum(keyed.into_iter().map(|(_, v)| v).collect()))
}

fn compile_properties(value: &Value, path: &str) -> Result<Constraint, FilterError> {
    let Value::Object(properties) = value else {
        return Err(FilterError::invalid(path, "properties must be an object"));
    };

    let compiled = properties
        .iter()
        .map(|(name, schema)| Ok((name.clone(), compile_at(schema, &format!("{path}/{name}"))?)))
        .collect::<Result<BTreeMap<_, _>, FilterError>>()?;
    Ok(Constraint::Properties(compiled))
}

fn compile_required(value: &Value, path: &str) -> Result<Constraint, FilterError> {
    let Value::Array(names) = value else {
        return Err(FilterError::invalid(path, "required must be an array"));
    };

    let mut names = names
        .iter()
        .map(|name| {
            name.as_str()
                .map(str::to_string)
                .ok_or_else(|| FilterError::invalid(path, "required entries must be strings"))
        })
        .collect::<Result<Vec<_>, _>>()?;
    names.sort();
    names.dedup();
    Ok(Constraint::Required(names))
}

fn compile_members(value: &Value, path: &str) -> Result<Vec<Constraint>, FilterError> {
    match value {
        Value::Array(members) if !members.is_empty() => members
            .iter()
            .enumerate()
            .map(|(i, member)| compile_at(member, &format!("{path}/{i}")))
            .collect(),
        _ => Err(FilterError::invalid(path, "expected a non-empty array of schemas")),
    }
}

fn parse_bound(value: &Value, path: &str) -> Result<U256, FilterError> {
    let parsed = match value {
        Value::Number(number) => number.as_u64().map(U256::from),
        Value::String(text) if !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit()) => {
            U256::from_str(text).ok()
        }
        _ => None,
    };
    parsed.ok_or_else(|| FilterError::invalid(path, format!("bound {value} is not an unsigned integer")))
}

fn parse_length(value: &Value, path: &str) -> Result<u64, FilterError> {
    value
        .as_u64()
        .ok_or_else(|| FilterError::invalid(path, format!("length {value} is not an unsigned integer")))
}

fn sort_members(items: &mut Vec<Constraint>) {
    let mut keyed: Vec<(String, Constraint)> = items
        .drain(..)
        .map(|c| (canonical::to_string(&canonical::to_value(&c)), c))
        .collect();
    keyed.sort_by(|a, b| a.0.cmp(&b.0));
    keyed.dedup_by(|a, b| a.0 == b.0);
    items.extend(keyed.into_iter().map(|(_, c)| c));
}

/// Conjunction with nested conjunctions flattened and members sorted.
fn all(items: Vec<Constraint>) -> Constraint {
    let mut flat = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Constraint::All(nested) => flat.extend(nested),
            other => flat.push(other),
        }
    }
    sort_members(&mut flat);

    if flat.len() == 1 {
        flat.remove(0)
    } else {
        Constraint::All(flat)
    }
}

/// Disjunction with nested disjunctions flattened and members sorted.
fn any(items: Vec<Constraint>) -> Constraint {
    let mut flat = Vec::with_capacity(items.len());
    for item in items {
        match item {
            Constraint::Any(nested) => flat.extend(nested),
            other => flat.push(other),
        }
    }
    sort_members(&mut flat);

    if flat.len() == 1 {
        flat.remove(0)
    } else {
        Constraint::Any(flat)
    }
}

fn kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Parses configuration text and compiles it.
pub fn compile_str(text: &str) -> Result<Constraint, FilterError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| FilterError::invalid("#", format!("not valid JSON: {err}")))?;
    compile(&value)
}
