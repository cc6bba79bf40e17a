//! Typed accessors for JSON argument objects.
//!
//! Errors are plain strings; they end up verbatim in structured tool errors.

use serde_json::Value;
use std::collections::HashMap;

/// Required string argument.
pub fn required_str<'a>(args: &'a Value, name: &str) -> Result<&'a str, String> {
    args.get(name)
        .and_then(|v| v.as_str())
        .ok_or_else(|| format!("Missing '{}' parameter", name))
}

/// Optional string argument; empty strings count as absent.
pub fn optional_str<'a>(args: &'a Value, name: &str) -> Option<&'a str> {
    args.get(name)
        .and_then(|v| v.as_str())
        .filter(|s| !s.is_empty())
}

/// Required port-sized integer.
pub fn required_port(args: &Value, name: &str) -> Result<u16, String> {
    let raw = args
        .get(name)
        .and_then(|v| v.as_u64())
        .ok_or_else(|| format!("Missing '{}' parameter", name))?;
    u16::try_from(raw).map_err(|_| format!("'{}' must be between 0 and 65535", name))
}

/// Optional list of strings. Non-string items are an error.
pub fn string_list(args: &Value, name: &str) -> Result<Option<Vec<String>>, String> {
    match args.get(name) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| {
                item.as_str()
                    .map(str::to_string)
                    .ok_or_else(|| format!("'{}' must contain only strings", name))
            })
            .collect::<Result<Vec<_>, _>>()
            .map(Some),
        Some(_) => Err(format!("'{}' must be an array of strings", name)),
    }
}

/// Required object of string values. Scalars are stringified.
pub fn string_map(args: &Value, name: &str) -> Result<HashMap<String, String>, String> {
    let object = args
        .get(name)
        .and_then(|v| v.as_object())
        .ok_or_else(|| format!("'{}' must be a dictionary/object", name))?;

    object
        .iter()
        .map(|(k, v)| {
            let value = match v {
                Value::String(s) => s.clone(),
                Value::Number(n) => n.to_string(),
                Value::Bool(b) => b.to_string(),
                _ => return Err(format!("'{}.{}' must be a string", name, k)),
            };
            Ok((k.clone(), value))
        })
        .collect()
}
