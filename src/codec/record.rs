//! Ownership helpers for encoded records.
//!
//! A record nests as deeply as the expression it encodes, and `serde_json::Value`
//! is dropped recursively. Deep records must be torn down through [`release`].

use serde_json::Value;

/// Drops a record one level at a time on the heap.
pub fn release(value: Value) {
    let mut pending = vec![value];
    while let Some(mut node) = pending.pop() {
        match &mut node {
            Value::Array(items) => pending.append(items),
            Value::Object(fields) => pending.extend(std::mem::take(fields).into_iter().map(|(_, v)| v)),
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_release_deep_nesting() {
        let mut value = json!(1.0);
        for i in 0..200_000 {
            value = if i % 2 == 0 { Value::Array(vec![value]) } else { Value::Object(serde_json::Map::from_iter([("children".to_string(), value)])) };
        }
        release(value);
    }
}
