//! JSON-RPC 2.0 envelope construction (spec §4.2, §6).

use serde_json::{json, Value};
use uuid::Uuid;

/// Build a JSON-RPC request envelope: `{jsonrpc, method, params, id}`.
///
/// `params` must already be a JSON object; if `credential` is set it is
/// injected as `params.apiKey` before wrapping. The `id` is a fresh UUIDv4
/// string, matching the reference client.
pub fn build_envelope(method: &str, mut params: Value, credential: Option<&str>) -> Value {
    if let Some(key) = credential {
        if let Value::Object(ref mut map) = params {
            map.insert("apiKey".to_string(), Value::String(key.to_string()));
        }
    }
    json!({
        "jsonrpc": "2.0",
        "method": method,
        "params": params,
        "id": Uuid::new_v4().to_string(),
    })
}

/// Insert `key: null` into a params object when `value` is `None`, otherwise
/// insert the serialized value. The service distinguishes "absent" from
/// "null" only for a handful of fields; emitting explicit null for the
/// documented optional set matches the reference client and is always safe.
pub fn insert_optional<T: serde::Serialize>(params: &mut Value, key: &str, value: Option<&T>) {
    let Value::Object(map) = params else { return };
    match value {
        Some(v) => {
            map.insert(key.to_string(), serde_json::to_value(v).unwrap_or(Value::Null));
        }
        None => {
            map.insert(key.to_string(), Value::Null);
        }
    }
}
