//! Response extractor (spec §4.4.3): decode `result.random.data` into typed
//! vectors, dispatched on the request method's return shape.

use crate::error::RandomOrgError;
use serde_json::Value;
use uuid::Uuid;

/// The method-specific data shape extracted from `result.random.data`.
#[derive(Debug, Clone, PartialEq)]
pub enum RandomData {
    /// Base-10 integers.
    Integers(Vec<i64>),
    /// Non-base-10 integers, carried as decimal-digit strings per method base.
    DigitStrings(Vec<String>),
    /// Integer sequences (base 10), one inner vec per sequence.
    IntegerSequences(Vec<Vec<i64>>),
    /// Integer sequences (non-base-10), one inner vec of digit strings per sequence.
    DigitStringSequences(Vec<Vec<String>>),
    /// Decimal fractions or Gaussians.
    Doubles(Vec<f64>),
    /// Strings or blobs (blobs are base64/hex-encoded strings).
    Strings(Vec<String>),
    /// UUIDs, already validated against RFC 4122 §4.4.
    Uuids(Vec<Uuid>),
}

fn data_array<'a>(result: &'a Value) -> Result<&'a Vec<Value>, RandomOrgError> {
    result
        .get("random")
        .and_then(|r| r.get("data"))
        .and_then(Value::as_array)
        .ok_or_else(|| RandomOrgError::ProtocolError {
            message: "missing result.random.data array".into(),
        })
}

fn as_i64(v: &Value) -> Result<i64, RandomOrgError> {
    v.as_i64().ok_or_else(|| RandomOrgError::ProtocolError {
        message: format!("expected integer in random.data, got {v}"),
    })
}

fn as_f64(v: &Value) -> Result<f64, RandomOrgError> {
    v.as_f64().ok_or_else(|| RandomOrgError::ProtocolError {
        message: format!("expected number in random.data, got {v}"),
    })
}

fn as_str(v: &Value) -> Result<&str, RandomOrgError> {
    v.as_str().ok_or_else(|| RandomOrgError::ProtocolError {
        message: format!("expected string in random.data, got {v}"),
    })
}

pub fn extract_integers(result: &Value) -> Result<Vec<i64>, RandomOrgError> {
    data_array(result)?.iter().map(as_i64).collect()
}

pub fn extract_digit_strings(result: &Value) -> Result<Vec<String>, RandomOrgError> {
    data_array(result)?.iter().map(|v| as_str(v).map(str::to_owned)).collect()
}

pub fn extract_integer_sequences(result: &Value) -> Result<Vec<Vec<i64>>, RandomOrgError> {
    data_array(result)?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| RandomOrgError::ProtocolError {
                    message: "expected array of sequences in random.data".into(),
                })?
                .iter()
                .map(as_i64)
                .collect()
        })
        .collect()
}

pub fn extract_digit_string_sequences(result: &Value) -> Result<Vec<Vec<String>>, RandomOrgError> {
    data_array(result)?
        .iter()
        .map(|row| {
            row.as_array()
                .ok_or_else(|| RandomOrgError::ProtocolError {
                    message: "expected array of sequences in random.data".into(),
                })?
                .iter()
                .map(|v| as_str(v).map(str::to_owned))
                .collect()
        })
        .collect()
}

pub fn extract_doubles(result: &Value) -> Result<Vec<f64>, RandomOrgError> {
    data_array(result)?.iter().map(as_f64).collect()
}

pub fn extract_strings(result: &Value) -> Result<Vec<String>, RandomOrgError> {
    data_array(result)?.iter().map(|v| as_str(v).map(str::to_owned)).collect()
}

pub fn extract_uuids(result: &Value) -> Result<Vec<Uuid>, RandomOrgError> {
    data_array(result)?
        .iter()
        .map(|v| {
            let s = as_str(v)?;
            Uuid::parse_str(s).map_err(|e| RandomOrgError::ProtocolError {
                message: format!("invalid UUID {s}: {e}"),
            })
        })
        .collect()
}

/// `result.signature`, if the method is a signed variant.
pub fn extract_signature(result: &Value) -> Option<String> {
    result.get("signature").and_then(Value::as_str).map(str::to_owned)
}

/// `result.authenticity`, from a `verifySignature` response.
pub fn extract_authenticity(result: &Value) -> Result<bool, RandomOrgError> {
    result
        .get("authenticity")
        .and_then(Value::as_bool)
        .ok_or_else(|| RandomOrgError::ProtocolError {
            message: "missing result.authenticity boolean".into(),
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_base10_integers() {
        let result = json!({"random": {"data": [1, 2, 3]}});
        assert_eq!(extract_integers(&result).unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn extracts_digit_strings_for_other_bases() {
        let result = json!({"random": {"data": ["1a", "ff"]}});
        assert_eq!(
            extract_digit_strings(&result).unwrap(),
            vec!["1a".to_string(), "ff".to_string()]
        );
    }

    #[test]
    fn extracts_integer_sequences() {
        let result = json!({"random": {"data": [[1, 2], [3, 4, 5]]}});
        assert_eq!(extract_integer_sequences(&result).unwrap(), vec![vec![1, 2], vec![3, 4, 5]]);
    }

    #[test]
    fn extracts_uuids_and_rejects_malformed() {
        let result = json!({"random": {"data": ["4a2ab7e0-8c17-4c5f-9e5e-2e3f4d5a6b7c"]}});
        let uuids = extract_uuids(&result).unwrap();
        assert_eq!(uuids.len(), 1);

        let bad = json!({"random": {"data": ["not-a-uuid"]}});
        assert!(extract_uuids(&bad).is_err());
    }

    #[test]
    fn missing_data_array_is_protocol_error() {
        let result = json!({"random": {}});
        assert!(extract_integers(&result).is_err());
    }

    #[test]
    fn extracts_signature_and_authenticity() {
        let result = json!({"signature": "sig==", "authenticity": true});
        assert_eq!(extract_signature(&result), Some("sig==".to_string()));
        assert!(extract_authenticity(&result).unwrap());
    }
}
