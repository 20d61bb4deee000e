//! Signature passthrough and verification (spec §4.4.2, §9 "URL encoding",
//! "JSON preservation").
//!
//! The `random` object carried inside a signed response must reach
//! `verify_signature`/`create_verification_url` bit-exact — the server
//! verifies the signature against the exact bytes it sent, so this module
//! never deserializes `random` into a normalizing `serde_json::Value`. It is
//! captured as a [`Box<RawValue>`] straight off the wire and carried opaquely.

use crate::error::RandomOrgError;
use crate::transport::SIGNATURE_VERIFICATION_URL;
use regex::Regex;
use serde_json::value::RawValue;
use std::sync::OnceLock;

/// A signed result bundle: typed data, the verbatim `random` object, and the
/// signature string (spec glossary: "signed result bundle").
#[derive(Debug, Clone)]
pub struct SignedBundle<D> {
    pub data: D,
    pub random: Box<RawValue>,
    pub signature: String,
}

#[derive(serde::Deserialize)]
struct RawResultEnvelope {
    result: Option<RawResult>,
}

#[derive(serde::Deserialize)]
struct RawResult {
    random: Option<Box<RawValue>>,
}

/// Parse `result.random` out of a raw JSON-RPC response body, preserving its
/// exact byte representation. Returns `None` if the response carries no
/// `random` field (e.g. an unused ticket's `getTicket` response).
pub fn parse_raw_random(body: &str) -> Result<Option<Box<RawValue>>, RandomOrgError> {
    let envelope: RawResultEnvelope = serde_json::from_str(body)
        .map_err(|e| RandomOrgError::ProtocolError { message: e.to_string() })?;
    Ok(envelope.result.and_then(|r| r.random))
}

fn base64_alphabet_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[A-Za-z0-9+/]*={0,2}$").expect("valid regex"))
}

/// Make a string URL-safe the way the reference client's verification form
/// does: base64-encode it unless it already consists entirely of base64
/// alphabet characters, then percent-encode only `=`, `+`, `/` (not full
/// RFC 3986 percent-encoding).
fn url_safe(input: &str) -> String {
    let base64d = if base64_alphabet_regex().is_match(input) {
        input.to_string()
    } else {
        use base64::Engine;
        base64::engine::general_purpose::STANDARD.encode(input)
    };
    base64d.replace('=', "%3D").replace('+', "%2B").replace('/', "%2F")
}

/// Build the verification URL for a signed result (spec §4.4.2).
pub fn create_verification_url(random: &RawValue, signature: &str) -> Result<String, RandomOrgError> {
    let random_json = random.get();
    let url = format!(
        "{SIGNATURE_VERIFICATION_URL}?format=json&random={}&signature={}",
        url_safe(random_json),
        url_safe(signature),
    );
    if url.len() > 2046 {
        return Err(RandomOrgError::ServiceError {
            code: 32000,
            message: format!("verification URL exceeds 2046 characters ({})", url.len()),
        });
    }
    Ok(url)
}

/// Build the verification HTML form snippet for a signed result (spec §4.4.2).
pub fn create_verification_form_html(random: &RawValue, signature: &str) -> String {
    format!(
        "<form action='{SIGNATURE_VERIFICATION_URL}' method='post'>\n\
         <input type='hidden' name='format' value='json'/>\n\
         <input type='hidden' name='random' value='{}'/>\n\
         <input type='hidden' name='signature' value='{}'/>\n\
         <input type='submit' value='Verify'/>\n\
         </form>",
        random.get(),
        signature,
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_raw_random_preserves_byte_exact_text() {
        let body = r#"{"jsonrpc":"2.0","result":{"random":{"method":"generateIntegers","n":5,"data":[1,2,3]},"signature":"abc"},"id":"1"}"#;
        let raw = parse_raw_random(body).unwrap().unwrap();
        assert_eq!(
            raw.get(),
            r#"{"method":"generateIntegers","n":5,"data":[1,2,3]}"#
        );
    }

    #[test]
    fn parse_raw_random_missing_is_none() {
        let body = r#"{"jsonrpc":"2.0","result":{"ticketId":"t1","result":null},"id":"1"}"#;
        assert!(parse_raw_random(body).unwrap().is_none());
    }

    #[test]
    fn verification_url_round_trips_json_random() {
        let random = serde_json::value::to_raw_value(&json!({"data": [1, 2, 3]})).unwrap();
        let url = create_verification_url(&random, "c2lnbmF0dXJl").unwrap();
        assert!(url.starts_with(SIGNATURE_VERIFICATION_URL));

        let query = url.split_once("random=").unwrap().1;
        let random_part = query.split("&signature=").next().unwrap();
        let restored = random_part.replace("%3D", "=").replace("%2B", "+").replace("%2F", "/");
        use base64::Engine;
        let decoded = base64::engine::general_purpose::STANDARD.decode(restored).unwrap();
        let decoded_str = String::from_utf8(decoded).unwrap();
        assert_eq!(decoded_str, random.get());
    }

    #[test]
    fn verification_url_fails_when_too_long() {
        let huge = "x".repeat(3000);
        let random = serde_json::value::to_raw_value(&json!({"data": huge})).unwrap();
        let err = create_verification_url(&random, "sig").unwrap_err();
        assert!(err.is_service_error());
    }

    #[test]
    fn url_safe_skips_base64_encoding_when_already_base64() {
        // A pure base64 string should pass through unencoded except for the triple substitution.
        assert_eq!(url_safe("abcDEF123+/=="), "abcDEF123%2B%2F%3D%3D");
    }

    #[test]
    fn html_form_contains_action_and_fields() {
        let random = serde_json::value::to_raw_value(&json!({"n": 1})).unwrap();
        let html = create_verification_form_html(&random, "sig==");
        assert!(html.contains(SIGNATURE_VERIFICATION_URL));
        assert!(html.contains("sig=="));
        assert!(html.contains("name='random'"));
    }
}
