//! Client facade (spec §4.4): the public operation set, built on top of the
//! envelope builder, dispatch engine, response extractor, and signing
//! module. Construction goes through [`client::registry`] so that every
//! lookup for a credential returns the same process-wide instance.

pub mod params;
pub mod registry;

use crate::dispatch::{DispatchConfig, DispatchEngine};
use crate::envelope::{self, insert_optional};
use crate::error::RandomOrgError;
use crate::precache::RequestExecutor;
use crate::response::{self, RandomData};
use crate::signing::{self, SignedBundle};
use crate::sleeper::TokioSleeper;
use crate::transport::{ReqwestTransport, Transport, INVOKE_URL};
use crate::usage::UsageSnapshot;
use async_trait::async_trait;
use crate::clock::{MonotonicClock, SystemWallClock};
use params::ParamError;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

/// Default blocking timeout: 24 hours (spec §6).
pub const DEFAULT_BLOCKING_TIMEOUT: Duration = Duration::from_secs(24 * 60 * 60);
/// Default HTTP timeout: 120 seconds (spec §6).
pub const DEFAULT_HTTP_TIMEOUT: Duration = Duration::from_secs(120);

/// Errors a public operation can fail with: either local parameter
/// validation (never reaches the wire) or the dispatch-level taxonomy.
#[derive(Debug, Error)]
pub enum ClientError {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Request(#[from] RandomOrgError),
}

/// Immutable client construction options (spec §6).
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// `None` means unbounded (spec's "sentinel for unbounded").
    pub blocking_timeout: Option<Duration>,
    pub http_timeout: Duration,
    pub serialized: bool,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            blocking_timeout: Some(DEFAULT_BLOCKING_TIMEOUT),
            http_timeout: DEFAULT_HTTP_TIMEOUT,
            serialized: true,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("http timeout must be greater than zero")]
    InvalidHttpTimeout,
}

/// Fluent builder for [`ClientOptions`]: typed setters, a validating
/// `build()`.
#[derive(Debug, Clone, Default)]
pub struct ClientOptionsBuilder {
    options: ClientOptions,
}

impl ClientOptionsBuilder {
    pub fn new() -> Self {
        Self { options: ClientOptions::default() }
    }

    pub fn blocking_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.options.blocking_timeout = timeout;
        self
    }

    pub fn http_timeout(mut self, timeout: Duration) -> Self {
        self.options.http_timeout = timeout;
        self
    }

    pub fn serialized(mut self, serialized: bool) -> Self {
        self.options.serialized = serialized;
        self
    }

    pub fn build(self) -> Result<ClientOptions, ConfigError> {
        if self.options.http_timeout.is_zero() {
            return Err(ConfigError::InvalidHttpTimeout);
        }
        Ok(self.options)
    }
}

/// Optional fields shared by every signed generate-* variant (spec §4.4.2).
#[derive(Debug, Clone, Default)]
pub struct SignedOptions {
    pub user_data: Option<Value>,
    pub license_data: Option<String>,
    pub pregenerated_randomization: Option<Value>,
    pub ticket_id: Option<String>,
}

impl SignedOptions {
    fn apply(&self, params: &mut Value) -> Result<(), ParamError> {
        if let Some(user_data) = &self.user_data {
            let encoded_len = user_data.to_string().len();
            params::validate_user_data_len(encoded_len)?;
        }
        insert_optional(params, "userData", self.user_data.as_ref());
        insert_optional(params, "licenseData", self.license_data.as_ref());
        insert_optional(params, "pregeneratedRandomization", self.pregenerated_randomization.as_ref());
        insert_optional(params, "ticketId", self.ticket_id.as_ref());
        Ok(())
    }
}

/// Base 10 decodes `result.random.data` as integers; any other base (2, 8,
/// 16) decodes it as decimal-digit strings (spec §4.4.3).
fn decode_integers(result: &Value, base: u8) -> Result<RandomData, RandomOrgError> {
    if base == 10 {
        response::extract_integers(result).map(RandomData::Integers)
    } else {
        response::extract_digit_strings(result).map(RandomData::DigitStrings)
    }
}

/// As [`decode_integers`], but for `generateIntegerSequences`: if every
/// sequence in the request used base 10 the response is nested integer
/// arrays, otherwise nested digit-string arrays.
fn decode_integer_sequences(result: &Value, bases: &[u8]) -> Result<RandomData, RandomOrgError> {
    if bases.iter().all(|&base| base == 10) {
        response::extract_integer_sequences(result).map(RandomData::IntegerSequences)
    } else {
        response::extract_digit_string_sequences(result).map(RandomData::DigitStringSequences)
    }
}

/// Dispatch a `getResult`/`getTicket` response on `result.random.method` to
/// pick the right typed extractor, the way every other signed operation
/// already knows its method up front (spec §4.4.2).
fn decode_by_method(result: &Value) -> Result<RandomData, RandomOrgError> {
    let random = result.get("random").ok_or_else(|| RandomOrgError::ProtocolError {
        message: "missing random object".into(),
    })?;
    let method = random.get("method").and_then(Value::as_str).ok_or_else(|| RandomOrgError::ProtocolError {
        message: "random object missing method".into(),
    })?;
    match method {
        "generateIntegers" | "generateSignedIntegers" => {
            let base = random.get("base").and_then(Value::as_u64).unwrap_or(10) as u8;
            decode_integers(result, base)
        }
        "generateIntegerSequences" | "generateSignedIntegerSequences" => {
            let bases: Vec<u8> = match random.get("base") {
                Some(Value::Array(items)) => {
                    items.iter().filter_map(Value::as_u64).map(|b| b as u8).collect()
                }
                Some(v) => vec![v.as_u64().unwrap_or(10) as u8],
                None => vec![10],
            };
            decode_integer_sequences(result, &bases)
        }
        "generateDecimalFractions" | "generateSignedDecimalFractions" | "generateGaussians"
        | "generateSignedGaussians" => response::extract_doubles(result).map(RandomData::Doubles),
        "generateStrings" | "generateSignedStrings" | "generateBlobs" | "generateSignedBlobs" => {
            response::extract_strings(result).map(RandomData::Strings)
        }
        "generateUUIDs" | "generateSignedUUIDs" => response::extract_uuids(result).map(RandomData::Uuids),
        other => Err(RandomOrgError::ProtocolError { message: format!("unrecognized random method '{other}'") }),
    }
}

/// The client facade: one instance per credential, shared process-wide via
/// [`registry::get_or_create`].
#[derive(Debug)]
pub struct RandomOrgClient {
    credential: String,
    options: ClientOptions,
    dispatch: Arc<DispatchEngine>,
}

impl RandomOrgClient {
    /// Look up (or construct, on first call for this credential) the
    /// process-wide singleton client (spec §4.4.1).
    pub fn get(credential: impl Into<String>, options: ClientOptions) -> Arc<Self> {
        registry::get_or_create(&credential.into(), options)
    }

    pub(crate) fn new(credential: String, options: ClientOptions) -> Arc<Self> {
        let transport: Arc<dyn Transport> = Arc::new(
            ReqwestTransport::new(options.http_timeout).expect("reqwest client builder never fails on valid timeouts"),
        );
        let dispatch = DispatchEngine::new(DispatchConfig {
            transport,
            clock: Arc::new(MonotonicClock::default()),
            wall_clock: Arc::new(SystemWallClock),
            sleeper: Arc::new(TokioSleeper),
            url: INVOKE_URL.to_string(),
            serialized: options.serialized,
        });
        Arc::new(Self { credential, options, dispatch })
    }

    /// Construct a client around a caller-supplied dispatch engine, bypassing
    /// the registry and the `reqwest` transport. Exposed publicly (alongside
    /// [`crate::FakeTransport`]) for integration tests that need the full
    /// operation surface without a network round trip.
    pub fn with_dispatch_engine(
        credential: impl Into<String>,
        options: ClientOptions,
        dispatch: Arc<DispatchEngine>,
    ) -> Arc<Self> {
        Arc::new(Self { credential: credential.into(), options, dispatch })
    }

    pub fn is_serialized(&self) -> bool {
        self.options.serialized
    }

    /// The cached usage snapshot, without a round trip.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.dispatch.usage_snapshot()
    }

    /// Proactively refreshes usage bookkeeping before a call proceeds, when
    /// it's unknown or stale (spec §3): otherwise a client that only ever
    /// issues signed calls or ticket ops would never catch up its
    /// bits/requests accounting, since only plain non-ticket responses
    /// carry allowance fields. Never recurses into `getUsage` itself, and
    /// swallows a failed refresh so it doesn't fail the caller's request.
    async fn maybe_refresh_usage(&self, method: &str) {
        if method != "getUsage" && self.dispatch.usage_is_stale() {
            let _ = self.get_usage().await;
        }
    }

    async fn call(&self, method: &str, params: Value) -> Result<Value, RandomOrgError> {
        self.maybe_refresh_usage(method).await;
        let env = envelope::build_envelope(method, params, Some(&self.credential));
        self.dispatch.dispatch(env, self.options.blocking_timeout).await
    }

    async fn call_with_raw_body(
        &self,
        method: &str,
        params: Value,
    ) -> Result<(Value, String), RandomOrgError> {
        self.maybe_refresh_usage(method).await;
        let env = envelope::build_envelope(method, params, Some(&self.credential));
        self.dispatch.dispatch_with_raw_body(env, self.options.blocking_timeout).await
    }

    async fn call_signed<T>(
        &self,
        method: &str,
        mut params: Value,
        signed: &SignedOptions,
        extract: impl Fn(&Value) -> Result<T, RandomOrgError>,
    ) -> Result<SignedBundle<T>, ClientError> {
        signed.apply(&mut params)?;
        let (result, body) = self.call_with_raw_body(method, params).await?;
        let data = extract(&result)?;
        let signature = response::extract_signature(&result).ok_or_else(|| {
            RandomOrgError::ProtocolError { message: "signed response missing signature".into() }
        })?;
        let random = signing::parse_raw_random(&body)?.ok_or_else(|| RandomOrgError::ProtocolError {
            message: "signed response missing random object".into(),
        })?;
        Ok(SignedBundle { data, random, signature })
    }

    // ---- plain generate-* ----------------------------------------------

    /// Base 10 decodes as integers; any other base (2, 8, 16) decodes as
    /// decimal-digit strings, since that's the shape the service returns
    /// for non-base-10 requests (spec §4.4.3).
    pub async fn generate_integers(
        &self,
        n: i64,
        min: i64,
        max: i64,
        replacement: bool,
        base: u8,
    ) -> Result<RandomData, ClientError> {
        params::validate_count(n, 10_000)?;
        params::validate_integer_bounds(min, max)?;
        params::validate_base(base)?;
        let params_json = json!({"n": n, "min": min, "max": max, "replacement": replacement, "base": base});
        let result = self.call("generateIntegers", params_json).await?;
        Ok(decode_integers(&result, base)?)
    }

    pub async fn generate_integer_sequences(
        &self,
        count: i64,
        length: i64,
        min: i64,
        max: i64,
        replacement: bool,
        base: u8,
    ) -> Result<RandomData, ClientError> {
        params::validate_count(count, 1_000)?;
        params::validate_count(length, 10_000)?;
        params::validate_integer_bounds(min, max)?;
        params::validate_base(base)?;
        let params_json = json!({
            "n": count, "length": length, "min": min, "max": max,
            "replacement": replacement, "base": base,
        });
        let result = self.call("generateIntegerSequences", params_json).await?;
        Ok(decode_integer_sequences(&result, &[base])?)
    }

    /// Multiform overload: per-sequence length/min/max/replacement/base.
    pub async fn generate_integer_sequences_multiform(
        &self,
        count: i64,
        lengths: &[i64],
        mins: &[i64],
        maxs: &[i64],
        replacements: &[bool],
        bases: &[u8],
    ) -> Result<RandomData, ClientError> {
        params::validate_count(count, 1_000)?;
        let expected = count as usize;
        params::validate_multiform_lengths(expected, &[lengths.len(), mins.len(), maxs.len(), replacements.len(), bases.len()])?;
        for &len in lengths {
            params::validate_count(len, 10_000)?;
        }
        for (&min, &max) in mins.iter().zip(maxs.iter()) {
            params::validate_integer_bounds(min, max)?;
        }
        for &base in bases {
            params::validate_base(base)?;
        }
        let params_json = json!({
            "n": count, "length": lengths, "min": mins, "max": maxs,
            "replacement": replacements, "base": bases,
        });
        let result = self.call("generateIntegerSequences", params_json).await?;
        Ok(decode_integer_sequences(&result, bases)?)
    }

    pub async fn generate_decimal_fractions(
        &self,
        n: i64,
        decimal_places: u32,
        replacement: bool,
    ) -> Result<Vec<f64>, ClientError> {
        params::validate_count(n, 10_000)?;
        params::validate_decimal_places(decimal_places)?;
        let params_json = json!({"n": n, "decimalPlaces": decimal_places, "replacement": replacement});
        let result = self.call("generateDecimalFractions", params_json).await?;
        Ok(response::extract_doubles(&result)?)
    }

    pub async fn generate_gaussians(
        &self,
        n: i64,
        mean: f64,
        standard_deviation: f64,
        significant_digits: u32,
    ) -> Result<Vec<f64>, ClientError> {
        params::validate_count(n, 10_000)?;
        params::validate_real_bound(mean)?;
        params::validate_real_bound(standard_deviation)?;
        params::validate_significant_digits(significant_digits)?;
        let params_json = json!({
            "n": n, "mean": mean, "standardDeviation": standard_deviation,
            "significantDigits": significant_digits,
        });
        let result = self.call("generateGaussians", params_json).await?;
        Ok(response::extract_doubles(&result)?)
    }

    pub async fn generate_strings(
        &self,
        n: i64,
        length: u32,
        alphabet: &str,
        replacement: bool,
    ) -> Result<Vec<String>, ClientError> {
        params::validate_count(n, 10_000)?;
        params::validate_string_length(length)?;
        params::validate_alphabet(alphabet)?;
        let params_json = json!({"n": n, "length": length, "characters": alphabet, "replacement": replacement});
        let result = self.call("generateStrings", params_json).await?;
        Ok(response::extract_strings(&result)?)
    }

    pub async fn generate_uuids(&self, n: i64) -> Result<Vec<Uuid>, ClientError> {
        params::validate_count(n, 1_000)?;
        let params_json = json!({"n": n});
        let result = self.call("generateUUIDs", params_json).await?;
        Ok(response::extract_uuids(&result)?)
    }

    pub async fn generate_blobs(&self, n: i64, size_bits: u32, format: &str) -> Result<Vec<String>, ClientError> {
        params::validate_count(n, 100)?;
        params::validate_blob_size_bits(size_bits)?;
        params::validate_blob_format(format)?;
        let params_json = json!({"n": n, "size": size_bits, "format": format});
        let result = self.call("generateBlobs", params_json).await?;
        Ok(response::extract_strings(&result)?)
    }

    // ---- signed generate-* ----------------------------------------------

    pub async fn generate_signed_integers(
        &self,
        n: i64,
        min: i64,
        max: i64,
        replacement: bool,
        base: u8,
        signed: &SignedOptions,
    ) -> Result<SignedBundle<RandomData>, ClientError> {
        params::validate_count(n, 10_000)?;
        params::validate_integer_bounds(min, max)?;
        params::validate_base(base)?;
        let params_json = json!({"n": n, "min": min, "max": max, "replacement": replacement, "base": base});
        self.call_signed("generateSignedIntegers", params_json, signed, |result| decode_integers(result, base))
            .await
    }

    pub async fn generate_signed_decimal_fractions(
        &self,
        n: i64,
        decimal_places: u32,
        replacement: bool,
        signed: &SignedOptions,
    ) -> Result<SignedBundle<Vec<f64>>, ClientError> {
        params::validate_count(n, 10_000)?;
        params::validate_decimal_places(decimal_places)?;
        let params_json = json!({"n": n, "decimalPlaces": decimal_places, "replacement": replacement});
        self.call_signed("generateSignedDecimalFractions", params_json, signed, response::extract_doubles).await
    }

    pub async fn generate_signed_gaussians(
        &self,
        n: i64,
        mean: f64,
        standard_deviation: f64,
        significant_digits: u32,
        signed: &SignedOptions,
    ) -> Result<SignedBundle<Vec<f64>>, ClientError> {
        params::validate_count(n, 10_000)?;
        params::validate_real_bound(mean)?;
        params::validate_real_bound(standard_deviation)?;
        params::validate_significant_digits(significant_digits)?;
        let params_json = json!({
            "n": n, "mean": mean, "standardDeviation": standard_deviation,
            "significantDigits": significant_digits,
        });
        self.call_signed("generateSignedGaussians", params_json, signed, response::extract_doubles).await
    }

    pub async fn generate_signed_strings(
        &self,
        n: i64,
        length: u32,
        alphabet: &str,
        replacement: bool,
        signed: &SignedOptions,
    ) -> Result<SignedBundle<Vec<String>>, ClientError> {
        params::validate_count(n, 10_000)?;
        params::validate_string_length(length)?;
        params::validate_alphabet(alphabet)?;
        let params_json = json!({"n": n, "length": length, "characters": alphabet, "replacement": replacement});
        self.call_signed("generateSignedStrings", params_json, signed, response::extract_strings).await
    }

    pub async fn generate_signed_uuids(
        &self,
        n: i64,
        signed: &SignedOptions,
    ) -> Result<SignedBundle<Vec<Uuid>>, ClientError> {
        params::validate_count(n, 1_000)?;
        let params_json = json!({"n": n});
        self.call_signed("generateSignedUUIDs", params_json, signed, response::extract_uuids).await
    }

    pub async fn generate_signed_blobs(
        &self,
        n: i64,
        size_bits: u32,
        format: &str,
        signed: &SignedOptions,
    ) -> Result<SignedBundle<Vec<String>>, ClientError> {
        params::validate_count(n, 100)?;
        params::validate_blob_size_bits(size_bits)?;
        params::validate_blob_format(format)?;
        let params_json = json!({"n": n, "size": size_bits, "format": format});
        self.call_signed("generateSignedBlobs", params_json, signed, response::extract_strings).await
    }

    pub async fn generate_signed_integer_sequences(
        &self,
        count: i64,
        length: i64,
        min: i64,
        max: i64,
        replacement: bool,
        base: u8,
        signed: &SignedOptions,
    ) -> Result<SignedBundle<RandomData>, ClientError> {
        params::validate_count(count, 1_000)?;
        params::validate_count(length, 10_000)?;
        params::validate_integer_bounds(min, max)?;
        params::validate_base(base)?;
        let params_json = json!({
            "n": count, "length": length, "min": min, "max": max,
            "replacement": replacement, "base": base,
        });
        self.call_signed("generateSignedIntegerSequences", params_json, signed, |result| {
            decode_integer_sequences(result, &[base])
        })
        .await
    }

    // ---- auxiliary operations --------------------------------------------

    /// Refresh usage bookkeeping from the service (spec §4.4.2 `getUsage`).
    pub async fn get_usage(&self) -> Result<(), RandomOrgError> {
        self.call("getUsage", json!({})).await?;
        Ok(())
    }

    pub async fn get_result(&self, serial_number: i64) -> Result<SignedBundle<RandomData>, ClientError> {
        let params_json = json!({"serialNumber": serial_number});
        self.call_signed("getResult", params_json, &SignedOptions::default(), decode_by_method).await
    }

    pub async fn create_tickets(&self, n: i64, show_result: bool) -> Result<Vec<Value>, RandomOrgError> {
        let params_json = json!({"n": n, "showResult": show_result});
        let result = self.call("createTickets", params_json).await?;
        result
            .as_array()
            .cloned()
            .ok_or_else(|| RandomOrgError::ProtocolError { message: "createTickets: expected array result".into() })
    }

    pub async fn reveal_tickets(&self, ticket_id: &str) -> Result<i64, RandomOrgError> {
        let params_json = json!({"ticketId": ticket_id});
        let result = self.call("revealTickets", params_json).await?;
        result
            .get("ticketCount")
            .and_then(Value::as_i64)
            .ok_or_else(|| RandomOrgError::ProtocolError { message: "revealTickets: missing ticketCount".into() })
    }

    pub async fn list_tickets(&self, ticket_type: &str) -> Result<Vec<Value>, RandomOrgError> {
        let params_json = json!({"ticketType": ticket_type});
        let result = self.call("listTickets", params_json).await?;
        result
            .as_array()
            .cloned()
            .ok_or_else(|| RandomOrgError::ProtocolError { message: "listTickets: expected array result".into() })
    }

    /// Returns the signed bundle when the ticket's result is available and
    /// permitted; otherwise the raw ticket descriptor object (spec §4.4.2).
    pub async fn get_ticket(
        &self,
        ticket_id: &str,
    ) -> Result<Result<SignedBundle<RandomData>, Value>, RandomOrgError> {
        let params_json = json!({"ticketId": ticket_id});
        let (result, body) = self.call_with_raw_body("getTicket", params_json).await?;
        match result.get("random") {
            Some(_) => {
                let random = signing::parse_raw_random(&body)?.ok_or_else(|| RandomOrgError::ProtocolError {
                    message: "getTicket: random present but unparseable".into(),
                })?;
                let signature = response::extract_signature(&result).ok_or_else(|| RandomOrgError::ProtocolError {
                    message: "getTicket: signed result missing signature".into(),
                })?;
                let data = decode_by_method(&result)?;
                Ok(Ok(SignedBundle { data, random, signature }))
            }
            None => Ok(Err(result)),
        }
    }

    pub async fn verify_signature(&self, random: &Value, signature: &str) -> Result<bool, RandomOrgError> {
        let params_json = json!({"random": random, "signature": signature});
        let result = self.call("verifySignature", params_json).await?;
        response::extract_authenticity(&result)
    }

    pub fn create_verification_url(&self, random: &serde_json::value::RawValue, signature: &str) -> Result<String, RandomOrgError> {
        signing::create_verification_url(random, signature)
    }

    pub fn create_verification_form_html(&self, random: &serde_json::value::RawValue, signature: &str) -> String {
        signing::create_verification_form_html(random, signature)
    }
}

/// Lets the precache engine place bulk round trips through this client
/// without depending on its internals (registry, options) directly.
#[async_trait]
impl RequestExecutor for RandomOrgClient {
    async fn execute(&self, method: &str, params: Value) -> Result<Value, RandomOrgError> {
        self.call(method, params).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_options_builder_defaults_match_spec() {
        let opts = ClientOptionsBuilder::new().build().unwrap();
        assert_eq!(opts.blocking_timeout, Some(DEFAULT_BLOCKING_TIMEOUT));
        assert_eq!(opts.http_timeout, DEFAULT_HTTP_TIMEOUT);
        assert!(opts.serialized);
    }

    #[test]
    fn client_options_builder_rejects_zero_http_timeout() {
        let err = ClientOptionsBuilder::new().http_timeout(Duration::ZERO).build();
        assert!(err.is_err());
    }

    #[test]
    fn client_options_builder_allows_unbounded_blocking_timeout() {
        let opts = ClientOptionsBuilder::new().blocking_timeout(None).build().unwrap();
        assert_eq!(opts.blocking_timeout, None);
    }
}
