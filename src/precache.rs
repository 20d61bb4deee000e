//! Precache engine (spec §4.5): a background pool that keeps a buffer of
//! ready-to-hand-out batches, bulk-ordering several batches per round trip
//! and shrinking the bulk factor under backpressure.
//!
//! The bulk factor lives in an [`Adaptive<T>`] for cheap lock-free reads and
//! a single-owner shrink path; the pool itself is a bounded buffer with a
//! background refill worker that pauses on persistent failure instead of
//! rejecting callers outright.

use crate::adaptive::Adaptive;
use crate::error::RandomOrgError;
use async_trait::async_trait;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::Notify;

/// Narrow interface the precache engine depends on to place a round trip,
/// implemented by the client facade (envelope build + dispatch + credential
/// injection). Kept separate from [`crate::dispatch::DispatchEngine`] so
/// this module has no knowledge of the singleton registry or client state.
#[async_trait]
pub trait RequestExecutor: Send + Sync + std::fmt::Debug {
    async fn execute(&self, method: &str, params: Value) -> Result<Value, RandomOrgError>;
}

fn ceil_log2_int(k: u64) -> u64 {
    if k <= 1 {
        0
    } else {
        (64 - (k - 1).leading_zeros()) as u64
    }
}

fn ceil_log2_f64(x: f64) -> u64 {
    x.log2().ceil().max(0.0) as u64
}

/// Per-element bit estimate formulas (spec §4.5.3).
pub mod bit_estimate {
    use super::{ceil_log2_f64, ceil_log2_int};

    pub fn integer(min: i64, max: i64) -> u64 {
        ceil_log2_int((max - min + 1) as u64)
    }

    /// Per sequence, not per element: `⌈log₂(max − min + 1)⌉ · length`.
    pub fn integer_sequence(min: i64, max: i64, length: u32) -> u64 {
        integer(min, max) * length as u64
    }

    pub fn decimal_fraction(decimal_places: u32) -> u64 {
        ceil_log2_f64(10f64.powi(decimal_places as i32))
    }

    pub fn gaussian(significant_digits: u32) -> u64 {
        ceil_log2_f64(10f64.powi(significant_digits as i32))
    }

    pub fn string(alphabet_size: usize, length: u32) -> u64 {
        ceil_log2_f64(alphabet_size as f64) * length as u64
    }

    pub const UUID: u64 = 122;

    pub fn blob(size_bits: u32) -> u64 {
        size_bits as u64
    }
}

/// A conservative default for the service's per-request bit ceiling (spec
/// §4.5.2's `maxRequestSize`). Overridable via [`PrecacheSpec::with_max_request_size_bits`]
/// if `getUsage` ever surfaces a tighter account-specific limit.
pub const DEFAULT_MAX_REQUEST_SIZE_BITS: u64 = 1_000_000;

/// Default target buffer size for scalar request shapes (spec §4.5.1).
pub const DEFAULT_TARGET_BUFFER_SIZE_SCALAR: usize = 20;
/// Default target buffer size for UUID/blob request shapes (spec §4.5.1).
pub const DEFAULT_TARGET_BUFFER_SIZE_COMPACT: usize = 10;
/// Minimum allowed target buffer size (spec §4.5.1).
pub const MIN_TARGET_BUFFER_SIZE: usize = 2;

type BuildParams = Box<dyn Fn(u32) -> Value + Send + Sync>;
type Extract<T> = Box<dyn Fn(&Value) -> Result<Vec<T>, RandomOrgError> + Send + Sync>;

/// A tagged precache request shape keyed by method (spec §9 "Precache"
/// design note): the elements-per-batch, the per-element bit estimator,
/// whether the request is without-replacement (pins the bulk factor at 1),
/// and the closures to build bulked params and extract typed elements.
pub struct PrecacheSpec<T> {
    method: &'static str,
    n: usize,
    replacement: bool,
    bits_per_element: u64,
    max_request_size_bits: u64,
    build_params: BuildParams,
    extract: Extract<T>,
}

impl<T> PrecacheSpec<T> {
    pub fn with_max_request_size_bits(mut self, bits: u64) -> Self {
        self.max_request_size_bits = bits;
        self
    }
}

impl PrecacheSpec<i64> {
    /// `generateIntegers`, base 10 only (non-base-10 integers return digit
    /// strings and aren't a precache named constructor; build a custom
    /// spec if needed).
    pub fn integers(min: i64, max: i64, replacement: bool, n: usize) -> (Self, usize) {
        let bits_per_element = bit_estimate::integer(min, max);
        let spec = Self {
            method: "generateIntegers",
            n,
            replacement,
            bits_per_element,
            max_request_size_bits: DEFAULT_MAX_REQUEST_SIZE_BITS,
            build_params: Box::new(move |bulk| {
                serde_json::json!({
                    "n": bulk as usize * n,
                    "min": min,
                    "max": max,
                    "replacement": replacement,
                    "base": 10,
                })
            }),
            extract: Box::new(crate::response::extract_integers),
        };
        (spec, DEFAULT_TARGET_BUFFER_SIZE_SCALAR)
    }
}

impl PrecacheSpec<f64> {
    pub fn decimal_fractions(decimal_places: u32, replacement: bool, n: usize) -> (Self, usize) {
        let bits_per_element = bit_estimate::decimal_fraction(decimal_places);
        let spec = Self {
            method: "generateDecimalFractions",
            n,
            replacement,
            bits_per_element,
            max_request_size_bits: DEFAULT_MAX_REQUEST_SIZE_BITS,
            build_params: Box::new(move |bulk| {
                serde_json::json!({
                    "n": bulk as usize * n,
                    "decimalPlaces": decimal_places,
                    "replacement": replacement,
                })
            }),
            extract: Box::new(crate::response::extract_doubles),
        };
        (spec, DEFAULT_TARGET_BUFFER_SIZE_SCALAR)
    }

    pub fn gaussians(mean: f64, standard_deviation: f64, significant_digits: u32, n: usize) -> (Self, usize) {
        let bits_per_element = bit_estimate::gaussian(significant_digits);
        let spec = Self {
            method: "generateGaussians",
            n,
            replacement: true,
            bits_per_element,
            max_request_size_bits: DEFAULT_MAX_REQUEST_SIZE_BITS,
            build_params: Box::new(move |bulk| {
                serde_json::json!({
                    "n": bulk as usize * n,
                    "mean": mean,
                    "standardDeviation": standard_deviation,
                    "significantDigits": significant_digits,
                })
            }),
            extract: Box::new(crate::response::extract_doubles),
        };
        (spec, DEFAULT_TARGET_BUFFER_SIZE_SCALAR)
    }
}

impl PrecacheSpec<Vec<i64>> {
    /// `generateIntegerSequences`, base 10 only (uniform shape: every
    /// sequence shares length/min/max/replacement/base).
    pub fn integer_sequences(length: u32, min: i64, max: i64, replacement: bool, n: usize) -> (Self, usize) {
        let bits_per_element = bit_estimate::integer_sequence(min, max, length);
        let spec = Self {
            method: "generateIntegerSequences",
            n,
            replacement,
            bits_per_element,
            max_request_size_bits: DEFAULT_MAX_REQUEST_SIZE_BITS,
            build_params: Box::new(move |bulk| {
                serde_json::json!({
                    "n": bulk as usize * n,
                    "length": length,
                    "min": min,
                    "max": max,
                    "replacement": replacement,
                    "base": 10,
                })
            }),
            extract: Box::new(crate::response::extract_integer_sequences),
        };
        (spec, DEFAULT_TARGET_BUFFER_SIZE_SCALAR)
    }
}

impl PrecacheSpec<String> {
    pub fn strings(alphabet: &str, length: u32, replacement: bool, n: usize) -> (Self, usize) {
        let alphabet_size = alphabet.chars().count();
        let bits_per_element = bit_estimate::string(alphabet_size, length);
        let alphabet = alphabet.to_string();
        let spec = Self {
            method: "generateStrings",
            n,
            replacement,
            bits_per_element,
            max_request_size_bits: DEFAULT_MAX_REQUEST_SIZE_BITS,
            build_params: Box::new(move |bulk| {
                serde_json::json!({
                    "n": bulk as usize * n,
                    "length": length,
                    "characters": alphabet,
                    "replacement": replacement,
                })
            }),
            extract: Box::new(crate::response::extract_strings),
        };
        (spec, DEFAULT_TARGET_BUFFER_SIZE_SCALAR)
    }

    pub fn blobs(size_bits: u32, format: &str, n: usize) -> (Self, usize) {
        let format = format.to_string();
        let spec = Self {
            method: "generateBlobs",
            n,
            replacement: true,
            bits_per_element: bit_estimate::blob(size_bits),
            max_request_size_bits: DEFAULT_MAX_REQUEST_SIZE_BITS,
            build_params: Box::new(move |bulk| {
                serde_json::json!({
                    "n": bulk as usize * n,
                    "size": size_bits,
                    "format": format,
                })
            }),
            extract: Box::new(crate::response::extract_strings),
        };
        (spec, DEFAULT_TARGET_BUFFER_SIZE_COMPACT)
    }
}

impl PrecacheSpec<uuid::Uuid> {
    pub fn uuids(n: usize) -> (Self, usize) {
        let spec = Self {
            method: "generateUUIDs",
            n,
            replacement: true,
            bits_per_element: bit_estimate::UUID,
            max_request_size_bits: DEFAULT_MAX_REQUEST_SIZE_BITS,
            build_params: Box::new(move |bulk| serde_json::json!({ "n": bulk as usize * n })),
            extract: Box::new(crate::response::extract_uuids),
        };
        (spec, DEFAULT_TARGET_BUFFER_SIZE_COMPACT)
    }
}

struct PoolState<T> {
    buffer: VecDeque<Vec<T>>,
    paused: bool,
    pending_error: Option<RandomOrgError>,
}

/// What `take()` yields (spec §4.5.1, §4.5.4).
#[derive(Debug)]
pub enum TakeResult<T> {
    Batch(Vec<T>),
    Empty,
    Error(RandomOrgError),
}

/// The precache pool handle. One per call to [`PrecachePool::new`]; the
/// refill worker runs for as long as the pool handle (and its clones) live.
pub struct PrecachePool<T> {
    spec: PrecacheSpec<T>,
    executor: Arc<dyn RequestExecutor>,
    target_buffer_size: usize,
    bulk_factor: Adaptive<u32>,
    state: Mutex<PoolState<T>>,
    notify: Notify,
    bits_used: AtomicU64,
    requests_used: AtomicU64,
}

impl<T: Clone + Send + Sync + 'static> PrecachePool<T> {
    /// Construct a pool and spawn its long-lived refill worker.
    ///
    /// `target_buffer_size` is clamped to [`MIN_TARGET_BUFFER_SIZE`].
    pub fn new(
        spec: PrecacheSpec<T>,
        executor: Arc<dyn RequestExecutor>,
        target_buffer_size: usize,
    ) -> Arc<Self> {
        let target_buffer_size = target_buffer_size.max(MIN_TARGET_BUFFER_SIZE);
        let initial_bulk = if spec.replacement {
            (target_buffer_size / 2).max(1) as u32
        } else {
            1
        };
        let pool = Arc::new(Self {
            spec,
            executor,
            target_buffer_size,
            bulk_factor: Adaptive::new(initial_bulk),
            state: Mutex::new(PoolState { buffer: VecDeque::new(), paused: false, pending_error: None }),
            notify: Notify::new(),
            bits_used: AtomicU64::new(0),
            requests_used: AtomicU64::new(0),
        });
        let worker = Arc::clone(&pool);
        tokio::spawn(async move { worker.run_refill().await });
        pool
    }

    /// Non-blocking; empties the buffer front-to-back in vend order.
    pub fn take(&self) -> TakeResult<T> {
        let mut state = self.state.lock().unwrap();
        if let Some(batch) = state.buffer.pop_front() {
            drop(state);
            self.notify.notify_waiters();
            return TakeResult::Batch(batch);
        }
        if let Some(err) = state.pending_error.take() {
            return TakeResult::Error(err);
        }
        TakeResult::Empty
    }

    pub fn pause(&self) {
        self.state.lock().unwrap().paused = true;
    }

    pub fn resume(&self) {
        tracing::info!(method = self.spec.method, "precache pool resuming");
        self.state.lock().unwrap().paused = false;
        self.notify.notify_waiters();
    }

    pub fn pending(&self) -> usize {
        self.state.lock().unwrap().buffer.len()
    }

    pub fn bits_used(&self) -> u64 {
        self.bits_used.load(Ordering::Relaxed)
    }

    pub fn requests_used(&self) -> u64 {
        self.requests_used.load(Ordering::Relaxed)
    }

    /// Current bulk factor (spec §4.5.2); exposed for tests proving
    /// monotonic shrinkage (invariant 6).
    pub fn bulk_factor(&self) -> u32 {
        *self.bulk_factor.get()
    }

    async fn run_refill(self: Arc<Self>) {
        loop {
            let (paused, full) = {
                let state = self.state.lock().unwrap();
                (state.paused, state.buffer.len() >= self.target_buffer_size)
            };
            if paused || full {
                self.notify.notified().await;
                continue;
            }

            let bulk = self.bulk_factor();
            let params = (self.spec.build_params)(bulk);
            match self.executor.execute(self.spec.method, params).await {
                Ok(response) => {
                    let items = match (self.spec.extract)(&response) {
                        Ok(items) => items,
                        Err(err) => {
                            self.propagate_and_pause(err);
                            continue;
                        }
                    };
                    let mut state = self.state.lock().unwrap();
                    for chunk in items.chunks(self.spec.n) {
                        state.buffer.push_back(chunk.to_vec());
                    }
                    drop(state);
                    self.requests_used.fetch_add(1, Ordering::Relaxed);
                    self.bits_used.fetch_add(
                        self.spec.bits_per_element * self.spec.n as u64 * bulk as u64,
                        Ordering::Relaxed,
                    );
                }
                Err(err) if err.is_insufficient_bits() => self.shrink_or_propagate(bulk, err),
                Err(err) if err.is_insufficient_requests() => self.propagate_and_pause(err),
                Err(err) => self.propagate_and_pause(err),
            }
        }
    }

    fn shrink_or_propagate(&self, current_bulk: u32, err: RandomOrgError) {
        if current_bulk <= 1 {
            tracing::warn!("precache bulk factor already at floor; propagating InsufficientBits");
            self.propagate_and_pause(err);
            return;
        }
        let per_request_bits = self.spec.bits_per_element * self.spec.n as u64;
        let max_bulk_that_fits =
            (self.spec.max_request_size_bits / per_request_bits.max(1)).max(1) as u32;
        let new_bulk = max_bulk_that_fits.min(current_bulk.saturating_sub(1)).max(1);
        tracing::warn!(old_bulk = current_bulk, new_bulk, "shrinking precache bulk factor");
        self.bulk_factor.set(new_bulk);
    }

    fn propagate_and_pause(&self, err: RandomOrgError) {
        tracing::warn!(method = self.spec.method, error = %err, "precache pool pausing");
        let mut state = self.state.lock().unwrap();
        state.paused = true;
        state.pending_error = Some(err);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::sync::Mutex as StdMutex;

    #[derive(Debug)]
    struct ScriptedExecutor {
        responses: StdMutex<VecDeque<Result<Value, RandomOrgError>>>,
        calls: StdMutex<Vec<(String, Value)>>,
    }

    impl ScriptedExecutor {
        fn new(responses: Vec<Result<Value, RandomOrgError>>) -> Self {
            Self { responses: StdMutex::new(responses.into()), calls: StdMutex::new(Vec::new()) }
        }
    }

    #[async_trait]
    impl RequestExecutor for ScriptedExecutor {
        async fn execute(&self, method: &str, params: Value) -> Result<Value, RandomOrgError> {
            self.calls.lock().unwrap().push((method.to_string(), params));
            self.responses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Err(RandomOrgError::Io { message: "script exhausted".into() }))
        }
    }

    fn integers_response(count: usize) -> Value {
        json!({"random": {"data": (0..count as i64).collect::<Vec<_>>()}})
    }

    #[tokio::test]
    async fn s5_precache_shrinks_and_eventually_fills() {
        let (spec, target) = PrecacheSpec::<i64>::integers(0, 1_000_000_000, true, 100);
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Err(RandomOrgError::InsufficientBits { message: "too big".into(), bits_left: Some(1) }),
            Ok(integers_response(100 * 9)), // after shrink, bulk likely < 10
        ]));
        let pool = PrecachePool::new(spec, executor.clone(), target);

        // Poll until a batch shows up or the pool gives up (bounded loop avoids hangs).
        let mut batch = None;
        for _ in 0..200 {
            match pool.take() {
                TakeResult::Batch(b) => {
                    batch = Some(b);
                    break;
                }
                TakeResult::Error(e) => panic!("unexpected error: {e}"),
                TakeResult::Empty => tokio::time::sleep(std::time::Duration::from_millis(5)).await,
            }
        }
        let batch = batch.expect("expected a batch eventually");
        assert_eq!(batch.len(), 100);
        assert!(pool.bulk_factor() <= 9);
    }

    #[tokio::test]
    async fn invariant6_bulk_factor_never_increases() {
        let (spec, target) = PrecacheSpec::<i64>::integers(0, 9, true, 10);
        let executor = Arc::new(ScriptedExecutor::new(vec![
            Err(RandomOrgError::InsufficientBits { message: "x".into(), bits_left: None }),
            Err(RandomOrgError::InsufficientBits { message: "x".into(), bits_left: None }),
            Err(RandomOrgError::InsufficientBits { message: "x".into(), bits_left: None }),
        ]));
        let pool = PrecachePool::new(spec, executor, target);

        let mut last = pool.bulk_factor();
        for _ in 0..200 {
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
            let current = pool.bulk_factor();
            assert!(current <= last, "bulk factor must never increase");
            last = current;
        }
    }

    #[tokio::test]
    async fn invariant5_batch_size_matches_n() {
        let (spec, target) = PrecacheSpec::<uuid::Uuid>::uuids(3);
        let uuids: Vec<Value> = (0..6).map(|_| json!(uuid::Uuid::new_v4().to_string())).collect();
        let executor = Arc::new(ScriptedExecutor::new(vec![Ok(json!({"random": {"data": uuids}}))]));
        let pool = PrecachePool::new(spec, executor, target);

        let mut seen = 0;
        for _ in 0..200 {
            if let TakeResult::Batch(batch) = pool.take() {
                assert_eq!(batch.len(), 3);
                seen += 1;
                if seen == 2 {
                    break;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(2)).await;
        }
        assert_eq!(seen, 2);
    }

    #[tokio::test]
    async fn insufficient_requests_pauses_and_yields_error_once() {
        let (spec, target) = PrecacheSpec::<i64>::integers(0, 9, true, 5);
        let executor = Arc::new(ScriptedExecutor::new(vec![Err(RandomOrgError::InsufficientRequests {
            message: "Error 402: quota".into(),
        })]));
        let pool = PrecachePool::new(spec, executor, target);

        tokio::time::sleep(std::time::Duration::from_millis(20)).await;
        match pool.take() {
            TakeResult::Error(e) => assert!(e.is_insufficient_requests()),
            other => panic!("expected Error, got {other:?}"),
        }
        assert!(matches!(pool.take(), TakeResult::Empty));
    }
}
