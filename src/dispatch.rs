//! The dispatch engine (spec §4.3, §5): the per-credential singleton
//! component that sends at most one request at a time (when serialized),
//! honors the advisory inter-request delay, enforces the daily quota
//! back-off, and translates service error codes into [`RandomOrgError`].
//!
//! The back-off state is an armed/clear gate guarded by a mutex, checked
//! before every send; the advisory delay is a "compute wait, sleep or
//! deny" gate layered on top of it.

use crate::clock::{next_midnight_utc, Clock, MonotonicClock, SystemWallClock, WallClock};
use crate::error::RandomOrgError;
use crate::sleeper::{Sleeper, TokioSleeper};
use crate::transport::{Transport, INVOKE_URL};
use crate::usage::UsageSnapshot;
use serde_json::Value;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{oneshot, Notify};

/// The default advisory delay assumed until the server says otherwise.
pub const DEFAULT_ADVISORY_DELAY: Duration = Duration::from_secs(1);

/// Methods the v4 contract omits allowance fields and an advisory delay
/// from (spec §4.3.4, §9 "Ticket op advisory handling"). The dispatch
/// engine must not reset usage bookkeeping from these and must fall back
/// to the default advisory delay.
const TICKET_METHODS: &[&str] = &["listTickets", "createTickets", "getTicket", "getResult"];

fn is_recognized_service_code(code: i64) -> bool {
    matches!(code, 100 | 101 | 200..=204 | 300..=307 | 400..=405 | 420..=426 | 500 | 32000)
}

/// Construction-time configuration for a [`DispatchEngine`].
pub struct DispatchConfig {
    pub transport: Arc<dyn Transport>,
    pub clock: Arc<dyn Clock>,
    pub wall_clock: Arc<dyn WallClock>,
    pub sleeper: Arc<dyn Sleeper>,
    pub url: String,
    pub serialized: bool,
}

impl DispatchConfig {
    /// Production defaults: real transport must still be supplied by the
    /// caller (the client facade owns the `reqwest`-backed transport).
    pub fn new(transport: Arc<dyn Transport>, serialized: bool) -> Self {
        Self {
            transport,
            clock: Arc::new(MonotonicClock::default()),
            wall_clock: Arc::new(SystemWallClock),
            sleeper: Arc::new(TokioSleeper),
            url: INVOKE_URL.to_string(),
            serialized,
        }
    }
}

struct DispatchState {
    advisory_delay_ms: u64,
    last_response_millis: Option<u64>,
    usage: UsageSnapshot,
    backoff_until_utc: Option<chrono::DateTime<chrono::Utc>>,
    backoff_message: Option<String>,
}

impl Default for DispatchState {
    fn default() -> Self {
        Self {
            advisory_delay_ms: DEFAULT_ADVISORY_DELAY.as_millis() as u64,
            last_response_millis: None,
            usage: UsageSnapshot::unknown(),
            backoff_until_utc: None,
            backoff_message: None,
        }
    }
}

struct QueueEntry {
    envelope: Value,
    blocking_timeout: Option<Duration>,
    enqueued_at_millis: u64,
    cancelled: Arc<AtomicBool>,
    tx: oneshot::Sender<Result<(Value, String), RandomOrgError>>,
}

/// The dispatch engine. One instance per credential (owned by the client
/// facade's registry), living for the process's lifetime.
pub struct DispatchEngine {
    transport: Arc<dyn Transport>,
    clock: Arc<dyn Clock>,
    wall_clock: Arc<dyn WallClock>,
    sleeper: Arc<dyn Sleeper>,
    url: String,
    serialized: bool,
    state: Mutex<DispatchState>,
    queue: Mutex<VecDeque<QueueEntry>>,
    queue_notify: Notify,
}

impl std::fmt::Debug for DispatchEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispatchEngine")
            .field("url", &self.url)
            .field("serialized", &self.serialized)
            .finish_non_exhaustive()
    }
}

impl DispatchEngine {
    /// Construct a dispatch engine, spawning its single long-lived worker
    /// task when `config.serialized` is set.
    pub fn new(config: DispatchConfig) -> Arc<Self> {
        let engine = Arc::new(Self {
            transport: config.transport,
            clock: config.clock,
            wall_clock: config.wall_clock,
            sleeper: config.sleeper,
            url: config.url,
            serialized: config.serialized,
            state: Mutex::new(DispatchState::default()),
            queue: Mutex::new(VecDeque::new()),
            queue_notify: Notify::new(),
        });
        if engine.serialized {
            let worker = Arc::clone(&engine);
            tokio::spawn(async move { worker.run_worker().await });
        }
        engine
    }

    /// Current usage snapshot, read under the shared state lock.
    pub fn usage_snapshot(&self) -> UsageSnapshot {
        self.state.lock().unwrap().usage
    }

    /// True if the usage snapshot is unknown or older than
    /// [`crate::usage::REFRESH_AFTER`] (spec §3): the client facade uses
    /// this to decide whether a call should trigger a proactive `getUsage`
    /// refresh before proceeding.
    pub fn usage_is_stale(&self) -> bool {
        let now = self.now_millis();
        self.state.lock().unwrap().usage.is_stale(now)
    }

    fn now_millis(&self) -> u64 {
        self.clock.now_millis()
    }

    /// Dispatch one envelope: at most one request on the wire at a time
    /// when serialized, translating the outcome into the error taxonomy.
    /// Discards the raw response body; use [`Self::dispatch_with_raw_body`]
    /// when the caller needs byte-exact JSON (signed results).
    pub async fn dispatch(
        self: &Arc<Self>,
        envelope: Value,
        blocking_timeout: Option<Duration>,
    ) -> Result<Value, RandomOrgError> {
        self.dispatch_with_raw_body(envelope, blocking_timeout).await.map(|(value, _)| value)
    }

    /// As [`Self::dispatch`], but also returns the raw response body text —
    /// needed so signed methods can lift `result.random` out bit-exact
    /// (spec §9 "JSON preservation") rather than through a reserialized
    /// `Value`.
    pub async fn dispatch_with_raw_body(
        self: &Arc<Self>,
        envelope: Value,
        blocking_timeout: Option<Duration>,
    ) -> Result<(Value, String), RandomOrgError> {
        if self.serialized {
            self.dispatch_serialized(envelope, blocking_timeout).await
        } else {
            self.dispatch_unserialized(envelope).await
        }
    }

    async fn dispatch_serialized(
        self: &Arc<Self>,
        envelope: Value,
        blocking_timeout: Option<Duration>,
    ) -> Result<(Value, String), RandomOrgError> {
        let (tx, rx) = oneshot::channel();
        let cancelled = Arc::new(AtomicBool::new(false));
        let entry = QueueEntry {
            envelope,
            blocking_timeout,
            enqueued_at_millis: self.now_millis(),
            cancelled: Arc::clone(&cancelled),
            tx,
        };
        self.queue.lock().unwrap().push_back(entry);
        self.queue_notify.notify_one();

        match blocking_timeout {
            Some(budget) => match tokio::time::timeout(budget, rx).await {
                Ok(Ok(result)) => result,
                Ok(Err(_)) => {
                    Err(RandomOrgError::Io { message: "dispatch worker dropped request".into() })
                }
                Err(_elapsed) => {
                    cancelled.store(true, Ordering::SeqCst);
                    Err(RandomOrgError::SendTimeout { waited: budget })
                }
            },
            None => rx.await.map_err(|_| RandomOrgError::Io {
                message: "dispatch worker dropped request".into(),
            })?,
        }
    }

    async fn dispatch_unserialized(
        self: &Arc<Self>,
        envelope: Value,
    ) -> Result<(Value, String), RandomOrgError> {
        let this = Arc::clone(self);
        tokio::spawn(async move { this.run_pre_send_and_send(envelope, None).await })
            .await
            .map_err(|e| RandomOrgError::Io { message: format!("dispatch worker panicked: {e}") })?
    }

    /// The single long-lived worker for serialized clients (spec §4.3.5).
    /// Strictly FIFO; discards cancelled entries without sending.
    async fn run_worker(self: Arc<Self>) {
        loop {
            let entry = loop {
                if let Some(entry) = self.queue.lock().unwrap().pop_front() {
                    break entry;
                }
                self.queue_notify.notified().await;
            };
            if entry.cancelled.load(Ordering::SeqCst) {
                continue;
            }
            let remaining = entry.blocking_timeout.map(|budget| {
                let elapsed = Duration::from_millis(
                    self.now_millis().saturating_sub(entry.enqueued_at_millis),
                );
                budget.saturating_sub(elapsed)
            });
            let result = self.run_pre_send_and_send(entry.envelope, remaining).await;
            let _ = entry.tx.send(result);
        }
    }

    async fn run_pre_send_and_send(
        self: Arc<Self>,
        envelope: Value,
        remaining_budget: Option<Duration>,
    ) -> Result<(Value, String), RandomOrgError> {
        self.pre_send_gate(remaining_budget).await?;
        self.send_and_decode(envelope).await
    }

    /// §4.3.2: back-off check, then advisory-delay wait.
    async fn pre_send_gate(&self, remaining_budget: Option<Duration>) -> Result<(), RandomOrgError> {
        loop {
            let wait_ms = {
                let mut state = self.state.lock().unwrap();
                let now_utc = self.wall_clock.now_utc();
                if let Some(until) = state.backoff_until_utc {
                    if now_utc < until {
                        return Err(RandomOrgError::InsufficientRequests {
                            message: state.backoff_message.clone().unwrap_or_default(),
                        });
                    }
                    tracing::info!(until = %until, "quota back-off cleared");
                    state.backoff_until_utc = None;
                    state.backoff_message = None;
                }
                let now_ms = self.now_millis();
                match state.last_response_millis {
                    None => 0,
                    Some(last) => {
                        state.advisory_delay_ms.saturating_sub(now_ms.saturating_sub(last))
                    }
                }
            };

            if wait_ms == 0 {
                return Ok(());
            }
            let wait = Duration::from_millis(wait_ms);

            if self.serialized {
                if let Some(budget) = remaining_budget {
                    if wait > budget {
                        return Err(RandomOrgError::SendTimeout { waited: budget });
                    }
                }
            }

            tracing::debug!(wait_ms, "advisory delay wait");
            self.sleeper.sleep(wait).await;
            // Loop back to the gate rather than shortcutting: an interrupted
            // suspension, or a back-off that armed while we slept, must be
            // re-observed before sending.
        }
    }

    /// §4.3.3 / §4.3.4: POST, decode, translate errors, update bookkeeping.
    async fn send_and_decode(&self, envelope: Value) -> Result<(Value, String), RandomOrgError> {
        let method = envelope.get("method").and_then(Value::as_str).unwrap_or("").to_string();

        let (status, body) = self.transport.post_json(&self.url, &envelope).await?;
        if !(200..300).contains(&status) {
            return Err(RandomOrgError::BadHttpResponse { status, reason: body });
        }

        let parsed: Value = serde_json::from_str(&body)
            .map_err(|e| RandomOrgError::ProtocolError { message: e.to_string() })?;

        if let Some(error_obj) = parsed.get("error") {
            let err = self.translate_service_error(error_obj);
            tracing::warn!(method = %method, error = %err, "dispatch outcome: error");
            return Err(err);
        }

        let result = parsed.get("result").cloned().unwrap_or(Value::Null);
        self.post_send_bookkeeping(&method, &result);
        tracing::info!(method = %method, "dispatch outcome: success");
        Ok((result, body))
    }

    fn translate_service_error(&self, error_obj: &Value) -> RandomOrgError {
        let code = error_obj.get("code").and_then(Value::as_i64).unwrap_or(0);
        let message = error_obj.get("message").and_then(Value::as_str).unwrap_or("").to_string();

        match code {
            401 => RandomOrgError::KeyNotRunning { message },
            402 => {
                let now_utc = self.wall_clock.now_utc();
                let boundary = next_midnight_utc(now_utc);
                let formatted = format!("Error {code}: {message}");
                let mut state = self.state.lock().unwrap();
                state.backoff_until_utc = Some(boundary);
                state.backoff_message = Some(formatted.clone());
                tracing::warn!(until = %boundary, "quota back-off armed");
                RandomOrgError::InsufficientRequests { message: formatted }
            }
            403 => {
                let bits_left = self.state.lock().unwrap().usage.bits_remaining;
                RandomOrgError::InsufficientBits { message, bits_left }
            }
            other if is_recognized_service_code(other) => {
                RandomOrgError::ServiceError { code: other, message }
            }
            _ => RandomOrgError::ProtocolError { message: format!("code {code}: {message}") },
        }
    }

    /// §4.3.4: update last-response time, advisory delay, and usage
    /// bookkeeping — all under one lock so observers see a consistent triple.
    fn post_send_bookkeeping(&self, method: &str, result: &Value) {
        let now = self.now_millis();
        let mut state = self.state.lock().unwrap();
        state.last_response_millis = Some(now);

        if TICKET_METHODS.contains(&method) {
            state.advisory_delay_ms = DEFAULT_ADVISORY_DELAY.as_millis() as u64;
            return;
        }

        let requests_left = result.get("requestsLeft").and_then(Value::as_i64);
        let bits_left = result.get("bitsLeft").and_then(Value::as_i64);
        if let (Some(requests), Some(bits)) = (requests_left, bits_left) {
            state.usage = UsageSnapshot::observe(requests, bits, now);
        }

        state.advisory_delay_ms = result
            .get("advisoryDelay")
            .and_then(Value::as_u64)
            .unwrap_or(DEFAULT_ADVISORY_DELAY.as_millis() as u64);
    }
}
