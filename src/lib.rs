#![forbid(unsafe_code)]

//! # randomorg
//!
//! Client for the RANDOM.ORG JSON-RPC v4 true-random-number service:
//! dispatch with advisory pacing and daily-quota back-off, precached result
//! pools, and signed results you can verify independently of this crate.
//!
//! ## Quick start
//!
//! ```rust,no_run
//! use randomorg::{ClientOptions, RandomOrgClient};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let client = RandomOrgClient::get("YOUR-API-KEY", ClientOptions::default());
//!     let numbers = client.generate_integers(5, 1, 100, true, 10).await?;
//!     println!("{numbers:?}");
//!     Ok(())
//! }
//! ```

mod adaptive;
mod client;
mod clock;
mod dispatch;
mod envelope;
mod error;
mod precache;
mod response;
mod signing;
mod sleeper;
mod transport;
mod usage;

pub use client::{
    params::ParamError, ClientError, ClientOptions, ClientOptionsBuilder, ConfigError,
    RandomOrgClient, SignedOptions,
};
pub use clock::{Clock, FakeClock, MonotonicClock, SystemWallClock, WallClock};
pub use dispatch::{DispatchConfig, DispatchEngine};
pub use error::RandomOrgError;
pub use precache::{bit_estimate, PrecachePool, PrecacheSpec, RequestExecutor, TakeResult};
pub use response::RandomData;
pub use signing::SignedBundle;
pub use sleeper::{InstantSleeper, Sleeper, TokioSleeper, TrackingSleeper};
pub use transport::{FakeTransport, ScriptedResponse, Transport};
pub use usage::UsageSnapshot;
pub use uuid::Uuid;

pub mod prelude;
