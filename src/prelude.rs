//! Convenient re-exports for common `randomorg` types.
pub use crate::{
    client::{params::ParamError, ClientError, ClientOptions, ClientOptionsBuilder, SignedOptions},
    error::RandomOrgError,
    precache::{bit_estimate, PrecachePool, PrecacheSpec, RequestExecutor, TakeResult},
    response::RandomData,
    signing::SignedBundle,
    usage::UsageSnapshot,
    RandomOrgClient,
};
