//! `powder` - picks where to ski in the US Northeast
//!
//! A natural-language query is parsed by a language model, matched against a
//! local mountain table, enriched with forecast snow, drive times and a crowd
//! outlook, and turned into a single recommendation with alternatives.

use std::sync::LazyLock;

use reqwest_middleware::ClientWithMiddleware;
use reqwest_retry::{RetryTransientMiddleware, policies::ExponentialBackoff};

pub mod agent;
pub mod cache;
pub mod config;
pub mod crowds;
pub mod error;
pub mod evals;
pub mod geo;
pub mod llm;
pub mod location;
pub mod logging;
pub mod mountains;
pub mod pipeline;
pub mod providers;
pub mod routing;
pub mod signatures;
pub mod trace;
pub mod weather;

pub use config::PowderConfig;
pub use error::PowderError;
pub use location::UserLocation;
pub use mountains::{Mountain, MountainStore};
pub use pipeline::{PipelineOutcome, SkiPipeline};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// Core result type used throughout the library
pub type Result<T> = std::result::Result<T, PowderError>;

/// Shared HTTP client for the weather, geocoding and routing APIs.
/// Transient failures are retried with exponential backoff.
pub static API_CLIENT: LazyLock<ClientWithMiddleware> = LazyLock::new(|| {
    let retry_policy = ExponentialBackoff::builder().build_with_max_retries(3);
    reqwest_middleware::ClientBuilder::new(reqwest::Client::new())
        .with(RetryTransientMiddleware::new_with_policy(retry_policy))
        .build()
});
