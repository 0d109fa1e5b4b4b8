//! Client for the App Store web endpoints: bearer-token extraction from the landing page
//! and cursor-paginated review listing with rate-limit backoff.

pub mod backoff;
pub mod config;
pub mod cursor;
pub mod headers;
pub mod metrics_defs;
pub mod reviews;
#[cfg(any(test, feature = "testutils"))]
pub mod testutils;
pub mod token;
pub mod types;

pub use backoff::{Backoff, BackoffState, RetryPolicy};
pub use reviews::{FetchError, FetchOptions, PartialFetch, ReviewFetcher};
pub use token::{TokenError, TokenExtractor};
pub use types::{DeveloperResponse, Review};
