//! Edge protection applied before requests reach handlers.

pub mod rate_limit;

pub use rate_limit::{client_key, rate_limit, Decision, Quota, RateLimitState, RateLimiter};
