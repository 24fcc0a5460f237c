//! Network helpers shared by the metadata client and the rewrite oracle.

mod client;
mod retry;

pub use client::{extract_domain, HttpClient};
pub use retry::{retry_async, RetryConfig, RetryStats};
