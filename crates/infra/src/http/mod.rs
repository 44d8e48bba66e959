//! Outbound HTTP: transport, request identity, coalescing and retry

mod client;
pub mod dedup;
pub mod request;
mod response;
pub mod retry;

pub use client::{HttpClient, HttpClientBuilder};
pub use dedup::RequestDeduplicator;
pub use request::{canonical_json, RequestKey, RequestOptions};
pub use response::UpstreamResponse;
pub use retry::{fetch_with_retry, retry_config};
