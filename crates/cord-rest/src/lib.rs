//! # cord-rest
//!
//! REST dispatcher that paces outbound calls per server-assigned rate-limit bucket.
//!
//! Requests are mapped to a bucket key, serialized through that bucket's
//! [`RequestQueue`], and only released when the bucket's [`BucketLimiter`]
//! says the server will accept them. Calls in different buckets run concurrently.

pub mod client;
pub mod error;
pub mod headers;
pub mod limiter;
pub mod queue;
pub mod request;
pub mod route;

// Re-export commonly used types at crate root
pub use client::{RestClient, RestConfig};
pub use error::{RestError, RestResult};
pub use headers::{RateLimitBody, RateLimitHeaders};
pub use limiter::{now_millis, Acquire, BucketLimiter};
pub use queue::RequestQueue;
pub use request::{AttachmentFile, RequestOptions};
pub use reqwest::Method;
pub use route::bucket_key;
