//! Rate-limit response metadata

use reqwest::header::HeaderMap;
use serde::Deserialize;

pub const BUCKET: &str = "x-ratelimit-bucket";
pub const LIMIT: &str = "x-ratelimit-limit";
pub const REMAINING: &str = "x-ratelimit-remaining";
pub const RESET: &str = "x-ratelimit-reset";
pub const RESET_AFTER: &str = "x-ratelimit-reset-after";

/// Rate-limit state reported by one response
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitHeaders {
    /// Server-side bucket id, opaque
    pub bucket: String,
    pub limit: u32,
    pub remaining: u32,
    /// Reset time in epoch milliseconds
    pub reset_at: i64,
}

impl RateLimitHeaders {
    /// Parse rate-limit headers.
    ///
    /// Returns `None` when the bucket header is absent (the response is not
    /// rate limited) or when the remaining fields are malformed. `now` is used
    /// only when the absolute reset header is missing and `Reset-After` is present.
    pub fn from_headers(headers: &HeaderMap, now: i64) -> Option<Self> {
        let bucket = header_str(headers, BUCKET)?.to_string();

        let limit = header_str(headers, LIMIT)?.parse().ok()?;
        let remaining = header_str(headers, REMAINING)?.parse().ok()?;

        let reset_at = match header_f64(headers, RESET) {
            Some(seconds) => (seconds * 1000.0).round() as i64,
            None => now + (header_f64(headers, RESET_AFTER)? * 1000.0).round() as i64,
        };

        Some(Self {
            bucket,
            limit,
            remaining,
            reset_at,
        })
    }
}

/// Body of a 429 response
#[derive(Debug, Clone, Deserialize)]
pub struct RateLimitBody {
    #[serde(default)]
    pub message: String,
    /// Seconds to wait
    pub retry_after: f64,
    #[serde(default)]
    pub global: bool,
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok()).map(str::trim)
}

fn header_f64(headers: &HeaderMap, name: &str) -> Option<f64> {
    header_str(headers, name)?.parse().ok()
}
