//! REST dispatcher

use std::sync::Arc;
use std::time::Duration;

use cord_common::{ClientConfig, RestSettings};
use dashmap::DashMap;
use reqwest::header::{HeaderValue, AUTHORIZATION, USER_AGENT};
use reqwest::Method;
use serde::de::DeserializeOwned;
use serde_json::Value;

use crate::error::{RemoteErrorBody, RestError, RestResult};
use crate::headers::{RateLimitBody, RateLimitHeaders};
use crate::limiter::now_millis;
use crate::queue::RequestQueue;
use crate::request::{RequestOptions, AUDIT_LOG_REASON};
use crate::route::bucket_key;

/// Settings for [`RestClient`]
#[derive(Debug, Clone)]
pub struct RestConfig {
    /// Versioned API root, e.g. `https://discord.com/api/v10`
    pub base_url: String,
    pub token: String,
    pub user_agent: String,
    pub timeout: Duration,
}

impl RestConfig {
    /// Config with default user agent and timeout
    pub fn new(base_url: impl Into<String>, token: impl Into<String>) -> Self {
        let defaults = RestSettings::default();
        Self {
            base_url: base_url.into(),
            token: token.into(),
            user_agent: defaults.user_agent,
            timeout: Duration::from_secs(defaults.timeout_secs),
        }
    }

    pub fn from_settings(settings: &RestSettings, token: impl Into<String>) -> Self {
        Self {
            base_url: settings.base_url(),
            token: token.into(),
            user_agent: settings.user_agent.clone(),
            timeout: Duration::from_secs(settings.timeout_secs),
        }
    }
}

impl From<&ClientConfig> for RestConfig {
    fn from(config: &ClientConfig) -> Self {
        Self::from_settings(&config.rest, config.token.clone())
    }
}

struct Inner {
    http: reqwest::Client,
    config: RestConfig,
    authorization: HeaderValue,
    queues: DashMap<String, Arc<RequestQueue>>,
}

/// Rate-limited REST client.
///
/// Cloning is cheap and clones share bucket state.
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<Inner>,
}

impl RestClient {
    /// Build a client
    ///
    /// # Errors
    /// Returns an error if the token is not a valid header value or the HTTP
    /// client cannot be built.
    pub fn new(config: RestConfig) -> RestResult<Self> {
        let authorization = authorization_header(&config.token)?;
        let http = reqwest::Client::builder()
            .timeout(config.timeout)
            .build()?;

        Ok(Self {
            inner: Arc::new(Inner {
                http,
                config,
                authorization,
                queues: DashMap::new(),
            }),
        })
    }

    pub fn config(&self) -> &RestConfig {
        &self.inner.config
    }

    /// Number of buckets seen so far. Buckets are never evicted.
    pub fn bucket_count(&self) -> usize {
        self.inner.queues.len()
    }

    /// Issue a call and decode the JSON response as `T`.
    ///
    /// The call waits behind earlier calls in the same bucket and until the
    /// bucket has budget. A `204` decodes from JSON `null`, so `T = ()` or
    /// `Option<_>` fit empty responses.
    ///
    /// # Errors
    /// Returns a [`RestError`] for transport failures and for any status other
    /// than 200, 201 or 204. Nothing is retried.
    pub async fn request<T: DeserializeOwned>(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> RestResult<T> {
        let value = self.send(method, path, options).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// Issue a call and return the raw JSON response
    ///
    /// # Errors
    /// See [`RestClient::request`].
    pub async fn send(
        &self,
        method: Method,
        path: &str,
        options: RequestOptions,
    ) -> RestResult<Value> {
        let key = bucket_key(&method, path);
        let queue = self.queue(&key);
        let builder = self.build(method.clone(), path, &options)?;
        let limiter = Arc::clone(queue.limiter());

        tracing::debug!(method = %method, path = %path, bucket = %key, "Queueing REST call");

        let response = queue
            .enqueue(async move {
                let response = builder.send().await?;
                let status = response.status().as_u16();
                let rate_limit = RateLimitHeaders::from_headers(response.headers(), now_millis());

                // Recorded before the next call in this bucket is admitted
                if let Some(headers) = &rate_limit {
                    limiter
                        .lock()
                        .observe(headers.limit, headers.remaining, headers.reset_at);
                }

                let body = response.bytes().await?;
                Ok::<_, RestError>(Body {
                    status,
                    bucket: rate_limit.map(|h| h.bucket),
                    bytes: body.to_vec(),
                })
            })
            .await??;

        tracing::trace!(method = %method, path = %path, status = response.status, "REST response");

        check_status(&response).inspect_err(|e| {
            tracing::debug!(
                method = %method,
                path = %path,
                status = response.status,
                kind = e.kind(),
                "REST call failed"
            );
        })
    }

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> RestResult<T> {
        self.request(Method::GET, path, RequestOptions::new()).await
    }

    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> RestResult<T> {
        self.request(Method::POST, path, options).await
    }

    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> RestResult<T> {
        self.request(Method::PUT, path, options).await
    }

    pub async fn patch<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> RestResult<T> {
        self.request(Method::PATCH, path, options).await
    }

    pub async fn delete<T: DeserializeOwned>(
        &self,
        path: &str,
        options: RequestOptions,
    ) -> RestResult<T> {
        self.request(Method::DELETE, path, options).await
    }

    fn queue(&self, key: &str) -> Arc<RequestQueue> {
        if let Some(queue) = self.inner.queues.get(key) {
            return Arc::clone(&queue);
        }

        let entry = self
            .inner
            .queues
            .entry(key.to_string())
            .or_insert_with(|| Arc::new(RequestQueue::new(key)));
        Arc::clone(&entry)
    }

    fn build(
        &self,
        method: Method,
        path: &str,
        options: &RequestOptions,
    ) -> RestResult<reqwest::RequestBuilder> {
        let url = format!(
            "{}/{}",
            self.inner.config.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        );

        let mut builder = self
            .inner
            .http
            .request(method, url)
            .header(AUTHORIZATION, self.inner.authorization.clone())
            .header(USER_AGENT, self.inner.config.user_agent.as_str())
            .headers(options.headers.clone());

        if !options.query.is_empty() {
            builder = builder.query(&options.query);
        }

        if let Some(reason) = &options.reason {
            let value = HeaderValue::from_str(reason).map_err(|e| RestError::InvalidHeader {
                name: AUDIT_LOG_REASON.to_string(),
                reason: e.to_string(),
            })?;
            builder = builder.header(AUDIT_LOG_REASON, value);
        }

        if options.is_multipart() {
            builder = builder.multipart(options.multipart_form()?);
        } else if let Some(body) = &options.body {
            builder = builder.json(body);
        }

        Ok(builder)
    }
}

impl std::fmt::Debug for RestClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RestClient")
            .field("base_url", &self.inner.config.base_url)
            .field("buckets", &self.bucket_count())
            .finish_non_exhaustive()
    }
}

/// Status, server bucket and body of a finished call
struct Body {
    status: u16,
    bucket: Option<String>,
    bytes: Vec<u8>,
}

fn authorization_header(token: &str) -> RestResult<HeaderValue> {
    let token = token.trim();
    let value = if token.starts_with("Bot ") || token.starts_with("Bearer ") {
        token.to_string()
    } else {
        format!("Bot {token}")
    };

    let mut header = HeaderValue::from_str(&value).map_err(|e| RestError::InvalidHeader {
        name: AUTHORIZATION.to_string(),
        reason: e.to_string(),
    })?;
    header.set_sensitive(true);
    Ok(header)
}

/// Map a finished call to its JSON value or typed error
fn check_status(response: &Body) -> RestResult<Value> {
    let text = || String::from_utf8_lossy(&response.bytes).into_owned();

    match response.status {
        200 | 201 => {
            if response.bytes.is_empty() {
                Ok(Value::Null)
            } else {
                Ok(serde_json::from_slice(&response.bytes)?)
            }
        }
        204 => Ok(Value::Null),
        status @ (400 | 404) => match serde_json::from_slice::<RemoteErrorBody>(&response.bytes) {
            Ok(body) => Err(RestError::Structured {
                status,
                code: body.code,
                message: body.message,
                errors: body.errors,
            }),
            Err(_) if status == 400 => Err(RestError::BadRequest(text())),
            Err(_) => Err(RestError::NotFound(text())),
        },
        401 => Err(RestError::Unauthorized),
        403 => Err(RestError::Forbidden(text())),
        429 => {
            let body = serde_json::from_slice::<RateLimitBody>(&response.bytes).ok();
            tracing::warn!(
                bucket = ?response.bucket,
                retry_after = ?body.as_ref().map(|b| b.retry_after),
                "Rate limited despite pacing"
            );
            Err(RestError::RateLimited {
                bucket: response.bucket.clone(),
                retry_after: body.as_ref().map(|b| b.retry_after),
                global: body.is_some_and(|b| b.global),
            })
        }
        502 => Err(RestError::BadGateway),
        status @ (500 | 503 | 504 | 507 | 508) => Err(RestError::Server { status }),
        status => Err(RestError::Unexpected {
            status,
            body: text(),
        }),
    }
}
