//! JSON-over-HTTP transport shared by the providers
//!
//! Owns the retry policy: network failures and retryable statuses back off
//! exponentially, rate limits wait for as long as the provider asks (within
//! a ceiling).

use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue, RETRY_AFTER};
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use super::LlmError;
use crate::config::LlmConfig;

/// How hard to try before a call counts as failed
#[derive(Debug, Clone, Copy)]
pub(crate) struct RetryPolicy {
    pub attempts: u32,
    pub base_backoff: Duration,
    pub max_rate_limit_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 4,
            base_backoff: Duration::from_secs(1),
            max_rate_limit_wait: Duration::from_secs(120),
        }
    }
}

impl RetryPolicy {
    /// Pause before attempt number `attempt` (1-based retry count)
    fn backoff(&self, attempt: u32, previous: Option<&LlmError>) -> Duration {
        previous
            .and_then(LlmError::retry_after)
            .unwrap_or_else(|| self.base_backoff * 2u32.saturating_pow(attempt.saturating_sub(1)))
    }

    /// Whether `err` on attempt `attempt` (0-based) is worth another try
    fn should_retry(&self, attempt: u32, err: &LlmError) -> bool {
        if attempt + 1 >= self.attempts || !err.is_retryable() {
            return false;
        }
        match err.retry_after() {
            Some(wait) => wait <= self.max_rate_limit_wait,
            None => true,
        }
    }
}

/// POSTs JSON to one provider endpoint
pub(crate) struct Transport {
    http: reqwest::Client,
    url: String,
    headers: HeaderMap,
    policy: RetryPolicy,
}

impl Transport {
    /// Build a transport for `path` under the configured base URL
    pub fn new(config: &LlmConfig, path: &str, auth: &[(&'static str, String)]) -> Result<Self, LlmError> {
        debug!(base_url = %config.base_url, %path, "Transport::new: called");
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()?;

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        for (name, value) in auth {
            let value = HeaderValue::from_str(value)
                .map_err(|_| LlmError::Config(format!("value for header {} is not valid", name)))?;
            headers.insert(HeaderName::from_static(name), value);
        }

        Ok(Self {
            http,
            url: format!("{}{}", config.base_url.trim_end_matches('/'), path),
            headers,
            policy: RetryPolicy::default(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Send `body` and decode the reply, retrying transient failures
    pub async fn post<T: DeserializeOwned>(&self, body: &serde_json::Value) -> Result<T, LlmError> {
        debug!(url = %self.url(), "Transport::post: called");
        let mut attempt = 0;
        loop {
            let err = match self.send_once(body).await {
                Ok(text) => return Ok(serde_json::from_str(&text)?),
                Err(e) => e,
            };
            if !self.policy.should_retry(attempt, &err) {
                debug!(attempt, error = %err, "Transport::post: giving up");
                return Err(err);
            }
            attempt += 1;
            let pause = self.policy.backoff(attempt, Some(&err));
            warn!(attempt, pause_ms = pause.as_millis() as u64, error = %err, "Transport::post: retrying");
            tokio::time::sleep(pause).await;
        }
    }

    async fn send_once(&self, body: &serde_json::Value) -> Result<String, LlmError> {
        let response = self
            .http
            .post(&self.url)
            .headers(self.headers.clone())
            .json(body)
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(response.text().await?);
        }

        let retry_after = response
            .headers()
            .get(RETRY_AFTER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.trim().parse::<u64>().ok())
            .map(Duration::from_secs);
        let text = response.text().await.unwrap_or_default();
        debug!(status = status.as_u16(), "Transport::send_once: non-success status");
        Err(LlmError::from_status(status.as_u16(), text, retry_after))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rate_limited(secs: u64) -> LlmError {
        LlmError::RateLimited {
            retry_after: Duration::from_secs(secs),
        }
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1, None), Duration::from_secs(1));
        assert_eq!(policy.backoff(2, None), Duration::from_secs(2));
        assert_eq!(policy.backoff(3, None), Duration::from_secs(4));
    }

    #[test]
    fn test_backoff_honours_retry_after() {
        let policy = RetryPolicy::default();
        assert_eq!(policy.backoff(1, Some(&rate_limited(9))), Duration::from_secs(9));
    }

    #[test]
    fn test_should_retry() {
        let policy = RetryPolicy::default();
        let overloaded = LlmError::from_status(503, String::new(), None);
        let bad_request = LlmError::from_status(400, String::new(), None);

        assert!(policy.should_retry(0, &overloaded));
        assert!(policy.should_retry(2, &overloaded));
        assert!(!policy.should_retry(3, &overloaded));
        assert!(!policy.should_retry(0, &bad_request));
        assert!(policy.should_retry(0, &rate_limited(30)));
        assert!(!policy.should_retry(0, &rate_limited(600)));
    }

    #[test]
    fn test_new_joins_url_and_rejects_bad_header() {
        let config = LlmConfig {
            base_url: "https://example.test/".to_string(),
            ..LlmConfig::default()
        };
        let transport = Transport::new(&config, "/v1/messages", &[("x-api-key", "k".to_string())]).unwrap();
        assert_eq!(transport.url(), "https://example.test/v1/messages");

        let err = Transport::new(&config, "/v1/messages", &[("x-api-key", "bad\nkey".to_string())]);
        assert!(matches!(err, Err(LlmError::Config(_))));
    }
}
