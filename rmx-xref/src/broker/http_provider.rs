//! Read-only HTTP provider
//!
//! GETs a `{term}` URL template and turns a JSON object body into raw
//! fields. Requests to one provider are spaced by a minimum interval.

use crate::types::{FetchError, Provider, RawFields};
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

const USER_AGENT: &str = concat!("rmx-xref/", env!("CARGO_PKG_VERSION"));

/// Minimum spacing between requests to the same provider
struct RateLimiter {
    last_request: Mutex<Option<Instant>>,
    min_interval: Duration,
}

impl RateLimiter {
    fn new(min_interval_ms: u64) -> Self {
        Self {
            last_request: Mutex::new(None),
            min_interval: Duration::from_millis(min_interval_ms),
        }
    }

    async fn wait(&self) {
        if self.min_interval.is_zero() {
            return;
        }
        let mut last = self.last_request.lock().await;
        if let Some(last_time) = *last {
            let elapsed = last_time.elapsed();
            if elapsed < self.min_interval {
                let wait_time = self.min_interval - elapsed;
                tracing::debug!("Rate limiting: waiting {:?}", wait_time);
                tokio::time::sleep(wait_time).await;
            }
        }
        *last = Some(Instant::now());
    }
}

pub struct HttpProvider {
    id: String,
    url_template: String,
    http_client: reqwest::Client,
    rate_limiter: RateLimiter,
}

impl HttpProvider {
    pub fn new(
        id: &str,
        url_template: &str,
        timeout_secs: u64,
        min_interval_ms: u64,
    ) -> Result<Self, FetchError> {
        if !url_template.contains("{term}") {
            return Err(FetchError::NotAvailable(format!(
                "url template for '{}' has no {{term}} placeholder",
                id
            )));
        }

        let http_client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .timeout(Duration::from_secs(timeout_secs.max(1)))
            .build()
            .map_err(|e| FetchError::Network(e.to_string()))?;

        Ok(Self {
            id: id.to_string(),
            url_template: url_template.to_string(),
            http_client,
            rate_limiter: RateLimiter::new(min_interval_ms),
        })
    }

    /// Request URL for a term (term URL-encoded)
    pub fn url_for(&self, term: &str) -> String {
        let encoded: String = url::form_urlencoded::byte_serialize(term.trim().as_bytes()).collect();
        self.url_template.replace("{term}", &encoded)
    }
}

/// Convert a JSON response body into raw fields
///
/// An object is taken as is; an array contributes its first object.
pub(crate) fn fields_from_body(body: serde_json::Value) -> Result<Option<RawFields>, FetchError> {
    match body {
        serde_json::Value::Object(map) => Ok(Some(map.into_iter().collect())),
        serde_json::Value::Array(items) => Ok(items.into_iter().find_map(|item| match item {
            serde_json::Value::Object(map) => Some(map.into_iter().collect()),
            _ => None,
        })),
        serde_json::Value::Null => Ok(None),
        other => Err(FetchError::Parse(format!(
            "expected a JSON object, got {}",
            other
        ))),
    }
}

#[async_trait::async_trait]
impl Provider for HttpProvider {
    fn source_id(&self) -> &str {
        &self.id
    }

    async fn fetch(&self, term: &str) -> Result<Option<RawFields>, FetchError> {
        self.rate_limiter.wait().await;

        let url = self.url_for(term);
        tracing::debug!(source = %self.id, url = %url, "Querying provider");

        let response = self.http_client.get(&url).send().await.map_err(|e| {
            if e.is_timeout() {
                FetchError::Timeout(e.to_string())
            } else {
                FetchError::Network(e.to_string())
            }
        })?;

        let status = response.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(FetchError::Api(format!("{}: {}", status.as_u16(), error_text)));
        }

        let body: serde_json::Value = response
            .json()
            .await
            .map_err(|e| FetchError::Parse(e.to_string()))?;

        fields_from_body(body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_url_template_encodes_term() {
        let provider =
            HttpProvider::new("pubchem", "https://example.invalid/name/{term}/json", 5, 0).unwrap();
        assert_eq!(
            provider.url_for("Shea Butter & Co"),
            "https://example.invalid/name/Shea+Butter+%26+Co/json"
        );
    }

    #[test]
    fn test_template_without_placeholder_rejected() {
        assert!(matches!(
            HttpProvider::new("x", "https://example.invalid/", 5, 0),
            Err(FetchError::NotAvailable(_))
        ));
    }

    #[test]
    fn test_fields_from_body_shapes() {
        let object = fields_from_body(json!({"cas_number": "7732-18-5"})).unwrap().unwrap();
        assert_eq!(object["cas_number"], json!("7732-18-5"));

        let array = fields_from_body(json!([1, {"name": "first"}, {"name": "second"}]))
            .unwrap()
            .unwrap();
        assert_eq!(array["name"], json!("first"));

        assert_eq!(fields_from_body(json!(null)).unwrap(), None);
        assert!(fields_from_body(json!("text")).is_err());
    }

    #[tokio::test]
    async fn test_rate_limiter_spaces_requests() {
        let limiter = RateLimiter::new(50);
        let start = Instant::now();
        limiter.wait().await;
        limiter.wait().await;
        assert!(start.elapsed() >= Duration::from_millis(50));
    }
}
