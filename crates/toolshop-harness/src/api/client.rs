//! JSON client for the storefront REST API.

use crate::config::HarnessConfig;
use crate::result::{HarnessError, HarnessResult};
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};
use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;
use std::fmt;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// Longest response body kept in a `DataFetchFailure`
pub const BODY_EXCERPT_CHARS: usize = 300;

/// Per-request budget
pub const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// HTTP client bound to one API base URL, with default headers
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

impl ApiClient {
    /// Client sending `Accept: application/json` with every request
    pub fn new(base_url: impl Into<String>) -> HarnessResult<Self> {
        Self::with_headers(base_url, &[("Accept", "application/json")])
    }

    /// Client with explicit default headers
    pub fn with_headers(base_url: impl Into<String>, headers: &[(&str, &str)]) -> HarnessResult<Self> {
        let mut defaults = HeaderMap::new();
        for (name, value) in headers {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| HarnessError::config(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(value)
                .map_err(|e| HarnessError::config(format!("invalid value for header {name}: {e}")))?;
            defaults.insert(name, value);
        }
        let client = reqwest::Client::builder()
            .default_headers(defaults)
            .timeout(REQUEST_TIMEOUT)
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            client,
        })
    }

    /// Client for the configured API base URL
    pub fn from_config(config: &HarnessConfig) -> HarnessResult<Self> {
        Self::new(config.api_base_url.clone())
    }

    /// Base URL without trailing slash
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, endpoint: &str) -> String {
        if endpoint.contains("://") {
            endpoint.to_string()
        } else {
            format!("{}/{}", self.base_url, endpoint.trim_start_matches('/'))
        }
    }

    /// `GET endpoint?query` and parse the JSON body
    #[instrument(skip(self))]
    pub async fn fetch_json(&self, endpoint: &str, query: &[(&str, &str)]) -> HarnessResult<Document> {
        let request = self.client.get(self.url(endpoint)).query(query);
        Self::send(request).await
    }

    /// `GET endpoint` with a bearer token
    #[instrument(skip(self, token))]
    pub async fn fetch_json_authorized(&self, endpoint: &str, token: &str) -> HarnessResult<Document> {
        let request = self.client.get(self.url(endpoint)).bearer_auth(token);
        Self::send(request).await
    }

    /// `POST endpoint` with a JSON body
    #[instrument(skip(self, body))]
    pub async fn post_json<B>(&self, endpoint: &str, body: &B) -> HarnessResult<Document>
    where
        B: Serialize + ?Sized + Sync,
    {
        let request = self.client.post(self.url(endpoint)).json(body);
        Self::send(request).await
    }

    async fn send(request: reqwest::RequestBuilder) -> HarnessResult<Document> {
        let response = request.send().await?;
        let url = response.url().to_string();
        let status = response.status().as_u16();
        let text = response.text().await?;
        if !(200..300).contains(&status) {
            warn!(%url, status, "API request failed");
            return Err(HarnessError::DataFetchFailure {
                url,
                status,
                body: excerpt(&text),
            });
        }
        let body = if text.trim().is_empty() {
            Value::Null
        } else {
            serde_json::from_str(&text).map_err(|e| HarnessError::parse(url.clone(), e.to_string()))?
        };
        debug!(%url, status, "API response");
        Ok(Document { url, status, body })
    }
}

fn excerpt(text: &str) -> String {
    let mut chars = text.chars();
    let head: String = chars.by_ref().take(BODY_EXCERPT_CHARS).collect();
    if chars.next().is_some() {
        format!("{head}...")
    } else {
        head
    }
}

/// A successfully fetched JSON response
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// Final request URL
    pub url: String,
    /// HTTP status
    pub status: u16,
    /// Parsed body (`Null` for an empty body)
    pub body: Value,
}

impl Document {
    /// Top-level field of an object body
    #[must_use]
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.body.get(name)
    }

    /// Deserialize the whole body
    pub fn deserialize<T: DeserializeOwned>(&self) -> HarnessResult<T> {
        serde_json::from_value(self.body.clone())
            .map_err(|e| HarnessError::parse(self.url.clone(), e.to_string()))
    }

    /// Map every element of the array under `key` lazily.
    ///
    /// A missing or non-array `key` fails up front; bad elements fail one by
    /// one as the iterator reaches them.
    pub fn records<T, F>(&self, key: &str, mapper: F) -> HarnessResult<Records<T>>
    where
        F: FnMut(&Value) -> HarnessResult<T> + Send + 'static,
    {
        let items = self
            .body
            .get(key)
            .and_then(Value::as_array)
            .ok_or_else(|| {
                HarnessError::parse(
                    format!("{}#{key}", self.url),
                    format!("expected an array under '{key}'"),
                )
            })?
            .clone();
        Ok(Records {
            key: key.to_string(),
            items: items.into_iter().enumerate(),
            mapper: Box::new(mapper),
        })
    }
}

type Mapper<T> = Box<dyn FnMut(&Value) -> HarnessResult<T> + Send>;

/// Finite, lazily mapped sequence of records
pub struct Records<T> {
    key: String,
    items: std::iter::Enumerate<std::vec::IntoIter<Value>>,
    mapper: Mapper<T>,
}

impl<T> fmt::Debug for Records<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Records")
            .field("key", &self.key)
            .field("remaining", &self.items.len())
            .finish_non_exhaustive()
    }
}

impl<T> Records<T> {
    /// Materialise the good records; failures are returned alongside
    #[must_use]
    pub fn collect_valid(self) -> (Vec<T>, Vec<HarnessError>) {
        let mut valid = Vec::new();
        let mut failures = Vec::new();
        for record in self {
            match record {
                Ok(value) => valid.push(value),
                Err(e) => failures.push(e),
            }
        }
        (valid, failures)
    }
}

impl<T> Iterator for Records<T> {
    type Item = HarnessResult<T>;

    fn next(&mut self) -> Option<Self::Item> {
        let (index, item) = self.items.next()?;
        let record = format!("{}[{index}]", self.key);
        Some((self.mapper)(&item).map_err(|e| match e {
            HarnessError::ParseFailure { message, .. } => HarnessError::ParseFailure { record, message },
            other => other,
        }))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        self.items.size_hint()
    }
}

/// Required string field of a JSON object
pub fn str_field<'a>(value: &'a Value, name: &str) -> HarnessResult<&'a str> {
    value
        .get(name)
        .and_then(Value::as_str)
        .ok_or_else(|| HarnessError::parse("", format!("missing string field '{name}'")))
}

/// Required numeric field of a JSON object
pub fn f64_field(value: &Value, name: &str) -> HarnessResult<f64> {
    value
        .get(name)
        .and_then(Value::as_f64)
        .ok_or_else(|| HarnessError::parse("", format!("missing numeric field '{name}'")))
}
