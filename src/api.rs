//! HTTP client for the snapshot and detail endpoints.

use std::time::Duration;

use reqwest::{StatusCode, Url};
use serde_json::Value;

use crate::models::Ticket;
use crate::sync::normalize::normalize;
use crate::{Error, Result};

/// Default per-request timeout.
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for `GET {base}/tickets` and `GET {base}/tickets/{id}`.
#[derive(Debug, Clone)]
pub struct ApiClient {
    base_url: String,
    http: reqwest::Client,
}

impl ApiClient {
    /// Create a client with the default request timeout.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        Self::with_timeout(base_url, DEFAULT_REQUEST_TIMEOUT)
    }

    pub fn with_timeout(base_url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("ticketwatch/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Fetch the full ticket collection as raw records.
    pub async fn fetch_tickets(&self) -> Result<Vec<Value>> {
        let url = format!("{}/tickets", self.base_url);
        tracing::debug!(%url, "fetching ticket snapshot");

        let response = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| Error::SnapshotFetch(e.to_string()))?;
        let status = response.status();
        if !status.is_success() {
            return Err(Error::SnapshotFetch(format!("GET {} returned {}", url, status)));
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| Error::SnapshotFetch(format!("invalid snapshot body: {}", e)))?;
        match body {
            Value::Array(rows) => Ok(rows),
            other => Err(Error::SnapshotFetch(format!(
                "expected a JSON array, got {}",
                json_kind(&other)
            ))),
        }
    }

    /// Fetch one ticket with its full message history.
    pub async fn fetch_ticket(&self, id: &str) -> Result<Ticket> {
        let url = self.ticket_url(id)?;
        tracing::debug!(%url, "fetching ticket detail");

        let response = self.http.get(url.clone()).send().await?;
        match response.status() {
            StatusCode::NOT_FOUND => Err(Error::NotFound(id.to_string())),
            status if !status.is_success() => Err(Error::Other(format!(
                "GET {} returned {}",
                url, status
            ))),
            _ => {
                let raw: Value = response.json().await?;
                normalize(&raw)
            }
        }
    }
}

impl ApiClient {
    /// `{base}/tickets/{id}` with the id encoded as a single path segment.
    fn ticket_url(&self, id: &str) -> Result<Url> {
        let mut url = Url::parse(&self.base_url)
            .map_err(|e| Error::Config(format!("invalid api base {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| Error::Config(format!("api base cannot hold a path: {}", self.base_url)))?
            .pop_if_empty()
            .push("tickets")
            .push(id);
        Ok(url)
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}
