//! Single-page fetching and response-shape extraction
//!
//! One bounded-timeout GET per page, zero transport-level retries. The
//! record array is located by a fixed priority order of extraction
//! strategies so each tolerated response shape stays independently
//! testable.

use chrono::Utc;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;

use crate::config::ApiConfig;
use crate::error::FetchError;
use crate::request::build_page_url;
use crate::types::{Cursor, Page, Record};

/// Outcome of a successful page request.
#[derive(Clone, Debug)]
pub enum PageData {
    /// The response carried at least one record
    Records(Page),
    /// A syntactically valid response with no records.
    ///
    /// Deliberately out-of-band: the driver must be able to tell "zero
    /// records returned" apart from a transport failure.
    Empty,
}

/// Sink for raw response bodies.
///
/// A development aid for offline inspection of upstream payloads. The
/// fetcher writes through the sink when one is installed and never depends
/// on it; [`NoOpDiagnosticSink`] is the default.
pub trait DiagnosticSink: Send + Sync {
    /// Called with the raw body of every successfully received response.
    fn raw_response(&self, page: u32, body: &str);
}

/// Default sink that discards everything.
pub struct NoOpDiagnosticSink;

impl DiagnosticSink for NoOpDiagnosticSink {
    fn raw_response(&self, _page: u32, _body: &str) {}
}

/// Issues one bounded-timeout GET per page and extracts the record array.
///
/// Holds no mutable state; the only side effect of [`PageFetcher::fetch`]
/// is the network call itself.
#[derive(Clone)]
pub struct PageFetcher {
    client: reqwest::Client,
    base_url: String,
    endpoint: String,
    order_by: String,
    token: String,
    timeout: Duration,
    permissive: bool,
    diagnostics: Option<Arc<dyn DiagnosticSink>>,
}

impl PageFetcher {
    /// Create a fetcher from the API configuration.
    #[must_use]
    pub fn new(config: &ApiConfig) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: config.base_url.clone(),
            endpoint: config.endpoint.clone(),
            order_by: config.order_by.clone(),
            token: config.token.clone(),
            timeout: config.request_timeout,
            permissive: config.permissive_shapes,
            diagnostics: None,
        }
    }

    /// Install a diagnostic sink that receives every raw response body.
    #[must_use]
    pub fn with_diagnostics(mut self, sink: Arc<dyn DiagnosticSink>) -> Self {
        self.diagnostics = Some(sink);
        self
    }

    /// Fetch the page addressed by `cursor`.
    ///
    /// Exactly one request attempt is made; failures are classified and
    /// surfaced, never silently re-attempted.
    ///
    /// # Errors
    ///
    /// - [`FetchError::Timeout`] when the request exceeds the configured
    ///   timeout (ambiguous, non-fatal)
    /// - [`FetchError::Transport`] / [`FetchError::Status`] on
    ///   connection-level failures and non-2xx responses
    /// - [`FetchError::MalformedResponse`] when the body is not JSON or no
    ///   record array can be located
    pub async fn fetch(&self, cursor: Cursor) -> Result<PageData, FetchError> {
        let page = cursor.page_index();
        let url = build_page_url(&self.base_url, &self.endpoint, &self.order_by, cursor);

        tracing::debug!(page, %url, "requesting page");

        let response = self
            .client
            .get(&url)
            .header("token", self.token.as_str())
            .timeout(self.timeout)
            .send()
            .await
            .map_err(|e| classify_request_error(page, &e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status { page, status: status.as_u16() });
        }

        let body = response
            .text()
            .await
            .map_err(|e| classify_request_error(page, &e))?;

        if let Some(sink) = &self.diagnostics {
            sink.raw_response(page, &body);
        }

        let value: Value =
            serde_json::from_str(&body).map_err(|e| FetchError::MalformedResponse {
                page,
                reason: format!("body is not valid JSON: {e}"),
            })?;

        let records = extract_records(&value, self.permissive).ok_or_else(|| {
            FetchError::MalformedResponse {
                page,
                reason: "no record array under any recognized shape".to_string(),
            }
        })?;

        if records.is_empty() {
            tracing::debug!(page, "page returned no records");
            return Ok(PageData::Empty);
        }

        Ok(PageData::Records(Page {
            index: page,
            fetched_at: Utc::now(),
            records,
        }))
    }
}

fn classify_request_error(page: u32, err: &reqwest::Error) -> FetchError {
    if err.is_timeout() {
        FetchError::Timeout { page }
    } else {
        FetchError::Transport {
            page,
            reason: err.to_string(),
        }
    }
}

/// Object keys that may hold the record array, in priority order.
///
/// `message` is the preferred upstream contract; the rest are
/// compatibility keys.
const ARRAY_KEYS: &[&str] = &["message", "data", "results", "items"];

/// Locate the record array in a parsed response body.
///
/// Strategies, tried in fixed priority order:
/// 1. the preferred `message` key holding an array;
/// 2. the alternate well-known keys `data`, `results`, `items`;
/// 3. a bare top-level array;
/// 4. *(permissive only)* the first array-valued field of the object;
/// 5. *(permissive only)* the whole object as a single record.
///
/// A recognized key holding `null` counts as an empty record set. Returns
/// `None` when no strategy matches.
pub(crate) fn extract_records(body: &Value, permissive: bool) -> Option<Vec<Record>> {
    match body {
        Value::Object(map) => {
            for key in ARRAY_KEYS {
                match map.get(*key) {
                    Some(Value::Array(items)) => return Some(to_records(items)),
                    Some(Value::Null) => return Some(Vec::new()),
                    _ => {}
                }
            }
            if permissive {
                if let Some(items) = map.values().find_map(Value::as_array) {
                    return Some(to_records(items));
                }
                // No array anywhere: the object itself is the single record
                return Some(vec![map.clone()]);
            }
            None
        }
        Value::Array(items) => Some(to_records(items)),
        _ => None,
    }
}

fn to_records(items: &[Value]) -> Vec<Record> {
    items
        .iter()
        .map(|item| match item {
            Value::Object(map) => map.clone(),
            other => {
                // Scalar array elements become single-field records rather
                // than failing the page
                let mut record = Record::new();
                record.insert("value".to_string(), other.clone());
                record
            }
        })
        .collect()
}
