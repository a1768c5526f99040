//! Source clients and shared HTTP utilities for upstream biomedical APIs.

use std::sync::Arc;
use std::time::Duration;

use reqwest_middleware::{ClientBuilder, ClientWithMiddleware};
use serde_json::Value;

use crate::error::{BioClientsError, FetchError};
use crate::table::Record;

pub(crate) mod chembl;
pub(crate) mod clinicaltrials;
pub(crate) mod ensembl;
pub(crate) mod fetch;
pub(crate) mod pubchem;
pub(crate) mod pubmed;
pub(crate) mod rate_limit;

const ERROR_BODY_MAX_BYTES: usize = 2048;
pub(crate) const DEFAULT_MAX_BODY_BYTES: usize = 64 * 1024 * 1024;

/// Builds the HTTP client every fetcher sends through.
///
/// Timeouts are set per request by the fetcher's retry policy, so only the
/// connect timeout lives here.
pub(crate) fn http_client(
    limiter: Arc<rate_limit::RateLimiter>,
) -> Result<ClientWithMiddleware, BioClientsError> {
    let base_client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("bioclients/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(BioClientsError::HttpClientInit)?;

    Ok(ClientBuilder::new(base_client)
        .with(rate_limit::RateLimitMiddleware::new(limiter))
        .build())
}

pub(crate) fn body_excerpt(bytes: &[u8]) -> String {
    let full = String::from_utf8_lossy(bytes);

    let truncated: &str = if full.len() > ERROR_BODY_MAX_BYTES {
        let mut end = ERROR_BODY_MAX_BYTES;
        while end > 0 && !full.is_char_boundary(end) {
            end -= 1;
        }
        &full[..end]
    } else {
        full.as_ref()
    };

    let mut s = truncated.trim().replace(['\n', '\r', '\t'], " ");
    if full.len() > ERROR_BODY_MAX_BYTES {
        s.push_str(" …");
    }
    s
}

/// Reads the body up to `limit` bytes; `Ok(None)` means the limit was exceeded.
pub(crate) async fn read_limited_body(
    mut resp: reqwest::Response,
    limit: usize,
) -> Result<Option<Vec<u8>>, reqwest::Error> {
    let mut body: Vec<u8> = Vec::new();

    while let Some(chunk) = resp.chunk().await? {
        let next_len = body.len().saturating_add(chunk.len());
        if next_len > limit {
            return Ok(None);
        }
        body.extend_from_slice(&chunk);
    }

    Ok(Some(body))
}

/// Objects found at a JSON pointer, whether it names one object or an array of them.
pub(crate) fn records_at(value: &Value, pointer: &str) -> Vec<Record> {
    match value.pointer(pointer) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(Value::as_object)
            .cloned()
            .collect(),
        Some(Value::Object(map)) => vec![map.clone()],
        _ => Vec::new(),
    }
}

/// A top-level JSON object as a single record.
pub(crate) fn single_record(value: Value, url: &str) -> Result<Record, FetchError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(FetchError::UnexpectedPayload {
            url: url.to_string(),
            message: format!("expected an object, got {}", kind_name(&other)),
        }),
    }
}

fn kind_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Percent-encodes one URL path segment.
pub(crate) fn path_segment(raw: &str) -> String {
    let mut url = match reqwest::Url::parse("http://localhost/") {
        Ok(url) => url,
        Err(_) => return raw.to_string(),
    };
    if let Ok(mut segments) = url.path_segments_mut() {
        segments.push(raw.trim());
    }
    url.path().trim_start_matches('/').to_string()
}

/// Encodes `pairs` as an `application/x-www-form-urlencoded` body.
pub(crate) fn form_body(pairs: &[(&str, &str)]) -> String {
    let mut url = match reqwest::Url::parse("http://localhost/") {
        Ok(url) => url,
        Err(_) => return String::new(),
    };
    url.query_pairs_mut().extend_pairs(pairs);
    url.query().unwrap_or_default().to_string()
}

/// Reads a count that some APIs send as a number and others as a string.
pub(crate) fn count_at(value: &Value, pointer: &str) -> Option<usize> {
    match value.pointer(pointer)? {
        Value::Number(n) => n.as_u64().and_then(|n| usize::try_from(n).ok()),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
pub(crate) fn test_fetcher_with(policy: fetch::RetryPolicy) -> Arc<dyn fetch::Fetch> {
    let client = http_client(Arc::new(rate_limit::RateLimiter::unlimited()))
        .expect("test http client");
    Arc::new(fetch::RetryingFetcher::new(client, policy))
}

#[cfg(test)]
pub(crate) fn test_fetcher() -> Arc<dyn fetch::Fetch> {
    test_fetcher_with(fetch::RetryPolicy {
        max_retries: 1,
        delay: Duration::from_millis(10),
        timeout: Duration::from_secs(5),
    })
}
