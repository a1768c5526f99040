//! NCBI E-utilities client for PubMed searches and document summaries.
//!
//! `esearch` is read as JSON and paged by `retstart`. `esummary` is read as
//! XML: every `DocSum` element becomes one record keyed by its `Item` names.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::{ApiDefaults, ApiSettings};
use crate::error::FetchError;
use crate::pagination::{Page, PageCursor, PageSource};
use crate::sources::fetch::{Fetch, FetchRequest, ParseMode};
use crate::table::Record;

pub(crate) const PUBMED: ApiDefaults = ApiDefaults {
    service: "ncbi",
    host: "eutils.ncbi.nlm.nih.gov",
    base_path: "/entrez/eutils",
};
/// NCBI allows 3 requests per second without an API key and 10 with one.
pub(crate) const NCBI_MIN_INTERVAL: Duration = Duration::from_millis(334);
pub(crate) const NCBI_MIN_INTERVAL_WITH_KEY: Duration = Duration::from_millis(100);

/// Largest `retmax` esearch accepts.
pub(crate) const MAX_PAGE_SIZE: usize = 10_000;

pub struct PubMedClient {
    fetcher: Arc<dyn Fetch>,
    settings: ApiSettings,
}

impl PubMedClient {
    pub fn new(fetcher: Arc<dyn Fetch>, settings: ApiSettings) -> Self {
        Self { fetcher, settings }
    }

    fn request(&self, utility: &str) -> FetchRequest {
        let request = FetchRequest::get(self.settings.endpoint(utility))
            .query("db", "pubmed")
            .basic_auth(self.settings.credentials.as_ref());
        match self.settings.api_key.as_deref() {
            Some(key) => request.query("api_key", key),
            None => request,
        }
    }

    async fn get_json(&self, request: FetchRequest) -> Result<Value, FetchError> {
        let url = request.display_url();
        self.fetcher.fetch(&request).await?.into_json(&url)
    }

    pub async fn summary(&self, pmid: &str) -> Result<Vec<Record>, FetchError> {
        let request = self
            .request("esummary.fcgi")
            .query("retmode", "xml")
            .query("id", pmid.trim())
            .mode(ParseMode::Xml);
        let url = request.display_url();
        let doc = self.get_json(request).await?;

        let records: Vec<Record> = super::records_at(&doc, "/eSummaryResult/DocSum")
            .iter()
            .map(docsum_record)
            .collect();
        if records.is_empty() {
            if let Some(message) = doc.pointer("/eSummaryResult/ERROR") {
                debug!(pmid, error = %message, "esummary reported an error");
            }
            return Err(FetchError::NotFound { url });
        }
        Ok(records)
    }

    pub fn search(&self, term: &str) -> PubMedSearch<'_> {
        PubMedSearch {
            client: self,
            term: term.trim().to_string(),
        }
    }
}

/// `Item` text keyed by its `Name` attribute. List items stay nested.
fn docsum_record(docsum: &Record) -> Record {
    let mut record = Record::new();
    if let Some(id) = docsum.get("Id") {
        record.insert("Id".into(), id.clone());
    }

    let items = match docsum.get("Item") {
        Some(Value::Array(items)) => items.as_slice(),
        Some(item) => std::slice::from_ref(item),
        None => &[],
    };
    for item in items {
        let Some(name) = item.get("@Name").and_then(Value::as_str) else {
            continue;
        };
        let value = if item.get("@Type").and_then(Value::as_str) == Some("List") {
            item.get("Item").cloned().unwrap_or_else(|| json!([]))
        } else {
            item.get("#text").cloned().unwrap_or(Value::Null)
        };
        record.insert(name.to_string(), value);
    }
    record
}

pub struct PubMedSearch<'a> {
    client: &'a PubMedClient,
    term: String,
}

#[async_trait]
impl PageSource for PubMedSearch<'_> {
    async fn fetch_page(&self, cursor: &PageCursor, page_size: usize) -> Result<Page, FetchError> {
        let request = self
            .client
            .request("esearch.fcgi")
            .query("retmode", "json")
            .query("term", self.term.clone());
        let PageCursor::Offset(offset) = cursor else {
            return Err(FetchError::UnexpectedPayload {
                url: request.display_url(),
                message: format!("esearch pages by offset only, got {cursor:?}"),
            });
        };
        let request = request
            .query("retstart", offset.to_string())
            .query("retmax", page_size.min(MAX_PAGE_SIZE).to_string());
        let doc = self.client.get_json(request).await?;

        let items = doc
            .pointer("/esearchresult/idlist")
            .and_then(Value::as_array)
            .map(|ids| {
                ids.iter()
                    .filter_map(Value::as_str)
                    .map(|pmid| {
                        let mut record = Record::new();
                        record.insert("pmid".into(), Value::String(pmid.to_string()));
                        record
                    })
                    .collect()
            })
            .unwrap_or_default();
        let total = super::count_at(&doc, "/esearchresult/count");
        Ok(Page::offset(items, total, *offset))
    }
}
