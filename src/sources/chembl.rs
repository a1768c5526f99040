use std::sync::Arc;

use async_trait::async_trait;
use reqwest::Url;
use serde_json::Value;

use crate::config::{ApiDefaults, ApiSettings};
use crate::error::FetchError;
use crate::pagination::{Page, PageCursor, PageSource};
use crate::sources::fetch::{Fetch, FetchRequest};
use crate::table::Record;

pub(crate) const CHEMBL: ApiDefaults = ApiDefaults {
    service: "chembl",
    host: "www.ebi.ac.uk",
    base_path: "/chembl/api/data",
};

pub struct ChemblClient {
    fetcher: Arc<dyn Fetch>,
    settings: ApiSettings,
}

impl ChemblClient {
    pub fn new(fetcher: Arc<dyn Fetch>, settings: ApiSettings) -> Self {
        Self { fetcher, settings }
    }

    async fn get_json(&self, request: FetchRequest) -> Result<Value, FetchError> {
        let request = request.basic_auth(self.settings.credentials.as_ref());
        let url = request.display_url();
        self.fetcher.fetch(&request).await?.into_json(&url)
    }

    async fn get_entity(&self, resource: &str, id: &str) -> Result<Vec<Record>, FetchError> {
        let url = self
            .settings
            .endpoint(&format!("{resource}/{}.json", super::path_segment(id)));
        let doc = self.get_json(FetchRequest::get(url.clone())).await?;
        Ok(vec![super::single_record(doc, &url)?])
    }

    pub async fn target(&self, chembl_id: &str) -> Result<Vec<Record>, FetchError> {
        self.get_entity("target", chembl_id).await
    }

    pub async fn molecule(&self, chembl_id: &str) -> Result<Vec<Record>, FetchError> {
        self.get_entity("molecule", chembl_id).await
    }

    pub fn targets(&self) -> TargetListing<'_> {
        TargetListing { client: self }
    }

    /// `page_meta.next` comes back host-relative; anchor it on the configured base.
    fn resolve_next(&self, next: &str) -> Result<String, FetchError> {
        let base = Url::parse(&self.settings.base_url).map_err(|err| FetchError::UnexpectedPayload {
            url: self.settings.base_url.clone(),
            message: format!("invalid base URL: {err}"),
        })?;
        base.join(next)
            .map(|url| url.to_string())
            .map_err(|err| FetchError::UnexpectedPayload {
                url: next.to_string(),
                message: format!("invalid next-page URL: {err}"),
            })
    }
}

pub struct TargetListing<'a> {
    client: &'a ChemblClient,
}

#[async_trait]
impl PageSource for TargetListing<'_> {
    async fn fetch_page(&self, cursor: &PageCursor, page_size: usize) -> Result<Page, FetchError> {
        let request = match cursor {
            PageCursor::Offset(offset) => FetchRequest::get(self.client.settings.endpoint("target.json"))
                .query("limit", page_size.to_string())
                .query("offset", offset.to_string()),
            PageCursor::NextUrl(next) => FetchRequest::get(self.client.resolve_next(next)?),
            PageCursor::Token(_) => {
                return Err(FetchError::UnexpectedPayload {
                    url: self.client.settings.endpoint("target.json"),
                    message: "ChEMBL listings do not use page tokens".into(),
                });
            }
        };
        let doc = self.client.get_json(request).await?;

        let items = super::records_at(&doc, "/targets");
        let total = super::count_at(&doc, "/page_meta/total_count");
        let next = doc
            .pointer("/page_meta/next")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Page::next_url(items, total, next))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::batch::write_listing;
    use crate::pagination::PaginateOptions;
    use crate::sources::test_fetcher;
    use crate::table::{FlattenOptions, TableWriter};
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> ChemblClient {
        ChemblClient::new(test_fetcher(), ApiSettings::with_base_url(server.uri()))
    }

    #[tokio::test]
    async fn target_fetches_single_record() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/target/CHEMBL203.json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "target_chembl_id": "CHEMBL203",
                "pref_name": "Epidermal growth factor receptor erbB1",
                "organism": "Homo sapiens",
                "target_components": [{"accession": "P00533"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = client(&server).target("CHEMBL203").await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["pref_name"], "Epidermal growth factor receptor erbB1");
    }

    #[tokio::test]
    async fn molecule_404_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/molecule/CHEMBL0.json"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let err = client(&server).molecule("CHEMBL0").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn target_listing_follows_relative_next_urls() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/target.json"))
            .and(query_param("offset", "0"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page_meta": {"total_count": 3, "next": "/target.json?limit=2&offset=2"},
                "targets": [{"target_chembl_id": "CHEMBL1"}, {"target_chembl_id": "CHEMBL2"}]
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/target.json"))
            .and(query_param("offset", "2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "page_meta": {"total_count": 3, "next": null},
                "targets": [{"target_chembl_id": "CHEMBL3"}]
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server);
        let mut table = TableWriter::in_memory(FlattenOptions::default());
        let options = PaginateOptions {
            page_size: 2,
            ..PaginateOptions::default()
        };
        let stats = write_listing(&client.targets(), options, &mut table)
            .await
            .unwrap();
        assert_eq!(stats.n_pages, 2);
        let output = table.finish().unwrap();
        assert_eq!(output.header, vec!["target_chembl_id"]);
        assert_eq!(output.rows[2], vec!["CHEMBL3".to_string()]);
    }

    #[test]
    fn resolve_next_keeps_absolute_urls() {
        let client = ChemblClient::new(
            test_fetcher(),
            ApiSettings::with_base_url("https://www.ebi.ac.uk/chembl/api/data"),
        );
        assert_eq!(
            client
                .resolve_next("/chembl/api/data/target.json?limit=20&offset=20")
                .unwrap(),
            "https://www.ebi.ac.uk/chembl/api/data/target.json?limit=20&offset=20"
        );
        assert_eq!(
            client.resolve_next("http://mirror.example.org/t.json").unwrap(),
            "http://mirror.example.org/t.json"
        );
    }
}
