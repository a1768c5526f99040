use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::{ApiDefaults, ApiSettings};
use crate::error::FetchError;
use crate::pagination::{Page, PageCursor, PageSource};
use crate::sources::fetch::{Fetch, FetchRequest};
use crate::table::Record;

pub(crate) const CLINICAL_TRIALS: ApiDefaults = ApiDefaults {
    service: "ctgov",
    host: "clinicaltrials.gov",
    base_path: "/api/v2",
};

/// The API rejects page sizes above this.
pub(crate) const MAX_PAGE_SIZE: usize = 1000;

const PROJECTED_MODULES: [&str; 2] = [
    "/protocolSection/identificationModule",
    "/protocolSection/statusModule",
];

pub struct ClinicalTrialsClient {
    fetcher: Arc<dyn Fetch>,
    settings: ApiSettings,
}

impl ClinicalTrialsClient {
    pub fn new(fetcher: Arc<dyn Fetch>, settings: ApiSettings) -> Self {
        Self { fetcher, settings }
    }

    async fn get_json(&self, request: FetchRequest) -> Result<Value, FetchError> {
        let request = request.basic_auth(self.settings.credentials.as_ref());
        let url = request.display_url();
        self.fetcher.fetch(&request).await?.into_json(&url)
    }

    pub async fn study(&self, nct_id: &str) -> Result<Vec<Record>, FetchError> {
        let url = self.settings.endpoint(&format!(
            "studies/{}",
            super::path_segment(&nct_id.to_ascii_uppercase())
        ));
        let doc = self
            .get_json(FetchRequest::get(url).query("format", "json"))
            .await?;
        Ok(vec![project_study(&doc)])
    }

    pub fn search(&self, query: &str) -> StudySearch<'_> {
        StudySearch {
            client: self,
            query: query.trim().to_string(),
        }
    }
}

/// Identification and status fields of one study, merged into a single record.
fn project_study(study: &Value) -> Record {
    let mut record = Record::new();
    for pointer in PROJECTED_MODULES {
        if let Some(Value::Object(module)) = study.pointer(pointer) {
            record.extend(module.iter().map(|(k, v)| (k.clone(), v.clone())));
        }
    }
    record
}

pub struct StudySearch<'a> {
    client: &'a ClinicalTrialsClient,
    query: String,
}

#[async_trait]
impl PageSource for StudySearch<'_> {
    async fn fetch_page(&self, cursor: &PageCursor, page_size: usize) -> Result<Page, FetchError> {
        let mut request = FetchRequest::get(self.client.settings.endpoint("studies"))
            .query("query.term", self.query.clone())
            .query("pageSize", page_size.min(MAX_PAGE_SIZE).to_string())
            .query("countTotal", "true")
            .query("format", "json");
        match cursor {
            PageCursor::Offset(0) => {}
            PageCursor::Token(token) => request = request.query("pageToken", token.clone()),
            other => {
                return Err(FetchError::UnexpectedPayload {
                    url: request.display_url(),
                    message: format!("study search pages by token only, got {other:?}"),
                });
            }
        }
        let doc = self.client.get_json(request).await?;

        let items = doc
            .get("studies")
            .and_then(Value::as_array)
            .map(|studies| studies.iter().map(project_study).collect())
            .unwrap_or_default();
        let total = super::count_at(&doc, "/totalCount");
        let token = doc
            .get("nextPageToken")
            .and_then(Value::as_str)
            .map(str::to_string);
        Ok(Page::token(items, total, token))
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

    fn client(server: &MockServer) -> ClinicalTrialsClient {
        ClinicalTrialsClient::new(test_fetcher(), ApiSettings::with_base_url(server.uri()))
    }

    fn study(nct_id: &str, status: &str) -> Value {
        json!({
            "protocolSection": {
                "identificationModule": {"nctId": nct_id, "briefTitle": format!("Trial {nct_id}")},
                "statusModule": {"overallStatus": status, "startDateStruct": {"date": "2020-01"}},
                "conditionsModule": {"conditions": ["melanoma"]}
            },
            "hasResults": false
        })
    }

    #[test]
    fn project_study_merges_identification_and_status() {
        let record = project_study(&study("NCT00000001", "COMPLETED"));
        let keys: Vec<&String> = record.keys().collect();
        assert_eq!(
            keys,
            vec!["nctId", "briefTitle", "overallStatus", "startDateStruct"]
        );
    }

    #[tokio::test]
    async fn study_fetches_by_uppercased_nct_id() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/studies/NCT04280705"))
            .and(query_param("format", "json"))
            .respond_with(ResponseTemplate::new(200).set_body_json(study("NCT04280705", "COMPLETED")))
            .expect(1)
            .mount(&server)
            .await;

        let rows = client(&server).study("nct04280705").await.unwrap();
        assert_eq!(rows[0]["nctId"], "NCT04280705");
        assert_eq!(rows[0]["overallStatus"], "COMPLETED");
    }

    #[tokio::test]
    async fn search_follows_page_tokens_and_first_page_total() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/studies"))
            .and(query_param("query.term", "melanoma"))
            .and(query_param("pageToken", "abc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "studies": [study("NCT3", "RECRUITING")],
                "nextPageToken": "def"
            })))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/studies"))
            .and(query_param("query.term", "melanoma"))
            .and(query_param("countTotal", "true"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "studies": [study("NCT1", "COMPLETED"), study("NCT2", "COMPLETED")],
                "totalCount": 3,
                "nextPageToken": "abc"
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
        let stats = write_listing(&client.search(" melanoma "), options, &mut table)
            .await
            .unwrap();
        assert_eq!(stats.n_pages, 2);
        assert_eq!(stats.n_out, 3);
        let output = table.finish().unwrap();
        assert_eq!(output.header, vec!["nctId", "briefTitle", "overallStatus"]);
    }
}
