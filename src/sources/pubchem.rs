use std::sync::Arc;
use std::time::Duration;

use serde_json::{Value, json};

use crate::config::{ApiDefaults, ApiSettings};
use crate::error::FetchError;
use crate::sources::fetch::{Fetch, FetchRequest, ParseMode};
use crate::table::Record;

pub(crate) const PUBCHEM: ApiDefaults = ApiDefaults {
    service: "pubchem",
    host: "pubchem.ncbi.nlm.nih.gov",
    base_path: "/rest/pug",
};
pub(crate) const PUBCHEM_MIN_INTERVAL: Duration = Duration::from_millis(200);
pub(crate) const DEFAULT_PROPERTIES: &str =
    "MolecularFormula,MolecularWeight,CanonicalSMILES,IsomericSMILES,InChIKey,IUPACName";

pub struct PubChemClient {
    fetcher: Arc<dyn Fetch>,
    settings: ApiSettings,
}

impl PubChemClient {
    pub fn new(fetcher: Arc<dyn Fetch>, settings: ApiSettings) -> Self {
        Self { fetcher, settings }
    }

    async fn get_json(&self, request: FetchRequest) -> Result<Value, FetchError> {
        let request = request.basic_auth(self.settings.credentials.as_ref());
        let url = request.display_url();
        self.fetcher.fetch(&request).await?.into_json(&url)
    }

    pub async fn cid_properties(&self, cid: &str, properties: &str) -> Result<Vec<Record>, FetchError> {
        let url = self.settings.endpoint(&format!(
            "compound/cid/{}/property/{}/JSON",
            super::path_segment(cid),
            super::path_segment(properties)
        ));
        let doc = self.get_json(FetchRequest::get(url)).await?;
        Ok(super::records_at(&doc, "/PropertyTable/Properties"))
    }

    /// One `{CID, Synonym}` row per synonym.
    pub async fn cid_synonyms(&self, cid: &str) -> Result<Vec<Record>, FetchError> {
        let url = self.settings.endpoint(&format!(
            "compound/cid/{}/synonyms/JSON",
            super::path_segment(cid)
        ));
        let doc = self.get_json(FetchRequest::get(url)).await?;

        let mut out = Vec::new();
        for info in super::records_at(&doc, "/InformationList/Information") {
            let cid = info.get("CID").cloned().unwrap_or(Value::Null);
            let synonyms = info
                .get("Synonym")
                .and_then(Value::as_array)
                .map(Vec::as_slice)
                .unwrap_or_default();
            for synonym in synonyms {
                out.push(row([("CID", cid.clone()), ("Synonym", synonym.clone())]));
            }
        }
        Ok(out)
    }

    /// Names are POSTed so that any character survives the trip. The `TXT`
    /// output lists one CID per line.
    pub async fn name_cids(&self, name: &str) -> Result<Vec<Record>, FetchError> {
        let name = name.trim();
        let url = self.settings.endpoint("compound/name/cids/TXT");
        let request = FetchRequest::post(url, super::form_body(&[("name", name)]))
            .header("Content-Type", "application/x-www-form-urlencoded")
            .basic_auth(self.settings.credentials.as_ref())
            .mode(ParseMode::Raw);
        let url = request.display_url();
        let text = self.fetcher.fetch(&request).await?.into_text(&url)?;

        Ok(text
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(|cid| {
                let cid = cid
                    .parse::<u64>()
                    .map_or_else(|_| Value::String(cid.to_string()), Value::from);
                row([("Name", json!(name)), ("CID", cid)])
            })
            .collect())
    }
}

fn row<const N: usize>(fields: [(&str, Value); N]) -> Record {
    fields
        .into_iter()
        .map(|(key, value)| (key.to_string(), value))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sources::test_fetcher;
    use wiremock::matchers::{body_string, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> PubChemClient {
        PubChemClient::new(test_fetcher(), ApiSettings::with_base_url(server.uri()))
    }

    #[tokio::test]
    async fn cid_properties_reads_property_table() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compound/cid/2244/property/MolecularFormula,MolecularWeight/JSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "PropertyTable": {"Properties": [
                    {"CID": 2244, "MolecularFormula": "C9H8O4", "MolecularWeight": "180.16"}
                ]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let rows = client(&server)
            .cid_properties("2244", "MolecularFormula,MolecularWeight")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        let keys: Vec<&String> = rows[0].keys().collect();
        assert_eq!(keys, vec!["CID", "MolecularFormula", "MolecularWeight"]);
    }

    #[tokio::test]
    async fn cid_synonyms_emits_one_row_per_synonym() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compound/cid/2244/synonyms/JSON"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "InformationList": {"Information": [
                    {"CID": 2244, "Synonym": ["aspirin", "acetylsalicylic acid"]}
                ]}
            })))
            .mount(&server)
            .await;

        let rows = client(&server).cid_synonyms("2244").await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1]["CID"], 2244);
        assert_eq!(rows[1]["Synonym"], "acetylsalicylic acid");
    }

    #[tokio::test]
    async fn name_cids_posts_form_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compound/name/cids/TXT"))
            .and(header("content-type", "application/x-www-form-urlencoded"))
            .and(body_string("name=acetylsalicylic+acid"))
            .respond_with(ResponseTemplate::new(200).set_body_string("2244\n"))
            .mount(&server)
            .await;

        let rows = client(&server)
            .name_cids(" acetylsalicylic acid ")
            .await
            .unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["Name"], "acetylsalicylic acid");
        assert_eq!(rows[0]["CID"], 2244);
    }

    #[tokio::test]
    async fn name_matching_several_compounds_yields_a_row_per_cid() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/compound/name/cids/TXT"))
            .respond_with(ResponseTemplate::new(200).set_body_string("5793\n64689\n\n"))
            .mount(&server)
            .await;

        let rows = client(&server).name_cids("glucose").await.unwrap();
        let cids: Vec<&Value> = rows.iter().map(|r| &r["CID"]).collect();
        assert_eq!(cids, vec![&json!(5793), &json!(64689)]);
    }

    #[tokio::test]
    async fn unknown_cid_is_not_found() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/compound/cid/999999999/synonyms/JSON"))
            .respond_with(ResponseTemplate::new(404).set_body_json(json!({
                "Fault": {"Code": "PUGREST.NotFound"}
            })))
            .mount(&server)
            .await;

        let err = client(&server).cid_synonyms("999999999").await.unwrap_err();
        assert!(err.is_not_found());
    }
}
