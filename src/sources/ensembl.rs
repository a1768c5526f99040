use std::sync::Arc;
use std::time::Duration;

use serde_json::{Map, Value};

use crate::config::{ApiDefaults, ApiSettings};
use crate::error::FetchError;
use crate::sources::fetch::{Fetch, FetchRequest};
use crate::table::Record;

pub(crate) const ENSEMBL: ApiDefaults = ApiDefaults {
    service: "ensembl",
    host: "rest.ensembl.org",
    base_path: "",
};
/// Ensembl allows 15 requests per second.
pub(crate) const ENSEMBL_MIN_INTERVAL: Duration = Duration::from_millis(67);

pub struct EnsemblClient {
    fetcher: Arc<dyn Fetch>,
    settings: ApiSettings,
}

impl EnsemblClient {
    pub fn new(fetcher: Arc<dyn Fetch>, settings: ApiSettings) -> Self {
        Self { fetcher, settings }
    }

    async fn get_json(&self, path: &str) -> Result<Value, FetchError> {
        let request = FetchRequest::get(self.settings.endpoint(path))
            .query("content-type", "application/json")
            .basic_auth(self.settings.credentials.as_ref());
        let url = request.display_url();
        self.fetcher.fetch(&request).await?.into_json(&url)
    }

    /// Software release and REST API version, keyed `software` and `rest`.
    pub async fn version(&self) -> Result<Value, FetchError> {
        let software = self.get_json("info/software").await?;
        let rest = self.get_json("info/rest").await?;

        let mut out = Map::new();
        out.insert("software".into(), software);
        out.insert("rest".into(), rest);
        Ok(Value::Object(out))
    }

    pub async fn gene(&self, id: &str) -> Result<Vec<Record>, FetchError> {
        let path = format!("lookup/id/{}", super::path_segment(id));
        let url = self.settings.endpoint(&path);
        let doc = self.get_json(&path).await?;
        Ok(vec![super::single_record(doc, &url)?])
    }
}
