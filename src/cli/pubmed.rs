use clap::{Args, ValueEnum};
use futures::FutureExt;

use crate::batch::{run_batch, write_listing};
use crate::sources::pubmed::{NCBI_MIN_INTERVAL, NCBI_MIN_INTERVAL_WITH_KEY, PUBMED, PubMedClient};

#[derive(Args, Debug)]
pub struct PubMedArgs {
    #[arg(value_enum)]
    pub op: PubMedOp,

    #[command(flatten)]
    pub common: super::CommonArgs,

    #[command(flatten)]
    pub paging: super::PageArgs,

    /// PubMed query for search
    #[arg(long)]
    pub query: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubMedOp {
    /// PMIDs matching --query
    #[value(name = "search")]
    Search,
    /// Document summaries by PMID
    #[value(name = "get_summary")]
    GetSummary,
}

pub(crate) async fn run(args: PubMedArgs) -> anyhow::Result<()> {
    let settings = super::api_settings(&args.common, PUBMED)?;
    let interval = if settings.api_key.is_some() {
        NCBI_MIN_INTERVAL_WITH_KEY
    } else {
        NCBI_MIN_INTERVAL
    };
    let client = PubMedClient::new(super::fetcher(PUBMED.service, &settings, interval)?, settings);

    match args.op {
        PubMedOp::Search => {
            let query = super::require_query(args.query.as_deref(), "search")?;
            let mut table = super::open_table(&args.common)?;
            write_listing(&client.search(&query), args.paging.options(), &mut table).await?;
            table.finish()?;
        }
        PubMedOp::GetSummary => {
            let ids = super::load_ids(&args.common)?;
            let mut table = super::open_table(&args.common)?;
            run_batch(&ids, &mut table, |pmid| client.summary(pmid).boxed_local()).await?;
            table.finish()?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cli::{Cli, Commands};
    use clap::Parser;
    use serde_json::json;
    use wiremock::matchers::{method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn search_writes_pmids_with_key_from_param_file() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/esearch.fcgi"))
            .and(query_param("api_key", "k3y"))
            .and(query_param("term", "braf melanoma"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "esearchresult": {"count": "2", "idlist": ["101", "102"]}
            })))
            .expect(1)
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("ncbi.yaml");
        std::fs::write(&params, format!("api_key: k3y\napi_host: {}\napi_base_path: ''\n", server.uri()))
            .unwrap();
        let out = dir.path().join("pmids.csv");
        let cli = Cli::try_parse_from([
            "bioclients",
            "pubmed",
            "search",
            "--query",
            "braf melanoma",
            "--param_file",
            params.to_str().unwrap(),
            "--o",
            out.to_str().unwrap(),
            "--csv",
        ])
        .unwrap();
        let Commands::Pubmed(args) = cli.command else {
            panic!("expected pubmed subcommand");
        };
        run(args).await.unwrap();

        assert_eq!(std::fs::read_to_string(&out).unwrap(), "pmid\n101\n102\n");
    }
}
