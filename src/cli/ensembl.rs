use std::io::Write;

use clap::{Args, ValueEnum};
use futures::FutureExt;

use crate::batch::run_batch;
use crate::render::json::write_pretty;
use crate::sources::ensembl::{ENSEMBL, ENSEMBL_MIN_INTERVAL, EnsemblClient};

#[derive(Args, Debug)]
pub struct EnsemblArgs {
    #[arg(value_enum)]
    pub op: EnsemblOp,

    #[command(flatten)]
    pub common: super::CommonArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum EnsemblOp {
    /// Software release and REST API version, as JSON
    #[value(name = "show_version")]
    ShowVersion,
    /// Genes by stable ID
    #[value(name = "get_gene")]
    GetGene,
}

pub(crate) async fn run(args: EnsemblArgs) -> anyhow::Result<()> {
    let settings = super::api_settings(&args.common, ENSEMBL)?;
    let client = EnsemblClient::new(
        super::fetcher(ENSEMBL.service, &settings, ENSEMBL_MIN_INTERVAL)?,
        settings,
    );

    match args.op {
        EnsemblOp::ShowVersion => {
            let version = client.version().await?;
            let mut out = super::open_output(args.common.output.as_deref())?;
            write_pretty(&mut out, &version)?;
            out.flush()?;
        }
        EnsemblOp::GetGene => {
            let ids = super::load_ids(&args.common)?;
            let mut table = super::open_table(&args.common)?;
            run_batch(&ids, &mut table, |id| client.gene(id).boxed_local()).await?;
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
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn show_version_pretty_prints_json() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/info/software"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"release": 112})))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/info/rest"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"release": "15.8"})))
            .mount(&server)
            .await;

        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("ensembl.yaml");
        std::fs::write(&params, "").unwrap();
        let out = dir.path().join("version.json");
        let uri = server.uri();
        let cli = Cli::try_parse_from([
            "bioclients",
            "ensembl",
            "show_version",
            "--api_host",
            uri.as_str(),
            "--param_file",
            params.to_str().unwrap(),
            "--o",
            out.to_str().unwrap(),
        ])
        .unwrap();
        let Commands::Ensembl(args) = cli.command else {
            panic!("expected ensembl subcommand");
        };
        run(args).await.unwrap();

        let written: serde_json::Value =
            serde_json::from_str(&std::fs::read_to_string(&out).unwrap()).unwrap();
        assert_eq!(written["software"]["release"], 112);
        assert_eq!(written["rest"]["release"], "15.8");
    }
}
