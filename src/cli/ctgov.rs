use std::time::Duration;

use clap::{Args, ValueEnum};
use futures::FutureExt;

use crate::batch::{run_batch, write_listing};
use crate::error::BioClientsError;
use crate::sources::clinicaltrials::{CLINICAL_TRIALS, ClinicalTrialsClient};

#[derive(Args, Debug)]
pub struct CtgovArgs {
    #[arg(value_enum)]
    pub op: CtgovOp,

    #[command(flatten)]
    pub common: super::CommonArgs,

    #[command(flatten)]
    pub paging: super::PageArgs,

    /// Search terms for search_studies
    #[arg(long)]
    pub query: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum CtgovOp {
    /// Studies matching --query
    #[value(name = "search_studies")]
    SearchStudies,
    /// Studies by NCT ID
    #[value(name = "get_study")]
    GetStudy,
}

pub(crate) async fn run(args: CtgovArgs) -> anyhow::Result<()> {
    let settings = super::api_settings(&args.common, CLINICAL_TRIALS)?;
    let client = ClinicalTrialsClient::new(
        super::fetcher(CLINICAL_TRIALS.service, &settings, Duration::ZERO)?,
        settings,
    );

    match args.op {
        CtgovOp::SearchStudies => {
            let query = super::require_query(args.query.as_deref(), "search_studies")?;
            if args.paging.skip > 0 {
                return Err(BioClientsError::InvalidArgument(
                    "--skip is not supported by search_studies, which pages by token".into(),
                )
                .into());
            }
            let mut table = super::open_table(&args.common)?;
            write_listing(&client.search(&query), args.paging.options(), &mut table).await?;
            table.finish()?;
        }
        CtgovOp::GetStudy => {
            let ids = super::load_ids(&args.common)?;
            let mut table = super::open_table(&args.common)?;
            run_batch(&ids, &mut table, |id| client.study(id).boxed_local()).await?;
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

    fn parse(args: &[&str]) -> CtgovArgs {
        match Cli::try_parse_from(args).unwrap().command {
            Commands::Ctgov(args) => args,
            other => panic!("unexpected command {other:?}"),
        }
    }

    #[tokio::test]
    async fn search_studies_requires_query() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("ctgov.yaml");
        std::fs::write(&params, "").unwrap();
        let args = parse(&[
            "bioclients",
            "ctgov",
            "search_studies",
            "--param_file",
            params.to_str().unwrap(),
        ]);
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().contains("--query"));
    }

    #[tokio::test]
    async fn search_studies_rejects_skip() {
        let dir = tempfile::tempdir().unwrap();
        let params = dir.path().join("ctgov.yaml");
        std::fs::write(&params, "").unwrap();
        let args = parse(&[
            "bioclients",
            "ctgov",
            "search_studies",
            "--query",
            "melanoma",
            "--skip",
            "10",
            "--param_file",
            params.to_str().unwrap(),
        ]);
        let err = run(args).await.unwrap_err();
        assert!(err.to_string().contains("--skip"));
    }
}
