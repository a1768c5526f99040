//! Command-line surface: one subcommand per API, each with a positional operation.

use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::Context;
use clap::{ArgAction, Args, Parser, Subcommand};
use tracing::info;

use crate::config::{ApiDefaults, ApiSettings, ParamFile};
use crate::error::BioClientsError;
use crate::pagination::PaginateOptions;
use crate::sources::fetch::{Fetch, RetryPolicy, RetryingFetcher};
use crate::sources::rate_limit::{RateLimitPolicy, RateLimiter};
use crate::table::{FlattenOptions, TableWriter};
use crate::utils::ids::{parse_id_list, read_id_file};
use crate::utils::time::format_elapsed;

pub mod chembl;
pub mod ctgov;
pub mod ensembl;
pub mod pubchem;
pub mod pubmed;

#[derive(Parser, Debug)]
#[command(
    name = "bioclients",
    version,
    about = "Fetch records from biomedical REST APIs and write them as TSV"
)]
pub struct Cli {
    /// Log more: -v for debug, -vv for trace
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// PubChem PUG-REST compound properties, synonyms and name lookup
    Pubchem(pubchem::PubChemArgs),
    /// ChEMBL targets and molecules
    Chembl(chembl::ChemblArgs),
    /// ClinicalTrials.gov (API v2) studies
    Ctgov(ctgov::CtgovArgs),
    /// Ensembl REST genes and release info
    Ensembl(ensembl::EnsemblArgs),
    /// PubMed search and summaries via NCBI E-utilities
    Pubmed(pubmed::PubMedArgs),
}

/// Input, output and endpoint flags shared by every subcommand.
#[derive(Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// File of IDs, one per line (first tab-separated field is used)
    #[arg(long = "i", value_name = "FILE", conflicts_with = "ids")]
    pub input: Option<PathBuf>,

    /// Comma-separated IDs
    #[arg(long, value_name = "IDS")]
    pub ids: Option<String>,

    /// Output file [default: stdout]
    #[arg(long = "o", value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// API host, optionally with scheme
    #[arg(long = "api_host", value_name = "HOST")]
    pub api_host: Option<String>,

    /// API base path
    #[arg(long = "api_base_path", value_name = "PATH")]
    pub api_base_path: Option<String>,

    /// YAML parameter file [default: ~/.<service>.yaml]
    #[arg(long = "param_file", value_name = "FILE")]
    pub param_file: Option<PathBuf>,

    /// Comma-separated output instead of tab-separated
    #[arg(long)]
    pub csv: bool,
}

#[derive(Args, Debug, Clone, Copy)]
pub struct PageArgs {
    /// Records to skip at the start of a listing
    #[arg(long, default_value_t = 0)]
    pub skip: usize,

    /// Stop after this many records
    #[arg(long)]
    pub nmax: Option<usize>,

    /// Records requested per page
    #[arg(long, default_value_t = 100, value_parser = parse_positive)]
    pub nchunk: usize,
}

impl PageArgs {
    pub(crate) fn options(&self) -> PaginateOptions {
        PaginateOptions {
            page_size: self.nchunk,
            nmax: self.nmax,
            skip: self.skip,
        }
    }
}

fn parse_positive(raw: &str) -> Result<usize, String> {
    match raw.trim().parse::<usize>() {
        Ok(0) => Err("must be at least 1".into()),
        Ok(n) => Ok(n),
        Err(err) => Err(err.to_string()),
    }
}

/// Runs one subcommand and logs the elapsed wall time.
pub async fn run(cli: Cli) -> anyhow::Result<()> {
    let started = Instant::now();
    match cli.command {
        Commands::Pubchem(args) => pubchem::run(args).await?,
        Commands::Chembl(args) => chembl::run(args).await?,
        Commands::Ctgov(args) => ctgov::run(args).await?,
        Commands::Ensembl(args) => ensembl::run(args).await?,
        Commands::Pubmed(args) => pubmed::run(args).await?,
    }
    info!("Elapsed time: {}", format_elapsed(started.elapsed()));
    Ok(())
}

pub(crate) fn load_ids(common: &CommonArgs) -> Result<Vec<String>, BioClientsError> {
    let ids = match (&common.input, &common.ids) {
        (Some(path), _) => read_id_file(path)?,
        (None, Some(raw)) => parse_id_list(raw),
        (None, None) => {
            return Err(BioClientsError::InvalidArgument(
                "IDs required: use --i FILE or --ids ID1,ID2".into(),
            ));
        }
    };
    if ids.is_empty() {
        return Err(BioClientsError::InvalidArgument("No IDs given".into()));
    }
    info!(n_in = ids.len(), "Loaded IDs");
    Ok(ids)
}

pub(crate) fn require_query(query: Option<&str>, op: &str) -> Result<String, BioClientsError> {
    query
        .map(str::trim)
        .filter(|q| !q.is_empty())
        .map(str::to_string)
        .ok_or_else(|| BioClientsError::InvalidArgument(format!("--query is required for {op}")))
}

pub(crate) fn api_settings(
    common: &CommonArgs,
    defaults: ApiDefaults,
) -> Result<ApiSettings, BioClientsError> {
    let params = ParamFile::load(common.param_file.as_deref(), defaults.service)?;
    let settings = ApiSettings::resolve(
        defaults,
        common.api_host.as_deref(),
        common.api_base_path.as_deref(),
        &params,
    );
    tracing::debug!(service = defaults.service, base_url = %settings.base_url, "Resolved API endpoint");
    Ok(settings)
}

/// Fetcher throttled to `min_interval` between requests to the resolved base URL.
pub(crate) fn fetcher(
    service: &'static str,
    settings: &ApiSettings,
    min_interval: Duration,
) -> Result<Arc<dyn Fetch>, BioClientsError> {
    let limiter = RateLimiter::new(
        vec![RateLimitPolicy::new(
            service,
            settings.base_url.clone(),
            min_interval,
        )],
        Duration::ZERO,
    );
    let client = crate::sources::http_client(Arc::new(limiter))?;
    Ok(Arc::new(RetryingFetcher::new(client, RetryPolicy::default())))
}

pub(crate) fn open_output(path: Option<&Path>) -> anyhow::Result<Box<dyn Write>> {
    Ok(match path {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create output file {}", path.display()))?;
            Box::new(BufWriter::new(file))
        }
        None => Box::new(BufWriter::new(io::stdout())),
    })
}

pub(crate) fn open_table(common: &CommonArgs) -> anyhow::Result<TableWriter<Box<dyn Write>>> {
    let options = if common.csv {
        FlattenOptions::csv()
    } else {
        FlattenOptions::default()
    };
    Ok(TableWriter::streaming(
        open_output(common.output.as_deref())?,
        options,
    ))
}
