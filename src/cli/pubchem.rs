use clap::{Args, ValueEnum};
use futures::FutureExt;

use crate::batch::run_batch;
use crate::sources::pubchem::{DEFAULT_PROPERTIES, PUBCHEM, PUBCHEM_MIN_INTERVAL, PubChemClient};

#[derive(Args, Debug)]
pub struct PubChemArgs {
    #[arg(value_enum)]
    pub op: PubChemOp,

    #[command(flatten)]
    pub common: super::CommonArgs,

    /// Comma-separated compound properties for get_cid2properties
    #[arg(long, default_value = DEFAULT_PROPERTIES)]
    pub properties: String,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum PubChemOp {
    /// Compound properties by CID
    #[value(name = "get_cid2properties")]
    GetCid2Properties,
    /// Synonyms by CID, one row each
    #[value(name = "get_cid2synonyms")]
    GetCid2Synonyms,
    /// CIDs by compound name
    #[value(name = "get_name2cid")]
    GetName2Cid,
}

pub(crate) async fn run(args: PubChemArgs) -> anyhow::Result<()> {
    let ids = super::load_ids(&args.common)?;
    let settings = super::api_settings(&args.common, PUBCHEM)?;
    let client = PubChemClient::new(
        super::fetcher(PUBCHEM.service, &settings, PUBCHEM_MIN_INTERVAL)?,
        settings,
    );
    let properties = args.properties.trim();

    let mut table = super::open_table(&args.common)?;
    match args.op {
        PubChemOp::GetCid2Properties => {
            run_batch(&ids, &mut table, |cid| {
                client.cid_properties(cid, properties).boxed_local()
            })
            .await?;
        }
        PubChemOp::GetCid2Synonyms => {
            run_batch(&ids, &mut table, |cid| client.cid_synonyms(cid).boxed_local()).await?;
        }
        PubChemOp::GetName2Cid => {
            run_batch(&ids, &mut table, |name| client.name_cids(name).boxed_local()).await?;
        }
    }
    table.finish()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::cli::{Cli, Commands};
    use clap::Parser;

    #[test]
    fn properties_default_to_the_standard_set() {
        let cli = Cli::try_parse_from(["bioclients", "pubchem", "get_cid2properties", "--ids", "2244"])
            .unwrap();
        let Commands::Pubchem(args) = cli.command else {
            panic!("expected pubchem subcommand");
        };
        assert_eq!(args.op, super::PubChemOp::GetCid2Properties);
        assert!(args.properties.starts_with("MolecularFormula,"));
    }
}
