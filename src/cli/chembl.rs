use std::time::Duration;

use clap::{Args, ValueEnum};
use futures::FutureExt;

use crate::batch::{run_batch, write_listing};
use crate::sources::chembl::{CHEMBL, ChemblClient};

#[derive(Args, Debug)]
pub struct ChemblArgs {
    #[arg(value_enum)]
    pub op: ChemblOp,

    #[command(flatten)]
    pub common: super::CommonArgs,

    #[command(flatten)]
    pub paging: super::PageArgs,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChemblOp {
    /// Page through all targets
    #[value(name = "list_targets")]
    ListTargets,
    /// Targets by ChEMBL ID
    #[value(name = "get_target")]
    GetTarget,
    /// Molecules by ChEMBL ID
    #[value(name = "get_molecule")]
    GetMolecule,
}

pub(crate) async fn run(args: ChemblArgs) -> anyhow::Result<()> {
    let settings = super::api_settings(&args.common, CHEMBL)?;
    let client = ChemblClient::new(
        super::fetcher(CHEMBL.service, &settings, Duration::ZERO)?,
        settings,
    );

    match args.op {
        ChemblOp::ListTargets => {
            let mut table = super::open_table(&args.common)?;
            write_listing(&client.targets(), args.paging.options(), &mut table).await?;
            table.finish()?;
        }
        ChemblOp::GetTarget | ChemblOp::GetMolecule => {
            let ids = super::load_ids(&args.common)?;
            let mut table = super::open_table(&args.common)?;
            if args.op == ChemblOp::GetTarget {
                run_batch(&ids, &mut table, |id| client.target(id).boxed_local()).await?;
            } else {
                run_batch(&ids, &mut table, |id| client.molecule(id).boxed_local()).await?;
            }
            table.finish()?;
        }
    }
    Ok(())
}
