//! Run loops: one request per input ID, or one listing walked page by page.

use std::io::Write;

use futures::StreamExt;
use futures::future::LocalBoxFuture;
use tracing::{debug, error, info, warn};

use crate::error::{BioClientsError, FetchError};
use crate::pagination::{PageSource, PaginateOptions, paginate};
use crate::table::{Record, TableWriter};

/// Counters of a per-ID run. `n_err` includes the IDs counted in `n_not_found`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchStats {
    pub n_in: usize,
    pub n_out: usize,
    pub n_not_found: usize,
    pub n_err: usize,
}

impl BatchStats {
    /// Writes the records fetched for one ID, or counts its failure.
    ///
    /// Fetch failures only affect this ID; write failures abort the run.
    pub fn record<W: Write>(
        &mut self,
        id: &str,
        result: Result<Vec<Record>, FetchError>,
        table: &mut TableWriter<W>,
    ) -> Result<(), BioClientsError> {
        self.n_in += 1;
        match result {
            Ok(records) => {
                if records.is_empty() {
                    debug!(id, "No records");
                }
                for record in &records {
                    table.write_record(record)?;
                    self.n_out += 1;
                }
            }
            Err(err) if err.is_not_found() => {
                warn!(id, url = err.url(), "Not found");
                self.n_not_found += 1;
                self.n_err += 1;
            }
            Err(err) => {
                error!(id, error = %err, "Fetch failed");
                self.n_err += 1;
            }
        }
        Ok(())
    }

    pub fn log_summary(&self) {
        info!(
            n_in = self.n_in,
            n_out = self.n_out,
            n_not_found = self.n_not_found,
            n_err = self.n_err,
            "Batch complete"
        );
    }
}

/// Looks up every ID in order and writes whatever each lookup returns.
pub async fn run_batch<'a, W, F>(
    ids: &'a [String],
    table: &mut TableWriter<W>,
    mut lookup: F,
) -> Result<BatchStats, BioClientsError>
where
    W: Write,
    F: FnMut(&'a str) -> LocalBoxFuture<'a, Result<Vec<Record>, FetchError>>,
{
    let mut stats = BatchStats::default();
    for id in ids {
        let result = lookup(id).await;
        stats.record(id, result, table)?;
    }
    stats.log_summary();
    Ok(stats)
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ListingStats {
    pub n_pages: usize,
    pub n_out: usize,
    pub n_err: usize,
}

impl ListingStats {
    pub fn log_summary(&self) {
        info!(
            n_pages = self.n_pages,
            n_out = self.n_out,
            n_err = self.n_err,
            "Listing complete"
        );
    }
}

/// Walks a listing into `table`.
///
/// Rows from pages fetched before a failure are kept; the failure is only
/// returned when no row was written at all.
pub async fn write_listing<S, W>(
    source: &S,
    options: PaginateOptions,
    table: &mut TableWriter<W>,
) -> Result<ListingStats, BioClientsError>
where
    S: PageSource + ?Sized,
    W: Write,
{
    let mut stats = ListingStats::default();
    let mut failure = None;

    let mut pages = std::pin::pin!(paginate(source, options));
    while let Some(page) = pages.next().await {
        match page {
            Ok(page) => {
                stats.n_pages += 1;
                for record in &page.items {
                    table.write_record(record)?;
                    stats.n_out += 1;
                }
            }
            Err(err) => {
                error!(error = %err, pages = stats.n_pages, "Listing stopped");
                stats.n_err += 1;
                failure = Some(err);
            }
        }
    }

    stats.log_summary();
    match failure {
        Some(err) if stats.n_out == 0 => Err(err.into()),
        _ => Ok(stats),
    }
}
