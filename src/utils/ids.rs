use std::path::Path;
use std::sync::OnceLock;

use regex::Regex;

use crate::error::BioClientsError;

static ID_SEPARATOR_RE: OnceLock<Regex> = OnceLock::new();

fn separator() -> &'static Regex {
    ID_SEPARATOR_RE.get_or_init(|| Regex::new(r"[,\s]+").expect("valid id separator regex"))
}

/// Splits a `--ids` value on commas and/or whitespace.
///
/// Order is preserved and duplicates are kept.
pub(crate) fn parse_id_list(raw: &str) -> Vec<String> {
    separator()
        .split(raw)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

/// Reads one ID per line. Blank lines are skipped; the rest of the line after
/// the first tab is ignored so the first column of a TSV can be fed back in.
pub(crate) fn read_id_file(path: &Path) -> Result<Vec<String>, BioClientsError> {
    let content = std::fs::read_to_string(path).map_err(|err| {
        BioClientsError::InvalidArgument(format!("cannot read ID file {}: {err}", path.display()))
    })?;
    Ok(content
        .lines()
        .filter_map(|line| line.split('\t').next())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect())
}
