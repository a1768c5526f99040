//! Flattening of heterogeneous API records into a fixed-header table.
//!
//! The first record decides the columns: its scalar-valued keys, in its key
//! order. Every later record is rendered against those columns. Keys the
//! header does not know are left out and absent columns render empty, but
//! each such mismatch is reported as [`SchemaDrift`] instead of passing
//! silently.

use std::fmt;
use std::io::{self, Write};

use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::BioClientsError;

pub type Record = Map<String, Value>;

pub(crate) const DEFAULT_FLOAT_PRECISION: u32 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ValueKind {
    Null,
    Bool,
    Integer,
    Float,
    String,
    Nested,
}

impl ValueKind {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(_) => Self::Bool,
            Value::Number(n) if n.is_f64() => Self::Float,
            Value::Number(_) => Self::Integer,
            Value::String(_) => Self::String,
            Value::Array(_) | Value::Object(_) => Self::Nested,
        }
    }

    pub fn is_scalar(self) -> bool {
        self != Self::Nested
    }

    fn compatible_with(self, other: Self) -> bool {
        self == other
            || self == Self::Null
            || other == Self::Null
            || matches!(
                (self, other),
                (Self::Integer, Self::Float) | (Self::Float, Self::Integer)
            )
    }
}

impl fmt::Display for ValueKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Null => "null",
            Self::Bool => "bool",
            Self::Integer => "integer",
            Self::Float => "float",
            Self::String => "string",
            Self::Nested => "nested",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub kind: ValueKind,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SchemaDrift {
    /// A key the header does not have; its value is not written.
    Added(String),
    /// A header column the record lacks; written as an empty field.
    Missing(String),
    KindChanged {
        column: String,
        expected: ValueKind,
        found: ValueKind,
    },
}

impl fmt::Display for SchemaDrift {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Added(key) => write!(f, "unknown key '{key}' dropped"),
            Self::Missing(column) => write!(f, "column '{column}' missing"),
            Self::KindChanged {
                column,
                expected,
                found,
            } => write!(f, "column '{column}' changed from {expected} to {found}"),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
    dropped: Vec<String>,
}

impl Schema {
    pub fn discover(record: &Record) -> Self {
        let mut schema = Self::default();
        for (name, value) in record {
            let kind = ValueKind::of(value);
            if kind.is_scalar() {
                schema.columns.push(Column {
                    name: name.clone(),
                    kind,
                });
            } else {
                schema.dropped.push(name.clone());
            }
        }
        schema
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    /// Keys of the first record that held lists or objects.
    pub fn dropped(&self) -> &[String] {
        &self.dropped
    }

    pub fn header(&self) -> Vec<String> {
        self.columns.iter().map(|c| c.name.clone()).collect()
    }

    pub fn check(&self, record: &Record) -> Vec<SchemaDrift> {
        let mut drift = Vec::new();
        for column in &self.columns {
            match record.get(&column.name) {
                None => drift.push(SchemaDrift::Missing(column.name.clone())),
                Some(value) => {
                    let found = ValueKind::of(value);
                    if !column.kind.compatible_with(found) {
                        drift.push(SchemaDrift::KindChanged {
                            column: column.name.clone(),
                            expected: column.kind,
                            found,
                        });
                    }
                }
            }
        }
        for key in record.keys() {
            let known = self.columns.iter().any(|c| &c.name == key) || self.dropped.contains(key);
            if !known {
                drift.push(SchemaDrift::Added(key.clone()));
            }
        }
        drift
    }

    pub fn row(&self, record: &Record, float_precision: Option<u32>) -> Vec<String> {
        self.columns
            .iter()
            .map(|column| {
                record
                    .get(&column.name)
                    .map(|value| render_value(value, float_precision))
                    .unwrap_or_default()
            })
            .collect()
    }
}

/// Stringifies one field value.
///
/// Floats are rounded to `float_precision` decimals and printed in shortest
/// form, so a whole float loses its decimal point (`2.0` renders as `2`) and
/// a value smaller than half the last decimal renders as `0`. Null is empty
/// and a nested value becomes compact JSON.
pub fn render_value(value: &Value, float_precision: Option<u32>) -> String {
    match value {
        Value::Null => String::new(),
        Value::Bool(b) => b.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => match (n.as_f64(), float_precision) {
            (Some(x), Some(precision)) if n.is_f64() => round_float(x, precision).to_string(),
            _ => n.to_string(),
        },
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// Above 2^53 an `f64` has no fractional bits, so scaling can only add error.
const EXACT_INTEGER_LIMIT: f64 = 9_007_199_254_740_992.0;

fn round_float(x: f64, precision: u32) -> f64 {
    let factor = 10f64.powi(precision.min(15) as i32);
    let scaled = x * factor;
    if !scaled.is_finite() || scaled.abs() >= EXACT_INTEGER_LIMIT {
        return x;
    }
    (scaled.round() / factor) + 0.0
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlattenOptions {
    pub delimiter: u8,
    pub float_precision: Option<u32>,
}

impl Default for FlattenOptions {
    fn default() -> Self {
        Self {
            delimiter: b'\t',
            float_precision: Some(DEFAULT_FLOAT_PRECISION),
        }
    }
}

impl FlattenOptions {
    pub fn csv() -> Self {
        Self {
            delimiter: b',',
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TableOutput {
    pub header: Vec<String>,
    /// Collected rows; empty when the table was streamed.
    pub rows: Vec<Vec<String>>,
    pub rows_written: usize,
    pub drifted_records: usize,
}

/// Writes records as delimited rows, either streamed to a sink or collected.
pub struct TableWriter<W: Write> {
    options: FlattenOptions,
    schema: Option<Schema>,
    out: Option<csv::Writer<W>>,
    rows: Vec<Vec<String>>,
    rows_written: usize,
    drifted_records: usize,
}

impl TableWriter<io::Sink> {
    pub fn in_memory(options: FlattenOptions) -> Self {
        Self {
            options,
            schema: None,
            out: None,
            rows: Vec::new(),
            rows_written: 0,
            drifted_records: 0,
        }
    }
}

impl<W: Write> TableWriter<W> {
    pub fn streaming(out: W, options: FlattenOptions) -> Self {
        let out = csv::WriterBuilder::new()
            .delimiter(options.delimiter)
            .quote_style(csv::QuoteStyle::Necessary)
            .has_headers(false)
            .from_writer(out);
        Self {
            options,
            schema: None,
            out: Some(out),
            rows: Vec::new(),
            rows_written: 0,
            drifted_records: 0,
        }
    }

    pub fn schema(&self) -> Option<&Schema> {
        self.schema.as_ref()
    }

    pub fn rows_written(&self) -> usize {
        self.rows_written
    }

    /// Appends one record. The first call fixes the header and writes it.
    pub fn write_record(&mut self, record: &Record) -> Result<Vec<SchemaDrift>, BioClientsError> {
        let (schema, drift) = match self.schema.take() {
            Some(schema) => {
                let drift = schema.check(record);
                (schema, drift)
            }
            None => {
                let schema = Schema::discover(record);
                debug!(
                    columns = ?schema.header(),
                    dropped = ?schema.dropped(),
                    "Discovered table columns"
                );
                if schema.columns().is_empty() {
                    warn!("First record has no scalar fields; rows will be empty");
                }
                if let Some(out) = self.out.as_mut() {
                    write_line(out, &schema.header())?;
                }
                (schema, Vec::new())
            }
        };

        let row = schema.row(record, self.options.float_precision);
        self.schema = Some(schema);

        if !drift.is_empty() {
            self.drifted_records += 1;
            for item in &drift {
                debug!(row = self.rows_written + 1, drift = %item, "Schema drift");
            }
        }

        match self.out.as_mut() {
            Some(out) => write_line(out, &row)?,
            None => self.rows.push(row),
        }
        self.rows_written += 1;
        Ok(drift)
    }

    pub fn finish(mut self) -> Result<TableOutput, BioClientsError> {
        if let Some(out) = self.out.as_mut() {
            out.flush()?;
        }
        if self.drifted_records > 0 {
            warn!(
                drifted_records = self.drifted_records,
                rows = self.rows_written,
                "Some records did not match the columns of the first record"
            );
        }
        Ok(TableOutput {
            header: self.schema.map(|s| s.header()).unwrap_or_default(),
            rows: self.rows,
            rows_written: self.rows_written,
            drifted_records: self.drifted_records,
        })
    }
}

/// A line holding nothing but one empty field is written bare; the csv
/// writer would quote it as `""`.
fn write_line<W: Write>(out: &mut csv::Writer<W>, fields: &[String]) -> Result<(), BioClientsError> {
    match fields {
        [] => {}
        [only] if only.is_empty() => {}
        _ => return Ok(out.write_record(fields)?),
    }
    out.flush()?;
    out.get_mut().write_all(b"\n")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn record(value: Value) -> Record {
        match value {
            Value::Object(map) => map,
            other => panic!("not an object: {other}"),
        }
    }

    fn stream(records: &[Record], options: FlattenOptions) -> String {
        let mut buf = Vec::new();
        let mut table = TableWriter::streaming(&mut buf, options);
        for r in records {
            table.write_record(r).unwrap();
        }
        table.finish().unwrap();
        String::from_utf8(buf).unwrap()
    }

    #[test]
    fn header_is_scalar_keys_of_first_record_in_order() {
        let first = record(json!({
            "target_chembl_id": "CHEMBL203",
            "cross_references": [{"xref_id": "P00533"}],
            "pref_name": "EGFR",
            "target_components": {"accession": "P00533"},
            "tax_id": 9606,
            "species_group_flag": false
        }));
        let schema = Schema::discover(&first);
        assert_eq!(
            schema.header(),
            vec!["target_chembl_id", "pref_name", "tax_id", "species_group_flag"]
        );
        assert_eq!(schema.dropped(), ["cross_references", "target_components"]);
    }

    #[test]
    fn later_records_cannot_change_the_header() {
        let records = vec![
            record(json!({"b": 1, "a": "x", "nested": [1]})),
            record(json!({"a": "y", "extra": "ignored", "nested": "now scalar"})),
            record(json!({"c": true})),
        ];
        let out = stream(&records, FlattenOptions::default());
        assert_eq!(out, "b\ta\n1\tx\n\ty\n\t\n");
    }

    #[test]
    fn drift_is_reported_without_changing_output() {
        let mut table = TableWriter::in_memory(FlattenOptions::default());
        let first = table
            .write_record(&record(json!({"id": 1, "name": "a", "tags": ["x"]})))
            .unwrap();
        assert!(first.is_empty());

        let drift = table
            .write_record(&record(json!({"id": "two", "tags": "x", "new": 1})))
            .unwrap();
        assert_eq!(
            drift,
            vec![
                SchemaDrift::KindChanged {
                    column: "id".into(),
                    expected: ValueKind::Integer,
                    found: ValueKind::String,
                },
                SchemaDrift::Missing("name".into()),
                SchemaDrift::Added("new".into()),
            ]
        );

        let clean = table
            .write_record(&record(json!({"id": 3.5, "name": null})))
            .unwrap();
        assert!(clean.is_empty());

        let output = table.finish().unwrap();
        assert_eq!(output.header, vec!["id", "name"]);
        assert_eq!(
            output.rows,
            vec![
                vec!["1".to_string(), "a".to_string()],
                vec!["two".to_string(), String::new()],
                vec!["3.5".to_string(), String::new()],
            ]
        );
        assert_eq!(output.rows_written, 3);
        assert_eq!(output.drifted_records, 1);
    }

    #[test]
    fn floats_are_rounded_and_other_values_coerced() {
        assert_eq!(render_value(&json!(0.123456789), Some(5)), "0.12346");
        assert_eq!(render_value(&json!(0.5), Some(5)), "0.5");
        assert_eq!(render_value(&json!(0.123456789), None), "0.123456789");
        assert_eq!(render_value(&json!(42), Some(5)), "42");
        assert_eq!(render_value(&json!(true), Some(5)), "true");
        assert_eq!(render_value(&json!(null), Some(5)), "");
        assert_eq!(render_value(&json!({"a": [1, 2]}), Some(5)), r#"{"a":[1,2]}"#);
    }

    #[test]
    fn rounding_leaves_large_floats_untouched() {
        assert_eq!(render_value(&json!(1e20), Some(5)), "100000000000000000000");
        assert_eq!(render_value(&json!(-1e20), Some(5)), "-100000000000000000000");
        assert_eq!(render_value(&json!(100000000000.5), Some(5)), "100000000000.5");
    }

    #[test]
    fn rounding_tiny_and_whole_floats() {
        assert_eq!(render_value(&json!(1e-7), Some(5)), "0");
        assert_eq!(render_value(&json!(-1e-7), Some(5)), "0");
        assert_eq!(render_value(&json!(2.0), Some(5)), "2");
        assert_eq!(render_value(&json!(2.0), None), "2.0");
    }

    #[test]
    fn single_column_missing_values_are_empty_fields() {
        let records = vec![
            record(json!({"pmid": "1"})),
            record(json!({"other": "x"})),
            record(json!({"pmid": null})),
            record(json!({"pmid": ""})),
            record(json!({"pmid": "2"})),
        ];
        assert_eq!(
            stream(&records, FlattenOptions::default()),
            "pmid\n1\n\n\n\n2\n"
        );
    }

    #[test]
    fn nested_only_first_record_writes_bare_lines() {
        let records = vec![
            record(json!({"ids": [1, 2]})),
            record(json!({"ids": [3], "name": "x"})),
        ];
        assert_eq!(stream(&records, FlattenOptions::csv()), "\n\n\n");
    }

    #[test]
    fn no_records_means_no_output() {
        assert_eq!(stream(&[], FlattenOptions::default()), "");
        let output = TableWriter::in_memory(FlattenOptions::default())
            .finish()
            .unwrap();
        assert!(output.header.is_empty());
        assert_eq!(output.rows_written, 0);
    }

    #[test]
    fn csv_mode_quotes_fields_containing_the_delimiter() {
        let records = vec![record(json!({"name": "aspirin, plain", "cid": 2244}))];
        assert_eq!(
            stream(&records, FlattenOptions::csv()),
            "name,cid\n\"aspirin, plain\",2244\n"
        );
    }

    #[test]
    fn rerunning_the_same_records_is_byte_identical() {
        let records = vec![
            record(json!({"CID": 2244, "XLogP": 1.2000001, "Active": true})),
            record(json!({"CID": 3672, "Active": false, "XLogP": 3.97})),
        ];
        let first = stream(&records, FlattenOptions::default());
        let second = stream(&records, FlattenOptions::default());
        assert_eq!(first, second);
        assert_eq!(first, "CID\tXLogP\tActive\n2244\t1.2\ttrue\n3672\t3.97\tfalse\n");
    }
}
