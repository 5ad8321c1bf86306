//! RMA tables: tab-separated provider files parsed into typed records.
//!
//! Every file carries a header row. `assetCode` and `windowTimestamp` are
//! mandatory; the identifier columns in [`TEXT_COLUMNS`] are kept as text
//! and every other column is a nullable numeric score.
//!
//! Tables from several files are concatenated with the union of their
//! columns and ordered by timestamp, then handed to callers as a polars
//! `DataFrame` or written back to disk as TSV or Parquet.

use super::provider::FetchError;
use super::schema::RmaSchema;
use crate::domain::Source;
use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::io::Write;
use std::path::Path;

pub const ASSET_CODE: &str = "assetCode";
pub const TIMESTAMP: &str = "windowTimestamp";
pub const DATA_TYPE: &str = "dataType";

/// Columns that are identifiers rather than scores.
pub const TEXT_COLUMNS: [&str; 6] = [
    "id",
    ASSET_CODE,
    TIMESTAMP,
    DATA_TYPE,
    "systemVersion",
    "ticker",
];

pub fn is_text_column(name: &str) -> bool {
    TEXT_COLUMNS.contains(&name)
}

/// One cell.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Value {
    Text(String),
    Number(f64),
    Null,
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    fn to_field(&self) -> String {
        match self {
            Value::Text(s) => s.clone(),
            Value::Number(n) => n.to_string(),
            Value::Null => String::new(),
        }
    }
}

/// One observation: an asset's scores for one window.
#[derive(Debug, Clone, PartialEq)]
pub struct RmaRecord {
    pub asset_code: String,
    pub timestamp: NaiveDateTime,
    /// Every cell of the source row, by column name.
    pub values: BTreeMap<String, Value>,
}

impl RmaRecord {
    pub fn data_type(&self) -> Option<&str> {
        self.values.get(DATA_TYPE).and_then(Value::as_str)
    }

    pub fn score(&self, column: &str) -> Option<f64> {
        self.values.get(column).and_then(Value::as_f64)
    }

    pub fn get(&self, column: &str) -> &Value {
        self.values.get(column).unwrap_or(&Value::Null)
    }
}

/// Parsed records plus the column order they were read with.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RmaTable {
    columns: Vec<String>,
    records: Vec<RmaRecord>,
}

/// Parse a provider timestamp (`2023-01-01T00:00:00.000Z`,
/// `2023-01-01 00:00:00` or `2023-01-01`).
pub fn parse_record_timestamp(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.naive_utc());
    }
    for fmt in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .map(|d| d.and_time(NaiveTime::MIN))
}

impl RmaTable {
    /// Parse one tab-separated file. `path` is only used in error messages.
    pub fn parse(path: &str, bytes: &[u8]) -> Result<Self, FetchError> {
        let bytes = bytes.strip_prefix(b"\xEF\xBB\xBF").unwrap_or(bytes);
        let mut reader = csv::ReaderBuilder::new()
            .delimiter(b'\t')
            .has_headers(true)
            .from_reader(bytes);

        let headers = reader
            .headers()
            .map_err(|e| FetchError::parse(path, format!("header: {e}")))?
            .clone();
        let columns: Vec<String> = headers.iter().map(|h| h.trim().to_string()).collect();

        for required in [ASSET_CODE, TIMESTAMP] {
            if !columns.iter().any(|c| c == required) {
                return Err(FetchError::parse(path, format!("missing column '{required}'")));
            }
        }
        for (i, name) in columns.iter().enumerate() {
            if columns[..i].contains(name) {
                return Err(FetchError::parse(path, format!("duplicate column '{name}'")));
            }
        }

        let mut records = Vec::new();
        for (row_idx, row) in reader.records().enumerate() {
            let line = row_idx + 2;
            let row = row.map_err(|e| FetchError::parse(path, format!("line {line}: {e}")))?;

            let mut values = BTreeMap::new();
            for (name, field) in columns.iter().zip(row.iter()) {
                let value = if field.is_empty() {
                    Value::Null
                } else if is_text_column(name) {
                    Value::Text(field.to_string())
                } else {
                    let n: f64 = field.trim().parse().map_err(|_| {
                        FetchError::parse(
                            path,
                            format!("line {line}: column '{name}' is not a number: '{field}'"),
                        )
                    })?;
                    Value::Number(n)
                };
                values.insert(name.clone(), value);
            }

            let asset_code = values
                .get(ASSET_CODE)
                .and_then(Value::as_str)
                .ok_or_else(|| FetchError::parse(path, format!("line {line}: empty {ASSET_CODE}")))?
                .to_string();
            let raw_ts = values
                .get(TIMESTAMP)
                .and_then(Value::as_str)
                .ok_or_else(|| FetchError::parse(path, format!("line {line}: empty {TIMESTAMP}")))?;
            let timestamp = parse_record_timestamp(raw_ts).ok_or_else(|| {
                FetchError::parse(path, format!("line {line}: bad timestamp '{raw_ts}'"))
            })?;

            records.push(RmaRecord {
                asset_code,
                timestamp,
                values,
            });
        }

        Ok(Self { columns, records })
    }

    /// Concatenate tables and order the result by timestamp. The sort is
    /// stable, so rows sharing a timestamp keep their input order.
    ///
    /// Columns are the union of the inputs' in first-seen order; a record
    /// from a file without some column holds `Null` there.
    pub fn concat(tables: impl IntoIterator<Item = RmaTable>) -> Self {
        let mut out = RmaTable::default();
        for table in tables {
            for column in table.columns {
                if !out.columns.contains(&column) {
                    out.columns.push(column);
                }
            }
            out.records.extend(table.records);
        }
        for record in &mut out.records {
            for column in &out.columns {
                if !record.values.contains_key(column) {
                    record.values.insert(column.clone(), Value::Null);
                }
            }
        }
        out.records.sort_by_key(|r| r.timestamp);
        out
    }

    /// Keep only records whose `dataType` is in `sources`. An empty list
    /// keeps everything.
    pub fn retain_sources(&mut self, sources: &[Source]) {
        if sources.is_empty() {
            return;
        }
        self.records
            .retain(|r| Source::admits(sources, r.data_type()));
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn records(&self) -> &[RmaRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Distinct asset codes, sorted.
    pub fn assets(&self) -> Vec<&str> {
        let mut assets: Vec<&str> = self.records.iter().map(|r| r.asset_code.as_str()).collect();
        assets.sort_unstable();
        assets.dedup();
        assets
    }

    /// Score columns (everything that is not an identifier).
    pub fn score_columns(&self) -> Vec<&str> {
        self.columns
            .iter()
            .map(String::as_str)
            .filter(|c| !is_text_column(c))
            .collect()
    }

    /// Write as tab-separated text with a header row.
    pub fn write_tsv<W: Write>(&self, out: W) -> Result<(), FetchError> {
        let mut writer = csv::WriterBuilder::new().delimiter(b'\t').from_writer(out);
        let map_err = |e: csv::Error| FetchError::Table(format!("tsv write: {e}"));
        writer.write_record(&self.columns).map_err(map_err)?;
        for record in &self.records {
            writer
                .write_record(self.columns.iter().map(|c| record.get(c).to_field()))
                .map_err(map_err)?;
        }
        writer
            .flush()
            .map_err(|e| FetchError::Table(format!("tsv flush: {e}")))?;
        Ok(())
    }

    pub fn to_tsv(&self) -> Result<Vec<u8>, FetchError> {
        let mut buf = Vec::new();
        self.write_tsv(&mut buf)?;
        Ok(buf)
    }

    /// Convert to a polars `DataFrame`; `windowTimestamp` becomes a
    /// millisecond datetime column. An empty table still carries the
    /// required columns.
    pub fn to_dataframe(&self) -> Result<DataFrame, FetchError> {
        let map_err = |e: PolarsError| FetchError::Table(format!("dataframe: {e}"));
        let names: Vec<&str> = if self.columns.is_empty() {
            vec![ASSET_CODE, TIMESTAMP]
        } else {
            self.columns.iter().map(String::as_str).collect()
        };
        let mut columns = Vec::with_capacity(names.len());

        for name in names {
            let column = if name == TIMESTAMP {
                let millis: Vec<i64> = self
                    .records
                    .iter()
                    .map(|r| r.timestamp.and_utc().timestamp_millis())
                    .collect();
                Column::new(name.into(), millis)
                    .cast(&DataType::Datetime(TimeUnit::Milliseconds, None))
                    .map_err(map_err)?
            } else if is_text_column(name) {
                let texts: Vec<Option<String>> = self
                    .records
                    .iter()
                    .map(|r| r.get(name).as_str().map(str::to_string))
                    .collect();
                Column::new(name.into(), texts)
            } else {
                let scores: Vec<Option<f64>> =
                    self.records.iter().map(|r| r.score(name)).collect();
                Column::new(name.into(), scores)
            };
            columns.push(column);
        }

        DataFrame::new(columns).map_err(map_err)
    }

    /// Write as Parquet. The frame is checked against [`RmaSchema`], then
    /// written to a `.tmp` sibling and renamed into place.
    pub fn write_parquet(&self, path: &Path) -> Result<(), FetchError> {
        let mut df = self.to_dataframe()?;
        RmaSchema::validate(&df).map_err(|e| FetchError::Table(e.to_string()))?;
        let tmp_path = path.with_extension("parquet.tmp");
        let display = path.display().to_string();

        let file = fs::File::create(&tmp_path).map_err(|e| FetchError::io(&display, e))?;
        ParquetWriter::new(file)
            .finish(&mut df)
            .map_err(|e| FetchError::Table(format!("write parquet: {e}")))?;

        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            FetchError::io(&display, e)
        })?;
        Ok(())
    }
}
