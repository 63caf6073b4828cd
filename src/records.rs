//! Record store adapter: reads raw message rows from CSV or JSON lines.
//!
//! CSV input must have a header row containing `sessionid`, `group`,
//! `period`, `N`, and `message`; other columns are ignored. Empty cells are
//! read as absent values. `N` is carried as text, unparsed. JSON-lines input
//! holds one object per line with the same keys; string, number, or boolean
//! values are accepted and kept in their textual form.

use anyhow::{Context, Result};
use std::fs::File;
use std::io::{BufRead, BufReader, Read};
use std::path::Path;

use convo_topics_core::models::RawRecord;

use crate::config::InputFormat;

pub const COL_SESSION: &str = "sessionid";
pub const COL_GROUP: &str = "group";
pub const COL_PERIOD: &str = "period";
pub const COL_SEQUENCE: &str = "N";
pub const COL_MESSAGE: &str = "message";

const REQUIRED_COLUMNS: [&str; 5] = [COL_SESSION, COL_GROUP, COL_PERIOD, COL_SEQUENCE, COL_MESSAGE];

/// Read every row of `path` in file order.
pub fn read_records(path: &Path, format: InputFormat) -> Result<Vec<RawRecord>> {
    let file = File::open(path)
        .with_context(|| format!("Failed to open input file: {}", path.display()))?;
    let records = match format {
        InputFormat::Csv => parse_csv(file),
        InputFormat::Jsonl => parse_jsonl(BufReader::new(file)),
    }
    .with_context(|| format!("Failed to read records from {}", path.display()))?;

    tracing::info!(path = %path.display(), rows = records.len(), "read input records");
    Ok(records)
}

/// Parse CSV with a header row.
pub fn parse_csv<R: Read>(reader: R) -> Result<Vec<RawRecord>> {
    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(false)
        .from_reader(reader);

    let headers = rdr.headers().context("Failed to read CSV header")?.clone();
    let position = |name: &str| headers.iter().position(|h| h.trim() == name);

    let missing: Vec<&str> = REQUIRED_COLUMNS
        .iter()
        .copied()
        .filter(|c| position(c).is_none())
        .collect();
    if !missing.is_empty() {
        anyhow::bail!("Input is missing required column(s): {}", missing.join(", "));
    }
    let idx = |name: &str| position(name).unwrap_or_default();
    let (session, group, period, sequence, message) = (
        idx(COL_SESSION),
        idx(COL_GROUP),
        idx(COL_PERIOD),
        idx(COL_SEQUENCE),
        idx(COL_MESSAGE),
    );

    let mut records = Vec::new();
    for (i, row) in rdr.records().enumerate() {
        let row_num = i + 1;
        let row = row.with_context(|| format!("Malformed CSV at data row {}", row_num))?;
        let cell = |col: usize| row.get(col).filter(|v| !v.is_empty()).map(str::to_string);
        records.push(RawRecord {
            session_id: cell(session),
            group: cell(group),
            period: cell(period),
            sequence: cell(sequence),
            message: cell(message),
        });
    }
    Ok(records)
}

/// Parse JSON lines; blank lines are skipped but still counted for row numbers.
pub fn parse_jsonl<R: BufRead>(reader: R) -> Result<Vec<RawRecord>> {
    let mut records = Vec::new();
    for (i, line) in reader.lines().enumerate() {
        let row_num = i + 1;
        let line = line.with_context(|| format!("Failed to read line {}", row_num))?;
        if line.trim().is_empty() {
            continue;
        }
        let value: serde_json::Value = serde_json::from_str(&line)
            .with_context(|| format!("Invalid JSON on line {}", row_num))?;
        let obj = value
            .as_object()
            .ok_or_else(|| anyhow::anyhow!("Line {} is not a JSON object", row_num))?;

        records.push(RawRecord {
            session_id: scalar(obj.get(COL_SESSION)),
            group: scalar(obj.get(COL_GROUP)),
            period: scalar(obj.get(COL_PERIOD)),
            sequence: scalar(obj.get(COL_SEQUENCE)),
            message: scalar(obj.get(COL_MESSAGE)),
        });
    }
    Ok(records)
}

fn scalar(value: Option<&serde_json::Value>) -> Option<String> {
    match value? {
        serde_json::Value::String(s) if !s.is_empty() => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        _ => None,
    }
}
