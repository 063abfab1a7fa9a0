// Record files - read JSON, JSON Lines, YAML or CSV into dynamic records

use crate::error::{RecordViewError, Result};
use std::path::Path;

/// Supported record file formats
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordFormat {
    Json,
    JsonLines,
    Yaml,
    Csv,
}

impl RecordFormat {
    /// Pick the format from a file extension
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension().and_then(|e| e.to_str()) {
            Some("json") => Some(RecordFormat::Json),
            Some("jsonl") | Some("ndjson") => Some(RecordFormat::JsonLines),
            Some("yaml") | Some("yml") => Some(RecordFormat::Yaml),
            Some("csv") => Some(RecordFormat::Csv),
            _ => None,
        }
    }
}

/// Load every record from a file, choosing the parser from its extension.
pub fn load_records(path: &Path) -> Result<Vec<serde_json::Value>> {
    let format = RecordFormat::from_path(path).ok_or_else(|| {
        RecordViewError::Other(format!(
            "Unsupported record file extension: {}",
            path.display()
        ))
    })?;
    let content = std::fs::read_to_string(path)?;
    let records = parse_records(&content, format)?;
    log::debug!("Loaded {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Parse records from text in the given format.
///
/// JSON and YAML documents must be a sequence of records, or a mapping with a
/// `records` sequence. JSON Lines skips blank lines and logs malformed ones.
/// CSV rows become objects keyed by the header row, with every value a string.
pub fn parse_records(content: &str, format: RecordFormat) -> Result<Vec<serde_json::Value>> {
    match format {
        RecordFormat::Json => unwrap_sequence(serde_json::from_str(content)?),
        RecordFormat::Yaml => unwrap_sequence(serde_yaml::from_str(content)?),
        RecordFormat::JsonLines => Ok(parse_json_lines(content)),
        RecordFormat::Csv => parse_csv(content),
    }
}

fn unwrap_sequence(document: serde_json::Value) -> Result<Vec<serde_json::Value>> {
    match document {
        serde_json::Value::Array(items) => Ok(items),
        serde_json::Value::Object(mut map) => match map.remove("records") {
            Some(serde_json::Value::Array(items)) => Ok(items),
            _ => Err(RecordViewError::Other(
                "Record document must be a list or contain a 'records' list".into(),
            )),
        },
        serde_json::Value::Null => Ok(Vec::new()),
        _ => Err(RecordViewError::Other(
            "Record document must be a list of records".into(),
        )),
    }
}

fn parse_json_lines(content: &str) -> Vec<serde_json::Value> {
    let mut records = Vec::new();
    for (number, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        match serde_json::from_str(line) {
            Ok(record) => records.push(record),
            Err(e) => log::warn!("Skipping malformed record on line {}: {e}", number + 1),
        }
    }
    records
}

fn parse_csv(content: &str) -> Result<Vec<serde_json::Value>> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(content.as_bytes());
    let headers = reader.headers()?.clone();

    let mut records = Vec::new();
    for row in reader.records() {
        let row = row?;
        let object: serde_json::Map<String, serde_json::Value> = headers
            .iter()
            .zip(row.iter())
            .map(|(key, value)| (key.to_string(), serde_json::Value::String(value.to_string())))
            .collect();
        records.push(serde_json::Value::Object(object));
    }
    Ok(records)
}
