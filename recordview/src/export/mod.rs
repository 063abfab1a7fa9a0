use crate::accessor::Field;
use crate::error::{RecordViewError, Result};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};

/// One exported record: column label to stringified value, in column order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExportRow {
    cells: Vec<(String, String)>,
}

impl ExportRow {
    pub fn from_record<T>(record: &T, columns: &[Field<T>]) -> Self {
        ExportRow {
            cells: columns
                .iter()
                .map(|col| (col.label.clone(), col.value(record).to_string()))
                .collect(),
        }
    }

    pub fn cells(&self) -> &[(String, String)] {
        &self.cells
    }

    pub fn get(&self, label: &str) -> Option<&str> {
        self.cells
            .iter()
            .find(|(l, _)| l == label)
            .map(|(_, v)| v.as_str())
    }

    pub fn values(&self) -> impl Iterator<Item = &str> {
        self.cells.iter().map(|(_, v)| v.as_str())
    }
}

impl Serialize for ExportRow {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(self.cells.len()))?;
        for (label, value) in &self.cells {
            map.serialize_entry(label, value)?;
        }
        map.end()
    }
}

/// Build export rows in the order the records are given
pub fn rows<'a, T: 'a, I>(records: I, columns: &[Field<T>]) -> Vec<ExportRow>
where
    I: IntoIterator<Item = &'a T>,
{
    records
        .into_iter()
        .map(|r| ExportRow::from_record(r, columns))
        .collect()
}

/// CSV writer for record subsets. Performs no I/O beyond building the string.
#[derive(Debug, Clone)]
pub struct CsvExporter {
    delimiter: u8,
}

impl Default for CsvExporter {
    fn default() -> Self {
        CsvExporter { delimiter: b',' }
    }
}

impl CsvExporter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn delimiter(mut self, delimiter: u8) -> Self {
        self.delimiter = delimiter;
        self
    }

    /// Header of column labels, then one line per record. Fields holding the
    /// delimiter, a quote or a line break are quoted with inner quotes doubled.
    pub fn serialize<'a, T: 'a, I>(&self, records: I, columns: &[Field<T>]) -> Result<String>
    where
        I: IntoIterator<Item = &'a T>,
    {
        if columns.is_empty() {
            return Err(RecordViewError::Export("no columns selected".into()));
        }

        let mut writer = csv::WriterBuilder::new()
            .delimiter(self.delimiter)
            .quote_style(csv::QuoteStyle::Necessary)
            .terminator(csv::Terminator::Any(b'\n'))
            .from_writer(Vec::new());

        writer.write_record(columns.iter().map(|c| c.label.as_str()))?;
        let mut count = 0usize;
        for record in records {
            writer.write_record(columns.iter().map(|c| c.value(record).to_string()))?;
            count += 1;
        }

        let bytes = writer
            .into_inner()
            .map_err(|e| RecordViewError::Export(e.to_string()))?;
        log::debug!("Exported {count} records across {} columns", columns.len());
        String::from_utf8(bytes).map_err(|e| RecordViewError::Export(e.to_string()))
    }
}

/// Serialize with the default comma delimiter
pub fn serialize<'a, T: 'a, I>(records: I, columns: &[Field<T>]) -> Result<String>
where
    I: IntoIterator<Item = &'a T>,
{
    CsvExporter::default().serialize(records, columns)
}
