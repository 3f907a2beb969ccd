use crate::value::DynamicRecord;
use anyhow::{Context, Result};
use std::io::Write;

/// Writes flattened records as CSV rows.
///
/// The header is fixed by the first batch: preset columns first, then every
/// other column in first-seen order. Missing and null cells are written empty.
pub struct CsvRecordWriter<W: Write> {
    writer: csv::Writer<W>,
    columns: Vec<String>,
    header_written: bool,
}

impl<W: Write> CsvRecordWriter<W> {
    pub fn new(writer: W) -> Self {
        CsvRecordWriter {
            writer: csv::Writer::from_writer(writer),
            columns: Vec::new(),
            header_written: false,
        }
    }

    /// Start the header with these columns, e.g. the declared output names
    pub fn with_columns(mut self, columns: Vec<String>) -> Self {
        self.columns = columns;
        self
    }

    pub fn write_records(&mut self, records: &[DynamicRecord]) -> Result<()> {
        if !self.header_written {
            for record in records {
                for key in record.keys() {
                    if !self.columns.iter().any(|c| c == key) {
                        self.columns.push(key.to_string());
                    }
                }
            }
            self.writer
                .write_record(&self.columns)
                .context("Failed to write CSV header")?;
            self.header_written = true;
        }

        for record in records {
            let row: Vec<String> = self
                .columns
                .iter()
                .map(|c| record.get(c).map(|v| v.render()).unwrap_or_default())
                .collect();
            self.writer
                .write_record(&row)
                .context("Failed to write CSV row")?;
        }
        Ok(())
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }
}

/// Writes one JSON object per record, preserving column order
pub struct JsonLinesWriter<W: Write> {
    writer: W,
}

impl<W: Write> JsonLinesWriter<W> {
    pub fn new(writer: W) -> Self {
        JsonLinesWriter { writer }
    }

    pub fn write_records(&mut self, records: &[DynamicRecord]) -> Result<()> {
        for record in records {
            let json = serde_json::to_string(record)
                .context("Failed to serialize record")?;
            writeln!(self.writer, "{}", json)
                .context("Failed to write record")?;
        }
        Ok(())
    }

    pub fn flush(&mut self) -> Result<()> {
        self.writer.flush().context("Failed to flush writer")
    }
}
