//! Raw record ingest (CSV files and JSON scoring requests).
//!
//! Ingest does no coercion at all: every CSV cell becomes `Value::Text`
//! (blank cells included) and the cleaner decides what is numeric. Keeping the
//! raw strings means cleaning policy lives in exactly one place.

use std::fs::File;
use std::path::{Path, PathBuf};

use csv::StringRecord;

use crate::domain::{Record, Value};
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub message: String,
}

/// Ingest output: the header row, the parsed rows and any skipped rows.
#[derive(Debug, Clone)]
pub struct RawTable {
    pub path: PathBuf,
    pub headers: Vec<String>,
    pub records: Vec<Record>,
    pub row_errors: Vec<RowError>,
}

impl RawTable {
    pub fn rows_read(&self) -> usize {
        self.records.len() + self.row_errors.len()
    }
}

/// Read a CSV file with one header row into raw records.
pub fn read_csv(path: &Path) -> Result<RawTable, AppError> {
    let file = File::open(path).map_err(|e| AppError::io(path, format!("failed to open CSV: {e}")))?;
    read_csv_from(file, path)
}

/// Same as [`read_csv`] over any reader; `path` is only used in messages.
pub fn read_csv_from<R: std::io::Read>(reader: R, path: &Path) -> Result<RawTable, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::Headers)
        .from_reader(reader);

    let headers: Vec<String> = reader
        .headers()
        .map_err(|e| AppError::io(path, format!("failed to read CSV headers: {e}")))?
        .iter()
        .map(normalize_header_name)
        .collect();

    if headers.is_empty() || headers.iter().all(|h| h.is_empty()) {
        return Err(AppError::io(path, "CSV has no header row"));
    }

    let mut records = Vec::new();
    let mut row_errors = Vec::new();

    for (idx, result) in reader.records().enumerate() {
        // +2: records() starts after the header and lines are 1-based.
        let line = idx + 2;
        match result {
            Ok(row) => match parse_row(&row, &headers) {
                Ok(record) => records.push(record),
                Err(message) => row_errors.push(RowError { line, message }),
            },
            Err(e) => row_errors.push(RowError {
                line,
                message: format!("CSV parse error: {e}"),
            }),
        }
    }

    if !row_errors.is_empty() {
        tracing::warn!(
            "{}: skipped {} malformed row(s); first at line {}",
            path.display(),
            row_errors.len(),
            row_errors[0].line
        );
    }

    Ok(RawTable {
        path: path.to_path_buf(),
        headers,
        records,
        row_errors,
    })
}

/// Read scoring requests from JSON: either one object or an array of objects.
pub fn read_json_records(path: &Path) -> Result<Vec<Record>, AppError> {
    let file = File::open(path).map_err(|e| AppError::io(path, format!("failed to open JSON: {e}")))?;
    let value: serde_json::Value =
        serde_json::from_reader(file).map_err(|e| AppError::io(path, format!("invalid JSON: {e}")))?;
    match value {
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .map(|(i, item)| {
                serde_json::from_value(item)
                    .map_err(|e| AppError::io(path, format!("record #{}: {e}", i + 1)))
            })
            .collect(),
        other @ serde_json::Value::Object(_) => serde_json::from_value(other)
            .map(|record| vec![record])
            .map_err(|e| AppError::io(path, format!("invalid record: {e}"))),
        _ => Err(AppError::io(path, "expected a JSON object or an array of objects")),
    }
}

/// Read records from `path`, choosing CSV or JSON by extension.
pub fn read_records(path: &Path) -> Result<Vec<Record>, AppError> {
    let is_json = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));
    if is_json {
        read_json_records(path)
    } else {
        read_csv(path).map(|table| table.records)
    }
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a UTF-8 BOM.
    name.trim().trim_start_matches('\u{feff}').to_string()
}

fn parse_row(row: &StringRecord, headers: &[String]) -> Result<Record, String> {
    if row.len() > headers.len() {
        return Err(format!(
            "row has {} fields but the header has {}",
            row.len(),
            headers.len()
        ));
    }
    let mut record = Record::new();
    for (idx, name) in headers.iter().enumerate() {
        let value = match row.get(idx) {
            Some(cell) => Value::Text(cell.to_string()),
            None => Value::Missing,
        };
        record.set(name.clone(), value);
    }
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn reads_blank_cells_as_raw_text() {
        let csv = "\u{feff}customerID,tenure,TotalCharges,Churn\nA-1,0, ,No\nA-2,5,120.5,Yes\n";
        let table = read_csv_from(csv.as_bytes(), Path::new("mem.csv")).unwrap();
        assert_eq!(table.headers[0], "customerID");
        assert_eq!(table.records.len(), 2);
        assert_eq!(table.records[0].text("TotalCharges"), Some(" "));
        assert_eq!(table.records[1].text("tenure"), Some("5"));
    }

    #[test]
    fn short_rows_get_missing_and_long_rows_are_skipped() {
        let csv = "a,b,c\n1,2\n1,2,3,4\n";
        let table = read_csv_from(csv.as_bytes(), Path::new("mem.csv")).unwrap();
        assert_eq!(table.records.len(), 1);
        assert_eq!(table.records[0].get("c"), Some(&Value::Missing));
        assert_eq!(table.row_errors.len(), 1);
        assert_eq!(table.row_errors[0].line, 3);
        assert_eq!(table.rows_read(), 2);
    }

    #[test]
    fn missing_file_is_input_io_error_with_path() {
        let err = read_csv(Path::new("definitely/not/here.csv")).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InputIo);
        assert!(err.message().contains("definitely/not/here.csv"));
    }
}
