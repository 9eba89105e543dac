//! CSV exports: scored predictions and raw record tables.
//!
//! Both are meant to be easy to consume in spreadsheets or downstream scripts.

use std::path::Path;

use crate::domain::{PredictionResult, Record, Value};
use crate::error::AppError;

/// Write one row per scored record: `customer_id,churn_probability,risk_category`.
pub fn write_predictions_csv(path: &Path, rows: &[(String, PredictionResult)]) -> Result<(), AppError> {
    let mut writer = csv::Writer::from_path(path)
        .map_err(|e| AppError::io(path, format!("failed to create export CSV: {e}")))?;

    writer
        .write_record(["customer_id", "churn_probability", "risk_category"])
        .map_err(|e| AppError::io(path, format!("failed to write export CSV header: {e}")))?;

    for (id, result) in rows {
        writer
            .write_record([
                id.as_str(),
                &format!("{:.6}", result.churn_probability),
                result.risk_category.as_str(),
            ])
            .map_err(|e| AppError::io(path, format!("failed to write export CSV row: {e}")))?;
    }

    writer
        .flush()
        .map_err(|e| AppError::io(path, format!("failed to flush export CSV: {e}")))?;
    Ok(())
}

/// Write records as CSV with `columns` as the header; absent and missing cells
/// are written empty.
pub fn write_records_csv(path: &Path, columns: &[&str], records: &[Record]) -> Result<(), AppError> {
    if let Some(dir) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir)
            .map_err(|e| AppError::io(dir, format!("failed to create output directory: {e}")))?;
    }
    let mut writer =
        csv::Writer::from_path(path).map_err(|e| AppError::io(path, format!("failed to create CSV: {e}")))?;

    writer
        .write_record(columns)
        .map_err(|e| AppError::io(path, format!("failed to write CSV header: {e}")))?;

    for record in records {
        let cells: Vec<String> = columns
            .iter()
            .map(|col| match record.get(col) {
                Some(Value::Missing) | None => String::new(),
                Some(v) => v.to_string(),
            })
            .collect();
        writer
            .write_record(&cells)
            .map_err(|e| AppError::io(path, format!("failed to write CSV row: {e}")))?;
    }

    writer.flush().map_err(|e| AppError::io(path, format!("failed to flush CSV: {e}")))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::io::ingest::read_csv;

    #[test]
    fn predictions_csv_has_fixed_header() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("scores.csv");
        let rows = vec![
            ("A-1".to_string(), PredictionResult::from_probability(0.75)),
            ("A-2".to_string(), PredictionResult::from_probability(0.1)),
        ];
        write_predictions_csv(&path, &rows).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "customer_id,churn_probability,risk_category");
        assert_eq!(lines[1], "A-1,0.750000,HIGH");
        assert_eq!(lines[2], "A-2,0.100000,LOW");
    }

    #[test]
    fn records_round_trip_through_ingest_as_text() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").join("rows.csv");
        let records = vec![
            Record::new()
                .with("id", Value::Text("x".into()))
                .with("TotalCharges", Value::Text(" ".into())),
        ];
        write_records_csv(&path, &["id", "TotalCharges", "absent"], &records).unwrap();
        let table = read_csv(&path).unwrap();
        assert_eq!(table.headers, vec!["id", "TotalCharges", "absent"]);
        assert_eq!(table.records[0].text("TotalCharges"), Some(" "));
        assert_eq!(table.records[0].text("absent"), Some(""));
    }
}
