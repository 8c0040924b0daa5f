//! CSV export of attendance records.
//!
//! The header is fixed. Data rows quote every field so student names with
//! embedded commas or quotes survive a round trip.

use crate::types::{AttendanceRecord, CoreError};
use chrono::NaiveDateTime;
use csv::{QuoteStyle, ReaderBuilder, Terminator, WriterBuilder};

pub const HEADER: [&str; 6] = ["ID", "Student ID", "Student Name", "Subject", "Date & Time", "Status"];

/// Written in the subject column when a record has none.
pub const NO_SUBJECT: &str = "N/A";

/// Serialize records to CSV text: header line plus one line per record.
pub fn export_csv<'a, I>(records: I) -> Result<String, CoreError>
where
    I: IntoIterator<Item = &'a AttendanceRecord>,
{
    let mut header = WriterBuilder::new()
        .quote_style(QuoteStyle::Necessary)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(Vec::new());
    header.write_record(HEADER).map_err(export_err)?;
    let buf = header.into_inner().map_err(|e| CoreError::Export(e.to_string()))?;

    let mut rows = WriterBuilder::new()
        .quote_style(QuoteStyle::Always)
        .terminator(Terminator::Any(b'\n'))
        .from_writer(buf);
    let mut count = 0usize;
    for record in records {
        let id = record.id.to_string();
        rows.write_record([
            id.as_str(),
            record.student_id.as_str(),
            record.student_name.as_str(),
            record.subject.as_deref().unwrap_or(NO_SUBJECT),
            record.timestamp.as_str(),
            record.status.as_str(),
        ])
        .map_err(export_err)?;
        count += 1;
    }
    let bytes = rows.into_inner().map_err(|e| CoreError::Export(e.to_string()))?;

    tracing::debug!(rows = count, bytes = bytes.len(), "attendance exported");
    String::from_utf8(bytes).map_err(|e| CoreError::Export(e.to_string()))
}

/// Export file name embedding the date and time, e.g.
/// `attendance_export_2025-03-04_09-15-00.csv`.
pub fn export_file_name(now: NaiveDateTime) -> String {
    format!("attendance_export_{}.csv", now.format("%Y-%m-%d_%H-%M-%S"))
}

/// Read an export back into its six string fields per row (header skipped).
pub fn read_export(text: &str) -> Result<Vec<[String; 6]>, CoreError> {
    let mut reader = ReaderBuilder::new()
        .has_headers(true)
        .from_reader(text.as_bytes());

    let headers = reader.headers().map_err(export_err)?;
    if headers.iter().ne(HEADER.iter().copied()) {
        return Err(CoreError::Export(format!("unexpected header: {headers:?}")));
    }

    reader
        .records()
        .map(|row| {
            let row = row.map_err(export_err)?;
            if row.len() != HEADER.len() {
                return Err(CoreError::Export(format!(
                    "expected {} fields, got {}",
                    HEADER.len(),
                    row.len()
                )));
            }
            Ok(std::array::from_fn(|i| row[i].to_string()))
        })
        .collect()
}

fn export_err(e: csv::Error) -> CoreError {
    CoreError::Export(e.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Status;
    use chrono::NaiveDate;

    fn records() -> Vec<AttendanceRecord> {
        vec![
            AttendanceRecord {
                id: 1,
                student_id: "S1".into(),
                student_name: "Rao, Asha".into(),
                subject: Some("AI".into()),
                timestamp: "2025-03-03 09:05:00".into(),
                status: Status::Present,
            },
            AttendanceRecord {
                id: 2,
                student_id: "S2".into(),
                student_name: "Ravi \"RK\" Kumar".into(),
                subject: None,
                timestamp: "2025-03-03 10:02:00".into(),
                status: Status::Late,
            },
        ]
    }

    #[test]
    fn test_header_and_line_count() {
        let data = records();
        let csv = export_csv(&data).unwrap();
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), data.len() + 1);
        assert_eq!(lines[0], "ID,Student ID,Student Name,Subject,Date & Time,Status");
        assert!(lines[1].contains("\"Rao, Asha\""));
    }

    #[test]
    fn test_empty_export_is_header_only() {
        let csv = export_csv(&[]).unwrap();
        assert_eq!(csv, "ID,Student ID,Student Name,Subject,Date & Time,Status\n");
    }

    #[test]
    fn test_round_trip_reconstructs_fields() {
        let data = records();
        let csv = export_csv(&data).unwrap();
        let rows = read_export(&csv).unwrap();
        assert_eq!(rows.len(), data.len());

        for (row, record) in rows.iter().zip(&data) {
            assert_eq!(row[0], record.id.to_string());
            assert_eq!(row[1], record.student_id);
            assert_eq!(row[2], record.student_name);
            assert_eq!(row[3], record.subject.as_deref().unwrap_or(NO_SUBJECT));
            assert_eq!(row[4], record.timestamp);
            assert_eq!(row[5], record.status.as_str());
        }
    }

    #[test]
    fn test_file_name_embeds_date_and_time() {
        let now = NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_opt(9, 15, 7)
            .unwrap();
        assert_eq!(export_file_name(now), "attendance_export_2025-03-04_09-15-07.csv");
    }

    #[test]
    fn test_read_export_rejects_foreign_header() {
        assert!(read_export("a,b,c\n1,2,3\n").is_err());
    }
}
