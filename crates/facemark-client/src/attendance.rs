//! Attendance log viewer: fetched records, client-side filter, CSV export.

use crate::api::{Ack, ApiClient, ServerQuery};
use crate::error::ClientError;
use chrono::NaiveDateTime;
use facemark_core::export::{export_csv, export_file_name};
use facemark_core::{AttendanceFilter, AttendanceRecord, NewAttendance, Student};
use std::path::{Path, PathBuf};

pub struct AttendanceLog {
    api: ApiClient,
    records: Vec<AttendanceRecord>,
    students: Vec<Student>,
    filter: AttendanceFilter,
}

impl AttendanceLog {
    pub fn new(api: ApiClient) -> Self {
        Self::with_data(api, Vec::new(), Vec::new())
    }

    fn with_data(api: ApiClient, records: Vec<AttendanceRecord>, students: Vec<Student>) -> Self {
        Self {
            api,
            records,
            students,
            filter: AttendanceFilter::default(),
        }
    }

    /// Fetch attendance and students concurrently.
    pub async fn refresh(&mut self) -> Result<(), ClientError> {
        self.refresh_with(&ServerQuery::default()).await
    }

    /// Same as [`refresh`](Self::refresh) but narrowing on the server first.
    pub async fn refresh_with(&mut self, query: &ServerQuery) -> Result<(), ClientError> {
        let (records, students) =
            tokio::try_join!(self.api.attendance(query), self.api.list_students())?;
        tracing::debug!(records = records.len(), students = students.len(), "attendance refreshed");
        self.records = records;
        self.students = students;
        Ok(())
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn records(&self) -> &[AttendanceRecord] {
        &self.records
    }

    /// Students for the "by student" choice list.
    pub fn students(&self) -> &[Student] {
        &self.students
    }

    pub fn filter(&self) -> &AttendanceFilter {
        &self.filter
    }

    pub fn filter_mut(&mut self) -> &mut AttendanceFilter {
        &mut self.filter
    }

    pub fn set_filter(&mut self, filter: AttendanceFilter) {
        self.filter = filter;
    }

    pub fn clear_filters(&mut self) {
        self.filter.clear();
    }

    /// Records passing the current filter. Recomputed on every call.
    pub fn filtered(&self) -> Vec<&AttendanceRecord> {
        self.filter.apply(&self.records)
    }

    pub fn export_csv(&self) -> Result<String, ClientError> {
        Ok(export_csv(self.filtered())?)
    }

    /// Write the filtered set to `dir`, named after `now`. Returns the path.
    pub async fn export_to(&self, dir: &Path, now: NaiveDateTime) -> Result<PathBuf, ClientError> {
        let filtered = self.filtered();
        let csv = export_csv(filtered.iter().copied())?;
        let path = dir.join(export_file_name(now));
        tokio::fs::write(&path, csv).await?;
        tracing::info!(path = %path.display(), rows = filtered.len(), "attendance exported");
        Ok(path)
    }

    /// Manual mark. Re-fetches on success; a failed re-fetch is logged and
    /// leaves the previous records in place.
    pub async fn mark(&mut self, record: &NewAttendance) -> Result<Ack, ClientError> {
        let ack = self.api.mark_attendance(record).await?;
        tracing::info!(student_id = %record.student_id, status = %record.status, "attendance marked manually");
        if let Err(e) = self.refresh().await {
            tracing::warn!(error = %e, "attendance refresh after mark failed");
        }
        Ok(ack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{route, StubBackend};
    use facemark_core::Status;
    use std::time::Duration;

    fn record(id: i64, student: &str, subject: &str, status: Status) -> AttendanceRecord {
        AttendanceRecord {
            id,
            student_id: student.into(),
            student_name: format!("Student {student}"),
            subject: Some(subject.into()),
            timestamp: "2025-03-03 09:00:00".into(),
            status,
        }
    }

    fn log() -> AttendanceLog {
        let api = ApiClient::new("http://127.0.0.1:9", Duration::from_millis(50)).unwrap();
        AttendanceLog::with_data(
            api,
            vec![
                record(1, "S1", "AI", Status::Present),
                record(2, "S1", "DBMS", Status::Present),
                record(3, "S2", "AI", Status::Late),
            ],
            Vec::new(),
        )
    }

    #[test]
    fn test_filtered_tracks_filter_changes() {
        let mut log = log();
        assert_eq!(log.filtered().len(), 3);

        log.filter_mut().set_subject("AI");
        assert_eq!(log.filtered().len(), 2);

        log.filter_mut().set_status("present").unwrap();
        let ids: Vec<_> = log.filtered().iter().map(|r| r.id).collect();
        assert_eq!(ids, vec![1]);

        log.clear_filters();
        assert_eq!(log.filtered().len(), 3);
    }

    #[test]
    fn test_export_uses_filtered_set() {
        let mut log = log();
        log.filter_mut().set_student_id("S1");
        let csv = log.export_csv().unwrap();
        assert_eq!(csv.lines().count(), 3);
        assert!(!csv.contains("S2"));
    }

    #[tokio::test]
    async fn test_export_to_writes_named_file() {
        let log = log();
        let dir = tempfile::tempdir().unwrap();
        let now = chrono::NaiveDate::from_ymd_opt(2025, 3, 4)
            .unwrap()
            .and_hms_opt(18, 30, 0)
            .unwrap();

        let path = log.export_to(dir.path(), now).await.unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "attendance_export_2025-03-04_18-30-00.csv"
        );
        let written = tokio::fs::read_to_string(&path).await.unwrap();
        assert_eq!(written.lines().count(), 4);
    }

    #[test]
    fn test_export_with_nothing_filtered_is_header_only() {
        let mut log = log();
        log.filter_mut().set_search("nobody");
        let csv = log.export_csv().unwrap();
        assert_eq!(csv.lines().count(), 1);
        assert!(csv.starts_with("ID,Student ID,Student Name"));
    }

    fn manual_mark() -> NewAttendance {
        NewAttendance {
            student_id: "S1".into(),
            student_name: "Student S1".into(),
            timestamp: "2025-03-04 10:15:00".into(),
            status: Status::Late,
        }
    }

    #[tokio::test]
    async fn test_mark_refetches_records_and_students() {
        let stub = StubBackend::start(vec![
            route("POST", "/attendance", 200, r#"{"message": "Attendance marked"}"#),
            route(
                "GET",
                "/attendance",
                200,
                r#"[{"id": 9, "student_id": "S1", "student_name": "Student S1",
                     "subject": null, "timestamp": "2025-03-04 10:15:00", "status": "late"}]"#,
            ),
            route("GET", "/students", 200, r#"[{"id": "S1", "name": "Student S1"}]"#),
        ])
        .await;
        let mut log = AttendanceLog::new(stub.api.clone());

        let ack = log.mark(&manual_mark()).await.unwrap();

        assert_eq!(ack.message, "Attendance marked");
        assert_eq!(stub.hits()[0].json()["status"], "late");
        assert_eq!(log.records().len(), 1);
        assert_eq!(log.records()[0].status, Status::Late);
        assert_eq!(log.students().len(), 1);
    }

    #[tokio::test]
    async fn test_mark_succeeds_when_refetch_fails() {
        let stub = StubBackend::start(vec![
            route("POST", "/attendance", 200, r#"{"message": "Attendance marked"}"#),
            route("GET", "/attendance", 500, r#"{"detail": "db busy"}"#),
            route("GET", "/students", 200, "[]"),
        ])
        .await;
        let mut log = AttendanceLog::with_data(stub.api.clone(), Vec::new(), Vec::new());

        let ack = log.mark(&manual_mark()).await.unwrap();
        assert_eq!(ack.message, "Attendance marked");
        assert!(log.records().is_empty());
    }
}
