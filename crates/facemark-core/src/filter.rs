//! Compound attendance filter.
//!
//! Every criterion is optional; a record passes when it satisfies all set
//! criteria. Empty input and the `"all"` choice leave a criterion unset.

use crate::types::{AttendanceRecord, CoreError, Status};
use chrono::{Days, NaiveDate, NaiveDateTime, NaiveTime};
use serde::{Deserialize, Serialize};

/// Choice value meaning "no restriction" in select-style inputs.
pub const ALL: &str = "all";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AttendanceFilter {
    pub start_date: Option<NaiveDate>,
    /// Inclusive through 23:59:59 of this day.
    pub end_date: Option<NaiveDate>,
    pub student_id: Option<String>,
    pub status: Option<Status>,
    pub subject: Option<String>,
    /// Case-insensitive substring on student name or id.
    pub search: Option<String>,
}

fn unset(raw: &str) -> bool {
    let raw = raw.trim();
    raw.is_empty() || raw.eq_ignore_ascii_case(ALL)
}

fn text(raw: &str) -> Option<String> {
    (!unset(raw)).then(|| raw.trim().to_string())
}

pub fn parse_date(raw: &str) -> Result<Option<NaiveDate>, CoreError> {
    if raw.trim().is_empty() {
        return Ok(None);
    }
    NaiveDate::parse_from_str(raw.trim(), "%Y-%m-%d")
        .map(Some)
        .map_err(|_| CoreError::InvalidDate(raw.to_string()))
}

impl AttendanceFilter {
    pub fn set_start_date(&mut self, raw: &str) -> Result<(), CoreError> {
        self.start_date = parse_date(raw)?;
        Ok(())
    }

    pub fn set_end_date(&mut self, raw: &str) -> Result<(), CoreError> {
        self.end_date = parse_date(raw)?;
        Ok(())
    }

    pub fn set_student_id(&mut self, raw: &str) {
        self.student_id = text(raw);
    }

    pub fn set_status(&mut self, raw: &str) -> Result<(), CoreError> {
        self.status = if unset(raw) { None } else { Some(raw.parse()?) };
        Ok(())
    }

    pub fn set_subject(&mut self, raw: &str) {
        self.subject = text(raw);
    }

    /// Search text is matched as typed; only surrounding whitespace is kept out.
    pub fn set_search(&mut self, raw: &str) {
        self.search = (!raw.trim().is_empty()).then(|| raw.trim().to_string());
    }

    pub fn clear(&mut self) {
        *self = Self::default();
    }

    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }

    pub fn matches(&self, record: &AttendanceRecord) -> bool {
        if self.start_date.is_some() || self.end_date.is_some() {
            let Some(at) = record.recorded_at() else {
                return false;
            };
            if let Some(start) = self.start_date {
                if at < start_of(start) {
                    return false;
                }
            }
            if let Some(end) = self.end_date {
                if !before_next_day(at, end) {
                    return false;
                }
            }
        }

        if let Some(id) = &self.student_id {
            if &record.student_id != id {
                return false;
            }
        }

        if let Some(status) = self.status {
            if record.status != status {
                return false;
            }
        }

        if let Some(subject) = &self.subject {
            if record.subject.as_deref() != Some(subject.as_str()) {
                return false;
            }
        }

        if let Some(search) = &self.search {
            let needle = search.to_lowercase();
            if !record.student_name.to_lowercase().contains(&needle)
                && !record.student_id.to_lowercase().contains(&needle)
            {
                return false;
            }
        }

        true
    }

    /// Records passing the filter, in input order.
    pub fn apply<'a>(&self, records: &'a [AttendanceRecord]) -> Vec<&'a AttendanceRecord> {
        records.iter().filter(|r| self.matches(r)).collect()
    }
}

fn start_of(day: NaiveDate) -> NaiveDateTime {
    day.and_time(NaiveTime::MIN)
}

fn before_next_day(at: NaiveDateTime, day: NaiveDate) -> bool {
    match day.checked_add_days(Days::new(1)) {
        Some(next) => at < start_of(next),
        None => true,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(id: i64, student: &str, name: &str, subject: &str, ts: &str, status: Status) -> AttendanceRecord {
        AttendanceRecord {
            id,
            student_id: student.into(),
            student_name: name.into(),
            subject: (!subject.is_empty()).then(|| subject.to_string()),
            timestamp: ts.into(),
            status,
        }
    }

    fn dataset() -> Vec<AttendanceRecord> {
        vec![
            record(1, "S1", "Asha Rao", "AI", "2025-03-03 09:05:00", Status::Present),
            record(2, "S2", "Ravi Kumar", "DBMS", "2025-03-03 10:02:00", Status::Present),
            record(3, "S1", "Asha Rao", "DBMS", "2025-03-04 23:59:30", Status::Late),
            record(4, "S3", "Priya, N.", "AI", "2025-03-05 00:00:00", Status::Absent),
            record(5, "S2", "Ravi Kumar", "", "2025-03-05T14:00:00", Status::Present),
            record(6, "S4", "Broken", "AI", "not a date", Status::Present),
        ]
    }

    fn ids(records: &[&AttendanceRecord]) -> Vec<i64> {
        records.iter().map(|r| r.id).collect()
    }

    #[test]
    fn test_status_and_subject_example() {
        let records = vec![
            record(1, "S1", "Asha", "AI", "2025-03-03 09:00:00", Status::Present),
            record(2, "S1", "Asha", "DBMS", "2025-03-03 10:00:00", Status::Present),
        ];
        let mut filter = AttendanceFilter::default();
        filter.set_status("present").unwrap();
        filter.set_subject("AI");
        assert_eq!(ids(&filter.apply(&records)), vec![1]);
    }

    #[test]
    fn test_empty_filter_keeps_everything() {
        let data = dataset();
        let filter = AttendanceFilter::default();
        assert!(filter.is_empty());
        assert_eq!(filter.apply(&data).len(), data.len());
    }

    #[test]
    fn test_all_sentinel_is_unset() {
        let mut filter = AttendanceFilter::default();
        filter.set_status("all").unwrap();
        filter.set_subject("all");
        filter.set_student_id("ALL");
        assert!(filter.is_empty());
    }

    #[test]
    fn test_end_date_is_inclusive_through_end_of_day() {
        let data = dataset();
        let mut filter = AttendanceFilter::default();
        filter.set_end_date("2025-03-04").unwrap();
        assert_eq!(ids(&filter.apply(&data)), vec![1, 2, 3]);
    }

    #[test]
    fn test_date_range_excludes_unparseable_timestamps() {
        let data = dataset();
        let mut filter = AttendanceFilter::default();
        filter.set_start_date("2025-03-04").unwrap();
        assert_eq!(ids(&filter.apply(&data)), vec![3, 4, 5]);
    }

    #[test]
    fn test_search_matches_name_or_id_case_insensitive() {
        let data = dataset();
        let mut filter = AttendanceFilter::default();
        filter.set_search("ASHA");
        assert_eq!(ids(&filter.apply(&data)), vec![1, 3]);
        filter.set_search("s3");
        assert_eq!(ids(&filter.apply(&data)), vec![4]);
    }

    #[test]
    fn test_invalid_inputs_rejected() {
        let mut filter = AttendanceFilter::default();
        assert!(filter.set_start_date("03/04/2025").is_err());
        assert!(filter.set_status("excused").is_err());
    }

    /// Every combination of criteria yields exactly the records satisfying all
    /// of them, and adding a criterion never grows the result.
    #[test]
    fn test_conjunction_is_exact_and_monotonic() {
        let data = dataset();
        let mut full = AttendanceFilter::default();
        full.set_start_date("2025-03-03").unwrap();
        full.set_end_date("2025-03-05").unwrap();
        full.set_student_id("S1");
        full.set_status("present").unwrap();
        full.set_subject("AI");
        full.set_search("asha");

        let single = |bit: u32| {
            let mut f = AttendanceFilter::default();
            match bit {
                0 => f.start_date = full.start_date,
                1 => f.end_date = full.end_date,
                2 => f.student_id = full.student_id.clone(),
                3 => f.status = full.status,
                4 => f.subject = full.subject.clone(),
                _ => f.search = full.search.clone(),
            }
            f
        };
        let combine = |mask: u32| {
            let mut f = AttendanceFilter::default();
            for bit in 0..6 {
                if mask & (1 << bit) != 0 {
                    let s = single(bit);
                    f.start_date = f.start_date.or(s.start_date);
                    f.end_date = f.end_date.or(s.end_date);
                    f.student_id = f.student_id.or(s.student_id);
                    f.status = f.status.or(s.status);
                    f.subject = f.subject.or(s.subject);
                    f.search = f.search.or(s.search);
                }
            }
            f
        };

        for mask in 0u32..64 {
            let filter = combine(mask);
            let got = ids(&filter.apply(&data));
            let expected: Vec<i64> = data
                .iter()
                .filter(|r| (0..6).all(|bit| mask & (1 << bit) == 0 || single(bit).matches(r)))
                .map(|r| r.id)
                .collect();
            assert_eq!(got, expected, "mask {mask:06b}");

            for bit in 0..6 {
                let narrower = combine(mask | (1 << bit));
                let narrowed = ids(&narrower.apply(&data));
                assert!(narrowed.len() <= got.len());
                assert!(narrowed.iter().all(|id| got.contains(id)));
            }
        }
    }
}
