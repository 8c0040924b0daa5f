use chrono::{DateTime, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

/// Identity value the backend returns when no enrolled face matched.
pub const UNKNOWN: &str = "Unknown";

#[derive(Error, Debug, Clone, PartialEq)]
pub enum CoreError {
    #[error("tolerance {0} outside [{min}, {max}]", min = Tolerance::MIN, max = Tolerance::MAX)]
    ToleranceOutOfRange(f32),
    #[error("unknown attendance status: {0}")]
    UnknownStatus(String),
    #[error("invalid date: {0} (expected YYYY-MM-DD)")]
    InvalidDate(String),
    #[error("csv export failed: {0}")]
    Export(String),
}

/// Face-matching strictness sent with every recognition call.
///
/// Lower is stricter. Only values in `[0.1, 1.0]` can be constructed.
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(try_from = "f32", into = "f32")]
pub struct Tolerance(f32);

impl Tolerance {
    pub const MIN: f32 = 0.1;
    pub const MAX: f32 = 1.0;
    /// Slider granularity.
    pub const STEP: f32 = 0.05;

    pub fn new(value: f32) -> Result<Self, CoreError> {
        if value.is_finite() && (Self::MIN..=Self::MAX).contains(&value) {
            Ok(Self(value))
        } else {
            Err(CoreError::ToleranceOutOfRange(value))
        }
    }

    /// Clamp an arbitrary value into range. NaN maps to the default.
    pub fn clamped(value: f32) -> Self {
        if value.is_nan() {
            return Self::default();
        }
        Self(value.clamp(Self::MIN, Self::MAX))
    }

    pub fn value(self) -> f32 {
        self.0
    }

    /// Next slider position up, saturating at the maximum.
    pub fn step_up(self) -> Self {
        Self::clamped(Self::snap(self.0) + Self::STEP)
    }

    /// Next slider position down, saturating at the minimum.
    pub fn step_down(self) -> Self {
        Self::clamped(Self::snap(self.0) - Self::STEP)
    }

    fn snap(value: f32) -> f32 {
        (value / Self::STEP).round() * Self::STEP
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self(0.5)
    }
}

impl TryFrom<f32> for Tolerance {
    type Error = CoreError;

    fn try_from(value: f32) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Tolerance> for f32 {
    fn from(t: Tolerance) -> Self {
        t.0
    }
}

impl FromStr for Tolerance {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let value: f32 = s
            .trim()
            .parse()
            .map_err(|_| CoreError::ToleranceOutOfRange(f32::NAN))?;
        Self::new(value)
    }
}

impl fmt::Display for Tolerance {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.2}", self.0)
    }
}

/// A student record as stored by the backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Student {
    pub id: String,
    pub name: String,
    /// Base64-encoded JPEG photo.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub image: Option<String>,
    /// Position in the backend's encoding database.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idx: Option<i64>,
}

impl Student {
    /// Case-insensitive substring match on name or id. `needle` must already be lowercase.
    pub fn matches_search(&self, needle: &str) -> bool {
        self.name.to_lowercase().contains(needle) || self.id.to_lowercase().contains(needle)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Status {
    Present,
    Absent,
    Late,
}

impl Status {
    pub const ALL: [Status; 3] = [Status::Present, Status::Absent, Status::Late];

    pub fn as_str(self) -> &'static str {
        match self {
            Status::Present => "present",
            Status::Absent => "absent",
            Status::Late => "late",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Status {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "present" => Ok(Status::Present),
            "absent" => Ok(Status::Absent),
            "late" => Ok(Status::Late),
            other => Err(CoreError::UnknownStatus(other.to_string())),
        }
    }
}

/// One row of the attendance log. Read-only on the client.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AttendanceRecord {
    pub id: i64,
    pub student_id: String,
    pub student_name: String,
    #[serde(default)]
    pub subject: Option<String>,
    /// Raw timestamp text as returned by the backend.
    pub timestamp: String,
    pub status: Status,
}

impl AttendanceRecord {
    /// Parse the timestamp. Accepts SQLite `YYYY-MM-DD HH:MM:SS`, ISO 8601
    /// without offset, and RFC 3339 (converted to naive UTC).
    pub fn recorded_at(&self) -> Option<NaiveDateTime> {
        parse_timestamp(&self.timestamp)
    }
}

pub fn parse_timestamp(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    ["%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M:%S%.f"]
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(raw, fmt).ok())
}

/// Body of the manual mark path (`POST /attendance`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NewAttendance {
    pub student_id: String,
    pub student_name: String,
    pub timestamp: String,
    pub status: Status,
}

/// Result of one recognition call. Not persisted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecognitionResult {
    pub name: String,
    pub id: String,
    /// Base64 JPEG of the annotated frame.
    #[serde(default)]
    pub image: String,
}

impl RecognitionResult {
    /// True when the backend resolved an identity (neither field is the sentinel).
    pub fn is_match(&self) -> bool {
        self.name != UNKNOWN && self.id != UNKNOWN
    }
}
