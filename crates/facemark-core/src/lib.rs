//! facemark-core: Attendance data model and client-side logic.
//!
//! Holds the types exchanged with the recognition backend, the
//! per-session recognized-set used to suppress duplicate notifications,
//! and the attendance filter and CSV export applied to fetched logs.

pub mod catalog;
pub mod export;
pub mod filter;
pub mod session;
pub mod types;

pub use catalog::{ClassSession, Slot, Subject};
pub use filter::AttendanceFilter;
pub use session::{Observation, RecognitionSession};
pub use types::{
    AttendanceRecord, CoreError, NewAttendance, RecognitionResult, Status, Student, Tolerance,
};
