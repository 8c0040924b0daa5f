//! Per-run recognition state: which students have already been confirmed.
//!
//! The recognized-set only suppresses repeated notifications on the client.
//! The backend still logs a row for every successful recognition call.

use crate::catalog::ClassSession;
use crate::types::RecognitionResult;
use std::collections::HashSet;
use std::time::{Duration, Instant};

/// How long the "Attendance Marked" confirmation stays visible.
pub const SUCCESS_FLASH: Duration = Duration::from_secs(3);

/// What a single recognition result meant for this session.
#[derive(Debug, Clone, PartialEq)]
pub enum Observation {
    /// First confirmation of this student in the session.
    Marked(RecognitionResult),
    /// Student was already confirmed earlier in the session.
    AlreadyMarked(RecognitionResult),
    /// Backend returned the unknown sentinel.
    Unknown,
}

#[derive(Debug, Clone, Default)]
pub struct RecognitionSession {
    class: ClassSession,
    recognized: HashSet<String>,
    /// Insertion order, for summaries.
    order: Vec<RecognitionResult>,
    flash_until: Option<Instant>,
    ticks: u64,
    errors: u64,
}

impl RecognitionSession {
    pub fn new(class: ClassSession) -> Self {
        Self {
            class,
            ..Self::default()
        }
    }

    pub fn class(&self) -> &ClassSession {
        &self.class
    }

    /// Clear the recognized-set and counters for a new run, keeping the class.
    pub fn restart(&mut self) {
        tracing::debug!(cleared = self.recognized.len(), "recognition session restarted");
        self.recognized.clear();
        self.order.clear();
        self.flash_until = None;
        self.ticks = 0;
        self.errors = 0;
    }

    /// Apply one recognition result.
    pub fn observe(&mut self, result: RecognitionResult, now: Instant) -> Observation {
        self.ticks += 1;
        if !result.is_match() {
            return Observation::Unknown;
        }
        if !self.recognized.insert(result.id.clone()) {
            return Observation::AlreadyMarked(result);
        }
        self.flash_until = Some(now + SUCCESS_FLASH);
        self.order.push(result.clone());
        Observation::Marked(result)
    }

    /// Count a tick that failed before producing a result.
    pub fn record_error(&mut self) {
        self.ticks += 1;
        self.errors += 1;
    }

    pub fn contains(&self, student_id: &str) -> bool {
        self.recognized.contains(student_id)
    }

    /// When the current confirmation flash ends, if one was armed.
    pub fn flash_until(&self) -> Option<Instant> {
        self.flash_until
    }

    /// Whether the confirmation flash is still showing at `now`.
    pub fn is_flashing(&self, now: Instant) -> bool {
        self.flash_until.is_some_and(|until| now < until)
    }

    /// Students confirmed in this session, in the order they were first seen.
    pub fn marked(&self) -> &[RecognitionResult] {
        &self.order
    }

    pub fn ticks(&self) -> u64 {
        self.ticks
    }

    pub fn errors(&self) -> u64 {
        self.errors
    }

    /// Notification text for a first confirmation.
    pub fn marked_message(&self, result: &RecognitionResult) -> String {
        format!(
            "{} (ID: {}) has been recognized and marked present for {}.",
            result.name,
            result.id,
            self.class.subject_code()
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::UNKNOWN;

    fn hit(id: &str, name: &str) -> RecognitionResult {
        RecognitionResult { name: name.into(), id: id.into(), image: String::new() }
    }

    #[test]
    fn test_same_identity_marked_once() {
        let mut session = RecognitionSession::default();
        let now = Instant::now();
        let outcomes: Vec<_> = (0..3).map(|_| session.observe(hit("42", "Asha"), now)).collect();

        let marked = outcomes.iter().filter(|o| matches!(o, Observation::Marked(_))).count();
        assert_eq!(marked, 1);
        assert!(matches!(outcomes[1], Observation::AlreadyMarked(_)));
        assert_eq!(session.marked().len(), 1);
        assert_eq!(session.ticks(), 3);
    }

    #[test]
    fn test_restart_clears_set() {
        let mut session = RecognitionSession::default();
        let now = Instant::now();
        session.observe(hit("42", "Asha"), now);
        session.restart();
        assert!(!session.contains("42"));
        assert!(matches!(session.observe(hit("42", "Asha"), now), Observation::Marked(_)));
    }

    #[test]
    fn test_unknown_is_not_recorded() {
        let mut session = RecognitionSession::default();
        let unknown = RecognitionResult { name: UNKNOWN.into(), id: UNKNOWN.into(), image: String::new() };
        assert_eq!(session.observe(unknown, Instant::now()), Observation::Unknown);
        assert!(session.marked().is_empty());
        assert!(!session.contains(UNKNOWN));
    }

    #[test]
    fn test_flash_expires() {
        let mut session = RecognitionSession::default();
        let now = Instant::now();
        assert!(!session.is_flashing(now));
        session.observe(hit("7", "Ravi"), now);
        assert!(session.is_flashing(now + Duration::from_secs(2)));
        assert!(!session.is_flashing(now + SUCCESS_FLASH));
        assert_eq!(session.flash_until(), Some(now + SUCCESS_FLASH));
    }

    #[test]
    fn test_marked_message_names_subject() {
        let session = RecognitionSession::new(ClassSession::new(Some("AI"), Some("m1")));
        let msg = session.marked_message(&hit("42", "Asha"));
        assert_eq!(msg, "Asha (ID: 42) has been recognized and marked present for AI.");
    }
}
