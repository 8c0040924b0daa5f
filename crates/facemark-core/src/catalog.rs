//! Subjects and time slots a recognition session can be held for.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Subject {
    pub code: &'static str,
    pub name: &'static str,
    pub description: &'static str,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Slot {
    pub id: &'static str,
    pub time: &'static str,
    pub description: &'static str,
}

pub const SUBJECTS: [Subject; 8] = [
    Subject {
        code: "AI",
        name: "Artificial Intelligence",
        description: "Fundamentals of AI and intelligent systems",
    },
    Subject {
        code: "DAA",
        name: "Design & Analysis of Algorithms",
        description: "Algorithm design techniques and complexity analysis",
    },
    Subject {
        code: "TOC",
        name: "Theory of Computation",
        description: "Formal languages, automata, and computability",
    },
    Subject {
        code: "FSD",
        name: "Full Stack Development",
        description: "End-to-end web application development",
    },
    Subject {
        code: "DBMS",
        name: "Database Management Systems",
        description: "Database design, SQL, and management",
    },
    Subject {
        code: "TNT",
        name: "Techniques for Non-Tabular Data",
        description: "Processing non-tabular data like images and text",
    },
    Subject {
        code: "SEC",
        name: "Soft & Entrepreneurial Skills",
        description: "Professional and business skills development",
    },
    Subject {
        code: "CTS",
        name: "Computational Thinking Skills",
        description: "Problem-solving and algorithmic thinking",
    },
];

pub const SLOTS: [Slot; 8] = [
    Slot { id: "m1", time: "9:00 AM - 10:00 AM", description: "First Period" },
    Slot { id: "m2", time: "10:00 AM - 11:00 AM", description: "Second Period" },
    Slot { id: "m3", time: "11:15 AM - 12:15 PM", description: "Third Period" },
    Slot { id: "m4", time: "12:15 PM - 1:15 PM", description: "Fourth Period" },
    Slot { id: "a1", time: "2:00 PM - 3:00 PM", description: "Fifth Period" },
    Slot { id: "a2", time: "3:00 PM - 4:00 PM", description: "Sixth Period" },
    Slot { id: "a3", time: "4:15 PM - 5:15 PM", description: "Seventh Period" },
    Slot { id: "a4", time: "5:15 PM - 6:15 PM", description: "Eighth Period" },
];

/// Look up a subject by code (case-insensitive).
pub fn subject(code: &str) -> Option<&'static Subject> {
    SUBJECTS.iter().find(|s| s.code.eq_ignore_ascii_case(code))
}

pub fn slot(id: &str) -> Option<&'static Slot> {
    SLOTS.iter().find(|s| s.id.eq_ignore_ascii_case(id))
}

/// Subject and slot chosen before starting recognition.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClassSession {
    pub subject: Option<String>,
    pub slot: Option<String>,
}

impl ClassSession {
    /// Build a session from user input, normalising codes against the catalog.
    /// Unknown codes are kept verbatim.
    pub fn new(subject: Option<&str>, slot: Option<&str>) -> Self {
        let subject = subject.filter(|s| !s.trim().is_empty()).map(|code| {
            self::subject(code)
                .map(|s| s.code.to_string())
                .unwrap_or_else(|| code.trim().to_string())
        });
        let slot = slot.filter(|s| !s.trim().is_empty()).map(|id| {
            self::slot(id)
                .map(|s| s.id.to_string())
                .unwrap_or_else(|| id.trim().to_string())
        });
        Self { subject, slot }
    }

    pub fn is_selected(&self) -> bool {
        self.subject.is_some()
    }

    /// Subject code for notifications, empty when none was chosen.
    pub fn subject_code(&self) -> &str {
        self.subject.as_deref().unwrap_or("")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_case_insensitive() {
        assert_eq!(subject("dbms").map(|s| s.name), Some("Database Management Systems"));
        assert_eq!(slot("A3").map(|s| s.description), Some("Seventh Period"));
        assert!(subject("PHY").is_none());
    }

    #[test]
    fn test_class_session_normalises_codes() {
        let session = ClassSession::new(Some("ai"), Some("m1"));
        assert_eq!(session.subject.as_deref(), Some("AI"));
        assert_eq!(session.slot.as_deref(), Some("m1"));
        assert!(session.is_selected());

        let empty = ClassSession::new(Some("  "), None);
        assert!(!empty.is_selected());
        assert_eq!(empty.subject_code(), "");
    }
}
