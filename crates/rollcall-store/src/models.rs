//! Domain model structs persisted in the local SQLite database.
//!
//! Every struct derives `Serialize` and `Deserialize`; roster structs are
//! written to and read from the remote database in exactly this shape.

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use rollcall_shared::types::{AttendanceStatus, Classification};

// ---------------------------------------------------------------------------
// Attendance
// ---------------------------------------------------------------------------

/// A single attendance entry as stored locally.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AttendanceRecord {
    /// Local auto-increment id. Never sent to the remote.
    pub id: i64,
    pub student_id: String,
    /// Occurrence instant, epoch millis.
    pub timestamp: i64,
    pub status: AttendanceStatus,
    /// `true` once the remote confirmed the write. Never reverts.
    pub synced: bool,
    pub classification: Classification,
    /// Subject name for subject-class attendance.
    pub subject: Option<String>,
    /// Academic period label (e.g. "Q1") at the time of recording.
    pub period: Option<String>,
}

/// Fields supplied when recording attendance. New rows always start unsynced.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewAttendance {
    pub student_id: String,
    pub timestamp: i64,
    pub status: AttendanceStatus,
    pub classification: Classification,
    pub subject: Option<String>,
    pub period: Option<String>,
}

impl NewAttendance {
    /// Homeroom attendance without a period label.
    pub fn homeroom(student_id: impl Into<String>, timestamp: i64, status: AttendanceStatus) -> Self {
        Self {
            student_id: student_id.into(),
            timestamp,
            status,
            classification: Classification::Homeroom,
            subject: None,
            period: None,
        }
    }

    /// Attendance taken in a subject class.
    pub fn subject(
        student_id: impl Into<String>,
        timestamp: i64,
        status: AttendanceStatus,
        subject: impl Into<String>,
    ) -> Self {
        Self {
            student_id: student_id.into(),
            timestamp,
            status,
            classification: Classification::Subject,
            subject: Some(subject.into()),
            period: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Rosters
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Teacher {
    pub id: String,
    pub name: String,
    pub email: Option<String>,
    pub department: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Student {
    pub id: String,
    pub name: String,
    /// Homeroom section, e.g. "10-Rizal".
    pub section: String,
    pub guardian_contact: Option<String>,
    /// Homeroom adviser (teacher id).
    pub adviser_id: Option<String>,
}

/// A subject taught by one teacher to one section.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SubjectClass {
    pub id: String,
    pub subject: String,
    pub teacher_id: String,
    pub section: String,
    pub schedule: Option<String>,
}

// ---------------------------------------------------------------------------
// Calendar
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SchoolEvent {
    pub id: String,
    pub title: String,
    pub date: NaiveDate,
    pub description: Option<String>,
    #[serde(default)]
    pub is_holiday: bool,
}

/// One grading period of a school year.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AcademicPeriod {
    pub id: String,
    pub label: String,
    pub school_year: String,
    pub start_date: NaiveDate,
    pub end_date: NaiveDate,
    #[serde(default)]
    pub is_current: bool,
}

impl AcademicPeriod {
    pub fn contains(&self, date: NaiveDate) -> bool {
        self.start_date <= date && date <= self.end_date
    }
}
