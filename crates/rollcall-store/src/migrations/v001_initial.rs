//! v001 -- Initial schema creation.
//!
//! Creates the roster tables (`teachers`, `students`, `subject_classes`),
//! `school_events` and `attendance`.

use rusqlite::Connection;

/// SQL executed when upgrading from version 0 to version 1.
const UP_SQL: &str = r#"
-- ----------------------------------------------------------------
-- Teachers
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS teachers (
    id         TEXT PRIMARY KEY NOT NULL,   -- also the remote key
    name       TEXT NOT NULL,
    email      TEXT,
    department TEXT
);

-- ----------------------------------------------------------------
-- Students
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS students (
    id               TEXT PRIMARY KEY NOT NULL,
    name             TEXT NOT NULL,
    section          TEXT NOT NULL,
    guardian_contact TEXT,
    adviser_id       TEXT                     -- teachers(id), not enforced: pull order is not guaranteed
);

CREATE INDEX IF NOT EXISTS idx_students_section ON students(section);

-- ----------------------------------------------------------------
-- Subject classes
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS subject_classes (
    id         TEXT PRIMARY KEY NOT NULL,
    subject    TEXT NOT NULL,
    teacher_id TEXT NOT NULL,
    section    TEXT NOT NULL,
    schedule   TEXT
);

CREATE INDEX IF NOT EXISTS idx_subject_classes_teacher ON subject_classes(teacher_id);

-- ----------------------------------------------------------------
-- School events
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS school_events (
    id          TEXT PRIMARY KEY NOT NULL,
    title       TEXT NOT NULL,
    date        TEXT NOT NULL,               -- YYYY-MM-DD
    description TEXT,
    is_holiday  INTEGER NOT NULL DEFAULT 0   -- boolean 0/1
);

CREATE INDEX IF NOT EXISTS idx_school_events_date ON school_events(date);

-- ----------------------------------------------------------------
-- Attendance
-- ----------------------------------------------------------------
CREATE TABLE IF NOT EXISTS attendance (
    id             INTEGER PRIMARY KEY AUTOINCREMENT,
    student_id     TEXT NOT NULL,
    timestamp      INTEGER NOT NULL,                  -- epoch millis
    status         TEXT NOT NULL,                     -- present / late / absent
    synced         INTEGER NOT NULL DEFAULT 0,        -- boolean 0/1
    classification TEXT NOT NULL DEFAULT 'homeroom',  -- homeroom / subject
    subject        TEXT
);

CREATE INDEX IF NOT EXISTS idx_attendance_synced ON attendance(synced);
"#;

/// Apply the initial migration.
pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
