use rusqlite::Connection;

const UP_SQL: &str = r#"
CREATE TABLE IF NOT EXISTS academic_periods (
    id          TEXT PRIMARY KEY NOT NULL,
    label       TEXT NOT NULL,               -- e.g. "Q1"
    school_year TEXT NOT NULL,               -- e.g. "2026-2027"
    start_date  TEXT NOT NULL,               -- YYYY-MM-DD
    end_date    TEXT NOT NULL,               -- YYYY-MM-DD
    is_current  INTEGER NOT NULL DEFAULT 0
);

-- Attendance gets tagged with the period it was taken in
ALTER TABLE attendance ADD COLUMN period TEXT;

-- (student_id, timestamp) is the natural key used to suppress duplicates
CREATE UNIQUE INDEX IF NOT EXISTS idx_attendance_student_ts
    ON attendance(student_id, timestamp);
"#;

pub fn up(conn: &Connection) -> Result<(), rusqlite::Error> {
    conn.execute_batch(UP_SQL)
}
