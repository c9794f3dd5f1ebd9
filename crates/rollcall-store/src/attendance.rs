//! Attendance records.
//!
//! Rows are created unsynced by producers (scan / manual entry) and only
//! ever flipped to synced by the reconciler via [`Database::mark_attendance_synced`].

use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, params_from_iter, ErrorCode};

use crate::database::Database;
use crate::error::{conversion, not_found, Result, StoreError};
use crate::models::{AttendanceRecord, NewAttendance};

const SELECT_COLUMNS: &str =
    "SELECT id, student_id, timestamp, status, synced, classification, subject, period FROM attendance";

impl Database {
    // ------------------------------------------------------------------
    // Create
    // ------------------------------------------------------------------

    /// Insert a new unsynced row and return its local id.
    ///
    /// Fails with [`StoreError::Duplicate`] if the student already has an
    /// entry at the same instant.
    pub fn insert_attendance(&self, entry: &NewAttendance) -> Result<i64> {
        let res = self.conn().execute(
            "INSERT INTO attendance (student_id, timestamp, status, synced, classification, subject, period)
             VALUES (?1, ?2, ?3, 0, ?4, ?5, ?6)",
            params![
                entry.student_id,
                entry.timestamp,
                entry.status.as_str(),
                entry.classification.as_str(),
                entry.subject,
                entry.period,
            ],
        );

        match res {
            Ok(_) => Ok(self.conn().last_insert_rowid()),
            Err(rusqlite::Error::SqliteFailure(err, _))
                if err.code == ErrorCode::ConstraintViolation =>
            {
                Err(StoreError::Duplicate {
                    student_id: entry.student_id.clone(),
                    timestamp: entry.timestamp,
                })
            }
            Err(other) => Err(other.into()),
        }
    }

    /// Record attendance the way the scan and manual-entry screens do: when
    /// no period label is given, tag the row with the academic period that
    /// covers the day of `timestamp`.
    pub fn record_attendance(&self, mut entry: NewAttendance) -> Result<AttendanceRecord> {
        if entry.period.is_none() {
            if let Some(day) = day_of(entry.timestamp) {
                entry.period = self.current_academic_period(day)?.map(|p| p.label);
            }
        }

        let id = self.insert_attendance(&entry)?;
        tracing::debug!(
            id,
            student = %entry.student_id,
            status = %entry.status,
            "attendance recorded"
        );

        Ok(AttendanceRecord {
            id,
            student_id: entry.student_id,
            timestamp: entry.timestamp,
            status: entry.status,
            synced: false,
            classification: entry.classification,
            subject: entry.subject,
            period: entry.period,
        })
    }

    // ------------------------------------------------------------------
    // Read
    // ------------------------------------------------------------------

    pub fn get_attendance(&self, id: i64) -> Result<AttendanceRecord> {
        self.conn()
            .query_row(
                &format!("{SELECT_COLUMNS} WHERE id = ?1"),
                params![id],
                row_to_attendance,
            )
            .map_err(not_found)
    }

    /// All rows, oldest first.
    pub fn list_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        let mut stmt = self
            .conn()
            .prepare(&format!("{SELECT_COLUMNS} ORDER BY timestamp ASC, id ASC"))?;
        let rows = stmt.query_map([], row_to_attendance)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn list_attendance_for_student(&self, student_id: &str) -> Result<Vec<AttendanceRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS} WHERE student_id = ?1 ORDER BY timestamp ASC"
        ))?;
        let rows = stmt.query_map(params![student_id], row_to_attendance)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    /// Rows not yet confirmed by the remote. This query is what keeps a
    /// synced row from ever being pushed again.
    pub fn list_unsynced_attendance(&self) -> Result<Vec<AttendanceRecord>> {
        let mut stmt = self.conn().prepare(&format!(
            "{SELECT_COLUMNS} WHERE synced = 0 ORDER BY id ASC"
        ))?;
        let rows = stmt.query_map([], row_to_attendance)?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(StoreError::Sqlite)
    }

    pub fn count_unsynced_attendance(&self) -> Result<u64> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM attendance WHERE synced = 0",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    // ------------------------------------------------------------------
    // Update
    // ------------------------------------------------------------------

    /// Flag the given rows as synced. Returns the number of rows changed.
    pub fn mark_attendance_synced(&self, ids: &[i64]) -> Result<usize> {
        if ids.is_empty() {
            return Ok(0);
        }

        let placeholders = vec!["?"; ids.len()].join(", ");
        let affected = self.conn().execute(
            &format!("UPDATE attendance SET synced = 1 WHERE synced = 0 AND id IN ({placeholders})"),
            params_from_iter(ids.iter()),
        )?;
        Ok(affected)
    }

    // ------------------------------------------------------------------
    // Delete
    // ------------------------------------------------------------------

    pub fn delete_attendance(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn()
            .execute("DELETE FROM attendance WHERE id = ?1", params![id])?;
        Ok(affected > 0)
    }

    pub fn delete_attendance_for_student(&self, student_id: &str) -> Result<usize> {
        let affected = self.conn().execute(
            "DELETE FROM attendance WHERE student_id = ?1",
            params![student_id],
        )?;
        Ok(affected)
    }

    /// Administrative wipe. Unsynced rows are lost too.
    pub fn delete_all_attendance(&self) -> Result<usize> {
        let affected = self.conn().execute("DELETE FROM attendance", [])?;
        tracing::warn!(deleted = affected, "all attendance rows deleted");
        Ok(affected)
    }
}

fn day_of(timestamp_millis: i64) -> Option<NaiveDate> {
    DateTime::<Utc>::from_timestamp_millis(timestamp_millis).map(|dt| dt.date_naive())
}

fn row_to_attendance(row: &rusqlite::Row<'_>) -> rusqlite::Result<AttendanceRecord> {
    let status: String = row.get(3)?;
    let classification: String = row.get(5)?;

    Ok(AttendanceRecord {
        id: row.get(0)?,
        student_id: row.get(1)?,
        timestamp: row.get(2)?,
        status: status.parse().map_err(|e| conversion(3, e))?,
        synced: row.get(4)?,
        classification: classification.parse().map_err(|e| conversion(5, e))?,
        subject: row.get(6)?,
        period: row.get(7)?,
    })
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::models::AcademicPeriod;
    use rollcall_shared::types::{AttendanceStatus, Classification};

    fn db() -> Database {
        Database::open_in_memory().unwrap()
    }

    #[test]
    fn new_rows_start_unsynced() {
        let db = db();
        let id = db
            .insert_attendance(&NewAttendance::homeroom("S001", 1_000, AttendanceStatus::Present))
            .unwrap();

        let row = db.get_attendance(id).unwrap();
        assert!(!row.synced);
        assert_eq!(row.classification, Classification::Homeroom);
        assert_eq!(db.count_unsynced_attendance().unwrap(), 1);
    }

    #[test]
    fn duplicate_natural_key_is_rejected() {
        let db = db();
        let entry = NewAttendance::homeroom("S001", 1_000, AttendanceStatus::Present);
        db.insert_attendance(&entry).unwrap();

        let err = db.insert_attendance(&entry).unwrap_err();
        assert!(matches!(err, StoreError::Duplicate { timestamp: 1_000, .. }));

        // Same instant for a different student is fine.
        db.insert_attendance(&NewAttendance::homeroom("S002", 1_000, AttendanceStatus::Late))
            .unwrap();
    }

    #[test]
    fn mark_synced_only_touches_listed_rows() {
        let db = db();
        let a = db
            .insert_attendance(&NewAttendance::homeroom("S001", 1, AttendanceStatus::Present))
            .unwrap();
        let b = db
            .insert_attendance(&NewAttendance::homeroom("S001", 2, AttendanceStatus::Late))
            .unwrap();
        let c = db
            .insert_attendance(&NewAttendance::homeroom("S001", 3, AttendanceStatus::Absent))
            .unwrap();

        assert_eq!(db.mark_attendance_synced(&[a, c]).unwrap(), 2);
        // Already synced rows are not counted again.
        assert_eq!(db.mark_attendance_synced(&[a]).unwrap(), 0);
        assert_eq!(db.mark_attendance_synced(&[]).unwrap(), 0);

        let pending: Vec<i64> = db
            .list_unsynced_attendance()
            .unwrap()
            .into_iter()
            .map(|r| r.id)
            .collect();
        assert_eq!(pending, vec![b]);
    }

    #[test]
    fn record_tags_current_period() {
        let db = db();
        db.upsert_academic_period(&AcademicPeriod {
            id: "2026-Q1".into(),
            label: "Q1".into(),
            school_year: "2026-2027".into(),
            start_date: NaiveDate::from_ymd_opt(2026, 6, 1).unwrap(),
            end_date: NaiveDate::from_ymd_opt(2026, 8, 31).unwrap(),
            is_current: true,
        })
        .unwrap();

        // 2026-07-01T00:00:00Z
        let ts = 1_782_864_000_000;
        let row = db
            .record_attendance(NewAttendance::subject("S001", ts, AttendanceStatus::Late, "Math"))
            .unwrap();

        assert_eq!(row.period.as_deref(), Some("Q1"));
        assert_eq!(db.get_attendance(row.id).unwrap(), row);
    }

    #[test]
    fn deletes() {
        let db = db();
        let a = db
            .insert_attendance(&NewAttendance::homeroom("S001", 1, AttendanceStatus::Present))
            .unwrap();
        db.insert_attendance(&NewAttendance::homeroom("S002", 1, AttendanceStatus::Present))
            .unwrap();
        db.insert_attendance(&NewAttendance::homeroom("S002", 2, AttendanceStatus::Present))
            .unwrap();

        assert!(db.delete_attendance(a).unwrap());
        assert!(!db.delete_attendance(a).unwrap());
        assert!(matches!(db.get_attendance(a), Err(StoreError::NotFound)));
        assert_eq!(db.delete_attendance_for_student("S002").unwrap(), 2);
        assert_eq!(db.delete_all_attendance().unwrap(), 0);
    }
}
