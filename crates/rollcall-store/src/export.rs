use serde::{Deserialize, Serialize};

use rollcall_shared::types::{AttendanceStatus, Classification};

use crate::database::Database;
use crate::error::Result;

/// Attendance export, written as JSON by the admin "export" action.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttendanceExport {
    /// RFC 3339 timestamp of when the export was created
    pub created_at: String,
    /// App version that produced the export
    pub version: String,
    pub records: Vec<ExportedAttendance>,
}

/// One row of an export. The local id is dropped; (student_id, timestamp)
/// identifies the row across devices.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ExportedAttendance {
    pub student_id: String,
    pub timestamp: i64,
    pub status: AttendanceStatus,
    pub classification: Classification,
    pub subject: Option<String>,
    pub period: Option<String>,
    pub synced: bool,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImportStats {
    pub imported: usize,
    /// Rows skipped because the natural key already existed.
    pub duplicates: usize,
}

impl Database {
    pub fn export_attendance(&self) -> Result<AttendanceExport> {
        let records = self
            .list_attendance()?
            .into_iter()
            .map(|r| ExportedAttendance {
                student_id: r.student_id,
                timestamp: r.timestamp,
                status: r.status,
                classification: r.classification,
                subject: r.subject,
                period: r.period,
                synced: r.synced,
            })
            .collect();

        Ok(AttendanceExport {
            created_at: chrono::Utc::now().to_rfc3339(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            records,
        })
    }

    /// Import an export, keeping existing rows (INSERT OR IGNORE on the
    /// natural key). The synced flag travels with the row so already-pushed
    /// entries are not pushed a second time.
    pub fn import_attendance(&self, payload: &AttendanceExport) -> Result<ImportStats> {
        let mut stats = ImportStats::default();
        let tx = self.conn().unchecked_transaction()?;

        for rec in &payload.records {
            let inserted = tx.execute(
                "INSERT OR IGNORE INTO attendance
                    (student_id, timestamp, status, synced, classification, subject, period)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                rusqlite::params![
                    rec.student_id,
                    rec.timestamp,
                    rec.status.as_str(),
                    rec.synced,
                    rec.classification.as_str(),
                    rec.subject,
                    rec.period,
                ],
            )?;
            if inserted == 1 {
                stats.imported += 1;
            } else {
                stats.duplicates += 1;
            }
        }

        tx.commit()?;
        tracing::info!(
            imported = stats.imported,
            duplicates = stats.duplicates,
            "attendance import finished"
        );
        Ok(stats)
    }

    /// [`Self::export_attendance`] rendered as pretty JSON.
    pub fn export_attendance_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(&self.export_attendance()?)?)
    }

    pub fn import_attendance_json(&self, json: &str) -> Result<ImportStats> {
        let payload: AttendanceExport = serde_json::from_str(json)?;
        self.import_attendance(&payload)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::NewAttendance;

    #[test]
    fn reimport_suppresses_duplicates() {
        let source = Database::open_in_memory().unwrap();
        let a = source
            .insert_attendance(&NewAttendance::homeroom("S001", 10, AttendanceStatus::Present))
            .unwrap();
        source
            .insert_attendance(&NewAttendance::subject("S002", 20, AttendanceStatus::Late, "Math"))
            .unwrap();
        source.mark_attendance_synced(&[a]).unwrap();
        let json = source.export_attendance_json().unwrap();

        let target = Database::open_in_memory().unwrap();
        target
            .insert_attendance(&NewAttendance::homeroom("S001", 10, AttendanceStatus::Absent))
            .unwrap();

        let stats = target.import_attendance_json(&json).unwrap();
        assert_eq!(stats, ImportStats { imported: 1, duplicates: 1 });

        // Importing again changes nothing.
        let again = target.import_attendance_json(&json).unwrap();
        assert_eq!(again, ImportStats { imported: 0, duplicates: 2 });

        // The pre-existing row wins and keeps its own status.
        let rows = target.list_attendance_for_student("S001").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].status, AttendanceStatus::Absent);
    }

    #[test]
    fn synced_flag_survives_import() {
        let source = Database::open_in_memory().unwrap();
        let a = source
            .insert_attendance(&NewAttendance::homeroom("S001", 10, AttendanceStatus::Present))
            .unwrap();
        source.mark_attendance_synced(&[a]).unwrap();

        let target = Database::open_in_memory().unwrap();
        target.import_attendance(&source.export_attendance().unwrap()).unwrap();
        assert_eq!(target.count_unsynced_attendance().unwrap(), 0);
    }

    #[test]
    fn malformed_json_is_an_error() {
        let db = Database::open_in_memory().unwrap();
        assert!(db.import_attendance_json("{ not json").is_err());
    }
}
